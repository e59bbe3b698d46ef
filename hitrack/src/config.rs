use crate::client::ApiClient;
use crate::error::{Error, Result};
use crate::guard::{NavigationGuard, Navigator};
use crate::notify::{NotificationService, DEFAULT_CAPACITY};
use crate::session::TokenStore;
use crate::storage::FileStorage;
use crate::transport::{ReqwestTransport, DEFAULT_TIMEOUT};
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_API_URL: &str = "http://localhost:8000";

pub const API_URL_VAR: &str = "HITRACK_API_URL";
pub const TOKEN_FILE_VAR: &str = "HITRACK_TOKEN_FILE";
pub const TIMEOUT_VAR: &str = "HITRACK_TIMEOUT_SECS";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub api_url: String,
    pub token_file: PathBuf,
    pub timeout: Duration,
}

/// `$HOME/.config/hitrack/tokens.json`, or `.hitrack-tokens.json` in the working directory when
/// there is no home directory
pub fn default_token_file() -> PathBuf {
    match env::var_os("HOME") {
        Some(home) if !home.is_empty() => PathBuf::from(home)
            .join(".config")
            .join("hitrack")
            .join("tokens.json"),
        _ => PathBuf::from(".hitrack-tokens.json"),
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            api_url: DEFAULT_API_URL.to_string(),
            token_file: default_token_file(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl Config {
    /// Reads configuration from the environment, with defaults for anything unset
    pub fn from_env() -> Result<Self> {
        let mut config = Config::default();
        if let Some(url) = env::var(API_URL_VAR).ok().filter(|v| !v.is_empty()) {
            config.api_url = url;
        }
        if let Some(path) = env::var_os(TOKEN_FILE_VAR).filter(|v| !v.is_empty()) {
            config.token_file = PathBuf::from(path);
        }
        if let Some(secs) = env::var(TIMEOUT_VAR).ok().filter(|v| !v.is_empty()) {
            let secs: u64 = secs.parse().map_err(|_| {
                Error::Config(format!("{TIMEOUT_VAR} must be whole seconds: {secs}"))
            })?;
            config.timeout = Duration::from_secs(secs);
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.api_url.starts_with("http://") || self.api_url.starts_with("https://")) {
            return Err(Error::Config(format!(
                "API URL must start with http:// or https://: {}",
                self.api_url
            )));
        }
        if self.timeout.is_zero() {
            return Err(Error::Config("timeout must be positive".to_string()));
        }
        Ok(())
    }

    /// Wires up the token store, API client and navigation guard for this configuration
    pub fn build(&self, navigator: Arc<dyn Navigator>) -> Result<Context> {
        self.validate()?;
        let transport = Arc::new(ReqwestTransport::new(&self.api_url, self.timeout)?);
        let storage = Arc::new(FileStorage::new(&self.token_file));
        let tokens = Arc::new(TokenStore::new(transport.clone(), storage)?);
        let notifications = Arc::new(NotificationService::new(DEFAULT_CAPACITY));
        let client = ApiClient::new(transport, tokens.clone(), navigator, notifications);
        Ok(Context {
            guard: NavigationGuard::new(tokens),
            client,
        })
    }
}

/// Everything a front-end needs, built once per process
pub struct Context {
    pub client: ApiClient,
    pub guard: NavigationGuard,
}

#[test]
fn test_validate() {
    assert!(Config::default().validate().is_ok());
    let mut config = Config::default();
    config.api_url = "localhost:8000".to_string();
    assert!(config.validate().is_err());
    let mut config = Config::default();
    config.timeout = Duration::from_secs(0);
    assert!(config.validate().is_err());
}

#[test]
fn test_build_context() {
    use crate::guard::{LogNavigator, Navigation, LOGIN_PATH};
    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        token_file: dir.path().join("tokens.json"),
        ..Config::default()
    };
    let ctx = config.build(Arc::new(LogNavigator)).unwrap();
    assert!(!ctx.client.tokens().is_authenticated());
    assert_eq!(ctx.guard.check("/images"), Navigation::Redirect(LOGIN_PATH));
}
