use anyhow::{anyhow, Context as _};
use hitrack::config::default_token_file;
use hitrack::guard::{DEFAULT_PATH, LOGIN_PATH};
use hitrack::models::{ActionStatus, AddRepositoriesRequest, AddRepository};
use hitrack::notify::Level;
use hitrack::transport::{ApiRequest, Method};
use hitrack::{seconds_until, Config, Context, Navigation};
use hitrack_cli::pretty::*;
use hitrack_cli::*;
use serde::Serialize;
use serde_json::Value;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use colored_json::to_colored_json_auto;
use log::{self, debug};
use std::io::Write;
use structopt::StructOpt;
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

#[derive(StructOpt)]
#[structopt(
    rename_all = "kebab-case",
    about = "CLI interface for the HITrack vulnerability tracker"
)]
struct Opt {
    #[structopt(
        global = true,
        long = "--api-url",
        env = "HITRACK_API_URL",
        default_value = "http://localhost:8000"
    )]
    api_url: String,

    /// Where access and refresh tokens are kept between runs
    /// [default: ~/.config/hitrack/tokens.json]
    #[structopt(
        global = true,
        long = "--token-file",
        env = "HITRACK_TOKEN_FILE",
        parse(from_os_str)
    )]
    token_file: Option<PathBuf>,

    /// Request timeout, in seconds
    #[structopt(
        global = true,
        long = "--timeout",
        env = "HITRACK_TIMEOUT_SECS",
        default_value = "30"
    )]
    timeout: u64,

    /// Print raw JSON responses instead of tables
    #[structopt(global = true, long)]
    json: bool,

    /// Log more messages. Pass multiple times for ever more verbosity
    ///
    /// By default, it'll only report errors. Passing `-v` one time also prints
    /// warnings, `-vv` enables info logging, `-vvv` debug, and `-vvvv` trace.
    #[structopt(global = true, long, short = "v", parse(from_occurrences))]
    verbose: i8,

    #[structopt(long = "--shell-completions", hidden = true)]
    shell_completions: Option<structopt::clap::Shell>,

    #[structopt(subcommand)]
    cmd: Command,
}

/// Common flags of every list command
#[derive(StructOpt)]
struct ListArgs {
    #[structopt(long, short)]
    search: Option<String>,

    /// Field to order by; prefix with `-` for descending
    #[structopt(long, short)]
    ordering: Option<Ordering>,

    #[structopt(long)]
    page: Option<u64>,

    #[structopt(long)]
    page_size: Option<u64>,

    /// Extra filters, as `key==value`
    fields: Vec<ArgField>,
}

impl ListArgs {
    fn into_params(self) -> Result<hitrack::ListParams> {
        list_params(
            self.search,
            self.ordering,
            self.page,
            self.page_size,
            self.fields,
        )
    }
}

#[derive(StructOpt)]
enum RepoCommand {
    List {
        #[structopt(flatten)]
        list: ListArgs,
    },
    Get {
        uuid: EntityUuid,
    },
    /// Tags of a repository, newest first
    Tags {
        uuid: EntityUuid,
        #[structopt(flatten)]
        list: ListArgs,
    },
    /// Findings of the most recent tags, as JSON
    Graph {
        uuid: EntityUuid,
    },
    /// Ask the server to look for new tags
    Scan {
        uuid: EntityUuid,
    },
}

#[derive(StructOpt)]
enum RegistryCommand {
    /// Repositories available in a container registry
    List {
        /// Registry UUID; the server picks its first registry if not given
        #[structopt(long)]
        registry: Option<EntityUuid>,
        #[structopt(long)]
        page_size: Option<u64>,
        /// Continuation marker printed with the previous page
        #[structopt(long)]
        last: Option<String>,
    },
    /// Start tracking registry repositories
    Import {
        #[structopt(long)]
        registry: Option<EntityUuid>,
        /// Repositories, as `NAME@URL`
        #[structopt(required = true)]
        repositories: Vec<RegistryEntry>,
    },
}

#[derive(StructOpt)]
enum TagCommand {
    List {
        #[structopt(flatten)]
        list: ListArgs,
    },
    Get {
        uuid: EntityUuid,
    },
    Images {
        uuid: EntityUuid,
        #[structopt(flatten)]
        list: ListArgs,
    },
    /// Pull and scan the images of a tag
    Process {
        uuid: EntityUuid,
    },
    Rescan {
        uuid: EntityUuid,
    },
}

#[derive(StructOpt)]
enum ImageCommand {
    List {
        #[structopt(flatten)]
        list: ListArgs,
    },
    Get {
        uuid: EntityUuid,
    },
    Vulns {
        uuid: EntityUuid,
    },
    Components {
        uuid: EntityUuid,
        #[structopt(flatten)]
        list: ListArgs,
    },
    /// Raw SBOM document, always printed as JSON
    Sbom {
        uuid: EntityUuid,
    },
    Rescan {
        uuid: EntityUuid,
    },
}

#[derive(StructOpt)]
enum ComponentCommand {
    List {
        #[structopt(flatten)]
        list: ListArgs,
    },
    Get {
        uuid: EntityUuid,
    },
    /// Known versions of one component
    Versions {
        uuid: EntityUuid,
    },
    /// Versions across all components
    AllVersions {
        #[structopt(flatten)]
        list: ListArgs,
    },
    Version {
        uuid: EntityUuid,
    },
    VersionVulns {
        uuid: EntityUuid,
    },
}

#[derive(StructOpt)]
enum VulnCommand {
    List {
        #[structopt(long)]
        severity: Option<String>,
        #[structopt(flatten)]
        list: ListArgs,
    },
    Get {
        uuid: EntityUuid,
    },
    /// Counts by severity, as JSON
    Stats,
}

#[derive(StructOpt)]
enum ApiMethod {
    Get {
        path: ApiPath,
        fields: Vec<ArgField>,
    },
    Post {
        path: ApiPath,
        fields: Vec<ArgField>,
    },
}

#[derive(StructOpt)]
enum Command {
    /// Summarize configuration and session state
    Status,

    Login {
        #[structopt(long, short)]
        username: String,

        #[structopt(long, short, env = "HITRACK_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Forget the stored tokens
    Logout,

    /// Overall counts
    Stats,

    Repo {
        #[structopt(subcommand)]
        cmd: RepoCommand,
    },

    Registry {
        #[structopt(subcommand)]
        cmd: RegistryCommand,
    },

    Tag {
        #[structopt(subcommand)]
        cmd: TagCommand,
    },

    Image {
        #[structopt(subcommand)]
        cmd: ImageCommand,
    },

    Component {
        #[structopt(subcommand)]
        cmd: ComponentCommand,
    },

    Vuln {
        #[structopt(subcommand)]
        cmd: VulnCommand,
    },

    /// Make an arbitrary API request (with the usual token handling)
    ///
    /// Fields can be `key==value` for query parameters, or `key=value` for JSON body values.
    Api {
        #[structopt(subcommand)]
        method: ApiMethod,
    },
}

/// Repository to import from a registry
struct RegistryEntry(AddRepository);

impl FromStr for RegistryEntry {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('@') {
            Some((name, url)) if !name.is_empty() && !url.is_empty() => {
                Ok(RegistryEntry(AddRepository {
                    repository_name: name.to_string(),
                    repository_url: url.to_string(),
                }))
            }
            _ => Err(anyhow!("expected NAME@URL, got: {}", s)),
        }
    }
}

impl ApiMethod {
    fn into_parts(self) -> (Method, ApiPath, Vec<ArgField>) {
        match self {
            ApiMethod::Get { path, fields } => (Method::GET, path, fields),
            ApiMethod::Post { path, fields } => (Method::POST, path, fields),
        }
    }
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let opt = Opt::from_args();

    let log_level = match opt.verbose {
        std::i8::MIN..=-1 => "none",
        0 => "error",
        1 => "warn",
        2 => "info",
        3 => "debug",
        4..=std::i8::MAX => "trace",
    };
    // hyper logging is very verbose, so crank that down even if everything else is more verbose
    let log_filter = format!("{},hyper=error,reqwest=warn", log_level);
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_filter))
        .format_timestamp(None)
        .init();

    debug!("Args parsed, starting up");

    #[cfg(windows)]
    colored_json::enable_ansi_support();

    if let Some(shell) = opt.shell_completions {
        Opt::clap().gen_completions_to("hitrack", shell, &mut std::io::stdout());
        std::process::exit(0);
    }

    let rt = tokio::runtime::Runtime::new()?;
    if let Err(err) = rt.block_on(run(opt)) {
        // Be graceful about some errors
        if let Some(io_err) = err.root_cause().downcast_ref::<std::io::Error>() {
            if let std::io::ErrorKind::BrokenPipe = io_err.kind() {
                // presumably due to something like writing to stdout and piped to `head -n10` and
                // stdout was closed
                debug!(
                    "got BrokenPipe error, assuming stdout closed as expected and exiting with success"
                );
                std::process::exit(0);
            }
        }
        let mut color_stderr = StandardStream::stderr(if atty::is(atty::Stream::Stderr) {
            ColorChoice::Auto
        } else {
            ColorChoice::Never
        });
        color_stderr.set_color(ColorSpec::new().set_fg(Some(Color::Red)).set_bold(true))?;
        eprintln!("Error: {:?}", err);
        color_stderr.set_color(&ColorSpec::new())?;
        std::process::exit(1);
    }
    Ok(())
}

fn stdout() -> StandardStream {
    StandardStream::stdout(if atty::is(atty::Stream::Stdout) {
        ColorChoice::Auto
    } else {
        ColorChoice::Never
    })
}

fn print_result_json(result: Option<Value>) -> Result<()> {
    if let Some(val) = result {
        writeln!(&mut std::io::stdout(), "{}", to_colored_json_auto(&val)?)?
    };
    Ok(())
}

/// Prints `val` as JSON when asked to, otherwise with the given pretty-printer
fn output<T, F>(json: bool, val: &T, pretty: F) -> Result<()>
where
    T: Serialize,
    F: FnOnce(&mut StandardStream, &T) -> Result<()>,
{
    if json {
        print_result_json(Some(serde_json::to_value(val)?))
    } else {
        pretty(&mut stdout(), val)
    }
}

fn print_action(json: bool, status: &ActionStatus) -> Result<()> {
    output(json, status, |out, s| {
        let msg = s
            .message
            .as_deref()
            .or(s.status.as_deref())
            .unwrap_or("requested");
        writeln!(out, "{}", msg)?;
        Ok(())
    })
}

/// Page of the web dashboard a command corresponds to, for the navigation guard
fn route_for(cmd: &Command) -> Option<String> {
    let path = match cmd {
        Command::Status | Command::Logout => return None,
        Command::Login { .. } => LOGIN_PATH.to_string(),
        Command::Stats | Command::Api { .. } => DEFAULT_PATH.to_string(),
        Command::Repo { cmd } => match cmd {
            RepoCommand::List { .. } => "/repositories".to_string(),
            RepoCommand::Get { uuid }
            | RepoCommand::Tags { uuid, .. }
            | RepoCommand::Graph { uuid }
            | RepoCommand::Scan { uuid } => format!("/repositories/{}", uuid),
        },
        Command::Registry { .. } => "/acr".to_string(),
        Command::Tag { cmd } => match cmd {
            TagCommand::List { .. } => "/repositories".to_string(),
            TagCommand::Get { uuid }
            | TagCommand::Images { uuid, .. }
            | TagCommand::Process { uuid }
            | TagCommand::Rescan { uuid } => format!("/repository-tags/{}/images", uuid),
        },
        Command::Image { cmd } => match cmd {
            ImageCommand::List { .. } => "/images".to_string(),
            ImageCommand::Get { uuid }
            | ImageCommand::Vulns { uuid }
            | ImageCommand::Components { uuid, .. }
            | ImageCommand::Sbom { uuid }
            | ImageCommand::Rescan { uuid } => format!("/images/{}", uuid),
        },
        Command::Component { .. } => "/components".to_string(),
        Command::Vuln { .. } => "/vulnerabilities".to_string(),
    };
    Some(path)
}

async fn run(opt: Opt) -> Result<()> {
    let config = Config {
        api_url: opt.api_url.clone(),
        token_file: opt.token_file.clone().unwrap_or_else(default_token_file),
        timeout: Duration::from_secs(opt.timeout),
    };
    let ctx = config.build(Arc::new(TerminalNavigator))?;

    if let Some(route) = route_for(&opt.cmd) {
        match ctx.guard.check(&route) {
            Navigation::Proceed => {}
            Navigation::Redirect(LOGIN_PATH) => {
                return Err(anyhow!("not logged in; run `hitrack login` first"))
            }
            Navigation::Redirect(_) => {
                return Err(anyhow!("already logged in; run `hitrack logout` first"))
            }
        }
    }

    let service = ctx.client.notifications().clone();
    let mut notices = service.subscribe();
    let result = dispatch(&ctx, &config, opt.cmd, opt.json).await;

    // errors are reported on their own below, so only pass along the rest
    let mut stderr = StandardStream::stderr(if atty::is(atty::Stream::Stderr) {
        ColorChoice::Auto
    } else {
        ColorChoice::Never
    });
    while let Some(n) = notices.try_recv() {
        if n.level != Level::Error {
            pp_notification(&mut stderr, &n)?;
        }
    }
    service.unsubscribe(notices.id);
    result
}

async fn dispatch(ctx: &Context, config: &Config, cmd: Command, json: bool) -> Result<()> {
    let client = &ctx.client;
    match cmd {
        Command::Status => {
            let tokens = client.tokens();
            println!("Configuration");
            println!("  HITRACK_API_URL: {}", config.api_url);
            println!("  HITRACK_TOKEN_FILE: {}", config.token_file.display());
            println!("  HITRACK_TIMEOUT_SECS: {}", config.timeout.as_secs());
            println!("Session");
            if !tokens.is_authenticated() {
                println!("  not logged in");
                return Ok(());
            }
            match tokens.claims() {
                Ok(claims) => {
                    if let Some(user_id) = claims.user_id {
                        println!("  user id: {}", user_id);
                    }
                    if let Some(exp) = claims.exp {
                        let left = seconds_until(exp);
                        if left > 0 {
                            println!("  access token expires in {}s", left);
                        } else {
                            println!("  access token expired {}s ago", -left);
                        }
                    }
                }
                Err(e) => println!("  access token unreadable: {}", e),
            }
            if tokens.check_auth().await {
                println!("  session: valid");
            } else {
                println!("  session: expired (tokens cleared)");
            }
        }
        Command::Login { username, password } => {
            client.tokens().authenticate(&username, &password).await?;
            client.notifications().success("Logged in successfully");
        }
        Command::Logout => {
            client.tokens().clear()?;
            client.notifications().info("Logged out");
        }
        Command::Stats => output(json, &client.stats().await?, pp_stats)?,
        Command::Repo { cmd } => match cmd {
            RepoCommand::List { list } => {
                let page = client.list_repositories(&list.into_params()?).await?;
                output(json, &page, pp_repositories)?
            }
            RepoCommand::Get { uuid } => {
                let repo = client.get_repository(uuid.as_ref()).await?;
                output(json, &repo, pp_repository)?
            }
            RepoCommand::Tags { uuid, list } => {
                let page = client
                    .repository_paginated_tags(uuid.as_ref(), &list.into_params()?)
                    .await?;
                output(json, &page, |out, p| {
                    pp_tags(out, &p.results)?;
                    writeln!(out, "{} of {} total", p.results.len(), p.count)?;
                    Ok(())
                })?
            }
            RepoCommand::Graph { uuid } => {
                let points = client.repository_tags_graph(uuid.as_ref()).await?;
                print_result_json(Some(Value::Array(points)))?
            }
            RepoCommand::Scan { uuid } => {
                print_action(json, &client.scan_repository_tags(uuid.as_ref()).await?)?
            }
        },
        Command::Registry { cmd } => match cmd {
            RegistryCommand::List {
                registry,
                page_size,
                last,
            } => {
                let listing = client
                    .registry_repositories(
                        registry.as_ref().map(|r| r.as_ref()),
                        page_size,
                        last.as_deref(),
                    )
                    .await?;
                output(json, &listing, pp_registry_repositories)?
            }
            RegistryCommand::Import {
                registry,
                repositories,
            } => {
                let request = AddRepositoriesRequest {
                    repositories: repositories.into_iter().map(|e| e.0).collect(),
                    registry_uuid: registry.map(|r| r.to_string()),
                };
                let response = client.add_repositories(&request).await?;
                output(json, &response, pp_add_repositories)?
            }
        },
        Command::Tag { cmd } => match cmd {
            TagCommand::List { list } => {
                let page = client.list_tags(&list.into_params()?).await?;
                output(json, &page, |out, p| pp_tags(out, &p.results))?
            }
            TagCommand::Get { uuid } => {
                let tag = client.get_tag(uuid.as_ref()).await?;
                output(json, &tag, pp_tag)?
            }
            TagCommand::Images { uuid, list } => {
                let page = client
                    .tag_images(uuid.as_ref(), &list.into_params()?)
                    .await?;
                output(json, &page, pp_image_page)?
            }
            TagCommand::Process { uuid } => {
                print_action(json, &client.process_tag(uuid.as_ref()).await?)?
            }
            TagCommand::Rescan { uuid } => {
                print_action(json, &client.rescan_tag_images(uuid.as_ref()).await?)?
            }
        },
        Command::Image { cmd } => match cmd {
            ImageCommand::List { list } => {
                let page = client.list_images(&list.into_params()?).await?;
                output(json, &page, pp_image_page)?
            }
            ImageCommand::Get { uuid } => {
                let image = client.get_image(uuid.as_ref()).await?;
                output(json, &image, pp_image)?
            }
            ImageCommand::Vulns { uuid } => {
                let vulns = client.image_vulnerabilities(uuid.as_ref()).await?;
                output(json, &vulns, |out, v| pp_vulnerabilities(out, v))?
            }
            ImageCommand::Components { uuid, list } => {
                let page = client
                    .image_components(uuid.as_ref(), &list.into_params()?)
                    .await?;
                output(json, &page, |out, p| pp_component_versions(out, &p.results))?
            }
            ImageCommand::Sbom { uuid } => {
                print_result_json(Some(client.image_sbom(uuid.as_ref()).await?))?
            }
            ImageCommand::Rescan { uuid } => {
                print_action(json, &client.rescan_image(uuid.as_ref()).await?)?
            }
        },
        Command::Component { cmd } => match cmd {
            ComponentCommand::List { list } => {
                let page = client.list_components(&list.into_params()?).await?;
                output(json, &page, pp_components)?
            }
            ComponentCommand::Get { uuid } => {
                let component = client.get_component(uuid.as_ref()).await?;
                output(json, &component, pp_component)?
            }
            ComponentCommand::Versions { uuid } => {
                let versions = client.component_versions(uuid.as_ref()).await?;
                output(json, &versions, |out, v| pp_component_versions(out, v))?
            }
            ComponentCommand::AllVersions { list } => {
                let page = client
                    .list_component_versions(&list.into_params()?)
                    .await?;
                output(json, &page, |out, p| pp_component_versions(out, &p.results))?
            }
            ComponentCommand::Version { uuid } => {
                let cv = client.get_component_version(uuid.as_ref()).await?;
                output(json, &cv, pp_component_version)?
            }
            ComponentCommand::VersionVulns { uuid } => {
                let vulns = client
                    .component_version_vulnerabilities(uuid.as_ref())
                    .await?;
                output(json, &vulns, |out, v| pp_vulnerabilities(out, v))?
            }
        },
        Command::Vuln { cmd } => match cmd {
            VulnCommand::List { severity, list } => {
                let mut params = list.into_params()?;
                if let Some(severity) = severity {
                    params = params.filter("severity", &severity.to_uppercase());
                }
                let page = client.list_vulnerabilities(&params).await?;
                output(json, &page, pp_vulnerability_page)?
            }
            VulnCommand::Get { uuid } => {
                let vuln = client.get_vulnerability(uuid.as_ref()).await?;
                output(json, &vuln, pp_vulnerability_detail)?
            }
            VulnCommand::Stats => print_result_json(Some(client.severity_stats().await?))?,
        },
        Command::Api { method } => {
            let (method, path, fields) = method.into_parts();
            let (query, body) = split_fields(fields);
            let mut request = ApiRequest::new(method, path.as_ref()).query(query);
            request.body = body;
            let result = client
                .request_value(request)
                .await
                .with_context(|| format!("request to {} failed", path))?;
            print_result_json(result)?
        }
    }
    Ok(())
}
