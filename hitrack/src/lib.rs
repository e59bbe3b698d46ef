pub mod auth;
pub mod client;
pub mod config;
pub mod display;
pub mod error;
pub mod fake;
pub mod guard;
pub mod models;
pub mod notify;
pub mod resources;
pub mod session;
pub mod storage;
pub mod transport;

pub use client::ApiClient;
pub use config::{Config, Context};
pub use error::{Error, Result};
pub use guard::{Navigation, NavigationGuard, Navigator};
pub use resources::ListParams;
pub use session::{Session, TokenStore, User};

/// Seconds left until the UNIX timestamp `exp` (eg, a JWT expiry); negative if already past
pub fn seconds_until(exp: i64) -> i64 {
    exp - time::OffsetDateTime::now_utc().unix_timestamp()
}

#[test]
fn test_seconds_until() {
    let now = time::OffsetDateTime::now_utc().unix_timestamp();
    let left = seconds_until(now + 300);
    assert!(left > 290 && left <= 300);
    assert!(seconds_until(0) < 0);
}
