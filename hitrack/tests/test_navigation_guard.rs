use hitrack::fake::FakeTransport;
use hitrack::guard::{DEFAULT_PATH, LOGIN_PATH, ROUTES};
use hitrack::storage::MemoryStorage;
use hitrack::{Navigation, NavigationGuard, TokenStore};
use std::sync::Arc;

fn guard(access: Option<&str>) -> (NavigationGuard, Arc<TokenStore>, Arc<FakeTransport>) {
    let fake = Arc::new(FakeTransport::new());
    let storage = Arc::new(MemoryStorage::with_tokens(access, None));
    let tokens = Arc::new(TokenStore::new(fake.clone(), storage).unwrap());
    (NavigationGuard::new(tokens.clone()), tokens, fake)
}

#[test]
fn test_protected_routes_need_login() {
    let (guard, _, fake) = guard(None);
    for path in [
        "/",
        "/repositories",
        "/repositories/5b0e8f0a-2a53-4a7e-9d6f-1c2b3a4d5e6f",
        "/images",
        "/images/i1",
        "/components",
        "/vulnerabilities",
        "/acr",
        "/repository-tags/t1/images",
    ] {
        assert_eq!(guard.check(path), Navigation::Redirect(LOGIN_PATH), "{path}");
    }
    assert_eq!(guard.check(LOGIN_PATH), Navigation::Proceed);
    // the guard never goes to the network
    assert!(fake.requests().is_empty());
}

#[test]
fn test_login_redirects_when_authenticated() {
    let (guard, _, _) = guard(Some("a1"));
    assert_eq!(guard.check("/login"), Navigation::Redirect(DEFAULT_PATH));
    assert_eq!(guard.check("/images/i1"), Navigation::Proceed);
    assert_eq!(guard.check("/"), Navigation::Proceed);
}

#[test]
fn test_unknown_paths_pass() {
    let (guard, _, _) = guard(None);
    assert_eq!(guard.check("/no/such/page"), Navigation::Proceed);
}

#[test]
fn test_guard_follows_session() {
    let (guard, tokens, _) = guard(Some("a1"));
    assert_eq!(guard.check("/vulnerabilities"), Navigation::Proceed);
    tokens.clear().unwrap();
    assert_eq!(
        guard.check("/vulnerabilities"),
        Navigation::Redirect(LOGIN_PATH)
    );
}

#[test]
fn test_only_login_is_public() {
    let public: Vec<&str> = ROUTES
        .iter()
        .filter(|r| !r.requires_auth)
        .map(|r| r.pattern)
        .collect();
    assert_eq!(public, vec![LOGIN_PATH]);
}
