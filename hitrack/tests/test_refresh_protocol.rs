use hitrack::fake::{FakeTransport, RecordingNavigator};
use hitrack::notify::{Level, NotificationService};
use hitrack::storage::{MemoryStorage, TokenStorage, ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY};
use hitrack::{ApiClient, Error, ListParams, TokenStore};
use reqwest::Method;
use serde_json::json;
use std::sync::Arc;

struct Harness {
    client: ApiClient,
    fake: Arc<FakeTransport>,
    navigator: Arc<RecordingNavigator>,
    storage: Arc<MemoryStorage>,
}

fn harness(access: Option<&str>, refresh: Option<&str>) -> Harness {
    let fake = Arc::new(FakeTransport::new());
    let storage = Arc::new(MemoryStorage::with_tokens(access, refresh));
    let navigator = Arc::new(RecordingNavigator::new());
    let tokens = Arc::new(TokenStore::new(fake.clone(), storage.clone()).unwrap());
    let client = ApiClient::new(
        fake.clone(),
        tokens,
        navigator.clone(),
        Arc::new(NotificationService::new(8)),
    );
    Harness {
        client,
        fake,
        navigator,
        storage,
    }
}

fn empty_page() -> serde_json::Value {
    json!({"count": 0, "next": null, "previous": null, "results": []})
}

#[tokio::test]
async fn test_bearer_attached_when_token_held() {
    let h = harness(Some("access-1"), Some("refresh-1"));
    h.fake.respond(
        Method::GET,
        "stats/",
        200,
        json!({"repositories": 1, "images": 2, "vulnerabilities": 3, "components": 4}),
    );
    let stats = h.client.stats().await.unwrap();
    assert_eq!(stats.vulnerabilities, 3);

    let sent = h.fake.requests();
    assert_eq!(sent.len(), 1);
    assert_eq!(
        sent[0].headers[reqwest::header::AUTHORIZATION],
        "Bearer access-1"
    );
}

#[tokio::test]
async fn test_no_header_without_token() {
    let h = harness(None, None);
    h.fake.respond(Method::GET, "images/", 200, empty_page());
    h.client.list_images(&ListParams::new()).await.unwrap();
    let sent = h.fake.requests();
    assert!(sent[0].headers.get(reqwest::header::AUTHORIZATION).is_none());
}

#[tokio::test]
async fn test_refresh_then_replay() {
    let h = harness(Some("stale"), Some("refresh-1"));
    h.fake
        .respond(
            Method::GET,
            "images/",
            401,
            json!({
                "detail": "Given token not valid for any token type",
                "code": "token_not_valid",
            }),
        )
        .respond(
            Method::GET,
            "images/",
            200,
            json!({"count": 1, "next": null, "previous": null, "results": [{
                "uuid": "i1",
                "name": "team/api:1.2",
                "digest": "sha256:ab",
                "scan_status": "success",
                "has_sbom": true,
                "findings": 4,
                "unique_findings": 3,
                "components_count": 120,
                "updated_at": "2024-05-20T10:00:00Z"
            }]}),
        );
    h.fake
        .respond(Method::POST, "auth/token/refresh/", 200, json!({"access": "fresh"}));

    let page = h
        .client
        .list_images(&ListParams::new().search("api"))
        .await
        .unwrap();
    assert_eq!(page.results[0].name, "team/api:1.2");

    let refreshes = h.fake.requests_to("auth/token/refresh/");
    assert_eq!(refreshes.len(), 1);
    assert_eq!(refreshes[0].body, Some(json!({"refresh": "refresh-1"})));
    assert_eq!(refreshes[0].bearer(), None);

    let images = h.fake.requests_to("images/");
    assert_eq!(images.len(), 2);
    assert_eq!(images[0].bearer(), Some("stale"));
    assert_eq!(images[1].bearer(), Some("fresh"));
    assert!(images[1].retried);
    assert_eq!(images[1].query, images[0].query);

    assert_eq!(
        h.storage.get(ACCESS_TOKEN_KEY).unwrap().as_deref(),
        Some("fresh")
    );
    assert_eq!(
        h.storage.get(REFRESH_TOKEN_KEY).unwrap().as_deref(),
        Some("refresh-1")
    );
    assert_eq!(h.client.tokens().access_token().as_deref(), Some("fresh"));
    assert!(h.navigator.history().is_empty());
}

#[tokio::test]
async fn test_refresh_failure_expires_session() {
    let h = harness(Some("stale"), Some("refresh-1"));
    h.fake
        .respond(Method::GET, "images/", 401, json!({"detail": "expired"}));
    h.fake.respond(
        Method::POST,
        "auth/token/refresh/",
        401,
        json!({"detail": "Token is invalid or expired", "code": "token_not_valid"}),
    );

    let err = h.client.list_images(&ListParams::new()).await.unwrap_err();
    match err {
        Error::SessionExpired(inner) => match &*inner {
            Error::Api { status, message } => {
                assert_eq!(*status, 401);
                assert_eq!(message, "Token is invalid or expired");
            }
            other => panic!("unexpected refresh error: {other:?}"),
        },
        other => panic!("expected SessionExpired, got {other:?}"),
    }

    assert_eq!(h.fake.requests_to("images/").len(), 1);
    assert_eq!(h.storage.get(ACCESS_TOKEN_KEY).unwrap(), None);
    assert_eq!(h.storage.get(REFRESH_TOKEN_KEY).unwrap(), None);
    assert!(!h.client.tokens().is_authenticated());
    assert_eq!(h.navigator.history(), vec!["/login".to_string()]);
    assert!(h
        .client
        .notifications()
        .pending()
        .iter()
        .any(|n| n.level == Level::Warning));
}

#[tokio::test]
async fn test_refresh_transport_failure_expires_session() {
    let h = harness(Some("stale"), Some("refresh-1"));
    h.fake.respond(Method::GET, "stats/", 401, json!({}));
    h.fake
        .fail(Method::POST, "auth/token/refresh/", "connection refused");

    let err = h.client.stats().await.unwrap_err();
    assert!(matches!(
        err,
        Error::SessionExpired(ref inner) if matches!(**inner, Error::Transport(_))
    ));
    assert_eq!(h.navigator.history(), vec!["/login".to_string()]);
}

#[tokio::test]
async fn test_replayed_401_is_final() {
    let h = harness(Some("stale"), Some("refresh-1"));
    h.fake
        .respond(Method::GET, "images/i1/", 401, json!({"detail": "first"}))
        .respond(Method::GET, "images/i1/", 401, json!({"detail": "still no"}));
    h.fake
        .respond(Method::POST, "auth/token/refresh/", 200, json!({"access": "fresh"}));

    let err = h.client.get_image("i1").await.unwrap_err();
    match err {
        Error::Api { status, message } => {
            assert_eq!(status, 401);
            assert_eq!(message, "still no");
        }
        other => panic!("expected final 401, got {other:?}"),
    }
    assert_eq!(h.fake.requests_to("auth/token/refresh/").len(), 1);
    assert_eq!(h.fake.requests_to("images/i1/").len(), 2);
    // the refresh itself worked, so the session stays
    assert!(h.client.tokens().is_authenticated());
    assert!(h.navigator.history().is_empty());
}

#[tokio::test]
async fn test_no_refresh_token_fails_with_original_error() {
    let h = harness(Some("stale"), None);
    h.fake.respond(
        Method::GET,
        "components/",
        401,
        json!({"detail": "Given token not valid for any token type"}),
    );

    let err = h
        .client
        .list_components(&ListParams::new())
        .await
        .unwrap_err();
    assert!(err.is_unauthorized());
    assert_eq!(
        err.to_string(),
        "API error (401): Given token not valid for any token type"
    );
    assert!(h.fake.requests_to("auth/token/refresh/").is_empty());
    assert!(!h.client.tokens().is_authenticated());
    assert_eq!(h.navigator.history(), vec!["/login".to_string()]);
}

#[tokio::test]
async fn test_refresh_token_read_from_storage() {
    // the store was loaded without a refresh token, but another process has since written one
    let h = harness(Some("stale"), None);
    h.storage.set(REFRESH_TOKEN_KEY, "written-later").unwrap();
    h.fake
        .respond(Method::GET, "stats/", 401, json!({}))
        .respond(Method::GET, "stats/", 200, json!({}));
    h.fake
        .respond(Method::POST, "auth/token/refresh/", 200, json!({"access": "fresh"}));

    h.client.stats().await.unwrap();
    assert_eq!(
        h.fake.requests_to("auth/token/refresh/")[0].body,
        Some(json!({"refresh": "written-later"}))
    );
}

#[tokio::test]
async fn test_other_failures_propagate() {
    let h = harness(Some("access-1"), Some("refresh-1"));
    h.fake.respond(
        Method::POST,
        "repositories/r1/scan_tags/",
        409,
        json!({"error": "Repository is already being scanned"}),
    );

    let err = h.client.scan_repository_tags("r1").await.unwrap_err();
    assert_eq!(err.status(), Some(409));
    assert_eq!(h.fake.requests().len(), 1);
    let pending = h.client.notifications().pending();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].level, Level::Error);
    assert_eq!(pending[0].message, "Repository is already being scanned");
    assert!(h.client.tokens().is_authenticated());
}

#[tokio::test]
async fn test_concurrent_401s_share_one_refresh() {
    let h = harness(Some("stale"), Some("refresh-1"));
    h.fake
        .respond(Method::GET, "images/", 401, json!({}))
        .respond(Method::GET, "images/", 401, json!({}))
        .respond(Method::GET, "images/", 200, empty_page());
    h.fake
        .respond(Method::POST, "auth/token/refresh/", 200, json!({"access": "fresh"}));

    let params = ListParams::new();
    let (a, b) = tokio::join!(
        h.client.list_images(&params),
        h.client.list_images(&params)
    );
    a.unwrap();
    b.unwrap();

    assert_eq!(h.fake.requests_to("auth/token/refresh/").len(), 1);
    let images = h.fake.requests_to("images/");
    assert_eq!(images.len(), 4);
    assert!(images[2..].iter().all(|r| r.bearer() == Some("fresh")));
}

#[tokio::test]
async fn test_concurrent_401s_share_one_failed_refresh() {
    let h = harness(Some("stale"), Some("refresh-1"));
    h.fake
        .respond(Method::GET, "images/", 401, json!({"detail": "expired"}));
    h.fake.respond(
        Method::POST,
        "auth/token/refresh/",
        401,
        json!({"detail": "Token is invalid or expired", "code": "token_not_valid"}),
    );

    let params = ListParams::new();
    let (a, b) = tokio::join!(
        h.client.list_images(&params),
        h.client.list_images(&params)
    );
    for err in [a.unwrap_err(), b.unwrap_err()] {
        match err {
            Error::SessionExpired(inner) => assert_eq!(inner.status(), Some(401)),
            other => panic!("expected SessionExpired, got {other:?}"),
        }
    }

    assert_eq!(h.fake.requests_to("auth/token/refresh/").len(), 1);
    assert_eq!(h.fake.requests_to("images/").len(), 2);
    assert_eq!(h.navigator.history(), vec!["/login".to_string()]);
    let warnings = h
        .client
        .notifications()
        .pending()
        .into_iter()
        .filter(|n| n.level == Level::Warning)
        .count();
    assert_eq!(warnings, 1);
}

#[tokio::test]
async fn test_concurrent_401s_without_refresh_token_expire_once() {
    let h = harness(Some("stale"), None);
    h.fake
        .respond(Method::GET, "stats/", 401, json!({"detail": "expired"}));

    let (a, b) = tokio::join!(h.client.stats(), h.client.stats());
    assert!(a.unwrap_err().is_unauthorized());
    assert!(b.unwrap_err().is_unauthorized());
    assert_eq!(h.navigator.history(), vec!["/login".to_string()]);
}

#[tokio::test]
async fn test_token_refreshed_elsewhere_is_installed() {
    let h = harness(Some("stale"), Some("refresh-1"));
    // another process refreshed after this one loaded its session
    h.storage
        .set(ACCESS_TOKEN_KEY, "fresh-from-elsewhere")
        .unwrap();
    h.fake
        .respond(Method::GET, "stats/", 401, json!({}))
        .respond(Method::GET, "stats/", 200, json!({}));

    h.client.stats().await.unwrap();
    assert!(h.fake.requests_to("auth/token/refresh/").is_empty());
    let stats = h.fake.requests_to("stats/");
    assert_eq!(stats[0].bearer(), Some("stale"));
    assert_eq!(stats[1].bearer(), Some("fresh-from-elsewhere"));
    assert_eq!(
        h.client.tokens().access_token().as_deref(),
        Some("fresh-from-elsewhere")
    );

    // later requests start from the installed token
    h.client.stats().await.unwrap();
    assert_eq!(
        h.fake.requests_to("stats/")[2].bearer(),
        Some("fresh-from-elsewhere")
    );
}

#[tokio::test]
async fn test_auth_endpoints_not_intercepted() {
    let h = harness(Some("access-1"), Some("refresh-1"));
    h.fake.respond(
        Method::POST,
        "auth/token/",
        401,
        json!({"detail": "No active account found with the given credentials"}),
    );
    let err = h
        .client
        .tokens()
        .authenticate("alice", "wrong")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Authentication(_)));
    assert!(h.fake.requests_to("auth/token/refresh/").is_empty());
    assert!(h.navigator.history().is_empty());
}

#[tokio::test]
async fn test_tag_images_are_paginated() {
    let h = harness(Some("access-1"), Some("refresh-1"));
    h.fake.respond(
        Method::GET,
        "repository-tags/t1/images/",
        200,
        json!({
            "count": 21,
            "next": "http://localhost:8000/repository-tags/t1/images/?page=2",
            "previous": null,
            "results": [{
                "uuid": "i1",
                "name": "team/api:1.2",
                "digest": "sha256:9b2c",
                "scan_status": "success",
                "has_sbom": true,
                "findings": 14,
                "unique_findings": 11,
                "components_count": 213,
                "updated_at": "2024-03-08T09:00:00Z"
            }]
        }),
    );

    let page = h
        .client
        .tag_images("t1", &ListParams::new().page(1))
        .await
        .unwrap();
    assert_eq!(page.count, 21);
    assert!(page.has_next());
    assert_eq!(page.results[0].components_count, 213);

    let sent = h.fake.requests_to("repository-tags/t1/images/");
    assert_eq!(
        sent[0].query,
        vec![
            ("page".to_string(), "1".to_string()),
            ("ordering".to_string(), "-updated_at".to_string()),
        ]
    );
}
