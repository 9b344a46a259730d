#![allow(clippy::unwrap_used)]
// Integration tests for `ProtocolServer` and `Account` using wiremock.

use secrecy::SecretString;
use url::Url;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use journalkit_api::{
    Account, Error, LoginPayload, ProtocolServer, ReachabilityState, ServerState, params,
};

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup() -> (MockServer, Account) {
    let server = MockServer::start().await;
    let base_url = Url::parse(&server.uri()).unwrap();
    let protocol = ProtocolServer::with_client(reqwest::Client::new(), base_url);
    (server, Account::new("frank", protocol))
}

fn flat(pairs: &[(&str, &str)]) -> String {
    pairs.iter().fold(String::new(), |mut body, (k, v)| {
        body.push_str(k);
        body.push('\n');
        body.push_str(v);
        body.push('\n');
        body
    })
}

fn secret(s: &str) -> SecretString {
    s.to_string().into()
}

async fn logged_in() -> (MockServer, Account) {
    let (server, account) = setup().await;
    account
        .server()
        .set_login_payload(LoginPayload::from_credentials("frank", &secret("pw")));
    (server, account)
}

// ── Login ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_login_success_caches_payload() {
    let (server, account) = setup().await;

    Mock::given(method("POST"))
        .and(path("/interface/flat"))
        .and(body_string_contains("mode=login"))
        .and(body_string_contains("user=frank"))
        .and(body_string_contains("password=pw"))
        .respond_with(ResponseTemplate::new(200).set_body_string(flat(&[
            ("success", "OK"),
            ("name", "Frank"),
            ("access_count", "1"),
            ("access_1", "knitting"),
            ("fastserver", "1"),
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let login = account.login(&secret("pw")).await.unwrap();

    assert_eq!(login.full_name.as_deref(), Some("Frank"));
    assert_eq!(login.shared_journals, vec!["knitting"]);
    assert!(account.is_logged_in());
    assert!(account.server().is_using_fast_servers());
}

#[tokio::test]
async fn test_login_rejected_leaves_cache_empty() {
    let (server, account) = setup().await;

    Mock::given(method("POST"))
        .and(path("/interface/flat"))
        .respond_with(ResponseTemplate::new(200).set_body_string(flat(&[
            ("success", "FAIL"),
            ("errmsg", "Invalid password"),
        ])))
        .mount(&server)
        .await;

    let result = account.login(&secret("wrong")).await;

    match result {
        Err(Error::Protocol { ref message }) => assert_eq!(message, "Invalid password"),
        other => panic!("expected Protocol error, got: {other:?}"),
    }
    assert!(!account.is_logged_in());
}

// ── Dispatch ────────────────────────────────────────────────────────

#[tokio::test]
async fn test_dispatch_requires_login() {
    let (_server, account) = setup().await;
    let result = account.dispatch("getevents", &params([("selecttype", "one")])).await;
    assert!(matches!(result, Err(Error::NotLoggedIn)), "{result:?}");
}

#[tokio::test]
async fn test_dispatch_sends_cached_login_and_version() {
    let (server, account) = logged_in().await;

    Mock::given(method("POST"))
        .and(path("/interface/flat"))
        .and(header("content-type", "application/x-www-form-urlencoded"))
        .and(body_string_contains("mode=getevents&ver=1&selecttype=one&itemid=42"))
        .and(body_string_contains("user=frank&auth_method=clear&password=pw"))
        .respond_with(ResponseTemplate::new(200).set_body_string(flat(&[
            ("success", "OK"),
            ("events_count", "1"),
            ("events_1_itemid", "42"),
            ("events_1_subject", "Hi"),
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let reply = account
        .dispatch("getevents", &params([("selecttype", "one"), ("itemid", "42")]))
        .await
        .unwrap();

    let events = reply["events"].as_list().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].as_record().unwrap()["subject"].as_str(), Some("Hi"));
}

#[tokio::test]
async fn test_fast_servers_send_cookie() {
    let (server, account) = logged_in().await;
    account.server().set_use_fast_servers(true);

    Mock::given(method("POST"))
        .and(header("cookie", "ljfastserver=1"))
        .respond_with(ResponseTemplate::new(200).set_body_string(flat(&[("success", "OK")])))
        .expect(1)
        .mount(&server)
        .await;

    account.dispatch("getdaycounts", &params::<&str, &str>([])).await.unwrap();
}

// ── Errors ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_server_error_is_protocol_error() {
    let (server, account) = logged_in().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string(flat(&[
            ("success", "FAIL"),
            ("errmsg", "Unknown method"),
        ])))
        .mount(&server)
        .await;

    let result = account.dispatch("nosuchmode", &params::<&str, &str>([])).await;
    assert!(matches!(result, Err(Error::Protocol { .. })), "{result:?}");
}

#[tokio::test]
async fn test_http_failure_is_transport_level() {
    let (server, account) = logged_in().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(502).set_body_string("Bad Gateway"))
        .mount(&server)
        .await;

    let result = account.server().send("getevents", &params::<&str, &str>([])).await;
    match result {
        Err(err) => {
            assert!(
                matches!(err, Error::Http { status: 502, .. }),
                "expected Http error, got: {err:?}"
            );
            assert!(err.is_transient());
        }
        Ok(reply) => panic!("expected failure, got: {reply:?}"),
    }
}

#[tokio::test]
async fn test_malformed_reply_is_parse_error() {
    let (server, account) = logged_in().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string(flat(&[
            ("success", "OK"),
            ("events_count", "two"),
        ])))
        .mount(&server)
        .await;

    let result = account.dispatch("getevents", &params::<&str, &str>([])).await;
    assert!(matches!(result, Err(Error::Parse { .. })), "{result:?}");
}

#[tokio::test]
async fn test_connection_refused_is_network_error() {
    let protocol = ProtocolServer::with_client(
        reqwest::Client::new(),
        Url::parse("http://127.0.0.1:1/").unwrap(),
    );
    let result = protocol.send("login", &params::<&str, &str>([])).await;
    match result {
        Err(err) => assert!(err.is_network(), "expected network error, got: {err:?}"),
        Ok(reply) => panic!("expected failure, got: {reply:?}"),
    }
}

// ── Reachability & persistence ──────────────────────────────────────

#[tokio::test]
async fn test_reachability_query_without_monitoring() {
    let (_server, account) = setup().await;

    assert_eq!(
        account.server().reachability_state(),
        ReachabilityState::Unknown
    );
    let flags = account.server().reachability().await.unwrap();

    assert_ne!(flags.bits(), 0);
    assert_eq!(
        account.server().reachability_state(),
        ReachabilityState::Reachable
    );
    assert!(!account.server().is_monitoring_reachability());
}

#[test]
fn test_server_state_serializes_to_toml() {
    let state = ServerState {
        url: Url::parse("https://www.journal.example/").unwrap(),
        use_fast_servers: true,
        login_payload: Some(LoginPayload::from_encoded("frank", "user=frank&password=pw")),
    };

    let text = toml::to_string(&state).unwrap();
    let restored: ServerState = toml::from_str(&text).unwrap();

    assert_eq!(restored.url, state.url);
    assert!(restored.use_fast_servers);
    assert_eq!(restored.login_payload.unwrap().username(), "frank");
}
