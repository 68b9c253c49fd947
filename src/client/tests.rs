use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use serde_json::json;
use tokio::runtime::Runtime;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

use super::*;
use crate::error::ErrorKind;
use crate::token::{AccessToken, TOKEN_TTL};

const TOKEN_PATH: &str = "/oauth2/aus3up3nz0N133c0V417/v1/token";
const API: &str = "/bdds/bdds-bff-service/prod/api";
const ISSUED_TOKEN: &str = "test-token-12345";
const FILE_BODY: &[u8] = b"test-file-content";

/// A mock server driven from blocking test code.
///
/// The blocking reqwest client must not run inside an async context, so
/// the runtime is only entered to set up mocks and inspect requests.
struct Harness {
    server: MockServer,
    rt: Runtime,
}

impl Harness {
    fn start() -> Self {
        let rt = Runtime::new().unwrap();
        let server = rt.block_on(MockServer::start());
        Self { server, rt }
    }

    fn mount(&self, mock: Mock) {
        self.rt.block_on(mock.mount(&self.server));
    }

    fn requests_to(&self, p: &str) -> Vec<Request> {
        self.rt
            .block_on(self.server.received_requests())
            .unwrap_or_default()
            .into_iter()
            .filter(|r| r.url.path() == p)
            .collect()
    }

    fn config(&self) -> ClientConfig {
        ClientConfig::default()
            .with_base_url(self.server.uri())
            .with_auth_url(format!("{}{}", self.server.uri(), TOKEN_PATH))
            .with_client_id("test-client")
            .with_user_agent("Test/1.0")
            .with_retry_delay(Duration::ZERO)
            .with_timeout(Duration::from_secs(5))
    }

    fn anonymous_client(&self) -> Client {
        Client::new(self.config()).unwrap()
    }

    fn authed_client(&self) -> Client {
        Client::new(self.config().with_credentials("test-user", "test-pass")).unwrap()
    }

    fn mount_token_endpoint(&self, expected_calls: u64) {
        self.mount(
            Mock::given(method("POST"))
                .and(path(TOKEN_PATH))
                .and(header("authorization", "Basic test-client"))
                .and(header("content-type", "application/x-www-form-urlencoded"))
                .and(body_string_contains("grant_type=password"))
                .and(body_string_contains("username=test-user"))
                .and(body_string_contains("password=test-pass"))
                .and(body_string_contains("scope=openid"))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                    "access_token": ISSUED_TOKEN,
                    "token_type": "Bearer",
                    "expires_in": 3600,
                    "scope": "openid",
                    "id_token": "test-id-token"
                })))
                .expect(expected_calls),
        );
    }

    fn mount_catalogue(&self) {
        self.mount(
            Mock::given(method("GET"))
                .and(path(format!("{API}/products/")))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                    {"id": 3, "name": "EP DocDB front file",
                     "description": "EP DocDB front file - bibliographic data"},
                    {"id": 4, "name": "EP full-text data - front file",
                     "description": "EP full-text data - front file"},
                    {"id": 14, "name": "EP DocDB back file",
                     "description": "EP DocDB back file - bibliographic data"}
                ]))),
        );
        self.mount(
            Mock::given(method("GET"))
                .and(path(format!("{API}/products/3")))
                .respond_with(ResponseTemplate::new(200).set_body_json(product_three())),
        );
        self.mount(
            Mock::given(method("GET"))
                .and(path(format!("{API}/products/999")))
                .respond_with(
                    ResponseTemplate::new(404).set_body_string(r#"{"error":"product not found"}"#),
                ),
        );
        self.mount(
            Mock::given(method("GET"))
                .and(path(format!(
                    "{API}/products/3/delivery/12345/file/67890/download"
                )))
                .respond_with(
                    ResponseTemplate::new(200)
                        .insert_header("content-type", "application/octet-stream")
                        .set_body_bytes(FILE_BODY),
                ),
        );
    }
}

fn product_three() -> serde_json::Value {
    json!({
        "id": 3,
        "name": "EP DocDB front file",
        "description": "EP DocDB front file - bibliographic data",
        "deliveries": [
            {
                "deliveryId": 12340,
                "deliveryName": "2024-10-14",
                "deliveryPublicationDatetime": "2024-10-14T10:30:00Z",
                "deliveryExpiryDatetime": null,
                "files": [{
                    "fileId": 67880,
                    "fileName": "EP_docdb_20241014.zip",
                    "fileSize": "1.4 GB",
                    "fileChecksum": "b2c3d4e5f6a1",
                    "filePublicationDatetime": "2024-10-14T10:30:00Z"
                }]
            },
            {
                "deliveryId": 12345,
                "deliveryName": "2024-10-15",
                "deliveryPublicationDatetime": "2024-10-15T10:30:00Z",
                "deliveryExpiryDatetime": "2024-11-15T10:30:00Z",
                "files": [{
                    "fileId": 67890,
                    "fileName": "EP_docdb_20241015.zip",
                    "fileSize": "1.5 GB",
                    "fileChecksum": "a1b2c3d4e5f6",
                    "filePublicationDatetime": "2024-10-15T10:30:00Z"
                }]
            }
        ]
    })
}

fn header_of<'a>(req: &'a Request, name: &str) -> Option<&'a str> {
    req.headers.get(name).and_then(|v| v.to_str().ok())
}

#[test]
fn client_is_send_and_sync() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<Client>();
}

#[test]
fn anonymous_requests_carry_user_agent_and_no_authorization() {
    let h = Harness::start();
    h.mount_token_endpoint(0);
    h.mount_catalogue();
    let client = h.anonymous_client();
    let ctx = CallContext::new();

    let products = client.list_products(&ctx).unwrap();
    assert_eq!(products.len(), 3);
    assert_eq!(products[0].id, 3);
    assert_eq!(products[0].name, "EP DocDB front file");
    client.get_product(&ctx, 3).unwrap();

    let sent: Vec<Request> = [format!("{API}/products/"), format!("{API}/products/3")]
        .iter()
        .flat_map(|p| h.requests_to(p))
        .collect();
    assert_eq!(sent.len(), 2);
    for req in &sent {
        assert_eq!(header_of(req, "user-agent"), Some("Test/1.0"));
        assert!(header_of(req, "authorization").is_none());
    }
    assert!(h.requests_to(TOKEN_PATH).is_empty());
}

#[test]
fn token_is_acquired_once_and_reused() {
    let h = Harness::start();
    h.mount_token_endpoint(1);
    h.mount_catalogue();
    let client = h.authed_client();
    let ctx = CallContext::new();

    client.list_products(&ctx).unwrap();
    client.list_products(&ctx).unwrap();
    client.get_product(&ctx, 3).unwrap();

    let sent = h.requests_to(&format!("{API}/products/"));
    assert_eq!(sent.len(), 2);
    let expected = format!("Bearer {ISSUED_TOKEN}");
    for req in &sent {
        assert_eq!(header_of(req, "authorization"), Some(expected.as_str()));
        assert_eq!(header_of(req, "user-agent"), Some("Test/1.0"));
    }
    assert_eq!(h.requests_to(TOKEN_PATH).len(), 1);
}

#[test]
fn token_inside_refresh_buffer_is_renewed_first() {
    let h = Harness::start();
    h.mount_token_endpoint(1);
    h.mount_catalogue();
    let client = h.authed_client();
    client.tokens.seed(AccessToken::new(
        "old-token".into(),
        Instant::now() + Duration::from_secs(4 * 60),
    ));

    client.list_products(&CallContext::new()).unwrap();

    let sent = h.requests_to(&format!("{API}/products/"));
    assert_eq!(sent.len(), 1);
    assert_eq!(
        header_of(&sent[0], "authorization"),
        Some(format!("Bearer {ISSUED_TOKEN}").as_str())
    );
    assert_eq!(h.requests_to(TOKEN_PATH).len(), 1);
}

#[test]
fn fresh_token_skips_authentication() {
    let h = Harness::start();
    h.mount_token_endpoint(0);
    h.mount_catalogue();
    let client = h.authed_client();
    client
        .tokens
        .seed(AccessToken::new("cached-token".into(), Instant::now() + TOKEN_TTL));

    client.list_products(&CallContext::new()).unwrap();

    let sent = h.requests_to(&format!("{API}/products/"));
    assert_eq!(header_of(&sent[0], "authorization"), Some("Bearer cached-token"));
    assert!(h.requests_to(TOKEN_PATH).is_empty());
}

#[test]
fn unauthorized_response_forces_reauthentication() {
    let h = Harness::start();
    h.mount_token_endpoint(1);
    h.mount(
        Mock::given(method("GET"))
            .and(path(format!("{API}/products/")))
            .respond_with(ResponseTemplate::new(401).set_body_string(r#"{"error":"unauthorized"}"#))
            .up_to_n_times(1),
    );
    h.mount_catalogue();
    let client = h.authed_client();
    client
        .tokens
        .seed(AccessToken::new("revoked-token".into(), Instant::now() + TOKEN_TTL));

    let products = client.list_products(&CallContext::new()).unwrap();
    assert_eq!(products.len(), 3);

    let sent = h.requests_to(&format!("{API}/products/"));
    assert_eq!(sent.len(), 2);
    assert_eq!(header_of(&sent[0], "authorization"), Some("Bearer revoked-token"));
    assert_eq!(
        header_of(&sent[1], "authorization"),
        Some(format!("Bearer {ISSUED_TOKEN}").as_str())
    );
}

#[test]
fn retries_stop_after_max_retries_plus_one() {
    let h = Harness::start();
    h.mount(
        Mock::given(method("GET"))
            .and(path(format!("{API}/products/")))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .expect(3),
    );
    let client = Client::new(h.config().with_max_retries(2)).unwrap();

    let err = client.list_products(&CallContext::new()).unwrap_err();
    match &err {
        Error::RetriesExhausted { attempts, source } => {
            assert_eq!(*attempts, 3);
            assert!(matches!(
                source.as_ref(),
                Error::Status { status: 503, body } if body == "maintenance"
            ));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(err.kind(), ErrorKind::Transport);
    assert_eq!(err.status(), Some(503));
}

#[test]
fn get_product_maps_deliveries_and_files() {
    let h = Harness::start();
    h.mount_catalogue();
    let client = h.anonymous_client();

    let product = client.get_product(&CallContext::new(), 3).unwrap();
    assert_eq!(product.id, 3);
    assert_eq!(product.deliveries.len(), 2);

    let delivery = &product.deliveries[1];
    assert_eq!(delivery.id, 12345);
    assert_eq!(delivery.name, "2024-10-15");
    assert!(delivery.expires_at.is_some());
    assert_eq!(delivery.files.len(), 1);
    assert_eq!(delivery.files[0].name, "EP_docdb_20241015.zip");
    assert_eq!(delivery.files[0].size, "1.5 GB");
    assert_eq!(delivery.files[0].checksum, "a1b2c3d4e5f6");
    assert!(product.deliveries[0].expires_at.is_none());
}

#[test]
fn missing_product_is_not_found_without_retrying() {
    let h = Harness::start();
    h.mount_catalogue();
    let client = Client::new(h.config().with_max_retries(3)).unwrap();

    let err = client.get_product(&CallContext::new(), 999).unwrap_err();
    match &err {
        Error::NotFound { resource, id } => {
            assert_eq!(*resource, "product");
            assert_eq!(id, "999");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.is_not_found());
    assert_eq!(h.requests_to(&format!("{API}/products/999")).len(), 1);
}

#[test]
fn find_product_by_name_ignores_case_but_not_partial_names() {
    let h = Harness::start();
    h.mount_catalogue();
    let client = h.anonymous_client();
    let ctx = CallContext::new();

    let product = client.find_product_by_name(&ctx, "ep docdb front file").unwrap();
    assert_eq!(product.id, 3);

    let err = client.find_product_by_name(&ctx, "EP DocDB").unwrap_err();
    assert!(matches!(
        err,
        Error::NotFound { resource: "product", ref id } if id == "EP DocDB"
    ));
}

#[test]
fn latest_delivery_has_the_newest_publication_time() {
    let h = Harness::start();
    h.mount_catalogue();
    let client = h.anonymous_client();

    let delivery = client.get_latest_delivery(&CallContext::new(), 3).unwrap();
    assert_eq!(delivery.id, 12345);
    assert_eq!(delivery.name, "2024-10-15");
}

#[test]
fn latest_delivery_of_empty_product_is_not_found() {
    let h = Harness::start();
    h.mount(
        Mock::given(method("GET"))
            .and(path(format!("{API}/products/7")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": 7, "name": "Empty", "description": "", "deliveries": []
            }))),
    );
    let client = h.anonymous_client();

    let err = client.get_latest_delivery(&CallContext::new(), 7).unwrap_err();
    assert!(matches!(err, Error::NotFound { resource: "delivery", .. }));
}

#[test]
fn download_streams_body_into_sink() {
    let h = Harness::start();
    h.mount_catalogue();
    let client = h.anonymous_client();

    let mut buf = Vec::new();
    let written = client
        .download_file(&CallContext::new(), 3, 12345, 67890, &mut buf)
        .unwrap();
    assert_eq!(written, FILE_BODY.len() as u64);
    assert_eq!(buf, FILE_BODY);
}

#[test]
fn download_progress_reports_known_total() {
    let h = Harness::start();
    h.mount_catalogue();
    let client = h.anonymous_client();

    let mut buf = Vec::new();
    let mut reports = Vec::new();
    client
        .download_file_with_progress(&CallContext::new(), 3, 12345, 67890, &mut buf, |read, total| {
            reports.push((read, total))
        })
        .unwrap();

    let n = FILE_BODY.len() as u64;
    assert!(!reports.is_empty());
    assert_eq!(reports.last().copied(), Some((n, Some(n))));
    assert!(reports.windows(2).all(|w| w[0].0 <= w[1].0));
}

#[test]
fn missing_file_is_not_found() {
    let h = Harness::start();
    h.mount(
        Mock::given(method("GET"))
            .and(path(format!("{API}/products/3/delivery/12345/file/1/download")))
            .respond_with(ResponseTemplate::new(404))
            .expect(1),
    );
    let client = h.anonymous_client();

    let mut sink = Vec::new();
    let err = client
        .download_file(&CallContext::new(), 3, 12345, 1, &mut sink)
        .unwrap_err();
    assert!(matches!(
        err,
        Error::NotFound { resource: "file", ref id } if id == "3/12345/1"
    ));
}

#[test]
fn download_to_path_creates_parent_directories() {
    let h = Harness::start();
    h.mount_catalogue();
    let client = h.anonymous_client();
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("nested").join("EP_docdb_20241015.zip");

    let saved = client
        .download_file_to_path(&CallContext::new(), 3, 12345, 67890, &target)
        .unwrap();
    assert_eq!(saved, target);
    assert_eq!(std::fs::read(&target).unwrap(), FILE_BODY);
}

#[test]
fn retried_download_to_path_keeps_only_the_last_body() {
    let h = Harness::start();
    let url = format!("{API}/products/3/delivery/12345/file/67890/download");
    h.mount(
        Mock::given(method("GET"))
            .and(path(url.clone()))
            .respond_with(ResponseTemplate::new(500).set_body_string("partial"))
            .up_to_n_times(1),
    );
    h.mount_catalogue();
    let client = h.anonymous_client();
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("file.zip");
    std::fs::write(&target, b"stale bytes from an earlier run").unwrap();

    client
        .download_file_to_path(&CallContext::new(), 3, 12345, 67890, &target)
        .unwrap();
    assert_eq!(std::fs::read(&target).unwrap(), FILE_BODY);
    assert_eq!(h.requests_to(&url).len(), 2);
}

#[test]
fn failed_authentication_surfaces_status_and_body() {
    let h = Harness::start();
    h.mount(
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .respond_with(ResponseTemplate::new(400).set_body_string(r#"{"error":"invalid_grant"}"#)),
    );
    h.mount(
        Mock::given(method("GET"))
            .and(path(format!("{API}/products/")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(0),
    );
    let client = Client::new(
        h.config()
            .with_credentials("test-user", "test-pass")
            .with_max_retries(0),
    )
    .unwrap();

    let err = client.list_products(&CallContext::new()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authentication);
    match err.root() {
        Error::Authentication { status, body } => {
            assert_eq!(*status, 400);
            assert!(body.contains("invalid_grant"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn empty_success_body_is_an_error() {
    let h = Harness::start();
    h.mount(
        Mock::given(method("GET"))
            .and(path(format!("{API}/products/")))
            .respond_with(ResponseTemplate::new(200)),
    );
    let client = Client::new(h.config().with_max_retries(0)).unwrap();

    let err = client.list_products(&CallContext::new()).unwrap_err();
    assert!(matches!(err.root(), Error::EmptyResponse { .. }));
}

#[test]
fn null_success_body_is_an_error() {
    let h = Harness::start();
    h.mount(
        Mock::given(method("GET"))
            .and(path(format!("{API}/products/3")))
            .respond_with(ResponseTemplate::new(200).set_body_string("null")),
    );
    let client = Client::new(h.config().with_max_retries(0)).unwrap();

    let err = client.get_product(&CallContext::new(), 3).unwrap_err();
    assert!(matches!(err.root(), Error::EmptyResponse { .. }));
}

#[test]
fn cancelled_context_sends_nothing() {
    let h = Harness::start();
    h.mount_token_endpoint(0);
    h.mount_catalogue();
    let client = h.authed_client();
    let ctx = CallContext::new();
    ctx.cancel();

    let err = client.list_products(&ctx).unwrap_err();
    assert!(matches!(err, Error::Cancelled));
    assert!(h.requests_to(&format!("{API}/products/")).is_empty());
}

#[test]
fn deadline_aborts_slow_request() {
    let h = Harness::start();
    h.mount(
        Mock::given(method("GET"))
            .and(path(format!("{API}/products/")))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!([]))
                    .set_delay(Duration::from_secs(3)),
            ),
    );
    let client = h.anonymous_client();
    let ctx = CallContext::new().with_timeout(Duration::from_millis(200));

    let started = Instant::now();
    let err = client.list_products(&ctx).unwrap_err();
    assert!(matches!(err, Error::DeadlineExceeded), "got {err}");
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[test]
fn concurrent_callers_share_one_authentication() {
    let h = Harness::start();
    h.mount_token_endpoint(1);
    h.mount_catalogue();
    let client = Arc::new(h.authed_client());

    thread::scope(|s| {
        for _ in 0..4 {
            let client = Arc::clone(&client);
            s.spawn(move || client.list_products(&CallContext::new()).unwrap());
        }
    });

    assert_eq!(h.requests_to(&format!("{API}/products/")).len(), 4);
    assert_eq!(h.requests_to(TOKEN_PATH).len(), 1);
}

#[test]
fn cancel_aborts_request_in_flight() {
    let h = Harness::start();
    h.mount(
        Mock::given(method("GET"))
            .and(path(format!("{API}/products/")))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!([]))
                    .set_delay(Duration::from_secs(3)),
            ),
    );
    let client = h.anonymous_client();
    let ctx = CallContext::new();
    let remote = ctx.clone();

    let started = Instant::now();
    let result = thread::scope(|s| {
        s.spawn(move || {
            thread::sleep(Duration::from_millis(100));
            remote.cancel();
        });
        client.list_products(&ctx)
    });
    assert!(matches!(result, Err(Error::Cancelled)), "got {result:?}");
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[test]
fn cancel_aborts_download_in_flight() {
    let h = Harness::start();
    h.mount(
        Mock::given(method("GET"))
            .and(path(format!("{API}/products/3/delivery/12345/file/67890/download")))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(FILE_BODY)
                    .set_delay(Duration::from_secs(3)),
            ),
    );
    let client = h.anonymous_client();
    let ctx = CallContext::new();
    let remote = ctx.clone();

    let mut sink = Vec::new();
    let started = Instant::now();
    let result = thread::scope(|s| {
        s.spawn(move || {
            thread::sleep(Duration::from_millis(100));
            remote.cancel();
        });
        client.download_file(&ctx, 3, 12345, 67890, &mut sink)
    });
    assert!(matches!(result, Err(Error::Cancelled)), "got {result:?}");
    assert!(sink.is_empty());
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[test]
fn cancel_aborts_token_exchange_in_flight() {
    let h = Harness::start();
    h.mount(
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"access_token": ISSUED_TOKEN}))
                    .set_delay(Duration::from_secs(3)),
            ),
    );
    h.mount_catalogue();
    let client = h.authed_client();
    let ctx = CallContext::new();
    let remote = ctx.clone();

    let started = Instant::now();
    let result = thread::scope(|s| {
        s.spawn(move || {
            thread::sleep(Duration::from_millis(100));
            remote.cancel();
        });
        client.list_products(&ctx)
    });
    assert!(matches!(result, Err(Error::Cancelled)), "got {result:?}");
    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(client.tokens.cached().is_none());
    assert!(h.requests_to(&format!("{API}/products/")).is_empty());
}

#[test]
fn deadline_is_reported_without_retry_wrapper() {
    let h = Harness::start();
    h.mount(
        Mock::given(method("GET"))
            .and(path(format!("{API}/products/3")))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(product_three())
                    .set_delay(Duration::from_secs(3)),
            ),
    );
    let client = Client::new(h.config().with_max_retries(0)).unwrap();
    let ctx = CallContext::new().with_timeout(Duration::from_millis(200));

    let err = client.get_product(&ctx, 3).unwrap_err();
    assert!(matches!(err, Error::DeadlineExceeded), "got {err}");
}

#[test]
fn waiting_for_another_callers_token_honours_own_deadline() {
    let h = Harness::start();
    h.mount(
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"access_token": ISSUED_TOKEN}))
                    .set_delay(Duration::from_secs(2)),
            )
            .expect(1),
    );
    h.mount_catalogue();
    let client = h.authed_client();

    thread::scope(|s| {
        let leader = s.spawn(|| client.list_products(&CallContext::new()));
        thread::sleep(Duration::from_millis(200));

        let ctx = CallContext::new().with_timeout(Duration::from_millis(300));
        let started = Instant::now();
        let err = client.list_products(&ctx).unwrap_err();
        assert!(matches!(err, Error::DeadlineExceeded), "got {err}");
        assert!(started.elapsed() < Duration::from_secs(1));

        assert_eq!(leader.join().unwrap().unwrap().len(), 3);
    });
    assert_eq!(h.requests_to(TOKEN_PATH).len(), 1);
}

#[test]
fn failed_refresh_keeps_previous_token() {
    let h = Harness::start();
    h.mount(
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .respond_with(ResponseTemplate::new(500).set_body_string("identity provider down"))
            .expect(1),
    );
    let client = Client::new(
        h.config()
            .with_credentials("test-user", "test-pass")
            .with_max_retries(0),
    )
    .unwrap();
    client.tokens.seed(AccessToken::new(
        "stale-token".into(),
        Instant::now() + Duration::from_secs(60),
    ));

    let err = client.list_products(&CallContext::new()).unwrap_err();
    assert!(
        matches!(err.root(), Error::Authentication { status: 500, .. }),
        "got {err}"
    );
    let kept = client.tokens.cached().map(|t| t.value().to_string());
    assert_eq!(kept.as_deref(), Some("stale-token"));
    assert!(h.requests_to(&format!("{API}/products/")).is_empty());
}

#[test]
fn has_credentials_reflects_configuration_only() {
    let h = Harness::start();
    h.mount_token_endpoint(0);
    assert!(h.authed_client().has_credentials());
    assert!(!h.anonymous_client().has_credentials());
}
