//! End-to-end scenarios against a mock Creatio environment.
//!
//! Everything here runs against wiremock: login, probe, token, OData and
//! report endpoints are all simulated, so the suite needs no credentials
//! and no network.

use std::path::PathBuf;

use tempfile::TempDir;
use wiremock::matchers::{body_json, header, method, path, path_regex, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use creatio_api::auth::{CredentialPayload, CredentialStore, OAuthToken, SecretCipher};
use creatio_api::odata::{AuthOptions, CreatioClient, ErrorKind, QueryOptions};

const LOGIN_PATH: &str = "/ServiceModel/AuthService.svc/Login";
const PROBE_PATH: &str = "/0/odata/Account/$count";

const STORE_KEY: [u8; 32] = [0x5C; 32];

fn test_client(server: &MockServer, dir: &TempDir) -> CreatioClient {
    CreatioClient::builder(server.uri())
        .sessions_file(dir.path().join("sessions.bin"))
        .encryption_key(STORE_KEY)
        .build()
        .unwrap()
}

/// Direct handle on the same store file the client uses.
fn raw_store(dir: &TempDir) -> CredentialStore {
    CredentialStore::new(
        dir.path().join("sessions.bin"),
        Some(SecretCipher::new(&STORE_KEY).unwrap()),
    )
}

fn session_payload(pairs: &[(&str, &str)]) -> CredentialPayload {
    CredentialPayload::Session(
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
    )
}

async fn mount_login_success(server: &MockServer, expected_calls: u64) {
    Mock::given(method("POST"))
        .and(path(LOGIN_PATH))
        .and(body_json(serde_json::json!({
            "UserName": "supervisor",
            "UserPassword": "secret",
        })))
        .respond_with(
            // append keeps both Set-Cookie headers on the wire.
            ResponseTemplate::new(200)
                .append_header("Set-Cookie", "BPMCSRF=fresh-csrf; path=/")
                .append_header("Set-Cookie", ".ASPXAUTH=fresh-auth; HttpOnly")
                .set_body_json(serde_json::json!({"Code": 0, "Exception": null})),
        )
        .expect(expected_calls)
        .mount(server)
        .await;
}

#[tokio::test]
async fn session_login_then_query_sends_session_headers() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    mount_login_success(&server, 1).await;
    Mock::given(method("GET"))
        .and(path("/0/odata/Case"))
        .and(query_param("$top", "1"))
        .and(query_param("$select", "Id,Title"))
        .and(header("ForceUseSession", "true"))
        .and(header("BPMCSRF", "fresh-csrf"))
        .and(header("Accept", "application/json; odata=verbose"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"value": [{"Id": "1"}]})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let mut client = test_client(&server, &dir);
    client
        .authenticate(
            AuthOptions::new()
                .username("supervisor")
                .password("secret")
                .cache(false),
        )
        .await
        .unwrap();

    let body: serde_json::Value = client
        .get_collection_data("Case", QueryOptions::new().top(1).select("Id,Title"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["value"][0]["Id"], "1");

    // The fresh cookies were persisted for the next process.
    match raw_store(&dir).load(&server.uri(), "supervisor").unwrap() {
        CredentialPayload::Session(cookies) => {
            assert_eq!(cookies.get("BPMCSRF").unwrap(), "fresh-csrf");
            assert_eq!(cookies.get(".ASPXAUTH").unwrap(), "fresh-auth");
        }
        other => panic!("expected session cookies, got {other:?}"),
    }
}

#[tokio::test]
async fn query_params_are_url_encoded_on_the_wire() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/0/odata/Case"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"value": []})))
        .expect(1)
        .mount(&server)
        .await;

    let mut client = test_client(&server, &dir);
    client
        .get_collection_data("Case", QueryOptions::new().top(1).select("Id,Title"))
        .await
        .unwrap();

    let requests = server.received_requests().await.unwrap();
    let query = requests
        .iter()
        .find(|r| r.url.path() == "/0/odata/Case")
        .and_then(|r| r.url.query())
        .unwrap();
    assert_eq!(query, "%24top=1&%24select=Id%2CTitle");
}

#[tokio::test]
async fn valid_cached_session_skips_the_login_endpoint() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    raw_store(&dir)
        .store(
            &server.uri(),
            "supervisor",
            session_payload(&[("BPMCSRF", "cached-csrf"), (".ASPXAUTH", "cached-auth")]),
        )
        .unwrap();

    Mock::given(method("GET"))
        .and(path(PROBE_PATH))
        .and(header("BPMCSRF", "cached-csrf"))
        .respond_with(ResponseTemplate::new(200).set_body_string("42"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(LOGIN_PATH))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let mut client = test_client(&server, &dir);
    client
        .authenticate(AuthOptions::new().username("supervisor").password("secret"))
        .await
        .unwrap();

    // One probe, no login.
    assert_eq!(client.api_calls(), 1);
}

#[tokio::test]
async fn stale_cached_session_falls_back_to_live_login() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    raw_store(&dir)
        .store(
            &server.uri(),
            "supervisor",
            session_payload(&[("BPMCSRF", "stale-csrf")]),
        )
        .unwrap();

    // A dead session probe is redirected to the login page.
    Mock::given(method("GET"))
        .and(path(PROBE_PATH))
        .respond_with(ResponseTemplate::new(302).insert_header("Location", "/Login/NuiLogin.aspx"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/Login/NuiLogin.aspx"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    mount_login_success(&server, 1).await;

    let mut client = test_client(&server, &dir);
    client
        .authenticate(AuthOptions::new().username("supervisor").password("secret"))
        .await
        .unwrap();

    // The store now carries the fresh cookies, not the stale ones.
    match raw_store(&dir).load(&server.uri(), "supervisor").unwrap() {
        CredentialPayload::Session(cookies) => {
            assert_eq!(cookies.get("BPMCSRF").unwrap(), "fresh-csrf");
        }
        other => panic!("expected session cookies, got {other:?}"),
    }
}

#[tokio::test]
async fn bare_username_reuses_the_remembered_password() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    // Initial login plus the re-login with the recalled password.
    mount_login_success(&server, 2).await;

    let mut client = test_client(&server, &dir);
    client
        .authenticate(
            AuthOptions::new()
                .username("supervisor")
                .password("secret")
                .cache(false),
        )
        .await
        .unwrap();

    client
        .authenticate(AuthOptions::new().username("supervisor").cache(false))
        .await
        .unwrap();
}

#[tokio::test]
async fn rejected_login_surfaces_the_server_message() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("POST"))
        .and(path(LOGIN_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "Code": 1,
            "Exception": {"Message": "Invalid login or password"},
        })))
        .mount(&server)
        .await;

    let mut client = test_client(&server, &dir);
    let err = client
        .authenticate(
            AuthOptions::new()
                .username("supervisor")
                .password("wrong")
                .cache(false),
        )
        .await
        .unwrap_err();

    match err.kind {
        ErrorKind::Authentication(message) => assert_eq!(message, "Invalid login or password"),
        other => panic!("expected Authentication error, got {other}"),
    }
}

#[tokio::test]
async fn oauth_flow_fetches_token_and_sends_bearer() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("POST"))
        .and(path("/connect/token"))
        .and(header("Content-Type", "application/x-www-form-urlencoded"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "oauth-token-1",
            "token_type": "Bearer",
            "expires_in": 3600,
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/0/odata/Contact"))
        .and(header("Authorization", "Bearer oauth-token-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"value": []})))
        .expect(1)
        .mount(&server)
        .await;

    let mut client = test_client(&server, &dir);
    client
        .authenticate(
            AuthOptions::new()
                .client_id("app-1")
                .client_secret("shhh")
                .identity_service_url(server.uri()),
        )
        .await
        .unwrap();

    client
        .get_collection_data("Contact", QueryOptions::new())
        .await
        .unwrap();

    // The full token payload was persisted for (environment, client id).
    match raw_store(&dir).load(&server.uri(), "app-1").unwrap() {
        CredentialPayload::OAuth(token) => {
            assert_eq!(token.access_token, "oauth-token-1");
            assert_eq!(token.expires_in, Some(3600));
        }
        other => panic!("expected OAuth token, got {other:?}"),
    }
}

#[tokio::test]
async fn cached_oauth_token_skips_the_token_endpoint() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    raw_store(&dir)
        .store(
            &server.uri(),
            "app-1",
            CredentialPayload::OAuth(OAuthToken {
                access_token: "cached-token".to_string(),
                token_type: Some("Bearer".to_string()),
                expires_in: None,
                scope: None,
            }),
        )
        .unwrap();

    Mock::given(method("POST"))
        .and(path("/connect/token"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/0/odata/Contact"))
        .and(header("Authorization", "Bearer cached-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"value": []})))
        .expect(1)
        .mount(&server)
        .await;

    let mut client = test_client(&server, &dir);
    client
        .authenticate(
            AuthOptions::new()
                .client_id("app-1")
                .client_secret("shhh")
                .identity_service_url(server.uri()),
        )
        .await
        .unwrap();
    assert_eq!(client.api_calls(), 0);

    client
        .get_collection_data("Contact", QueryOptions::new())
        .await
        .unwrap();
}

#[tokio::test]
async fn expired_session_replays_exactly_once() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    // Initial login plus the silent re-login after the rejection.
    mount_login_success(&server, 2).await;

    // First data call is rejected, the replay succeeds.
    Mock::given(method("GET"))
        .and(path("/0/odata/Case"))
        .respond_with(ResponseTemplate::new(401))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/0/odata/Case"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"value": [{"Id": "1"}]})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let mut client = test_client(&server, &dir);
    client
        .authenticate(
            AuthOptions::new()
                .username("supervisor")
                .password("secret")
                .cache(false),
        )
        .await
        .unwrap();
    let calls_after_auth = client.api_calls();

    let response = client
        .get_collection_data("Case", QueryOptions::new())
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    // One logical operation, one counter tick, despite two wire exchanges
    // and the re-login in between.
    assert_eq!(client.api_calls(), calls_after_auth + 1);
}

#[tokio::test]
async fn second_rejection_propagates_without_a_third_attempt() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    mount_login_success(&server, 2).await;
    Mock::given(method("GET"))
        .and(path("/0/odata/Case"))
        .respond_with(ResponseTemplate::new(401).set_body_string("Unauthorized"))
        .expect(2)
        .mount(&server)
        .await;

    let mut client = test_client(&server, &dir);
    client
        .authenticate(
            AuthOptions::new()
                .username("supervisor")
                .password("secret")
                .cache(false),
        )
        .await
        .unwrap();

    let err = client
        .get_collection_data("Case", QueryOptions::new())
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(401));
}

#[tokio::test]
async fn conflicting_credentials_fail_before_any_network_call() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    let mut client = test_client(&server, &dir);
    let err = client
        .authenticate(
            AuthOptions::new()
                .username("supervisor")
                .password("secret")
                .client_id("app-1")
                .client_secret("shhh"),
        )
        .await
        .unwrap_err();

    assert!(matches!(err.kind, ErrorKind::ConflictingCredentials));
    assert!(server.received_requests().await.unwrap().is_empty());
    assert_eq!(client.api_calls(), 0);
}

#[tokio::test]
async fn store_isolates_principals_on_the_same_environment() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    let store = raw_store(&dir);
    store
        .store(
            &server.uri(),
            "alice",
            session_payload(&[("BPMCSRF", "alice-csrf")]),
        )
        .unwrap();
    store
        .store(
            &server.uri(),
            "bob",
            session_payload(&[("BPMCSRF", "bob-csrf")]),
        )
        .unwrap();

    Mock::given(method("GET"))
        .and(path(PROBE_PATH))
        .and(header("BPMCSRF", "bob-csrf"))
        .respond_with(ResponseTemplate::new(200).set_body_string("7"))
        .expect(1)
        .mount(&server)
        .await;

    let mut client = test_client(&server, &dir);
    client
        .authenticate(AuthOptions::new().username("bob").password("pw"))
        .await
        .unwrap();

    // Alice's entry is untouched by Bob's session traffic.
    match store.load(&server.uri(), "alice").unwrap() {
        CredentialPayload::Session(cookies) => {
            assert_eq!(cookies.get("BPMCSRF").unwrap(), "alice-csrf")
        }
        other => panic!("expected session cookies, got {other:?}"),
    }
}

#[tokio::test]
async fn download_file_writes_the_attachment() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/0/rest/FileService/Download/CaseFile/file-1"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Content-Disposition", "attachment; filename=report.pdf")
                .set_body_bytes(b"%PDF-1.4 fake".to_vec()),
        )
        .mount(&server)
        .await;

    let mut client = test_client(&server, &dir);
    let out = TempDir::new().unwrap();
    let written: PathBuf = client
        .download_file("CaseFile", "file-1", out.path())
        .await
        .unwrap();

    assert_eq!(written, out.path().join("report.pdf"));
    assert_eq!(std::fs::read(&written).unwrap(), b"%PDF-1.4 fake");
}

#[tokio::test]
async fn failed_upload_deletes_the_orphaned_record() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("POST"))
        .and(path("/0/odata/CaseFile"))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({"Id": "file-9"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/0/rest/FileApiService/UploadFile"))
        .and(query_param("fileId", "file-9"))
        .and(query_param("parentColumnName", "Case"))
        .and(header("Content-Type", "application/octet-stream"))
        .respond_with(ResponseTemplate::new(500).set_body_string("storage unavailable"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/0/odata/CaseFile(file-9)"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let upload_dir = TempDir::new().unwrap();
    let file_path = upload_dir.path().join("evidence.txt");
    std::fs::write(&file_path, b"hello").unwrap();

    let mut client = test_client(&server, &dir);
    let err = client
        .upload_file("CaseFile", "case-1", &file_path)
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(500));
}

#[tokio::test]
async fn dashboard_export_round_trip() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    let items = serde_json::json!({
        "CaseWidget": {
            "parameters": {
                "caption": "Open Cases",
                "entitySchemaName": "Case",
                "filterData": "{\"filterType\": 6, \"isEnabled\": true, \"items\": {}}",
                "gridConfig": "{\"items\": [{\"metaPath\": \"Number\", \"caption\": \"Number\"}]}",
            },
        },
    });
    // The Items document comes back with a UTF-8 BOM.
    let mut body = vec![0xEF, 0xBB, 0xBF];
    body.extend_from_slice(items.to_string().as_bytes());

    Mock::given(method("GET"))
        .and(path("/0/odata/SysDashboard(dash-1)/Items/$value"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/0/rest/ReportService/GetExportToExcelKey"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "GetExportToExcelKeyResult": {"key": "export-key-1"},
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(
            r"^/0/rest/ReportService/GetExportToExcelData/export-key-1/open_cases_.*$",
        ))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Content-Disposition", "attachment; filename=open_cases.xlsx")
                .set_body_bytes(b"xlsx-bytes".to_vec()),
        )
        .expect(1)
        .mount(&server)
        .await;

    let out = TempDir::new().unwrap();
    let mut client = test_client(&server, &dir);
    let written = client
        .export_dashboard("dash-1", "CaseWidget", out.path())
        .await
        .unwrap();

    assert_eq!(written, out.path().join("open_cases.xlsx"));
    assert_eq!(std::fs::read(&written).unwrap(), b"xlsx-bytes");
}
