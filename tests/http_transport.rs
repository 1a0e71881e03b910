//! HTTPS transport tests against a mock HTTP server.
//!
//! Verifies the wire layout of requests (path, body, credential headers),
//! decoding of successful bodies, mapping of service errors, and the
//! connect-time checks (enclave info, root CA, health probe).

use mockito::{Matcher, Mock, Server, ServerGuard};
use serde_json::json;
use tempfile::TempDir;

use teaclave_client::config::{
    ServiceEndpoint, AUTHENTICATION_SERVICE_NAME, FRONTEND_SERVICE_NAME,
};
use teaclave_client::{
    AuthenticationClient, Credential, Error, ExecutorType, FrontendClient, FunctionArgument,
    FunctionArguments, FunctionDescriptor, FunctionId, TaskId, TaskRequest, UserRegistration,
    UserRole,
};

struct Fixture {
    server: ServerGuard,
    dir: TempDir,
    _health: Mock,
}

impl Fixture {
    async fn new() -> Self {
        let mut server = Server::new_async().await;
        let health = server
            .mock("GET", "/health")
            .with_status(200)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let entry = |name: &str| {
            format!(
                "[{name}]\nmr_enclave = \"{}\"\nmr_signer = \"{}\"\n",
                "11".repeat(32),
                "22".repeat(32)
            )
        };
        let content = entry(AUTHENTICATION_SERVICE_NAME) + &entry(FRONTEND_SERVICE_NAME);
        std::fs::write(dir.path().join("enclave_info.toml"), content).unwrap();

        Self {
            server,
            dir,
            _health: health,
        }
    }

    fn endpoint(&self, service_name: &str) -> ServiceEndpoint {
        ServiceEndpoint::new(
            service_name,
            self.server.url(),
            self.dir.path().join("enclave_info.toml"),
            self.dir.path().join("missing_ca.pem"),
        )
    }

    async fn frontend(&self) -> FrontendClient {
        let mut client = FrontendClient::connect(&self.endpoint(FRONTEND_SERVICE_NAME))
            .await
            .unwrap();
        client.set_credential("test_id", "tok").unwrap();
        client
    }
}

fn echo() -> FunctionDescriptor {
    FunctionDescriptor::new("builtin-echo", ExecutorType::Builtin)
        .with_argument(FunctionArgument::new("message", "", true))
}

// ─── Request layout ─────────────────────────────────────────────────────────

#[tokio::test]
async fn login_posts_credentials() {
    let mut fixture = Fixture::new().await;
    let mock = fixture
        .server
        .mock("POST", "/v1/user_login")
        .match_header("content-type", "application/json")
        .match_body(Matcher::Json(json!({
            "request": "user_login",
            "id": "admin",
            "password": "teaclave"
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"token":"session-token"}"#)
        .create_async()
        .await;

    let mut auth = AuthenticationClient::connect(&fixture.endpoint(AUTHENTICATION_SERVICE_NAME))
        .await
        .unwrap();
    let credential = auth.login("admin", "teaclave").await.unwrap();

    assert_eq!(credential.user_id(), "admin");
    assert_eq!(credential.token(), "session-token");
    mock.assert_async().await;
    auth.close().await.unwrap();
}

#[tokio::test]
async fn register_user_sends_role_and_attribute() {
    let mut fixture = Fixture::new().await;
    let created = fixture
        .server
        .mock("POST", "/v1/user_register")
        .match_header("x-teaclave-user-id", "admin")
        .match_header("authorization", "Bearer admin-token")
        .match_body(Matcher::Json(json!({
            "request": "user_register",
            "id": "test_id",
            "password": "test_password",
            "role": "function_owner",
            "attribute": "org-1"
        })))
        .with_status(200)
        .with_body("{}")
        .expect(1)
        .create_async()
        .await;

    let admin = Credential::new("admin", "admin-token").unwrap();
    let mut auth = AuthenticationClient::connect(&fixture.endpoint(AUTHENTICATION_SERVICE_NAME))
        .await
        .unwrap();
    let outcome = auth
        .register_user_with_attribute(
            &admin,
            "test_id",
            "test_password",
            UserRole::FunctionOwner,
            "org-1",
        )
        .await
        .unwrap();
    assert_eq!(outcome, UserRegistration::Created);
    created.assert_async().await;
    created.remove_async().await;

    let _exists = fixture
        .server
        .mock("POST", "/v1/user_register")
        .with_status(409)
        .with_body(r#"{"kind":"already_exists","message":"user test_id exists"}"#)
        .create_async()
        .await;
    let outcome = auth
        .register_user(&admin, "test_id", "test_password", UserRole::FunctionOwner)
        .await
        .unwrap();
    assert_eq!(outcome, UserRegistration::AlreadyExists);
    auth.close().await.unwrap();
}

#[tokio::test]
async fn frontend_requests_carry_credential_headers() {
    let mut fixture = Fixture::new().await;
    let function_id = FunctionId::generate();
    let mock = fixture
        .server
        .mock("POST", "/v1/register_function")
        .match_header("x-teaclave-user-id", "test_id")
        .match_header("authorization", "Bearer tok")
        .match_body(Matcher::PartialJson(json!({
            "request": "register_function",
            "name": "builtin-echo",
            "executor_type": "builtin",
            "public": true,
            "arguments": [{"key": "message", "default_value": "", "allow_overwrite": true}],
            "usage_quota": -1
        })))
        .with_status(200)
        .with_body(json!({ "function_id": function_id }).to_string())
        .create_async()
        .await;

    let mut client = fixture.frontend().await;
    let registered = client.register_function(&echo()).await.unwrap();

    assert_eq!(registered, function_id);
    mock.assert_async().await;
    client.close().await.unwrap();
}

#[tokio::test]
async fn task_arguments_travel_as_json_string() {
    let mut fixture = Fixture::new().await;
    let task_id = TaskId::generate();
    let mock = fixture
        .server
        .mock("POST", "/v1/create_task")
        .match_body(Matcher::PartialJson(json!({
            "request": "create_task",
            "function_arguments": "{\"message\":\"Hello, Teaclave!\"}",
            "executor": "builtin"
        })))
        .with_status(200)
        .with_body(json!({ "task_id": task_id }).to_string())
        .create_async()
        .await;

    let mut client = fixture.frontend().await;
    let args = FunctionArguments::new().with("message", "Hello, Teaclave!");
    let created = client
        .create_task(&TaskRequest::new(FunctionId::generate(), args))
        .await
        .unwrap();

    assert_eq!(created, task_id);
    mock.assert_async().await;
    client.close().await.unwrap();
}

// ─── Response decoding ──────────────────────────────────────────────────────

#[tokio::test]
async fn finished_task_result_is_base64_decoded() {
    let mut fixture = Fixture::new().await;
    let task_id = TaskId::generate();
    let _mock = fixture
        .server
        .mock("POST", "/v1/get_task")
        .with_status(200)
        .with_body(
            json!({
                "task_id": task_id,
                "creator": "test_id",
                "function_id": FunctionId::generate(),
                "function_arguments": "{\"message\":\"Hello, Teaclave!\"}",
                "executor": "builtin",
                "status": "finished",
                "result": {
                    "ok": {"return_value": "SGVsbG8sIFRlYWNsYXZlIQ==", "output_file_hashes": {}}
                }
            })
            .to_string(),
        )
        .create_async()
        .await;

    let mut client = fixture.frontend().await;
    let result = client.get_task_result(&task_id).await.unwrap();

    assert_eq!(result.as_str().unwrap(), "Hello, Teaclave!");
    client.close().await.unwrap();
}

#[tokio::test]
async fn malformed_body_is_protocol_error() {
    let mut fixture = Fixture::new().await;
    let _mock = fixture
        .server
        .mock("POST", "/v1/get_task")
        .with_status(200)
        .with_body(r#"{"task_id": 5}"#)
        .create_async()
        .await;

    let mut client = fixture.frontend().await;
    let err = client.get_task(&TaskId::generate()).await.unwrap_err();

    assert!(matches!(err, Error::Protocol(_)), "{err:?}");
    client.close().await.unwrap();
}

// ─── Error mapping ──────────────────────────────────────────────────────────

#[tokio::test]
async fn service_error_maps_to_operation_error() {
    let mut fixture = Fixture::new().await;
    let _mock = fixture
        .server
        .mock("POST", "/v1/create_task")
        .with_status(404)
        .with_body(r#"{"kind":"not_found","message":"no such function"}"#)
        .create_async()
        .await;

    let mut client = fixture.frontend().await;
    let err = client
        .create_task(&TaskRequest::new(FunctionId::generate(), FunctionArguments::new()))
        .await
        .unwrap_err();

    match err {
        Error::TaskCreation(msg) => assert_eq!(msg, "not_found: no such function"),
        other => panic!("unexpected error: {other:?}"),
    }
    client.close().await.unwrap();
}

#[tokio::test]
async fn bare_unauthorized_status_is_auth_error() {
    let mut fixture = Fixture::new().await;
    let _mock = fixture
        .server
        .mock("POST", "/v1/invoke_task")
        .with_status(401)
        .with_body("token expired")
        .create_async()
        .await;

    let mut client = fixture.frontend().await;
    let err = client.invoke_task(&TaskId::generate()).await.unwrap_err();

    assert!(matches!(err, Error::Auth(msg) if msg == "token expired"));
    client.close().await.unwrap();
}

#[tokio::test]
async fn rejected_login_is_auth_error() {
    let mut fixture = Fixture::new().await;
    let _mock = fixture
        .server
        .mock("POST", "/v1/user_login")
        .with_status(401)
        .with_body(r#"{"kind":"unauthenticated","message":"invalid user id or password"}"#)
        .create_async()
        .await;

    let mut auth = AuthenticationClient::connect(&fixture.endpoint(AUTHENTICATION_SERVICE_NAME))
        .await
        .unwrap();
    let err = auth.login("admin", "wrong").await.unwrap_err();

    assert!(matches!(err, Error::Auth(_)));
    auth.close().await.unwrap();
}

// ─── Connect-time checks ────────────────────────────────────────────────────

#[tokio::test]
async fn failing_health_probe_is_connection_error() {
    let mut server = Server::new_async().await;
    let _health = server
        .mock("GET", "/health")
        .with_status(503)
        .create_async()
        .await;
    let fixture = Fixture::new().await;
    let mut endpoint = fixture.endpoint(FRONTEND_SERVICE_NAME);
    endpoint.address = server.url();

    let err = FrontendClient::connect(&endpoint).await.unwrap_err();
    assert!(matches!(err, Error::Connection(_)), "{err:?}");
}

#[tokio::test]
async fn unreachable_endpoint_is_connection_error() {
    let fixture = Fixture::new().await;
    let mut endpoint = fixture.endpoint(FRONTEND_SERVICE_NAME);
    endpoint.address = "http://127.0.0.1:1".to_string();

    let err = FrontendClient::connect(&endpoint).await.unwrap_err();
    assert!(matches!(err, Error::Connection(_)), "{err:?}");
}

#[tokio::test]
async fn service_missing_from_enclave_info_is_rejected() {
    let fixture = Fixture::new().await;
    let endpoint = fixture.endpoint("teaclave_storage_service");

    let err = FrontendClient::connect(&endpoint).await.unwrap_err();
    assert!(matches!(err, Error::Connection(_)), "{err:?}");
}

#[tokio::test]
async fn https_requires_root_ca() {
    let fixture = Fixture::new().await;
    let mut endpoint = fixture.endpoint(FRONTEND_SERVICE_NAME);
    endpoint.address = fixture.server.host_with_port();

    // bare host:port means https; the CA file does not exist
    let err = FrontendClient::connect(&endpoint).await.unwrap_err();
    assert!(matches!(err, Error::Connection(msg) if msg.contains("root CA")));
}

#[tokio::test]
async fn https_trusts_supplied_root_ca() {
    let fixture = Fixture::new().await;
    let ca_path = fixture.dir.path().join("root_ca.pem");
    std::fs::write(&ca_path, include_bytes!("fixtures/root_ca.pem")).unwrap();

    let mut endpoint = fixture.endpoint(FRONTEND_SERVICE_NAME);
    endpoint.root_ca_cert_path = ca_path;
    endpoint.address = format!("https://{}", fixture.server.host_with_port());

    // the CA loads; the plaintext mock server then fails the TLS handshake
    let err = FrontendClient::connect(&endpoint).await.unwrap_err();
    match err {
        Error::Connection(msg) => {
            assert!(msg.contains("unreachable"), "{msg}");
            assert!(!msg.contains("root CA"), "{msg}");
        },
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn root_ca_file_without_certificate_is_rejected() {
    let fixture = Fixture::new().await;
    let ca_path = fixture.dir.path().join("root_ca.pem");
    std::fs::write(&ca_path, "not a certificate\n").unwrap();

    let mut endpoint = fixture.endpoint(FRONTEND_SERVICE_NAME);
    endpoint.root_ca_cert_path = ca_path;
    endpoint.address = fixture.server.host_with_port();

    let err = FrontendClient::connect(&endpoint).await.unwrap_err();
    assert!(matches!(err, Error::Connection(msg) if msg.contains("root CA")));
}
