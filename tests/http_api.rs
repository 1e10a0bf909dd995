use entity_admin_rust::config::AppConfig;
use entity_admin_rust::{build_app, MemoryStore};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::sync::Arc;
use tokio::net::TcpListener;

// Test client wrapper for making API calls
struct TestClient {
    client: Client,
    base_url: String,
}

impl TestClient {
    /// Boot the seeded application on an ephemeral port.
    async fn start() -> Self {
        let mut config = AppConfig::default();
        config.engine.load_seed_data = true;
        let app = build_app(Arc::new(MemoryStore::new()), &config)
            .await
            .expect("app builds");

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let address = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("server runs");
        });

        Self {
            client: Client::new(),
            base_url: format!("http://{}", address),
        }
    }

    async fn get(&self, path: &str, headers: &[(&str, &str)]) -> reqwest::Response {
        let mut request = self.client.get(format!("{}{}", self.base_url, path));
        for (name, value) in headers {
            request = request.header(*name, *value);
        }
        request.send().await.expect("request succeeds")
    }

    async fn post_form(&self, path: &str, form: &[(&str, &str)]) -> reqwest::Response {
        self.client
            .post(format!("{}{}", self.base_url, path))
            .header("x-session-id", "session-1")
            .form(form)
            .send()
            .await
            .expect("request succeeds")
    }

    async fn role_id(&self, code: &str) -> String {
        let page: Value = self
            .get(&format!("/admin/auth/role/find-by-page?EQ_code={}", code), &[])
            .await
            .json()
            .await
            .unwrap();
        page["content"][0]["id"].as_str().unwrap().to_string()
    }
}

#[tokio::test]
async fn health_endpoint_responds() {
    let client = TestClient::start().await;
    let response = client.get("/health", &[]).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn scope_headers_restrict_listings() {
    let client = TestClient::start().await;

    let all: Value = client
        .get("/admin/auth/role/find-by-page", &[])
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(all["totalElements"], 3);

    let scoped: Value = client
        .get("/admin/auth/role/find-by-page?LE_aclType=9", &[("x-acl-type", "2")])
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(scoped["totalElements"], 2);

    let users: Value = client
        .get("/admin/auth/user/find-by-page", &[("x-acl-code-prefixes", "D10")])
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(users["totalElements"], 2);

    let roots: Value = client
        .get("/admin/auth/department/find-by-page", &[])
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(roots["totalElements"], 2);
}

#[tokio::test]
async fn replayed_form_token_is_rejected() {
    let client = TestClient::start().await;
    let form = [
        ("code", "ROLE_SUPPORT"),
        ("name", "Support"),
        ("aclType", "1"),
        ("_token_name_", "formToken"),
        ("formToken", "f-001"),
    ];

    let first = client.post_form("/admin/auth/role/do-create", &form).await;
    assert_eq!(first.status(), StatusCode::OK);
    let body: Value = first.json().await.unwrap();
    assert_eq!(body["type"], "success");
    assert_eq!(body["message"], "Created");

    let replay = client.post_form("/admin/auth/role/do-create", &form).await;
    assert_eq!(replay.status(), StatusCode::CONFLICT);
    let body: Value = replay.json().await.unwrap();
    assert_eq!(body["type"], "failure");
}

#[tokio::test]
async fn batch_delete_reports_partial_failure() {
    let client = TestClient::start().await;
    let ops = client.role_id("ROLE_OPS").await;
    let admin = client.role_id("ROLE_ADMIN").await;
    let ids = format!("{},{}", ops, admin);

    let response = client
        .post_form("/admin/auth/role/do-delete", &[("ids", ids.as_str())])
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["type"], "warning");
    assert_eq!(body["message"], "Delete processed. 1 succeeded, 1 failed");
    assert!(body["errors"][admin.as_str()].is_string());
}

#[tokio::test]
async fn csv_export_is_a_download() {
    let client = TestClient::start().await;
    let response = client
        .get("/admin/auth/role/find-by-page?_format_=csv", &[])
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let disposition = response
        .headers()
        .get("content-disposition")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(disposition.contains("role.csv"));
    let text = response.text().await.unwrap();
    assert!(text.starts_with("Code,Name"));
    assert!(text.contains("ROLE_ADMIN"));
}

#[tokio::test]
async fn malformed_requests_are_bad_requests() {
    let client = TestClient::start().await;

    let bad_id = client.get("/admin/auth/user/view?id=abc", &[]).await;
    assert_eq!(bad_id.status(), StatusCode::BAD_REQUEST);

    let unknown_state = client
        .post_form("/admin/auth/user/do-state", &[("ids", "1"), ("state", "archive")])
        .await;
    assert_eq!(unknown_state.status(), StatusCode::BAD_REQUEST);

    let missing = client.get("/admin/auth/role/view?id=nope", &[]).await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn validation_rules_are_published() {
    let client = TestClient::start().await;
    let rules: Value = client
        .get("/admin/auth/user/validate-rules", &[])
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(rules["signinid"]["required"], true);
    assert_eq!(rules["signinid"]["maxlength"], 64);
    assert_eq!(rules["email"]["email"], true);
}
