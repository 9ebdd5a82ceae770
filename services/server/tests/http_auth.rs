mod common;

use common::TestServer;

#[tokio::test]
async fn create_account_then_issue_token_round_trip() {
    let server = TestServer::start().await;
    let client = reqwest::Client::new();
    let base = server.http_base();

    let created = client
        .post(format!("{base}/create_account"))
        .json(&serde_json::json!({"username": "dave", "password": "password123"}))
        .send()
        .await
        .expect("create_account request");
    assert_eq!(created.status(), reqwest::StatusCode::CREATED);

    let duplicate = client
        .post(format!("{base}/create_account"))
        .json(&serde_json::json!({"username": "dave", "password": "password123"}))
        .send()
        .await
        .expect("duplicate create_account request");
    assert_eq!(duplicate.status(), reqwest::StatusCode::CONFLICT);

    let token_response = client
        .post(format!("{base}/auth/token"))
        .json(&serde_json::json!({"username": "dave", "password": "password123"}))
        .send()
        .await
        .expect("auth/token request");
    assert_eq!(token_response.status(), reqwest::StatusCode::OK);
    let body: serde_json::Value = token_response.json().await.expect("token response json");
    assert_eq!(body["token_type"], "bearer");
    assert!(!body["access_token"].as_str().unwrap_or_default().is_empty());

    let wrong_password = client
        .post(format!("{base}/auth/token"))
        .json(&serde_json::json!({"username": "dave", "password": "wrong-password"}))
        .send()
        .await
        .expect("wrong password request");
    assert_eq!(wrong_password.status(), reqwest::StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn liveness_routes_respond() {
    let server = TestServer::start().await;
    let client = reqwest::Client::new();
    let base = server.http_base();

    let ping = client
        .get(format!("{base}/ping"))
        .send()
        .await
        .expect("ping request");
    assert_eq!(ping.status(), reqwest::StatusCode::OK);

    let root = client
        .get(format!("{base}/"))
        .send()
        .await
        .expect("root request");
    assert_eq!(root.status(), reqwest::StatusCode::OK);
    let body: serde_json::Value = root.json().await.expect("root response json");
    assert_eq!(body["status"], "ready");
}
