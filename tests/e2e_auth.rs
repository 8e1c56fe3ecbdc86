//! E2E tests for bearer session authentication

mod common;

use common::TestServer;
use copysmith::auth::session::{Session, create_session_token};
use copysmith::data::PlanTier;

#[tokio::test]
async fn test_generate_requires_authentication() {
    let server = TestServer::new().await;

    let response = server
        .client
        .post(server.url("/api/v1/generate"))
        .json(&serde_json::json!({"kind": "blog-post", "topic": "x"}))
        .send()
        .await
        .expect("request succeeds");

    assert_eq!(response.status(), 401);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["type"], "unauthorized");
}

#[tokio::test]
async fn test_token_signed_with_other_secret_is_rejected() {
    let server = TestServer::new().await;
    let session = Session::new("acct-1", PlanTier::Agency, chrono::Duration::hours(1));
    let forged = create_session_token(&session, "another-secret-that-is-32-bytes!!").unwrap();

    let response = server
        .client
        .get(server.url("/api/v1/usage"))
        .bearer_auth(forged)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 401);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["type"], "invalid_signature");
}

#[tokio::test]
async fn test_expired_token_is_rejected() {
    let server = TestServer::new().await;
    let session = Session::new("acct-1", PlanTier::Free, chrono::Duration::seconds(-5));
    let token =
        create_session_token(&session, &server.state.config.auth.session_secret).unwrap();

    let response = server
        .client
        .get(server.url("/api/v1/usage"))
        .bearer_auth(token)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 401);
}

#[tokio::test]
async fn test_session_cookie_is_accepted() {
    let server = TestServer::new().await;
    let token = server.token_for("acct-cookie", PlanTier::Starter);

    let response = server
        .client
        .get(server.url("/api/v1/usage"))
        .header("Cookie", format!("session={token}"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["account_id"], "acct-cookie");
    assert_eq!(body["plan"], "starter");
}

#[tokio::test]
async fn test_plan_follows_the_latest_session() {
    let server = TestServer::new().await;

    for (plan, expected_limit) in [(PlanTier::Free, 5), (PlanTier::Pro, 200)] {
        let token = server.token_for("acct-upgrade", plan);
        let body: serde_json::Value = server
            .client
            .get(server.url("/api/v1/usage"))
            .bearer_auth(token)
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["limits"]["content"], expected_limit);
    }
}
