//! Object store interaction tests
//!
//! A wiremock server stands in for the S3-compatible store, so the presigned
//! PUT and the confirmation HEAD travel over real HTTP.

mod common;

use common::{generate_jwt, image_presign_body, storage_config, test_config, TestEnv};
use serde_json::json;
use wiremock::matchers::{header, method, path_regex, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const OBJECT_PATH: &str = r"^/test-bucket/uploads/images/other/planner-42/\d{8}/[0-9a-f]{32}_test-image\.jpg$";

async fn env_for(store: &MockServer, verify_object: bool) -> TestEnv {
    let mut config = test_config();
    config.storage = storage_config(&store.uri());
    config.upload.verify_object = verify_object;
    TestEnv::with_config(config).await
}

#[tokio::test]
async fn test_client_put_to_presigned_url_reaches_store() {
    let store = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path_regex(OBJECT_PATH))
        .and(header("content-type", "image/jpeg"))
        .and(query_param("X-Amz-Algorithm", "AWS4-HMAC-SHA256"))
        .and(query_param("X-Amz-SignedHeaders", "content-type;host"))
        .and(query_param("X-Amz-Expires", "3600"))
        .respond_with(ResponseTemplate::new(200).insert_header("ETag", "\"abc123\""))
        .expect(1)
        .mount(&store)
        .await;

    let env = env_for(&store, false).await;
    let token = generate_jwt("planner-42", 3600);

    let (status, body) = env
        .post("/presigned-url", Some(&token), &image_presign_body(1024))
        .await;
    assert_eq!(status, 200, "{body}");
    let upload_url = body["data"]["uploadUrl"].as_str().unwrap();

    // the raw PUT carries no API credentials, only the signed URL
    let put = env
        .client
        .put(upload_url)
        .header("Content-Type", "image/jpeg")
        .body(vec![7u8; 1024])
        .send()
        .await
        .unwrap();
    assert_eq!(put.status(), 200);

    env.shutdown().await;
}

#[tokio::test]
async fn test_confirm_requires_object_when_verification_enabled() {
    let store = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path_regex(OBJECT_PATH))
        .respond_with(ResponseTemplate::new(404))
        .up_to_n_times(1)
        .mount(&store)
        .await;
    Mock::given(method("HEAD"))
        .and(path_regex(OBJECT_PATH))
        .and(query_param("X-Amz-SignedHeaders", "host"))
        .respond_with(ResponseTemplate::new(200).insert_header("ETag", "\"abc123\""))
        .mount(&store)
        .await;

    let env = env_for(&store, true).await;
    let token = generate_jwt("planner-42", 3600);

    let (_, body) = env
        .post("/presigned-url", Some(&token), &image_presign_body(1024))
        .await;
    let confirm = json!({
        "uploadSessionId": body["data"]["uploadSessionId"],
        "actualFileSize": 1024,
    });

    // nothing uploaded yet
    let (status, body) = env.post("/confirm", Some(&token), &confirm).await;
    assert_eq!(status, 400);
    assert_eq!(body["error"], "ValidationError");

    // object now present, session was left pending
    let (status, body) = env.post("/confirm", Some(&token), &confirm).await;
    assert_eq!(status, 200, "{body}");
    assert_eq!(body["data"]["fileSize"], 1024);

    env.shutdown().await;
}

#[tokio::test]
async fn test_store_failure_during_verification_is_bad_gateway() {
    let store = MockServer::start().await;
    Mock::given(method("HEAD"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&store)
        .await;

    let env = env_for(&store, true).await;
    let token = generate_jwt("planner-42", 3600);

    let (_, body) = env
        .post("/presigned-url", Some(&token), &image_presign_body(1024))
        .await;
    let session_id = body["data"]["uploadSessionId"].clone();

    let (status, body) = env
        .post(
            "/confirm",
            Some(&token),
            &json!({"uploadSessionId": session_id, "actualFileSize": 1024}),
        )
        .await;
    assert_eq!(status, 502);
    assert_eq!(body["error"], "DependencyError");

    let (_, body) = env
        .get(
            &format!("/progress/{}", session_id.as_str().unwrap()),
            Some(&token),
        )
        .await;
    assert_eq!(body["data"]["state"], "pending");

    env.shutdown().await;
}
