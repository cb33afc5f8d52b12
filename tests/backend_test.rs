//! HTTP client tests against a mock backend.

use dialogus::speech::SpeechTokenClient;
use dialogus::{core::BackendClient, BackendError, SpeechError};
use serde_json::json;
use tokio::time::Duration;
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_get_user_profiles() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/user-profiles"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "id": "1",
                "user_name": "Alex",
                "gender": "other",
                "age": 34,
                "description": "frequent shopper"
            }
        ])))
        .mount(&server)
        .await;

    let client = BackendClient::new(server.uri());
    let profiles = client.get_user_profiles().await.unwrap();
    assert_eq!(profiles.len(), 1);
    assert_eq!(profiles[0].user_name, "Alex");
    assert_eq!(profiles[0].age, 34);
}

#[tokio::test]
async fn test_get_user_profiles_surfaces_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/user-profiles"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let client = BackendClient::new(server.uri());
    let result = client.get_user_profiles().await;
    assert!(matches!(result, Err(BackendError::Status(503))));
}

#[tokio::test]
async fn test_clear_chat_session() {
    let server = MockServer::start().await;
    let conversation_id = Uuid::new_v4();
    Mock::given(method("DELETE"))
        .and(path(format!("/chat-sessions/alice/{conversation_id}")))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let client = BackendClient::new(server.uri());
    client
        .clear_chat_session("alice", conversation_id)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_speech_token_is_cached_while_fresh() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/get-speech-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "token": "abc123",
            "region": "westeurope"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = SpeechTokenClient::new(server.uri(), Duration::from_secs(480));
    let first = client.get().await.unwrap();
    let second = client.get().await.unwrap();
    assert_eq!(first.token, "abc123");
    assert_eq!(second.token, first.token);
    assert_eq!(second.region, "westeurope");
}

#[tokio::test]
async fn test_speech_token_refetches_when_ttl_too_short_to_cache() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/get-speech-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "token": "abc123",
            "region": "westeurope"
        })))
        .expect(2)
        .mount(&server)
        .await;

    // Lifetime below the refresh margin: every call goes to the backend.
    let client = SpeechTokenClient::new(server.uri(), Duration::from_secs(30));
    client.get().await.unwrap();
    client.get().await.unwrap();
}

#[tokio::test]
async fn test_speech_token_error_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/get-speech-token"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let client = SpeechTokenClient::new(server.uri(), Duration::from_secs(480));
    let result = client.get().await;
    assert!(matches!(result, Err(SpeechError::TokenFetch(_))));
}
