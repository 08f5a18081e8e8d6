//! TTS client against a mock provider.

use std::time::Duration;

use serde_json::json;
use vmix_tts::{ElevenLabsClient, SpeechSynthesizer, TtsConfig, TtsError};
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer) -> ElevenLabsClient {
    ElevenLabsClient::new(TtsConfig {
        api_key: "test-key".to_string(),
        base_url: server.uri(),
        max_retries: 2,
        retry_base_delay: Duration::from_millis(10),
        ..Default::default()
    })
    .unwrap()
}

async fn mount_voices(server: &MockServer, expected_calls: u64) {
    Mock::given(method("GET"))
        .and(path("/v1/voices"))
        .and(query_param("show_legacy", "true"))
        .and(header("xi-api-key", "test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "voices": [
                { "voice_id": "v-sarah", "name": "Sarah", "preview_url": null },
                { "voice_id": "v-george", "name": "George" }
            ]
        })))
        .expect(expected_calls)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_synthesize_matches_voice_case_insensitively() {
    let server = MockServer::start().await;
    mount_voices(&server, 1).await;
    Mock::given(method("POST"))
        .and(path("/v1/text-to-speech/v-sarah"))
        .and(query_param("output_format", "mp3_44100_128"))
        .and(body_json(json!({
            "text": "Welcome",
            "model_id": "eleven_multilingual_v2"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"ID3audio".to_vec()))
        .expect(2)
        .mount(&server)
        .await;

    let client = client(&server);
    assert_eq!(client.synthesize("Welcome", "sarah").await.unwrap(), b"ID3audio");
    // Voice list is cached after the first call
    assert_eq!(client.synthesize("Welcome", "SARAH").await.unwrap(), b"ID3audio");
}

#[tokio::test]
async fn test_unknown_voice() {
    let server = MockServer::start().await;
    mount_voices(&server, 1).await;

    let err = client(&server)
        .synthesize("Hello", "Nobody")
        .await
        .unwrap_err();
    assert!(matches!(err, TtsError::VoiceNotFound(name) if name == "Nobody"));
}

#[tokio::test]
async fn test_empty_audio_is_an_error() {
    let server = MockServer::start().await;
    mount_voices(&server, 1).await;
    Mock::given(method("POST"))
        .and(path("/v1/text-to-speech/v-george"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let err = client(&server)
        .synthesize("Hello", "George")
        .await
        .unwrap_err();
    assert!(matches!(err, TtsError::EmptyAudio(_)));
}

#[tokio::test]
async fn test_server_errors_are_retried() {
    let server = MockServer::start().await;
    mount_voices(&server, 1).await;
    Mock::given(method("POST"))
        .and(path("/v1/text-to-speech/v-george"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/text-to-speech/v-george"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"audio".to_vec()))
        .expect(1)
        .mount(&server)
        .await;

    let audio = client(&server).synthesize("Hello", "George").await.unwrap();
    assert_eq!(audio, b"audio");
}

#[tokio::test]
async fn test_client_errors_are_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/voices"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server);
    let err = client.list_voices().await.unwrap_err();
    assert!(matches!(err, TtsError::RequestFailed { status: 401, .. }));
    assert!(!err.is_retryable());
}
