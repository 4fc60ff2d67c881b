//! Vendor adapter tests against wiremock servers.
//!
//! Each test points the real HTTP adapters at a local mock server and
//! checks request shape, response decoding and failure classification.

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use wiremock::matchers::{body_partial_json, header, header_exists, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use parlante::providers::{elevenlabs, google_tts, polly};
use parlante::{
    AwsCredentials, CacheConfig, CacheFingerprint, ElevenLabsProvider, ErrorKind, FilesystemStore,
    GoogleTtsProvider, PollyProvider, RetryConfig, SpeechProvider, SpeechRequest, Tutor,
    VoiceOptions,
};

const FAKE_MP3: &[u8] = b"ID3\x04\x00fake-mp3";

fn request(text: &str) -> SpeechRequest {
    SpeechRequest::new(text, "es", VoiceOptions::default()).unwrap()
}

fn google_ok() -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(serde_json::json!({
        "audioContent": STANDARD.encode(FAKE_MP3)
    }))
}

fn aws() -> AwsCredentials {
    AwsCredentials::from_parts(
        Some("AKIDEXAMPLE".into()),
        Some("wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY".into()),
        Some("eu-west-1".into()),
    )
    .unwrap()
}

// ============================================================================
// ElevenLabs
// ============================================================================

#[tokio::test]
async fn elevenlabs_posts_text_and_returns_audio() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/text-to-speech/EXAVITQu4vr4xnSDxMaL"))
        .and(header("xi-api-key", "xi-key"))
        .and(body_partial_json(serde_json::json!({
            "text": "Hola",
            "model_id": "eleven_multilingual_v2"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_raw(FAKE_MP3, "audio/mpeg"))
        .expect(1)
        .mount(&server)
        .await;

    let provider = ElevenLabsProvider::new(Some("xi-key".into())).with_base_url(server.uri());
    let artifact = provider.synthesize(&request("Hola")).await.unwrap();

    assert_eq!(artifact.bytes, FAKE_MP3);
    assert_eq!(artifact.content_type, "audio/mpeg");
    assert_eq!(artifact.provider, elevenlabs::NAME);
}

#[tokio::test]
async fn elevenlabs_quota_exceeded_is_rate_limited() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
            "detail": {
                "status": "quota_exceeded",
                "message": "This request exceeds your quota."
            }
        })))
        .mount(&server)
        .await;

    let provider = ElevenLabsProvider::new(Some("xi-key".into())).with_base_url(server.uri());
    let err = provider.synthesize(&request("Hola")).await.unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::RateLimited));
}

#[tokio::test]
async fn elevenlabs_bad_key_is_misconfigured() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
            "detail": { "status": "invalid_api_key", "message": "Invalid API key" }
        })))
        .mount(&server)
        .await;

    let provider = ElevenLabsProvider::new(Some("xi-key".into())).with_base_url(server.uri());
    let err = provider.synthesize(&request("Hola")).await.unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::Misconfigured));
}

#[tokio::test]
async fn elevenlabs_non_audio_body_is_unknown() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("<html>oops</html>", "text/html"))
        .mount(&server)
        .await;

    let provider = ElevenLabsProvider::new(Some("xi-key".into())).with_base_url(server.uri());
    let err = provider.synthesize(&request("Hola")).await.unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::Unknown));
}

// ============================================================================
// Google Cloud TTS
// ============================================================================

#[tokio::test]
async fn google_decodes_audio_content() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/text:synthesize"))
        .and(query_param("key", "g-key"))
        .and(body_partial_json(serde_json::json!({
            "input": { "text": "Hola" },
            "voice": { "languageCode": "es-ES", "ssmlGender": "FEMALE" },
            "audioConfig": { "audioEncoding": "MP3" }
        })))
        .respond_with(google_ok())
        .expect(1)
        .mount(&server)
        .await;

    let provider = GoogleTtsProvider::new(Some("g-key".into())).with_base_url(server.uri());
    let artifact = provider.synthesize(&request("Hola")).await.unwrap();

    assert_eq!(artifact.bytes, FAKE_MP3);
    assert_eq!(artifact.provider, google_tts::NAME);
}

#[tokio::test]
async fn google_server_error_is_transient() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_string("backend unavailable"))
        .mount(&server)
        .await;

    let provider = GoogleTtsProvider::new(Some("g-key".into())).with_base_url(server.uri());
    let err = provider.synthesize(&request("Hola")).await.unwrap_err();
    assert!(err.is_transient());
}

#[tokio::test]
async fn google_missing_audio_is_unknown() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
        .mount(&server)
        .await;

    let provider = GoogleTtsProvider::new(Some("g-key".into())).with_base_url(server.uri());
    let err = provider.synthesize(&request("Hola")).await.unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::Unknown));
}

// ============================================================================
// Amazon Polly
// ============================================================================

#[tokio::test]
async fn polly_sends_signed_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/speech"))
        .and(header_exists("authorization"))
        .and(header_exists("x-amz-date"))
        .and(body_partial_json(serde_json::json!({
            "Text": "Hola",
            "VoiceId": "Lucia",
            "OutputFormat": "mp3"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_raw(FAKE_MP3, "audio/mpeg"))
        .expect(1)
        .mount(&server)
        .await;

    let provider = PollyProvider::new(Some(aws())).with_endpoint(server.uri());
    let artifact = provider.synthesize(&request("Hola")).await.unwrap();

    assert_eq!(artifact.bytes, FAKE_MP3);
    assert_eq!(artifact.provider, polly::NAME);

    let received = server.received_requests().await.unwrap();
    let auth = received[0]
        .headers
        .get("authorization")
        .unwrap()
        .to_str()
        .unwrap();
    assert!(auth.starts_with("AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/"));
    assert!(auth.contains("/eu-west-1/polly/aws4_request"));
}

#[tokio::test]
async fn polly_throttling_is_rate_limited() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "__type": "com.amazonaws.polly#ThrottlingException",
            "message": "Rate exceeded"
        })))
        .mount(&server)
        .await;

    let provider = PollyProvider::new(Some(aws())).with_endpoint(server.uri());
    let err = provider.synthesize(&request("Hola")).await.unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::RateLimited));
}

#[tokio::test]
async fn polly_bad_signature_is_misconfigured() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(403).set_body_json(serde_json::json!({
            "__type": "InvalidSignatureException",
            "message": "The request signature we calculated does not match"
        })))
        .mount(&server)
        .await;

    let provider = PollyProvider::new(Some(aws())).with_endpoint(server.uri());
    let err = provider.synthesize(&request("Hola")).await.unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::Misconfigured));
}

// ============================================================================
// End to end through the tutor
// ============================================================================

#[tokio::test]
async fn google_only_with_filesystem_cache() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/text:synthesize"))
        .respond_with(google_ok())
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let tutor = Tutor::builder()
        .google_tts("g-key")
        .google_tts_url(server.uri())
        .cache(CacheConfig::new().dir(dir.path()))
        .retry(RetryConfig::disabled())
        .build()
        .await
        .unwrap();

    let first = tutor
        .synthesize("¿Dónde está la biblioteca?", "es", VoiceOptions::default())
        .await
        .unwrap();
    assert_eq!(first.served_by, google_tts::NAME);
    assert_eq!(first.bytes(), FAKE_MP3);

    let store = FilesystemStore::open(dir.path(), None).await.unwrap();
    let fingerprint = CacheFingerprint::of(&request("¿Dónde está la biblioteca?"));
    assert!(store.payload_path(&fingerprint).exists());

    let second = tutor
        .synthesize("¿Dónde está la biblioteca?", "es", VoiceOptions::default())
        .await
        .unwrap();
    assert_eq!(second.served_by, "cache");
    assert_eq!(second.artifact.provider, google_tts::NAME);
    assert_eq!(second.bytes(), FAKE_MP3);
}

#[tokio::test]
async fn cache_survives_a_new_tutor_instance() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(google_ok())
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    for expected in [google_tts::NAME, "cache"] {
        let tutor = Tutor::builder()
            .google_tts("g-key")
            .google_tts_url(server.uri())
            .cache(CacheConfig::new().dir(dir.path()))
            .build()
            .await
            .unwrap();
        let synthesis = tutor
            .synthesize("Hola", "es", VoiceOptions::default())
            .await
            .unwrap();
        assert_eq!(synthesis.served_by, expected);
    }
}

#[tokio::test]
async fn elevenlabs_quota_falls_back_to_google() {
    let eleven = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429).set_body_string("too many requests"))
        .expect(1)
        .mount(&eleven)
        .await;
    let google = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(google_ok())
        .expect(1)
        .mount(&google)
        .await;

    let tutor = Tutor::builder()
        .elevenlabs("xi-key")
        .elevenlabs_url(eleven.uri())
        .google_tts("g-key")
        .google_tts_url(google.uri())
        .build()
        .await
        .unwrap();

    let synthesis = tutor
        .synthesize("Hola", "es", VoiceOptions::default())
        .await
        .unwrap();
    assert_eq!(synthesis.served_by, google_tts::NAME);
}

#[tokio::test]
async fn transient_google_failure_is_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(google_ok())
        .expect(1)
        .mount(&server)
        .await;

    let tutor = Tutor::builder()
        .google_tts("g-key")
        .google_tts_url(server.uri())
        .retry(
            RetryConfig::new()
                .max_attempts(2)
                .initial_delay(Duration::from_millis(10)),
        )
        .build()
        .await
        .unwrap();

    let synthesis = tutor
        .synthesize("Hola", "es", VoiceOptions::default())
        .await
        .unwrap();
    assert_eq!(synthesis.served_by, google_tts::NAME);
}
