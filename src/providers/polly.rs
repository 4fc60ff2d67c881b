//! Amazon Polly client.
//!
//! Calls the `SynthesizeSpeech` REST endpoint directly, signing each request
//! with AWS Signature Version 4.
//! See: <https://docs.aws.amazon.com/polly/latest/dg/API_SynthesizeSpeech.html>

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::instrument;

use super::traits::SpeechProvider;
use super::voices::VoiceTable;
use super::{credential, excerpt};
use crate::types::{SpeechArtifact, SpeechRequest};
use crate::{ProviderError, Result};

/// Adapter name.
pub const NAME: &str = "polly";

const SERVICE: &str = "polly";
const SPEECH_PATH: &str = "/v1/speech";

type HmacSha256 = Hmac<Sha256>;

/// AWS credentials for Polly.
#[derive(Clone)]
pub struct AwsCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub region: String,
    /// STS session token, for temporary credentials.
    pub session_token: Option<String>,
}

impl AwsCredentials {
    /// Build credentials, returning `None` unless key, secret and region
    /// are all present and non-empty.
    pub fn from_parts(
        access_key_id: Option<String>,
        secret_access_key: Option<String>,
        region: Option<String>,
    ) -> Option<Self> {
        Some(Self {
            access_key_id: credential(access_key_id)?,
            secret_access_key: credential(secret_access_key)?,
            region: credential(region)?,
            session_token: None,
        })
    }
}

impl std::fmt::Debug for AwsCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("region", &self.region)
            .finish_non_exhaustive()
    }
}

#[derive(Clone)]
pub struct PollyProvider {
    credentials: Option<AwsCredentials>,
    http: Client,
    endpoint: Option<String>,
    engine: String,
    voices: VoiceTable,
    timeout: Duration,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct SynthesizeSpeechBody<'a> {
    engine: &'a str,
    language_code: &'a str,
    output_format: &'a str,
    text: &'a str,
    text_type: &'a str,
    voice_id: &'a str,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(rename = "__type")]
    error_type: Option<String>,
    #[serde(alias = "Message")]
    message: Option<String>,
}

/// Headers produced by [`sign`].
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct Signature {
    pub amz_date: String,
    pub authorization: String,
}

impl PollyProvider {
    pub fn new(credentials: Option<AwsCredentials>) -> Self {
        Self {
            credentials,
            http: Client::new(),
            endpoint: None,
            engine: "neural".to_string(),
            voices: VoiceTable::polly(),
            timeout: Duration::from_secs(30),
        }
    }

    /// Override the regional endpoint (for testing with wiremock).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn with_voices(mut self, voices: VoiceTable) -> Self {
        self.voices = voices;
        self
    }

    /// Polly engine: `neural` (default) or `standard`.
    pub fn with_engine(mut self, engine: impl Into<String>) -> Self {
        self.engine = engine.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn speech_url(&self, region: &str) -> std::result::Result<Url, ProviderError> {
        let base = self
            .endpoint
            .clone()
            .unwrap_or_else(|| format!("https://polly.{region}.amazonaws.com"));
        Url::parse(&format!("{}{SPEECH_PATH}", base.trim_end_matches('/')))
            .map_err(|e| ProviderError::misconfigured(format!("invalid Polly endpoint: {e}")))
    }
}

fn hmac_sha256(key: &[u8], data: &str) -> std::result::Result<Vec<u8>, ProviderError> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| ProviderError::misconfigured(format!("signing key: {e}")))?;
    mac.update(data.as_bytes());
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Compute a SigV4 `Authorization` header for a JSON POST.
///
/// Signed headers are `content-type`, `host` and `x-amz-date`, plus
/// `x-amz-security-token` when the credentials carry a session token.
pub(crate) fn sign(
    credentials: &AwsCredentials,
    host: &str,
    path: &str,
    body: &[u8],
    now: DateTime<Utc>,
) -> std::result::Result<Signature, ProviderError> {
    let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
    let date = now.format("%Y%m%d").to_string();
    let payload_hash = hex::encode(Sha256::digest(body));

    let mut canonical_headers =
        format!("content-type:application/json\nhost:{host}\nx-amz-date:{amz_date}\n");
    let mut signed_headers = "content-type;host;x-amz-date".to_string();
    if let Some(token) = &credentials.session_token {
        canonical_headers.push_str(&format!("x-amz-security-token:{token}\n"));
        signed_headers.push_str(";x-amz-security-token");
    }

    let canonical_request =
        format!("POST\n{path}\n\n{canonical_headers}\n{signed_headers}\n{payload_hash}");
    let scope = format!("{date}/{}/{SERVICE}/aws4_request", credentials.region);
    let string_to_sign = format!(
        "AWS4-HMAC-SHA256\n{amz_date}\n{scope}\n{}",
        hex::encode(Sha256::digest(canonical_request.as_bytes()))
    );

    let k_date = hmac_sha256(
        format!("AWS4{}", credentials.secret_access_key).as_bytes(),
        &date,
    )?;
    let k_region = hmac_sha256(&k_date, &credentials.region)?;
    let k_service = hmac_sha256(&k_region, SERVICE)?;
    let k_signing = hmac_sha256(&k_service, "aws4_request")?;
    let signature = hex::encode(hmac_sha256(&k_signing, &string_to_sign)?);

    Ok(Signature {
        authorization: format!(
            "AWS4-HMAC-SHA256 Credential={}/{scope}, SignedHeaders={signed_headers}, Signature={signature}",
            credentials.access_key_id
        ),
        amz_date,
    })
}

/// Map a Polly error response onto a provider error.
pub(crate) fn classify_error(status: u16, body: &str) -> ProviderError {
    let parsed = serde_json::from_str::<ErrorBody>(body).ok();
    let error_type = parsed
        .as_ref()
        .and_then(|b| b.error_type.as_deref())
        // `__type` may be namespaced: "com.amazonaws.polly#ThrottlingException"
        .map(|t| t.rsplit('#').next().unwrap_or(t).to_string());
    let message = parsed
        .and_then(|b| b.message)
        .unwrap_or_else(|| excerpt(body));

    match error_type {
        Some(t) if t == "ThrottlingException" => ProviderError::rate_limited(message).with_code(t),
        Some(t) => ProviderError::from_status(status, message).with_code(t),
        None => ProviderError::from_status(status, message),
    }
}

#[async_trait]
impl SpeechProvider for PollyProvider {
    fn name(&self) -> &str {
        NAME
    }

    fn is_configured(&self) -> bool {
        self.credentials.is_some()
    }

    #[instrument(name = "polly.synthesize", skip(self, request), fields(language = %request.language()))]
    async fn synthesize(&self, request: &SpeechRequest) -> Result<SpeechArtifact> {
        let credentials = self
            .credentials
            .as_ref()
            .ok_or_else(|| ProviderError::misconfigured("AWS credentials not set"))?;
        let voice = self.voices.select(request).ok_or_else(|| {
            ProviderError::misconfigured(format!("no voice for {}", request.language()))
        })?;

        let url = self.speech_url(&credentials.region)?;
        let host = match (url.host_str(), url.port()) {
            (Some(h), Some(port)) => format!("{h}:{port}"),
            (Some(h), None) => h.to_string(),
            (None, _) => return Err(ProviderError::misconfigured("Polly endpoint has no host").into()),
        };

        let body = serde_json::to_vec(&SynthesizeSpeechBody {
            engine: &self.engine,
            language_code: &voice.locale,
            output_format: "mp3",
            text: request.text(),
            text_type: "text",
            voice_id: &voice.id,
        })?;
        let signature = sign(credentials, &host, url.path(), &body, Utc::now())?;

        let mut builder = self
            .http
            .post(url)
            .timeout(self.timeout)
            .header("content-type", "application/json")
            .header("x-amz-date", &signature.amz_date)
            .header("authorization", &signature.authorization);
        if let Some(token) = &credentials.session_token {
            builder = builder.header("x-amz-security-token", token);
        }
        let response = builder
            .body(body)
            .send()
            .await
            .map_err(ProviderError::from)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_error(status.as_u16(), &body).into());
        }

        let bytes = response.bytes().await.map_err(ProviderError::from)?;
        if bytes.is_empty() {
            return Err(ProviderError::unknown("empty audio stream").into());
        }
        Ok(SpeechArtifact::new(bytes.to_vec(), "audio/mpeg", NAME))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use chrono::TimeZone;

    fn credentials() -> AwsCredentials {
        AwsCredentials {
            access_key_id: "AKIDEXAMPLE".into(),
            secret_access_key: "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY".into(),
            region: "eu-west-1".into(),
            session_token: None,
        }
    }

    #[test]
    fn signature_matches_reference_vector() {
        let now = Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap();
        let sig = sign(
            &credentials(),
            "polly.eu-west-1.amazonaws.com",
            "/v1/speech",
            br#"{"Text":"Hola"}"#,
            now,
        )
        .unwrap();
        assert_eq!(sig.amz_date, "20240115T103000Z");
        assert_eq!(
            sig.authorization,
            "AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/20240115/eu-west-1/polly/aws4_request, \
             SignedHeaders=content-type;host;x-amz-date, \
             Signature=caa51fa83b8d45334fb9a70476479fff52b38ece6573384ce9ce62097e6e6620"
        );
    }

    #[test]
    fn session_token_is_signed() {
        let mut creds = credentials();
        creds.session_token = Some("token".into());
        let now = Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap();
        let sig = sign(&creds, "localhost:9000", "/v1/speech", b"{}", now).unwrap();
        assert!(
            sig.authorization
                .contains("SignedHeaders=content-type;host;x-amz-date;x-amz-security-token")
        );
    }

    #[test]
    fn throttling_is_rate_limited() {
        let body = r#"{"__type":"com.amazonaws.polly#ThrottlingException","message":"Rate exceeded"}"#;
        let err = classify_error(400, body);
        assert_eq!(err.kind, ErrorKind::RateLimited);
        assert_eq!(err.code.as_deref(), Some("ThrottlingException"));
        assert_eq!(classify_error(429, "").kind, ErrorKind::RateLimited);
    }

    #[test]
    fn signature_errors_are_misconfigured() {
        let body = r#"{"message":"The request signature we calculated does not match"}"#;
        let err = classify_error(403, body);
        assert_eq!(err.kind, ErrorKind::Misconfigured);
        assert!(err.message.contains("signature"));
    }

    #[test]
    fn credentials_require_all_parts() {
        assert!(AwsCredentials::from_parts(Some("a".into()), Some("b".into()), None).is_none());
        assert!(
            AwsCredentials::from_parts(Some("a".into()), Some("b".into()), Some("us-east-1".into()))
                .is_some()
        );
    }
}
