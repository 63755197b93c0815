//! OCR capability contract.
//!
//! The recognition algorithm itself is external; docsense consumes it as
//! `bytes + language → text` behind the [`OcrEngine`] trait. Two providers:
//!
//! - **[`DisabledOcr`]** — always errors; the default when no engine is
//!   configured. A page that needs OCR while this provider is active fails
//!   its document with `OcrFailure`.
//! - **[`RemoteOcr`]** — POSTs the raw bytes to a configured HTTP endpoint
//!   and expects `{ "text": "..." }` back, with a bounded timeout.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use crate::config::OcrConfig;
use crate::error::ExtractionError;

/// External OCR capability: raw bytes in, recognized text for one page out.
///
/// `page` selects the region within multi-page input (0 for single images).
#[async_trait]
pub trait OcrEngine: Send + Sync {
    async fn recognize(
        &self,
        bytes: &[u8],
        page: i64,
        language: &str,
    ) -> Result<String, ExtractionError>;
}

/// Create the engine named in the configuration.
pub fn create_engine(config: &OcrConfig) -> Result<Box<dyn OcrEngine>, ExtractionError> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledOcr)),
        "remote" => {
            let endpoint = config.endpoint.clone().ok_or_else(|| {
                ExtractionError::OcrFailure("ocr.endpoint required for remote provider".into())
            })?;
            Ok(Box::new(RemoteOcr {
                endpoint,
                timeout_secs: config.timeout_secs,
            }))
        }
        other => Err(ExtractionError::OcrFailure(format!(
            "unknown OCR provider: {}",
            other
        ))),
    }
}

/// No-op engine used when OCR is not configured.
pub struct DisabledOcr;

#[async_trait]
impl OcrEngine for DisabledOcr {
    async fn recognize(
        &self,
        _bytes: &[u8],
        _page: i64,
        _language: &str,
    ) -> Result<String, ExtractionError> {
        Err(ExtractionError::OcrFailure(
            "OCR provider is disabled".into(),
        ))
    }
}

/// HTTP-backed OCR engine.
pub struct RemoteOcr {
    endpoint: String,
    timeout_secs: u64,
}

#[derive(Deserialize)]
struct OcrResponse {
    text: String,
}

#[async_trait]
impl OcrEngine for RemoteOcr {
    async fn recognize(
        &self,
        bytes: &[u8],
        page: i64,
        language: &str,
    ) -> Result<String, ExtractionError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(self.timeout_secs))
            .build()
            .map_err(|e| ExtractionError::OcrFailure(e.to_string()))?;

        let response = client
            .post(&self.endpoint)
            .query(&[("lang", language), ("page", &page.to_string())])
            .header("Content-Type", "application/octet-stream")
            .body(bytes.to_vec())
            .send()
            .await
            .map_err(|e| ExtractionError::OcrFailure(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ExtractionError::OcrFailure(format!(
                "OCR endpoint returned {}: {}",
                status, body
            )));
        }

        let parsed: OcrResponse = response
            .json()
            .await
            .map_err(|e| ExtractionError::OcrFailure(format!("invalid OCR response: {}", e)))?;

        Ok(parsed.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disabled_engine_always_errors() {
        let err = DisabledOcr.recognize(b"pixels", 0, "eng").await.unwrap_err();
        assert!(matches!(err, ExtractionError::OcrFailure(_)));
    }

    #[test]
    fn remote_engine_requires_endpoint() {
        let mut config = OcrConfig::default();
        config.provider = "remote".to_string();
        assert!(create_engine(&config).is_err());
    }
}
