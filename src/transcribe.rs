//! Speech-to-text over an OpenAI-compatible transcription endpoint.
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use std::fmt;
use tracing::{debug, instrument};

use crate::config::Transcription;
use crate::services::Transcriber;

#[derive(Clone)]
pub struct HttpTranscriber {
    http: Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl fmt::Debug for HttpTranscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpTranscriber")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}

impl HttpTranscriber {
    pub fn new(cfg: &Transcription) -> Result<Self> {
        let http = Client::builder()
            .user_agent("wa-invoicer/0.1")
            .build()
            .context("building HTTP client")?;
        Ok(Self {
            http,
            endpoint: cfg.endpoint.clone(),
            api_key: cfg.api_key.clone(),
            model: cfg.model.clone(),
        })
    }

    pub fn build_request(&self, audio: Vec<u8>) -> Result<reqwest::Request> {
        let file = Part::bytes(audio)
            .file_name("voice.ogg")
            .mime_str("audio/ogg")?;
        let form = Form::new()
            .text("model", self.model.clone())
            .part("file", file);
        self.http
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .multipart(form)
            .build()
            .context("failed to build transcription request")
    }
}

#[async_trait]
impl Transcriber for HttpTranscriber {
    #[instrument(skip_all, fields(bytes = audio.len()))]
    async fn transcribe(&self, audio: Vec<u8>) -> Result<String> {
        let request = self.build_request(audio)?;
        let res = self
            .http
            .execute(request)
            .await
            .context("failed to reach transcription service")?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(anyhow!("transcription error {}: {}", status, body));
        }
        let payload: TranscriptionResponse = res
            .json()
            .await
            .context("invalid transcription response JSON")?;
        debug!(chars = payload.text.len(), "voice note transcribed");
        Ok(payload.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_is_authorized_multipart() {
        let t = HttpTranscriber::new(&Transcription {
            endpoint: "https://stt.example.com/v1/audio/transcriptions".into(),
            api_key: "key".into(),
            model: "whisper-1".into(),
        })
        .unwrap();
        let req = t.build_request(vec![1, 2, 3]).unwrap();
        assert_eq!(req.url().path(), "/v1/audio/transcriptions");
        assert_eq!(
            req.headers().get("Authorization").and_then(|h| h.to_str().ok()),
            Some("Bearer key")
        );
        let ct = req
            .headers()
            .get("Content-Type")
            .and_then(|h| h.to_str().ok())
            .unwrap();
        assert!(ct.starts_with("multipart/form-data"));
        assert!(!format!("{t:?}").contains("api_key"));
    }
}
