// SPDX-License-Identifier: MIT

//! HTTP text-to-speech client

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

use super::{SpeechOutput, SpeechRequest, SpeechSynthesizer};
use crate::adk::error::FlowError;

const PROVIDER: &str = "tts";

/// Posts `{text, voice, speed}` to `<base_url>/api/tts` and receives audio bytes
pub struct HttpSpeechSynthesizer {
    client: Client,
    base_url: String,
}

impl HttpSpeechSynthesizer {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, FlowError> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn body(request: &SpeechRequest) -> Value {
        json!({
            "text": request.text,
            "voice": request.voice,
            "speed": request.rate,
        })
    }
}

#[async_trait]
impl SpeechSynthesizer for HttpSpeechSynthesizer {
    async fn synthesize(&self, request: &SpeechRequest) -> Result<SpeechOutput, FlowError> {
        let url = format!("{}/api/tts", self.base_url);
        let resp = self
            .client
            .post(&url)
            .json(&Self::body(request))
            .send()
            .await
            .map_err(|e| FlowError::provider(PROVIDER, format!("TTS server unreachable at {}: {}", url, e)))?;

        if !resp.status().is_success() {
            return Err(FlowError::provider(
                PROVIDER,
                format!("TTS server returned {}", resp.status()),
            ));
        }

        let audio = resp.bytes().await?;
        if let Some(path) = &request.output_file {
            tokio::fs::write(path, &audio).await?;
            log::info!("Wrote {} bytes of audio to {}", audio.len(), path.display());
        }

        Ok(SpeechOutput {
            bytes: audio.len(),
            path: request.output_file.clone(),
        })
    }
}
