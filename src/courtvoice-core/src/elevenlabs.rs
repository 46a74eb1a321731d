//! Remote synthesis client.
//!
//! Talks to the game backend's `/text-to-speech` endpoint, which proxies
//! ElevenLabs and returns raw MP3 bytes. One attempt per utterance; the
//! engine handles every failure by degrading, so no retries here.

use async_trait::async_trait;

use crate::backend::{AudioClip, RemoteSynthesizer};
use crate::config::SynthesisConfig;
use crate::error::SpeechError;
use crate::voice::VoiceIdentity;

pub struct ElevenLabsClient {
    client: reqwest::Client,
    endpoint: String,
    model_version: String,
}

impl ElevenLabsClient {
    pub fn new(config: &SynthesisConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model_version: config.model_version.clone(),
        }
    }
}

#[async_trait]
impl RemoteSynthesizer for ElevenLabsClient {
    async fn synthesize(
        &self,
        text: &str,
        voice: VoiceIdentity,
    ) -> Result<AudioClip, SpeechError> {
        #[derive(serde::Serialize)]
        struct TtsRequest<'a> {
            text: &'a str,
            avatar: u8,
            model_ver: &'a str,
        }

        let request = TtsRequest {
            text,
            avatar: voice.avatar_number(),
            model_ver: &self.model_version,
        };

        let response = self
            .client
            .post(format!("{}/text-to-speech", self.endpoint))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SpeechError::RemoteSynthesis(format!(
                "backend TTS error {status}: {body}"
            )));
        }

        let audio = response.bytes().await?;
        if audio.is_empty() {
            return Err(SpeechError::RemoteSynthesis(
                "backend returned empty audio".to_string(),
            ));
        }

        tracing::debug!(
            voice = %voice,
            bytes = audio.len(),
            "received synthesized audio"
        );
        Ok(AudioClip::new(audio.to_vec()))
    }
}
