//! Gemini speech synthesis engine.
//!
//! Calls the speech-capable Gemini model with audio response modality,
//! decodes the returned PCM, and converts it to MP3 via ffmpeg. Requests
//! pass through a token-bucket limiter sized by `GEMINI_TTS_RPM` because
//! the speech endpoint enforces a low per-minute quota.

use std::num::NonZeroU32;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use crate::engine::TtsEngine;
use crate::error::{TtsError, TtsResult};

const DEFAULT_TTS_MODEL: &str = "gemini-2.5-flash-preview-tts";
const DEFAULT_RPM: u32 = 8;
/// PCM format returned by the provider.
const SAMPLE_RATE: u32 = 24_000;
const BYTES_PER_SAMPLE: u32 = 2;

pub struct GeminiTtsEngine {
    api_key: String,
    base_url: String,
    model: String,
    client: reqwest::Client,
    limiter: DefaultDirectRateLimiter,
}

impl GeminiTtsEngine {
    pub fn from_env() -> TtsResult<Self> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .map_err(|_| TtsError::config("GEMINI_API_KEY not set"))?;
        let rpm = std::env::var("GEMINI_TTS_RPM")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .filter(|v| *v > 0)
            .unwrap_or(DEFAULT_RPM);
        Ok(Self::new(api_key, rpm))
    }

    pub fn new(api_key: impl Into<String>, rpm: u32) -> Self {
        let quota = Quota::per_minute(NonZeroU32::new(rpm.max(1)).expect("non-zero rpm"));
        Self {
            api_key: api_key.into(),
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            model: std::env::var("GEMINI_TTS_MODEL").unwrap_or_else(|_| DEFAULT_TTS_MODEL.into()),
            client: reqwest::Client::new(),
            limiter: RateLimiter::direct(quota),
        }
    }

    /// Override the endpoint (tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn request_pcm(&self, text: &str, voice: &str) -> TtsResult<Vec<u8>> {
        self.limiter.until_ready().await;

        let body = json!({
            "contents": [{"role": "user", "parts": [{"text": text}]}],
            "generationConfig": {
                "responseModalities": ["AUDIO"],
                "speechConfig": {
                    "voiceConfig": {"prebuiltVoiceConfig": {"voiceName": voice}}
                }
            }
        });

        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .timeout(Duration::from_secs(180))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(TtsError::Provider {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        let api: TtsApiResponse = response.json().await?;
        let data = api
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .and_then(|c| c.parts.into_iter().next())
            .and_then(|p| p.inline_data)
            .map(|d| d.data)
            .ok_or(TtsError::NoAudio)?;

        base64::engine::general_purpose::STANDARD
            .decode(&data)
            .map_err(|e| TtsError::config(format!("bad audio payload: {e}")))
    }
}

#[async_trait]
impl TtsEngine for GeminiTtsEngine {
    async fn synthesize(&self, text: &str, output_path: &Path, voice: &str) -> TtsResult<f64> {
        debug!(chars = text.len(), voice, "Synthesizing speech");

        let pcm = self.request_pcm(text, voice).await?;
        if pcm.is_empty() {
            return Err(TtsError::NoAudio);
        }

        let duration = pcm.len() as f64 / (SAMPLE_RATE * BYTES_PER_SAMPLE) as f64;

        if let Some(parent) = output_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let wav_path = output_path.with_extension("wav");
        tokio::fs::write(&wav_path, wav_bytes(&pcm)).await?;

        let cmd = lectio_media::FfmpegCommand::new(&wav_path, output_path)
            .output_args(["-codec:a", "libmp3lame", "-q:a", "2"]);
        lectio_media::FfmpegRunner::new().run(&cmd).await?;
        tokio::fs::remove_file(&wav_path).await.ok();

        info!(
            duration,
            output = %output_path.display(),
            "Speech synthesized"
        );
        Ok(duration)
    }

    fn whole_section_tts(&self) -> bool {
        true
    }
}

/// Minimal RIFF/WAV header around 16-bit mono PCM.
fn wav_bytes(pcm: &[u8]) -> Vec<u8> {
    let data_len = pcm.len() as u32;
    let byte_rate = SAMPLE_RATE * BYTES_PER_SAMPLE;
    let mut out = Vec::with_capacity(44 + pcm.len());
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data_len).to_le_bytes());
    out.extend_from_slice(b"WAVEfmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes()); // PCM
    out.extend_from_slice(&1u16.to_le_bytes()); // mono
    out.extend_from_slice(&SAMPLE_RATE.to_le_bytes());
    out.extend_from_slice(&byte_rate.to_le_bytes());
    out.extend_from_slice(&(BYTES_PER_SAMPLE as u16).to_le_bytes());
    out.extend_from_slice(&16u16.to_le_bytes()); // bits per sample
    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());
    out.extend_from_slice(pcm);
    out
}

#[derive(Debug, Deserialize)]
struct TtsApiResponse {
    #[serde(default)]
    candidates: Vec<TtsCandidate>,
}

#[derive(Debug, Deserialize)]
struct TtsCandidate {
    content: Option<TtsContent>,
}

#[derive(Debug, Deserialize)]
struct TtsContent {
    #[serde(default)]
    parts: Vec<TtsPart>,
}

#[derive(Debug, Deserialize)]
struct TtsPart {
    #[serde(rename = "inlineData")]
    inline_data: Option<TtsInlineData>,
}

#[derive(Debug, Deserialize)]
struct TtsInlineData {
    data: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wav_header_layout() {
        let pcm = vec![0u8; 48_000]; // one second of 24 kHz s16 mono
        let wav = wav_bytes(&pcm);
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
        assert_eq!(wav.len(), 44 + pcm.len());
        let sample_rate = u32::from_le_bytes([wav[24], wav[25], wav[26], wav[27]]);
        assert_eq!(sample_rate, 24_000);
    }

    #[test]
    fn test_duration_from_pcm_length() {
        let pcm_len = (SAMPLE_RATE * BYTES_PER_SAMPLE) as usize * 3; // 3 seconds
        let duration = pcm_len as f64 / (SAMPLE_RATE * BYTES_PER_SAMPLE) as f64;
        assert!((duration - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_engine_advertises_whole_section() {
        let engine = GeminiTtsEngine::new("key", 8);
        assert!(engine.whole_section_tts());
    }
}
