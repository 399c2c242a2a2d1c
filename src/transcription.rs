use anyhow::Context;
use async_openai::{config::OpenAIConfig, types::CreateTranscriptionRequestArgs, Client};
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine};
use serde::{Deserialize, Serialize};
use tempdir::TempDir;

use crate::threat_pipeline::Transcriber;

const VOICE_TO_TEXT_TRANSCRIBE_MODEL: &str = "whisper-1";
const TRANSCRIBE_PROMPT: &str = "Audio captured by Aura, a personal safety companion";

/// One captured audio segment
pub struct AudioClip {
    pub data: Vec<u8>,
    /// .wav, .mp3, etc
    pub format_extension: String,
}

impl AudioClip {
    pub fn new(data: Vec<u8>, format_extension: &str) -> Self {
        Self {
            data,
            format_extension: format_extension.to_string(),
        }
    }
}

/// Audio segment as carried over the wire from capture frontends
#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct Base64AudioMessage {
    pub data: String,
    pub format: String,
}

impl TryFrom<Base64AudioMessage> for AudioClip {
    type Error = anyhow::Error;

    fn try_from(message: Base64AudioMessage) -> anyhow::Result<Self> {
        let data = base64_to_binary(&message.data)?;
        Ok(Self {
            data,
            format_extension: message.format,
        })
    }
}

pub fn base64_to_binary(base64: &str) -> anyhow::Result<Vec<u8>> {
    let decoded = general_purpose::STANDARD
        .decode(base64)
        .context("Failed to parse base64")?;
    Ok(decoded)
}

pub struct OpenAiTranscriber {
    client: Client<OpenAIConfig>,
    language: String,
}

impl OpenAiTranscriber {
    /// `language_tag` is a BCP-47 tag, Whisper only wants the primary subtag
    pub fn new(openai_api_key: &str, language_tag: &str) -> Self {
        let config = OpenAIConfig::new().with_api_key(openai_api_key);
        let client = Client::with_config(config);
        let language = language_tag
            .split('-')
            .next()
            .unwrap_or(language_tag)
            .to_lowercase();
        Self { client, language }
    }
}

#[async_trait]
impl Transcriber for OpenAiTranscriber {
    async fn transcribe(&self, audio: &AudioClip) -> anyhow::Result<String> {
        let temp_dir = TempDir::new("aura_audio_clip")?;
        let temp_audio_file = temp_dir
            .path()
            .join(format!("captured.{}", audio.format_extension));

        tokio::fs::write(&temp_audio_file, &audio.data).await?;

        let request = CreateTranscriptionRequestArgs::default()
            .file(temp_audio_file)
            .model(VOICE_TO_TEXT_TRANSCRIBE_MODEL)
            .language(&self.language)
            .prompt(TRANSCRIBE_PROMPT)
            .build()?;

        let response = self.client.audio().transcribe(request).await?;
        Ok(response.text)
    }
}
