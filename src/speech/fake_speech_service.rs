use super::AzureVoiceStyle;
use crate::error::AuraResult;
use crate::threat_pipeline::{ResponseMode, SpeechSynthesizer};
use async_trait::async_trait;

/// Silent stand-in used when building without the audio feature
pub struct SpeechService {}

impl SpeechService {
    pub fn new(
        _azure_subscription_key: String,
        _cache_dir_path: Option<String>,
        _audio_repository_path: Option<String>,
    ) -> AuraResult<SpeechService> {
        Ok(SpeechService {})
    }

    pub async fn say_azure(&self, _text: &str) -> AuraResult<()> {
        Ok(())
    }

    pub async fn say_azure_with_style(
        &self,
        _text: &str,
        _style: AzureVoiceStyle,
    ) -> AuraResult<()> {
        Ok(())
    }

    pub fn stop(&self) {}
}

#[async_trait]
impl SpeechSynthesizer for SpeechService {
    async fn speak(&self, _text: &str, _mode: ResponseMode) -> anyhow::Result<()> {
        Ok(())
    }

    fn cancel_all(&self) {}
}
