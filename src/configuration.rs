use config::Config;
use serde::Deserialize;
use std::path::PathBuf;
use tracing::*;

use crate::trigger::TriggerPhraseConfig;

/// Use default config if no path is provided
pub fn get_configuration(config: &Option<PathBuf>) -> Result<AuraConfig, anyhow::Error> {
    let settings = if let Some(config) = config {
        info!("Using configuration from {:?}", config);
        Config::builder()
            .add_source(config::Environment::with_prefix("APP"))
            .add_source(config::File::with_name(
                config
                    .to_str()
                    .ok_or_else(|| anyhow::anyhow!("Failed to convert path"))?,
            ))
            .build()?
    } else {
        info!("Using dev configuration");
        Config::builder()
            .add_source(config::Environment::with_prefix("APP"))
            .add_source(config::File::with_name("config/settings"))
            .build()?
    };

    Ok(settings.try_deserialize()?)
}

#[derive(Deserialize, Debug, Clone)]
pub struct AuraConfig {
    pub trigger: TriggerPhraseConfig,
    pub safety: SafetyConfig,
    pub tts_service_config: TtsServiceConfig,
    pub openai: AuraOpenAiConfig,
    pub location: LocationConfig,
    pub notification: NotificationConfig,
}

#[derive(Deserialize, Debug, Clone)]
pub struct SafetyConfig {
    pub user_id: String,
    #[serde(default = "default_threat_keywords")]
    pub threat_keywords: Vec<String>,
    /// Optional pre-recorded clip used as the captured audio segment
    /// on hosts without a native capture backend
    pub capture_clip_path: Option<String>,
}

fn default_threat_keywords() -> Vec<String> {
    ["help", "stop", "scared", "following", "emergency"]
        .iter()
        .map(|keyword| keyword.to_string())
        .collect()
}

#[derive(Deserialize, Debug, Clone)]
pub struct TtsServiceConfig {
    pub azure_api_key: String,
    pub cache_dir_path: Option<String>,
    pub audio_repository_path: Option<String>,
}

/// Named like this because OpenAiConfig is already a type in the openai crate
#[derive(Deserialize, Debug, Clone)]
pub struct AuraOpenAiConfig {
    pub api_key: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct LocationConfig {
    pub endpoint: Option<String>,
    #[serde(default = "default_location_timeout_seconds")]
    pub timeout_seconds: u64,
}

fn default_location_timeout_seconds() -> u64 {
    10
}

#[derive(Deserialize, Debug, Clone)]
pub struct NotificationConfig {
    pub endpoint: Option<String>,
    #[serde(default)]
    pub emergency_contacts: Vec<String>,
}
