use async_trait::async_trait;
use std::sync::Arc;
use tracing::*;

use crate::transcription::AudioClip;

/// Spoken when the transcription collaborator fails
pub const FALLBACK_TRANSCRIPT: &str = "Unable to transcribe audio";
pub const FALLBACK_CALM_RESPONSE: &str =
    "I'm here with you. Everything looks okay right now. Say my name if you need me.";
pub const FALLBACK_ASSERTIVE_RESPONSE: &str = "I have alerted your emergency contacts and shared \
your location. Help is on the way. Step back now.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseMode {
    Calm,
    Assertive,
}

/// Outcome of one pipeline run over a captured audio segment
#[derive(Debug, Clone)]
pub struct ThreatAssessment {
    pub transcription: String,
    pub threat_detected: bool,
    pub ai_response: String,
}

#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, audio: &AudioClip) -> anyhow::Result<String>;
}

#[async_trait]
pub trait ResponseGenerator: Send + Sync {
    async fn respond(&self, transcript: &str, mode: ResponseMode) -> anyhow::Result<String>;
}

#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn speak(&self, text: &str, mode: ResponseMode) -> anyhow::Result<()>;
    /// Stop all queued and in progress playback immediately
    fn cancel_all(&self);
}

/// Chains transcription, threat scanning, response generation and playback.
///
/// Every collaborator failure is converted into a documented fallback value
/// at the point of the call; a run always produces a [`ThreatAssessment`].
/// The caller decides what a detected threat means for the safety state,
/// this component never mutates it.
pub struct AudioThreatPipeline {
    transcriber: Arc<dyn Transcriber>,
    responder: Arc<dyn ResponseGenerator>,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    threat_keywords: Vec<String>,
}

impl AudioThreatPipeline {
    pub fn new(
        transcriber: Arc<dyn Transcriber>,
        responder: Arc<dyn ResponseGenerator>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        threat_keywords: Vec<String>,
    ) -> Self {
        let threat_keywords = threat_keywords
            .into_iter()
            .map(|keyword| keyword.to_lowercase())
            .collect();
        Self {
            transcriber,
            responder,
            synthesizer,
            threat_keywords,
        }
    }

    pub fn scan_for_threat(&self, transcript: &str) -> bool {
        let transcript = transcript.to_lowercase();
        self.threat_keywords
            .iter()
            .any(|keyword| transcript.contains(keyword))
    }

    pub async fn process(&self, audio: &AudioClip) -> ThreatAssessment {
        let transcription = match self.transcriber.transcribe(audio).await {
            Ok(text) => text,
            Err(e) => {
                warn!("Transcription failed, using fallback transcript: {:?}", e);
                FALLBACK_TRANSCRIPT.to_string()
            }
        };

        let threat_detected = self.scan_for_threat(&transcription);
        let mode = if threat_detected {
            info!("Threat keyword found in transcript {:?}", transcription);
            ResponseMode::Assertive
        } else {
            ResponseMode::Calm
        };

        let ai_response = match self.responder.respond(&transcription, mode).await {
            Ok(response) => response,
            Err(e) => {
                warn!("Response generation failed, using canned response: {:?}", e);
                match mode {
                    ResponseMode::Calm => FALLBACK_CALM_RESPONSE.to_string(),
                    ResponseMode::Assertive => FALLBACK_ASSERTIVE_RESPONSE.to_string(),
                }
            }
        };

        // playback problems are display only, never fatal to the run
        if let Err(e) = self.synthesizer.speak(&ai_response, mode).await {
            error!("Failed to play response: {:?}", e);
        }

        ThreatAssessment {
            transcription,
            threat_detected,
            ai_response,
        }
    }
}
