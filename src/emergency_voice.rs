use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::*;

use crate::threat_pipeline::{ResponseMode, SpeechSynthesizer};

/// Spoken first to stage the simulated call
pub const SIMULATED_CALL_GREETING: &str =
    "This is Aura. Your emergency line is connected and your location is being shared.";

/// Ordered warning script, increasing urgency
pub const WARNING_SCRIPT: [&str; 4] = [
    "I have notified your emergency contacts and shared this location with them.",
    "Authorities are being contacted. Move toward a well lit public area.",
    "Warning. This situation is being recorded and transmitted in real time.",
    "Emergency services have been dispatched to this exact location. Back away now.",
];

const WARNING_INTERVAL: Duration = Duration::from_secs(10);

/// Plays the simulated call and escalating warnings for the emergency
/// voice state. The sequence runs on its own task so ending it cancels
/// queued warnings immediately instead of draining them.
pub struct EmergencyVoiceSequence {
    synthesizer: Arc<dyn SpeechSynthesizer>,
}

impl EmergencyVoiceSequence {
    pub fn new(synthesizer: Arc<dyn SpeechSynthesizer>) -> Self {
        Self { synthesizer }
    }

    pub fn begin(&self) -> WarningHandle {
        info!("Beginning emergency voice sequence");
        let synthesizer = self.synthesizer.clone();
        let task = tokio::spawn(async move {
            if let Err(e) = synthesizer
                .speak(SIMULATED_CALL_GREETING, ResponseMode::Calm)
                .await
            {
                error!("Failed to play call greeting: {:?}", e);
            }
            for warning in WARNING_SCRIPT {
                tokio::time::sleep(WARNING_INTERVAL).await;
                if let Err(e) = synthesizer.speak(warning, ResponseMode::Assertive).await {
                    error!("Failed to play warning: {:?}", e);
                }
            }
        });
        WarningHandle {
            task,
            synthesizer: self.synthesizer.clone(),
        }
    }
}

pub struct WarningHandle {
    task: JoinHandle<()>,
    synthesizer: Arc<dyn SpeechSynthesizer>,
}

impl WarningHandle {
    /// Abort the sequence and silence anything already queued
    pub fn cancel(self) {
        self.task.abort();
        self.synthesizer.cancel_all();
        info!("Emergency voice sequence cancelled");
    }
}
