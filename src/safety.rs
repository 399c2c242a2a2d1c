use async_trait::async_trait;
use std::sync::Arc;
use tokio::select;
use tokio::sync::{mpsc, oneshot};
use tracing::*;

use crate::alert::{AlertDispatcher, AlertResult};
use crate::emergency_voice::{EmergencyVoiceSequence, WarningHandle};
use crate::error::{AuraError, AuraResult};
use crate::speech_session::TriggerDetection;
use crate::threat_pipeline::{AudioThreatPipeline, ThreatAssessment};
use crate::transcription::AudioClip;

/// Workflow phase. Exactly one instance exists, owned by the controller
/// task; everything else reads it through snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SafetyState {
    Idle,
    Active,
    Alert,
    SosActive,
    EmergencyVoice,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SafetyEvent {
    Activate,
    Deactivate,
    ThreatDetected,
    SosTrigger,
    EmergencyVoiceTrigger,
    ResetToIdle,
}

/// What the controller must do after a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SideEffect {
    StartCapture,
    StopCapture,
    DispatchAlert,
    BeginEmergencyVoice,
    CancelWorkflow,
}

/// Transition rules for the safety workflow. Pure state, no IO; side
/// effects are returned for the controller to run.
pub struct SafetyStateMachine {
    state: SafetyState,
    transcript: String,
    response: String,
    last_alert: Option<AlertResult>,
}

impl Default for SafetyStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl SafetyStateMachine {
    pub fn new() -> Self {
        Self {
            state: SafetyState::Idle,
            transcript: String::new(),
            response: String::new(),
            last_alert: None,
        }
    }

    pub fn state(&self) -> SafetyState {
        self.state
    }

    pub fn transcript(&self) -> &str {
        &self.transcript
    }

    pub fn response(&self) -> &str {
        &self.response
    }

    pub fn last_alert(&self) -> Option<&AlertResult> {
        self.last_alert.as_ref()
    }

    /// States shown as "at rest", everything else implies a workflow in
    /// progress
    pub fn is_at_rest(&self) -> bool {
        matches!(self.state, SafetyState::Idle | SafetyState::SosActive)
    }

    pub fn record_assessment(&mut self, assessment: &ThreatAssessment) {
        self.transcript = assessment.transcription.clone();
        self.response = assessment.ai_response.clone();
    }

    pub fn record_alert(&mut self, result: AlertResult) {
        self.last_alert = Some(result);
    }

    /// Apply an event. Events with no edge from the current state are
    /// ignored and return no side effect.
    pub fn apply(&mut self, event: SafetyEvent) -> Option<SideEffect> {
        use SafetyEvent::*;
        use SafetyState::*;

        let (next, effect) = match (self.state, event) {
            (Idle, Activate) => (Active, SideEffect::StartCapture),
            (Active, Deactivate) => {
                self.transcript.clear();
                self.response.clear();
                (Idle, SideEffect::StopCapture)
            }
            (Active, ThreatDetected) => (Alert, SideEffect::DispatchAlert),
            (Idle | Active | Alert, SosTrigger) => (SosActive, SideEffect::DispatchAlert),
            (Idle, EmergencyVoiceTrigger) => (EmergencyVoice, SideEffect::BeginEmergencyVoice),
            (_, ResetToIdle) => {
                self.transcript.clear();
                self.response.clear();
                self.last_alert = None;
                (Idle, SideEffect::CancelWorkflow)
            }
            (state, event) => {
                debug!("Ignoring safety event {:?} in state {:?}", event, state);
                return None;
            }
        };
        info!("Safety state {:?} -> {:?} on {:?}", self.state, next, event);
        self.state = next;
        Some(effect)
    }
}

/// Host audio capture. Records one segment for assessment; the concrete
/// recording backend is platform provided.
#[async_trait]
pub trait AudioCapture: Send + Sync {
    async fn capture_clip(&self) -> anyhow::Result<AudioClip>;
    /// Stop any in progress recording
    async fn stop(&self);
}

pub enum SafetyCommand {
    Activate,
    Deactivate,
    SosTrigger,
    EmergencyVoiceTrigger,
    ResetToIdle,
    Snapshot(oneshot::Sender<SafetySnapshot>),
}

#[derive(Debug, Clone)]
pub struct SafetySnapshot {
    pub state: SafetyState,
    pub transcript: String,
    pub response: String,
    pub last_alert: Option<AlertResult>,
}

/// Cloneable handle over the safety controller command channel
#[derive(Clone)]
pub struct SafetyService {
    sender: mpsc::Sender<SafetyCommand>,
}

impl SafetyService {
    pub async fn activate(&self) -> AuraResult<()> {
        self.send(SafetyCommand::Activate).await
    }

    pub async fn deactivate(&self) -> AuraResult<()> {
        self.send(SafetyCommand::Deactivate).await
    }

    pub async fn sos_trigger(&self) -> AuraResult<()> {
        self.send(SafetyCommand::SosTrigger).await
    }

    pub async fn emergency_voice_trigger(&self) -> AuraResult<()> {
        self.send(SafetyCommand::EmergencyVoiceTrigger).await
    }

    pub async fn reset_to_idle(&self) -> AuraResult<()> {
        self.send(SafetyCommand::ResetToIdle).await
    }

    pub async fn snapshot(&self) -> AuraResult<SafetySnapshot> {
        let (reply_sender, reply) = oneshot::channel();
        self.send(SafetyCommand::Snapshot(reply_sender)).await?;
        reply.await.map_err(|_| AuraError::SessionChannelClosed)
    }

    async fn send(&self, command: SafetyCommand) -> AuraResult<()> {
        self.sender
            .send(command)
            .await
            .map_err(|_| AuraError::SessionChannelClosed)
    }
}

/// Runs the safety workflow: applies transitions and executes their side
/// effects, feeding pipeline and dispatcher results back into the machine.
pub struct SafetyController {
    machine: SafetyStateMachine,
    pipeline: AudioThreatPipeline,
    dispatcher: AlertDispatcher,
    emergency_voice: EmergencyVoiceSequence,
    capture: Arc<dyn AudioCapture>,
    user_id: String,
    warning_handle: Option<WarningHandle>,
}

impl SafetyController {
    pub fn new(
        pipeline: AudioThreatPipeline,
        dispatcher: AlertDispatcher,
        emergency_voice: EmergencyVoiceSequence,
        capture: Arc<dyn AudioCapture>,
        user_id: String,
    ) -> Self {
        Self {
            machine: SafetyStateMachine::new(),
            pipeline,
            dispatcher,
            emergency_voice,
            capture,
            user_id,
            warning_handle: None,
        }
    }

    pub async fn run(
        mut self,
        mut commands: mpsc::Receiver<SafetyCommand>,
        mut detections: mpsc::Receiver<TriggerDetection>,
    ) {
        loop {
            select! {
                command = commands.recv() => {
                    match command {
                        Some(command) => self.handle_command(command).await,
                        None => {
                            debug!("Safety command channel closed");
                            break;
                        }
                    }
                }
                detection = detections.recv() => {
                    match detection {
                        Some(detection) => self.handle_trigger(detection).await,
                        None => {
                            debug!("Trigger detection channel closed");
                            break;
                        }
                    }
                }
            }
        }
    }

    async fn handle_trigger(&mut self, detection: TriggerDetection) {
        // a trigger while a workflow is already in flight is dropped,
        // the running workflow takes precedence
        if self.machine.state() != SafetyState::Idle {
            debug!(
                "Ignoring trigger detection in state {:?}",
                self.machine.state()
            );
            return;
        }
        info!(
            "Voice trigger activated safety workflow: {:?}",
            detection.transcript
        );
        self.dispatch(SafetyEvent::Activate).await;
    }

    async fn handle_command(&mut self, command: SafetyCommand) {
        let event = match command {
            SafetyCommand::Activate => SafetyEvent::Activate,
            SafetyCommand::Deactivate => SafetyEvent::Deactivate,
            SafetyCommand::SosTrigger => SafetyEvent::SosTrigger,
            SafetyCommand::EmergencyVoiceTrigger => SafetyEvent::EmergencyVoiceTrigger,
            SafetyCommand::ResetToIdle => SafetyEvent::ResetToIdle,
            SafetyCommand::Snapshot(reply) => {
                let _ = reply.send(SafetySnapshot {
                    state: self.machine.state(),
                    transcript: self.machine.transcript().to_string(),
                    response: self.machine.response().to_string(),
                    last_alert: self.machine.last_alert().cloned(),
                });
                return;
            }
        };
        self.dispatch(event).await;
    }

    async fn dispatch(&mut self, event: SafetyEvent) {
        let Some(effect) = self.machine.apply(event) else {
            return;
        };
        match effect {
            SideEffect::StartCapture => self.run_capture_pipeline().await,
            SideEffect::StopCapture => self.capture.stop().await,
            SideEffect::DispatchAlert => self.run_alert().await,
            SideEffect::BeginEmergencyVoice => {
                self.warning_handle = Some(self.emergency_voice.begin());
            }
            SideEffect::CancelWorkflow => {
                if let Some(handle) = self.warning_handle.take() {
                    handle.cancel();
                }
                self.capture.stop().await;
            }
        }
    }

    /// Runs inline on the dispatch loop: a deactivate or SOS sent during a
    /// slow transcription waits until the assessment lands, and no command
    /// can interleave mid-run. The transition guard below keeps an alert
    /// from firing unless the machine still has an Active -> Alert edge.
    async fn run_capture_pipeline(&mut self) {
        let clip = match self.capture.capture_clip().await {
            Ok(clip) => clip,
            Err(e) => {
                warn!("Audio capture failed, assessing empty clip: {:?}", e);
                AudioClip::new(vec![], "wav")
            }
        };
        let assessment = self.pipeline.process(&clip).await;
        self.machine.record_assessment(&assessment);
        if assessment.threat_detected {
            // guarded by the machine, a stale assessment after deactivation
            // has no Active -> Alert edge to take
            if let Some(SideEffect::DispatchAlert) = self.machine.apply(SafetyEvent::ThreatDetected)
            {
                self.run_alert().await;
            }
        }
    }

    async fn run_alert(&mut self) {
        let location = self.dispatcher.acquire_location().await;
        let result = self.dispatcher.send_alert(&self.user_id, location).await;
        self.machine.record_alert(result);
    }
}

pub fn start_safety_controller(
    pipeline: AudioThreatPipeline,
    dispatcher: AlertDispatcher,
    emergency_voice: EmergencyVoiceSequence,
    capture: Arc<dyn AudioCapture>,
    user_id: String,
    detections: mpsc::Receiver<TriggerDetection>,
) -> SafetyService {
    let (sender, receiver) = mpsc::channel(10);
    let controller = SafetyController::new(pipeline, dispatcher, emergency_voice, capture, user_id);
    tokio::spawn(controller.run(receiver, detections));
    SafetyService { sender }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::{Location, LocationError, Locator, Notifier};
    use crate::threat_pipeline::{ResponseGenerator, ResponseMode, SpeechSynthesizer, Transcriber};
    use chrono::Utc;

    fn assessment(threat: bool) -> ThreatAssessment {
        ThreatAssessment {
            transcription: "please stop following me".to_string(),
            threat_detected: threat,
            ai_response: "stay calm".to_string(),
        }
    }

    fn alert_result() -> AlertResult {
        AlertResult {
            success: true,
            message: "alert sent".to_string(),
            contacts_notified: 2,
            location: Location::FALLBACK,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn activate_starts_capture_and_deactivate_clears() {
        let mut machine = SafetyStateMachine::new();
        assert_eq!(
            machine.apply(SafetyEvent::Activate),
            Some(SideEffect::StartCapture)
        );
        assert_eq!(machine.state(), SafetyState::Active);

        machine.record_assessment(&assessment(false));
        assert!(!machine.transcript().is_empty());

        assert_eq!(
            machine.apply(SafetyEvent::Deactivate),
            Some(SideEffect::StopCapture)
        );
        assert_eq!(machine.state(), SafetyState::Idle);
        assert_eq!(machine.transcript(), "");
        assert_eq!(machine.response(), "");
    }

    #[test]
    fn threat_during_active_raises_alert() {
        let mut machine = SafetyStateMachine::new();
        machine.apply(SafetyEvent::Activate);
        assert_eq!(
            machine.apply(SafetyEvent::ThreatDetected),
            Some(SideEffect::DispatchAlert)
        );
        assert_eq!(machine.state(), SafetyState::Alert);
    }

    #[test]
    fn sos_is_reachable_from_idle_active_and_alert() {
        for setup in [
            vec![],
            vec![SafetyEvent::Activate],
            vec![SafetyEvent::Activate, SafetyEvent::ThreatDetected],
        ] {
            let mut machine = SafetyStateMachine::new();
            for event in setup {
                machine.apply(event);
            }
            assert_eq!(
                machine.apply(SafetyEvent::SosTrigger),
                Some(SideEffect::DispatchAlert)
            );
            assert_eq!(machine.state(), SafetyState::SosActive);
        }
    }

    #[test]
    fn sos_not_reachable_from_emergency_voice() {
        let mut machine = SafetyStateMachine::new();
        machine.apply(SafetyEvent::EmergencyVoiceTrigger);
        assert_eq!(machine.apply(SafetyEvent::SosTrigger), None);
        assert_eq!(machine.state(), SafetyState::EmergencyVoice);
    }

    #[test]
    fn emergency_voice_only_from_idle() {
        let mut machine = SafetyStateMachine::new();
        machine.apply(SafetyEvent::Activate);
        assert_eq!(machine.apply(SafetyEvent::EmergencyVoiceTrigger), None);
        assert_eq!(machine.state(), SafetyState::Active);
    }

    #[test]
    fn reset_returns_to_idle_from_every_state() {
        let setups: Vec<Vec<SafetyEvent>> = vec![
            vec![],
            vec![SafetyEvent::Activate],
            vec![SafetyEvent::Activate, SafetyEvent::ThreatDetected],
            vec![SafetyEvent::SosTrigger],
            vec![SafetyEvent::EmergencyVoiceTrigger],
        ];
        for setup in setups {
            let mut machine = SafetyStateMachine::new();
            for event in setup {
                machine.apply(event);
            }
            machine.record_assessment(&assessment(true));
            machine.record_alert(alert_result());

            assert_eq!(
                machine.apply(SafetyEvent::ResetToIdle),
                Some(SideEffect::CancelWorkflow)
            );
            assert_eq!(machine.state(), SafetyState::Idle);
            assert_eq!(machine.transcript(), "");
            assert_eq!(machine.response(), "");
            assert!(machine.last_alert().is_none());
        }
    }

    #[test]
    fn at_rest_states() {
        let mut machine = SafetyStateMachine::new();
        assert!(machine.is_at_rest());
        machine.apply(SafetyEvent::Activate);
        assert!(!machine.is_at_rest());
        machine.apply(SafetyEvent::SosTrigger);
        assert!(machine.is_at_rest());
    }

    #[test]
    fn invalid_events_are_ignored() {
        let mut machine = SafetyStateMachine::new();
        assert_eq!(machine.apply(SafetyEvent::ThreatDetected), None);
        assert_eq!(machine.apply(SafetyEvent::Deactivate), None);
        assert_eq!(machine.state(), SafetyState::Idle);
    }

    // controller level fakes

    struct FakeCapture;

    #[async_trait]
    impl AudioCapture for FakeCapture {
        async fn capture_clip(&self) -> anyhow::Result<AudioClip> {
            Ok(AudioClip::new(vec![0u8; 8], "wav"))
        }

        async fn stop(&self) {}
    }

    struct FixedTranscriber(&'static str);

    #[async_trait]
    impl Transcriber for FixedTranscriber {
        async fn transcribe(&self, _audio: &AudioClip) -> anyhow::Result<String> {
            Ok(self.0.to_string())
        }
    }

    struct EchoResponder;

    #[async_trait]
    impl ResponseGenerator for EchoResponder {
        async fn respond(&self, transcript: &str, _mode: ResponseMode) -> anyhow::Result<String> {
            Ok(format!("heard {transcript}"))
        }
    }

    struct SilentSynthesizer;

    #[async_trait]
    impl SpeechSynthesizer for SilentSynthesizer {
        async fn speak(&self, _text: &str, _mode: ResponseMode) -> anyhow::Result<()> {
            Ok(())
        }

        fn cancel_all(&self) {}
    }

    struct FixedLocator;

    #[async_trait]
    impl Locator for FixedLocator {
        async fn locate(&self) -> Result<Location, LocationError> {
            Ok(Location {
                latitude: 40.7,
                longitude: -74.0,
            })
        }
    }

    struct FixedNotifier;

    #[async_trait]
    impl Notifier for FixedNotifier {
        async fn notify(&self, _user_id: &str, location: Location) -> anyhow::Result<AlertResult> {
            Ok(AlertResult {
                success: true,
                message: "alert sent".to_string(),
                contacts_notified: 2,
                location,
                timestamp: Utc::now(),
            })
        }
    }

    fn start_test_controller(
        transcript: &'static str,
    ) -> (SafetyService, mpsc::Sender<TriggerDetection>) {
        let pipeline = AudioThreatPipeline::new(
            Arc::new(FixedTranscriber(transcript)),
            Arc::new(EchoResponder),
            Arc::new(SilentSynthesizer),
            vec!["help".to_string(), "following".to_string()],
        );
        let dispatcher = AlertDispatcher::new(Arc::new(FixedLocator), Arc::new(FixedNotifier));
        let emergency_voice = EmergencyVoiceSequence::new(Arc::new(SilentSynthesizer));
        let (detection_sender, detections) = mpsc::channel(10);
        let service = start_safety_controller(
            pipeline,
            dispatcher,
            emergency_voice,
            Arc::new(FakeCapture),
            "user-1".to_string(),
            detections,
        );
        (service, detection_sender)
    }

    /// Let the controller drain what was just sent before the next message,
    /// commands and detections travel on separate channels
    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn trigger_runs_pipeline_and_alerts_on_threat() {
        let (service, detections) = start_test_controller("someone is following me");
        detections
            .send(TriggerDetection {
                transcript: "help aura".to_string(),
                timestamp: Utc::now(),
            })
            .await
            .unwrap();
        settle().await;

        let snapshot = service.snapshot().await.unwrap();
        assert_eq!(snapshot.state, SafetyState::Alert);
        assert_eq!(snapshot.transcript, "someone is following me");
        let alert = snapshot.last_alert.unwrap();
        assert!(alert.success);
        assert_eq!(alert.contacts_notified, 2);
    }

    #[tokio::test]
    async fn benign_trigger_stays_active() {
        let (service, detections) = start_test_controller("what a nice day");
        detections
            .send(TriggerDetection {
                transcript: "help aura".to_string(),
                timestamp: Utc::now(),
            })
            .await
            .unwrap();
        settle().await;

        let snapshot = service.snapshot().await.unwrap();
        assert_eq!(snapshot.state, SafetyState::Active);
        assert!(snapshot.last_alert.is_none());
        assert_eq!(snapshot.response, "heard what a nice day");
    }

    #[tokio::test]
    async fn trigger_during_active_workflow_is_dropped() {
        let (service, detections) = start_test_controller("what a nice day");
        service.sos_trigger().await.unwrap();
        settle().await;
        detections
            .send(TriggerDetection {
                transcript: "help aura".to_string(),
                timestamp: Utc::now(),
            })
            .await
            .unwrap();
        settle().await;

        let snapshot = service.snapshot().await.unwrap();
        // still in the SOS workflow, the trigger did not restart capture
        assert_eq!(snapshot.state, SafetyState::SosActive);
        assert_eq!(snapshot.transcript, "");
    }

    #[tokio::test]
    async fn sos_records_alert_result() {
        let (service, _detections) = start_test_controller("what a nice day");
        service.sos_trigger().await.unwrap();
        let snapshot = service.snapshot().await.unwrap();
        assert_eq!(snapshot.state, SafetyState::SosActive);
        let alert = snapshot.last_alert.unwrap();
        assert_eq!(alert.contacts_notified, 2);
        assert!(alert.success);
    }

    #[tokio::test]
    async fn reset_clears_everything() {
        let (service, detections) = start_test_controller("someone is following me");
        detections
            .send(TriggerDetection {
                transcript: "help aura".to_string(),
                timestamp: Utc::now(),
            })
            .await
            .unwrap();
        settle().await;
        service.reset_to_idle().await.unwrap();

        let snapshot = service.snapshot().await.unwrap();
        assert_eq!(snapshot.state, SafetyState::Idle);
        assert_eq!(snapshot.transcript, "");
        assert_eq!(snapshot.response, "");
        assert!(snapshot.last_alert.is_none());
    }
}
