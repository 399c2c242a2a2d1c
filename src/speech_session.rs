use std::sync::Arc;
use std::time::Duration;
use tokio::select;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::*;

use crate::error::{AuraError, AuraResult};
use crate::recognition::{
    PermissionCapability, PermissionState, RecognitionCapability, RecognitionEvent,
    RecognitionSessionState, TranscriptEvent,
};
use crate::trigger::{self, TriggerPhraseConfig};

/// Pause after a detected trigger before the session may restart.
/// Prevents re-matching on trailing speech from the same utterance.
pub const TRIGGER_COOLDOWN: Duration = Duration::from_millis(1000);

#[derive(Debug, Clone)]
pub struct TriggerDetection {
    pub transcript: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug)]
pub enum SessionCommand {
    Start,
    Stop,
    RequestPermission,
}

/// Cloneable handle over the session manager command channel
#[derive(Clone)]
pub struct SpeechSessionHandle {
    sender: mpsc::Sender<SessionCommand>,
}

impl SpeechSessionHandle {
    pub async fn start(&self) -> AuraResult<()> {
        self.sender
            .send(SessionCommand::Start)
            .await
            .map_err(|_| AuraError::SessionChannelClosed)
    }

    pub async fn stop(&self) -> AuraResult<()> {
        self.sender
            .send(SessionCommand::Stop)
            .await
            .map_err(|_| AuraError::SessionChannelClosed)
    }

    pub async fn request_permission(&self) -> AuraResult<()> {
        self.sender
            .send(SessionCommand::RequestPermission)
            .await
            .map_err(|_| AuraError::SessionChannelClosed)
    }
}

/// Owns the one continuous recognition session.
///
/// The recognition backend may end a session on its own after silence or
/// provider limits, so the manager restarts it whenever the feature is still
/// enabled and permission is still granted. All state lives in the dispatch
/// task; callers interact through [`SpeechSessionHandle`].
pub struct SpeechSessionManager {
    recognition: Option<Arc<dyn RecognitionCapability>>,
    permission: Arc<dyn PermissionCapability>,
    trigger: TriggerPhraseConfig,
    detections: mpsc::Sender<TriggerDetection>,
    state: RecognitionSessionState,
    permission_state: PermissionState,
    enabled: bool,
    restart_deadline: Option<Instant>,
}

impl SpeechSessionManager {
    pub fn new(
        recognition: Option<Arc<dyn RecognitionCapability>>,
        permission: Arc<dyn PermissionCapability>,
        trigger: TriggerPhraseConfig,
        detections: mpsc::Sender<TriggerDetection>,
    ) -> Self {
        let permission_state = if recognition.is_some() {
            PermissionState::Prompt
        } else {
            warn!("No recognition backend available, voice activation disabled");
            PermissionState::Unsupported
        };
        Self {
            recognition,
            permission,
            trigger,
            detections,
            state: RecognitionSessionState::Stopped,
            permission_state,
            enabled: false,
            restart_deadline: None,
        }
    }

    pub fn session_state(&self) -> RecognitionSessionState {
        self.state
    }

    pub fn permission_state(&self) -> PermissionState {
        self.permission_state
    }

    pub fn restart_pending(&self) -> bool {
        self.restart_deadline.is_some()
    }

    /// Begin a recognition session if none is active and permission is granted
    pub async fn start(&mut self) -> AuraResult<()> {
        if self.recognition.is_none() {
            self.permission_state = PermissionState::Unsupported;
            return Err(AuraError::RecognitionUnsupported);
        }
        self.enabled = true;
        if self.state != RecognitionSessionState::Stopped {
            debug!("Recognition session already active");
            return Ok(());
        }
        if self.restart_deadline.is_some() {
            debug!("Restart cooldown pending, session will start when it fires");
            return Ok(());
        }
        if self.permission_state == PermissionState::Prompt {
            self.permission_state = self.permission.query().await;
            info!("Microphone permission is {:?}", self.permission_state);
        }
        match self.permission_state {
            PermissionState::Granted => {
                self.begin_session().await;
                Ok(())
            }
            PermissionState::Unsupported => Err(AuraError::RecognitionUnsupported),
            PermissionState::Denied | PermissionState::Prompt => {
                Err(AuraError::MicrophonePermissionDenied)
            }
        }
    }

    /// Forcibly end any active session and cancel any pending restart
    pub async fn stop(&mut self) {
        self.enabled = false;
        self.halt_session().await;
    }

    pub async fn request_permission(&mut self) {
        if self.recognition.is_none() {
            self.permission_state = PermissionState::Unsupported;
            return;
        }
        self.permission_state = self.permission.request().await;
        info!("Microphone permission is now {:?}", self.permission_state);
    }

    pub async fn handle_event(&mut self, event: RecognitionEvent) {
        match event {
            RecognitionEvent::Started => {
                if self.state == RecognitionSessionState::Starting {
                    self.state = RecognitionSessionState::Listening;
                } else {
                    debug!("Ignoring started signal in state {:?}", self.state);
                }
            }
            RecognitionEvent::Result(transcript_event) => {
                self.handle_transcript(transcript_event).await;
            }
            RecognitionEvent::Error(code) => {
                if code.revokes_permission() {
                    warn!("Recognition error {:?} revoked microphone access", code);
                    self.permission_state = PermissionState::Denied;
                    self.halt_session().await;
                } else {
                    warn!("Transient recognition error {:?}", code);
                    // the backend will follow up with an ended signal and
                    // the session goes through the normal restart path
                }
            }
            RecognitionEvent::Ended => {
                if self.state == RecognitionSessionState::Stopped {
                    // we initiated this stop ourselves
                    return;
                }
                self.state = RecognitionSessionState::Ended;
                // read the flags now, not when the session was started
                if self.enabled
                    && self.permission_state == PermissionState::Granted
                    && self.restart_deadline.is_none()
                {
                    debug!("Recognition backend ended the session, restarting");
                    self.begin_session().await;
                } else {
                    self.state = RecognitionSessionState::Stopped;
                }
            }
        }
    }

    /// Called when the post-trigger cooldown elapses
    pub async fn handle_restart_due(&mut self) {
        self.restart_deadline = None;
        // the user may have disabled voice activation or lost permission
        // while the cooldown was running
        if self.enabled
            && self.permission_state == PermissionState::Granted
            && self.state == RecognitionSessionState::Stopped
        {
            self.begin_session().await;
        }
    }

    async fn handle_transcript(&mut self, event: TranscriptEvent) {
        if self.state != RecognitionSessionState::Listening {
            return;
        }
        trace!(transcript = %event.text, is_final = event.is_final, "Transcript event");
        if !trigger::matches(&event.text, &self.trigger.phrase) {
            return;
        }
        info!("Trigger phrase detected in {:?}", event.text);
        // halt before reporting so trailing events from the same utterance
        // cannot fire a second detection
        self.halt_session().await;
        self.restart_deadline = Some(Instant::now() + TRIGGER_COOLDOWN);
        let detection = TriggerDetection {
            transcript: event.text,
            timestamp: chrono::Utc::now(),
        };
        if let Err(e) = self.detections.send(detection).await {
            error!("Failed to report trigger detection: {}", e);
        }
    }

    async fn begin_session(&mut self) {
        let Some(recognition) = self.recognition.as_ref() else {
            return;
        };
        self.state = RecognitionSessionState::Starting;
        if let Err(e) = recognition.start().await {
            error!("Failed to start recognition session: {:?}", e);
            self.state = RecognitionSessionState::Stopped;
        }
        // Listening is entered on the backend started signal
    }

    /// Stop the backend session without touching the enabled flag
    async fn halt_session(&mut self) {
        self.restart_deadline = None;
        if self.state == RecognitionSessionState::Stopped {
            return;
        }
        if let Some(recognition) = self.recognition.as_ref() {
            if let Err(e) = recognition.stop().await {
                warn!("Failed to stop recognition session: {:?}", e);
            }
        }
        self.state = RecognitionSessionState::Stopped;
    }

    /// Single threaded dispatch loop. Commands, backend events and the
    /// cooldown timer are processed one at a time, ordering preserved.
    pub async fn run(
        mut self,
        mut commands: mpsc::Receiver<SessionCommand>,
        mut events: mpsc::Receiver<RecognitionEvent>,
    ) {
        loop {
            let restart_deadline = self.restart_deadline;
            select! {
                command = commands.recv() => {
                    match command {
                        Some(SessionCommand::Start) => {
                            if let Err(e) = self.start().await {
                                warn!("Failed to start voice activation: {}", e);
                            }
                        }
                        Some(SessionCommand::Stop) => self.stop().await,
                        Some(SessionCommand::RequestPermission) => self.request_permission().await,
                        None => {
                            debug!("Speech session command channel closed");
                            break;
                        }
                    }
                }
                event = events.recv() => {
                    match event {
                        Some(event) => self.handle_event(event).await,
                        None => {
                            debug!("Recognition event channel closed");
                            break;
                        }
                    }
                }
                _ = sleep_until_restart(restart_deadline) => {
                    self.handle_restart_due().await;
                }
            }
        }
    }
}

async fn sleep_until_restart(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

pub fn start_speech_session(
    recognition: Option<Arc<dyn RecognitionCapability>>,
    permission: Arc<dyn PermissionCapability>,
    trigger: TriggerPhraseConfig,
    detections: mpsc::Sender<TriggerDetection>,
    events: mpsc::Receiver<RecognitionEvent>,
) -> SpeechSessionHandle {
    let (sender, receiver) = mpsc::channel(10);
    let manager = SpeechSessionManager::new(recognition, permission, trigger, detections);
    tokio::spawn(manager.run(receiver, events));
    SpeechSessionHandle { sender }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeRecognition {
        starts: AtomicUsize,
        stops: AtomicUsize,
        events: mpsc::Sender<RecognitionEvent>,
    }

    impl FakeRecognition {
        fn new(events: mpsc::Sender<RecognitionEvent>) -> Arc<Self> {
            Arc::new(Self {
                starts: AtomicUsize::new(0),
                stops: AtomicUsize::new(0),
                events,
            })
        }

        fn start_count(&self) -> usize {
            self.starts.load(Ordering::SeqCst)
        }

        fn stop_count(&self) -> usize {
            self.stops.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl RecognitionCapability for FakeRecognition {
        async fn start(&self) -> anyhow::Result<()> {
            self.starts.fetch_add(1, Ordering::SeqCst);
            let _ = self.events.send(RecognitionEvent::Started).await;
            Ok(())
        }

        async fn stop(&self) -> anyhow::Result<()> {
            self.stops.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FakePermission {
        state: PermissionState,
    }

    #[async_trait]
    impl PermissionCapability for FakePermission {
        async fn query(&self) -> PermissionState {
            self.state
        }

        async fn request(&self) -> PermissionState {
            self.state
        }
    }

    struct Harness {
        manager: SpeechSessionManager,
        recognition: Arc<FakeRecognition>,
        events: mpsc::Receiver<RecognitionEvent>,
        detections: mpsc::Receiver<TriggerDetection>,
    }

    fn harness(permission: PermissionState) -> Harness {
        let (event_sender, events) = mpsc::channel(10);
        let (detection_sender, detections) = mpsc::channel(10);
        let recognition = FakeRecognition::new(event_sender);
        let manager = SpeechSessionManager::new(
            Some(recognition.clone()),
            Arc::new(FakePermission { state: permission }),
            TriggerPhraseConfig::default(),
            detection_sender,
        );
        Harness {
            manager,
            recognition,
            events,
            detections,
        }
    }

    /// Pump backend events the fake pushed back into the manager
    async fn drain_events(harness: &mut Harness) {
        while let Ok(event) = harness.events.try_recv() {
            harness.manager.handle_event(event).await;
        }
    }

    #[tokio::test]
    async fn start_enters_listening_on_started_signal() {
        let mut harness = harness(PermissionState::Granted);
        harness.manager.start().await.unwrap();
        assert_eq!(
            harness.manager.session_state(),
            RecognitionSessionState::Starting
        );
        drain_events(&mut harness).await;
        assert_eq!(
            harness.manager.session_state(),
            RecognitionSessionState::Listening
        );
        assert_eq!(harness.recognition.start_count(), 1);
    }

    #[tokio::test]
    async fn start_without_permission_reports_denied() {
        let mut harness = harness(PermissionState::Denied);
        let result = harness.manager.start().await;
        assert!(matches!(result, Err(AuraError::MicrophonePermissionDenied)));
        assert_eq!(
            harness.manager.session_state(),
            RecognitionSessionState::Stopped
        );
        assert_eq!(harness.recognition.start_count(), 0);
    }

    #[tokio::test]
    async fn missing_backend_is_unsupported() {
        let (detection_sender, _detections) = mpsc::channel(10);
        let mut manager = SpeechSessionManager::new(
            None,
            Arc::new(FakePermission {
                state: PermissionState::Granted,
            }),
            TriggerPhraseConfig::default(),
            detection_sender,
        );
        assert_eq!(manager.permission_state(), PermissionState::Unsupported);
        let result = manager.start().await;
        assert!(matches!(result, Err(AuraError::RecognitionUnsupported)));
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let mut harness = harness(PermissionState::Granted);
        harness.manager.start().await.unwrap();
        drain_events(&mut harness).await;

        harness.manager.stop().await;
        assert_eq!(
            harness.manager.session_state(),
            RecognitionSessionState::Stopped
        );
        assert_eq!(harness.recognition.stop_count(), 1);

        harness.manager.stop().await;
        assert_eq!(
            harness.manager.session_state(),
            RecognitionSessionState::Stopped
        );
        // no duplicate stop sent to the backend
        assert_eq!(harness.recognition.stop_count(), 1);
    }

    #[tokio::test]
    async fn session_restarts_when_backend_ends_it() {
        let mut harness = harness(PermissionState::Granted);
        harness.manager.start().await.unwrap();
        drain_events(&mut harness).await;

        harness.manager.handle_event(RecognitionEvent::Ended).await;
        assert_eq!(harness.recognition.start_count(), 2);
        drain_events(&mut harness).await;
        assert_eq!(
            harness.manager.session_state(),
            RecognitionSessionState::Listening
        );
    }

    #[tokio::test]
    async fn no_restart_after_stop() {
        let mut harness = harness(PermissionState::Granted);
        harness.manager.start().await.unwrap();
        drain_events(&mut harness).await;
        harness.manager.stop().await;

        harness.manager.handle_event(RecognitionEvent::Ended).await;
        assert_eq!(harness.recognition.start_count(), 1);
        assert_eq!(
            harness.manager.session_state(),
            RecognitionSessionState::Stopped
        );
    }

    #[tokio::test]
    async fn revocation_error_denies_permission_and_halts() {
        use crate::recognition::RecognitionErrorCode;

        let mut harness = harness(PermissionState::Granted);
        harness.manager.start().await.unwrap();
        drain_events(&mut harness).await;

        harness
            .manager
            .handle_event(RecognitionEvent::Error(RecognitionErrorCode::NotAllowed))
            .await;
        assert_eq!(harness.manager.permission_state(), PermissionState::Denied);
        assert_eq!(
            harness.manager.session_state(),
            RecognitionSessionState::Stopped
        );

        // the backend ended signal that follows must not restart
        harness.manager.handle_event(RecognitionEvent::Ended).await;
        assert_eq!(harness.recognition.start_count(), 1);
    }

    #[tokio::test]
    async fn transient_error_keeps_restart_path() {
        use crate::recognition::RecognitionErrorCode;

        let mut harness = harness(PermissionState::Granted);
        harness.manager.start().await.unwrap();
        drain_events(&mut harness).await;

        harness
            .manager
            .handle_event(RecognitionEvent::Error(RecognitionErrorCode::Network))
            .await;
        assert_eq!(harness.manager.permission_state(), PermissionState::Granted);

        harness.manager.handle_event(RecognitionEvent::Ended).await;
        assert_eq!(harness.recognition.start_count(), 2);
    }

    #[tokio::test]
    async fn trigger_fires_exactly_once_and_pauses_session() {
        let mut harness = harness(PermissionState::Granted);
        harness.manager.start().await.unwrap();
        drain_events(&mut harness).await;

        harness
            .manager
            .handle_event(RecognitionEvent::Result(TranscriptEvent {
                text: "help aura".to_string(),
                is_final: false,
            }))
            .await;

        let detection = harness.detections.try_recv().unwrap();
        assert_eq!(detection.transcript, "help aura");
        assert_eq!(
            harness.manager.session_state(),
            RecognitionSessionState::Stopped
        );
        assert!(harness.manager.restart_pending());

        // trailing speech from the same utterance must not re-trigger
        harness
            .manager
            .handle_event(RecognitionEvent::Result(TranscriptEvent {
                text: "help aura please".to_string(),
                is_final: true,
            }))
            .await;
        assert!(harness.detections.try_recv().is_err());
    }

    #[tokio::test]
    async fn unrelated_transcripts_do_not_trigger() {
        let mut harness = harness(PermissionState::Granted);
        harness.manager.start().await.unwrap();
        drain_events(&mut harness).await;

        harness
            .manager
            .handle_event(RecognitionEvent::Result(TranscriptEvent {
                text: "completely unrelated sentence".to_string(),
                is_final: true,
            }))
            .await;
        assert!(harness.detections.try_recv().is_err());
        assert_eq!(
            harness.manager.session_state(),
            RecognitionSessionState::Listening
        );
    }

    #[tokio::test(start_paused = true)]
    async fn restart_waits_for_cooldown() {
        let (event_sender, events) = mpsc::channel(10);
        let (detection_sender, mut detections) = mpsc::channel(10);
        let recognition = FakeRecognition::new(event_sender.clone());
        let manager = SpeechSessionManager::new(
            Some(recognition.clone()),
            Arc::new(FakePermission {
                state: PermissionState::Granted,
            }),
            TriggerPhraseConfig::default(),
            detection_sender,
        );
        let (command_sender, commands) = mpsc::channel(10);
        tokio::spawn(manager.run(commands, events));

        command_sender.send(SessionCommand::Start).await.unwrap();
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;
        assert_eq!(recognition.start_count(), 1);

        event_sender
            .send(RecognitionEvent::Result(TranscriptEvent {
                text: "help aura".to_string(),
                is_final: true,
            }))
            .await
            .unwrap();
        let detection = detections.recv().await.unwrap();
        assert_eq!(detection.transcript, "help aura");

        // no restart before the cooldown elapses
        tokio::time::advance(Duration::from_millis(500)).await;
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
        assert_eq!(recognition.start_count(), 1);

        // exactly one restart after it
        tokio::time::advance(Duration::from_millis(600)).await;
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
        assert_eq!(recognition.start_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_during_cooldown_cancels_restart() {
        let (event_sender, events) = mpsc::channel(10);
        let (detection_sender, mut detections) = mpsc::channel(10);
        let recognition = FakeRecognition::new(event_sender.clone());
        let manager = SpeechSessionManager::new(
            Some(recognition.clone()),
            Arc::new(FakePermission {
                state: PermissionState::Granted,
            }),
            TriggerPhraseConfig::default(),
            detection_sender,
        );
        let (command_sender, commands) = mpsc::channel(10);
        tokio::spawn(manager.run(commands, events));

        command_sender.send(SessionCommand::Start).await.unwrap();
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;

        event_sender
            .send(RecognitionEvent::Result(TranscriptEvent {
                text: "help aura".to_string(),
                is_final: true,
            }))
            .await
            .unwrap();
        detections.recv().await.unwrap();

        command_sender.send(SessionCommand::Stop).await.unwrap();
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;

        tokio::time::advance(Duration::from_secs(5)).await;
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
        assert_eq!(recognition.start_count(), 1);
    }
}
