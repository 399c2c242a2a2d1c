use anyhow::Result;
use async_trait::async_trait;
use aura_rust::{
    alert::AlertDispatcher,
    configuration::get_configuration,
    emergency_voice::EmergencyVoiceSequence,
    geolocation::HttpLocator,
    logging,
    notification::WebhookNotifier,
    recognition::{
        PermissionCapability, PermissionState, RecognitionCapability, RecognitionEvent,
        TranscriptEvent,
    },
    responder::OpenAiResponder,
    safety::{start_safety_controller, AudioCapture, SafetyService},
    speech::SpeechService,
    speech_session::{start_speech_session, SpeechSessionHandle},
    threat_pipeline::AudioThreatPipeline,
    transcription::{AudioClip, OpenAiTranscriber},
};
use clap::Parser;
use std::{path::PathBuf, sync::Arc, time::Duration};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::*;

/// Aura personal safety companion
#[derive(Parser)]
#[command(version)]
struct Args {
    /// application configuration
    #[arg(long)]
    config: Option<PathBuf>,
    /// Sets the level of verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Args = Args::parse();
    logging::setup_tracing(args.verbose);
    info!("Starting Aura");

    let app_config = get_configuration(&args.config)?;

    let speech_service = Arc::new(SpeechService::new(
        app_config.tts_service_config.azure_api_key.clone(),
        app_config.tts_service_config.cache_dir_path.clone(),
        app_config.tts_service_config.audio_repository_path.clone(),
    )?);

    let transcriber = Arc::new(OpenAiTranscriber::new(
        &app_config.openai.api_key,
        &app_config.trigger.language,
    ));
    let responder = Arc::new(OpenAiResponder::new(&app_config.openai.api_key));

    let pipeline = AudioThreatPipeline::new(
        transcriber,
        responder,
        speech_service.clone(),
        app_config.safety.threat_keywords.clone(),
    );

    let locator = Arc::new(HttpLocator::new(app_config.location.endpoint.clone()));
    let notifier = Arc::new(WebhookNotifier::new(
        app_config.notification.endpoint.clone(),
        app_config.notification.emergency_contacts.clone(),
    ));
    let dispatcher = AlertDispatcher::new(locator, notifier)
        .with_location_timeout(Duration::from_secs(app_config.location.timeout_seconds));

    let emergency_voice = EmergencyVoiceSequence::new(speech_service.clone());

    let capture = Arc::new(FileClipCapture::new(
        app_config.safety.capture_clip_path.clone(),
    ));

    let (detection_sender, detection_receiver) = mpsc::channel(10);
    let safety_service = start_safety_controller(
        pipeline,
        dispatcher,
        emergency_voice,
        capture,
        app_config.safety.user_id.clone(),
        detection_receiver,
    );

    let (event_sender, event_receiver) = mpsc::channel(32);
    let recognition = Arc::new(StdinRecognition {
        events: event_sender.clone(),
    });
    let session_handle = start_speech_session(
        Some(recognition),
        Arc::new(AlwaysGrantedPermission),
        app_config.trigger.clone(),
        detection_sender,
        event_receiver,
    );

    session_handle.start().await?;
    speech_service
        .say_azure("Aura is listening. Say the trigger phrase if you need me.")
        .await?;

    tokio::spawn(stdin_loop(
        event_sender,
        session_handle.clone(),
        safety_service.clone(),
    ));

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    session_handle.stop().await?;
    safety_service.reset_to_idle().await?;
    Ok(())
}

/// Development recognition backend fed by stdin. Real deployments plug the
/// host platform recognizer into the same event channel.
struct StdinRecognition {
    events: mpsc::Sender<RecognitionEvent>,
}

#[async_trait]
impl RecognitionCapability for StdinRecognition {
    async fn start(&self) -> Result<()> {
        self.events.send(RecognitionEvent::Started).await?;
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.events.send(RecognitionEvent::Ended).await?;
        Ok(())
    }
}

struct AlwaysGrantedPermission;

#[async_trait]
impl PermissionCapability for AlwaysGrantedPermission {
    async fn query(&self) -> PermissionState {
        PermissionState::Granted
    }

    async fn request(&self) -> PermissionState {
        PermissionState::Granted
    }
}

/// Serves a pre-recorded clip as the captured audio segment on hosts
/// without a native capture backend
struct FileClipCapture {
    clip_path: Option<String>,
}

impl FileClipCapture {
    fn new(clip_path: Option<String>) -> Self {
        Self { clip_path }
    }
}

#[async_trait]
impl AudioCapture for FileClipCapture {
    async fn capture_clip(&self) -> Result<AudioClip> {
        let path = self
            .clip_path
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("no capture clip configured"))?;
        let data = tokio::fs::read(path).await?;
        let extension = std::path::Path::new(path)
            .extension()
            .and_then(|extension| extension.to_str())
            .unwrap_or("wav");
        Ok(AudioClip::new(data, extension))
    }

    async fn stop(&self) {}
}

/// Lines are treated as live transcripts; a leading slash makes them
/// commands (/sos, /voice, /reset, /start, /stop, /status)
async fn stdin_loop(
    events: mpsc::Sender<RecognitionEvent>,
    session: SpeechSessionHandle,
    safety: SafetyService,
) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                error!("Failed to read stdin: {}", e);
                break;
            }
        };
        let result: Result<()> = async {
            match line.trim() {
                "" => {}
                "/sos" => safety.sos_trigger().await?,
                "/voice" => safety.emergency_voice_trigger().await?,
                "/reset" => safety.reset_to_idle().await?,
                "/start" => session.start().await?,
                "/stop" => session.stop().await?,
                "/status" => {
                    let snapshot = safety.snapshot().await?;
                    info!("Safety state: {:?}", snapshot.state);
                    if let Some(alert) = snapshot.last_alert {
                        info!(
                            "Last alert: {} ({} contacts)",
                            alert.message, alert.contacts_notified
                        );
                    }
                }
                transcript => {
                    events
                        .send(RecognitionEvent::Result(TranscriptEvent {
                            text: transcript.to_string(),
                            is_final: true,
                        }))
                        .await?;
                }
            }
            Ok(())
        }
        .await;
        if let Err(e) = result {
            error!("Error handling input: {:?}", e);
        }
    }
}
