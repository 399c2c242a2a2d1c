use std::result::Result;
use thiserror::Error;

pub type AuraResult<T> = Result<T, AuraError>;

#[derive(Error, Debug)]
pub enum AuraError {
    #[error("IO error")]
    IoError(#[from] std::io::Error),
    #[error("Audio cache dir error")]
    AudioCacheDirError,
    #[error("Audio repository dir error")]
    AudioRepositoryDirError,
    #[error("Failed to decode audio file")]
    FailedToDecodeAudioFile,
    #[error("Failed to create audio output stream")]
    FailedToCreateAudioOutputStream,
    #[error("Failed to create audio sink")]
    FailedToCreateAudioSink,
    #[cfg(feature = "audio")]
    #[error("Text to speech error")]
    TtsError(#[from] azure_tts::TtsError),
    #[error("Speech recognition is not supported on this host")]
    RecognitionUnsupported,
    #[error("Microphone permission denied")]
    MicrophonePermissionDenied,
    #[error("Speech session channel closed")]
    SessionChannelClosed,
}
