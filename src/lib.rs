pub mod alert;
pub mod configuration;
pub mod emergency_voice;
pub mod error;
pub mod geolocation;
pub mod logging;
pub mod notification;
pub mod recognition;
pub mod responder;
pub mod safety;
pub mod speech;
pub mod speech_session;
pub mod threat_pipeline;
pub mod transcription;
pub mod trigger;
