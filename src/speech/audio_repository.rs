use super::speech_service::Playable;
use crate::error::{AuraError, AuraResult};
use std::fs::{self, File};
use std::path::PathBuf;

/// Pre-recorded sounds shipped with the app, used for startup chimes and
/// as the on-device fallback when cloud synthesis is unreachable
pub struct AudioRepository {
    dir_path: PathBuf,
}

impl AudioRepository {
    pub fn new(dir_path: String) -> AuraResult<Self> {
        let dir_path = PathBuf::from(dir_path);
        fs::create_dir_all(&dir_path)?;
        if !dir_path.exists() {
            return Err(AuraError::AudioRepositoryDirError);
        }
        Ok(Self { dir_path })
    }

    pub fn load(&self, sound_name: &str) -> Option<Box<dyn Playable>> {
        let file_path = self.dir_path.join(sound_name);
        match File::open(file_path) {
            Ok(file) => Some(Box::new(file)),
            Err(_) => None,
        }
    }
}
