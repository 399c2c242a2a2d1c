use super::speech_service::Playable;
use crate::error::{AuraError, AuraResult};
use std::fs::{self, File};
use std::io::prelude::*;
use std::path::PathBuf;

/// On disk cache of synthesized speech keyed by content hash
pub(crate) struct AudioCache {
    cache_dir_path: PathBuf,
}

impl AudioCache {
    pub(crate) fn new(cache_dir_path: String) -> AuraResult<AudioCache> {
        let cache_dir_path = PathBuf::from(cache_dir_path);
        fs::create_dir_all(&cache_dir_path)?;
        if !cache_dir_path.exists() {
            return Err(AuraError::AudioCacheDirError);
        }
        Ok(AudioCache { cache_dir_path })
    }

    pub(crate) fn get(&self, key: &str) -> Option<Box<dyn Playable>> {
        let file_path = self.cache_dir_path.join(format!("{}.mp3", key));
        match File::open(file_path) {
            Ok(file) => Some(Box::new(file)),
            Err(_) => None,
        }
    }

    pub(crate) fn set(&self, key: &str, contents: Vec<u8>) -> AuraResult<()> {
        let file_path = self.cache_dir_path.join(format!("{}.mp3", key));
        let mut file = File::create(file_path)?;
        file.write_all(&contents)?;
        file.flush()?;
        Ok(())
    }
}
