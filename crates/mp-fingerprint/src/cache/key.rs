//! Content-derived cache keys

use std::fmt;
use std::path::Path;

use mp_core::AudioBuffer;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Opaque identity of a piece of audio content
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentKey(String);

impl ContentKey {
    /// Wrap a key supplied by the library layer
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// SHA-256 over sample rate, channel count and the exact sample bits
    pub fn from_audio(buffer: &AudioBuffer) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(buffer.sample_rate().to_le_bytes());
        hasher.update((buffer.num_channels() as u64).to_le_bytes());
        for channel in buffer.channels() {
            for sample in channel {
                hasher.update(sample.to_bits().to_le_bytes());
            }
        }
        Self(hex::encode(hasher.finalize()))
    }

    /// Path plus modification time, for files that are not decoded yet
    pub fn from_path_mtime(path: impl AsRef<Path>, mtime_secs: u64) -> Self {
        Self(format!("{}@{}", path.as_ref().display(), mtime_secs))
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ContentKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_key_tracks_content() {
        let a = AudioBuffer::mono(vec![0.1, 0.2, 0.3], 44100).unwrap();
        let b = AudioBuffer::mono(vec![0.1, 0.2, 0.3], 44100).unwrap();
        let c = AudioBuffer::mono(vec![0.1, 0.2, 0.31], 44100).unwrap();
        let d = AudioBuffer::mono(vec![0.1, 0.2, 0.3], 48000).unwrap();

        let key = ContentKey::from_audio(&a);
        assert_eq!(key, ContentKey::from_audio(&b));
        assert_ne!(key, ContentKey::from_audio(&c));
        assert_ne!(key, ContentKey::from_audio(&d));
        assert_eq!(key.as_str().len(), 64);
    }

    #[test]
    fn test_path_key() {
        let key = ContentKey::from_path_mtime("/music/track.flac", 1_700_000_000);
        assert_eq!(key.to_string(), "/music/track.flac@1700000000");
        assert_ne!(key, ContentKey::from_path_mtime("/music/track.flac", 1_700_000_001));
    }
}
