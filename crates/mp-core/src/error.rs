//! Error types for Masterprint core

use thiserror::Error;

/// Invalid-input error raised while building or combining audio buffers
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    #[error("Empty audio buffer")]
    EmptyBuffer,

    #[error("Invalid sample rate: {0}")]
    InvalidSampleRate(u32),

    #[error("Channel count mismatch: expected {expected}, got {actual}")]
    ChannelMismatch { expected: usize, actual: usize },

    #[error("Channel {channel} has {actual} frames, expected {expected}")]
    ChannelLength {
        channel: usize,
        expected: usize,
        actual: usize,
    },

    #[error("Interleaved length {len} is not a multiple of {channels} channels")]
    InterleavedLength { len: usize, channels: usize },

    #[error("Non-finite sample in channel {channel} at frame {frame}")]
    NonFiniteSample { channel: usize, frame: usize },
}

/// Result type alias
pub type CoreResult<T> = Result<T, CoreError>;
