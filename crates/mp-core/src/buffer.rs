//! Planar audio buffer

use crate::error::{CoreError, CoreResult};
use crate::numeric;

/// Type alias for PCM samples
pub type Sample = f32;

/// Planar multi-channel PCM buffer.
///
/// Construction validates the whole buffer once: at least one channel with at
/// least one frame, a positive sample rate, equal channel lengths and finite
/// samples. Every consumer downstream relies on these guarantees.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    channels: Vec<Vec<Sample>>,
    sample_rate: u32,
}

impl AudioBuffer {
    /// Build from planar channel data
    pub fn from_planar(channels: Vec<Vec<Sample>>, sample_rate: u32) -> CoreResult<Self> {
        if sample_rate == 0 {
            return Err(CoreError::InvalidSampleRate(sample_rate));
        }
        let frames = match channels.first() {
            Some(first) if !first.is_empty() => first.len(),
            _ => return Err(CoreError::EmptyBuffer),
        };

        for (index, channel) in channels.iter().enumerate() {
            if channel.len() != frames {
                return Err(CoreError::ChannelLength {
                    channel: index,
                    expected: frames,
                    actual: channel.len(),
                });
            }
            if let Some(frame) = channel.iter().position(|s| !s.is_finite()) {
                return Err(CoreError::NonFiniteSample {
                    channel: index,
                    frame,
                });
            }
        }

        Ok(Self {
            channels,
            sample_rate,
        })
    }

    /// Single-channel buffer
    pub fn mono(samples: Vec<Sample>, sample_rate: u32) -> CoreResult<Self> {
        Self::from_planar(vec![samples], sample_rate)
    }

    /// Two-channel buffer
    pub fn stereo(left: Vec<Sample>, right: Vec<Sample>, sample_rate: u32) -> CoreResult<Self> {
        Self::from_planar(vec![left, right], sample_rate)
    }

    /// De-interleave `[L0, R0, L1, R1, ...]` style data
    pub fn from_interleaved(
        samples: &[Sample],
        channels: usize,
        sample_rate: u32,
    ) -> CoreResult<Self> {
        if sample_rate == 0 {
            return Err(CoreError::InvalidSampleRate(sample_rate));
        }
        if channels == 0 {
            return Err(CoreError::ChannelMismatch {
                expected: 1,
                actual: 0,
            });
        }
        if samples.is_empty() {
            return Err(CoreError::EmptyBuffer);
        }
        if samples.len() % channels != 0 {
            return Err(CoreError::InterleavedLength {
                len: samples.len(),
                channels,
            });
        }

        let frames = samples.len() / channels;
        let mut planar = vec![Vec::with_capacity(frames); channels];
        for frame in samples.chunks_exact(channels) {
            for (channel, &sample) in planar.iter_mut().zip(frame) {
                channel.push(sample);
            }
        }

        Self::from_planar(planar, sample_rate)
    }

    /// Re-interleave into a single vector
    pub fn to_interleaved(&self) -> Vec<Sample> {
        let channels = self.num_channels();
        let mut out = Vec::with_capacity(self.num_frames() * channels);
        for frame in 0..self.num_frames() {
            for channel in &self.channels {
                out.push(channel[frame]);
            }
        }
        out
    }

    #[inline]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    #[inline]
    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    #[inline]
    pub fn num_frames(&self) -> usize {
        self.channels[0].len()
    }

    /// Length in seconds
    pub fn duration_secs(&self) -> f64 {
        self.num_frames() as f64 / self.sample_rate as f64
    }

    #[inline]
    pub fn is_stereo(&self) -> bool {
        self.channels.len() >= 2
    }

    #[inline]
    pub fn channel(&self, index: usize) -> Option<&[Sample]> {
        self.channels.get(index).map(Vec::as_slice)
    }

    #[inline]
    pub fn channels(&self) -> &[Vec<Sample>] {
        &self.channels
    }

    /// First channel
    #[inline]
    pub fn left(&self) -> &[Sample] {
        &self.channels[0]
    }

    /// Second channel, or the first one for mono material
    #[inline]
    pub fn right(&self) -> &[Sample] {
        self.channels
            .get(1)
            .map(Vec::as_slice)
            .unwrap_or(&self.channels[0])
    }

    /// Consume the buffer and hand back the planar data
    pub fn into_channels(self) -> Vec<Vec<Sample>> {
        self.channels
    }

    /// Average of all channels
    pub fn mono_mix(&self) -> Vec<Sample> {
        if self.channels.len() == 1 {
            return self.channels[0].clone();
        }
        let scale = 1.0 / self.channels.len() as Sample;
        (0..self.num_frames())
            .map(|frame| self.channels.iter().map(|ch| ch[frame]).sum::<Sample>() * scale)
            .collect()
    }

    /// Absolute peak over all channels
    pub fn peak(&self) -> f32 {
        self.channels
            .iter()
            .flat_map(|ch| ch.iter())
            .fold(0.0f32, |acc, &s| acc.max(s.abs()))
    }

    /// RMS over all channels and frames
    pub fn rms(&self) -> f64 {
        let sum_sq: f64 = self
            .channels
            .iter()
            .flat_map(|ch| ch.iter())
            .map(|&s| (s as f64) * (s as f64))
            .sum();
        let count = (self.num_frames() * self.num_channels()) as f64;
        numeric::safe_divide(sum_sq, count, 0.0).sqrt()
    }

    /// Peak level in dBFS, floored at [`numeric::SILENCE_DB`]
    pub fn peak_db(&self) -> f64 {
        numeric::linear_to_db(self.peak() as f64)
    }

    /// RMS level in dBFS, floored at [`numeric::SILENCE_DB`]
    pub fn rms_db(&self) -> f64 {
        numeric::linear_to_db(self.rms())
    }

    /// Apply `f` to every sample.
    ///
    /// Non-finite results are replaced with silence so the buffer invariants
    /// survive arbitrary processing. Returns how many samples were replaced.
    pub fn map_samples(&mut self, mut f: impl FnMut(Sample) -> Sample) -> usize {
        for channel in &mut self.channels {
            for sample in channel.iter_mut() {
                *sample = f(*sample);
            }
        }
        self.silence_non_finite("map_samples")
    }

    /// Run `f` over mutable views of every channel.
    ///
    /// Channel lengths cannot change; non-finite results are replaced with
    /// silence afterwards. Returns how many samples were replaced.
    pub fn process_channels(&mut self, f: impl FnOnce(&mut [&mut [Sample]])) -> usize {
        {
            let mut views: Vec<&mut [Sample]> = self.channels.iter_mut().map(|ch| ch.as_mut_slice()).collect();
            f(&mut views);
        }
        self.silence_non_finite("process_channels")
    }

    fn silence_non_finite(&mut self, context: &str) -> usize {
        let mut replaced = 0;
        for sample in self.channels.iter_mut().flatten() {
            if !sample.is_finite() {
                *sample = 0.0;
                replaced += 1;
            }
        }
        if replaced > 0 {
            log::warn!("{}: replaced {} non-finite samples with silence", context, replaced);
        }
        replaced
    }

    /// Split into consecutive chunks of at most `frames_per_chunk` frames
    pub fn split(&self, frames_per_chunk: usize) -> Vec<AudioBuffer> {
        let size = frames_per_chunk.max(1);
        let frames = self.num_frames();
        (0..frames)
            .step_by(size)
            .map(|start| {
                let end = (start + size).min(frames);
                AudioBuffer {
                    channels: self
                        .channels
                        .iter()
                        .map(|ch| ch[start..end].to_vec())
                        .collect(),
                    sample_rate: self.sample_rate,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_rejects_invalid_input() {
        assert_eq!(
            AudioBuffer::mono(vec![], 44100),
            Err(CoreError::EmptyBuffer)
        );
        assert_eq!(
            AudioBuffer::mono(vec![0.0; 4], 0),
            Err(CoreError::InvalidSampleRate(0))
        );
        assert_eq!(
            AudioBuffer::from_planar(vec![], 48000),
            Err(CoreError::EmptyBuffer)
        );
        assert!(matches!(
            AudioBuffer::stereo(vec![0.0; 4], vec![0.0; 3], 48000),
            Err(CoreError::ChannelLength { channel: 1, .. })
        ));
        assert!(matches!(
            AudioBuffer::mono(vec![0.0, f32::NAN], 48000),
            Err(CoreError::NonFiniteSample { channel: 0, frame: 1 })
        ));
        assert!(matches!(
            AudioBuffer::from_interleaved(&[0.0; 5], 2, 48000),
            Err(CoreError::InterleavedLength { len: 5, channels: 2 })
        ));
    }

    #[test]
    fn test_interleave_round_trip() {
        let data = [0.1, -0.1, 0.2, -0.2, 0.3, -0.3];
        let buffer = AudioBuffer::from_interleaved(&data, 2, 48000).unwrap();
        assert_eq!(buffer.num_frames(), 3);
        assert_eq!(buffer.left(), &[0.1, 0.2, 0.3]);
        assert_eq!(buffer.right(), &[-0.1, -0.2, -0.3]);
        assert_eq!(buffer.to_interleaved(), data.to_vec());
    }

    #[test]
    fn test_mono_mix_and_levels() {
        let buffer = AudioBuffer::stereo(vec![0.5; 100], vec![-0.5; 100], 44100).unwrap();
        assert!(buffer.mono_mix().iter().all(|&s| s == 0.0));
        assert_relative_eq!(buffer.peak(), 0.5);
        assert_relative_eq!(buffer.rms(), 0.5, epsilon = 1e-9);

        let mono = AudioBuffer::mono(vec![0.25; 10], 44100).unwrap();
        assert_eq!(mono.right(), mono.left());
        assert!(!mono.is_stereo());
    }

    #[test]
    fn test_split_preserves_samples() {
        let samples: Vec<f32> = (0..10).map(|i| i as f32 * 0.01).collect();
        let buffer = AudioBuffer::mono(samples.clone(), 8000).unwrap();
        let chunks = buffer.split(4);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[2].num_frames(), 2);
        let joined: Vec<f32> = chunks.iter().flat_map(|c| c.left().to_vec()).collect();
        assert_eq!(joined, samples);
    }

    #[test]
    fn test_map_samples_keeps_finite() {
        let mut buffer = AudioBuffer::mono(vec![0.0, 1.0], 8000).unwrap();
        assert_eq!(buffer.map_samples(|s| 1.0 / s), 1);
        assert_eq!(buffer.left(), &[0.0, 1.0]);
        assert_eq!(buffer.map_samples(|s| s * 0.5), 0);
    }

    #[test]
    fn test_process_channels_sees_every_channel() {
        let mut buffer = AudioBuffer::stereo(vec![0.5; 4], vec![0.25; 4], 8000).unwrap();
        let replaced = buffer.process_channels(|channels| {
            assert_eq!(channels.len(), 2);
            channels[0][0] = f32::INFINITY;
            for sample in channels[1].iter_mut() {
                *sample *= 2.0;
            }
        });
        assert_eq!(replaced, 1);
        assert_eq!(buffer.left(), &[0.0, 0.5, 0.5, 0.5]);
        assert_eq!(buffer.right(), &[0.5; 4]);
    }
}
