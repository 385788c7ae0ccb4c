//! Fixed-size analysis framing over arbitrarily chunked input

/// Cuts a sample stream into frames of `frame_size` spaced `hop_size` apart.
///
/// Frame boundaries depend only on the absolute sample position, never on
/// how the input was chunked, and the internal buffer never grows past one
/// frame. A hop larger than the frame skips the samples in between.
#[derive(Debug, Clone)]
pub struct FrameSplitter {
    frame_size: usize,
    hop_size: usize,
    buffer: Vec<f32>,
    skip: usize,
    frames_emitted: u64,
}

impl FrameSplitter {
    pub fn new(frame_size: usize, hop_size: usize) -> Self {
        let frame_size = frame_size.max(1);
        Self {
            frame_size,
            hop_size: hop_size.max(1),
            buffer: Vec::with_capacity(frame_size),
            skip: 0,
            frames_emitted: 0,
        }
    }

    #[inline]
    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    #[inline]
    pub fn frames_emitted(&self) -> u64 {
        self.frames_emitted
    }

    /// Feed samples, calling `on_frame` for every completed frame
    pub fn push(&mut self, mut samples: &[f32], mut on_frame: impl FnMut(&[f32])) {
        while !samples.is_empty() {
            if self.skip > 0 {
                let n = self.skip.min(samples.len());
                samples = &samples[n..];
                self.skip -= n;
                continue;
            }

            let take = (self.frame_size - self.buffer.len()).min(samples.len());
            self.buffer.extend_from_slice(&samples[..take]);
            samples = &samples[take..];

            if self.buffer.len() == self.frame_size {
                on_frame(&self.buffer);
                self.frames_emitted += 1;
                if self.hop_size >= self.frame_size {
                    self.buffer.clear();
                    self.skip = self.hop_size - self.frame_size;
                } else {
                    self.buffer.drain(..self.hop_size);
                }
            }
        }
    }

    /// If no full frame was ever produced, emit the buffered samples once,
    /// zero-padded to a full frame. Returns whether a frame was emitted.
    pub fn flush_padded(&mut self, mut on_frame: impl FnMut(&[f32])) -> bool {
        if self.frames_emitted > 0 || self.buffer.is_empty() {
            return false;
        }
        let mut frame = self.buffer.clone();
        frame.resize(self.frame_size, 0.0);
        on_frame(&frame);
        self.frames_emitted += 1;
        true
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
        self.skip = 0;
        self.frames_emitted = 0;
    }
}
