//! Loudness measurement
//!
//! ITU-R BS.1770-4 K-weighted loudness with 400 ms gating blocks (75 %
//! overlap), an absolute gate at -70 LUFS and a relative gate 10 LU below the
//! ungated level. Gated blocks are folded into a fixed-size histogram so
//! integrated loudness over an unbounded stream uses constant memory; the
//! same meter serves whole-buffer and streaming measurement.

use std::collections::VecDeque;

use crate::buffer::AudioBuffer;
use crate::numeric::{self, EPSILON};

/// Lowest loudness ever reported (the absolute gate)
pub const LOUDNESS_FLOOR_LUFS: f64 = -70.0;

/// Upper edge of the block histogram
const HISTOGRAM_CEILING_LUFS: f64 = 10.0;

/// Histogram resolution in LU
const HISTOGRAM_STEP_LU: f64 = 0.1;

/// Relative gate offset in LU
const RELATIVE_GATE_LU: f64 = -10.0;

/// 100 ms sub-blocks per 400 ms gating block
const SUB_BLOCKS_PER_GATE: usize = 4;

/// 100 ms sub-blocks per 3 s short-term window
const SUB_BLOCKS_SHORT_TERM: usize = 30;

#[inline]
fn power_to_lufs(power: f64) -> f64 {
    -0.691 + 10.0 * numeric::safe_log10(power, -20.0)
}

/// Second-order section, transposed direct form II
#[derive(Debug, Clone, Copy)]
struct Biquad {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
    z1: f64,
    z2: f64,
}

impl Biquad {
    /// Pass-through section
    const IDENTITY: Biquad = Biquad {
        b0: 1.0,
        b1: 0.0,
        b2: 0.0,
        a1: 0.0,
        a2: 0.0,
        z1: 0.0,
        z2: 0.0,
    };

    #[inline]
    fn process(&mut self, input: f64) -> f64 {
        let output = self.b0 * input + self.z1;
        self.z1 = self.b1 * input - self.a1 * output + self.z2;
        self.z2 = self.b2 * input - self.a2 * output;
        output
    }

    fn reset(&mut self) {
        self.z1 = 0.0;
        self.z2 = 0.0;
    }
}

/// K-weighting filter: high shelf followed by the RLB high-pass.
///
/// Coefficients are derived from the analog prototype for the actual sample
/// rate, so 44.1 kHz and 96 kHz material measure the same as 48 kHz. A stage
/// whose corner sits at or above Nyquist cannot be realized by the bilinear
/// transform and is bypassed; everything such a rate can carry lies below
/// that corner, where the stage is close to flat anyway.
#[derive(Debug, Clone)]
pub struct KWeightingFilter {
    shelf: Biquad,
    highpass: Biquad,
}

/// Corner of the K-weighting high shelf (Hz)
pub const SHELF_CORNER_HZ: f64 = 1681.974450955533;

/// Corner of the RLB high-pass (Hz)
pub const HIGHPASS_CORNER_HZ: f64 = 38.13547087602444;

impl KWeightingFilter {
    pub fn new(sample_rate: u32) -> Self {
        let fs = sample_rate.max(1) as f64;
        let nyquist = fs / 2.0;

        // Stage 1: high shelf, about +4 dB above 2 kHz
        let shelf = if SHELF_CORNER_HZ < nyquist {
            let gain_db = 3.999843853973347;
            let q = 0.7071752369554196;
            let k = (std::f64::consts::PI * SHELF_CORNER_HZ / fs).tan();
            let vh = 10f64.powf(gain_db / 20.0);
            let vb = vh.powf(0.4996667741545416);
            let a0 = 1.0 + k / q + k * k;
            Biquad {
                b0: (vh + vb * k / q + k * k) / a0,
                b1: 2.0 * (k * k - vh) / a0,
                b2: (vh - vb * k / q + k * k) / a0,
                a1: 2.0 * (k * k - 1.0) / a0,
                a2: (1.0 - k / q + k * k) / a0,
                z1: 0.0,
                z2: 0.0,
            }
        } else {
            log::warn!(
                "K-weighting shelf at {:.0} Hz is above Nyquist for {} Hz audio; shelf bypassed",
                SHELF_CORNER_HZ,
                sample_rate
            );
            Biquad::IDENTITY
        };

        // Stage 2: RLB high-pass around 38 Hz
        let highpass = if HIGHPASS_CORNER_HZ < nyquist {
            let q = 0.5003270373238773;
            let k = (std::f64::consts::PI * HIGHPASS_CORNER_HZ / fs).tan();
            let a0 = 1.0 + k / q + k * k;
            Biquad {
                b0: 1.0,
                b1: -2.0,
                b2: 1.0,
                a1: 2.0 * (k * k - 1.0) / a0,
                a2: (1.0 - k / q + k * k) / a0,
                z1: 0.0,
                z2: 0.0,
            }
        } else {
            log::warn!(
                "K-weighting high-pass at {:.0} Hz is above Nyquist for {} Hz audio; high-pass bypassed",
                HIGHPASS_CORNER_HZ,
                sample_rate
            );
            Biquad::IDENTITY
        };

        Self { shelf, highpass }
    }

    #[inline]
    pub fn process(&mut self, input: f64) -> f64 {
        self.highpass.process(self.shelf.process(input))
    }

    pub fn reset(&mut self) {
        self.shelf.reset();
        self.highpass.reset();
    }
}

/// Histogram of gating-block powers.
///
/// Each bin keeps the block count and the summed block power, which is all
/// the two-pass gating needs.
#[derive(Debug, Clone)]
pub struct LoudnessHistogram {
    counts: Vec<u64>,
    power_sums: Vec<f64>,
}

impl Default for LoudnessHistogram {
    fn default() -> Self {
        let bins = ((HISTOGRAM_CEILING_LUFS - LOUDNESS_FLOOR_LUFS) / HISTOGRAM_STEP_LU).ceil() as usize;
        Self {
            counts: vec![0; bins],
            power_sums: vec![0.0; bins],
        }
    }
}

impl LoudnessHistogram {
    #[inline]
    fn bin_index(&self, lufs: f64) -> usize {
        let idx = ((lufs - LOUDNESS_FLOOR_LUFS) / HISTOGRAM_STEP_LU).floor();
        (idx.max(0.0) as usize).min(self.counts.len() - 1)
    }

    /// Add one gating block; blocks below the absolute gate are dropped
    pub fn add_block(&mut self, power: f64) {
        let lufs = power_to_lufs(power);
        if !power.is_finite() || lufs < LOUDNESS_FLOOR_LUFS {
            return;
        }
        let idx = self.bin_index(lufs);
        self.counts[idx] += 1;
        self.power_sums[idx] += power;
    }

    /// Number of blocks that passed the absolute gate
    pub fn block_count(&self) -> u64 {
        self.counts.iter().sum()
    }

    /// Gated integrated loudness, `None` when no block passed the absolute gate
    pub fn integrated(&self) -> Option<f64> {
        let total: u64 = self.block_count();
        if total == 0 {
            return None;
        }
        let ungated = self.power_sums.iter().sum::<f64>() / total as f64;
        let threshold = power_to_lufs(ungated) + RELATIVE_GATE_LU;
        let start = self.bin_index(threshold);

        let count: u64 = self.counts[start..].iter().sum();
        let power: f64 = self.power_sums[start..].iter().sum();
        let gated = numeric::safe_divide(power, count as f64, ungated);
        Some(power_to_lufs(gated).max(LOUDNESS_FLOOR_LUFS))
    }

    pub fn reset(&mut self) {
        self.counts.fill(0);
        self.power_sums.fill(0.0);
    }
}

/// LUFS meter following ITU-R BS.1770-4.
///
/// Channels are weighted equally and averaged, so dual-mono material reads
/// the same as its mono source.
#[derive(Debug, Clone)]
pub struct LufsMeter {
    sample_rate: u32,
    filters: Vec<KWeightingFilter>,
    /// Samples per 100 ms sub-block
    sub_block_size: usize,
    sub_block_power: f64,
    sub_block_fill: usize,
    /// Most recent sub-block powers, newest last
    recent: VecDeque<f64>,
    histogram: LoudnessHistogram,
    /// Ungated running sum for inputs shorter than one gating block
    total_power: f64,
    total_frames: u64,
}

impl LufsMeter {
    pub fn new(sample_rate: u32, channels: usize) -> Self {
        let channels = channels.max(1);
        Self {
            sample_rate,
            filters: vec![KWeightingFilter::new(sample_rate); channels],
            sub_block_size: (sample_rate as usize / 10).max(1),
            sub_block_power: 0.0,
            sub_block_fill: 0,
            recent: VecDeque::with_capacity(SUB_BLOCKS_SHORT_TERM),
            histogram: LoudnessHistogram::default(),
            total_power: 0.0,
            total_frames: 0,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Feed a buffer. Extra channels beyond the meter's width are ignored.
    pub fn process(&mut self, buffer: &AudioBuffer) {
        self.process_planar(buffer.channels());
    }

    /// Feed planar channel data of equal length
    pub fn process_planar(&mut self, channels: &[Vec<f32>]) {
        let used = channels.len().min(self.filters.len());
        if used == 0 {
            return;
        }
        let frames = channels[..used].iter().map(Vec::len).min().unwrap_or(0);
        let scale = 1.0 / used as f64;

        for frame in 0..frames {
            let mut power = 0.0;
            for (filter, channel) in self.filters.iter_mut().zip(&channels[..used]) {
                let filtered = filter.process(channel[frame] as f64);
                power += filtered * filtered;
            }
            let power = power * scale;

            self.total_power += power;
            self.total_frames += 1;
            self.sub_block_power += power;
            self.sub_block_fill += 1;

            if self.sub_block_fill >= self.sub_block_size {
                let mean = self.sub_block_power / self.sub_block_fill as f64;
                self.push_sub_block(mean);
                self.sub_block_power = 0.0;
                self.sub_block_fill = 0;
            }
        }
    }

    fn push_sub_block(&mut self, power: f64) {
        if self.recent.len() == SUB_BLOCKS_SHORT_TERM {
            self.recent.pop_front();
        }
        self.recent.push_back(power);

        if self.recent.len() >= SUB_BLOCKS_PER_GATE {
            let gate_power = self
                .recent
                .iter()
                .rev()
                .take(SUB_BLOCKS_PER_GATE)
                .sum::<f64>()
                / SUB_BLOCKS_PER_GATE as f64;
            self.histogram.add_block(gate_power);
        }
    }

    fn window_lufs(&self, sub_blocks: usize) -> f64 {
        if self.recent.is_empty() {
            return LOUDNESS_FLOOR_LUFS;
        }
        let n = sub_blocks.min(self.recent.len());
        let power = self.recent.iter().rev().take(n).sum::<f64>() / n as f64;
        power_to_lufs(power).max(LOUDNESS_FLOOR_LUFS)
    }

    /// Momentary loudness (last 400 ms)
    pub fn momentary(&self) -> f64 {
        self.window_lufs(SUB_BLOCKS_PER_GATE)
    }

    /// Short-term loudness (last 3 s)
    pub fn short_term(&self) -> f64 {
        self.window_lufs(SUB_BLOCKS_SHORT_TERM)
    }

    /// Gated integrated loudness.
    ///
    /// Inputs shorter than one gating block fall back to the ungated mean
    /// power of everything seen so far. Silence reads [`LOUDNESS_FLOOR_LUFS`].
    pub fn integrated(&self) -> f64 {
        if let Some(lufs) = self.histogram.integrated() {
            return lufs;
        }
        if self.total_frames == 0 || self.recent.len() >= SUB_BLOCKS_PER_GATE {
            return LOUDNESS_FLOOR_LUFS;
        }
        let mean = self.total_power / self.total_frames as f64;
        if mean < EPSILON {
            return LOUDNESS_FLOOR_LUFS;
        }
        power_to_lufs(mean).max(LOUDNESS_FLOOR_LUFS)
    }

    /// Gain in dB that would bring the integrated loudness to `target_lufs`
    pub fn gain_to_target(&self, target_lufs: f64) -> f64 {
        target_lufs - self.integrated()
    }

    pub fn reset(&mut self) {
        for filter in &mut self.filters {
            filter.reset();
        }
        self.sub_block_power = 0.0;
        self.sub_block_fill = 0;
        self.recent.clear();
        self.histogram.reset();
        self.total_power = 0.0;
        self.total_frames = 0;
    }
}

/// Integrated loudness of a whole buffer
pub fn integrated_loudness(buffer: &AudioBuffer) -> f64 {
    integrated_loudness_planar(buffer.channels(), buffer.sample_rate())
}

/// Integrated loudness of planar channel data
pub fn integrated_loudness_planar(channels: &[Vec<f32>], sample_rate: u32) -> f64 {
    let mut meter = LufsMeter::new(sample_rate, channels.len());
    meter.process_planar(channels);
    meter.integrated()
}

/// Linear gain for a loudness change in LU
#[inline]
pub fn lu_to_gain(lu: f64) -> f64 {
    numeric::db_to_linear(lu)
}
