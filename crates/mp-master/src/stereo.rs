//! Mid/side width control

/// Scales the side signal of a stereo pair; other layouts pass through
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StereoWidth {
    width: f64,
}

impl StereoWidth {
    /// Width factor: 0 = mono, 1 = unchanged, 2 = double side
    pub fn new(width: f64) -> Self {
        Self { width: width.max(0.0) }
    }

    pub fn width(&self) -> f64 {
        self.width
    }

    /// Whether processing `channels` would change anything
    pub fn is_active(&self, channels: usize) -> bool {
        channels == 2 && (self.width - 1.0).abs() > 1e-6
    }

    #[inline]
    pub fn process_sample(&self, left: f32, right: f32) -> (f32, f32) {
        let mid = (left + right) * 0.5;
        let side = (left - right) * 0.5 * self.width as f32;
        (mid + side, mid - side)
    }

    pub fn process(&self, channels: &mut [&mut [f32]]) {
        if !self.is_active(channels.len()) {
            return;
        }
        let (left, right) = channels.split_at_mut(1);
        for (l, r) in left[0].iter_mut().zip(right[0].iter_mut()) {
            (*l, *r) = self.process_sample(*l, *r);
        }
    }
}
