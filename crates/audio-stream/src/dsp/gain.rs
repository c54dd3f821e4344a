use crate::buffer::Buffer;

use super::{Dsp, DspFactory};

/// Linear gain. Unity gain is reported as "not handled" so the chain skips the copy.
#[derive(Clone, Copy, Debug)]
pub struct Gain {
    factor: f32,
}

impl Gain {
    pub fn new(factor: f32) -> Self {
        Self { factor }
    }

    pub fn from_db(db: f32) -> Self {
        Self::new(10f32.powf(db / 20.0))
    }

    pub fn factor(&self) -> f32 {
        self.factor
    }
}

impl Dsp for Gain {
    fn name(&self) -> &str {
        "gain"
    }

    fn process(&mut self, input: &Buffer, output: &mut Buffer) -> bool {
        if self.factor == 1.0 || !self.factor.is_finite() {
            return false;
        }
        output.copy_from_slice(input.samples());
        for s in output.samples_mut() {
            *s *= self.factor;
        }
        true
    }
}

#[derive(Clone, Copy, Debug)]
pub struct GainFactory {
    pub db: f32,
}

impl DspFactory for GainFactory {
    fn create(&self) -> Box<dyn Dsp> {
        Box::new(Gain::from_db(self.db))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_db_converts_to_linear() {
        assert_eq!(Gain::from_db(0.0).factor(), 1.0);
        assert!((Gain::from_db(-6.0).factor() - 0.501_187).abs() < 1e-5);
        assert!((Gain::from_db(20.0).factor() - 10.0).abs() < 1e-4);
    }

    #[test]
    fn unity_gain_passes_through() {
        let input = Buffer::from_interleaved(vec![0.5, -0.5], 48_000, 2);
        let mut output = Buffer::new();
        assert!(!Gain::new(1.0).process(&input, &mut output));
        assert!(output.is_empty());
    }

    #[test]
    fn scales_samples() {
        let input = Buffer::from_interleaved(vec![0.5, -0.25], 48_000, 2);
        let mut output = Buffer::from_interleaved(vec![7.0; 6], 48_000, 2);
        assert!(Gain::new(2.0).process(&input, &mut output));
        assert_eq!(output.samples(), &[1.0, -0.5]);
    }
}
