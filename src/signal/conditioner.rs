//! Gravity separation for raw accelerometer samples.
//!
//! A single-pole low-pass filter tracks the slowly varying gravity vector;
//! what remains after subtracting it is the vibration we care about.

use crate::models::Sample;

/// Smoothing constant for the gravity estimate.
/// Higher values track gravity more slowly and keep more high-frequency
/// vibration in the output.
pub const GRAVITY_ALPHA: f64 = 0.8;

/// Removes gravity from raw 3-axis samples and reduces them to a magnitude.
#[derive(Debug, Clone, Default)]
pub struct SignalConditioner {
    /// Low-pass gravity estimate per axis, starts at zero.
    gravity: [f64; 3],
}

impl SignalConditioner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gravity(&self) -> [f64; 3] {
        self.gravity
    }

    /// Update the gravity estimate and return the linear acceleration magnitude.
    ///
    /// A non-finite axis value is skipped: it neither moves the filter nor
    /// contributes energy.
    pub fn condition(&mut self, sample: Sample) -> f64 {
        let raw = sample.axes();
        let mut sum_sq = 0.0;

        for axis in 0..3 {
            let value = raw[axis];
            if !value.is_finite() {
                continue;
            }

            self.gravity[axis] = GRAVITY_ALPHA * self.gravity[axis] + (1.0 - GRAVITY_ALPHA) * value;
            let linear = value - self.gravity[axis];
            sum_sq += linear * linear;
        }

        sum_sq.sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_sample_keeps_most_of_its_energy() {
        let mut conditioner = SignalConditioner::new();
        // gravity becomes 0.2 * 10 = 2, linear = 8
        let magnitude = conditioner.condition(Sample::new(0.0, 0.0, 10.0));

        assert!((magnitude - 8.0).abs() < 1e-12);
        assert!((conditioner.gravity()[2] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn steady_gravity_converges_to_zero_output() {
        let mut conditioner = SignalConditioner::new();
        let mut magnitude = f64::MAX;
        for _ in 0..200 {
            magnitude = conditioner.condition(Sample::new(0.0, 0.0, -9.81));
        }

        assert!(magnitude < 1e-6);
        assert!((conditioner.gravity()[2] + 9.81).abs() < 1e-6);
    }

    #[test]
    fn non_finite_axis_is_clamped_to_gravity_estimate() {
        let mut conditioner = SignalConditioner::new();
        for _ in 0..50 {
            conditioner.condition(Sample::new(1.0, 2.0, 3.0));
        }
        let before = conditioner.gravity();

        let magnitude = conditioner.condition(Sample::new(f64::NAN, f64::INFINITY, f64::NEG_INFINITY));

        assert!(magnitude.is_finite());
        assert_eq!(magnitude, 0.0);
        assert_eq!(conditioner.gravity(), before);
    }

    #[test]
    fn partial_non_finite_sample_still_uses_finite_axes() {
        let mut conditioner = SignalConditioner::new();
        let magnitude = conditioner.condition(Sample::new(5.0, f64::NAN, 0.0));

        assert!((magnitude - 4.0).abs() < 1e-12);
        assert_eq!(conditioner.gravity()[1], 0.0);
    }
}
