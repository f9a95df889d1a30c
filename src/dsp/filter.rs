//! Resonant low-pass IIR filter, one per voice, driven by the `initialFilterFc`/
//! `initialFilterQ` generators plus modLFO/modEnv/keytrack modulation of
//! cutoff. Direct Form II, coefficients smoothed linearly over a block to
//! avoid zipper noise when cutoff changes.

// -------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
struct Coefficients {
    b0: f32,
    b1: f32,
    b2: f32,
    a1: f32,
    a2: f32,
    /// Gain compensation applied to the output: `1 / q_lin` below unity Q,
    /// `1 / sqrt(q_lin)` above it, so raising resonance doesn't also raise
    /// overall loudness.
    gain: f32,
}

impl Default for Coefficients {
    fn default() -> Self {
        Self {
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
            a1: 0.0,
            a2: 0.0,
            gain: 1.0,
        }
    }
}

/// Lower bound FluidSynth clamps the filter cutoff to, in Hz.
pub const MIN_CUTOFF_HZ: f32 = 5.0;
/// Cutoff is further clamped to 0.45 * sample_rate to stay well clear of
/// Nyquist where the bilinear transform becomes unstable.
const NYQUIST_FRACTION: f32 = 0.45;
/// Coefficients are only recalculated when the cutoff moved by more than
/// this many Hz since the last recalculation, to avoid doing trig on every
/// sample when modulation is slow.
const RECALC_THRESHOLD_HZ: f32 = 0.01;

fn calculate_coefficients(cutoff_hz: f32, q_db: f32, sample_rate: u32) -> Coefficients {
    let q_db = q_db.max(0.0);
    // SoundFont2 Q is in centibels above the flat response; floor resonance
    // peak gain at the filter's cutoff is q_db/10 dB above passband.
    let q_lin = 10.0f32.powf(q_db / 20.0);
    let gain = 1.0 / if q_lin <= 1.0 { q_lin } else { q_lin.sqrt() };

    let omega = std::f32::consts::TAU * cutoff_hz / sample_rate as f32;
    let sin_omega = omega.sin();
    let cos_omega = omega.cos();
    let alpha = sin_omega / (2.0 * q_lin);

    let a0 = 1.0 + alpha;
    let b0 = ((1.0 - cos_omega) / 2.0) / a0;
    let b1 = (1.0 - cos_omega) / a0;
    let b2 = b0;
    let a1 = (-2.0 * cos_omega) / a0;
    let a2 = (1.0 - alpha) / a0;

    Coefficients {
        b0,
        b1,
        b2,
        a1,
        a2,
        gain,
    }
}

// -------------------------------------------------------------------------------------------------

/// A single Direct Form II biquad low-pass section with linearly ramped
/// coefficients.
#[derive(Debug, Clone)]
pub struct ResonantFilter {
    sample_rate: u32,
    target: Coefficients,
    current: Coefficients,
    /// How many remaining samples of the current block still need to ramp
    /// `current` toward `target`.
    ramp_samples_remaining: u32,
    ramp_step: Coefficients,
    last_cutoff_hz: f32,
    last_q_db: f32,
    // Direct Form II state.
    w1: f32,
    w2: f32,
}

impl ResonantFilter {
    pub fn new(sample_rate: u32) -> Self {
        let coeffs = calculate_coefficients(5000.0, 0.0, sample_rate);
        Self {
            sample_rate,
            target: coeffs,
            current: coeffs,
            ramp_samples_remaining: 0,
            ramp_step: Coefficients::default(),
            last_cutoff_hz: -1.0,
            last_q_db: -1.0,
            w1: 0.0,
            w2: 0.0,
        }
    }

    pub fn reset(&mut self) {
        self.w1 = 0.0;
        self.w2 = 0.0;
    }

    /// Recompute target coefficients for a new cutoff/Q and begin ramping
    /// `current` toward them over `block_size` samples. On the very first
    /// call for a voice (`instant == true`), the new coefficients apply
    /// immediately with no ramp, matching filter startup behavior.
    pub fn set_params(&mut self, cutoff_hz: f32, q_db: f32, block_size: u32, instant: bool) {
        let cutoff_hz = cutoff_hz.clamp(
            MIN_CUTOFF_HZ,
            self.sample_rate as f32 * NYQUIST_FRACTION,
        );
        if !instant
            && (cutoff_hz - self.last_cutoff_hz).abs() < RECALC_THRESHOLD_HZ
            && q_db == self.last_q_db
        {
            return;
        }
        self.last_cutoff_hz = cutoff_hz;
        self.last_q_db = q_db;
        self.target = calculate_coefficients(cutoff_hz, q_db, self.sample_rate);

        if instant || block_size == 0 {
            self.current = self.target;
            self.ramp_samples_remaining = 0;
        } else {
            let n = block_size as f32;
            self.ramp_step = Coefficients {
                b0: (self.target.b0 - self.current.b0) / n,
                b1: (self.target.b1 - self.current.b1) / n,
                b2: (self.target.b2 - self.current.b2) / n,
                a1: (self.target.a1 - self.current.a1) / n,
                a2: (self.target.a2 - self.current.a2) / n,
                gain: (self.target.gain - self.current.gain) / n,
            };
            self.ramp_samples_remaining = block_size;
        }
    }

    #[inline]
    fn advance_ramp(&mut self) {
        if self.ramp_samples_remaining > 0 {
            self.current.b0 += self.ramp_step.b0;
            self.current.b1 += self.ramp_step.b1;
            self.current.b2 += self.ramp_step.b2;
            self.current.a1 += self.ramp_step.a1;
            self.current.a2 += self.ramp_step.a2;
            self.current.gain += self.ramp_step.gain;
            self.ramp_samples_remaining -= 1;
            if self.ramp_samples_remaining == 0 {
                self.current = self.target;
            }
        }
    }

    /// Process one sample through the filter, Direct Form II.
    #[inline]
    pub fn process_sample(&mut self, input: f32) -> f32 {
        self.advance_ramp();
        let c = &self.current;
        let w0 = input - c.a1 * self.w1 - c.a2 * self.w2;
        let output = c.b0 * w0 + c.b1 * self.w1 + c.b2 * self.w2;
        self.w2 = self.w1;
        self.w1 = w0;
        // Flush denormals that would otherwise stall the FPU during silence.
        if self.w1.abs() < 1e-20 {
            self.w1 = 0.0;
        }
        if self.w2.abs() < 1e-20 {
            self.w2 = 0.0;
        }
        output * c.gain
    }

    pub fn process(&mut self, buffer: &mut [f32]) {
        for sample in buffer.iter_mut() {
            *sample = self.process_sample(*sample);
        }
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dc_passes_through_lowpass_at_unity() {
        let mut filter = ResonantFilter::new(44100);
        filter.set_params(1000.0, 0.0, 64, true);
        let mut last = 0.0;
        for _ in 0..2000 {
            last = filter.process_sample(1.0);
        }
        assert!((last - 1.0).abs() < 0.05);
    }

    #[test]
    fn cutoff_is_clamped_to_range() {
        let mut filter = ResonantFilter::new(44100);
        filter.set_params(1.0, 0.0, 64, true);
        assert!(filter.last_cutoff_hz >= MIN_CUTOFF_HZ);
        filter.set_params(100_000.0, 0.0, 64, true);
        assert!(filter.last_cutoff_hz <= 44100.0 * NYQUIST_FRACTION);
    }

    #[test]
    fn silence_in_is_silence_out_and_stays_stable() {
        let mut filter = ResonantFilter::new(44100);
        filter.set_params(8000.0, 200.0, 64, true);
        for _ in 0..10000 {
            let out = filter.process_sample(0.0);
            assert!(out.is_finite());
        }
    }

    #[test]
    fn small_parameter_changes_are_skipped() {
        let mut filter = ResonantFilter::new(44100);
        filter.set_params(1000.0, 0.0, 64, true);
        let before = filter.target.b0;
        filter.set_params(1000.0001, 0.0, 64, false);
        assert_eq!(filter.target.b0, before);
    }
}
