//! Triangular modulation LFO (used for both modLFO and vibLFO), with a
//! silent delay phase before it starts, as SoundFont2 generators 21-24
//! require.

// -------------------------------------------------------------------------------------------------

/// A bipolar [-1, 1] triangle oscillator with a configurable startup delay.
#[derive(Debug, Clone)]
pub struct TriangleLfo {
    phase: f32,
    phase_inc: f32,
    delay_samples_remaining: u32,
}

impl Default for TriangleLfo {
    fn default() -> Self {
        Self {
            phase: 0.0,
            phase_inc: 0.0,
            delay_samples_remaining: 0,
        }
    }
}

impl TriangleLfo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-trigger the LFO: phase resets to 0, and the oscillator stays
    /// silent (emits 0.0) for `delay_samples` before running.
    pub fn note_on(&mut self, sample_rate: u32, rate_hz: f32, delay_samples: u32) {
        self.phase = 0.0;
        self.phase_inc = rate_hz / sample_rate.max(1) as f32;
        self.delay_samples_remaining = delay_samples;
    }

    /// Update the oscillation rate without retriggering the delay/phase
    /// (used when a modulator changes `freqModLFO`/`freqVibLFO` mid-note).
    pub fn set_rate(&mut self, sample_rate: u32, rate_hz: f32) {
        self.phase_inc = rate_hz / sample_rate.max(1) as f32;
    }

    #[inline]
    fn triangle(phase: f32) -> f32 {
        if phase < 0.25 {
            phase * 4.0
        } else if phase < 0.75 {
            2.0 - phase * 4.0
        } else {
            phase * 4.0 - 4.0
        }
    }

    /// Advance by one sample and return the new value.
    #[inline]
    pub fn run(&mut self) -> f32 {
        if self.delay_samples_remaining > 0 {
            self.delay_samples_remaining -= 1;
            return 0.0;
        }
        let value = Self::triangle(self.phase);
        self.phase += self.phase_inc;
        if self.phase >= 1.0 {
            self.phase -= 1.0;
        }
        value
    }

    pub fn process(&mut self, output: &mut [f32]) {
        for sample in output.iter_mut() {
            *sample = self.run();
        }
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_holds_silence() {
        let mut lfo = TriangleLfo::new();
        lfo.note_on(1000, 1.0, 3);
        assert_eq!(lfo.run(), 0.0);
        assert_eq!(lfo.run(), 0.0);
        assert_eq!(lfo.run(), 0.0);
        // Phase starts at zero once the delay ends, so the oscillator
        // itself needs a few more samples before it leaves zero.
        let resumed = (0..10).map(|_| lfo.run()).any(|v| v != 0.0);
        assert!(resumed);
    }

    #[test]
    fn triangle_shape_is_bipolar_and_bounded() {
        let mut lfo = TriangleLfo::new();
        lfo.note_on(100, 1.0, 0);
        let mut min = f32::MAX;
        let mut max = f32::MIN;
        for _ in 0..100 {
            let v = lfo.run();
            min = min.min(v);
            max = max.max(v);
        }
        assert!((-1.0..=-0.9).contains(&min));
        assert!((0.9..=1.0).contains(&max));
    }
}
