//! N-line chorus effect feeding the mixer's chorus bus. Each line is a
//! sine- or triangle-modulated interpolated delay; lines are spread evenly
//! across the stereo field and summed.

// -------------------------------------------------------------------------------------------------

/// Chorus modulation waveform.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum ChorusWaveform {
    #[default]
    Sine,
    Triangle,
}

/// Allowed range for the modulation speed, Hz.
pub const SPEED_RANGE_HZ: (f32, f32) = (0.29, 5.0);
/// Allowed range for the output level multiplier.
pub const LEVEL_RANGE: (f32, f32) = (0.0, 10.0);
/// Maximum number of parallel delay lines.
pub const MAX_LINES: usize = 99;

const MAX_DELAY_MS: f32 = 50.0;

#[derive(Debug, Clone)]
struct DelayLine {
    buffer: Vec<f32>,
    write_pos: usize,
    phase: f32,
}

impl DelayLine {
    fn new(capacity: usize, phase: f32) -> Self {
        Self {
            buffer: vec![0.0; capacity],
            write_pos: 0,
            phase,
        }
    }

    fn write(&mut self, sample: f32) {
        self.buffer[self.write_pos] = sample;
        self.write_pos = (self.write_pos + 1) % self.buffer.len();
    }

    /// Read with linear interpolation `delay_samples` behind the write
    /// position.
    fn read(&self, delay_samples: f32) -> f32 {
        let len = self.buffer.len() as f32;
        let read_pos = (self.write_pos as f32 - delay_samples).rem_euclid(len);
        let i0 = read_pos as usize % self.buffer.len();
        let i1 = (i0 + 1) % self.buffer.len();
        let frac = read_pos - read_pos.floor();
        self.buffer[i0] + (self.buffer[i1] - self.buffer[i0]) * frac
    }
}

// -------------------------------------------------------------------------------------------------

/// A multi-line chorus. Parameters are clamped to musically/numerically
/// safe ranges so a modulator-driven parameter change can never destabilize
/// the delay read position.
pub struct Chorus {
    sample_rate: u32,
    lines: Vec<DelayLine>,
    waveform: ChorusWaveform,
    speed_hz: f32,
    depth_ms: f32,
    level: f32,
    phase_acc: f32,
}

impl Chorus {
    pub fn new(sample_rate: u32, line_count: usize) -> Self {
        let line_count = line_count.clamp(1, MAX_LINES);
        let capacity = (sample_rate as f32 * MAX_DELAY_MS / 1000.0) as usize + 16;
        let lines = (0..line_count)
            .map(|i| DelayLine::new(capacity, i as f32 / line_count as f32))
            .collect();
        Self {
            sample_rate,
            lines,
            waveform: ChorusWaveform::default(),
            speed_hz: 0.3,
            depth_ms: 8.0,
            level: 2.0,
            phase_acc: 0.0,
        }
    }

    pub fn set_line_count(&mut self, line_count: usize) {
        let line_count = line_count.clamp(1, MAX_LINES);
        let capacity = self.lines.first().map_or(
            (self.sample_rate as f32 * MAX_DELAY_MS / 1000.0) as usize + 16,
            |l| l.buffer.len(),
        );
        self.lines = (0..line_count)
            .map(|i| DelayLine::new(capacity, i as f32 / line_count as f32))
            .collect();
    }

    pub fn set_waveform(&mut self, waveform: ChorusWaveform) {
        self.waveform = waveform;
    }

    pub fn set_speed(&mut self, speed_hz: f32) {
        self.speed_hz = speed_hz.clamp(SPEED_RANGE_HZ.0, SPEED_RANGE_HZ.1);
    }

    pub fn set_depth_ms(&mut self, depth_ms: f32) {
        self.depth_ms = depth_ms.clamp(0.0, MAX_DELAY_MS / 2.0);
    }

    pub fn set_level(&mut self, level: f32) {
        self.level = level.clamp(LEVEL_RANGE.0, LEVEL_RANGE.1);
    }

    fn lfo(waveform: ChorusWaveform, phase: f32) -> f32 {
        let p = phase.rem_euclid(1.0);
        match waveform {
            ChorusWaveform::Sine => (p * std::f32::consts::TAU).sin(),
            ChorusWaveform::Triangle => {
                if p < 0.25 {
                    p * 4.0
                } else if p < 0.75 {
                    2.0 - p * 4.0
                } else {
                    p * 4.0 - 4.0
                }
            }
        }
    }

    /// Process a mono input block into a stereo output accumulation buffer
    /// (interleaved L/R pairs), adding into whatever is already there.
    pub fn process(&mut self, input: &[f32], output: &mut [(f32, f32)]) {
        debug_assert_eq!(input.len(), output.len());
        let phase_inc = self.speed_hz / self.sample_rate.max(1) as f32;
        let base_delay = self.depth_ms * self.sample_rate as f32 / 1000.0;
        let line_count = self.lines.len().max(1);
        let waveform = self.waveform;

        for (sample_idx, &sample) in input.iter().enumerate() {
            let mut left = 0.0f32;
            let mut right = 0.0f32;
            for (i, line) in self.lines.iter_mut().enumerate() {
                line.write(sample);
                let mod_val = Self::lfo(waveform, line.phase + self.phase_acc);
                let delay = (base_delay + mod_val * base_delay * 0.5).max(1.0);
                let value = line.read(delay) * self.level / line_count as f32;
                // Pan lines evenly across the stereo field.
                let pan = i as f32 / line_count.max(1) as f32;
                left += value * (1.0 - pan);
                right += value * pan;
            }
            output[sample_idx].0 += left;
            output[sample_idx].1 += right;
            self.phase_acc += phase_inc;
            if self.phase_acc >= 1.0 {
                self.phase_acc -= 1.0;
            }
        }
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silence_in_is_silence_out() {
        let mut chorus = Chorus::new(44100, 3);
        let input = vec![0.0f32; 1000];
        let mut output = vec![(0.0, 0.0); 1000];
        chorus.process(&input, &mut output);
        for (l, r) in output {
            assert_eq!(l, 0.0);
            assert_eq!(r, 0.0);
        }
    }

    #[test]
    fn parameters_clamp_to_safe_ranges() {
        let mut chorus = Chorus::new(44100, 4);
        chorus.set_speed(100.0);
        assert_eq!(chorus.speed_hz, SPEED_RANGE_HZ.1);
        chorus.set_speed(0.0);
        assert_eq!(chorus.speed_hz, SPEED_RANGE_HZ.0);
        chorus.set_level(50.0);
        assert_eq!(chorus.level, LEVEL_RANGE.1);
    }

    #[test]
    fn line_count_is_clamped() {
        let chorus = Chorus::new(44100, 500);
        assert_eq!(chorus.lines.len(), MAX_LINES);
    }

    #[test]
    fn output_stays_finite_with_extreme_params() {
        let mut chorus = Chorus::new(44100, 8);
        chorus.set_speed(5.0);
        chorus.set_depth_ms(25.0);
        chorus.set_level(10.0);
        let input: Vec<f32> = (0..2000).map(|i| (i as f32 * 0.01).sin()).collect();
        let mut output = vec![(0.0, 0.0); 2000];
        chorus.process(&input, &mut output);
        for (l, r) in output {
            assert!(l.is_finite() && r.is_finite());
        }
    }
}
