//! Six-stage DAHDSR envelope generator used for both the volume and the
//! modulation envelope of an RVoice.

// -------------------------------------------------------------------------------------------------

/// Current processing stage of a [`DahdsrEnvelope`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum DahdsrStage {
    #[default]
    Idle,
    Delay,
    Attack,
    Hold,
    Decay,
    Sustain,
    Release,
}

// -------------------------------------------------------------------------------------------------

/// Envelope segment durations and levels, in samples at the owning voice's
/// render sample rate. `sustain_level` is linear (0.0..=1.0); attack is a
/// linear ramp-up in amplitude, release is a linear ramp-down in amplitude,
/// and decay is a linear ramp in the dB domain from 0 dB down to
/// `20*log10(sustain_level)` (SoundFont2 §4.3: decay is linear in dB, which
/// looks exponential in amplitude).
#[derive(Debug, Clone, Copy)]
pub struct DahdsrParameters {
    pub delay_samples: u32,
    pub attack_samples: u32,
    pub hold_samples: u32,
    pub decay_samples: u32,
    pub sustain_level: f32,
    pub release_samples: u32,
}

impl Default for DahdsrParameters {
    fn default() -> Self {
        Self {
            delay_samples: 0,
            attack_samples: 0,
            hold_samples: 0,
            decay_samples: 0,
            sustain_level: 1.0,
            release_samples: 0,
        }
    }
}

// -------------------------------------------------------------------------------------------------

/// A DAHDSR envelope generator with externally held parameters, advanced one
/// block at a time on the render thread. No allocation, no syscalls.
#[derive(Debug, Default, Clone)]
pub struct DahdsrEnvelope {
    stage: DahdsrStage,
    samples_remaining: u32,
    output: f32,
    release_start_level: f32,
    /// Current position of the decay ramp, in dB below the 0 dB level the
    /// voice enters decay at (runs from 0 down to `20*log10(sustain_level)`).
    decay_db: f32,
}

impl DahdsrEnvelope {
    const SILENCE: f32 = 1.0 / 32768.0;

    pub fn new() -> Self {
        Self::default()
    }

    #[inline(always)]
    pub fn stage(&self) -> DahdsrStage {
        self.stage
    }

    #[inline(always)]
    pub fn output(&self) -> f32 {
        self.output
    }

    pub fn is_finished(&self) -> bool {
        self.stage == DahdsrStage::Idle
    }

    /// Trigger the envelope, entering Delay (or the first non-empty stage
    /// after it) at output 0.
    pub fn note_on(&mut self, params: &DahdsrParameters) {
        self.output = 0.0;
        if params.delay_samples > 0 {
            self.stage = DahdsrStage::Delay;
            self.samples_remaining = params.delay_samples;
        } else {
            self.enter_attack(params);
        }
    }

    /// Move to Release, ramping linearly from the current output to 0 over
    /// `release_samples` (0 releases instantly).
    pub fn note_off(&mut self, params: &DahdsrParameters) {
        self.release_start_level = self.output;
        if params.release_samples == 0 || self.output <= Self::SILENCE {
            self.output = 0.0;
            self.stage = DahdsrStage::Idle;
        } else {
            self.stage = DahdsrStage::Release;
            self.samples_remaining = params.release_samples;
        }
    }

    pub fn reset(&mut self) {
        self.output = 0.0;
        self.stage = DahdsrStage::Idle;
    }

    fn enter_attack(&mut self, params: &DahdsrParameters) {
        if params.attack_samples > 0 {
            self.stage = DahdsrStage::Attack;
            self.samples_remaining = params.attack_samples;
        } else {
            self.output = 1.0;
            self.enter_hold(params);
        }
    }

    fn enter_hold(&mut self, params: &DahdsrParameters) {
        if params.hold_samples > 0 {
            self.stage = DahdsrStage::Hold;
            self.samples_remaining = params.hold_samples;
        } else {
            self.enter_decay(params);
        }
    }

    fn enter_decay(&mut self, params: &DahdsrParameters) {
        if params.decay_samples > 0 && params.sustain_level < 1.0 {
            self.stage = DahdsrStage::Decay;
            self.samples_remaining = params.decay_samples;
            self.decay_db = 0.0;
        } else {
            self.output = params.sustain_level;
            self.stage = DahdsrStage::Sustain;
        }
    }

    /// Advance by one sample and return the new output.
    #[inline]
    pub fn run(&mut self, params: &DahdsrParameters) -> f32 {
        match self.stage {
            DahdsrStage::Idle | DahdsrStage::Sustain => {}
            DahdsrStage::Delay => {
                self.samples_remaining -= 1;
                if self.samples_remaining == 0 {
                    self.enter_attack(params);
                }
            }
            DahdsrStage::Attack => {
                self.output += 1.0 / params.attack_samples as f32;
                self.samples_remaining -= 1;
                if self.samples_remaining == 0 || self.output >= 1.0 {
                    self.output = 1.0;
                    self.enter_hold(params);
                }
            }
            DahdsrStage::Hold => {
                self.samples_remaining -= 1;
                if self.samples_remaining == 0 {
                    self.enter_decay(params);
                }
            }
            DahdsrStage::Decay => {
                let target_db = 20.0 * params.sustain_level.max(Self::SILENCE).log10();
                self.decay_db += target_db / params.decay_samples as f32;
                self.output = 10f32.powf(self.decay_db / 20.0);
                self.samples_remaining -= 1;
                if self.samples_remaining == 0 || self.output <= params.sustain_level {
                    self.output = params.sustain_level;
                    self.stage = DahdsrStage::Sustain;
                }
            }
            DahdsrStage::Release => {
                self.output -= self.release_start_level / params.release_samples as f32;
                self.samples_remaining -= 1;
                if self.samples_remaining == 0 || self.output <= Self::SILENCE {
                    self.output = 0.0;
                    self.stage = DahdsrStage::Idle;
                }
            }
        }
        self.output
    }

    /// Fill a full block, falling back to cheap constant fills when nothing
    /// is changing (Idle/Sustain), as the mixer calls this once per block
    /// per voice.
    pub fn process(&mut self, params: &DahdsrParameters, output: &mut [f32]) {
        match self.stage {
            DahdsrStage::Idle => output.fill(0.0),
            DahdsrStage::Sustain => output.fill(self.output),
            _ => {
                for sample in output.iter_mut() {
                    *sample = self.run(params);
                }
            }
        }
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> DahdsrParameters {
        DahdsrParameters {
            delay_samples: 4,
            attack_samples: 10,
            hold_samples: 5,
            decay_samples: 10,
            sustain_level: 0.5,
            release_samples: 10,
        }
    }

    #[test]
    fn traverses_all_stages_in_order() {
        let p = params();
        let mut env = DahdsrEnvelope::new();
        env.note_on(&p);
        assert_eq!(env.stage(), DahdsrStage::Delay);
        for _ in 0..p.delay_samples {
            env.run(&p);
        }
        assert_eq!(env.stage(), DahdsrStage::Attack);
        for _ in 0..p.attack_samples {
            env.run(&p);
        }
        assert_eq!(env.stage(), DahdsrStage::Hold);
        assert!((env.output() - 1.0).abs() < 1e-6);
        for _ in 0..p.hold_samples {
            env.run(&p);
        }
        assert_eq!(env.stage(), DahdsrStage::Decay);
        for _ in 0..p.decay_samples {
            env.run(&p);
        }
        assert_eq!(env.stage(), DahdsrStage::Sustain);
        assert!((env.output() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn note_off_ramps_to_zero_then_idle() {
        let p = params();
        let mut env = DahdsrEnvelope::new();
        env.note_on(&p);
        for _ in 0..(p.delay_samples + p.attack_samples + p.hold_samples + p.decay_samples) {
            env.run(&p);
        }
        env.note_off(&p);
        assert_eq!(env.stage(), DahdsrStage::Release);
        for _ in 0..p.release_samples {
            env.run(&p);
        }
        assert_eq!(env.stage(), DahdsrStage::Idle);
        assert_eq!(env.output(), 0.0);
    }

    #[test]
    fn zero_durations_skip_stages() {
        let p = DahdsrParameters {
            delay_samples: 0,
            attack_samples: 0,
            hold_samples: 0,
            decay_samples: 0,
            sustain_level: 0.7,
            release_samples: 0,
        };
        let mut env = DahdsrEnvelope::new();
        env.note_on(&p);
        assert_eq!(env.stage(), DahdsrStage::Sustain);
        assert!((env.output() - 0.7).abs() < 1e-6);
        env.note_off(&p);
        assert_eq!(env.stage(), DahdsrStage::Idle);
    }
}
