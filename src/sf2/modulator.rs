//! SoundFont2 modulators: the small programmable routing that maps a MIDI
//! controller or voice-state source onto a generator, used on top of the
//! default modulator set every voice starts with.

use super::generator::GeneratorType;

// -------------------------------------------------------------------------------------------------

/// A modulation source, either a MIDI controller number or one of the
/// general controller sources (`fluid_mod_src` in the FluidSynth sources).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModSource {
    NoController,
    NoteOnVelocity,
    NoteOnKey,
    PolyPressure,
    ChannelPressure,
    PitchWheel,
    PitchWheelSensitivity,
    /// A MIDI continuous controller, 0..=127.
    Controller(u8),
}

/// How a source's raw value is mapped into [0,1]/[-1,1] before being scaled
/// by the modulator amount (the `fluid_mod_flags` polarity/direction/type
/// bits).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModSourceFlags {
    pub bipolar: bool,
    pub negative: bool,
    pub curve: ModCurve,
}

impl Default for ModSourceFlags {
    fn default() -> Self {
        Self {
            bipolar: false,
            negative: false,
            curve: ModCurve::Linear,
        }
    }
}

/// The mapping curve applied to a normalized source value.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum ModCurve {
    #[default]
    Linear,
    Concave,
    Convex,
    Switch,
}

/// A transform applied to the combined product of the two sources before it
/// is scaled by `amount` (`fluid_mod_transforms`).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum ModTransform {
    #[default]
    Linear,
    AbsoluteValue,
}

// -------------------------------------------------------------------------------------------------

/// A single SoundFont2 modulator: `dest = amount * map(source1) * map(source2)`,
/// run through `transform`, summed additively into the destination
/// generator.
#[derive(Debug, Clone, Copy)]
pub struct Modulator {
    pub source1: ModSource,
    pub source1_flags: ModSourceFlags,
    pub source2: ModSource,
    pub source2_flags: ModSourceFlags,
    pub dest: GeneratorType,
    pub amount: f32,
    pub transform: ModTransform,
}

impl Modulator {
    /// Two modulators are "identical" per the SoundFont2 spec when source1,
    /// source2, and dest all match (used to decide whether a new modulator
    /// replaces or adds to an existing one in the same zone).
    pub fn has_same_routing(&self, other: &Modulator) -> bool {
        self.source1 == other.source1
            && self.source1_flags == other.source1_flags
            && self.source2 == other.source2
            && self.source2_flags == other.source2_flags
            && self.dest == other.dest
    }

    /// Map a raw controller/voice-state value (already normalized to
    /// 0.0..=127.0 range as MIDI data is) through this source's curve and
    /// polarity, producing a value in 0.0..=1.0 (unipolar) or -1.0..=1.0
    /// (bipolar).
    fn map(raw: f32, flags: ModSourceFlags) -> f32 {
        let unit = (raw / 127.0).clamp(0.0, 1.0);
        let shaped = match flags.curve {
            ModCurve::Linear => unit,
            ModCurve::Concave => concave(unit),
            ModCurve::Convex => 1.0 - concave(1.0 - unit),
            ModCurve::Switch => {
                if unit >= 0.5 {
                    1.0
                } else {
                    0.0
                }
            }
        };
        let signed = if flags.negative { 1.0 - shaped } else { shaped };
        if flags.bipolar {
            signed * 2.0 - 1.0
        } else {
            signed
        }
    }

    /// Evaluate the modulator given the two raw source values, returning the
    /// amount to add to the destination generator.
    pub fn evaluate(&self, source1_raw: f32, source2_raw: f32) -> f32 {
        let v1 = Self::map(source1_raw, self.source1_flags);
        let v2 = if self.source2 == ModSource::NoController {
            1.0
        } else {
            Self::map(source2_raw, self.source2_flags)
        };
        let product = v1 * v2 * self.amount;
        match self.transform {
            ModTransform::Linear => product,
            ModTransform::AbsoluteValue => product.abs(),
        }
    }
}

/// Concave curve, approximating the SoundFont2 spec's -200/96 dB log curve:
/// `20*log10((x^2)) / -96`, normalized so `f(0)=0`, `f(1)=1`.
fn concave(x: f32) -> f32 {
    if x <= 0.0 {
        return 0.0;
    }
    let db = 20.0 * x.log10();
    (1.0 + db / 96.0).clamp(0.0, 1.0)
}

// -------------------------------------------------------------------------------------------------

/// The 10 default modulators every SoundFont2 voice starts with (SoundFont2
/// spec §8.4.2), applied before preset/instrument modulators are layered on
/// top.
pub fn default_modulators() -> Vec<Modulator> {
    vec![
        // MIDI note-on velocity to initial attenuation, concave, unipolar negative.
        Modulator {
            source1: ModSource::NoteOnVelocity,
            source1_flags: ModSourceFlags {
                bipolar: false,
                negative: true,
                curve: ModCurve::Concave,
            },
            source2: ModSource::NoController,
            source2_flags: ModSourceFlags::default(),
            dest: GeneratorType::InitialAttenuation,
            amount: 960.0,
            transform: ModTransform::Linear,
        },
        // MIDI note-on velocity to filter cutoff, linear, unipolar negative.
        Modulator {
            source1: ModSource::NoteOnVelocity,
            source1_flags: ModSourceFlags {
                bipolar: false,
                negative: true,
                curve: ModCurve::Linear,
            },
            source2: ModSource::NoController,
            source2_flags: ModSourceFlags::default(),
            dest: GeneratorType::InitialFilterFc,
            amount: -2400.0,
            transform: ModTransform::Linear,
        },
        // Channel pressure to vibrato LFO pitch depth.
        Modulator {
            source1: ModSource::ChannelPressure,
            source1_flags: ModSourceFlags::default(),
            source2: ModSource::NoController,
            source2_flags: ModSourceFlags::default(),
            dest: GeneratorType::VibLfoToPitch,
            amount: 50.0,
            transform: ModTransform::Linear,
        },
        // CC1 (mod wheel) to vibrato LFO pitch depth.
        Modulator {
            source1: ModSource::Controller(1),
            source1_flags: ModSourceFlags::default(),
            source2: ModSource::NoController,
            source2_flags: ModSourceFlags::default(),
            dest: GeneratorType::VibLfoToPitch,
            amount: 50.0,
            transform: ModTransform::Linear,
        },
        // CC7 (volume) to initial attenuation, concave, unipolar negative.
        Modulator {
            source1: ModSource::Controller(7),
            source1_flags: ModSourceFlags {
                bipolar: false,
                negative: true,
                curve: ModCurve::Concave,
            },
            source2: ModSource::NoController,
            source2_flags: ModSourceFlags::default(),
            dest: GeneratorType::InitialAttenuation,
            amount: 960.0,
            transform: ModTransform::Linear,
        },
        // CC10 (pan) to pan, linear, bipolar.
        Modulator {
            source1: ModSource::Controller(10),
            source1_flags: ModSourceFlags {
                bipolar: true,
                negative: false,
                curve: ModCurve::Linear,
            },
            source2: ModSource::NoController,
            source2_flags: ModSourceFlags::default(),
            dest: GeneratorType::Pan,
            amount: 1000.0,
            transform: ModTransform::Linear,
        },
        // CC11 (expression) to initial attenuation, concave, unipolar negative.
        Modulator {
            source1: ModSource::Controller(11),
            source1_flags: ModSourceFlags {
                bipolar: false,
                negative: true,
                curve: ModCurve::Concave,
            },
            source2: ModSource::NoController,
            source2_flags: ModSourceFlags::default(),
            dest: GeneratorType::InitialAttenuation,
            amount: 960.0,
            transform: ModTransform::Linear,
        },
        // CC91 (reverb send) to reverb effects send.
        Modulator {
            source1: ModSource::Controller(91),
            source1_flags: ModSourceFlags::default(),
            source2: ModSource::NoController,
            source2_flags: ModSourceFlags::default(),
            dest: GeneratorType::ReverbEffectsSend,
            amount: 200.0,
            transform: ModTransform::Linear,
        },
        // CC93 (chorus send) to chorus effects send.
        Modulator {
            source1: ModSource::Controller(93),
            source1_flags: ModSourceFlags::default(),
            source2: ModSource::NoController,
            source2_flags: ModSourceFlags::default(),
            dest: GeneratorType::ChorusEffectsSend,
            amount: 200.0,
            transform: ModTransform::Linear,
        },
        // Pitch wheel, scaled by pitch wheel sensitivity, to pitch.
        Modulator {
            source1: ModSource::PitchWheel,
            source1_flags: ModSourceFlags {
                bipolar: true,
                negative: false,
                curve: ModCurve::Linear,
            },
            source2: ModSource::PitchWheelSensitivity,
            source2_flags: ModSourceFlags::default(),
            dest: GeneratorType::FineTune,
            amount: 12700.0,
            transform: ModTransform::Linear,
        },
    ]
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_set_has_ten_entries() {
        assert_eq!(default_modulators().len(), 10);
    }

    #[test]
    fn linear_unipolar_maps_full_scale() {
        let modu = Modulator {
            source1: ModSource::NoteOnVelocity,
            source1_flags: ModSourceFlags::default(),
            source2: ModSource::NoController,
            source2_flags: ModSourceFlags::default(),
            dest: GeneratorType::InitialFilterFc,
            amount: 100.0,
            transform: ModTransform::Linear,
        };
        assert_eq!(modu.evaluate(127.0, 0.0), 100.0);
        assert_eq!(modu.evaluate(0.0, 0.0), 0.0);
    }

    #[test]
    fn negative_polarity_inverts() {
        let modu = Modulator {
            source1: ModSource::NoteOnVelocity,
            source1_flags: ModSourceFlags {
                bipolar: false,
                negative: true,
                curve: ModCurve::Linear,
            },
            source2: ModSource::NoController,
            source2_flags: ModSourceFlags::default(),
            dest: GeneratorType::InitialFilterFc,
            amount: 100.0,
            transform: ModTransform::Linear,
        };
        assert_eq!(modu.evaluate(0.0, 0.0), 100.0);
        assert_eq!(modu.evaluate(127.0, 0.0), 0.0);
    }

    #[test]
    fn routing_equality_ignores_amount() {
        let a = Modulator {
            source1: ModSource::Controller(7),
            source1_flags: ModSourceFlags::default(),
            source2: ModSource::NoController,
            source2_flags: ModSourceFlags::default(),
            dest: GeneratorType::InitialAttenuation,
            amount: 10.0,
            transform: ModTransform::Linear,
        };
        let mut b = a;
        b.amount = 500.0;
        assert!(a.has_same_routing(&b));
    }
}
