//! Voice parameter compiler: given a preset, a (key, velocity), and the
//! current channel controller state, walks the matching preset/instrument
//! zones, sums their generators on top of the SoundFont2 defaults, combines
//! the default and zone modulators, and evaluates them against the current
//! controller values to produce one fully compiled [`GeneratorSet`] per
//! sample that note needs to trigger.

use crate::channel::Channel;
use crate::sf2::{
    generator::GeneratorType as G, modulator::default_modulators, zone::Preset, GeneratorSet,
    Modulator, Sample, SoundFont,
};
use std::sync::Arc;

// -------------------------------------------------------------------------------------------------

/// A compiled sample to play, with the generator set fully composed for
/// this particular note.
pub struct CompiledVoice {
    pub sample: Arc<Sample>,
    pub generators: GeneratorSet,
}

/// Generators that are global-zone wide and apply additively to every
/// matching instrument-zone generator rather than being overwritten by it
/// (SoundFont2 §7.3/§7.4 treats all generic generators this way: preset
/// generators add onto instrument generators, which add onto the default
/// set).
fn sum_zone_generators(base: &mut GeneratorSet, zone_generators: &GeneratorSet, defaults: &GeneratorSet) {
    for id in 0..crate::sf2::generator::GENERATOR_COUNT {
        let Some(gen) = G::from_id(id as u16) else {
            continue;
        };
        if gen.is_structural() {
            continue;
        }
        let zone_value = zone_generators.get(gen);
        let default_value = defaults.get(gen);
        if zone_value != default_value {
            base.add(gen, zone_value - default_value);
        }
    }
}

/// Merge a new modulator into `modulators`, replacing any existing one with
/// the same routing (SoundFont2 §8.3: the last modulator with identical
/// source1/source2/dest wins) and dropping entries whose amount becomes
/// zero ("identity" modulators, which exist in some files only to disable
/// a default modulator).
fn merge_modulator(modulators: &mut Vec<Modulator>, new_mod: Modulator) {
    if let Some(existing) = modulators
        .iter_mut()
        .find(|m| m.has_same_routing(&new_mod))
    {
        *existing = new_mod;
    } else {
        modulators.push(new_mod);
    }
}

/// Compile every sample an instrument zone match needs to trigger for
/// `(key, velocity)` on `preset`, with generators composed from default +
/// preset-global + preset-local + instrument-global + instrument-local, and
/// modulators evaluated against the channel's current controller state.
pub fn compile_voices(
    font: &SoundFont,
    preset: &Preset,
    key: u8,
    velocity: u8,
    channel: &Channel,
) -> Vec<CompiledVoice> {
    let mut results = Vec::new();
    let preset_global = preset.zones.iter().find(|z| z.instrument.is_none());

    for preset_zone in preset.matching_zones(key, velocity) {
        let Some(instrument_id) = preset_zone.instrument else {
            continue;
        };
        let Some(instrument) = font.instruments.get(instrument_id as usize) else {
            continue;
        };
        let instrument_global = instrument.zones.iter().find(|z| z.sample.is_none());

        for instrument_zone in instrument.matching_zones(key, velocity) {
            let Some(sample_id) = instrument_zone.sample else {
                continue;
            };
            let Some(sample) = font.samples.get(sample_id as usize) else {
                continue;
            };

            let defaults = GeneratorSet::default();
            let mut generators = defaults;

            if let Some(global) = instrument_global {
                sum_zone_generators(&mut generators, &global.generators, &defaults);
            }
            sum_zone_generators(&mut generators, &instrument_zone.generators, &defaults);
            if let Some(global) = preset_global {
                sum_zone_generators(&mut generators, &global.generators, &GeneratorSet::default());
            }
            sum_zone_generators(&mut generators, &preset_zone.generators, &GeneratorSet::default());

            let mut modulators = default_modulators();
            if let Some(global) = instrument_global {
                for m in &global.modulators {
                    merge_modulator(&mut modulators, *m);
                }
            }
            for m in &instrument_zone.modulators {
                merge_modulator(&mut modulators, *m);
            }
            if let Some(global) = preset_global {
                for m in &global.modulators {
                    merge_modulator(&mut modulators, *m);
                }
            }
            for m in &preset_zone.modulators {
                merge_modulator(&mut modulators, *m);
            }

            apply_modulators(&mut generators, &modulators, channel, velocity, key);

            results.push(CompiledVoice {
                sample: Arc::clone(sample),
                generators,
            });
        }
    }

    results
}

/// Evaluate every modulator against the channel's current controller state
/// and velocity/key, adding each result into its destination generator.
fn apply_modulators(
    generators: &mut GeneratorSet,
    modulators: &[Modulator],
    channel: &Channel,
    velocity: u8,
    key: u8,
) {
    use crate::sf2::modulator::ModSource;

    let source_value = |source: ModSource| -> f32 {
        match source {
            ModSource::NoController => 0.0,
            ModSource::NoteOnVelocity => velocity as f32,
            ModSource::NoteOnKey => key as f32,
            ModSource::PolyPressure => 0.0,
            ModSource::ChannelPressure => channel.channel_pressure as f32,
            ModSource::PitchWheel => ((channel.pitch_bend as f32 + 8192.0) / 16384.0) * 127.0,
            ModSource::PitchWheelSensitivity => {
                channel.pitch_bend_sensitivity_semitones as f32
            }
            ModSource::Controller(1) => channel.mod_wheel as f32,
            ModSource::Controller(7) => channel.volume as f32,
            ModSource::Controller(10) => channel.pan as f32,
            ModSource::Controller(11) => channel.expression as f32,
            ModSource::Controller(_) => 0.0,
        }
    };

    for modu in modulators {
        let v1 = source_value(modu.source1);
        let v2 = source_value(modu.source2);
        let amount = modu.evaluate(v1, v2);
        generators.add(modu.dest, amount);
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sf2::sample::SampleLink;
    use crate::sf2::zone::{Instrument, InstrumentZone, Preset, PresetZone};

    fn simple_font() -> SoundFont {
        let sample = Arc::new(Sample {
            name: "sine".into(),
            data: vec![0i16; 1000].into(),
            sample_rate: 44100,
            start_loop: 0,
            end_loop: 1000,
            pitch_key: 60,
            pitch_correction: 0,
            link: SampleLink::Mono,
            link_sample: None,
        });
        let instrument_zone = InstrumentZone {
            key_lo: 0,
            key_hi: 127,
            vel_lo: 0,
            vel_hi: 127,
            sample: Some(0),
            ..Default::default()
        };
        let instrument = Instrument {
            name: "inst".into(),
            zones: vec![instrument_zone],
        };
        let preset_zone = PresetZone {
            key_lo: 0,
            key_hi: 127,
            vel_lo: 0,
            vel_hi: 127,
            instrument: Some(0),
            ..Default::default()
        };
        let preset = Preset {
            name: "preset".into(),
            bank: 0,
            program: 0,
            zones: vec![preset_zone],
        };
        SoundFont {
            name: "test".into(),
            samples: vec![sample],
            presets: vec![preset],
            instruments: vec![instrument],
        }
    }

    #[test]
    fn compiles_one_voice_for_matching_note() {
        let font = simple_font();
        let channel = Channel::new(0);
        let preset = font.find_preset(0, 0).unwrap();
        let voices = compile_voices(&font, preset, 60, 100, &channel);
        assert_eq!(voices.len(), 1);
    }

    #[test]
    fn out_of_range_note_compiles_nothing() {
        let mut font = simple_font();
        font.presets[0].zones[0].key_lo = 0;
        font.presets[0].zones[0].key_hi = 10;
        let channel = Channel::new(0);
        let preset = font.find_preset(0, 0).unwrap();
        let voices = compile_voices(&font, preset, 60, 100, &channel);
        assert!(voices.is_empty());
    }

    #[test]
    fn velocity_modulator_reduces_attenuation_toward_max_at_low_velocity() {
        let font = simple_font();
        let channel = Channel::new(0);
        let preset = font.find_preset(0, 0).unwrap();
        let loud = compile_voices(&font, preset, 60, 127, &channel);
        let soft = compile_voices(&font, preset, 60, 1, &channel);
        let loud_atten = loud[0].generators.get(G::InitialAttenuation);
        let soft_atten = soft[0].generators.get(G::InitialAttenuation);
        assert!(soft_atten > loud_atten);
    }
}
