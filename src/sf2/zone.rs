//! Preset/instrument/zone hierarchy: the SoundFont2 patch structure the
//! voice parameter compiler walks to decide which samples and generators
//! apply to a given (key, velocity).

use super::generator::GeneratorSet;
use super::modulator::Modulator;

// -------------------------------------------------------------------------------------------------

/// One zone inside an instrument: a key/velocity range, the generators it
/// overrides, the modulators it adds, and the sample it plays (global zones,
/// which carry no sample, have `sample` set to `None`).
#[derive(Debug, Default, Clone)]
pub struct InstrumentZone {
    pub key_lo: i32,
    pub key_hi: i32,
    pub vel_lo: i32,
    pub vel_hi: i32,
    pub generators: GeneratorSet,
    pub modulators: Vec<Modulator>,
    pub sample: Option<u32>,
}

impl InstrumentZone {
    pub fn matches(&self, key: u8, velocity: u8) -> bool {
        let key = key as i32;
        let vel = velocity as i32;
        (self.key_lo..=self.key_hi).contains(&key) && (self.vel_lo..=self.vel_hi).contains(&vel)
    }
}

/// An instrument: a name plus its zones.
#[derive(Debug, Default, Clone)]
pub struct Instrument {
    pub name: String,
    pub zones: Vec<InstrumentZone>,
}

impl Instrument {
    /// Zones whose key/velocity range contains the given note, in SoundFont2
    /// document order (later zones override earlier ones for generators
    /// that appear twice, which the compiler handles by keeping the first
    /// match per generator per SoundFont2 §7.6).
    pub fn matching_zones(&self, key: u8, velocity: u8) -> impl Iterator<Item = &InstrumentZone> {
        self.zones.iter().filter(move |z| z.matches(key, velocity))
    }
}

// -------------------------------------------------------------------------------------------------

/// One zone inside a preset: a key/velocity range, generators/modulators
/// applied on top of the instrument, and the instrument it points at.
#[derive(Debug, Default, Clone)]
pub struct PresetZone {
    pub key_lo: i32,
    pub key_hi: i32,
    pub vel_lo: i32,
    pub vel_hi: i32,
    pub generators: GeneratorSet,
    pub modulators: Vec<Modulator>,
    pub instrument: Option<u32>,
}

impl PresetZone {
    pub fn matches(&self, key: u8, velocity: u8) -> bool {
        let key = key as i32;
        let vel = velocity as i32;
        (self.key_lo..=self.key_hi).contains(&key) && (self.vel_lo..=self.vel_hi).contains(&vel)
    }
}

/// A preset (what General MIDI calls a "program"): bank/program number plus
/// its zones.
#[derive(Debug, Default, Clone)]
pub struct Preset {
    pub name: String,
    pub bank: u32,
    pub program: u32,
    pub zones: Vec<PresetZone>,
}

impl Preset {
    pub fn matching_zones(&self, key: u8, velocity: u8) -> impl Iterator<Item = &PresetZone> {
        self.zones.iter().filter(move |z| z.matches(key, velocity))
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zone_matching_respects_ranges() {
        let zone = InstrumentZone {
            key_lo: 60,
            key_hi: 72,
            vel_lo: 1,
            vel_hi: 127,
            ..Default::default()
        };
        assert!(zone.matches(60, 100));
        assert!(zone.matches(72, 1));
        assert!(!zone.matches(59, 100));
        assert!(!zone.matches(73, 100));
    }
}
