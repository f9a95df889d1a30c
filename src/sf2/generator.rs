//! SoundFont2 generators: the 60-slot set of numeric parameters a zone can
//! override, plus the fixed-point amount each one carries.

use strum::{EnumCount, FromRepr};

// -------------------------------------------------------------------------------------------------

/// One of the 60 SoundFont2 generator slots (`SFGenerator` in the spec).
///
/// Numeric values match the SoundFont2 2.04 `sfGenerator` enumeration so a
/// loader can build a [`GeneratorSet`] directly from the on-disk generator
/// index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr, EnumCount)]
#[repr(u16)]
pub enum GeneratorType {
    StartAddrsOffset = 0,
    EndAddrsOffset = 1,
    StartloopAddrsOffset = 2,
    EndloopAddrsOffset = 3,
    StartAddrsCoarseOffset = 4,
    ModLfoToPitch = 5,
    VibLfoToPitch = 6,
    ModEnvToPitch = 7,
    InitialFilterFc = 8,
    InitialFilterQ = 9,
    ModLfoToFilterFc = 10,
    ModEnvToFilterFc = 11,
    EndAddrsCoarseOffset = 12,
    ModLfoToVolume = 13,
    Unused1 = 14,
    ChorusEffectsSend = 15,
    ReverbEffectsSend = 16,
    Pan = 17,
    Unused2 = 18,
    Unused3 = 19,
    Unused4 = 20,
    DelayModLfo = 21,
    FreqModLfo = 22,
    DelayVibLfo = 23,
    FreqVibLfo = 24,
    DelayModEnv = 25,
    AttackModEnv = 26,
    HoldModEnv = 27,
    DecayModEnv = 28,
    SustainModEnv = 29,
    ReleaseModEnv = 30,
    KeynumToModEnvHold = 31,
    KeynumToModEnvDecay = 32,
    DelayVolEnv = 33,
    AttackVolEnv = 34,
    HoldVolEnv = 35,
    DecayVolEnv = 36,
    SustainVolEnv = 37,
    ReleaseVolEnv = 38,
    KeynumToVolEnvHold = 39,
    KeynumToVolEnvDecay = 40,
    Instrument = 41,
    Reserved1 = 42,
    KeyRange = 43,
    VelRange = 44,
    StartloopAddrsCoarseOffset = 45,
    Keynum = 46,
    Velocity = 47,
    InitialAttenuation = 48,
    Reserved2 = 49,
    EndloopAddrsCoarseOffset = 50,
    CoarseTune = 51,
    FineTune = 52,
    SampleId = 53,
    SampleModes = 54,
    Reserved3 = 55,
    ScaleTuning = 56,
    ExclusiveClass = 57,
    OverridingRootKey = 58,
    Unused5 = 59,
}

/// Number of generator slots (always 60).
pub const GENERATOR_COUNT: usize = GeneratorType::COUNT;

impl GeneratorType {
    /// Look a generator up by its SoundFont2 numeric id.
    pub fn from_id(id: u16) -> Option<Self> {
        Self::from_repr(id)
    }

    /// Whether a zone is allowed to set this generator directly (the
    /// `instrument`/`keyRange`/`velRange`/`sampleID` slots are structural and
    /// are consumed by the zone matcher, not copied into the voice).
    pub fn is_structural(self) -> bool {
        matches!(
            self,
            Self::Instrument | Self::KeyRange | Self::VelRange | Self::SampleId
        )
    }
}

// -------------------------------------------------------------------------------------------------

/// Sample-playback loop mode, the decoded value of the `sampleModes`
/// generator (generator 54).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum SampleMode {
    #[default]
    NoLoop,
    Continuous,
    /// Same encoding as `NoLoop` per the SoundFont2 spec (value 2 is
    /// reserved/unused); kept distinct so a loader can round-trip it.
    UnusedNoLoop,
    LoopUntilRelease,
}

impl SampleMode {
    pub fn from_raw(value: i16) -> Self {
        match value & 0x3 {
            1 => Self::Continuous,
            2 => Self::UnusedNoLoop,
            3 => Self::LoopUntilRelease,
            _ => Self::NoLoop,
        }
    }
}

// -------------------------------------------------------------------------------------------------

/// A fully composed set of the 60 generator amounts, as they apply to a
/// single voice after preset- and instrument-zone generators have been
/// summed on top of the SoundFont2 defaults.
#[derive(Debug, Clone, Copy)]
pub struct GeneratorSet {
    values: [f32; GENERATOR_COUNT],
}

impl Default for GeneratorSet {
    fn default() -> Self {
        let mut values = [0.0f32; GENERATOR_COUNT];
        // Defaults per the SoundFont2 2.04 spec, §8.1.3: most generators
        // default to 0, these do not.
        values[GeneratorType::InitialFilterFc as usize] = 13500.0;
        values[GeneratorType::DelayModLfo as usize] = -12000.0;
        values[GeneratorType::DelayVibLfo as usize] = -12000.0;
        values[GeneratorType::DelayModEnv as usize] = -12000.0;
        values[GeneratorType::AttackModEnv as usize] = -12000.0;
        values[GeneratorType::HoldModEnv as usize] = -12000.0;
        values[GeneratorType::DecayModEnv as usize] = -12000.0;
        values[GeneratorType::ReleaseModEnv as usize] = -12000.0;
        values[GeneratorType::DelayVolEnv as usize] = -12000.0;
        values[GeneratorType::AttackVolEnv as usize] = -12000.0;
        values[GeneratorType::HoldVolEnv as usize] = -12000.0;
        values[GeneratorType::DecayVolEnv as usize] = -12000.0;
        values[GeneratorType::ReleaseVolEnv as usize] = -12000.0;
        values[GeneratorType::Keynum as usize] = -1.0;
        values[GeneratorType::Velocity as usize] = -1.0;
        values[GeneratorType::ScaleTuning as usize] = 100.0;
        values[GeneratorType::OverridingRootKey as usize] = -1.0;
        Self { values }
    }
}

impl GeneratorSet {
    pub fn get(&self, gen: GeneratorType) -> f32 {
        self.values[gen as usize]
    }

    pub fn set(&mut self, gen: GeneratorType, value: f32) {
        self.values[gen as usize] = value;
    }

    /// Add `amount` to the current value, the rule zone generators use when
    /// layered on top of the default set (SoundFont2 §7.3/§7.4: absolute for
    /// global generators, additive for most others -- the compiler is
    /// responsible for choosing add vs. replace per slot; this just does the
    /// add).
    pub fn add(&mut self, gen: GeneratorType, amount: f32) {
        self.values[gen as usize] += amount;
    }

    pub fn sample_mode(&self) -> SampleMode {
        SampleMode::from_raw(self.get(GeneratorType::SampleModes) as i16)
    }

    pub fn key_range(&self) -> (i32, i32) {
        decode_range(self.get(GeneratorType::KeyRange))
    }

    pub fn vel_range(&self) -> (i32, i32) {
        decode_range(self.get(GeneratorType::VelRange))
    }
}

/// A `keyRange`/`velRange` amount packs (lo, hi) into the low/high byte of a
/// 16 bit word.
fn decode_range(raw: f32) -> (i32, i32) {
    let raw = raw as i32 as u16;
    ((raw & 0xff) as i32, (raw >> 8) as i32)
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let gens = GeneratorSet::default();
        assert_eq!(gens.get(GeneratorType::InitialFilterFc), 13500.0);
        assert_eq!(gens.get(GeneratorType::DelayVolEnv), -12000.0);
        assert_eq!(gens.get(GeneratorType::ScaleTuning), 100.0);
        assert_eq!(gens.get(GeneratorType::Pan), 0.0);
    }

    #[test]
    fn key_range_decoding() {
        let mut gens = GeneratorSet::default();
        gens.set(GeneratorType::KeyRange, ((72u16 << 8) | 60u16) as f32);
        assert_eq!(gens.key_range(), (60, 72));
    }

    #[test]
    fn from_id_roundtrip() {
        assert_eq!(GeneratorType::from_id(8), Some(GeneratorType::InitialFilterFc));
        assert_eq!(GeneratorType::from_id(59), Some(GeneratorType::Unused5));
        assert_eq!(GeneratorType::from_id(60), None);
    }
}
