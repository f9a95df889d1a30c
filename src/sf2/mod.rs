//! SoundFont2 data model consumed by the synthesis core: samples,
//! generators, modulators, and the preset/instrument zone hierarchy. A full
//! SF2 file parser is out of scope here; callers hand in an already-decoded
//! [`sample::SoundFont`] built through the [`sample::SampleLoader`]
//! interface.

pub mod generator;
pub mod modulator;
pub mod sample;
pub mod zone;

pub use generator::{GeneratorSet, GeneratorType, SampleMode};
pub use modulator::Modulator;
pub use sample::{Sample, SoundFont};
pub use zone::{Instrument, InstrumentZone, Preset, PresetZone};
