//! A real-time software synthesizer core: a voice-level DSP pipeline,
//! polyphonic voice pool with overflow stealing, shared reverb/chorus,
//! the MIDI channel state machine, and a SoundFont2 preset compiler,
//! split across a lock-free control/render thread boundary.
//!
//! SoundFont file parsing, audio device backends, MIDI transports, and the
//! sequencer/player are not part of this crate; callers provide a decoded
//! [`sf2::SoundFont`] and drive [`synth::Synth`] themselves.

mod channel;
mod compiler;
mod convert;
mod dsp;
mod error;
mod event;
mod mixer;
mod pool;
mod settings;
mod sf2;
mod synth;
mod voice;

pub use channel::{BankSelectStyle, BreathMode, ChannelMode, LegatoMode, PortamentoMode, CHANNEL_COUNT};
pub use convert::{S16_MAX, S24_MAX, S32_MAX};
pub use dsp::interpolation::InterpolationMethod;
pub use error::Error;
pub use settings::{SettingValue, Settings, SynthConfig};
pub use sf2::{
    sample::SampleLoader, GeneratorSet, GeneratorType, Instrument, InstrumentZone, Modulator,
    Preset, PresetZone, Sample, SampleMode, SoundFont,
};
pub use synth::Synth;
