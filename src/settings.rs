//! Settings registry: a name -> typed value map with the recognized keys
//! pre-registered with their defaults and valid ranges, mirroring the
//! FluidSynth settings API this crate's facade exposes.

use std::collections::HashMap;

use crate::channel::BankSelectStyle;
use crate::dsp::interpolation::InterpolationMethod;
use crate::error::Error;

// -------------------------------------------------------------------------------------------------

/// The value type one setting slot holds.
#[derive(Debug, Clone, PartialEq)]
pub enum SettingValue {
    /// A setting with no value of its own (a namespace placeholder).
    NoType,
    Num(f64),
    Int(i64),
    Str(String),
}

/// Valid range / choice constraint for a registered setting.
#[derive(Debug, Clone)]
enum Constraint {
    None,
    NumRange(f64, f64),
    IntRange(i64, i64),
    StrSet(Vec<&'static str>),
}

struct Entry {
    value: SettingValue,
    constraint: Constraint,
}

/// The settings registry itself: name -> (current value, constraint).
pub struct Settings {
    entries: HashMap<String, Entry>,
}

impl Settings {
    /// Build the registry pre-populated with every setting this crate's
    /// modules read, along with its default and valid range.
    pub fn new() -> Self {
        let mut settings = Self {
            entries: HashMap::new(),
        };
        settings.register("synth.sample-rate", SettingValue::Num(44100.0), Constraint::NumRange(8000.0, 192_000.0));
        settings.register("synth.polyphony", SettingValue::Int(256), Constraint::IntRange(1, 65535));
        settings.register("synth.midi-channels", SettingValue::Int(16), Constraint::IntRange(16, 256));
        settings.register(
            "synth.interpolation",
            SettingValue::Str("linear".into()),
            Constraint::StrSet(vec!["none", "linear", "cubic-4pt", "sinc-7pt"]),
        );
        settings.register(
            "synth.midi-bank-select",
            SettingValue::Str("gs".into()),
            Constraint::StrSet(vec!["gm", "gs", "xg", "mma"]),
        );
        settings.register("synth.gain", SettingValue::Num(0.2), Constraint::NumRange(0.0, 10.0));
        settings.register("synth.reverb.active", SettingValue::Int(1), Constraint::IntRange(0, 1));
        settings.register("synth.reverb.room-size", SettingValue::Num(0.5), Constraint::NumRange(0.0, 1.0));
        settings.register("synth.reverb.damping", SettingValue::Num(0.5), Constraint::NumRange(0.0, 1.0));
        settings.register("synth.reverb.width", SettingValue::Num(1.0), Constraint::NumRange(0.0, 100.0));
        settings.register("synth.reverb.level", SettingValue::Num(0.7), Constraint::NumRange(0.0, 1.0));
        settings.register("synth.chorus.active", SettingValue::Int(1), Constraint::IntRange(0, 1));
        settings.register("synth.chorus.nr", SettingValue::Int(3), Constraint::IntRange(1, 99));
        settings.register("synth.chorus.speed", SettingValue::Num(0.3), Constraint::NumRange(0.29, 5.0));
        settings.register("synth.chorus.depth", SettingValue::Num(8.0), Constraint::NumRange(0.0, 256.0));
        settings.register("synth.chorus.level", SettingValue::Num(2.0), Constraint::NumRange(0.0, 10.0));
        settings.register("synth.cpu-cores", SettingValue::Int(num_cpus::get() as i64), Constraint::IntRange(1, 256));
        settings.register("synth.verbose", SettingValue::Int(0), Constraint::IntRange(0, 1));
        settings.register("audio.period-size", SettingValue::Int(64), Constraint::IntRange(1, 65536));
        settings
    }

    fn register(&mut self, name: &str, default: SettingValue, constraint: Constraint) {
        self.entries.insert(
            name.to_string(),
            Entry {
                value: default,
                constraint,
            },
        );
    }

    pub fn get(&self, name: &str) -> Option<&SettingValue> {
        self.entries.get(name).map(|e| &e.value)
    }

    pub fn set(&mut self, name: &str, value: SettingValue) -> Result<(), Error> {
        let entry = self
            .entries
            .get_mut(name)
            .ok_or_else(|| Error::NotFound(format!("unknown setting: {name}")))?;

        match (&value, &entry.constraint) {
            (SettingValue::Num(n), Constraint::NumRange(lo, hi)) if !(*lo..=*hi).contains(n) => {
                return Err(Error::InvalidArgument(format!(
                    "{name}: {n} out of range [{lo}, {hi}]"
                )));
            }
            (SettingValue::Int(n), Constraint::IntRange(lo, hi)) if !(*lo..=*hi).contains(n) => {
                return Err(Error::InvalidArgument(format!(
                    "{name}: {n} out of range [{lo}, {hi}]"
                )));
            }
            (SettingValue::Str(s), Constraint::StrSet(choices))
                if !choices.contains(&s.as_str()) =>
            {
                return Err(Error::InvalidArgument(format!(
                    "{name}: \"{s}\" is not one of {choices:?}"
                )));
            }
            _ => {}
        }
        entry.value = value;
        Ok(())
    }

    pub fn get_num(&self, name: &str) -> f64 {
        match self.get(name) {
            Some(SettingValue::Num(n)) => *n,
            _ => 0.0,
        }
    }

    pub fn get_int(&self, name: &str) -> i64 {
        match self.get(name) {
            Some(SettingValue::Int(n)) => *n,
            _ => 0,
        }
    }

    pub fn get_str(&self, name: &str) -> String {
        match self.get(name) {
            Some(SettingValue::Str(s)) => s.clone(),
            _ => String::new(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::new()
    }
}

/// The plain struct [`crate::synth::Synth`] derives from the registry at
/// construction time, so the render path never has to hash-map lookups.
#[derive(Debug, Clone)]
pub struct SynthConfig {
    pub sample_rate: u32,
    pub polyphony: usize,
    pub midi_channels: usize,
    pub interpolation: InterpolationMethod,
    pub bank_select_style: BankSelectStyle,
    pub gain: f32,
    pub period_size: usize,
}

impl From<&Settings> for SynthConfig {
    fn from(settings: &Settings) -> Self {
        let interpolation = match settings.get_str("synth.interpolation").as_str() {
            "none" => InterpolationMethod::None,
            "cubic-4pt" => InterpolationMethod::Cubic4Point,
            "sinc-7pt" => InterpolationMethod::Sinc7Point,
            _ => InterpolationMethod::Linear,
        };
        let bank_select_style = match settings.get_str("synth.midi-bank-select").as_str() {
            "gm" => BankSelectStyle::Gm,
            "xg" => BankSelectStyle::Xg,
            "mma" => BankSelectStyle::Mma,
            _ => BankSelectStyle::Gs,
        };
        Self {
            sample_rate: settings.get_num("synth.sample-rate") as u32,
            polyphony: settings.get_int("synth.polyphony") as usize,
            midi_channels: settings.get_int("synth.midi-channels") as usize,
            interpolation,
            bank_select_style,
            gain: settings.get_num("synth.gain") as f32,
            period_size: settings.get_int("audio.period-size") as usize,
        }
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_pre_registered() {
        let settings = Settings::new();
        assert_eq!(settings.get_num("synth.sample-rate"), 44100.0);
        assert_eq!(settings.get_int("synth.polyphony"), 256);
    }

    #[test]
    fn out_of_range_is_rejected() {
        let mut settings = Settings::new();
        let result = settings.set("synth.gain", SettingValue::Num(100.0));
        assert!(result.is_err());
    }

    #[test]
    fn unknown_setting_is_rejected() {
        let mut settings = Settings::new();
        let result = settings.set("synth.nonexistent", SettingValue::Int(1));
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[test]
    fn invalid_choice_is_rejected() {
        let mut settings = Settings::new();
        let result = settings.set("synth.interpolation", SettingValue::Str("bogus".into()));
        assert!(result.is_err());
    }

    #[test]
    fn config_derives_from_settings() {
        let settings = Settings::new();
        let config = SynthConfig::from(&settings);
        assert_eq!(config.sample_rate, 44100);
        assert_eq!(config.interpolation, InterpolationMethod::Linear);
    }
}
