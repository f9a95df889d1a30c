//! RVoice: the per-note render-path DSP pipeline. Reads one sample at a
//! pitch-driven fractional rate, runs it through the resonant filter, applies
//! the volume/modulation envelopes and the mod/vib LFOs, and writes its
//! output into the mixer's dry and effect buses.

use std::sync::Arc;

use crate::dsp::{
    envelope::{DahdsrEnvelope, DahdsrParameters, DahdsrStage},
    filter::ResonantFilter,
    interpolation::{self, InterpolationMethod, SincTable},
    lfo::TriangleLfo,
};
use crate::sf2::{Sample, SampleMode};

// -------------------------------------------------------------------------------------------------

/// Compiled, render-ready parameters for one voice, produced by the voice
/// parameter compiler from the generator/modulator sum at note-on.
#[derive(Debug, Clone)]
pub struct VoiceParams {
    pub sample: Arc<Sample>,
    pub sample_mode: SampleMode,
    pub root_key: u8,
    pub pitch_correction_cents: f32,
    pub coarse_tune_semitones: f32,
    pub fine_tune_cents: f32,
    pub scale_tuning: f32,
    pub pan: f32,
    pub initial_attenuation_db: f32,
    pub vol_env: DahdsrParameters,
    pub mod_env: DahdsrParameters,
    pub mod_env_to_pitch_cents: f32,
    pub mod_env_to_filter_cents: f32,
    pub mod_lfo_to_pitch_cents: f32,
    pub mod_lfo_to_filter_cents: f32,
    pub mod_lfo_to_volume_db: f32,
    pub vib_lfo_to_pitch_cents: f32,
    pub mod_lfo_delay_samples: u32,
    pub mod_lfo_freq_hz: f32,
    pub vib_lfo_delay_samples: u32,
    pub vib_lfo_freq_hz: f32,
    pub filter_cutoff_hz: f32,
    pub filter_q_db: f32,
    pub reverb_send: f32,
    pub chorus_send: f32,
    pub exclusive_class: i32,
    /// Set when the channel was muted at note-on time: the voice still
    /// plays out its full lifecycle (envelopes, loop, release) but never
    /// writes audible output.
    pub muted: bool,
}

/// Render state of one active voice.
pub struct RVoice {
    pub id: u64,
    pub channel: u8,
    pub key: u8,
    pub velocity: u8,
    params: VoiceParams,

    sample_rate: u32,
    playback_pos: f64,
    playback_inc: f64,

    vol_envelope: DahdsrEnvelope,
    mod_envelope: DahdsrEnvelope,
    mod_lfo: TriangleLfo,
    vib_lfo: TriangleLfo,
    filter: ResonantFilter,

    releasing: bool,
    /// Set when the pool forces a fast, click-free kill instead of a normal
    /// release: (samples remaining, samples total, level at kill time).
    short_release: Option<(u32, u32, f32)>,
}

impl RVoice {
    pub fn new(id: u64, channel: u8, key: u8, velocity: u8, params: VoiceParams, sample_rate: u32) -> Self {
        let mut voice = Self {
            id,
            channel,
            key,
            velocity,
            params,
            sample_rate,
            playback_pos: 0.0,
            playback_inc: 1.0,
            vol_envelope: DahdsrEnvelope::new(),
            mod_envelope: DahdsrEnvelope::new(),
            mod_lfo: TriangleLfo::new(),
            vib_lfo: TriangleLfo::new(),
            filter: ResonantFilter::new(sample_rate),
            releasing: false,
            short_release: None,
        };
        voice.trigger();
        voice
    }

    fn trigger(&mut self) {
        self.playback_pos = 0.0;
        self.update_pitch(0.0, 0.0, 0.0);
        self.vol_envelope.note_on(&self.params.vol_env);
        self.mod_envelope.note_on(&self.params.mod_env);
        self.mod_lfo
            .note_on(self.sample_rate, self.params.mod_lfo_freq_hz, self.params.mod_lfo_delay_samples);
        self.vib_lfo
            .note_on(self.sample_rate, self.params.vib_lfo_freq_hz, self.params.vib_lfo_delay_samples);
        self.filter.set_params(
            self.params.filter_cutoff_hz,
            self.params.filter_q_db,
            0,
            true,
        );
    }

    /// Recompute `playback_inc` from key, tuning generators, mod envelope
    /// and LFO pitch modulation (in cents).
    fn update_pitch(&mut self, mod_env_value: f32, mod_lfo_value: f32, vib_lfo_value: f32) {
        let key_cents = (self.key as f32 - self.params.root_key as f32) * self.params.scale_tuning;
        let cents = key_cents
            + self.params.coarse_tune_semitones * 100.0
            + self.params.fine_tune_cents
            + self.params.pitch_correction_cents
            + mod_env_value * self.params.mod_env_to_pitch_cents
            + mod_lfo_value * self.params.mod_lfo_to_pitch_cents
            + vib_lfo_value * self.params.vib_lfo_to_pitch_cents;
        // Ratio of played pitch to the sample's recorded root pitch, times
        // the ratio of the sample's native rate to our output rate.
        let pitch_ratio = 2f64.powf(cents as f64 / 1200.0);
        self.playback_inc =
            pitch_ratio * self.params.sample.sample_rate as f64 / self.sample_rate as f64;
    }

    /// Reuse this voice for a legato transition to a new key: pitch is
    /// recomputed from `key` on the next render block automatically
    /// (`update_pitch` reads `self.key` every sample), since the oscillator
    /// phase and filter state are left exactly as they are. When
    /// `restart_envelope` is set the volume/modulation envelopes retrigger
    /// from attack instead of continuing their current segment.
    pub fn retrigger(&mut self, key: u8, velocity: u8, restart_envelope: bool) {
        self.key = key;
        self.velocity = velocity;
        if restart_envelope {
            self.vol_envelope.note_on(&self.params.vol_env);
            self.mod_envelope.note_on(&self.params.mod_env);
            self.releasing = false;
            self.short_release = None;
        }
    }

    pub fn note_off(&mut self) {
        if !self.releasing {
            self.releasing = true;
            self.vol_envelope.note_off(&self.params.vol_env);
            self.mod_envelope.note_off(&self.params.mod_env);
        }
    }

    /// Force a fast, click-free kill: override the volume envelope with a
    /// short linear fade instead of jumping straight to silence.
    pub fn kill_with_short_release(&mut self, release_samples: u32) {
        self.releasing = true;
        let release_samples = release_samples.max(1);
        self.short_release = Some((release_samples, release_samples, self.vol_envelope.output()));
    }

    pub fn is_finished(&self) -> bool {
        if let Some((remaining, ..)) = self.short_release {
            remaining == 0
        } else {
            self.vol_envelope.is_finished()
        }
    }

    pub fn is_releasing(&self) -> bool {
        self.releasing
    }

    pub fn exclusive_class(&self) -> i32 {
        self.params.exclusive_class
    }

    pub fn set_muted(&mut self, muted: bool) {
        self.params.muted = muted;
    }

    /// Age in render blocks, used by the voice pool's overflow score.
    pub fn volume_envelope_stage(&self) -> DahdsrStage {
        self.vol_envelope.stage()
    }

    fn read_sample(&self, sinc_table: &SincTable, method: InterpolationMethod) -> f32 {
        let data: &[i16] = &self.params.sample.data;
        let integer_pos = self.playback_pos.floor() as i64;
        let frac = (self.playback_pos - self.playback_pos.floor()) as f32;
        interpolation::interpolate(method, data, integer_pos, frac, sinc_table)
    }

    fn advance_playback_pos(&mut self) {
        self.playback_pos += self.playback_inc;
        let looping = match self.params.sample_mode {
            SampleMode::Continuous => true,
            SampleMode::LoopUntilRelease => !self.releasing,
            SampleMode::NoLoop | SampleMode::UnusedNoLoop => false,
        };
        if looping {
            let end_loop = self.params.sample.end_loop as f64;
            let start_loop = self.params.sample.start_loop as f64;
            if self.playback_pos >= end_loop && end_loop > start_loop {
                self.playback_pos -= end_loop - start_loop;
            }
        }
    }

    fn past_sample_end(&self) -> bool {
        self.playback_pos >= self.params.sample.len() as f64
    }

    /// Render one block of `frame_count` frames, summing this voice's output
    /// into `dry_l`/`dry_r` and the reverb/chorus send buses.
    #[allow(clippy::too_many_arguments)]
    pub fn render_block(
        &mut self,
        frame_count: usize,
        interpolation_method: InterpolationMethod,
        sinc_table: &SincTable,
        dry_l: &mut [f32],
        dry_r: &mut [f32],
        reverb_send: &mut [f32],
        chorus_send: &mut [f32],
    ) {
        let attenuation_lin = 10f32.powf(-self.params.initial_attenuation_db / 20.0);
        let pan_l = ((1.0 - self.params.pan) * 0.5).sqrt();
        let pan_r = ((1.0 + self.params.pan) * 0.5).sqrt();

        for i in 0..frame_count {
            if self.is_finished() || self.past_sample_end() {
                break;
            }

            let mod_env_value = self.mod_envelope.run(&self.params.mod_env);
            let mod_lfo_value = self.mod_lfo.run();
            let vib_lfo_value = self.vib_lfo.run();
            self.update_pitch(mod_env_value, mod_lfo_value, vib_lfo_value);

            let vol_env_value = match &mut self.short_release {
                Some((remaining, total, start_level)) => {
                    let level = *start_level * *remaining as f32 / *total as f32;
                    *remaining -= 1;
                    level
                }
                None => self.vol_envelope.run(&self.params.vol_env),
            };

            let cutoff_mod = mod_env_value * self.params.mod_env_to_filter_cents
                + mod_lfo_value * self.params.mod_lfo_to_filter_cents;
            let cutoff_hz =
                self.params.filter_cutoff_hz * 2f32.powf(cutoff_mod / 1200.0);
            self.filter
                .set_params(cutoff_hz, self.params.filter_q_db, frame_count as u32, false);

            let raw = self.read_sample(sinc_table, interpolation_method) / 32768.0;
            let filtered = self.filter.process_sample(raw);

            let lfo_volume_db = mod_lfo_value * self.params.mod_lfo_to_volume_db;
            let volume_gain = attenuation_lin * vol_env_value * 10f32.powf(lfo_volume_db / 20.0);

            let out = if self.params.muted { 0.0 } else { filtered * volume_gain };
            dry_l[i] += out * pan_l;
            dry_r[i] += out * pan_r;
            reverb_send[i] += out * self.params.reverb_send;
            chorus_send[i] += out * self.params.chorus_send;

            self.advance_playback_pos();
        }
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sf2::sample::SampleLink;

    fn test_sample() -> Arc<Sample> {
        let data: Vec<i16> = (0..4410)
            .map(|i| ((i as f32 * 0.05).sin() * 10000.0) as i16)
            .collect();
        Arc::new(Sample {
            name: "test".into(),
            data: data.into(),
            sample_rate: 44100,
            start_loop: 100,
            end_loop: 4000,
            pitch_key: 60,
            pitch_correction: 0,
            link: SampleLink::Mono,
            link_sample: None,
        })
    }

    fn test_params(sample: Arc<Sample>) -> VoiceParams {
        VoiceParams {
            sample,
            sample_mode: SampleMode::NoLoop,
            root_key: 60,
            pitch_correction_cents: 0.0,
            coarse_tune_semitones: 0.0,
            fine_tune_cents: 0.0,
            scale_tuning: 100.0,
            pan: 0.0,
            initial_attenuation_db: 0.0,
            vol_env: DahdsrParameters {
                delay_samples: 0,
                attack_samples: 10,
                hold_samples: 0,
                decay_samples: 10,
                sustain_level: 0.7,
                release_samples: 100,
            },
            mod_env: DahdsrParameters::default(),
            mod_env_to_pitch_cents: 0.0,
            mod_env_to_filter_cents: 0.0,
            mod_lfo_to_pitch_cents: 0.0,
            mod_lfo_to_filter_cents: 0.0,
            mod_lfo_to_volume_db: 0.0,
            vib_lfo_to_pitch_cents: 0.0,
            mod_lfo_delay_samples: 0,
            mod_lfo_freq_hz: 4.0,
            vib_lfo_delay_samples: 0,
            vib_lfo_freq_hz: 5.0,
            filter_cutoff_hz: 20000.0,
            filter_q_db: 0.0,
            reverb_send: 0.2,
            chorus_send: 0.1,
            exclusive_class: 0,
            muted: false,
        }
    }

    #[test]
    fn renders_without_panicking_and_stays_finite() {
        let sample = test_sample();
        let params = test_params(sample);
        let mut voice = RVoice::new(1, 0, 60, 100, params, 44100);
        let mut dry_l = vec![0.0f32; 64];
        let mut dry_r = vec![0.0f32; 64];
        let mut reverb = vec![0.0f32; 64];
        let mut chorus = vec![0.0f32; 64];
        let sinc_table = SincTable::default();
        voice.render_block(
            64,
            InterpolationMethod::Linear,
            &sinc_table,
            &mut dry_l,
            &mut dry_r,
            &mut reverb,
            &mut chorus,
        );
        for s in dry_l.iter().chain(dry_r.iter()) {
            assert!(s.is_finite());
        }
    }

    #[test]
    fn note_off_moves_to_release_and_eventually_finishes() {
        let sample = test_sample();
        let params = test_params(sample);
        let mut voice = RVoice::new(1, 0, 60, 100, params, 44100);
        voice.note_off();
        assert!(voice.is_releasing());
        let sinc_table = SincTable::default();
        let mut dry_l = vec![0.0f32; 64];
        let mut dry_r = vec![0.0f32; 64];
        let mut reverb = vec![0.0f32; 64];
        let mut chorus = vec![0.0f32; 64];
        for _ in 0..10 {
            voice.render_block(
                64,
                InterpolationMethod::Linear,
                &sinc_table,
                &mut dry_l,
                &mut dry_r,
                &mut reverb,
                &mut chorus,
            );
        }
        assert!(voice.is_finished());
    }
}
