//! The mixer: the render thread's per-block entry point. Drains the event
//! ring, advances every active voice, sums dry and effect-send buses, runs
//! the shared reverb/chorus, and writes interleaved or planar float output.

use crate::dsp::{Chorus, Reverb};
use crate::dsp::interpolation::{InterpolationMethod, SincTable};
use crate::event::{EventReceiver, ReportSender, RenderEvent, RenderReport};
use crate::pool::VoicePool;
use crate::voice::{RVoice, VoiceParams};

// -------------------------------------------------------------------------------------------------

/// Render-thread mixer state: voice pool, effect buses, scratch buffers.
/// Everything here is pre-allocated at construction; `process_block` never
/// allocates.
pub struct Mixer {
    sample_rate: u32,
    pool: VoicePool,
    interpolation_method: InterpolationMethod,
    sinc_table: SincTable,

    reverb: Reverb,
    chorus: Chorus,
    reverb_enabled: bool,
    chorus_enabled: bool,
    master_gain: f32,

    // Scratch buffers, sized to the largest block this mixer will ever be
    // asked to render.
    dry_l: Vec<f32>,
    dry_r: Vec<f32>,
    reverb_send: Vec<f32>,
    chorus_send: Vec<f32>,
    effect_stereo: Vec<(f32, f32)>,

    event_receiver: EventReceiver,
    report_sender: ReportSender,
    pending_events: Vec<RenderEvent>,
}

impl Mixer {
    pub fn new(
        sample_rate: u32,
        max_voices: usize,
        max_block_size: usize,
        event_receiver: EventReceiver,
        report_sender: ReportSender,
    ) -> Self {
        Self {
            sample_rate,
            pool: VoicePool::new(max_voices),
            interpolation_method: InterpolationMethod::default(),
            sinc_table: SincTable::new(),
            reverb: Reverb::new(sample_rate),
            chorus: Chorus::new(sample_rate, 3),
            reverb_enabled: true,
            chorus_enabled: true,
            master_gain: 1.0,
            dry_l: vec![0.0; max_block_size],
            dry_r: vec![0.0; max_block_size],
            reverb_send: vec![0.0; max_block_size],
            chorus_send: vec![0.0; max_block_size],
            effect_stereo: vec![(0.0, 0.0); max_block_size],
            event_receiver,
            report_sender,
            pending_events: Vec::with_capacity(64),
        }
    }

    pub fn set_interpolation_method(&mut self, method: InterpolationMethod) {
        self.interpolation_method = method;
    }

    pub fn set_master_gain(&mut self, gain: f32) {
        self.master_gain = gain;
    }

    pub fn active_voice_count(&self) -> usize {
        self.pool.active_count()
    }

    pub fn polyphony(&self) -> usize {
        self.pool.capacity()
    }

    /// The largest frame count a single [`Self::process_block`] call can
    /// take; callers rendering larger spans must chunk.
    pub fn max_block_size(&self) -> usize {
        self.dry_l.len()
    }

    fn handle_event(&mut self, event: RenderEvent) {
        match event {
            RenderEvent::StartVoice(start) => {
                let mut voice = RVoice::new(
                    start.voice_id,
                    start.channel,
                    start.key,
                    start.velocity,
                    compile_voice_params(&start.generators, &start.sample, self.sample_rate),
                    self.sample_rate,
                );
                voice.set_muted(start.muted);
                let exclusive_class = voice.exclusive_class();
                let channel = voice.channel;
                let killed = self
                    .pool
                    .voices_in_exclusive_class(channel, exclusive_class, voice.id);
                for id in killed {
                    if let Some(v) = self.pool.find_mut(id) {
                        v.kill_with_short_release(crate::pool::SHORT_RELEASE_SAMPLES);
                    }
                }
                if let Some(stolen_id) = self.pool.insert(voice, false) {
                    log::debug!("voice pool full, stole voice {stolen_id}");
                }
            }
            RenderEvent::StopVoice { voice_id } => {
                if let Some(voice) = self.pool.find_mut(voice_id) {
                    voice.note_off();
                }
            }
            RenderEvent::KillVoiceFast { voice_id } => {
                if let Some(voice) = self.pool.find_mut(voice_id) {
                    voice.kill_with_short_release(crate::pool::SHORT_RELEASE_SAMPLES);
                }
            }
            RenderEvent::RetriggerVoice {
                voice_id,
                key,
                velocity,
                restart_envelope,
            } => {
                if let Some(voice) = self.pool.find_mut(voice_id) {
                    voice.retrigger(key, velocity, restart_envelope);
                }
            }
            RenderEvent::SetReverbParams {
                room_size,
                damping,
                width,
                level,
            } => {
                self.reverb.set_room_size(room_size);
                self.reverb.set_damping(damping);
                self.reverb.set_width(width);
                self.reverb.set_level(level);
            }
            RenderEvent::SetChorusParams {
                speed_hz,
                depth_ms,
                level,
            } => {
                self.chorus.set_speed(speed_hz);
                self.chorus.set_depth_ms(depth_ms);
                self.chorus.set_level(level);
            }
            RenderEvent::SetReverbEnabled(enabled) => self.reverb_enabled = enabled,
            RenderEvent::SetChorusEnabled(enabled) => self.chorus_enabled = enabled,
            RenderEvent::SetMasterGain(gain) => self.master_gain = gain,
            RenderEvent::NoteOffChannel { channel } => self.pool.note_off_channel(channel),
            RenderEvent::AllNotesOff => self.pool.note_off_channel_all(),
            RenderEvent::AllSoundOff => self.pool.kill_all(),
            RenderEvent::SetPitchBend { .. }
            | RenderEvent::SetModWheel { .. }
            | RenderEvent::SetKeyPressure { .. }
            | RenderEvent::SetChannelPressure { .. } => {
                // Per-channel continuous controllers are folded into the
                // generator sum at the next note-on by the compiler; voices
                // already sounding are not retroactively modulated here.
            }
        }
    }

    /// Render one block, producing `frame_count` frames into the given
    /// planar stereo output buffers.
    pub fn process_block(&mut self, frame_count: usize, out_l: &mut [f32], out_r: &mut [f32]) {
        debug_assert!(frame_count <= self.dry_l.len());

        self.pending_events.clear();
        self.event_receiver.drain_into(&mut self.pending_events);
        for i in 0..self.pending_events.len() {
            let event = self.pending_events[i].clone();
            self.handle_event(event);
        }

        self.dry_l[..frame_count].fill(0.0);
        self.dry_r[..frame_count].fill(0.0);
        self.reverb_send[..frame_count].fill(0.0);
        self.chorus_send[..frame_count].fill(0.0);

        let dry_l = &mut self.dry_l[..frame_count];
        let dry_r = &mut self.dry_r[..frame_count];
        let reverb_send = &mut self.reverb_send[..frame_count];
        let chorus_send = &mut self.chorus_send[..frame_count];
        let interpolation_method = self.interpolation_method;
        let sinc_table = &self.sinc_table;

        let finished = self.pool.for_each_active(|voice| {
            voice.render_block(
                frame_count,
                interpolation_method,
                sinc_table,
                dry_l,
                dry_r,
                reverb_send,
                chorus_send,
            );
        });
        for voice_id in finished {
            self.report_sender
                .push(RenderReport::VoiceFinished { voice_id });
        }

        self.effect_stereo[..frame_count].fill((0.0, 0.0));
        if self.reverb_enabled {
            self.reverb
                .process(&self.reverb_send[..frame_count], &mut self.effect_stereo[..frame_count]);
        }
        if self.chorus_enabled {
            self.chorus
                .process(&self.chorus_send[..frame_count], &mut self.effect_stereo[..frame_count]);
        }

        let gain = self.master_gain;
        for i in 0..frame_count {
            out_l[i] = (self.dry_l[i] + self.effect_stereo[i].0) * gain;
            out_r[i] = (self.dry_r[i] + self.effect_stereo[i].1) * gain;
        }
    }
}

/// Translate a compiled generator set into the flat [`VoiceParams`] the
/// render path consumes. Generator amounts are in the SoundFont2 native
/// units (timecents, cents, centibels); this converts to the seconds/Hz/dB
/// the DSP kernels use.
fn compile_voice_params(
    generators: &crate::sf2::GeneratorSet,
    sample: &std::sync::Arc<crate::sf2::Sample>,
    sample_rate: u32,
) -> VoiceParams {
    use crate::dsp::envelope::DahdsrParameters;
    use crate::sf2::GeneratorType as G;

    let timecents_to_samples = |tc: f32| -> u32 {
        if tc <= -12000.0 {
            0
        } else {
            (2f32.powf(tc / 1200.0) * sample_rate as f32) as u32
        }
    };

    let root_key = if generators.get(G::OverridingRootKey) >= 0.0 {
        generators.get(G::OverridingRootKey) as u8
    } else {
        sample.pitch_key
    };

    VoiceParams {
        sample: std::sync::Arc::clone(sample),
        sample_mode: generators.sample_mode(),
        root_key,
        pitch_correction_cents: sample.pitch_correction as f32,
        coarse_tune_semitones: generators.get(G::CoarseTune),
        fine_tune_cents: generators.get(G::FineTune),
        scale_tuning: generators.get(G::ScaleTuning),
        pan: (generators.get(G::Pan) / 500.0).clamp(-1.0, 1.0),
        initial_attenuation_db: generators.get(G::InitialAttenuation) / 10.0,
        vol_env: DahdsrParameters {
            delay_samples: timecents_to_samples(generators.get(G::DelayVolEnv)),
            attack_samples: timecents_to_samples(generators.get(G::AttackVolEnv)),
            hold_samples: timecents_to_samples(generators.get(G::HoldVolEnv)),
            decay_samples: timecents_to_samples(generators.get(G::DecayVolEnv)),
            sustain_level: 1.0 - (generators.get(G::SustainVolEnv) / 1000.0).clamp(0.0, 1.0),
            release_samples: timecents_to_samples(generators.get(G::ReleaseVolEnv)),
        },
        mod_env: DahdsrParameters {
            delay_samples: timecents_to_samples(generators.get(G::DelayModEnv)),
            attack_samples: timecents_to_samples(generators.get(G::AttackModEnv)),
            hold_samples: timecents_to_samples(generators.get(G::HoldModEnv)),
            decay_samples: timecents_to_samples(generators.get(G::DecayModEnv)),
            sustain_level: 1.0 - (generators.get(G::SustainModEnv) / 1000.0).clamp(0.0, 1.0),
            release_samples: timecents_to_samples(generators.get(G::ReleaseModEnv)),
        },
        mod_env_to_pitch_cents: generators.get(G::ModEnvToPitch),
        mod_env_to_filter_cents: generators.get(G::ModEnvToFilterFc),
        mod_lfo_to_pitch_cents: generators.get(G::ModLfoToPitch),
        mod_lfo_to_filter_cents: generators.get(G::ModLfoToFilterFc),
        mod_lfo_to_volume_db: generators.get(G::ModLfoToVolume) / 10.0,
        vib_lfo_to_pitch_cents: generators.get(G::VibLfoToPitch),
        mod_lfo_delay_samples: timecents_to_samples(generators.get(G::DelayModLfo)),
        mod_lfo_freq_hz: 8.176 * 2f32.powf(generators.get(G::FreqModLfo) / 1200.0),
        vib_lfo_delay_samples: timecents_to_samples(generators.get(G::DelayVibLfo)),
        vib_lfo_freq_hz: 8.176 * 2f32.powf(generators.get(G::FreqVibLfo) / 1200.0),
        filter_cutoff_hz: 8.176 * 2f32.powf(generators.get(G::InitialFilterFc) / 1200.0),
        filter_q_db: generators.get(G::InitialFilterQ) / 10.0,
        reverb_send: (generators.get(G::ReverbEffectsSend) / 1000.0).clamp(0.0, 1.0),
        chorus_send: (generators.get(G::ChorusEffectsSend) / 1000.0).clamp(0.0, 1.0),
        exclusive_class: generators.get(G::ExclusiveClass) as i32,
        muted: false,
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventRing;
    use crate::sf2::sample::SampleLink;
    use crate::sf2::Sample;
    use std::sync::Arc;

    #[test]
    fn silent_mixer_produces_zero_output() {
        let ring = EventRing::new(16);
        let mut mixer = Mixer::new(44100, 8, 512, ring.receiver(), ring.report_sender());
        let mut out_l = vec![0.0f32; 128];
        let mut out_r = vec![0.0f32; 128];
        mixer.process_block(128, &mut out_l, &mut out_r);
        assert!(out_l.iter().all(|&s| s == 0.0));
        assert!(out_r.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn start_voice_event_produces_sound() {
        let ring = EventRing::new(16);
        let sender = ring.sender();
        let mut mixer = Mixer::new(44100, 8, 512, ring.receiver(), ring.report_sender());

        let sample = Arc::new(Sample {
            name: "s".into(),
            data: (0..4000)
                .map(|i| ((i as f32 * 0.1).sin() * 16000.0) as i16)
                .collect::<Vec<_>>()
                .into(),
            sample_rate: 44100,
            start_loop: 0,
            end_loop: 4000,
            pitch_key: 60,
            pitch_correction: 0,
            link: SampleLink::Mono,
            link_sample: None,
        });

        use crate::event::{RenderEvent, VoiceStartParams};
        sender
            .push(RenderEvent::StartVoice(Box::new(VoiceStartParams {
                voice_id: 1,
                channel: 0,
                key: 60,
                velocity: 100,
                sample,
                generators: crate::sf2::GeneratorSet::default(),
                muted: false,
            })))
            .unwrap();

        let mut out_l = vec![0.0f32; 256];
        let mut out_r = vec![0.0f32; 256];
        mixer.process_block(256, &mut out_l, &mut out_r);
        assert_eq!(mixer.active_voice_count(), 1);
        assert!(out_l.iter().any(|&s| s != 0.0) || out_r.iter().any(|&s| s != 0.0));
    }
}
