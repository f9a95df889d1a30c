//! Voice pool: a fixed-capacity array of render-thread voice slots, with
//! overflow-score based stealing when a new voice needs a slot and none are
//! free.

use crate::dsp::envelope::DahdsrStage;
use crate::voice::RVoice;

// -------------------------------------------------------------------------------------------------

/// Number of samples a stolen voice fades out over, short enough to be
/// inaudible as a click but long enough to avoid a hard discontinuity.
pub const SHORT_RELEASE_SAMPLES: u32 = 256;

/// Per-voice facts the overflow scorer needs, gathered without touching
/// voice internals beyond what [`RVoice`] already exposes.
struct ScoringContext {
    important_channel: bool,
}

/// Lower score = stolen first. Mirrors FluidSynth's voice overflow
/// prioritization: released voices go first, then quiet voices, then old
/// voices, weighted so percussion and the synth's "important" channels are
/// protected.
fn overflow_score(voice: &RVoice, age_blocks: u32, ctx: &ScoringContext) -> f32 {
    let mut score = 1000.0;

    if voice.is_releasing() {
        score -= 500.0;
    }
    if voice.volume_envelope_stage() == DahdsrStage::Release {
        score -= 200.0;
    }

    // Older voices are preferred over younger ones.
    score -= (age_blocks as f32).min(500.0);

    if ctx.important_channel {
        score += 10_000.0;
    }

    score
}

// -------------------------------------------------------------------------------------------------

struct Slot {
    voice: RVoice,
    age_blocks: u32,
    important_channel: bool,
}

/// Fixed-size voice pool. Never reallocates once constructed: render-path
/// operations are `Vec::swap_remove`/index writes only.
pub struct VoicePool {
    slots: Vec<Slot>,
    capacity: usize,
}

impl VoicePool {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn active_count(&self) -> usize {
        self.slots.len()
    }

    pub fn is_full(&self) -> bool {
        self.slots.len() >= self.capacity
    }

    /// Insert a new voice, stealing the lowest-scoring active voice first if
    /// the pool is full. Returns the id of any voice that was stolen
    /// (killed with a short release rather than removed outright, so it
    /// keeps rendering its fade-out this block).
    pub fn insert(&mut self, voice: RVoice, important_channel: bool) -> Option<u64> {
        let mut stolen_id = None;
        if self.is_full() {
            if let Some(victim_index) = self.pick_steal_victim() {
                stolen_id = Some(self.slots[victim_index].voice.id);
                self.slots[victim_index]
                    .voice
                    .kill_with_short_release(SHORT_RELEASE_SAMPLES);
            }
        }
        self.slots.push(Slot {
            voice,
            age_blocks: 0,
            important_channel,
        });
        stolen_id
    }

    fn pick_steal_victim(&self) -> Option<usize> {
        self.slots
            .iter()
            .enumerate()
            .map(|(i, slot)| {
                let ctx = ScoringContext {
                    important_channel: slot.important_channel,
                };
                (i, overflow_score(&slot.voice, slot.age_blocks, &ctx))
            })
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(i, _)| i)
    }

    /// Run `f` over every active voice, advancing age, then drop any that
    /// finished this block. Called once per mixer block.
    pub fn for_each_active(&mut self, mut f: impl FnMut(&mut RVoice)) -> Vec<u64> {
        let mut finished = Vec::new();
        let mut i = 0;
        while i < self.slots.len() {
            f(&mut self.slots[i].voice);
            self.slots[i].age_blocks += 1;
            if self.slots[i].voice.is_finished() {
                finished.push(self.slots[i].voice.id);
                self.slots.swap_remove(i);
            } else {
                i += 1;
            }
        }
        finished
    }

    pub fn find_mut(&mut self, voice_id: u64) -> Option<&mut RVoice> {
        self.slots
            .iter_mut()
            .find(|slot| slot.voice.id == voice_id)
            .map(|slot| &mut slot.voice)
    }

    /// All active voices in the same exclusive class on the same channel as
    /// `except_id` (used to implement SoundFont2 exclusive classes: starting
    /// a voice in a class kills every other voice in that class).
    pub fn voices_in_exclusive_class(
        &self,
        channel: u8,
        exclusive_class: i32,
        except_id: u64,
    ) -> Vec<u64> {
        if exclusive_class == 0 {
            return Vec::new();
        }
        self.slots
            .iter()
            .filter(|slot| {
                slot.voice.id != except_id
                    && slot.voice.channel == channel
                    && slot.voice.exclusive_class() == exclusive_class
            })
            .map(|slot| slot.voice.id)
            .collect()
    }

    pub fn kill_all(&mut self) {
        for slot in &mut self.slots {
            slot.voice.kill_with_short_release(SHORT_RELEASE_SAMPLES);
        }
    }

    pub fn note_off_channel(&mut self, channel: u8) {
        for slot in &mut self.slots {
            if slot.voice.channel == channel {
                slot.voice.note_off();
            }
        }
    }

    pub fn note_off_channel_all(&mut self) {
        for slot in &mut self.slots {
            slot.voice.note_off();
        }
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::envelope::DahdsrParameters;
    use crate::sf2::sample::{Sample, SampleLink};
    use crate::sf2::SampleMode;
    use crate::voice::VoiceParams;
    use std::sync::Arc;

    fn make_voice(id: u64) -> RVoice {
        let sample = Arc::new(Sample {
            name: "s".into(),
            data: vec![0i16; 1000].into(),
            sample_rate: 44100,
            start_loop: 0,
            end_loop: 1000,
            pitch_key: 60,
            pitch_correction: 0,
            link: SampleLink::Mono,
            link_sample: None,
        });
        let params = VoiceParams {
            sample,
            sample_mode: SampleMode::Continuous,
            root_key: 60,
            pitch_correction_cents: 0.0,
            coarse_tune_semitones: 0.0,
            fine_tune_cents: 0.0,
            scale_tuning: 100.0,
            pan: 0.0,
            initial_attenuation_db: 0.0,
            vol_env: DahdsrParameters::default(),
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
            reverb_send: 0.0,
            chorus_send: 0.0,
            exclusive_class: 0,
            muted: false,
        };
        RVoice::new(id, 0, 60, 100, params, 44100)
    }

    #[test]
    fn insert_up_to_capacity_steals_none() {
        let mut pool = VoicePool::new(2);
        assert_eq!(pool.insert(make_voice(1), false), None);
        assert_eq!(pool.insert(make_voice(2), false), None);
        assert_eq!(pool.active_count(), 2);
    }

    #[test]
    fn overflow_steals_a_voice() {
        let mut pool = VoicePool::new(2);
        pool.insert(make_voice(1), false);
        pool.insert(make_voice(2), false);
        let stolen = pool.insert(make_voice(3), false);
        assert!(stolen.is_some());
        assert_eq!(pool.active_count(), 3);
    }

    #[test]
    fn exclusive_class_lookup_excludes_self() {
        let mut pool = VoicePool::new(4);
        pool.insert(make_voice(1), false);
        let ids = pool.voices_in_exclusive_class(0, 5, 1);
        assert!(ids.is_empty());
    }
}
