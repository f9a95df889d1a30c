//! MIDI channel state machine: per-channel controller state, the
//! poly/mono/legato/portamento mode machinery, the monophonic note stack,
//! basic-channel grouping, and bank-select style interpretation.

use std::collections::VecDeque;

// -------------------------------------------------------------------------------------------------

/// MIDI bank-select interpretation style, set per synth instance. Affects
/// how CC#0 (bank select MSB) and CC#32 (bank select LSB) combine into a
/// bank number.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum BankSelectStyle {
    /// General MIDI: only one bank exists, bank-select CCs are ignored.
    Gm,
    #[default]
    /// Roland GS: bank = MSB.
    Gs,
    /// Yamaha XG: bank = LSB.
    Xg,
    /// MMA (the modern de-facto standard): bank = MSB * 128 + LSB.
    Mma,
}

impl BankSelectStyle {
    pub fn resolve_bank(self, msb: u8, lsb: u8) -> u32 {
        match self {
            Self::Gm => 0,
            Self::Gs => msb as u32,
            Self::Xg => lsb as u32,
            Self::Mma => msb as u32 * 128 + lsb as u32,
        }
    }
}

// -------------------------------------------------------------------------------------------------

/// Basic-channel group polyphony mode (`OmniOn`/`OmniOff` x `Poly`/`Mono`,
/// the four MIDI "mode messages").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelMode {
    OmniOnPoly,
    OmniOnMono,
    OmniOffPoly,
    /// `mono_count` is the number of channels in this basic-channel group
    /// (the `val` argument of the mono mode message).
    OmniOffMono { mono_count: u8 },
}

/// How a legato (overlapping note) transition retriggers the envelopes of
/// the voice that continues sounding.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum LegatoMode {
    #[default]
    /// Envelopes restart but the volume envelope's release stage is
    /// shortened so the transition is fast.
    RetriggerFastRelease,
    RetriggerNormalRelease,
    /// A new voice is started for every note (no true legato).
    MultiRetrigger,
    /// The envelopes are not retriggered at all; only pitch changes.
    SingleTrigger0,
    /// Like `SingleTrigger0`, but the attack phase restarts from the
    /// current level rather than from zero.
    SingleTrigger1,
}

/// Portamento (pitch glide) applicability.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum PortamentoMode {
    #[default]
    EachNote,
    LegatoOnly,
    StaccatoOnly,
}

/// Breath-controller note-triggering behavior.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum BreathMode {
    #[default]
    None,
    /// Breath controller crossing the threshold retriggers the note
    /// (poly).
    Poly,
    Mono,
    /// Breath and note-on/off are synchronized: a note only sounds while
    /// breath is above threshold.
    Sync,
}

// -------------------------------------------------------------------------------------------------

const NOTE_STACK_CAPACITY: usize = 16;

/// Circular buffer of currently-held keys for monophonic legato/portamento
/// tracking, mirroring FluidSynth's `fluid_channel_t` note stack
/// (`iFirst`/`iLast`/`nNotes`).
#[derive(Debug, Default)]
struct NoteStack {
    keys: VecDeque<(u8, u8)>, // (key, velocity)
}

impl NoteStack {
    fn push(&mut self, key: u8, velocity: u8) {
        self.keys.retain(|&(k, _)| k != key);
        if self.keys.len() >= NOTE_STACK_CAPACITY {
            self.keys.pop_front();
        }
        self.keys.push_back((key, velocity));
    }

    fn remove(&mut self, key: u8) {
        self.keys.retain(|&(k, _)| k != key);
    }

    fn current(&self) -> Option<(u8, u8)> {
        self.keys.back().copied()
    }

    fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    fn len(&self) -> usize {
        self.keys.len()
    }
}

// -------------------------------------------------------------------------------------------------

/// Per-channel MIDI controller and mode state.
pub struct Channel {
    pub index: u8,
    pub bank_msb: u8,
    pub bank_lsb: u8,
    pub program: u8,
    pub pitch_bend: i16,
    pub pitch_bend_sensitivity_semitones: u8,
    pub mod_wheel: u8,
    pub channel_pressure: u8,
    pub volume: u8,
    pub expression: u8,
    pub pan: u8,
    pub sustain_pedal: bool,
    pub mute: bool,

    pub mode: ChannelMode,
    pub legato_mode: LegatoMode,
    pub portamento_mode: PortamentoMode,
    pub breath_mode: BreathMode,
    pub portamento_enabled: bool,
    pub portamento_time_ms: u32,

    note_stack: NoteStack,
}

impl Channel {
    pub fn new(index: u8) -> Self {
        Self {
            index,
            bank_msb: 0,
            bank_lsb: 0,
            program: 0,
            pitch_bend: 0,
            pitch_bend_sensitivity_semitones: 2,
            mod_wheel: 0,
            channel_pressure: 0,
            volume: 100,
            expression: 127,
            pan: 64,
            sustain_pedal: false,
            mute: false,
            mode: ChannelMode::OmniOnPoly,
            legato_mode: LegatoMode::default(),
            portamento_mode: PortamentoMode::default(),
            breath_mode: BreathMode::default(),
            portamento_enabled: false,
            portamento_time_ms: 0,
            note_stack: NoteStack::default(),
        }
    }

    pub fn is_mono(&self) -> bool {
        matches!(self.mode, ChannelMode::OmniOnMono | ChannelMode::OmniOffMono { .. })
    }

    pub fn bank(&self, style: BankSelectStyle) -> u32 {
        style.resolve_bank(self.bank_msb, self.bank_lsb)
    }

    /// Outcome of pressing a key in mono mode: whether this is a fresh note
    /// (no voices currently held), a legato transition from an existing
    /// note, or, per `PortamentoMode`, whether a glide should be applied.
    pub fn note_on_mono(&mut self, key: u8, velocity: u8) -> MonoNoteOnKind {
        let had_note = !self.note_stack.is_empty();
        let glide_from = self.note_stack.current().map(|(k, _)| k);
        self.note_stack.push(key, velocity);

        let portamento = self.portamento_enabled
            && match self.portamento_mode {
                PortamentoMode::EachNote => true,
                PortamentoMode::LegatoOnly => had_note,
                PortamentoMode::StaccatoOnly => !had_note,
            }
            && glide_from.is_some();

        if had_note {
            MonoNoteOnKind::Legato {
                from_key: glide_from,
                portamento,
            }
        } else {
            MonoNoteOnKind::Fresh { portamento }
        }
    }

    /// Outcome of releasing a key in mono mode: either the channel falls
    /// silent, or note playback should fall back to the next key still
    /// held on the note stack (re-legato to the previous note).
    pub fn note_off_mono(&mut self, key: u8) -> MonoNoteOffKind {
        self.note_stack.remove(key);
        match self.note_stack.current() {
            Some((fallback_key, fallback_velocity)) => MonoNoteOffKind::FallBack {
                key: fallback_key,
                velocity: fallback_velocity,
            },
            None => MonoNoteOffKind::Silence,
        }
    }

    pub fn held_note_count(&self) -> usize {
        self.note_stack.len()
    }

    pub fn all_notes_off(&mut self) {
        self.note_stack = NoteStack::default();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonoNoteOnKind {
    Fresh { portamento: bool },
    Legato { from_key: Option<u8>, portamento: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonoNoteOffKind {
    Silence,
    FallBack { key: u8, velocity: u8 },
}

// -------------------------------------------------------------------------------------------------

/// Number of MIDI channels a synth instance manages.
pub const CHANNEL_COUNT: usize = 16;

/// Narrow the span of the basic-channel group that contains `narrow_before`
/// so a newly inserted group at `new_start` does not overlap it, mirroring
/// FluidSynth's `fluid_synth_set_basic_channel_LOCAL` behavior: inserting a
/// new basic-channel group clips the previous group's range to end right
/// before the new one starts.
pub fn narrow_previous_group(groups: &mut [(u8, ChannelMode)], new_start: u8) {
    for (start, mode) in groups.iter_mut() {
        if let ChannelMode::OmniOffMono { mono_count } = mode {
            let end = *start + *mono_count;
            if *start < new_start && end > new_start {
                *mono_count = new_start - *start;
            }
        }
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bank_select_styles_resolve_correctly() {
        assert_eq!(BankSelectStyle::Gm.resolve_bank(5, 9), 0);
        assert_eq!(BankSelectStyle::Gs.resolve_bank(5, 9), 5);
        assert_eq!(BankSelectStyle::Xg.resolve_bank(5, 9), 9);
        assert_eq!(BankSelectStyle::Mma.resolve_bank(5, 9), 5 * 128 + 9);
    }

    #[test]
    fn mono_note_on_first_note_is_fresh() {
        let mut channel = Channel::new(0);
        let kind = channel.note_on_mono(60, 100);
        assert_eq!(kind, MonoNoteOnKind::Fresh { portamento: false });
    }

    #[test]
    fn mono_note_on_second_note_is_legato() {
        let mut channel = Channel::new(0);
        channel.note_on_mono(60, 100);
        let kind = channel.note_on_mono(64, 100);
        assert_eq!(
            kind,
            MonoNoteOnKind::Legato {
                from_key: Some(60),
                portamento: false
            }
        );
    }

    #[test]
    fn mono_note_off_falls_back_to_held_note() {
        let mut channel = Channel::new(0);
        channel.note_on_mono(60, 100);
        channel.note_on_mono(64, 110);
        let kind = channel.note_off_mono(64);
        assert_eq!(
            kind,
            MonoNoteOffKind::FallBack {
                key: 60,
                velocity: 100
            }
        );
    }

    #[test]
    fn mono_note_off_last_note_silences() {
        let mut channel = Channel::new(0);
        channel.note_on_mono(60, 100);
        let kind = channel.note_off_mono(60);
        assert_eq!(kind, MonoNoteOffKind::Silence);
    }

    #[test]
    fn portamento_staccato_only_applies_on_fresh_note() {
        let mut channel = Channel::new(0);
        channel.portamento_enabled = true;
        channel.portamento_mode = PortamentoMode::StaccatoOnly;
        channel.note_on_mono(60, 100);
        let kind = channel.note_on_mono(64, 100);
        assert_eq!(
            kind,
            MonoNoteOnKind::Legato {
                from_key: Some(60),
                portamento: false
            }
        );
    }

    #[test]
    fn narrowing_clips_overlapping_previous_group() {
        let mut groups = vec![(0u8, ChannelMode::OmniOffMono { mono_count: 8 })];
        narrow_previous_group(&mut groups, 3);
        assert_eq!(groups[0].1, ChannelMode::OmniOffMono { mono_count: 3 });
    }
}
