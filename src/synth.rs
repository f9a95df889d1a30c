//! Synth Facade: the crate's public control-thread API. Owns the
//! SoundFont, channel state, settings registry, and the event ring to the
//! render thread; `process`/`write_*` are the render-thread entry points a
//! caller's audio driver calls every block (spawning and prioritizing that
//! thread is the caller's responsibility -- out of scope here).

use std::sync::atomic::{AtomicU64, Ordering};

use crate::channel::{
    narrow_previous_group, BreathMode, Channel, ChannelMode, LegatoMode, MonoNoteOffKind,
    MonoNoteOnKind, PortamentoMode, CHANNEL_COUNT,
};
use crate::convert;
use crate::error::Error;
use crate::event::{EventRing, EventSender, RenderEvent, RenderReport, ReportReceiver, VoiceStartParams};
use crate::mixer::Mixer;
use crate::settings::{Settings, SynthConfig};
use crate::sf2::SoundFont;

// -------------------------------------------------------------------------------------------------

const DEFAULT_RING_CAPACITY: usize = 1024;

/// Control-thread bookkeeping for one voice started on the render thread:
/// which (channel, key) it belongs to, and whether a note-off has already
/// been deferred for it because the channel's sustain pedal is held (see
/// [`Synth::note_off`]).
struct VoiceInfo {
    channel: u8,
    key: u8,
    held_by_pedal: bool,
}

/// The synthesis core's control-thread handle. Cloning a light wrapper
/// around it (e.g. behind an `Arc<Mutex<_>>`) is the caller's job if MIDI
/// input and audio rendering live on different threads.
pub struct Synth {
    config: SynthConfig,
    settings: Settings,
    /// Loaded soundfonts in load order, each tagged with the `sfid` handed
    /// back by [`Synth::sfload`]. Preset lookup searches newest-loaded
    /// first, matching FluidSynth's soundfont stack semantics.
    fonts: Vec<(u32, SoundFont)>,
    next_sfid: u32,
    channels: Vec<Channel>,
    preset_selection: Vec<(u32, u32)>, // (bank, program) per channel
    /// Basic-channel groups established by MIDI mode messages (CC#126/127),
    /// in the order they were declared; a new group narrows any earlier
    /// group it overlaps.
    channel_mode_groups: Vec<(u8, ChannelMode)>,

    event_sender: EventSender,
    report_receiver: ReportReceiver,
    mixer: Mixer,

    next_voice_id: AtomicU64,
    active_voice_channels: std::collections::HashMap<u64, VoiceInfo>,
}

impl Synth {
    pub fn new(settings: Settings) -> Self {
        let config = SynthConfig::from(&settings);
        let ring = EventRing::new(DEFAULT_RING_CAPACITY);
        let mut mixer = Mixer::new(
            config.sample_rate,
            config.polyphony,
            config.period_size.max(64),
            ring.receiver(),
            ring.report_sender(),
        );
        mixer.set_interpolation_method(config.interpolation);
        mixer.set_master_gain(config.gain);
        let channels = (0..config.midi_channels.max(CHANNEL_COUNT))
            .map(|i| Channel::new(i as u8))
            .collect::<Vec<_>>();
        let preset_selection = vec![(0, 0); channels.len()];
        Self {
            config,
            settings,
            fonts: Vec::new(),
            next_sfid: 1,
            channels,
            preset_selection,
            channel_mode_groups: Vec::new(),
            event_sender: ring.sender(),
            report_receiver: ring.report_receiver(),
            mixer,
            next_voice_id: AtomicU64::new(1),
            active_voice_channels: std::collections::HashMap::new(),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn config(&self) -> &SynthConfig {
        &self.config
    }

    /// Load a decoded SoundFont onto the stack, returning the `sfid`
    /// callers use to address it with [`Self::sfunload`]. Parsing the SF2
    /// file itself is out of scope here; callers hand in an already-decoded
    /// [`SoundFont`] (see the loader interface in `sf2::sample`).
    /// Deprecated convenience used by the crate's own tests; equivalent to
    /// `sfload` without needing the returned id.
    #[cfg(test)]
    pub fn load_soundfont(&mut self, font: SoundFont) {
        self.sfload(font);
    }

    /// Push `font` onto the soundfont stack. Presets are resolved against
    /// the most recently loaded font first, so a later `sfload` shadows
    /// identically-banked presets in an earlier one.
    pub fn sfload(&mut self, font: SoundFont) -> u32 {
        let sfid = self.next_sfid;
        self.next_sfid += 1;
        self.fonts.push((sfid, font));
        sfid
    }

    /// Remove a previously loaded soundfont. Fails with [`Error::NotFound`]
    /// if `sfid` isn't currently loaded; unlike FluidSynth this crate does
    /// not refuse the unload when voices still reference its samples, since
    /// voices hold an `Arc<Sample>` and keep playing out the samples they
    /// already started on regardless (see `DESIGN.md`).
    pub fn sfunload(&mut self, sfid: u32) -> Result<(), Error> {
        let before = self.fonts.len();
        self.fonts.retain(|(id, _)| *id != sfid);
        if self.fonts.len() == before {
            return Err(Error::NotFound(format!("no soundfont with sfid {sfid}")));
        }
        Ok(())
    }

    pub fn sfcount(&self) -> usize {
        self.fonts.len()
    }

    /// Find the preset for `(bank, program)`, searching the most recently
    /// loaded soundfont first.
    fn find_preset(&self, bank: u32, program: u32) -> Option<(&SoundFont, &crate::sf2::Preset)> {
        self.fonts
            .iter()
            .rev()
            .find_map(|(_, font)| font.find_preset(bank, program).map(|preset| (font, preset)))
    }

    fn channel_mut(&mut self, channel: u8) -> Result<&mut Channel, Error> {
        self.channels
            .get_mut(channel as usize)
            .ok_or_else(|| Error::InvalidArgument(format!("channel {channel} out of range")))
    }

    fn next_voice_id(&self) -> u64 {
        self.next_voice_id.fetch_add(1, Ordering::Relaxed)
    }

    /// MIDI note-on. Compiles the matching zones into one or more voices and
    /// posts them to the render thread. Returns `Ok(())` even if the ring
    /// is momentarily full for one of several started voices -- the caller
    /// only sees [`Error::RingOverflow`] if every voice for this note failed
    /// to post.
    pub fn note_on(&mut self, channel: u8, key: u8, velocity: u8) -> Result<(), Error> {
        if velocity == 0 {
            return self.note_off(channel, key);
        }
        if self.fonts.is_empty() {
            return Err(Error::InvalidState("no soundfont loaded".into()));
        }
        let is_mono = self.channels[channel as usize].is_mono();

        // Release-on-same-note: a voice on this exact (channel, key) still
        // held only by the sustain pedal must stop before a new one starts.
        self.force_release_pedal_held(channel, key)?;

        if is_mono {
            let legato_mode = self.channels[channel as usize].legato_mode;
            let kind = self.channel_mut(channel)?.note_on_mono(key, velocity);
            if let MonoNoteOnKind::Legato { .. } = kind {
                match legato_mode {
                    LegatoMode::RetriggerFastRelease => {
                        self.kill_channel_voices_fast(channel)?;
                    }
                    LegatoMode::RetriggerNormalRelease => {
                        self.release_channel_voices(channel)?;
                    }
                    LegatoMode::MultiRetrigger => {
                        if self.retrigger_channel_voices(channel, key, velocity, true)? {
                            return Ok(());
                        }
                    }
                    LegatoMode::SingleTrigger0 | LegatoMode::SingleTrigger1 => {
                        if self.retrigger_channel_voices(channel, key, velocity, false)? {
                            return Ok(());
                        }
                    }
                }
            }
        }

        self.compile_and_start(channel, key, velocity)
    }

    /// Compile the preset's matching zones for `(key, velocity)` and post a
    /// new voice per matching sample to the render thread.
    fn compile_and_start(&mut self, channel: u8, key: u8, velocity: u8) -> Result<(), Error> {
        let (bank, program) = self.preset_selection[channel as usize];
        let Some((font, preset)) = self.find_preset(bank, program) else {
            return Ok(()); // silent note: no matching preset loaded
        };
        let muted = self.channels[channel as usize].mute;
        let compiled = crate::compiler::compile_voices(
            font,
            preset,
            key,
            velocity,
            &self.channels[channel as usize],
        );
        if compiled.is_empty() {
            return Ok(());
        }

        let mut last_err = None;
        for voice in compiled {
            let voice_id = self.next_voice_id();
            let result = self.event_sender.push(RenderEvent::StartVoice(Box::new(VoiceStartParams {
                voice_id,
                channel,
                key,
                velocity,
                sample: voice.sample,
                generators: voice.generators,
                muted,
            })));
            match result {
                Ok(()) => {
                    self.active_voice_channels.insert(
                        voice_id,
                        VoiceInfo {
                            channel,
                            key,
                            held_by_pedal: false,
                        },
                    );
                }
                Err(e) => last_err = Some(e),
            }
        }
        last_err.map_or(Ok(()), Err)
    }

    pub fn note_off(&mut self, channel: u8, key: u8) -> Result<(), Error> {
        let is_mono = self.channel_mut(channel)?.is_mono();
        if is_mono {
            match self.channel_mut(channel)?.note_off_mono(key) {
                MonoNoteOffKind::Silence => self.release_or_hold(channel, key)?,
                MonoNoteOffKind::FallBack { key: fallback_key, velocity: fallback_velocity } => {
                    // The voice currently sounding the lifted note is reused
                    // for the note it falls back to rather than released:
                    // only release it outright if there was nothing to
                    // retarget (no voice was actually sounding).
                    if !self.retrigger_channel_voices(channel, fallback_key, fallback_velocity, false)? {
                        self.release_or_hold(channel, key)?;
                        self.compile_and_start(channel, fallback_key, fallback_velocity)?;
                    }
                }
            }
        } else {
            self.release_or_hold(channel, key)?;
        }
        Ok(())
    }

    /// Release every voice on `(channel, key)`, unless the channel's sustain
    /// pedal is down, in which case they're only marked so a later pedal-up
    /// (or a same-note retrigger, see [`Self::force_release_pedal_held`])
    /// releases them.
    fn release_or_hold(&mut self, channel: u8, key: u8) -> Result<(), Error> {
        let sustain = self.channels[channel as usize].sustain_pedal;
        let mut last_err = None;
        for (&id, info) in self.active_voice_channels.iter_mut() {
            if info.channel != channel || info.key != key {
                continue;
            }
            if sustain {
                info.held_by_pedal = true;
            } else if let Err(e) = self.event_sender.push(RenderEvent::StopVoice { voice_id: id }) {
                last_err = Some(e);
            }
        }
        last_err.map_or(Ok(()), Err)
    }

    fn force_release_pedal_held(&mut self, channel: u8, key: u8) -> Result<(), Error> {
        let mut last_err = None;
        for (&id, info) in self.active_voice_channels.iter_mut() {
            if info.channel == channel && info.key == key && info.held_by_pedal {
                info.held_by_pedal = false;
                if let Err(e) = self.event_sender.push(RenderEvent::StopVoice { voice_id: id }) {
                    last_err = Some(e);
                }
            }
        }
        last_err.map_or(Ok(()), Err)
    }

    /// Release the pedal hold on every voice on `channel` (sustain pedal
    /// lifted): any voice whose note-off was deferred now actually stops.
    fn release_pedal_held_on_channel(&mut self, channel: u8) -> Result<(), Error> {
        let mut last_err = None;
        for (&id, info) in self.active_voice_channels.iter_mut() {
            if info.channel == channel && info.held_by_pedal {
                info.held_by_pedal = false;
                if let Err(e) = self.event_sender.push(RenderEvent::StopVoice { voice_id: id }) {
                    last_err = Some(e);
                }
            }
        }
        last_err.map_or(Ok(()), Err)
    }

    fn release_channel_voices(&mut self, channel: u8) -> Result<(), Error> {
        let ids: Vec<u64> = self
            .active_voice_channels
            .iter()
            .filter(|(_, info)| info.channel == channel)
            .map(|(&id, _)| id)
            .collect();
        for id in ids {
            self.event_sender.push(RenderEvent::StopVoice { voice_id: id })?;
        }
        Ok(())
    }

    fn kill_channel_voices_fast(&mut self, channel: u8) -> Result<(), Error> {
        let ids: Vec<u64> = self
            .active_voice_channels
            .iter()
            .filter(|(_, info)| info.channel == channel)
            .map(|(&id, _)| id)
            .collect();
        for id in ids {
            self.event_sender.push(RenderEvent::KillVoiceFast { voice_id: id })?;
        }
        Ok(())
    }

    /// Reuse every currently sounding voice on `channel` for a legato
    /// transition to `(key, velocity)` instead of starting a new one.
    /// Returns whether any voice was retriggered.
    fn retrigger_channel_voices(
        &mut self,
        channel: u8,
        key: u8,
        velocity: u8,
        restart_envelope: bool,
    ) -> Result<bool, Error> {
        let ids: Vec<u64> = self
            .active_voice_channels
            .iter()
            .filter(|(_, info)| info.channel == channel)
            .map(|(&id, _)| id)
            .collect();
        if ids.is_empty() {
            return Ok(false);
        }
        let mut last_err = None;
        for id in &ids {
            if let Err(e) = self.event_sender.push(RenderEvent::RetriggerVoice {
                voice_id: *id,
                key,
                velocity,
                restart_envelope,
            }) {
                last_err = Some(e);
            }
            if let Some(info) = self.active_voice_channels.get_mut(id) {
                info.key = key;
            }
        }
        last_err.map_or(Ok(true), Err)
    }

    pub fn all_notes_off(&mut self, channel: Option<u8>) -> Result<(), Error> {
        if let Some(channel) = channel {
            self.channel_mut(channel)?.all_notes_off();
            return self.event_sender.push(RenderEvent::NoteOffChannel { channel });
        }
        for c in &mut self.channels {
            c.all_notes_off();
        }
        self.event_sender.push(RenderEvent::AllNotesOff)
    }

    pub fn all_sound_off(&mut self) -> Result<(), Error> {
        self.event_sender.push(RenderEvent::AllSoundOff)
    }

    pub fn program_change(&mut self, channel: u8, program: u8) -> Result<(), Error> {
        let ch = self.channel_mut(channel)?;
        ch.program = program;
        let (bank, _) = self.preset_selection[channel as usize];
        self.preset_selection[channel as usize] = (bank, program as u32);
        Ok(())
    }

    pub fn program(&self, channel: u8) -> Result<u8, Error> {
        Ok(self.channels[channel as usize].program)
    }

    /// Number of keys currently held on a channel's monophonic note stack
    /// (always 0 on a channel in poly mode, which doesn't track one).
    pub fn held_note_count(&self, channel: u8) -> Result<usize, Error> {
        Ok(self
            .channels
            .get(channel as usize)
            .ok_or_else(|| Error::InvalidArgument(format!("channel {channel} out of range")))?
            .held_note_count())
    }

    /// Apply a MIDI mode message (CC#124-127) establishing a basic-channel
    /// group starting at `channel`. Inserting a new `OmniOffMono` group
    /// narrows any earlier group it overlaps, matching how real MIDI
    /// sequencers re-partition channels at a mode message.
    pub fn set_channel_mode(&mut self, channel: u8, mode: ChannelMode) -> Result<(), Error> {
        let ch = self.channel_mut(channel)?;
        let index = ch.index;
        ch.mode = mode;
        narrow_previous_group(&mut self.channel_mode_groups, index);
        self.channel_mode_groups.retain(|&(c, _)| c != index);
        self.channel_mode_groups.push((index, mode));
        Ok(())
    }

    pub fn set_legato_mode(&mut self, channel: u8, mode: LegatoMode) -> Result<(), Error> {
        self.channel_mut(channel)?.legato_mode = mode;
        Ok(())
    }

    pub fn set_breath_mode(&mut self, channel: u8, mode: BreathMode) -> Result<(), Error> {
        self.channel_mut(channel)?.breath_mode = mode;
        Ok(())
    }

    pub fn set_portamento_mode(&mut self, channel: u8, mode: PortamentoMode) -> Result<(), Error> {
        self.channel_mut(channel)?.portamento_mode = mode;
        Ok(())
    }

    pub fn set_portamento_enabled(&mut self, channel: u8, enabled: bool) -> Result<(), Error> {
        self.channel_mut(channel)?.portamento_enabled = enabled;
        Ok(())
    }

    pub fn set_portamento_time_ms(&mut self, channel: u8, time_ms: u32) -> Result<(), Error> {
        self.channel_mut(channel)?.portamento_time_ms = time_ms;
        Ok(())
    }

    pub fn control_change(&mut self, channel: u8, controller: u8, value: u8) -> Result<(), Error> {
        let bank_select_style = self.config.bank_select_style;
        let ch = self.channel_mut(channel)?;
        let was_sustained = ch.sustain_pedal;
        match controller {
            0 => ch.bank_msb = value,
            32 => ch.bank_lsb = value,
            1 => ch.mod_wheel = value,
            7 => ch.volume = value,
            10 => ch.pan = value,
            11 => ch.expression = value,
            64 => ch.sustain_pedal = value >= 64,
            _ => {}
        }
        if controller == 0 || controller == 32 {
            let bank = ch.bank(bank_select_style);
            let (_, program) = self.preset_selection[channel as usize];
            self.preset_selection[channel as usize] = (bank, program);
        }
        if controller == 1 {
            self.event_sender
                .push(RenderEvent::SetModWheel { channel, value })?;
        }
        if controller == 64 && was_sustained && value < 64 {
            self.release_pedal_held_on_channel(channel)?;
        }
        Ok(())
    }

    pub fn pitch_bend(&mut self, channel: u8, value: i16) -> Result<(), Error> {
        self.channel_mut(channel)?.pitch_bend = value;
        self.event_sender.push(RenderEvent::SetPitchBend { channel, value })
    }

    pub fn channel_pressure(&mut self, channel: u8, value: u8) -> Result<(), Error> {
        self.channel_mut(channel)?.channel_pressure = value;
        self.event_sender
            .push(RenderEvent::SetChannelPressure { channel, value })
    }

    pub fn key_pressure(&mut self, channel: u8, key: u8, value: u8) -> Result<(), Error> {
        self.channel_mut(channel)?;
        self.event_sender
            .push(RenderEvent::SetKeyPressure { channel, key, value })
    }

    /// Hand a sysex message to the synth. Universal/non-realtime sysex
    /// routing (GM reset, master volume, etc.) is a MIDI-transport policy
    /// concern and out of scope for the synthesis core; this always
    /// succeeds with an empty response, matching FluidSynth's behavior for
    /// sysex messages it doesn't specifically recognize.
    pub fn sysex(&mut self, data: &[u8]) -> Result<Vec<u8>, Error> {
        log::debug!("sysex: {} bytes, ignored", data.len());
        Ok(Vec::new())
    }

    /// Mute or unmute a channel. Muted channels still allocate and run
    /// voices (so envelope/pool bookkeeping is unaffected) but those voices
    /// never produce audible output (§4.1).
    pub fn set_channel_mute(&mut self, channel: u8, mute: bool) -> Result<(), Error> {
        self.channel_mut(channel)?.mute = mute;
        Ok(())
    }

    pub fn channel_mute(&self, channel: u8) -> Result<bool, Error> {
        Ok(self
            .channels
            .get(channel as usize)
            .ok_or_else(|| Error::InvalidArgument(format!("channel {channel} out of range")))?
            .mute)
    }

    /// Overall output gain (`synth.gain`), applied after the dry and effect
    /// buses are summed.
    pub fn set_gain(&mut self, gain: f32) -> Result<(), Error> {
        self.event_sender.push(RenderEvent::SetMasterGain(gain))
    }

    pub fn enable_reverb(&mut self, enabled: bool) -> Result<(), Error> {
        self.event_sender.push(RenderEvent::SetReverbEnabled(enabled))
    }

    pub fn enable_chorus(&mut self, enabled: bool) -> Result<(), Error> {
        self.event_sender.push(RenderEvent::SetChorusEnabled(enabled))
    }

    /// The basic-channel groups currently established by MIDI mode messages,
    /// coalesced in declaration order as `(basic_channel, mode)` pairs.
    pub fn basic_channels(&self) -> &[(u8, ChannelMode)] {
        &self.channel_mode_groups
    }

    pub fn set_reverb_params(&mut self, room_size: f32, damping: f32, width: f32, level: f32) -> Result<(), Error> {
        self.event_sender.push(RenderEvent::SetReverbParams {
            room_size,
            damping,
            width,
            level,
        })
    }

    pub fn set_chorus_params(&mut self, speed_hz: f32, depth_ms: f32, level: f32) -> Result<(), Error> {
        self.event_sender.push(RenderEvent::SetChorusParams {
            speed_hz,
            depth_ms,
            level,
        })
    }

    /// Drain finished-voice reports from the render thread and drop their
    /// control-side bookkeeping. Call this once per control-thread tick.
    pub fn reconcile_finished_voices(&mut self) {
        let mut reports = Vec::new();
        self.report_receiver.drain_into(&mut reports);
        for report in reports {
            let RenderReport::VoiceFinished { voice_id } = report;
            self.active_voice_channels.remove(&voice_id);
        }
    }

    /// Render thread entry point: produce `frame_count` frames of planar
    /// float audio. Transparently chunks over the mixer's configured block
    /// size if `frame_count` exceeds it.
    pub fn write_float(&mut self, frame_count: usize, out_l: &mut [f32], out_r: &mut [f32]) {
        let chunk = self.mixer.max_block_size();
        let mut done = 0;
        while done < frame_count {
            let n = (frame_count - done).min(chunk);
            self.mixer
                .process_block(n, &mut out_l[done..done + n], &mut out_r[done..done + n]);
            done += n;
        }
    }

    /// Render, then convert to interleaved dithered 16-bit PCM.
    pub fn write_s16(&mut self, frame_count: usize, out: &mut [i16], dither_index: usize) -> usize {
        let mut l = vec![0.0f32; frame_count];
        let mut r = vec![0.0f32; frame_count];
        self.write_float(frame_count, &mut l, &mut r);
        let mut idx = dither_index;
        for i in 0..frame_count {
            let (lv, next) = convert::to_s16_dithered(l[i], idx);
            out[i * 2] = lv;
            idx = next;
            let (rv, next) = convert::to_s16_dithered(r[i], idx);
            out[i * 2 + 1] = rv;
            idx = next;
        }
        idx
    }

    /// Render, then convert to interleaved 24-bit PCM (packed in the low
    /// 3 bytes of each `i32`, not dithered).
    pub fn write_s24(&mut self, frame_count: usize, out: &mut [i32]) {
        let mut l = vec![0.0f32; frame_count];
        let mut r = vec![0.0f32; frame_count];
        self.write_float(frame_count, &mut l, &mut r);
        for i in 0..frame_count {
            out[i * 2] = convert::to_s24(l[i]);
            out[i * 2 + 1] = convert::to_s24(r[i]);
        }
    }

    /// Render, then convert to interleaved 32-bit PCM (not dithered).
    pub fn write_s32(&mut self, frame_count: usize, out: &mut [i32]) {
        let mut l = vec![0.0f32; frame_count];
        let mut r = vec![0.0f32; frame_count];
        self.write_float(frame_count, &mut l, &mut r);
        for i in 0..frame_count {
            out[i * 2] = convert::to_s32(l[i]);
            out[i * 2 + 1] = convert::to_s32(r[i]);
        }
    }

    pub fn active_voice_count(&self) -> usize {
        self.mixer.active_voice_count()
    }

    pub fn polyphony(&self) -> usize {
        self.mixer.polyphony()
    }
}

impl Default for Synth {
    fn default() -> Self {
        Self::new(Settings::default())
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sf2::sample::SampleLink;
    use crate::sf2::zone::{Instrument, InstrumentZone, Preset, PresetZone};
    use crate::sf2::Sample;
    use std::sync::Arc;

    fn demo_font() -> SoundFont {
        let sample = Arc::new(Sample {
            name: "sine".into(),
            data: (0..4000)
                .map(|i| ((i as f32 * 0.05).sin() * 16000.0) as i16)
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
        let instrument = Instrument {
            name: "inst".into(),
            zones: vec![InstrumentZone {
                key_lo: 0,
                key_hi: 127,
                vel_lo: 0,
                vel_hi: 127,
                sample: Some(0),
                ..Default::default()
            }],
        };
        let preset = Preset {
            name: "preset".into(),
            bank: 0,
            program: 0,
            zones: vec![PresetZone {
                key_lo: 0,
                key_hi: 127,
                vel_lo: 0,
                vel_hi: 127,
                instrument: Some(0),
                ..Default::default()
            }],
        };
        SoundFont {
            name: "demo".into(),
            samples: vec![sample],
            presets: vec![preset],
            instruments: vec![instrument],
        }
    }

    #[test]
    fn note_on_without_soundfont_errors() {
        let mut synth = Synth::default();
        let result = synth.note_on(0, 60, 100);
        assert!(matches!(result, Err(Error::InvalidState(_))));
    }

    #[test]
    fn note_on_then_render_produces_sound() {
        let mut synth = Synth::default();
        synth.load_soundfont(demo_font());
        synth.note_on(0, 60, 100).unwrap();
        let mut l = vec![0.0f32; 256];
        let mut r = vec![0.0f32; 256];
        synth.write_float(256, &mut l, &mut r);
        assert_eq!(synth.active_voice_count(), 1);
        assert!(l.iter().any(|&s| s != 0.0) || r.iter().any(|&s| s != 0.0));
    }

    #[test]
    fn note_off_eventually_finishes_voice() {
        let mut synth = Synth::default();
        synth.load_soundfont(demo_font());
        synth.note_on(0, 60, 100).unwrap();
        synth.note_off(0, 60).unwrap();
        let mut l = vec![0.0f32; 512];
        let mut r = vec![0.0f32; 512];
        for _ in 0..20 {
            synth.write_float(512, &mut l, &mut r);
        }
        synth.reconcile_finished_voices();
        assert_eq!(synth.active_voice_count(), 0);
    }

    #[test]
    fn bank_select_updates_preset_selection() {
        let mut synth = Synth::default();
        synth.control_change(0, 0, 3).unwrap();
        let (bank, _) = synth.preset_selection[0];
        assert_eq!(bank, 3); // default style is Gs: bank = MSB
    }

    #[test]
    fn sustain_pedal_holds_note_past_note_off() {
        let mut synth = Synth::default();
        synth.load_soundfont(demo_font());
        synth.control_change(0, 64, 127).unwrap(); // pedal down
        synth.note_on(0, 60, 100).unwrap();
        synth.note_off(0, 60).unwrap();
        let mut l = vec![0.0f32; 256];
        let mut r = vec![0.0f32; 256];
        synth.write_float(256, &mut l, &mut r);
        synth.reconcile_finished_voices();
        assert_eq!(synth.active_voice_count(), 1);

        synth.control_change(0, 64, 0).unwrap(); // pedal up
        for _ in 0..20 {
            synth.write_float(256, &mut l, &mut r);
        }
        synth.reconcile_finished_voices();
        assert_eq!(synth.active_voice_count(), 0);
    }

    #[test]
    fn retriggering_same_note_releases_pedal_held_voice() {
        let mut synth = Synth::default();
        synth.load_soundfont(demo_font());
        synth.control_change(0, 64, 127).unwrap();
        synth.note_on(0, 60, 100).unwrap();
        synth.note_off(0, 60).unwrap();
        let mut l = vec![0.0f32; 256];
        let mut r = vec![0.0f32; 256];
        synth.write_float(256, &mut l, &mut r);
        synth.reconcile_finished_voices();
        assert_eq!(synth.active_voice_count(), 1);

        // re-striking the same key forces the pedal-held voice to stop even
        // though the pedal is still down.
        synth.note_on(0, 60, 100).unwrap();
        for _ in 0..20 {
            synth.write_float(256, &mut l, &mut r);
        }
        synth.reconcile_finished_voices();
        assert_eq!(synth.active_voice_count(), 1);
    }

    #[test]
    fn muted_channel_produces_silence() {
        let mut synth = Synth::default();
        synth.load_soundfont(demo_font());
        synth.set_channel_mute(0, true).unwrap();
        synth.note_on(0, 60, 100).unwrap();
        let mut l = vec![0.0f32; 256];
        let mut r = vec![0.0f32; 256];
        synth.write_float(256, &mut l, &mut r);
        assert_eq!(synth.active_voice_count(), 1);
        assert!(l.iter().all(|&s| s == 0.0) && r.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn unmuted_channel_is_unaffected() {
        let mut synth = Synth::default();
        synth.load_soundfont(demo_font());
        assert!(!synth.channel_mute(0).unwrap());
        synth.set_channel_mute(0, true).unwrap();
        assert!(synth.channel_mute(0).unwrap());
    }

    #[test]
    fn legato_single_trigger_reuses_voice_instead_of_starting_a_new_one() {
        let mut synth = Synth::default();
        synth.load_soundfont(demo_font());
        synth.set_channel_mode(0, ChannelMode::OmniOffMono { mono_count: 1 }).unwrap();
        synth.set_legato_mode(0, LegatoMode::SingleTrigger0).unwrap();
        synth.note_on(0, 60, 100).unwrap();
        assert_eq!(synth.active_voice_count(), 0); // not rendered yet
        let mut l = vec![0.0f32; 64];
        let mut r = vec![0.0f32; 64];
        synth.write_float(64, &mut l, &mut r);
        assert_eq!(synth.active_voice_count(), 1);

        // legato note-on to 64 must reuse the existing voice, not add one.
        synth.note_on(0, 64, 100).unwrap();
        synth.write_float(64, &mut l, &mut r);
        assert_eq!(synth.active_voice_count(), 1);
    }

    #[test]
    fn mono_note_off_falls_back_without_dropping_voice_count() {
        let mut synth = Synth::default();
        synth.load_soundfont(demo_font());
        synth.set_channel_mode(0, ChannelMode::OmniOffMono { mono_count: 1 }).unwrap();
        synth.set_legato_mode(0, LegatoMode::SingleTrigger0).unwrap();
        synth.note_on(0, 60, 100).unwrap();
        synth.note_on(0, 64, 110).unwrap();
        let mut l = vec![0.0f32; 64];
        let mut r = vec![0.0f32; 64];
        synth.write_float(64, &mut l, &mut r);
        assert_eq!(synth.active_voice_count(), 1);

        // releasing the topmost note (64) should fall back to 60, reusing
        // the still-sounding voice rather than releasing then restarting.
        synth.note_off(0, 64).unwrap();
        synth.write_float(64, &mut l, &mut r);
        assert_eq!(synth.active_voice_count(), 1);
    }

    #[test]
    fn multiple_soundfonts_stack_with_most_recent_shadowing() {
        let mut synth = Synth::default();
        let sfid1 = synth.sfload(demo_font());
        assert_eq!(synth.sfcount(), 1);
        let sfid2 = synth.sfload(demo_font());
        assert_eq!(synth.sfcount(), 2);

        synth.sfunload(sfid1).unwrap();
        assert_eq!(synth.sfcount(), 1);
        assert!(matches!(synth.sfunload(sfid1), Err(Error::NotFound(_))));
        synth.sfunload(sfid2).unwrap();
        assert_eq!(synth.sfcount(), 0);
    }

    #[test]
    fn gain_and_effect_toggles_reach_the_render_thread() {
        let mut synth = Synth::default();
        synth.load_soundfont(demo_font());
        synth.set_gain(0.0).unwrap();
        synth.enable_reverb(false).unwrap();
        synth.enable_chorus(false).unwrap();
        synth.note_on(0, 60, 100).unwrap();
        let mut l = vec![0.0f32; 256];
        let mut r = vec![0.0f32; 256];
        synth.write_float(256, &mut l, &mut r);
        assert!(l.iter().all(|&s| s == 0.0) && r.iter().all(|&s| s == 0.0));
    }
}
