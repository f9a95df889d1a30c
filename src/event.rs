//! Lock-free cross-thread event handoff between the control thread (MIDI
//! in, parameter changes) and the render thread (the mixer's `process`
//! call). Two bounded SPSC rings: one control -> render, one render ->
//! control for finished-voice reports.

use std::sync::Arc;

use crossbeam_queue::ArrayQueue;

use crate::error::Error;
use crate::sf2::GeneratorSet;

// -------------------------------------------------------------------------------------------------

/// A compiled set of voice parameters, as produced by the control-thread
/// parameter compiler and consumed by the render thread to start a voice.
/// Carries everything the render path needs without touching the
/// `SoundFont`/zone hierarchy, which never crosses the ring.
#[derive(Debug, Clone)]
pub struct VoiceStartParams {
    pub voice_id: u64,
    pub channel: u8,
    pub key: u8,
    pub velocity: u8,
    pub sample: Arc<crate::sf2::Sample>,
    pub generators: GeneratorSet,
    /// Set when the channel is muted at note-on time: the voice is still
    /// allocated and tracked (so note-off bookkeeping is unaffected) but
    /// never produces audible output.
    pub muted: bool,
}

/// A control -> render event. All fields are plain data: no allocation
/// happens constructing or draining these on the render thread.
#[derive(Debug, Clone)]
pub enum RenderEvent {
    StartVoice(Box<VoiceStartParams>),
    StopVoice { voice_id: u64 },
    /// Force a voice into its short, click-free release regardless of its
    /// own envelope release time (used for fast-release legato retriggers
    /// and exclusive-class stealing, as opposed to the normal [`Self::StopVoice`]
    /// release which runs the voice's own release stage).
    KillVoiceFast { voice_id: u64 },
    /// A legato transition that reuses an already-sounding voice instead of
    /// starting a new one: update its key/velocity and, if `restart_envelope`
    /// is set, retrigger the volume/modulation envelopes from attack (the
    /// oscillator phase and filter state are left untouched either way).
    RetriggerVoice {
        voice_id: u64,
        key: u8,
        velocity: u8,
        restart_envelope: bool,
    },
    /// Release every voice on one channel (as opposed to [`Self::AllNotesOff`],
    /// which releases every channel).
    NoteOffChannel { channel: u8 },
    SetPitchBend { channel: u8, value: i16 },
    SetModWheel { channel: u8, value: u8 },
    SetChannelPressure { channel: u8, value: u8 },
    SetKeyPressure { channel: u8, key: u8, value: u8 },
    SetReverbParams { room_size: f32, damping: f32, width: f32, level: f32 },
    SetChorusParams { speed_hz: f32, depth_ms: f32, level: f32 },
    SetReverbEnabled(bool),
    SetChorusEnabled(bool),
    SetMasterGain(f32),
    AllNotesOff,
    AllSoundOff,
}

/// A render -> control report. Used so the control thread's voice pool
/// bookkeeping stays in sync with what the render thread actually finished.
#[derive(Debug, Clone, Copy)]
pub enum RenderReport {
    VoiceFinished { voice_id: u64 },
}

// -------------------------------------------------------------------------------------------------

/// The bounded queue pair shared between control and render threads.
/// Capacity is fixed at construction: the render thread must never block,
/// so a full ring drops the event and reports [`Error::RingOverflow`] to
/// the caller instead of growing.
pub struct EventRing {
    to_render: Arc<ArrayQueue<RenderEvent>>,
    to_control: Arc<ArrayQueue<RenderReport>>,
}

impl EventRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            to_render: Arc::new(ArrayQueue::new(capacity)),
            to_control: Arc::new(ArrayQueue::new(capacity)),
        }
    }

    pub fn sender(&self) -> EventSender {
        EventSender {
            queue: Arc::clone(&self.to_render),
        }
    }

    pub fn receiver(&self) -> EventReceiver {
        EventReceiver {
            queue: Arc::clone(&self.to_render),
        }
    }

    pub fn report_sender(&self) -> ReportSender {
        ReportSender {
            queue: Arc::clone(&self.to_control),
        }
    }

    pub fn report_receiver(&self) -> ReportReceiver {
        ReportReceiver {
            queue: Arc::clone(&self.to_control),
        }
    }
}

/// Control-thread handle: post events for the render thread to pick up.
#[derive(Clone)]
pub struct EventSender {
    queue: Arc<ArrayQueue<RenderEvent>>,
}

impl EventSender {
    /// Push an event. Returns [`Error::RingOverflow`] if the render thread
    /// hasn't drained fast enough and the ring is full; the caller decides
    /// whether to retry, drop, or surface this to its own caller.
    pub fn push(&self, event: RenderEvent) -> Result<(), Error> {
        self.queue.push(event).map_err(|_| {
            log::warn!("event ring overflow, dropping event");
            Error::RingOverflow
        })
    }
}

/// Render-thread handle: drain pending events at the top of each block.
pub struct EventReceiver {
    queue: Arc<ArrayQueue<RenderEvent>>,
}

impl EventReceiver {
    /// Pop and return every event currently queued, in FIFO order. Never
    /// allocates: the caller supplies the sink.
    pub fn drain_into(&self, sink: &mut Vec<RenderEvent>) {
        while let Some(event) = self.queue.pop() {
            sink.push(event);
        }
    }
}

/// Render-thread handle: report a voice finishing back to the control
/// thread's pool bookkeeping.
#[derive(Clone)]
pub struct ReportSender {
    queue: Arc<ArrayQueue<RenderReport>>,
}

impl ReportSender {
    pub fn push(&self, report: RenderReport) {
        if self.queue.push(report).is_err() {
            log::warn!("report ring overflow, dropping voice-finished report");
        }
    }
}

/// Control-thread handle: drain finished-voice reports.
pub struct ReportReceiver {
    queue: Arc<ArrayQueue<RenderReport>>,
}

impl ReportReceiver {
    pub fn drain_into(&self, sink: &mut Vec<RenderReport>) {
        while let Some(report) = self.queue.pop() {
            sink.push(report);
        }
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_are_delivered_in_order() {
        let ring = EventRing::new(8);
        let sender = ring.sender();
        let receiver = ring.receiver();
        sender.push(RenderEvent::AllNotesOff).unwrap();
        sender.push(RenderEvent::AllSoundOff).unwrap();
        let mut drained = Vec::new();
        receiver.drain_into(&mut drained);
        assert_eq!(drained.len(), 2);
        assert!(matches!(drained[0], RenderEvent::AllNotesOff));
        assert!(matches!(drained[1], RenderEvent::AllSoundOff));
    }

    #[test]
    fn full_ring_reports_overflow() {
        let ring = EventRing::new(1);
        let sender = ring.sender();
        sender.push(RenderEvent::AllNotesOff).unwrap();
        let err = sender.push(RenderEvent::AllSoundOff);
        assert!(matches!(err, Err(Error::RingOverflow)));
    }

    #[test]
    fn reports_round_trip() {
        let ring = EventRing::new(4);
        let report_sender = ring.report_sender();
        let report_receiver = ring.report_receiver();
        report_sender.push(RenderReport::VoiceFinished { voice_id: 7 });
        let mut drained = Vec::new();
        report_receiver.drain_into(&mut drained);
        assert_eq!(drained.len(), 1);
        assert!(matches!(
            drained[0],
            RenderReport::VoiceFinished { voice_id: 7 }
        ));
    }
}
