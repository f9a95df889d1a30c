//! Schroeder/Freeverb-style reverb feeding the mixer's reverb bus: 8 parallel
//! comb filters per channel followed by 4 series allpass filters, with
//! roomsize/damping/width/level controls.

// -------------------------------------------------------------------------------------------------

const COMB_TUNING_L: [usize; 8] = [1116, 1188, 1277, 1356, 1422, 1491, 1557, 1617];
const ALLPASS_TUNING_L: [usize; 4] = [556, 441, 341, 225];
/// Right channel taps are offset from the left so the stereo field decorrelates.
const STEREO_SPREAD: usize = 23;

const FIXED_GAIN: f32 = 0.015;
const SCALE_ROOM: f32 = 0.28;
const OFFSET_ROOM: f32 = 0.7;
const SCALE_DAMP: f32 = 0.4;
const ALLPASS_FEEDBACK: f32 = 0.5;

pub const ROOM_SIZE_RANGE: (f32, f32) = (0.0, 1.0);
pub const DAMPING_RANGE: (f32, f32) = (0.0, 1.0);
pub const WIDTH_RANGE: (f32, f32) = (0.0, 1.0);
pub const LEVEL_RANGE: (f32, f32) = (0.0, 1.0);

// -------------------------------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct Comb {
    buffer: Vec<f32>,
    pos: usize,
    filter_store: f32,
    feedback: f32,
    damping: f32,
}

impl Comb {
    fn new(size: usize) -> Self {
        Self {
            buffer: vec![0.0; size],
            pos: 0,
            filter_store: 0.0,
            feedback: 0.5,
            damping: 0.5,
        }
    }

    #[inline]
    fn process(&mut self, input: f32) -> f32 {
        let output = self.buffer[self.pos];
        self.filter_store = output * (1.0 - self.damping) + self.filter_store * self.damping;
        self.buffer[self.pos] = input + self.filter_store * self.feedback;
        self.pos += 1;
        if self.pos >= self.buffer.len() {
            self.pos = 0;
        }
        output
    }
}

#[derive(Debug, Clone)]
struct Allpass {
    buffer: Vec<f32>,
    pos: usize,
    feedback: f32,
}

impl Allpass {
    fn new(size: usize) -> Self {
        Self {
            buffer: vec![0.0; size],
            pos: 0,
            feedback: ALLPASS_FEEDBACK,
        }
    }

    #[inline]
    fn process(&mut self, input: f32) -> f32 {
        let buffered = self.buffer[self.pos];
        let output = -input + buffered;
        self.buffer[self.pos] = input + buffered * self.feedback;
        self.pos += 1;
        if self.pos >= self.buffer.len() {
            self.pos = 0;
        }
        output
    }
}

// -------------------------------------------------------------------------------------------------

/// One channel's bank of 8 combs in parallel followed by 4 series allpasses.
#[derive(Debug, Clone)]
struct Channel {
    combs: [Comb; 8],
    allpasses: [Allpass; 4],
}

impl Channel {
    fn new(tap_offset: usize, sample_rate: u32) -> Self {
        let scale = sample_rate as f32 / 44100.0;
        let combs = COMB_TUNING_L.map(|t| Comb::new((((t + tap_offset) as f32) * scale) as usize));
        let allpasses =
            ALLPASS_TUNING_L.map(|t| Allpass::new((((t + tap_offset) as f32) * scale) as usize));
        Self { combs, allpasses }
    }

    fn process(&mut self, input: f32) -> f32 {
        let mut out = 0.0;
        for comb in &mut self.combs {
            out += comb.process(input);
        }
        for allpass in &mut self.allpasses {
            out = allpass.process(out);
        }
        out
    }

    fn set_room_and_damp(&mut self, feedback: f32, damping: f32) {
        for comb in &mut self.combs {
            comb.feedback = feedback;
            comb.damping = damping;
        }
    }
}

// -------------------------------------------------------------------------------------------------

/// A stereo Freeverb-style reverb.
pub struct Reverb {
    left: Channel,
    right: Channel,
    room_size: f32,
    damping: f32,
    width: f32,
    level: f32,
}

impl Reverb {
    pub fn new(sample_rate: u32) -> Self {
        let mut reverb = Self {
            left: Channel::new(0, sample_rate),
            right: Channel::new(STEREO_SPREAD, sample_rate),
            room_size: 0.5,
            damping: 0.5,
            width: 1.0,
            level: 1.0,
        };
        reverb.apply_room_and_damp();
        reverb
    }

    fn apply_room_and_damp(&mut self) {
        let feedback = self.room_size * SCALE_ROOM + OFFSET_ROOM;
        let damping = self.damping * SCALE_DAMP;
        self.left.set_room_and_damp(feedback, damping);
        self.right.set_room_and_damp(feedback, damping);
    }

    pub fn set_room_size(&mut self, room_size: f32) {
        self.room_size = room_size.clamp(ROOM_SIZE_RANGE.0, ROOM_SIZE_RANGE.1);
        self.apply_room_and_damp();
    }

    pub fn set_damping(&mut self, damping: f32) {
        self.damping = damping.clamp(DAMPING_RANGE.0, DAMPING_RANGE.1);
        self.apply_room_and_damp();
    }

    pub fn set_width(&mut self, width: f32) {
        self.width = width.clamp(WIDTH_RANGE.0, WIDTH_RANGE.1);
    }

    pub fn set_level(&mut self, level: f32) {
        self.level = level.clamp(LEVEL_RANGE.0, LEVEL_RANGE.1);
    }

    /// Process a mono input block, accumulating stereo output into
    /// `output` (interleaved L/R pairs, added to whatever is already
    /// there).
    pub fn process(&mut self, input: &[f32], output: &mut [(f32, f32)]) {
        debug_assert_eq!(input.len(), output.len());
        let wet1 = self.level * (self.width / 2.0 + 0.5);
        let wet2 = self.level * ((1.0 - self.width) / 2.0);
        for (i, &sample) in input.iter().enumerate() {
            let mono_in = sample * FIXED_GAIN;
            let out_l = self.left.process(mono_in);
            let out_r = self.right.process(mono_in);
            output[i].0 += out_l * wet1 + out_r * wet2;
            output[i].1 += out_r * wet1 + out_l * wet2;
        }
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silence_in_is_silence_out() {
        let mut reverb = Reverb::new(44100);
        let input = vec![0.0f32; 2000];
        let mut output = vec![(0.0, 0.0); 2000];
        reverb.process(&input, &mut output);
        for (l, r) in output {
            assert_eq!(l, 0.0);
            assert_eq!(r, 0.0);
        }
    }

    #[test]
    fn impulse_produces_decaying_tail() {
        let mut reverb = Reverb::new(44100);
        reverb.set_room_size(0.8);
        let mut input = vec![0.0f32; 8000];
        input[0] = 1.0;
        let mut output = vec![(0.0, 0.0); 8000];
        reverb.process(&input, &mut output);
        let has_tail = output[4000..].iter().any(|(l, r)| *l != 0.0 || *r != 0.0);
        assert!(has_tail);
    }

    #[test]
    fn parameters_clamp_to_unit_range() {
        let mut reverb = Reverb::new(44100);
        reverb.set_room_size(5.0);
        assert_eq!(reverb.room_size, 1.0);
        reverb.set_damping(-1.0);
        assert_eq!(reverb.damping, 0.0);
    }
}
