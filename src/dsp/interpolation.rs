//! Sample playback interpolators. SoundFont2 voices read from a fixed PCM
//! buffer at a fractional, pitch-driven rate; these implement the four
//! interpolation qualities a voice can be configured with.

use strum::{Display, EnumString};

// -------------------------------------------------------------------------------------------------

/// Interpolation quality, selectable per voice (and set as a synth-wide
/// default in the settings registry).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Display, EnumString)]
pub enum InterpolationMethod {
    None,
    #[default]
    Linear,
    #[strum(serialize = "cubic-4pt")]
    Cubic4Point,
    #[strum(serialize = "sinc-7pt")]
    Sinc7Point,
}

const SINC_TAPS: usize = 7;
/// Number of fractional-phase positions the sinc table is precomputed at.
const SINC_PHASES: usize = 256;

/// Precomputed windowed-sinc interpolation table, 7 taps x 256 fractional
/// phases, built once and shared by every voice.
pub struct SincTable {
    taps: Vec<[f32; SINC_TAPS]>,
}

impl SincTable {
    pub fn new() -> Self {
        let mut taps = Vec::with_capacity(SINC_PHASES);
        for phase_index in 0..SINC_PHASES {
            let frac = phase_index as f64 / SINC_PHASES as f64;
            let mut row = [0.0f32; SINC_TAPS];
            for (i, slot) in row.iter_mut().enumerate() {
                // s = i - 7/2 + phase/FLUID_INTERP_MAX, tap i covering sample
                // offset (i - 3) relative to the integer read position.
                let s = i as f64 - 3.5 + frac;
                let sinc = if s.abs() < 1e-9 {
                    1.0
                } else {
                    (std::f64::consts::PI * s).sin() / (std::f64::consts::PI * s)
                };
                let window = (1.0 + (2.0 * std::f64::consts::PI * s / SINC_TAPS as f64).cos()) / 2.0;
                *slot = (sinc * window) as f32;
            }
            taps.push(row);
        }
        Self { taps }
    }

    fn row(&self, frac: f32) -> &[f32; SINC_TAPS] {
        let idx = ((frac * SINC_PHASES as f32) as usize).min(SINC_PHASES - 1);
        &self.taps[idx]
    }
}

impl Default for SincTable {
    fn default() -> Self {
        Self::new()
    }
}

// -------------------------------------------------------------------------------------------------

/// Fetch `data[index]` as f32, or 0.0 past either end (samples are padded
/// conceptually with silence so interpolation never panics near loop/sample
/// boundaries).
#[inline]
fn sample_at(data: &[i16], index: i64) -> f32 {
    if index < 0 || index as usize >= data.len() {
        0.0
    } else {
        data[index as usize] as f32
    }
}

/// Interpolate one output sample from `data` at fractional position
/// `integer_pos + frac` (`frac` in `[0, 1)`).
pub fn interpolate(
    method: InterpolationMethod,
    data: &[i16],
    integer_pos: i64,
    frac: f32,
    sinc_table: &SincTable,
) -> f32 {
    match method {
        InterpolationMethod::None => sample_at(data, integer_pos),
        InterpolationMethod::Linear => {
            let a = sample_at(data, integer_pos);
            let b = sample_at(data, integer_pos + 1);
            a + (b - a) * frac
        }
        InterpolationMethod::Cubic4Point => {
            let y0 = sample_at(data, integer_pos - 1);
            let y1 = sample_at(data, integer_pos);
            let y2 = sample_at(data, integer_pos + 1);
            let y3 = sample_at(data, integer_pos + 2);
            cubic_hermite(y0, y1, y2, y3, frac)
        }
        InterpolationMethod::Sinc7Point => {
            let row = sinc_table.row(frac);
            let mut acc = 0.0f32;
            for (i, coeff) in row.iter().enumerate() {
                acc += coeff * sample_at(data, integer_pos + i as i64 - 3);
            }
            acc
        }
    }
}

/// Catmull-Rom / 4-point cubic Hermite interpolation, as used by
/// FluidSynth's default quality setting (the scaled Breeuwsma form behind
/// its `INTERP_COEFF_0..3` tables).
#[inline]
fn cubic_hermite(y0: f32, y1: f32, y2: f32, y3: f32, t: f32) -> f32 {
    let a0 = -0.5 * y0 + 1.5 * y1 - 1.5 * y2 + 0.5 * y3;
    let a1 = y0 - 2.5 * y1 + 2.0 * y2 - 0.5 * y3;
    let a2 = -0.5 * y0 + 0.5 * y2;
    let a3 = y1;
    ((a0 * t + a1) * t + a2) * t + a3
}

/// Latency, in samples, an interpolator needs looking backward/forward of
/// the read position (used to decide how many guard samples a voice must
/// keep available before running out of data).
pub fn lookahead(method: InterpolationMethod) -> (u32, u32) {
    match method {
        InterpolationMethod::None => (0, 0),
        InterpolationMethod::Linear => (0, 1),
        InterpolationMethod::Cubic4Point => (1, 2),
        InterpolationMethod::Sinc7Point => (3, 3),
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_interpolates_midpoint() {
        let data = [0i16, 100];
        let v = interpolate(
            InterpolationMethod::Linear,
            &data,
            0,
            0.5,
            &SincTable::default(),
        );
        assert!((v - 50.0).abs() < 1e-6);
    }

    #[test]
    fn none_passes_through_exact_sample() {
        let data = [10i16, 20, 30];
        let v = interpolate(
            InterpolationMethod::None,
            &data,
            1,
            0.9,
            &SincTable::default(),
        );
        assert_eq!(v, 20.0);
    }

    #[test]
    fn cubic_reproduces_constant_signal() {
        let data = [50i16; 8];
        let v = interpolate(
            InterpolationMethod::Cubic4Point,
            &data,
            3,
            0.37,
            &SincTable::default(),
        );
        assert!((v - 50.0).abs() < 1e-3);
    }

    #[test]
    fn cubic_matches_catmull_rom_reference_value() {
        let data = [0i16, 0, 1, 0];
        let v = interpolate(
            InterpolationMethod::Cubic4Point,
            &data,
            1,
            0.5,
            &SincTable::default(),
        );
        assert!((v - 0.5625).abs() < 1e-4);
    }

    #[test]
    fn sinc_reproduces_constant_signal() {
        let table = SincTable::new();
        let data = [42i16; 16];
        let v = interpolate(InterpolationMethod::Sinc7Point, &data, 8, 0.25, &table);
        assert!((v - 42.0).abs() < 0.5);
    }

    #[test]
    fn out_of_range_reads_are_silent() {
        let data = [1i16, 2, 3];
        assert_eq!(sample_at(&data, -1), 0.0);
        assert_eq!(sample_at(&data, 3), 0.0);
    }
}
