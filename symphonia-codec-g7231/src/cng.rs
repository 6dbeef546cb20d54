// Symphonia
// Copyright (c) 2019-2022 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `cng` module synthesizes comfort noise from SID parameters: a pseudo-random excitation
//! of pitch-predicted noise plus fixed pulses whose amplitude is solved so each subframe pair
//! meets the target gain, and the estimation of that gain when a talkspurt ends without a SID
//! frame.

use crate::common::*;
use crate::decoder::State;
use crate::dsp::{clip_int16, clip_int32, ilog2, square_root};
use crate::excitation::gen_acb_excitation;
use crate::tables::{CNG_ADAPTIVE_CB_LAG, CNG_BSEG, CNG_FILT};

/// Pulses injected per subframe pair.
const PAIR_PULSES: usize = 11;

/// Multiplicative congruential noise generator; returns a value in `[0, base)`.
pub fn cng_rand(state: &mut i32, base: i32) -> i32 {
    *state = (*state * 521 + 259) & 0xffff;
    ((*state & 0x7fff) * base) >> 15
}

/// Maps a 6-bit SID gain index onto its target gain magnitude. The three segments double the
/// quantizer step at each boundary.
pub fn dequant_sid_gain(index: i32) -> i32 {
    if index < 0x10 {
        index << 6
    }
    else if index < 0x20 {
        (index - 8) << 7
    }
    else {
        (index - 20) << 8
    }
}

/// Estimates the 6-bit SID gain index of the last active frame from its excitation energy and
/// normalization scale, by a segmented bit-wise search over the gain map. Used when comfort
/// noise starts without a received SID frame.
pub fn estimate_sid_gain(exc_eng: i32, scale: i32) -> i32 {
    let shift = 16 - 2 * scale;
    let t = if shift > 0 { clip_int32((exc_eng as i64) << shift) } else { exc_eng >> -shift };
    let x = ((t as i64 * CNG_FILT[0] as i64) >> 20) as i32;

    if x >= CNG_BSEG[2] {
        return 0x3f;
    }

    let (seg, seg2, start, iters) = if x >= CNG_BSEG[1] {
        (3, 3, 16, 4)
    }
    else if x >= CNG_BSEG[0] {
        (1, 2, 8, 3)
    }
    else {
        (0, 1, 8, 3)
    };

    // Twice the squared candidate edge, the metric the segment bounds are expressed in.
    let metric = |val: i32| {
        let t = (seg * 32 + (val << seg2)) as i64;
        2 * t * t
    };

    let mut val = start;
    let mut add = start >> 1;
    for _ in 0..iters {
        if x as i64 >= metric(val) {
            val += add;
        }
        else {
            val -= add;
        }
        add >>= 1;
    }

    // Settle on the closer of the neighbouring quantizer cells.
    let err = (metric(val) - x as i64).abs();
    if val < 31 && (metric(val + 1) - x as i64).abs() < err {
        val += 1;
    }
    else if val > 0 && (metric(val - 1) - x as i64).abs() < err {
        val -= 1;
    }

    (((seg2 - 1) << 4) + val).clamp(0, 0x3f)
}

/// Synthesizes one frame of comfort-noise excitation into the frame part of the excitation
/// arena, whose head must already hold the 146-sample history.
pub fn generate_noise(p: &mut State) {
    p.pitch_lag[0] = cng_rand(&mut p.cng_random_seed, 21) + 123;
    p.pitch_lag[1] = cng_rand(&mut p.cng_random_seed, 19) + 123;

    for (i, sub) in p.subframe.iter_mut().enumerate() {
        sub.ad_cb_gain = cng_rand(&mut p.cng_random_seed, 50) + 1;
        sub.ad_cb_lag = CNG_ADAPTIVE_CB_LAG[i];
    }

    let mut off = [0i32; SUBFRAMES];
    let mut signs = [0i32; SUBFRAMES / 2 * PAIR_PULSES];
    let mut pos = [0usize; SUBFRAMES / 2 * PAIR_PULSES];

    for i in 0..SUBFRAMES / 2 {
        // One 13-bit draw covers both grid offsets and the eleven pulse signs of the pair.
        let mut t = cng_rand(&mut p.cng_random_seed, 1 << 13);
        off[i * 2] = t & 1;
        off[i * 2 + 1] = ((t >> 1) & 1) + SUBFRAME_LEN as i32;
        t >>= 2;

        for j in 0..PAIR_PULSES {
            signs[i * PAIR_PULSES + j] = ((t & 1) * 2 - 1) << 14;
            t >>= 1;
        }

        // Draw eleven distinct grid slots for the pair from a shrinking pool, alternating
        // between the even and odd subframe.
        let mut pool: [usize; SUBFRAME_LEN / GRID_SIZE] = core::array::from_fn(|n| n);
        let mut len = pool.len();

        for j in 0..PAIR_PULSES {
            let k = cng_rand(&mut p.cng_random_seed, len as i32) as usize;
            pos[i * PAIR_PULSES + j] = GRID_SIZE * pool[k] + off[i * 2 + (j & 1)] as usize;
            len -= 1;
            pool[k] = pool[len];
        }
    }

    for pair in 0..SUBFRAMES / 2 {
        let base = PITCH_MAX as usize + pair * 2 * SUBFRAME_LEN;

        // Pitch-predicted noise, one subframe at a time so the second half of the pair sees
        // the first half as history.
        for half in 0..2 {
            let start = base + half * SUBFRAME_LEN;
            let (hist, frame) = p.excitation.split_at_mut(start);
            gen_acb_excitation(
                &mut frame[..SUBFRAME_LEN],
                &hist[start - PITCH_MAX as usize..],
                p.pitch_lag[pair],
                &p.subframe[pair * 2 + half],
                p.cur_rate,
            );
        }

        let vector = &p.excitation[base..base + 2 * SUBFRAME_LEN];

        // Block scale that keeps the energy accumulation within 32 bits.
        let mut peak = 0;
        for &v in vector {
            peak |= (v as i32).abs();
        }
        let peak = peak.min(0x7fff);
        let shift = if peak == 0 { 0 } else { (ilog2(peak as u32) - 10).max(-2) };

        let mut tmp = [0i32; 2 * SUBFRAME_LEN];
        let mut energy = 0i64;
        for (d, &v) in tmp.iter_mut().zip(vector) {
            let s = if shift >= 0 { (v as i32) >> shift } else { (v as i32) << -shift };
            *d = s;
            energy += s as i64 * s as i64;
        }

        // Mean correlation between the noise and the pulse pattern; 2979/2^15 approximates
        // the division by eleven.
        let mut corr = 0i64;
        for j in 0..PAIR_PULSES {
            let k = pair * PAIR_PULSES + j;
            corr += (tmp[pos[k]] * (signs[k] >> 14)) as i64;
        }
        let b0 = ((corr * 2 * 2979 + (1 << 14)) >> 15) as i32;

        // Energy excess over the comfort-noise target, rescaled to the block domain.
        let mut target = p.cur_gain * ((p.cur_gain * SUBFRAME_LEN as i32) >> 5);
        let rescale = 2 * shift + 3;
        target = if rescale >= 0 {
            target >> rescale
        }
        else {
            clip_int32((target as i64) << -rescale)
        };
        let c = ((clip_int32(energy << 1) as i64 - target as i64) * 2979 >> 15) as i32;

        // Solve x^2 + 2*b0*x + c = 0 for the pulse amplitude, keeping the smaller root.
        let delta = 2 * b0 as i64 * b0 as i64 - c as i64;
        let x = if delta <= 0 {
            -b0
        }
        else {
            let d = square_root(clip_int32(delta));
            let root_a = d - b0;
            let root_b = -(d + b0);
            if root_b.abs() < root_a.abs() {
                root_b
            }
            else {
                root_a
            }
        };
        let x = x.clamp(-10000, 10000);

        for j in 0..PAIR_PULSES {
            let k = pair * PAIR_PULSES + j;
            let amp = (x * signs[k]) >> 15;
            let amp = if shift >= 0 { amp << shift } else { amp >> -shift };

            let idx = base + pos[k];
            p.excitation[idx] = clip_int16(p.excitation[idx] as i32 + amp);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rand_sequence_is_deterministic_and_bounded() {
        let mut a = 12345;
        let mut b = 12345;
        for base in [1, 2, 21, 50, 1 << 13] {
            let x = cng_rand(&mut a, base);
            assert_eq!(x, cng_rand(&mut b, base));
            assert!(x >= 0 && x < base);
        }
        assert_eq!(a, b);
    }

    #[test]
    fn sid_gain_map_is_monotone() {
        for i in 1..64 {
            assert!(dequant_sid_gain(i) > dequant_sid_gain(i - 1), "step down at {}", i);
        }
        assert_eq!(dequant_sid_gain(0), 0);
        assert_eq!(dequant_sid_gain(63), 43 << 8);
    }

    #[test]
    fn estimated_gain_index_tracks_the_gain_map() {
        // Estimating the energy of a signal whose gain sits exactly on the map must come back
        // close to the index it was derived from.
        for index in [2, 9, 17, 25, 40, 55] {
            let gain = dequant_sid_gain(index);

            // Reconstruct the rounded excitation energy of a 120-sample window whose
            // per-sample energy is the comfort-noise target gain^2 / 32.
            let energy = ((gain as i64 * gain as i64 * 15) >> 17) as i32;
            let est = estimate_sid_gain(energy, 0);

            assert!((est - index).abs() <= 1, "index {} estimated as {}", index, est);
        }
        assert_eq!(estimate_sid_gain(i32::MAX, 0), 0x3f);
        assert_eq!(estimate_sid_gain(0, 0), 0);
    }
}
