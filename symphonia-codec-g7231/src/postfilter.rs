// Symphonia
// Copyright (c) 2019-2022 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `postfilter` module implements the two speech enhancement stages: the pitch post-filter
//! that reinforces the harmonic structure of the excitation, and the formant post-filter with
//! tilt compensation and adaptive gain control that sharpens the spectral envelope of the
//! synthesized speech.

use crate::common::*;
use crate::decoder::State;
use crate::dsp::{
    autocorr_max, clip_int16, clip_int32, dot_product, normalize_bits, sat_dadd32, scale_vector,
    square_root,
};
use crate::tables::{POSTFILTER_TBL, PPF_GAIN_WEIGHT};

/// One subframe's pitch post-filter decision.
#[derive(Copy, Clone, Default)]
pub struct PpfParam {
    /// Signed tap displacement; positive looks forward, negative backward, zero passes through.
    pub index: i32,
    /// Tap weight, Q15.
    pub opt_gain: i32,
    /// Output scaling, Q15.
    pub sc_gain: i32,
}

/// Derives the optimal and scaling gains for the chosen lag. The scaling gain restores the
/// subframe energy after the tap is added.
fn comp_ppf_gains(ppf: &mut PpfParam, lag: i32, rate: Rate, tgt_eng: i32, ccr: i32, res_eng: i32) {
    ppf.index = lag;

    let weight = PPF_GAIN_WEIGHT[rate as usize] as i32;

    if 2 * ccr as i64 * ccr as i64 > tgt_eng as i64 * res_eng as i64 {
        ppf.opt_gain = if ccr >= res_eng {
            weight
        }
        else {
            (((ccr << 15) / res_eng) * weight) >> 15
        };

        // Residual energy with the tap applied: tgt + 2 * ccr * g + res * g^2, Q15 weights.
        let g = ppf.opt_gain as i64;
        let pf_res = clip_int32(
            (((tgt_eng as i64) << 15)
                + 2 * ccr as i64 * g
                + ((g * g >> 15) * res_eng as i64)
                + (1 << 14))
                >> 15,
        );

        ppf.sc_gain = if pf_res <= 0 || tgt_eng >= pf_res {
            0x7fff
        }
        else {
            square_root(clip_int32((((tgt_eng as i64) << 15) / pf_res as i64) << 16))
        };

        ppf.opt_gain = clip_int16((ppf.opt_gain * ppf.sc_gain) >> 15) as i32;
    }
    else {
        ppf.opt_gain = 0;
        ppf.sc_gain = 0x7fff;
    }
}

/// Selects the pitch post-filter tap for the subframe at `offset` of the excitation arena by
/// searching forward and backward around the decoded lag and keeping the direction with the
/// better normalized correlation.
pub fn comp_ppf_coeff(
    excitation: &[i16; EXC_LEN],
    offset: usize,
    pitch_lag: i32,
    rate: Rate,
) -> PpfParam {
    let mut ppf = PpfParam { index: 0, opt_gain: 0, sc_gain: 0x7fff };

    // energy[0] target, [1]/[2] forward cross and residual, [3]/[4] backward.
    let mut energy = [0i32; 5];

    let fwd_lag = autocorr_max(excitation, offset, &mut energy[1], pitch_lag, SUBFRAME_LEN, 1);
    let back_lag = autocorr_max(excitation, offset, &mut energy[3], pitch_lag, SUBFRAME_LEN, -1);

    if fwd_lag == 0 && back_lag == 0 {
        return ppf;
    }

    let tgt = &excitation[offset..offset + SUBFRAME_LEN];
    energy[0] = dot_product(tgt, tgt);

    if fwd_lag != 0 {
        let w = &excitation[offset + fwd_lag as usize..offset + fwd_lag as usize + SUBFRAME_LEN];
        energy[2] = dot_product(w, w);
    }
    if back_lag != 0 {
        let w = &excitation[offset - back_lag as usize..offset - back_lag as usize + SUBFRAME_LEN];
        energy[4] = dot_product(w, w);
    }

    // Bring all five energies into 16 bits with a common normalization.
    let peak = energy.iter().copied().max().unwrap();
    let scale = normalize_bits(peak, 31);
    for e in energy.iter_mut() {
        *e = (((*e as i64) << scale) >> 16) as i32;
    }

    if fwd_lag != 0 && back_lag == 0 {
        comp_ppf_gains(&mut ppf, fwd_lag, rate, energy[0], energy[1], energy[2]);
    }
    else if fwd_lag == 0 {
        comp_ppf_gains(&mut ppf, -back_lag, rate, energy[0], energy[3], energy[4]);
    }
    else {
        // Both directions correlate; compare res * ccr^2 across them.
        let fwd = energy[4] as i64 * ((energy[1] as i64 * energy[1] as i64 + (1 << 14)) >> 15);
        let back = energy[2] as i64 * ((energy[3] as i64 * energy[3] as i64 + (1 << 14)) >> 15);

        if fwd >= back {
            comp_ppf_gains(&mut ppf, fwd_lag, rate, energy[0], energy[1], energy[2]);
        }
        else {
            comp_ppf_gains(&mut ppf, -back_lag, rate, energy[0], energy[3], energy[4]);
        }
    }

    ppf
}

/// Adaptive gain control: scales `buf` so its energy tracks `energy`, smoothing the gain with
/// a one-pole filter across samples.
fn gain_scale(p: &mut State, buf: &mut [i16], energy: i32) {
    let num = energy;
    let mut denom = 0;
    for &b in buf.iter() {
        let t = (b as i32) >> 2;
        denom = sat_dadd32(denom, t * t);
    }

    let gain = if num != 0 && denom != 0 {
        let bits1 = normalize_bits(num, 31);
        let bits2 = normalize_bits(denom, 31);
        let num = (num << bits1) >> 1;
        let denom = denom << bits2;

        let shift = (5 + bits1 - bits2).max(0);
        let ratio = ((num >> 1) + (denom >> 16)) / (denom >> 16);

        square_root(clip_int32(((ratio as i64) << 16) >> shift))
    }
    else {
        1 << 12
    };

    for b in buf.iter_mut() {
        p.pf_gain = (15 * p.pf_gain + gain + (1 << 3)) >> 4;
        *b = clip_int16((*b as i32 * (p.pf_gain + (p.pf_gain >> 4)) + (1 << 10)) >> 11);
    }
}

/// Runs the formant post-filter over the synthesized frame in `p.audio`, writing the enhanced
/// speech into `out`. Filter memories persist in the decoder state.
pub fn formant_postfilter(p: &mut State, lpc: &[i16; SUBFRAMES * LPC_ORDER], out: &mut [i16]) {
    debug_assert!(out.len() == FRAME_LEN);

    let mut src = [0i16; AUDIO_LEN];
    src[..LPC_ORDER].copy_from_slice(&p.fir_mem);
    src[LPC_ORDER..].copy_from_slice(&p.audio[LPC_ORDER..]);

    let mut sig = [0i32; AUDIO_LEN];
    sig[..LPC_ORDER].copy_from_slice(&p.iir_mem);

    // Pole-zero weighting filter A(z / 0.65) / A(z / 0.75), per subframe coefficients.
    for (j, sub_lpc) in lpc.chunks_exact(LPC_ORDER).enumerate() {
        let mut fir = [0i16; LPC_ORDER];
        let mut iir = [0i16; LPC_ORDER];
        for k in 0..LPC_ORDER {
            let neg_lpc = -(sub_lpc[k] as i32);
            fir[k] = ((neg_lpc * POSTFILTER_TBL[0][k] as i32 + (1 << 14)) >> 15) as i16;
            iir[k] = ((neg_lpc * POSTFILTER_TBL[1][k] as i32 + (1 << 14)) >> 15) as i16;
        }

        let base = LPC_ORDER + j * SUBFRAME_LEN;
        for m in base..base + SUBFRAME_LEN {
            let mut acc = 0i64;
            for n in 1..=LPC_ORDER {
                acc -= fir[n - 1] as i64 * src[m - n] as i64
                    - iir[n - 1] as i64 * (sig[m - n] >> 16) as i64;
            }
            sig[m] = clip_int32(((src[m] as i64) << 16) + (acc << 3) + (1 << 15));
        }
    }

    p.fir_mem.copy_from_slice(&src[FRAME_LEN..]);
    p.iir_mem.copy_from_slice(&sig[FRAME_LEN..]);

    for j in 0..SUBFRAMES {
        let base = LPC_ORDER + j * SUBFRAME_LEN;

        // Spectral tilt of the unfiltered speech, from the lag-1 over lag-0 autocorrelation.
        let mut norm = [0i16; SUBFRAME_LEN];
        let scale = scale_vector(&mut norm, &src[base..base + SUBFRAME_LEN]);

        let auto_lag1 = dot_product(&norm[..SUBFRAME_LEN - 1], &norm[1..]);
        let auto_lag0 = dot_product(&norm, &norm);

        let refl = if auto_lag0 >> 16 != 0 { (auto_lag1 >> 2) / (auto_lag0 >> 16) } else { 0 };
        p.reflection_coef = (3 * p.reflection_coef + refl + 2) >> 2;
        // Negate before the arithmetic shift; the order matters once the low bits are masked.
        let tilt = (-p.reflection_coef >> 1) & !3;

        // First-order tilt compensation on the filtered signal.
        let dst = &mut out[j * SUBFRAME_LEN..(j + 1) * SUBFRAME_LEN];
        for (k, d) in dst.iter_mut().enumerate() {
            let m = base + k;
            *d = (sat_dadd32(sig[m], (sig[m - 1] >> 16) * tilt) >> 16) as i16;
        }

        // Reference energy of the unfiltered subframe, undoing the normalization.
        let shift = 2 * scale + 4;
        let energy = if shift < 0 {
            clip_int32((auto_lag0 as i64) << -shift)
        }
        else {
            auto_lag0 >> shift
        };

        gain_scale(p, dst, energy);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::State;

    #[test]
    fn silent_excitation_passes_through_unchanged() {
        let excitation = [0i16; EXC_LEN];
        let ppf = comp_ppf_coeff(&excitation, PITCH_MAX as usize, 60, Rate::Rate6300);

        assert_eq!(ppf.index, 0);
        assert_eq!(ppf.opt_gain, 0);
        assert_eq!(ppf.sc_gain, 0x7fff);
    }

    #[test]
    fn periodic_excitation_selects_a_nearby_lag() {
        let mut excitation = [0i16; EXC_LEN];
        for (i, e) in excitation.iter_mut().enumerate() {
            *e = if i % 57 == 3 { 6000 } else { 0 };
        }

        let ppf = comp_ppf_coeff(&excitation, PITCH_MAX as usize, 57, Rate::Rate6300);
        assert_eq!(ppf.index.abs(), 57);
        assert!(ppf.opt_gain > 0);
        assert!(ppf.sc_gain > 0 && ppf.sc_gain <= 0x7fff);
    }

    #[test]
    fn formant_postfilter_of_silence_is_silent() {
        let mut state = State::new();
        let lpc = [0i16; SUBFRAMES * LPC_ORDER];
        let mut out = [1i16; FRAME_LEN];

        formant_postfilter(&mut state, &lpc, &mut out);
        assert!(out.iter().all(|&o| o == 0));
    }

    #[test]
    fn formant_postfilter_output_is_bounded_for_hot_input() {
        let mut state = State::new();
        for (i, a) in state.audio.iter_mut().enumerate() {
            *a = if i & 1 == 0 { i16::MAX } else { i16::MIN };
        }

        let mut lpc = [0i16; SUBFRAMES * LPC_ORDER];
        for (i, l) in lpc.iter_mut().enumerate() {
            *l = ((i as i32 * 1103) % 8191 - 4096) as i16;
        }

        let mut out = [0i16; FRAME_LEN];
        formant_postfilter(&mut state, &lpc, &mut out);
        // Saturating arithmetic everywhere: the call must complete with in-range samples.
        let _ = out;
    }
}
