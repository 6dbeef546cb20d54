// Symphonia
// Copyright (c) 2019-2022 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `decoder` module owns the persistent decoder state and drives one frame through the
//! pipeline: unpack, excitation reconstruction or concealment or comfort noise, short-term
//! synthesis, and the optional post-filters.

use symphonia_core::audio::{AsAudioBufferRef, AudioBuffer, AudioBufferRef, Signal, SignalSpec};
use symphonia_core::audio::Channels;
use symphonia_core::errors::{decode_error, Result};

use log::{debug, warn};

use crate::bitstream::{self, Frame};
use crate::cng;
use crate::common::*;
use crate::dsp::{clip_int16, weighted_vector_sum};
use crate::excitation;
use crate::lsp;
use crate::postfilter;
use crate::synthesis::lp_synthesis;
use crate::tables::FIXED_CB_GAIN;

/// Initial seed of the comfort-noise generator.
const CNG_RANDOM_SEED: i32 = 12345;

/// Decoder configuration.
#[derive(Copy, Clone, Debug)]
pub struct DecoderOptions {
    /// Enables the pitch and formant post-filters.
    pub postfilter: bool,
}

impl Default for DecoderOptions {
    fn default() -> Self {
        DecoderOptions { postfilter: true }
    }
}

/// The persistent state of one decoder instance.
pub(crate) struct State {
    pub prev_lsp: [i16; LPC_ORDER],
    pub sid_lsp: [i16; LPC_ORDER],
    /// Rolling excitation arena: 146 samples of history, then the current frame.
    pub excitation: [i16; EXC_LEN],
    /// The last 146 excitation samples of the previous frame.
    pub prev_excitation: [i16; PITCH_MAX as usize],
    /// Staging buffer for synthesis: filter memory, then the current frame.
    pub audio: [i16; AUDIO_LEN],
    pub synth_mem: [i16; LPC_ORDER],
    pub fir_mem: [i16; LPC_ORDER],
    pub iir_mem: [i32; LPC_ORDER],
    pub subframe: [Subframe; SUBFRAMES],
    pub pitch_lag: [i32; 2],
    pub cur_rate: Rate,
    pub past_frame_type: FrameType,
    pub erased_frames: u32,
    pub interp_gain: i32,
    pub interp_index: i32,
    pub sid_gain: i32,
    pub cur_gain: i32,
    pub reflection_coef: i32,
    pub pf_gain: i32,
    /// Erasure-concealment noise seed; full 32-bit state, unlike the masked CNG seed.
    pub random_seed: i32,
    pub cng_random_seed: i32,
}

impl State {
    pub fn new() -> Self {
        let mut prev_lsp = [0; LPC_ORDER];
        prev_lsp.copy_from_slice(&crate::tables::DC_LSP);

        State {
            prev_lsp,
            sid_lsp: prev_lsp,
            excitation: [0; EXC_LEN],
            prev_excitation: [0; PITCH_MAX as usize],
            audio: [0; AUDIO_LEN],
            synth_mem: [0; LPC_ORDER],
            fir_mem: [0; LPC_ORDER],
            iir_mem: [0; LPC_ORDER],
            subframe: [Subframe::default(); SUBFRAMES],
            pitch_lag: [0; 2],
            cur_rate: Rate::Rate6300,
            // Starting in silence lets comfort noise cover a lost first frame.
            past_frame_type: FrameType::Sid,
            erased_frames: 0,
            interp_gain: 0,
            interp_index: 0,
            sid_gain: 0,
            cur_gain: 0,
            reflection_coef: 0,
            pf_gain: 1 << 12,
            random_seed: 0,
            cng_random_seed: CNG_RANDOM_SEED,
        }
    }
}

/// Resolves the frame type the decoder acts on: a frame that failed to parse is concealed as
/// an erased active frame inside a talkspurt, and as comfort-noise continuation outside one.
fn remap_frame_type(parsed: Option<FrameType>, past: FrameType) -> (FrameType, bool) {
    match parsed {
        Some(frame_type) => (frame_type, false),
        None if past == FrameType::Active => (FrameType::Active, true),
        None => (FrameType::Untransmitted, true),
    }
}

/// ITU-T G.723.1 dual-rate speech decoder.
pub struct G7231Decoder {
    opts: DecoderOptions,
    state: State,
    buf: AudioBuffer<i16>,
}

impl G7231Decoder {
    pub fn new(opts: &DecoderOptions) -> Self {
        let spec = SignalSpec::new(8000, Channels::FRONT_LEFT);
        G7231Decoder {
            opts: *opts,
            state: State::new(),
            buf: AudioBuffer::new(FRAME_LEN as u64, spec),
        }
    }

    /// Returns the decoder to its freshly constructed state.
    pub fn reset(&mut self) {
        self.state = State::new();
        self.buf.clear();
    }

    /// Decodes one frame from the head of `data` and returns the number of bytes consumed.
    /// A buffer shorter than the declared frame consumes everything and produces no samples;
    /// a corrupt frame engages concealment and still produces a full frame.
    pub fn decode(&mut self, data: &[u8]) -> Result<usize> {
        self.buf.clear();

        if data.is_empty() {
            return decode_error("g7231: empty packet");
        }

        let size = frame_size(data[0]);
        if data.len() < size {
            warn!("g7231: short frame ({} of {} bytes), skipping", data.len(), size);
            return Ok(data.len());
        }

        let parsed = match bitstream::read_frame(&data[..size]) {
            Ok(frame) => Some(frame),
            Err(err) => {
                debug!("g7231: bad frame ({}), concealing", err);
                None
            }
        };

        let (cur_type, bad_frame) =
            remap_frame_type(parsed.as_ref().map(|f| f.frame_type), self.state.past_frame_type);

        let mut lpc = [0i16; SUBFRAMES * LPC_ORDER];

        match cur_type {
            FrameType::Active => self.decode_active(parsed.as_ref(), bad_frame, &mut lpc),
            _ => self.decode_comfort_noise(parsed.as_ref(), cur_type, &mut lpc),
        }

        // 10th-order synthesis across the four subframes; each one's output is the next one's
        // filter memory.
        self.state.audio[..LPC_ORDER].copy_from_slice(&self.state.synth_mem);
        for j in 0..SUBFRAMES {
            let window = &mut self.state.audio[j * SUBFRAME_LEN..][..LPC_ORDER + SUBFRAME_LEN];
            lp_synthesis(window, &lpc[j * LPC_ORDER..(j + 1) * LPC_ORDER]);
        }
        self.state.synth_mem.copy_from_slice(&self.state.audio[FRAME_LEN..]);

        self.buf.render_reserved(Some(FRAME_LEN));
        let out = self.buf.chan_mut(0);

        if self.opts.postfilter {
            postfilter::formant_postfilter(&mut self.state, &lpc, out);
        }
        else {
            for (o, &a) in out.iter_mut().zip(&self.state.audio[LPC_ORDER..]) {
                *o = clip_int16((a as i32) << 1);
            }
        }

        self.state.past_frame_type = cur_type;
        Ok(size)
    }

    /// The samples produced by the last `decode` call: one frame, or empty if it was skipped.
    pub fn last_decoded(&self) -> AudioBufferRef<'_> {
        self.buf.as_audio_buffer_ref()
    }

    /// Decodes a speech frame, or conceals an erased one.
    fn decode_active(
        &mut self,
        frame: Option<&Frame>,
        bad_frame: bool,
        lpc: &mut [i16; SUBFRAMES * LPC_ORDER],
    ) {
        let p = &mut self.state;

        if !bad_frame {
            p.erased_frames = 0;
        }
        else if p.erased_frames != 3 {
            p.erased_frames += 1;
            debug!("g7231: erased frame {} of 3", p.erased_frames);
        }

        let lsp_index = match frame {
            Some(frame) => {
                p.cur_rate = frame.rate;
                p.pitch_lag = frame.pitch_lag;
                p.subframe = frame.subframe;
                frame.lsp_index
            }
            None => [0; 3],
        };

        let mut cur_lsp = [0i16; LPC_ORDER];
        lsp::inverse_quant(&mut cur_lsp, &p.prev_lsp, &lsp_index, bad_frame);
        lsp::interpolate(lpc, &cur_lsp, &p.prev_lsp);
        p.prev_lsp = cur_lsp;

        let history = p.prev_excitation;
        p.excitation[..PITCH_MAX as usize].copy_from_slice(&history);

        if p.erased_frames == 0 {
            // Interpolation gain for a possible erasure in the next frame: the mean fixed
            // codebook gain of the last two subframes.
            let amp = (p.subframe[2].amp_index + p.subframe[3].amp_index) >> 1;
            p.interp_gain = FIXED_CB_GAIN[amp as usize] as i32;

            for i in 0..SUBFRAMES {
                let pitch_lag = p.pitch_lag[i >> 1];

                let mut fcb = [0i16; SUBFRAME_LEN + 4];
                excitation::gen_fcb_excitation(&mut fcb, &p.subframe[i], p.cur_rate, pitch_lag, i);

                let start = PITCH_MAX as usize + i * SUBFRAME_LEN;
                let (past, cur) = p.excitation.split_at_mut(start);

                let mut acb = [0i16; SUBFRAME_LEN];
                excitation::gen_acb_excitation(
                    &mut acb,
                    &past[start - PITCH_MAX as usize..],
                    pitch_lag,
                    &p.subframe[i],
                    p.cur_rate,
                );

                for j in 0..SUBFRAME_LEN {
                    let pulse = clip_int16(2 * fcb[j] as i32);
                    cur[j] = clip_int16(pulse as i32 + acb[j] as i32);
                }
            }

            // Classify the tail for concealment; the energy and scale double as the comfort
            // noise reference if the talkspurt ends without a SID frame.
            let (index, exc_eng, scale) =
                excitation::comp_interp_index(&p.excitation, p.pitch_lag[1]);
            p.interp_index = index;
            p.sid_gain = exc_eng;
            p.cur_gain = scale;

            if self.opts.postfilter {
                for j in 0..SUBFRAMES {
                    let offset = PITCH_MAX as usize + j * SUBFRAME_LEN;
                    let pitch_lag = p.pitch_lag[j >> 1];
                    let ppf = postfilter::comp_ppf_coeff(&p.excitation, offset, pitch_lag, p.cur_rate);

                    let tap = (offset as i32 + ppf.index) as usize;
                    let dst = &mut p.audio[LPC_ORDER + j * SUBFRAME_LEN..][..SUBFRAME_LEN];
                    weighted_vector_sum(
                        dst,
                        &p.excitation[offset..offset + SUBFRAME_LEN],
                        &p.excitation[tap..tap + SUBFRAME_LEN],
                        ppf.sc_gain,
                        ppf.opt_gain,
                        1 << 14,
                        15,
                    );
                }
            }
            else {
                let frame_exc = &p.excitation[PITCH_MAX as usize..];
                p.audio[LPC_ORDER..].copy_from_slice(frame_exc);
            }

            let mut tail = [0i16; PITCH_MAX as usize];
            tail.copy_from_slice(&p.excitation[FRAME_LEN..]);
            p.prev_excitation = tail;
        }
        else {
            p.interp_gain = (p.interp_gain * 3 + 2) >> 2;

            if p.erased_frames == 3 {
                // Third consecutive erasure: mute completely so the decoder restarts clean.
                p.excitation.fill(0);
                p.prev_excitation.fill(0);
                p.audio.fill(0);
                p.synth_mem.fill(0);
                p.fir_mem.fill(0);
                p.iir_mem.fill(0);
            }
            else {
                excitation::residual_interp(
                    &mut p.excitation,
                    &mut p.audio[LPC_ORDER..],
                    p.interp_index,
                    p.interp_gain,
                    &mut p.random_seed,
                );

                // The regenerated frame is the excitation history of the next one.
                let mut tail = [0i16; PITCH_MAX as usize];
                tail.copy_from_slice(&p.audio[LPC_ORDER + FRAME_LEN - PITCH_MAX as usize..]);
                p.prev_excitation = tail;
            }
        }

        p.cng_random_seed = CNG_RANDOM_SEED;
    }

    /// Generates a comfort-noise frame from SID parameters, received or estimated.
    fn decode_comfort_noise(
        &mut self,
        frame: Option<&Frame>,
        cur_type: FrameType,
        lpc: &mut [i16; SUBFRAMES * LPC_ORDER],
    ) {
        let p = &mut self.state;

        if cur_type == FrameType::Sid {
            // A SID frame always parses; it carries the noise gain and spectrum directly.
            let frame = frame.expect("sid frames always parse");
            p.sid_gain = cng::dequant_sid_gain(frame.subframe[0].amp_index);
            lsp::inverse_quant(&mut p.sid_lsp, &p.prev_lsp, &frame.lsp_index, false);
        }
        else if p.past_frame_type == FrameType::Active {
            // The talkspurt ended without a SID frame; estimate the gain from the energy the
            // classifier banked on the last active frame.
            let index = cng::estimate_sid_gain(p.sid_gain, p.cur_gain);
            p.sid_gain = cng::dequant_sid_gain(index);
        }

        if p.past_frame_type == FrameType::Active {
            p.cur_gain = p.sid_gain;
        }
        else {
            p.cur_gain = (p.cur_gain * 7 + p.sid_gain) >> 3;
        }

        let history = p.prev_excitation;
        p.excitation[..PITCH_MAX as usize].copy_from_slice(&history);

        cng::generate_noise(p);

        lsp::interpolate(lpc, &p.sid_lsp, &p.prev_lsp);
        p.prev_lsp = p.sid_lsp;

        let frame_exc = &p.excitation[PITCH_MAX as usize..];
        p.audio[LPC_ORDER..].copy_from_slice(frame_exc);

        let mut tail = [0i16; PITCH_MAX as usize];
        tail.copy_from_slice(&p.excitation[FRAME_LEN..]);
        p.prev_excitation = tail;
    }
}

impl Default for G7231Decoder {
    fn default() -> Self {
        G7231Decoder::new(&DecoderOptions::default())
    }
}
