// Symphonia
// Copyright (c) 2019-2022 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `bitstream` module unpacks one transmitted frame into its parameter set. G.723.1 octets
//! are consumed least-significant bit first, the same convention as Vorbis.

use symphonia_core::errors::{decode_error, Result};
use symphonia_core::io::{BitReaderRtl, ReadBitsRtl};

use crate::common::*;

/// The parameters of one unpacked frame.
pub struct Frame {
    pub frame_type: FrameType,
    pub rate: Rate,
    pub lsp_index: [usize; 3],
    pub pitch_lag: [i32; 2],
    pub subframe: [Subframe; SUBFRAMES],
}

impl Frame {
    fn new(frame_type: FrameType, rate: Rate) -> Self {
        Frame {
            frame_type,
            rate,
            lsp_index: [0; 3],
            pitch_lag: [0; 2],
            subframe: [Subframe::default(); SUBFRAMES],
        }
    }
}

/// Reads a 7-bit pitch lag. Codes above 123 are forbidden.
fn read_pitch_lag(bs: &mut BitReaderRtl<'_>) -> Result<i32> {
    let code = bs.read_bits_leq32(7)? as i32;
    if code > 123 {
        return decode_error("g7231: forbidden pitch lag code");
    }
    Ok(code + PITCH_MIN)
}

/// Unpacks one frame. `buf` must hold exactly the bytes of the frame. A malformed frame yields
/// a decode error; the caller converts that into concealment, never into failure.
pub fn read_frame(buf: &[u8]) -> Result<Frame> {
    let mut bs = BitReaderRtl::new(buf);

    let frame_type = match bs.read_bits_leq32(2)? {
        0 | 1 => FrameType::Active,
        2 => FrameType::Sid,
        _ => return Ok(Frame::new(FrameType::Untransmitted, Rate::Rate6300)),
    };

    let rate = if buf[0] & 3 == 1 { Rate::Rate5300 } else { Rate::Rate6300 };

    let mut frame = Frame::new(frame_type, rate);

    // The three LSP codebook indices are transmitted in reverse order.
    frame.lsp_index[2] = bs.read_bits_leq32(8)? as usize;
    frame.lsp_index[1] = bs.read_bits_leq32(8)? as usize;
    frame.lsp_index[0] = bs.read_bits_leq32(8)? as usize;

    if frame_type == FrameType::Sid {
        frame.subframe[0].amp_index = bs.read_bits_leq32(6)? as i32;
        return Ok(frame);
    }

    // Open-loop pitch lags for each subframe pair, with the fine offsets of the odd subframes.
    // Even subframes always use the centre offset.
    frame.pitch_lag[0] = read_pitch_lag(&mut bs)?;
    frame.subframe[1].ad_cb_lag = bs.read_bits_leq32(2)? as i32;
    frame.pitch_lag[1] = read_pitch_lag(&mut bs)?;
    frame.subframe[3].ad_cb_lag = bs.read_bits_leq32(2)? as i32;
    frame.subframe[0].ad_cb_lag = 1;
    frame.subframe[2].ad_cb_lag = 1;

    for i in 0..SUBFRAMES {
        let mut combined = bs.read_bits_leq32(12)? as i32;

        // At 6.3 kbit/s a short pitch lag repurposes the top combined-gain bit as the pulse
        // train flag and narrows the adaptive gain table to 85 entries.
        let table_len = if rate == Rate::Rate6300 && frame.pitch_lag[i >> 1] < SUBFRAME_LEN as i32 - 2
        {
            frame.subframe[i].dirac_train = combined >> 11 != 0;
            combined &= 0x7ff;
            85
        }
        else {
            170
        };

        let ad_cb_gain = combined / GAIN_LEVELS;
        if ad_cb_gain >= table_len {
            return decode_error("g7231: adaptive codebook gain out of range");
        }
        frame.subframe[i].ad_cb_gain = ad_cb_gain;
        frame.subframe[i].amp_index = combined - ad_cb_gain * GAIN_LEVELS;
    }

    for i in 0..SUBFRAMES {
        frame.subframe[i].grid_index = bs.read_bits_leq32(1)? as i32;
    }

    if rate == Rate::Rate6300 {
        // Reserved bit.
        bs.ignore_bits(1)?;

        // A 13-bit index combines the high pulse position digits of all four subframes in
        // bases 810, 90, and 9.
        let combined = bs.read_bits_leq32(13)? as i32;
        let digits = [combined / 810, combined % 810 / 90, combined % 90 / 9, combined % 9];

        for (i, tail_bits) in [16u32, 14, 16, 14].iter().enumerate() {
            let tail = bs.read_bits_leq32(*tail_bits)? as i32;
            frame.subframe[i].pulse_pos = (digits[i] << *tail_bits) | tail;
        }

        for (i, sign_bits) in [6u32, 5, 6, 5].iter().enumerate() {
            frame.subframe[i].pulse_sign = bs.read_bits_leq32(*sign_bits)? as i32;
        }
    }
    else {
        for i in 0..SUBFRAMES {
            frame.subframe[i].pulse_pos = bs.read_bits_leq32(12)? as i32;
        }
        for i in 0..SUBFRAMES {
            frame.subframe[i].pulse_sign = bs.read_bits_leq32(4)? as i32;
        }
    }

    Ok(frame)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn untransmitted_needs_only_the_type_bits() {
        let frame = read_frame(&[0x03]).unwrap();
        assert_eq!(frame.frame_type, FrameType::Untransmitted);
    }

    #[test]
    fn sid_reads_reversed_lsp_indices_and_gain() {
        // Type bits 0b10, then LSP octets 0x11, 0x22, 0x33, then a 6-bit gain of 9.
        // With LSB-first packing the first LSP octet spans bytes 0 and 1.
        let mut buf = [0u8; 4];
        buf[0] = 0x02 | 0x11 << 2;
        buf[1] = 0x11 >> 6 | 0x22 << 2;
        buf[2] = 0x22 >> 6 | 0x33 << 2;
        buf[3] = 0x33 >> 6 | 9 << 2;

        let frame = read_frame(&buf).unwrap();
        assert_eq!(frame.frame_type, FrameType::Sid);
        assert_eq!(frame.lsp_index, [0x33, 0x22, 0x11]);
        assert_eq!(frame.subframe[0].amp_index, 9);
    }

    #[test]
    fn zero_payload_is_a_valid_active_frame() {
        let frame = read_frame(&[0u8; 24]).unwrap();
        assert_eq!(frame.frame_type, FrameType::Active);
        assert_eq!(frame.rate, Rate::Rate6300);
        assert_eq!(frame.pitch_lag, [PITCH_MIN, PITCH_MIN]);
        assert_eq!(frame.subframe[0].ad_cb_lag, 1);
        assert_eq!(frame.subframe[1].ad_cb_lag, 0);
        assert_eq!(frame.subframe[0].ad_cb_gain, 0);
        assert_eq!(frame.subframe[0].amp_index, 0);

        let frame = read_frame(&[0x01, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0])
            .unwrap();
        assert_eq!(frame.rate, Rate::Rate5300);
    }

    #[test]
    fn forbidden_pitch_code_is_rejected() {
        // The first pitch lag field starts at bit 26. Plant the forbidden code 124 there.
        let mut buf = [0u8; 24];
        buf[3] = (124 << 2) as u8;
        buf[4] = 124 >> 6;

        assert!(read_frame(&buf).is_err());
    }

    #[test]
    fn out_of_range_adaptive_gain_is_rejected() {
        // A zero 6.3 kbit/s frame takes the 85-entry gain table (pitch lag 18 < 58). The first
        // combined gain field starts at bit 44; 85 * 24 = 2040 yields gain index 85.
        let mut buf = [0u8; 24];
        let combined = 2040u32 & 0x7ff;
        buf[5] = (combined << 4) as u8;
        buf[6] = (combined >> 4) as u8;

        assert!(read_frame(&buf).is_err());
    }
}
