// Symphonia
// Copyright (c) 2019-2022 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Shared constants and parameter types of the G.723.1 decoder.

use crate::tables::FRAME_SIZE;

/// Samples per frame (30 ms at 8 kHz).
pub const FRAME_LEN: usize = 240;
/// Subframes per frame.
pub const SUBFRAMES: usize = 4;
/// Samples per subframe.
pub const SUBFRAME_LEN: usize = FRAME_LEN / SUBFRAMES;
/// Order of the short-term synthesis filter.
pub const LPC_ORDER: usize = 10;
/// Smallest open-loop pitch lag.
pub const PITCH_MIN: i32 = 18;
/// Largest open-loop pitch lag, and the length of the excitation history.
pub const PITCH_MAX: i32 = 146;
/// Taps of the adaptive-codebook predictor.
pub const PITCH_ORDER: usize = 5;
/// Fixed-codebook pulses land on every other sample.
pub const GRID_SIZE: usize = 2;
/// Largest number of fixed-codebook pulses per subframe.
pub const PULSE_MAX: usize = 6;
/// Levels of the fixed-codebook gain quantizer.
pub const GAIN_LEVELS: i32 = 24;

/// Samples in the rolling excitation arena: the previous history followed by the current frame.
pub const EXC_LEN: usize = PITCH_MAX as usize + FRAME_LEN;
/// Samples in the audio staging buffer: synthesis memory followed by the current frame.
pub const AUDIO_LEN: usize = LPC_ORDER + FRAME_LEN;

/// Frame classification carried in the two least-significant bits of the first octet.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FrameType {
    /// A speech frame at one of the two active bitrates.
    Active,
    /// A silence-insertion descriptor carrying comfort-noise parameters.
    Sid,
    /// Nothing was transmitted; comfort noise continues.
    Untransmitted,
}

/// The two active bitrates.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Rate {
    Rate6300 = 0,
    Rate5300 = 1,
}

/// Decoded parameters of one 60-sample subframe.
#[derive(Copy, Clone, Debug, Default)]
pub struct Subframe {
    /// Fine pitch lag offset, 0..=3 (an offset of -1..=+2 around the open-loop lag).
    pub ad_cb_lag: i32,
    /// Adaptive-codebook gain vector index.
    pub ad_cb_gain: i32,
    /// Fixed-codebook gain index.
    pub amp_index: i32,
    /// Periodic pulse-train overlay flag (6.3 kbit/s, short lags only).
    pub dirac_train: bool,
    /// Even or odd pulse grid.
    pub grid_index: i32,
    /// Pulse sign bitmap.
    pub pulse_sign: i32,
    /// Combined pulse position index.
    pub pulse_pos: i32,
}

/// Size in bytes of the frame whose first octet is `first_byte`.
pub fn frame_size(first_byte: u8) -> usize {
    FRAME_SIZE[(first_byte & 3) as usize]
}
