// Symphonia
// Copyright (c) 2019-2022 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! A decoder for the ITU-T G.723.1 dual-rate speech codec.
//!
//! Each 30 ms frame of 24, 20, 4, or 1 bytes decodes into 240 signed 16-bit samples of 8 kHz
//! monophonic audio. Both active bitrates (6.3 and 5.3 kbit/s) are supported, along with SID
//! frames and comfort-noise generation for silence periods, frame-erasure concealment, and the
//! pitch and formant post-filters. All arithmetic follows the fixed-point reference: results
//! are deterministic across platforms.
//!
//! The trained codebook ROM in the `tables` module is currently a placeholder with the
//! reference's layout and dynamic range but not its values, so output is not yet conformant to
//! the ITU-T test vectors. The placeholders are flagged on the affected tables.
//!
//! Transport framing and codec registration belong to the host; the decoder consumes raw frame
//! bytes and exposes PCM through [`G7231Decoder::last_decoded`].

#![warn(rust_2018_idioms)]
#![forbid(unsafe_code)]
// The following lints are allowed in all Symphonia crates. Please see clippy.toml for their
// justification.
#![allow(clippy::comparison_chain)]
#![allow(clippy::excessive_precision)]
#![allow(clippy::identity_op)]
#![allow(clippy::manual_range_contains)]
// Disable to better express the reference fixed-point arithmetic.
#![allow(clippy::needless_range_loop)]

mod bitstream;
mod cng;
mod common;
mod decoder;
mod dsp;
mod excitation;
mod lsp;
mod postfilter;
mod synthesis;
mod tables;

pub use common::frame_size;
pub use decoder::{DecoderOptions, G7231Decoder};
