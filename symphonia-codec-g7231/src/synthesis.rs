// Symphonia
// Copyright (c) 2019-2022 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `synthesis` module implements the 10th-order all-pole short-term synthesis filter.

use crate::common::LPC_ORDER;
use crate::dsp::{clip_int16, clip_int32};

/// Filters `audio[LPC_ORDER..]` in place through `1 / A(z)` with Q13 coefficients. The first
/// `LPC_ORDER` samples hold the filter memory, so consecutive subframes chain by overlapping
/// their windows.
pub fn lp_synthesis(audio: &mut [i16], lpc: &[i16]) {
    debug_assert!(lpc.len() == LPC_ORDER);

    for n in LPC_ORDER..audio.len() {
        let mut sum = 1i64 << 12;
        for (k, &c) in lpc.iter().enumerate() {
            sum -= c as i64 * audio[n - 1 - k] as i64;
        }
        audio[n] = clip_int16(audio[n] as i32 + clip_int32(sum >> 13));
    }
}
