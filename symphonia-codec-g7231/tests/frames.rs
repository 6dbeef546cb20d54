// Symphonia
// Copyright (c) 2019-2022 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use symphonia_codec_g7231::{frame_size, DecoderOptions, G7231Decoder};
use symphonia_core::audio::{AudioBufferRef, Signal};

fn samples(dec: &G7231Decoder) -> Vec<i16> {
    match dec.last_decoded() {
        AudioBufferRef::S16(buf) => buf.chan(0).to_vec(),
        _ => unreachable!(),
    }
}

/// Builds a SID frame with the given LSP index bytes and 6-bit gain index.
fn sid_frame(lsp: [u8; 3], gain: u8) -> [u8; 4] {
    let mut bits = 0u32;
    bits |= 0b10;
    bits |= (lsp[2] as u32) << 2;
    bits |= (lsp[1] as u32) << 10;
    bits |= (lsp[0] as u32) << 18;
    let mut frame = bits.to_le_bytes();
    frame[3] |= (gain & 0x3f) << 2;
    frame
}

#[test]
fn frame_sizes_follow_the_first_octet() {
    assert_eq!(frame_size(0x00), 24);
    assert_eq!(frame_size(0x01), 20);
    assert_eq!(frame_size(0x02), 4);
    assert_eq!(frame_size(0x03), 1);
    // Only the two low bits matter.
    assert_eq!(frame_size(0xfc), 24);
    assert_eq!(frame_size(0xff), 1);
}

#[test]
fn a_raw_stream_decodes_frame_by_frame() {
    let mut stream = Vec::new();
    stream.extend_from_slice(&sid_frame([0, 0, 0], 12));
    stream.extend_from_slice(&[0x03]);
    stream.extend_from_slice(&[0u8; 24]);
    stream.extend_from_slice(&[0x03]);

    let mut dec = G7231Decoder::default();
    let mut total = 0;
    let mut pos = 0;

    while pos < stream.len() {
        let consumed = dec.decode(&stream[pos..]).unwrap();
        assert_eq!(consumed, frame_size(stream[pos]));
        pos += consumed;
        total += samples(&dec).len();
    }

    assert_eq!(pos, stream.len());
    assert_eq!(total, 4 * 240);
}

#[test]
fn comfort_noise_amplitude_tracks_the_sid_gain() {
    // Zero gain converges to silence.
    let mut dec = G7231Decoder::default();
    dec.decode(&sid_frame([0, 0, 0], 0)).unwrap();
    for _ in 0..8 {
        dec.decode(&[0x03]).unwrap();
    }
    let quiet: i32 = samples(&dec).iter().map(|&s| (s as i32).abs()).max().unwrap();

    // A loud SID gain produces audible, but bounded, noise.
    let mut dec = G7231Decoder::default();
    dec.decode(&sid_frame([0, 0, 0], 50)).unwrap();
    for _ in 0..8 {
        dec.decode(&[0x03]).unwrap();
    }
    let loud: i32 = samples(&dec).iter().map(|&s| (s as i32).abs()).max().unwrap();

    assert!(quiet <= loud, "quiet = {}, loud = {}", quiet, loud);
    assert!(quiet < 16, "zero-gain comfort noise should be near-silent, got {}", quiet);
}

#[test]
fn no_input_ever_panics_or_overflows() {
    // Decode adversarial frames of every type from a rolling pseudo-random byte source. All
    // arithmetic saturates, so every frame must come back with 0 or 240 in-range samples.
    let mut state = 0x1234_5678u32;
    let mut next = move || {
        state = state.wrapping_mul(1664525).wrapping_add(1013904223);
        (state >> 24) as u8
    };

    let mut dec = G7231Decoder::default();

    for trial in 0..200 {
        let first = next();
        let size = frame_size(first);
        let mut frame = vec![first; 1];
        frame.extend(std::iter::repeat_with(&mut next).take(size - 1));

        match dec.decode(&frame) {
            Ok(consumed) => assert_eq!(consumed, size, "trial {}", trial),
            Err(_) => unreachable!("well-sized frames never error"),
        }

        let out = samples(&dec);
        assert_eq!(out.len(), 240, "trial {}", trial);
    }
}

#[test]
fn reset_restores_the_initial_state() {
    let mut dec = G7231Decoder::default();

    let mut first = Vec::new();
    dec.decode(&sid_frame([7, 21, 63], 33)).unwrap();
    first.extend(samples(&dec));
    dec.decode(&[0x03]).unwrap();
    first.extend(samples(&dec));

    dec.reset();

    let mut second = Vec::new();
    dec.decode(&sid_frame([7, 21, 63], 33)).unwrap();
    second.extend(samples(&dec));
    dec.decode(&[0x03]).unwrap();
    second.extend(samples(&dec));

    assert_eq!(first, second);
}
