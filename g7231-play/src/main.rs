// Symphonia
// Copyright (c) 2019-2022 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

#![warn(rust_2018_idioms)]
#![forbid(unsafe_code)]

use std::fs;
use std::process;

use clap::{App, Arg};
use log::{info, warn};

use symphonia_codec_g7231::{frame_size, DecoderOptions, G7231Decoder};
use symphonia_core::audio::{AudioBufferRef, Signal};

fn main() {
    pretty_env_logger::init();

    let matches = App::new("g7231-play")
        .version("1.0")
        .about("Decode a raw ITU-T G.723.1 bitstream to a WAV file")
        .arg(
            Arg::with_name("no-postfilter")
                .long("no-postfilter")
                .help("Disable the pitch and formant post-filters"),
        )
        .arg(Arg::with_name("INPUT").help("Raw G.723.1 bitstream file").required(true).index(1))
        .arg(Arg::with_name("OUTPUT").help("Output WAV file").required(true).index(2))
        .get_matches();

    let input = matches.value_of("INPUT").unwrap();
    let output = matches.value_of("OUTPUT").unwrap();
    let opts = DecoderOptions { postfilter: !matches.is_present("no-postfilter") };

    match run(input, output, &opts) {
        Ok(frames) => info!("decoded {} frames", frames),
        Err(err) => {
            eprintln!("error: {}", err);
            process::exit(1);
        }
    }
}

fn run(input: &str, output: &str, opts: &DecoderOptions) -> Result<u64, Box<dyn std::error::Error>> {
    let data = fs::read(input)?;

    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 8000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(output, spec)?;

    let mut decoder = G7231Decoder::new(opts);
    let mut frames = 0;
    let mut pos = 0;

    while pos < data.len() {
        let remaining = data.len() - pos;
        if remaining < frame_size(data[pos]) {
            warn!("{} trailing bytes do not form a whole frame", remaining);
        }

        let consumed = decoder.decode(&data[pos..])?;
        pos += consumed;

        if let AudioBufferRef::S16(buf) = decoder.last_decoded() {
            for &sample in buf.chan(0) {
                writer.write_sample(sample)?;
            }
            if buf.frames() > 0 {
                frames += 1;
            }
        }
    }

    writer.finalize()?;
    Ok(frames)
}
