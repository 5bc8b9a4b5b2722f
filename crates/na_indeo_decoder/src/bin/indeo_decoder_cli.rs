//! Decode a sequence of raw Indeo frames to YUV and/or PNG files.
//!
//! Usage:
//!   indeo-decoder <indeo4|indeo5> <output_dir> <frame>... [--yuv] [--png] [--conceal]
//!
//! Each `<frame>` is a file holding exactly one compressed frame, as stored
//! in an AVI `00dc` chunk.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use indeo_decoder::{Codec, DecoderConfig, Indeo4Decoder, Indeo5Decoder, PixelFormat, YuvFrame};

const USAGE: &str = "<indeo4|indeo5> <output_dir> <frame>... [--yuv] [--png] [--conceal]";

fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();

    let mut positional: Vec<&str> = Vec::new();
    let mut dump_yuv = false;
    let mut dump_png = false;
    let mut conceal = false;

    for arg in args.iter().skip(1) {
        match arg.as_str() {
            "--yuv" => dump_yuv = true,
            "--png" => dump_png = true,
            "--conceal" => conceal = true,
            _ => positional.push(arg),
        }
    }

    if positional.len() < 3 {
        eprintln!("Usage: {} {}", args[0], USAGE);
        std::process::exit(1);
    }
    if !dump_yuv && !dump_png {
        dump_yuv = true;
    }

    let opts = Options {
        output_dir: PathBuf::from(positional[1]),
        dump_yuv,
        dump_png,
        conceal,
    };
    if let Err(e) = run(positional[0], &positional[2..], &opts) {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

struct Options {
    output_dir: PathBuf,
    dump_yuv:   bool,
    dump_png:   bool,
    conceal:    bool,
}

fn run(codec: &str, inputs: &[&str], opts: &Options) -> anyhow::Result<()> {
    let config = DecoderConfig::default()
        .with_pixel_format(PixelFormat::Yuv410)
        .with_conceal_errors(opts.conceal);
    let mut dec: Box<dyn Codec> = match codec {
        "indeo4" | "iv41" => Box::new(Indeo4Decoder::new(config)?),
        "indeo5" | "iv50" => Box::new(Indeo5Decoder::new(config)?),
        other => bail!("unknown codec {other}, expected indeo4 or indeo5"),
    };

    std::fs::create_dir_all(&opts.output_dir)
        .with_context(|| format!("creating {}", opts.output_dir.display()))?;

    for (idx, input) in inputs.iter().enumerate() {
        let data = std::fs::read(input).with_context(|| format!("reading {input}"))?;
        let surface = match dec.decode_frame(&data) {
            Ok(surface) => surface,
            Err(e) => {
                log::warn!("Frame {} ({}) failed: {}", idx, input, e);
                continue;
            }
        };

        if opts.dump_yuv {
            let fname = opts.output_dir.join(format!("frame_{:04}.yuv", idx));
            write_yuv_frame(&fname, &surface.frame)?;
        }
        if opts.dump_png {
            let fname = opts.output_dir.join(format!("frame_{:04}.png", idx));
            write_png_frame(&fname, &surface.frame)?;
        }
    }

    Ok(())
}

fn write_yuv_frame(path: &Path, frame: &YuvFrame) -> anyhow::Result<()> {
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut w = BufWriter::new(file);
    w.write_all(&frame.to_planar_u8())?;
    w.flush()?;
    Ok(())
}

fn write_png_frame(path: &Path, frame: &YuvFrame) -> anyhow::Result<()> {
    let rgba = frame.to_rgba();
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut enc = png::Encoder::new(BufWriter::new(file), frame.width as u32, frame.height as u32);
    enc.set_color(png::ColorType::Rgba);
    enc.set_depth(png::BitDepth::Eight);
    let mut writer = enc.write_header().context("PNG header")?;
    writer.write_image_data(&rgba).context("PNG data")?;
    Ok(())
}
