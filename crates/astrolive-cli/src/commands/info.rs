use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use astrolive_core::io::fits::read_fits;
use astrolive_core::io::image_io::{is_fits, load_image};
use astrolive_core::io::{HeaderValue, SerReader};
use clap::Args;

#[derive(Args)]
pub struct InfoArgs {
    /// Input FITS, SER or image file
    pub file: PathBuf,

    /// List every FITS header card
    #[arg(long)]
    pub header: bool,
}

pub fn run(args: &InfoArgs) -> Result<()> {
    let is_ser = args
        .file
        .extension()
        .is_some_and(|e| e.eq_ignore_ascii_case("ser"));

    if is_ser {
        ser_info(&args.file)
    } else if is_fits(&args.file) {
        fits_info(&args.file, args.header)
    } else {
        image_info(&args.file)
    }
}

fn ser_info(path: &Path) -> Result<()> {
    let reader = SerReader::open(path)
        .with_context(|| format!("Failed to open SER file {}", path.display()))?;
    let header = &reader.header;
    let total = reader.frame_count();

    println!("File:        {}", path.display());
    println!("Frames:      {}", total);
    println!("Dimensions:  {}x{}", header.width, header.height);
    println!("Bit depth:   {}", header.pixel_depth);
    println!("Color mode:  {}", color_mode(header.color_id));

    for (label, value) in [
        ("Observer:", &header.observer),
        ("Telescope:", &header.telescope),
        ("Instrument:", &header.instrument),
    ] {
        if !value.is_empty() {
            println!("{:<13}{}", label, value);
        }
    }

    if let (Some(first), Some(last)) = (
        reader.frame_timestamp(0),
        total.checked_sub(1).and_then(|i| reader.frame_timestamp(i)),
    ) {
        println!("First frame: {}", first.format("%Y-%m-%d %H:%M:%S%.3f UTC"));
        println!("Last frame:  {}", last.format("%Y-%m-%d %H:%M:%S%.3f UTC"));
    }

    if let Some(frame_bytes) = header.frame_byte_size() {
        let total_mb = (frame_bytes * total) as f64 / (1024.0 * 1024.0);
        println!("Data size:   {:.1} MB", total_mb);
    }

    Ok(())
}

fn fits_info(path: &Path, list_cards: bool) -> Result<()> {
    let image = read_fits(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let (h, w, c) = image.data.dim();

    println!("File:        {}", path.display());
    println!("Dimensions:  {}x{}", w, h);
    println!("Channels:    {}", c);
    println!("BITPIX:      {}", image.bitpix);

    for key in ["DATE-OBS", "EXPTIME", "GAIN", "NFRAMES", "CAPTID"] {
        if let Some(value) = image.header.get(key) {
            println!("{:<13}{}", format!("{key}:"), render(value));
        }
    }

    if list_cards {
        println!();
        for card in image.header.cards() {
            match &card.comment {
                Some(comment) => println!("  {:<8} = {} / {}", card.key, render(&card.value), comment),
                None => println!("  {:<8} = {}", card.key, render(&card.value)),
            }
        }
    }

    Ok(())
}

fn image_info(path: &Path) -> Result<()> {
    let pixels = load_image(path).with_context(|| format!("Failed to load {}", path.display()))?;
    let (h, w, c) = pixels.dim();

    println!("File:        {}", path.display());
    println!("Dimensions:  {}x{}", w, h);
    println!("Channels:    {}", c);
    println!("Bit depth:   {}", pixels.bit_depth());
    Ok(())
}

fn render(value: &HeaderValue) -> String {
    match value {
        HeaderValue::Bool(b) => (if *b { "T" } else { "F" }).to_string(),
        HeaderValue::Int(i) => i.to_string(),
        HeaderValue::Float(v) => v.to_string(),
        HeaderValue::Str(s) => format!("'{s}'"),
    }
}

fn color_mode(color_id: i32) -> &'static str {
    match color_id {
        0 => "MONO",
        8 => "BAYER_RGGB",
        9 => "BAYER_GRBG",
        10 => "BAYER_GBRG",
        11 => "BAYER_BGGR",
        100 => "RGB",
        101 => "BGR",
        _ => "unknown",
    }
}
