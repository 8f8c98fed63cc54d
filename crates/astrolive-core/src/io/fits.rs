//! Minimal FITS primary-HDU support for 8/16-bit integer images.
//!
//! Writes unsigned 16-bit data the standard way (`BITPIX = 16`,
//! `BZERO = 32768`) with one plane per channel (`NAXIS3`). The reader
//! understands what the writer produces plus plain 8-bit images, which is
//! enough for replaying captured frames and checking stack headers.

use std::fs::File;
use std::io::{self, BufReader, Read, Write};
use std::path::Path;

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use ndarray::Array3;

use crate::consts::{FITS_BLOCK_SIZE, FITS_CARD_SIZE};
use crate::error::{AstroliveError, Result};

const UNSIGNED_16_ZERO: i32 = 32_768;

/// Value of a single header card.
#[derive(Clone, Debug, PartialEq)]
pub enum HeaderValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl HeaderValue {
    fn render(&self) -> String {
        match self {
            Self::Bool(b) => format!("{:>20}", if *b { "T" } else { "F" }),
            Self::Int(i) => format!("{i:>20}"),
            Self::Float(v) => format!("{:>20}", format!("{v:?}").to_uppercase()),
            Self::Str(s) => {
                let escaped = s.replace('\'', "''");
                format!("'{escaped:<8}'")
            }
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            Self::Float(v) if v.fract() == 0.0 => Some(*v as i64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct HeaderCard {
    pub key: String,
    pub value: HeaderValue,
    pub comment: Option<String>,
}

/// Ordered list of header cards, excluding the structural keywords the
/// writer emits itself.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FitsHeader {
    cards: Vec<HeaderCard>,
}

impl FitsHeader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a card, replacing an earlier card with the same key.
    pub fn set(&mut self, key: &str, value: HeaderValue, comment: Option<&str>) {
        let key = key.to_ascii_uppercase();
        let card = HeaderCard {
            key: key.clone(),
            value,
            comment: comment.map(str::to_string),
        };
        match self.cards.iter_mut().find(|c| c.key == key) {
            Some(existing) => *existing = card,
            None => self.cards.push(card),
        }
    }

    pub fn get(&self, key: &str) -> Option<&HeaderValue> {
        self.cards
            .iter()
            .find(|c| c.key.eq_ignore_ascii_case(key))
            .map(|c| &c.value)
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(HeaderValue::as_i64)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(HeaderValue::as_f64)
    }

    pub fn cards(&self) -> &[HeaderCard] {
        &self.cards
    }
}

/// Image data and header read back from a FITS file.
#[derive(Clone, Debug)]
pub struct FitsImage {
    pub header: FitsHeader,
    /// Shape = (height, width, channels).
    pub data: Array3<u16>,
    pub bitpix: i64,
}

/// Write `data` as a 16-bit FITS primary HDU.
pub fn write_fits_u16<W: Write>(w: &mut W, data: &Array3<u16>, header: &FitsHeader) -> io::Result<()> {
    let (h, w_px, c) = data.dim();
    let mut cards: Vec<String> = Vec::new();

    cards.push(format_card("SIMPLE", &HeaderValue::Bool(true), Some("conforms to FITS standard")));
    cards.push(format_card("BITPIX", &HeaderValue::Int(16), Some("16-bit integers")));
    cards.push(format_card("NAXIS", &HeaderValue::Int(if c > 1 { 3 } else { 2 }), None));
    cards.push(format_card("NAXIS1", &HeaderValue::Int(w_px as i64), Some("width")));
    cards.push(format_card("NAXIS2", &HeaderValue::Int(h as i64), Some("height")));
    if c > 1 {
        cards.push(format_card("NAXIS3", &HeaderValue::Int(c as i64), Some("channels")));
    }
    cards.push(format_card("BZERO", &HeaderValue::Int(UNSIGNED_16_ZERO as i64), Some("unsigned 16-bit offset")));
    cards.push(format_card("BSCALE", &HeaderValue::Int(1), None));

    for card in header.cards() {
        if is_structural(&card.key) {
            continue;
        }
        cards.push(format_card(&card.key, &card.value, card.comment.as_deref()));
    }
    cards.push(format!("{:<80}", "END"));

    let mut header_bytes: Vec<u8> = cards.concat().into_bytes();
    pad_to_block(&mut header_bytes, b' ');
    w.write_all(&header_bytes)?;

    let mut body: Vec<u8> = Vec::with_capacity(h * w_px * c * 2);
    for channel in 0..c {
        for row in 0..h {
            for col in 0..w_px {
                let stored = (data[[row, col, channel]] as i32 - UNSIGNED_16_ZERO) as i16;
                body.write_i16::<BigEndian>(stored)?;
            }
        }
    }
    pad_to_block(&mut body, 0);
    w.write_all(&body)?;
    Ok(())
}

/// Read the primary HDU of a FITS file.
pub fn read_fits(path: &Path) -> Result<FitsImage> {
    let mut reader = BufReader::new(File::open(path)?);
    read_fits_from(&mut reader)
}

pub fn read_fits_from<R: Read>(reader: &mut R) -> Result<FitsImage> {
    let mut header = FitsHeader::new();
    let mut block = vec![0u8; FITS_BLOCK_SIZE];
    let mut first = true;

    'blocks: loop {
        reader.read_exact(&mut block)?;
        if first && !block.starts_with(b"SIMPLE") {
            return Err(AstroliveError::InvalidFits("missing SIMPLE keyword".into()));
        }
        first = false;
        for raw in block.chunks(FITS_CARD_SIZE) {
            let card = String::from_utf8_lossy(raw);
            let key = card.get(..8).unwrap_or_default().trim().to_string();
            if key == "END" {
                break 'blocks;
            }
            if key.is_empty() || card.get(8..10) != Some("= ") {
                continue;
            }
            let (value, comment) = parse_value(card.get(10..).unwrap_or_default())?;
            header.cards.push(HeaderCard { key, value, comment });
        }
    }

    let bitpix = require_int(&header, "BITPIX")?;
    let naxis = require_int(&header, "NAXIS")?;
    if !(2..=3).contains(&naxis) {
        return Err(AstroliveError::InvalidFits(format!("unsupported NAXIS = {naxis}")));
    }
    let width = require_int(&header, "NAXIS1")? as usize;
    let height = require_int(&header, "NAXIS2")? as usize;
    let channels = if naxis == 3 {
        require_int(&header, "NAXIS3")? as usize
    } else {
        1
    };
    let bzero = header.get_f64("BZERO").unwrap_or(0.0);

    let mut data = Array3::<u16>::zeros((height, width, channels));
    for channel in 0..channels {
        for row in 0..height {
            for col in 0..width {
                let value = match bitpix {
                    8 => reader.read_u8()? as f64 + bzero,
                    16 => reader.read_i16::<BigEndian>()? as f64 + bzero,
                    other => {
                        return Err(AstroliveError::InvalidFits(format!(
                            "unsupported BITPIX = {other}"
                        )))
                    }
                };
                data[[row, col, channel]] = value.clamp(0.0, u16::MAX as f64) as u16;
            }
        }
    }

    Ok(FitsImage { header, data, bitpix })
}

/// Width and height from a FITS header without decoding pixel data.
pub fn read_fits_dimensions(path: &Path) -> Result<(u32, u32)> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut block = vec![0u8; FITS_BLOCK_SIZE];
    let (mut width, mut height) = (None, None);
    loop {
        reader.read_exact(&mut block)?;
        for raw in block.chunks(FITS_CARD_SIZE) {
            let card = String::from_utf8_lossy(raw);
            let key = card.get(..8).unwrap_or_default().trim();
            match key {
                "END" => {
                    return match (width, height) {
                        (Some(w), Some(h)) => Ok((w, h)),
                        _ => Err(AstroliveError::InvalidFits("missing NAXIS1/NAXIS2".into())),
                    }
                }
                "NAXIS1" | "NAXIS2" => {
                    let (value, _) = parse_value(card.get(10..).unwrap_or_default())?;
                    let v = value.as_i64().unwrap_or(0) as u32;
                    if key == "NAXIS1" {
                        width = Some(v);
                    } else {
                        height = Some(v);
                    }
                }
                _ => {}
            }
        }
    }
}

fn require_int(header: &FitsHeader, key: &str) -> Result<i64> {
    header
        .get_i64(key)
        .ok_or_else(|| AstroliveError::InvalidFits(format!("missing {key}")))
}

fn is_structural(key: &str) -> bool {
    matches!(
        key,
        "SIMPLE" | "BITPIX" | "NAXIS" | "NAXIS1" | "NAXIS2" | "NAXIS3" | "BZERO" | "BSCALE" | "END"
    )
}

fn format_card(key: &str, value: &HeaderValue, comment: Option<&str>) -> String {
    let mut card = format!("{:<8}= {}", key, value.render());
    if let Some(comment) = comment {
        card.push_str(" / ");
        card.push_str(comment);
    }
    card.truncate(FITS_CARD_SIZE);
    format!("{card:<80}")
}

fn pad_to_block(buf: &mut Vec<u8>, fill: u8) {
    let rem = buf.len() % FITS_BLOCK_SIZE;
    if rem != 0 {
        buf.resize(buf.len() + FITS_BLOCK_SIZE - rem, fill);
    }
}

fn parse_value(field: &str) -> Result<(HeaderValue, Option<String>)> {
    let trimmed = field.trim_start();
    if let Some(rest) = trimmed.strip_prefix('\'') {
        // Quoted string; a doubled quote is an escaped quote.
        let mut value = String::new();
        let mut chars = rest.chars().peekable();
        while let Some(ch) = chars.next() {
            if ch == '\'' {
                if chars.peek() == Some(&'\'') {
                    value.push('\'');
                    chars.next();
                    continue;
                }
                break;
            }
            value.push(ch);
        }
        let remainder: String = chars.collect();
        return Ok((HeaderValue::Str(value.trim_end().to_string()), split_comment(&remainder)));
    }

    let (token, comment) = match trimmed.split_once('/') {
        Some((token, comment)) => (token.trim(), Some(comment.trim().to_string())),
        None => (trimmed.trim(), None),
    };
    let value = match token {
        "T" => HeaderValue::Bool(true),
        "F" => HeaderValue::Bool(false),
        t if t.contains(['.', 'E', 'e', 'D']) => HeaderValue::Float(
            t.replace('D', "E")
                .parse()
                .map_err(|_| AstroliveError::InvalidFits(format!("bad float value '{t}'")))?,
        ),
        t => HeaderValue::Int(
            t.parse()
                .map_err(|_| AstroliveError::InvalidFits(format!("bad integer value '{t}'")))?,
        ),
    };
    Ok((value, comment.filter(|c| !c.is_empty())))
}

fn split_comment(remainder: &str) -> Option<String> {
    remainder
        .split_once('/')
        .map(|(_, c)| c.trim().to_string())
        .filter(|c| !c.is_empty())
}
