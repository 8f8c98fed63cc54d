use std::path::{Path, PathBuf};

use image::ImageFormat;

use crate::error::WriteError;
use crate::frame::{FrameMetadata, FrameSample};
use crate::io::fits::{write_fits_u16, FitsHeader, HeaderValue};
use crate::io::image_io::{encode_u8, to_display_u8, to_scientific_u16};
use crate::io::write_atomically;

/// Persists captured frames.
pub trait FrameWriter: Send {
    /// Write `frame` to `path`; the format follows the file extension.
    fn save(
        &self,
        frame: &FrameSample,
        path: &Path,
        metadata: &FrameMetadata,
    ) -> Result<PathBuf, WriteError>;
}

/// Writes PNG/TIFF display copies and 16-bit FITS scientific copies to disk.
#[derive(Clone, Copy, Debug, Default)]
pub struct DiskFrameWriter;

impl FrameWriter for DiskFrameWriter {
    fn save(
        &self,
        frame: &FrameSample,
        path: &Path,
        metadata: &FrameMetadata,
    ) -> Result<PathBuf, WriteError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        match ext.as_str() {
            "fit" | "fits" | "fts" => {
                let data = to_scientific_u16(&frame.pixels);
                let header = frame_header(metadata);
                write_atomically(path, |w| {
                    write_fits_u16(w, &data, &header)?;
                    Ok(())
                })
            }
            "png" | "tif" | "tiff" => {
                let format = if ext == "png" {
                    ImageFormat::Png
                } else {
                    ImageFormat::Tiff
                };
                let data = to_display_u8(&frame.pixels);
                write_atomically(path, |w| encode_u8(&data, format, w))
            }
            other => Err(WriteError::UnsupportedFormat(other.to_string())),
        }
    }
}

/// FITS header cards describing a captured frame.
pub fn frame_header(metadata: &FrameMetadata) -> FitsHeader {
    let mut header = FitsHeader::new();
    if let Some(exposure) = metadata.exposure_s {
        header.set("EXPTIME", HeaderValue::Float(exposure), Some("Exposure time (s)"));
    }
    if let Some(gain) = metadata.gain {
        header.set("GAIN", HeaderValue::Float(gain), Some("Sensor gain"));
    }
    if let Some(offset) = metadata.offset {
        header.set("OFFSET", HeaderValue::Int(offset.into()), Some("Sensor offset"));
    }
    if let Some(binning) = metadata.binning {
        header.set("XBINNING", HeaderValue::Int(binning.into()), None);
        header.set("YBINNING", HeaderValue::Int(binning.into()), None);
    }
    if let Some(mode) = metadata.readout_mode {
        header.set("READOUTM", HeaderValue::Int(mode.into()), Some("Readout mode"));
    }
    if let Some(at) = metadata.captured_at {
        header.set(
            "DATE-OBS",
            HeaderValue::Str(at.format("%Y-%m-%dT%H:%M:%S%.3f").to_string()),
            Some("UTC start of capture"),
        );
    }
    if let Some(id) = metadata.capture_id {
        header.set("CAPTID", HeaderValue::Int(id as i64), Some("Capture id"));
    }
    header
}
