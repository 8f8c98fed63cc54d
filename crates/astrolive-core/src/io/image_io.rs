use std::io::{Seek, Write};
use std::path::{Path, PathBuf};

use image::{DynamicImage, ImageBuffer, ImageFormat, Luma, Rgb, Rgba};
use ndarray::{Array2, Array3};

use crate::error::{AstroliveError, Result, WriteError};
use crate::frame::PixelData;
use crate::io::fits;

/// Encode an 8-bit (h, w, c) array. One, three and four channels are supported.
pub fn encode_u8<W: Write + Seek>(
    data: &Array3<u8>,
    format: ImageFormat,
    w: &mut W,
) -> std::result::Result<(), WriteError> {
    let (h, wd, c) = data.dim();
    let raw: Vec<u8> = data.as_standard_layout().iter().copied().collect();
    let img = match c {
        1 => DynamicImage::ImageLuma8(buffer::<Luma<u8>>(wd, h, raw, format)?),
        3 => DynamicImage::ImageRgb8(buffer::<Rgb<u8>>(wd, h, raw, format)?),
        4 => DynamicImage::ImageRgba8(buffer::<Rgba<u8>>(wd, h, raw, format)?),
        channels => return Err(unsupported(format, channels)),
    };
    img.write_to(w, format)?;
    Ok(())
}

fn buffer<P: image::Pixel>(
    width: usize,
    height: usize,
    raw: Vec<P::Subpixel>,
    format: ImageFormat,
) -> std::result::Result<ImageBuffer<P, Vec<P::Subpixel>>, WriteError> {
    ImageBuffer::from_raw(width as u32, height as u32, raw)
        .ok_or_else(|| unsupported(format, P::CHANNEL_COUNT as usize))
}

fn unsupported(format: ImageFormat, channels: usize) -> WriteError {
    let name = match format {
        ImageFormat::Png => "PNG",
        ImageFormat::Tiff => "TIFF",
        _ => "image",
    };
    WriteError::UnsupportedLayout {
        format: name,
        channels,
    }
}

/// 8-bit copy for display formats.
///
/// 8-bit data is kept unchanged; deeper data is stretched linearly from its
/// own minimum/maximum onto 0..255.
pub fn to_display_u8(pixels: &PixelData) -> Array3<u8> {
    match pixels {
        PixelData::U8(a) => a.clone(),
        PixelData::U16(a) => stretch(&a.mapv(f32::from), u8::MAX as f32).mapv(|v| v as u8),
        PixelData::F32(a) => stretch(a, u8::MAX as f32).mapv(|v| v as u8),
    }
}

/// 16-bit copy for the scientific format.
///
/// 8-bit samples are widened without scaling, 16-bit data is kept and float
/// data is stretched from its own minimum/maximum onto 0..65535.
pub fn to_scientific_u16(pixels: &PixelData) -> Array3<u16> {
    match pixels {
        PixelData::U8(a) => a.mapv(u16::from),
        PixelData::U16(a) => a.clone(),
        PixelData::F32(a) => stretch(a, u16::MAX as f32).mapv(|v| v as u16),
    }
}

fn stretch(data: &Array3<f32>, top: f32) -> Array3<f32> {
    let (lo, hi) = data
        .iter()
        .filter(|v| v.is_finite())
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    if hi <= lo {
        return data.mapv(|v| if v.is_finite() { v.clamp(0.0, top) } else { 0.0 });
    }
    let scale = top / (hi - lo);
    data.mapv(|v| {
        if v.is_finite() {
            ((v - lo) * scale).clamp(0.0, top)
        } else {
            0.0
        }
    })
}

/// Load an image file at its native bit depth.
///
/// FITS files are read with the crate's own reader; everything else goes
/// through `image`. Gray stays single-channel, color becomes RGB.
pub fn load_image(path: &Path) -> Result<PixelData> {
    if is_fits(path) {
        return Ok(PixelData::U16(fits::read_fits(path)?.data));
    }

    let img = image::open(path)?;
    let (w, h) = (img.width() as usize, img.height() as usize);
    let pixels = match img.color() {
        image::ColorType::L8 | image::ColorType::La8 => {
            let gray = img.to_luma8().into_raw();
            PixelData::mono_u8(array2(h, w, gray)?)
        }
        image::ColorType::L16 | image::ColorType::La16 => {
            let gray = img.to_luma16().into_raw();
            PixelData::mono_u16(array2(h, w, gray)?)
        }
        image::ColorType::Rgb16 | image::ColorType::Rgba16 => {
            PixelData::U16(array3(h, w, img.to_rgb16().into_raw())?)
        }
        _ => PixelData::U8(array3(h, w, img.to_rgb8().into_raw())?),
    };
    Ok(pixels)
}

/// Pixel dimensions (width, height) without decoding the whole image.
pub fn image_dimensions(path: &Path) -> Result<(u32, u32)> {
    if is_fits(path) {
        return fits::read_fits_dimensions(path);
    }
    Ok(image::image_dimensions(path)?)
}

/// Extensions accepted when scanning a directory for frames.
pub fn is_supported_image(path: &Path) -> bool {
    matches!(
        extension(path).as_deref(),
        Some("png" | "tif" | "tiff" | "jpg" | "jpeg" | "bmp" | "fit" | "fits" | "fts")
    )
}

/// Supported image files directly inside `dir`, sorted by name.
pub fn list_images(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && is_supported_image(p))
        .collect();
    files.sort();
    Ok(files)
}

pub fn is_fits(path: &Path) -> bool {
    matches!(extension(path).as_deref(), Some("fit" | "fits" | "fts"))
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
}

fn array2<T>(h: usize, w: usize, raw: Vec<T>) -> Result<Array2<T>> {
    Array2::from_shape_vec((h, w), raw).map_err(|_| AstroliveError::InvalidDimensions {
        width: w as u32,
        height: h as u32,
    })
}

fn array3<T>(h: usize, w: usize, raw: Vec<T>) -> Result<Array3<T>> {
    Array3::from_shape_vec((h, w, 3), raw).map_err(|_| AstroliveError::InvalidDimensions {
        width: w as u32,
        height: h as u32,
    })
}
