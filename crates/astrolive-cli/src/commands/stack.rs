use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use astrolive_core::acquisition::config::{AlignMode, SigmaClipConfig, StackMethod, StackingConfig};
use astrolive_core::frame::PixelData;
use astrolive_core::io::image_io::{list_images, load_image};
use astrolive_core::io::SerReader;
use astrolive_core::stack::{FrameAlignment, StackingEngine};
use clap::{Args, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};

use crate::summary;

#[derive(Clone, Copy, ValueEnum)]
pub enum StackMethodArg {
    Median,
    Mean,
}

impl From<StackMethodArg> for StackMethod {
    fn from(arg: StackMethodArg) -> Self {
        match arg {
            StackMethodArg::Median => StackMethod::Median,
            StackMethodArg::Mean => StackMethod::Mean,
        }
    }
}

#[derive(Args)]
pub struct StackArgs {
    /// Directory of frames or a SER file
    pub input: PathBuf,

    /// Stacking method
    #[arg(long, value_enum, default_value = "median")]
    pub method: StackMethodArg,

    /// Sigma threshold for outlier rejection (median mode)
    #[arg(long, default_value = "3.0")]
    pub sigma: f32,

    /// Disable sigma clipping
    #[arg(long)]
    pub no_clip: bool,

    /// Disable star-based alignment
    #[arg(long)]
    pub no_align: bool,

    /// Keep only the newest N frames (0 = all)
    #[arg(long, default_value = "0")]
    pub max_frames: usize,

    /// Output directory
    #[arg(short, long, default_value = ".")]
    pub output: PathBuf,

    /// Base name of the written snapshot
    #[arg(long, default_value = "stack")]
    pub name: String,
}

/// Source of frames for an offline stack.
enum FrameSource {
    Ser(SerReader),
    Files(Vec<PathBuf>),
}

impl FrameSource {
    fn open(input: &Path) -> Result<Self> {
        if input.is_dir() {
            let files = list_images(input)
                .with_context(|| format!("Failed to list {}", input.display()))?;
            if files.is_empty() {
                bail!("No image files in {}", input.display());
            }
            return Ok(Self::Files(files));
        }
        let reader = SerReader::open(input)
            .with_context(|| format!("Failed to open SER file {}", input.display()))?;
        Ok(Self::Ser(reader))
    }

    fn len(&self) -> usize {
        match self {
            Self::Ser(reader) => reader.frame_count(),
            Self::Files(files) => files.len(),
        }
    }

    fn frame(&self, index: usize) -> Result<PixelData> {
        match self {
            Self::Ser(reader) => Ok(reader.read_frame(index)?),
            Self::Files(files) => load_image(&files[index])
                .with_context(|| format!("Failed to load {}", files[index].display())),
        }
    }
}

pub fn run(args: &StackArgs) -> Result<()> {
    let source = FrameSource::open(&args.input)?;
    let total = source.len();

    let config = StackingConfig {
        enabled: true,
        method: args.method.into(),
        sigma_clip: SigmaClipConfig {
            enabled: !args.no_clip,
            sigma: args.sigma,
        },
        max_frames: args.max_frames,
        align: if args.no_align {
            AlignMode::None
        } else {
            AlignMode::FeatureBased
        },
        ..StackingConfig::default()
    };
    summary::print_stack_summary(&config, &args.input, total);

    let engine = StackingEngine::new(config, &args.output);

    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("Stacking [{bar:40}] {pos}/{len}")?
            .progress_chars("=> "),
    );

    let mut unaligned = 0usize;
    for index in 0..total {
        let pixels = source.frame(index)?;
        if let Some(outcome) = engine.add_frame(&pixels) {
            if outcome.alignment == FrameAlignment::Failed {
                unaligned += 1;
            }
        }
        pb.set_position(index as u64 + 1);
    }
    pb.finish();

    if unaligned > 0 {
        println!("{} frame(s) could not be aligned and were stacked as-is", unaligned);
    }

    let Some(snapshot) = engine.write_snapshot(&args.name, true, true)? else {
        bail!("No frames were stacked");
    };

    println!("Stacked {} frames", snapshot.frame_count);
    for path in [&snapshot.preview_path, &snapshot.fits_path].into_iter().flatten() {
        println!("Saved to {}", path.display());
    }
    Ok(())
}
