use std::path::Path;

use astrolive_core::acquisition::config::{StackMethod, StackingConfig};
use astrolive_core::acquisition::{AcquisitionStatistics, Stage};
use astrolive_core::AcquisitionConfig;
use console::Style;

struct Styles {
    title: Style,
    header: Style,
    label: Style,
    value: Style,
    method: Style,
    disabled: Style,
    path: Style,
}

impl Styles {
    fn new() -> Self {
        Self {
            title: Style::new().cyan().bold(),
            header: Style::new().cyan().bold(),
            label: Style::new().dim(),
            value: Style::new().bold().white(),
            method: Style::new().green(),
            disabled: Style::new().dim().yellow(),
            path: Style::new().underlined(),
        }
    }
}

fn print_title(s: &Styles, title: &str) {
    println!();
    println!("  {}", s.title.apply_to(title));
    println!("  {}", s.title.apply_to("\u{2550}".repeat(title.chars().count())));
    println!();
}

pub fn print_run_summary(config: &AcquisitionConfig) {
    let s = Styles::new();
    print_title(&s, "Astrolive Acquisition");

    if let Some(ref source) = config.camera.source {
        println!(
            "  {:<14}{}",
            s.label.apply_to("Source"),
            s.path.apply_to(source.display())
        );
    }
    println!(
        "  {:<14}{}",
        s.label.apply_to("Output"),
        s.path.apply_to(config.output_dir.display())
    );
    println!(
        "  {:<14}{}",
        s.label.apply_to("Interval"),
        s.value.apply_to(format!("{:.1} s", config.capture_interval_s))
    );
    let formats = if config.write_scientific {
        format!("{} + FITS", config.display_format)
    } else {
        config.display_format.to_string()
    };
    if config.save_frames {
        println!(
            "  {:<14}{}",
            s.label.apply_to("Save"),
            s.method.apply_to(formats)
        );
    } else {
        println!(
            "  {:<14}{}",
            s.label.apply_to("Save"),
            s.disabled.apply_to("disabled")
        );
    }
    println!();

    // Plate solving
    println!("  {}", s.header.apply_to("Plate Solving"));
    match (&config.solver.astap_path, config.auto_solve) {
        (Some(path), true) => {
            println!(
                "    {:<12}{}",
                s.label.apply_to("ASTAP"),
                s.path.apply_to(path.display())
            );
            println!(
                "    {:<12}{}",
                s.label.apply_to("Every"),
                s.value.apply_to(format!("{:.0} s", config.min_solve_interval_s))
            );
        }
        _ => println!(
            "    {:<12}{}",
            s.label.apply_to("Solver"),
            s.disabled.apply_to("disabled")
        ),
    }
    println!();

    if config.stacking.enabled {
        print_stacking_section(&s, &config.stacking);
        println!(
            "    {:<12}{}",
            s.label.apply_to("Rollover"),
            s.value.apply_to(format!("{:.0} s", config.stacking.write_interval_s))
        );
        println!(
            "    {:<12}{}",
            s.label.apply_to("Stacks"),
            s.path.apply_to(config.stack_dir().display())
        );
    } else {
        println!(
            "  {:<14}{}",
            s.header.apply_to("Stacking"),
            s.disabled.apply_to("disabled")
        );
    }
    println!();
}

pub fn print_stack_summary(config: &StackingConfig, input: &Path, total: usize) {
    let s = Styles::new();
    print_title(&s, "Astrolive Stack");

    println!(
        "  {:<14}{}",
        s.label.apply_to("Input"),
        s.path.apply_to(input.display())
    );
    println!(
        "  {:<14}{}",
        s.label.apply_to("Frames"),
        s.value.apply_to(total)
    );
    println!();
    print_stacking_section(&s, config);
    println!();
}

fn print_stacking_section(s: &Styles, config: &StackingConfig) {
    println!("  {}", s.header.apply_to("Stacking"));
    println!(
        "    {:<12}{}",
        s.label.apply_to("Method"),
        s.method.apply_to(config.method)
    );
    if config.method == StackMethod::Median {
        if config.sigma_clip.enabled {
            println!(
                "    {:<12}{}",
                s.label.apply_to("Sigma"),
                s.value.apply_to(config.sigma_clip.sigma)
            );
        } else {
            println!(
                "    {:<12}{}",
                s.label.apply_to("Sigma"),
                s.disabled.apply_to("disabled")
            );
        }
    }
    println!(
        "    {:<12}{}",
        s.label.apply_to("Alignment"),
        s.method.apply_to(config.align)
    );
    let window = if config.max_frames == 0 {
        "unbounded".to_string()
    } else {
        format!("{} frames", config.max_frames)
    };
    println!(
        "    {:<12}{}",
        s.label.apply_to("Window"),
        s.value.apply_to(window)
    );
}

pub fn print_statistics(stats: &AcquisitionStatistics) {
    let s = Styles::new();
    print_title(&s, "Session");

    println!(
        "  {:<14}{}",
        s.label.apply_to("Captured"),
        s.value.apply_to(stats.capture_count)
    );
    println!(
        "  {:<14}{}",
        s.label.apply_to("Skipped"),
        s.value.apply_to(stats.skipped_cycles)
    );
    println!(
        "  {:<14}{}",
        s.label.apply_to("Solved"),
        s.value
            .apply_to(format!("{}/{}", stats.successful_solves, stats.solve_count))
    );
    if let Some(ref result) = stats.last_result {
        println!(
            "  {:<14}{}",
            s.label.apply_to("Last solve"),
            s.method.apply_to(result)
        );
    }
    println!();

    println!("  {}", s.header.apply_to("Timings (min/avg/max)"));
    for stage in Stage::ALL {
        let summary = stats.timings.stage(stage);
        if summary.samples == 0 {
            println!(
                "    {:<12}{}",
                s.label.apply_to(stage.name()),
                s.disabled.apply_to("no samples")
            );
        } else {
            println!(
                "    {:<12}{}",
                s.label.apply_to(stage.name()),
                s.value.apply_to(summary)
            );
        }
    }
    println!();
}
