use std::path::Path;

use console::Style;
use tuneframe_core::pipeline::{AssemblyConfig, AssemblyReport};
use tuneframe_core::quality::SlotOutcome;

struct Styles {
    title: Style,
    header: Style,
    label: Style,
    value: Style,
    method: Style,
    disabled: Style,
    path: Style,
    good: Style,
    warn: Style,
    bad: Style,
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
            good: Style::new().green().bold(),
            warn: Style::new().yellow().bold(),
            bad: Style::new().red().bold(),
        }
    }
}

pub fn print_run_summary(config: &AssemblyConfig, archive: &Path, output: &Path, kernel: &str) {
    let s = Styles::new();

    println!();
    println!("  {}", s.title.apply_to("Tuneframe Assembly"));
    println!("  {}", s.title.apply_to("\u{2550}".repeat(18)));
    println!();

    println!("  {:<14}{}", s.label.apply_to("Archive"), s.path.apply_to(archive.display()));
    println!("  {:<14}{}", s.label.apply_to("Output"), s.path.apply_to(output.display()));
    println!("  {:<14}{}", s.label.apply_to("Kernels"), s.method.apply_to(kernel));
    println!();

    println!("  {}", s.header.apply_to("Targets"));
    println!(
        "    {:<12}{}",
        s.label.apply_to("Range"),
        s.value.apply_to(format!("{:.1} .. {:.1} s", config.begin, config.end))
    );
    println!(
        "    {:<12}{}",
        s.label.apply_to("Step"),
        s.value.apply_to(format!("{:.1} s", config.step))
    );
    println!("    {:<12}{}", s.label.apply_to("Camera"), s.value.apply_to(config.camera));
    println!(
        "    {:<12}{}",
        s.label.apply_to("Reference"),
        s.value.apply_to(format!("wavelength {}", config.reference_wavelength))
    );
    println!();

    println!("  {}", s.header.apply_to("Interpolation"));
    println!(
        "    {:<12}{}",
        s.label.apply_to("Span"),
        s.value.apply_to(format!("{:.0} s", config.interpolation.averaging_span))
    );
    match config.interpolation.points {
        Some(points) => println!("    {:<12}{}", s.label.apply_to("Points"), s.value.apply_to(points)),
        None => println!("    {:<12}{}", s.label.apply_to("Points"), s.disabled.apply_to("from cadence")),
    }
    println!(
        "    {:<12}{}",
        s.label.apply_to("Window"),
        s.method.apply_to(config.interpolation.window_split)
    );
    println!();

    println!("  {}", s.header.apply_to("Expectations"));
    let e = &config.expectations;
    print_expectation(&s, "Cadence", e.cadence.map(|c| format!("{c:.1} s")));
    print_expectation(&s, "Channels", e.channels.map(|c| c.to_string()));
    print_expectation(&s, "Npol", e.npol.map(|c| c.to_string()));
    print_expectation(&s, "Pol type", e.polarization_type.map(|c| c.to_string()));
    println!();
}

fn print_expectation(s: &Styles, label: &str, value: Option<String>) {
    match value {
        Some(v) => println!("    {:<12}{}", s.label.apply_to(label), s.value.apply_to(v)),
        None => println!("    {:<12}{}", s.label.apply_to(label), s.disabled.apply_to("any")),
    }
}

pub fn print_report(report: &AssemblyReport) {
    let s = Styles::new();

    println!();
    println!("  {}", s.header.apply_to("Products"));
    println!(
        "    {:<12}{}",
        s.label.apply_to("Emitted"),
        s.good.apply_to(report.count(SlotOutcome::Emitted))
    );
    println!(
        "    {:<12}{}",
        s.label.apply_to("Degraded"),
        s.warn.apply_to(report.count(SlotOutcome::EmittedDegraded))
    );
    println!(
        "    {:<12}{}",
        s.label.apply_to("Empty"),
        s.bad.apply_to(report.count(SlotOutcome::EmittedEmpty))
    );
    println!(
        "    {:<12}{}",
        s.label.apply_to("Loaded"),
        s.value.apply_to(format!("{} frames", report.frames_loaded))
    );
    println!();

    for slot in &report.slots {
        let style = match slot.outcome {
            SlotOutcome::Emitted => &s.good,
            SlotOutcome::EmittedDegraded => &s.warn,
            SlotOutcome::EmittedEmpty => &s.bad,
        };
        let names = slot.quality.names().join(" ");
        println!(
            "    {:>10.1}  {:<20}{}  {}",
            slot.target_time,
            style.apply_to(slot.outcome),
            s.value.apply_to(slot.quality),
            s.label.apply_to(names)
        );
    }
    println!();
}
