//! Render motion highlights and optical flow of a video as images

use clap::*;
use log::*;
use ofvis::prelude::v1::{Result, *};
use std::io::{BufRead, Write};

fn main() -> Result<()> {
    env_logger::init();

    let matches = Command::new("flow-render")
        .version(crate_version!())
        .about(crate_description!())
        .arg(
            Arg::new("input")
                .long("input")
                .short('i')
                .help("Video file, or directory of frame images")
                .takes_value(true)
                .required(true),
        )
        .arg(
            Arg::new("mode")
                .long("mode")
                .short('m')
                .help("difference, farneback, lucas-kanade or horn-schunck")
                .takes_value(true),
        )
        .arg(
            Arg::new("width")
                .long("width")
                .short('W')
                .takes_value(true),
        )
        .arg(
            Arg::new("height")
                .long("height")
                .short('H')
                .takes_value(true),
        )
        .arg(
            Arg::new("interval")
                .long("interval")
                .short('s')
                .help("Frames between saved snapshots")
                .takes_value(true),
        )
        .arg(
            Arg::new("alpha")
                .long("alpha")
                .short('a')
                .help("Horn-Schunck smoothness weight")
                .takes_value(true),
        )
        .arg(
            Arg::new("iterations")
                .long("iterations")
                .short('n')
                .help("Horn-Schunck iteration count")
                .takes_value(true),
        )
        .arg(
            Arg::new("output")
                .long("output")
                .short('o')
                .takes_value(true),
        )
        .arg(
            Arg::new("max-frames")
                .long("max-frames")
                .help("Stop after this many frames, the way to end a headless difference run")
                .takes_value(true),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .help("JSON configuration file, overridden by the other flags")
                .takes_value(true),
        )
        .arg(
            Arg::new("display")
                .long("display")
                .short('d')
                .help("Show frames in a window while processing"),
        )
        .get_matches();

    let input = matches
        .value_of("input")
        .ok_or_else(|| anyhow!("no input given"))?;

    let mut config = match matches.value_of("config") {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    if let Some(mode) = matches.value_of("mode") {
        config.mode = Some(mode.parse()?);
    }
    if let Some(width) = matches.value_of("width") {
        config.width = width.parse()?;
    }
    if let Some(height) = matches.value_of("height") {
        config.height = height.parse()?;
    }
    if let Some(interval) = matches.value_of("interval") {
        config.snapshot_interval = Some(interval.parse()?);
    }
    if let Some(alpha) = matches.value_of("alpha") {
        config.alpha = alpha.parse()?;
    }
    if let Some(iterations) = matches.value_of("iterations") {
        config.iterations = iterations.parse()?;
    }
    if let Some(output) = matches.value_of("output") {
        config.output_dir = output.into();
    }
    if let Some(max_frames) = matches.value_of("max-frames") {
        config.max_frames = Some(max_frames.parse()?);
    }
    if matches.occurrences_of("display") > 0 {
        config.display = true;
    }

    config.validate()?;

    // The choice is made before the input is opened.
    let mode = match config.mode {
        Some(mode) => mode,
        None => prompt_mode()?,
    };

    if runs_unbounded(mode, &config) {
        warn!("{mode} replays the input until stopped, use --max-frames or --display to end it");
    }

    let source = frame_loader::create_source(input)?;
    let estimator = frame_loader::create_estimator(mode, &config);

    info!(
        "Running {mode} on {input} at {}x{}",
        config.width, config.height
    );

    let summary = if config.display {
        run_display(source, estimator, mode, &config)?
    } else {
        Pipeline::new(source, FileSink::new(), estimator, mode, &config)?.run()?
    };

    if summary.write_failures > 0 {
        warn!("{} snapshots could not be written", summary.write_failures);
    }

    let saved_to = match mode {
        Mode::Difference => config.output_dir.clone(),
        _ => config.output_dir.join(mode.name()),
    };

    println!(
        "Processing complete! {} frames processed, {} images saved in '{}'.",
        summary.frames,
        summary.snapshots,
        saved_to.display()
    );

    Ok(())
}

#[cfg(feature = "opencv")]
fn run_display(
    source: Box<dyn FrameSource>,
    estimator: Box<dyn Estimator>,
    mode: Mode,
    config: &Config,
) -> Result<RunSummary> {
    let sink = frame_loader::CvDisplaySink::new(format!("flow-render: {mode}"));
    Pipeline::new(source, sink, estimator, mode, config)?.run()
}

#[cfg(not(feature = "opencv"))]
fn run_display(
    source: Box<dyn FrameSource>,
    estimator: Box<dyn Estimator>,
    mode: Mode,
    config: &Config,
) -> Result<RunSummary> {
    warn!("Display requires the opencv feature, only writing images");
    Pipeline::new(source, FileSink::new(), estimator, mode, config)?.run()
}

/// Whether nothing but killing the process can end the run.
///
/// Looping runs end when the display window closes or after `max_frames`.
fn runs_unbounded(mode: Mode, config: &Config) -> bool {
    mode.loops() && !config.display && config.max_frames.is_none()
}

fn menu_label(mode: Mode) -> &'static str {
    match mode {
        Mode::Difference => "Motion highlight (frame difference)",
        Mode::Farneback => "Farneback",
        Mode::LucasKanade => "Lucas-Kanade",
        Mode::HornSchunck => "Horn-Schunck",
    }
}

/// Ask for a mode on stdin.
fn prompt_mode() -> Result<Mode> {
    let mut stdout = std::io::stdout();

    writeln!(stdout, "Choose the optical flow method:")?;
    for mode in [
        Mode::Farneback,
        Mode::LucasKanade,
        Mode::HornSchunck,
        Mode::Difference,
    ] {
        writeln!(stdout, "{} - {}", mode.menu_index(), menu_label(mode))?;
    }
    write!(stdout, "Enter the number of the method: ")?;
    stdout.flush()?;

    let mut choice = String::new();
    std::io::stdin().lock().read_line(&mut choice)?;

    parse_choice(&choice)
}

fn parse_choice(choice: &str) -> Result<Mode> {
    let mode = choice.trim().parse::<Mode>()?;
    debug!("Selected {mode}");
    Ok(mode)
}
