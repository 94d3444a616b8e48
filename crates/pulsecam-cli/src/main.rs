use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use pulsecam_signals::synthetic::{ambient_frame, timestamp_ms, FingerSignal};
use pulsecam_signals::{PipelineConfig, PpgPipeline, ReferenceData};

#[derive(Parser)]
#[command(name = "pulsecam", about = "Camera PPG pipeline driver")]
struct Cli {
    /// TOML configuration file (PULSECAM_* env overrides are applied on top)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline over a synthetic fingertip recording
    Simulate {
        #[arg(long, default_value_t = 72.0)]
        bpm: f32,
        #[arg(long, default_value_t = 20)]
        seconds: u32,
        #[arg(long, default_value_t = 64)]
        width: u32,
        #[arg(long, default_value_t = 48)]
        height: u32,
        /// Print one JSON record per frame instead of a summary
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Run a calibration session against synthetic frames
    Calibrate {
        #[arg(long, default_value_t = 72.0)]
        bpm: f32,
        /// Reference heart rate to attach to the session
        #[arg(long)]
        reference_bpm: Option<f32>,
    },
    /// Print the effective configuration as TOML
    Config {
        /// Only validate, print nothing on success
        #[arg(long, default_value_t = false)]
        check: bool,
    },
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig, Box<dyn std::error::Error>> {
    let config = match path {
        Some(p) => PipelineConfig::from_file_with_env(p)?,
        None => {
            let mut config = PipelineConfig::default();
            config.apply_env_overrides()?;
            config.validate()?;
            config
        }
    };
    Ok(config)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.cmd {
        Commands::Simulate {
            bpm,
            seconds,
            width,
            height,
            json,
        } => simulate(config, bpm, seconds, width, height, json)?,
        Commands::Calibrate { bpm, reference_bpm } => calibrate(config, bpm, reference_bpm)?,
        Commands::Config { check } => {
            if !check {
                print!("{}", config.to_toml_string()?);
            } else {
                log::info!("Configuration is valid");
            }
        }
    }
    Ok(())
}

fn simulate(
    config: PipelineConfig,
    bpm: f32,
    seconds: u32,
    width: u32,
    height: u32,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let source = FingerSignal {
        heart_rate_bpm: bpm,
        fps: config.sample_rate_hz,
        ..FingerSignal::default()
    };
    let frames = (seconds as f32 * source.fps).round() as usize;

    let mut pipeline = PpgPipeline::new(config)?;
    pipeline.start();

    let mut peaks = 0usize;
    let mut last_bpm = None;
    let mut last_quality = 0.0;
    for i in 0..frames {
        let signal = match pipeline.process_frame(&source.frame(i, width, height)) {
            Ok(signal) => signal,
            Err(err) => {
                log::warn!("frame {} skipped: {}", i, err);
                continue;
            }
        };
        if signal.peak.is_some() {
            peaks += 1;
        }
        last_bpm = signal.heart_rate_bpm.or(last_bpm);
        last_quality = signal.quality;
        if json {
            println!("{}", serde_json::to_string(&signal)?);
        }
    }

    if json {
        return Ok(());
    }
    println!("frames:        {}", frames);
    println!("peaks:         {}", peaks);
    match last_bpm {
        Some(v) => println!("heart rate:    {:.1} BPM (source {:.1})", v, bpm),
        None => println!("heart rate:    n/a"),
    }
    if let Some(v) = pipeline.session_bpm() {
        println!("session rate:  {:.1} BPM", v);
    }
    if let Some(hrv) = pipeline.hrv() {
        println!(
            "hrv:           mean RR {:.0} ms, SDNN {:.1} ms, RMSSD {:.1} ms",
            hrv.mean_rr_ms, hrv.sdnn_ms, hrv.rmssd_ms
        );
    }
    println!("quality:       {:.0}", last_quality);
    Ok(())
}

fn calibrate(
    config: PipelineConfig,
    bpm: f32,
    reference_bpm: Option<f32>,
) -> Result<(), Box<dyn std::error::Error>> {
    let fps = config.sample_rate_hz;
    let cal = &config.calibration;
    // every phase may use all of its extensions
    let worst_case_ms = cal.baseline_ms
        + cal.finger_ms
        + cal.optimization_ms
        + cal.validation_ms
        + 4 * cal.max_extensions as i64 * cal.extension_ms;
    let max_frames = (worst_case_ms as f32 / 1000.0 * fps).ceil() as usize + 1;
    let baseline_frames = (cal.baseline_ms as f32 / 1000.0 * fps).round() as usize;

    let source = FingerSignal {
        heart_rate_bpm: bpm,
        fps,
        ..FingerSignal::default()
    };

    let mut pipeline = PpgPipeline::new(config)?;
    pipeline.start_calibration_mode();

    let mut i = 0;
    while pipeline.is_calibrating() && i < max_frames {
        let frame = if i <= baseline_frames {
            let mut f = ambient_frame(i, 64, 48);
            f.timestamp_ms = timestamp_ms(i, fps);
            f
        } else {
            source.frame(i, 64, 48)
        };
        pipeline.process_frame(&frame)?;
        i += 1;
    }

    let reference = reference_bpm.map(|hr| ReferenceData {
        heart_rate_bpm: Some(hr),
        ..ReferenceData::default()
    });
    match pipeline.end_calibration_mode(reference) {
        Some(result) => println!("{}", serde_json::to_string_pretty(&result)?),
        None => return Err("calibration did not complete".into()),
    }
    Ok(())
}
