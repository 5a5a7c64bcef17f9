#![deny(warnings)]

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use interview_tone_core::config::{AppConfig, ConfigOverrides, StdEnv};
use interview_tone_core::decode::decode_file;
use interview_tone_core::replay::replay;
use interview_tone_core::report::{to_json_pretty, SummaryReport};
use interview_tone_core::tone::{AggregateAnalysis, ToneAnalysis};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "interview-tone")]
#[command(about = "Voice tone analysis for mock interview answers")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[arg(long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Analyze the microphone live until Ctrl-C (or --duration-secs)
    Listen {
        /// Input device name; defaults to TONE_INPUT_DEVICE, then the system default
        #[arg(long)]
        device: Option<String>,

        #[arg(long)]
        duration_secs: Option<u64>,

        /// Print the available input devices and exit
        #[arg(long)]
        list_devices: bool,

        #[command(flatten)]
        analysis: AnalysisArgs,
    },
    /// Replay a recorded answer through the analyzer
    Analyze {
        path: PathBuf,

        #[command(flatten)]
        analysis: AnalysisArgs,
    },
}

#[derive(Args, Debug)]
struct AnalysisArgs {
    #[arg(long)]
    frame_rate_hz: Option<u32>,

    /// every-frame or once-per-episode
    #[arg(long)]
    pause_counting: Option<String>,

    #[arg(long)]
    silence_threshold: Option<f32>,

    /// Analyser smoothing in [0, 1); 0 disables it
    #[arg(long)]
    smoothing: Option<f32>,

    /// Print the summary as JSON instead of text
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level)?;

    match cli.command {
        Command::Listen {
            device,
            duration_secs,
            list_devices,
            analysis,
        } => {
            if list_devices {
                return print_devices();
            }
            let cfg = build_config(&analysis, device)?;
            let summary = run_listen(cfg, duration_secs.map(Duration::from_secs)).await?;
            print_summary(&summary, analysis.json)
        }
        Command::Analyze { path, analysis } => {
            let cfg = build_config(&analysis, None)?;
            let audio = decode_file(&path)
                .with_context(|| format!("failed to decode {}", path.display()))?;
            tracing::info!(
                sample_rate = audio.sample_rate,
                channels = audio.source_channels,
                duration_secs = audio.duration().as_secs_f32(),
                "decoded input"
            );
            let outcome = replay(&audio, cfg.analyzer, |a: &ToneAnalysis| {
                tracing::debug!(
                    volume = a.volume,
                    pitch = a.pitch,
                    clarity = a.clarity,
                    confidence = a.confidence,
                    "frame"
                )
            })?;
            print_summary(&outcome.aggregate, analysis.json)
        }
    }
}

#[cfg(feature = "microphone")]
async fn run_listen(cfg: AppConfig, limit: Option<Duration>) -> anyhow::Result<AggregateAnalysis> {
    use interview_tone_core::capture::{CaptureSource, MicrophoneSource};
    use interview_tone_core::schedule;
    use interview_tone_core::tone::ToneAnalyzer;

    let source = match cfg.input_device.as_deref() {
        Some(name) => MicrophoneSource::new().with_device_name(name),
        None => MicrophoneSource::new(),
    };
    let stream = source.open().await.context("failed to open microphone")?;

    let mut analyzer = ToneAnalyzer::new(
        cfg.analyzer.clone(),
        log_every(u64::from(cfg.analyzer.frame_rate.hz)),
    )?;
    analyzer.start(stream)?;
    let handle = schedule::spawn(analyzer);
    tracing::info!("listening; press Ctrl-C to finish");

    match limit {
        Some(limit) => tokio::select! {
            r = tokio::signal::ctrl_c() => r?,
            _ = tokio::time::sleep(limit) => {}
        },
        None => tokio::signal::ctrl_c().await?,
    }

    let summary = handle
        .stop()
        .context("session ended before a summary was produced")?;
    handle.join().await;
    Ok(summary)
}

#[cfg(not(feature = "microphone"))]
async fn run_listen(_cfg: AppConfig, _limit: Option<Duration>) -> anyhow::Result<AggregateAnalysis> {
    anyhow::bail!("built without microphone support; rebuild with --features microphone")
}

#[cfg(feature = "microphone")]
fn print_devices() -> anyhow::Result<()> {
    let devices = interview_tone_core::capture::list_input_devices()?;
    if devices.is_empty() {
        println!("no input devices found");
    }
    for name in devices {
        println!("{name}");
    }
    Ok(())
}

#[cfg(not(feature = "microphone"))]
fn print_devices() -> anyhow::Result<()> {
    anyhow::bail!("built without microphone support; rebuild with --features microphone")
}

/// Logs one live snapshot per `every` frames (about once a second).
#[cfg(feature = "microphone")]
fn log_every(every: u64) -> impl FnMut(&ToneAnalysis) + Send + 'static {
    let every = every.max(1);
    let mut seen = 0u64;
    move |a: &ToneAnalysis| {
        seen += 1;
        if seen % every == 0 {
            tracing::info!(
                volume = a.volume,
                pitch = a.pitch,
                clarity = a.clarity,
                confidence = a.confidence,
                pace = a.metrics.pace,
                energy = a.metrics.energy,
                "tone"
            );
        }
    }
}

fn print_summary(summary: &AggregateAnalysis, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", to_json_pretty(summary)?);
    } else {
        println!("{}", SummaryReport::from_aggregate(summary));
    }
    Ok(())
}

fn init_tracing(level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::builder()
        .with_default_directive(
            level
                .parse()
                .with_context(|| format!("invalid --log-level: {level}"))?,
        )
        .from_env_lossy();

    tracing_subscriber::fmt().with_env_filter(filter).init();
    Ok(())
}

fn build_config(args: &AnalysisArgs, device: Option<String>) -> anyhow::Result<AppConfig> {
    let overrides = ConfigOverrides {
        frame_rate_hz: args.frame_rate_hz,
        pause_counting: args.pause_counting.clone(),
        silence_threshold: args.silence_threshold,
        smoothing: args.smoothing,
        input_device: device,
    };
    let cfg = AppConfig::resolve(overrides, &StdEnv).context("invalid configuration")?;

    tracing::info!(
        frame_rate_hz = cfg.analyzer.frame_rate.hz,
        pause_counting = %cfg.analyzer.pause_counting,
        silence_threshold = cfg.analyzer.silence_threshold,
        smoothing = cfg.analyzer.smoothing,
        "config loaded"
    );
    Ok(cfg)
}
