//! voxhost CLI - drive the synthesis host from the command line
//!
//! Subcommands:
//! - `synth`: render one utterance
//! - `batch`: render a JSON manifest of utterances
//! - `post`: run post-processing jobs through the external audio tool
//! - `info`: show configuration and alphabets
//! - `init`: write freshly initialized checkpoints for smoke testing

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use voxhost::audio::{PostExecutor, PostJob};
use voxhost::models::{FastPitch, FastPitchDims, FrameVocoder, DEFAULT_HOP_LENGTH};
use voxhost::{
    format_legacy, ComputeDevice, ServiceConfig, SymbolAlphabet, SynthesisRequest,
    SynthesisService, VocoderChoice, FASTPITCH_KEY, VERSION,
};

/// voxhost - resident speech synthesis host
#[derive(Parser, Debug)]
#[command(name = "voxhost")]
#[command(author, version, about, long_about = None)]
#[command(long_about = "
voxhost keeps acoustic models and vocoders resident and renders symbol
sequences into waveform files.

Examples:
  # Write small random checkpoints and render a line with them
  voxhost init --output models
  voxhost synth --model models/narrator.safetensors --vocoder paired \\
      --text \"Hello there.\" --output hello.wav

  # Speed up and pad a set of files
  voxhost post --jobs jobs.json
")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Use CPU instead of GPU
    #[arg(long, global = true)]
    cpu: bool,

    /// Path to service config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Synthesize one utterance
    Synth {
        /// Acoustic model checkpoint
        #[arg(short, long)]
        model: PathBuf,

        /// Model type name (e.g. "FastPitch 1.1")
        #[arg(long, default_value = FASTPITCH_KEY)]
        model_type: String,

        /// Speaker table size of the checkpoint (0 = single speaker)
        #[arg(long, default_value = "0")]
        speakers: usize,

        /// Text to encode with the model's alphabet
        #[arg(short, long, conflicts_with = "symbols")]
        text: Option<String>,

        /// Comma-separated symbol ids
        #[arg(long)]
        symbols: Option<String>,

        /// Speaker row
        #[arg(long)]
        speaker: Option<u32>,

        /// Frame-duration scale
        #[arg(long, default_value = "1.0")]
        pace: f32,

        /// Comma-separated per-symbol pitch edits
        #[arg(long)]
        pitch: Option<String>,

        /// Comma-separated per-symbol duration edits, in frames
        #[arg(long)]
        durations: Option<String>,

        /// Symbol alphabet used to encode --text
        #[arg(long, default_value = "english_basic")]
        alphabet: SymbolAlphabet,

        /// Vocoder choice: bundled or paired
        #[arg(long, default_value = "bundled")]
        vocoder: VocoderChoice,

        /// Output audio file path
        #[arg(short, long, default_value = "output.wav")]
        output: PathBuf,
    },

    /// Synthesize every entry of a JSON manifest
    Batch {
        /// Acoustic model checkpoint
        #[arg(short, long)]
        model: PathBuf,

        /// Speaker table size of the checkpoint
        #[arg(long, default_value = "0")]
        speakers: usize,

        /// Manifest: a JSON array of requests, each with an "output" path
        #[arg(long)]
        manifest: PathBuf,

        /// Vocoder choice: bundled or paired
        #[arg(long, default_value = "bundled")]
        vocoder: VocoderChoice,
    },

    /// Run post-processing jobs
    Post {
        /// JSON array of {"input", "output", "options"} jobs
        #[arg(long)]
        jobs: PathBuf,

        /// Worker count (0 = available cores minus one)
        #[arg(long)]
        workers: Option<usize>,

        /// Audio filtering tool
        #[arg(long)]
        ffmpeg: Option<PathBuf>,
    },

    /// Show configuration and supported alphabets
    Info,

    /// Write freshly initialized checkpoints
    Init {
        /// Output directory
        #[arg(short, long, default_value = "models")]
        output: PathBuf,

        /// Checkpoint stem
        #[arg(long, default_value = "narrator")]
        name: String,

        /// Symbol alphabet
        #[arg(long, default_value = "english_basic")]
        alphabet: SymbolAlphabet,

        /// Speaker table size
        #[arg(long, default_value = "0")]
        speakers: usize,

        /// Mel channels
        #[arg(long, default_value = "80")]
        mel_channels: usize,
    },
}

#[derive(Debug, Deserialize)]
struct ManifestEntry {
    output: PathBuf,
    #[serde(flatten)]
    request: SynthesisRequest,
}

fn parse_list<T: std::str::FromStr>(raw: &str, what: &str) -> Result<Vec<T>>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.split(',')
        .map(|p| {
            p.trim()
                .parse::<T>()
                .with_context(|| format!("Invalid {} value: '{}'", what, p))
        })
        .collect()
}

fn load_config(cli: &Cli) -> Result<ServiceConfig> {
    let mut config = match &cli.config {
        Some(path) => ServiceConfig::load(path)
            .with_context(|| format!("Failed to load config {:?}", path))?,
        None => ServiceConfig::default(),
    };
    if cli.cpu {
        config.device = ComputeDevice::Cpu;
    }
    Ok(config)
}

fn start_service(cli: &Cli, model: &Path, model_type: &str, speakers: usize) -> Result<SynthesisService> {
    let service = SynthesisService::new(load_config(cli)?)?;

    let pb = create_progress_bar("Loading acoustic model...");
    let start = Instant::now();
    service
        .load_model(model_type, model, speakers)
        .with_context(|| format!("Failed to load {:?}", model))?;
    pb.finish_with_message(format!("Model loaded in {:.1}s", start.elapsed().as_secs_f32()));
    Ok(service)
}

#[allow(clippy::too_many_arguments)]
fn run_synth(
    cli: &Cli,
    model: &Path,
    model_type: &str,
    speakers: usize,
    request: SynthesisRequest,
    vocoder: VocoderChoice,
    output: &Path,
) -> Result<()> {
    let service = start_service(cli, model, model_type, speakers)?;
    service.set_vocoder(vocoder).context("Failed to load vocoder")?;

    info!("Symbols: {}", request.symbols.len());
    info!("Output: {:?}", output);

    let pb = create_progress_bar("Generating speech...");
    let start = Instant::now();
    let outcome = service
        .synthesize(&request, output)
        .context("Synthesis failed")?;
    let seconds = outcome.sample_count as f32 / outcome.sample_rate as f32;
    pb.finish_with_message(format!(
        "Generated {:.2}s of audio in {:.2}s",
        seconds,
        start.elapsed().as_secs_f32()
    ));

    if outcome.used_fallback {
        warn!("Prosody edits were rejected; rendered with predicted prosody");
    }
    info!("Frames: {}", outcome.prosody.frame_count);
    info!("Durations: {:?}", outcome.prosody.durations);
    Ok(())
}

fn run_batch(
    cli: &Cli,
    model: &Path,
    speakers: usize,
    manifest: &Path,
    vocoder: VocoderChoice,
) -> Result<()> {
    let content = std::fs::read_to_string(manifest)
        .with_context(|| format!("Failed to read manifest {:?}", manifest))?;
    let entries: Vec<ManifestEntry> =
        serde_json::from_str(&content).context("Failed to parse manifest")?;

    let service = start_service(cli, model, FASTPITCH_KEY, speakers)?;
    service.set_vocoder(vocoder).context("Failed to load vocoder")?;

    let (requests, outputs): (Vec<_>, Vec<_>) =
        entries.into_iter().map(|e| (e.request, e.output)).unzip();

    let pb = create_progress_bar(&format!("Rendering {} utterances...", requests.len()));
    let outcomes = service.synthesize_batch(&requests, &outputs)?;
    let ok = outcomes.iter().filter(|o| o.is_success()).count();
    pb.finish_with_message(format!("{}/{} utterances rendered", ok, outcomes.len()));

    println!("{}", format_legacy(&outcomes));
    Ok(())
}

fn run_post(cli: &Cli, jobs: &Path, workers: Option<usize>, ffmpeg: Option<PathBuf>) -> Result<()> {
    let config = load_config(cli)?;
    let content = std::fs::read_to_string(jobs)
        .with_context(|| format!("Failed to read job list {:?}", jobs))?;
    let jobs: Vec<PostJob> = serde_json::from_str(&content).context("Failed to parse job list")?;

    let mut executor = PostExecutor::from_config(&config.audio_post);
    if let Some(tool) = ffmpeg {
        executor = PostExecutor::new(tool).with_base_rate(config.audio_post.base_rate);
    }
    if let Some(workers) = workers {
        executor = executor.with_workers(workers);
    }

    let pb = create_progress_bar(&format!("Processing {} files...", jobs.len()));
    let outcomes = executor.run(&jobs)?;
    let ok = outcomes.iter().filter(|o| o.is_success()).count();
    pb.finish_with_message(format!("{}/{} files processed", ok, outcomes.len()));

    println!("{}", format_legacy(&outcomes));
    Ok(())
}

fn run_info(cli: &Cli) -> Result<()> {
    let config = load_config(cli)?;
    println!("voxhost v{}", VERSION);
    println!();
    println!("Device:          {}", config.device);
    println!("Sample rate:     {} Hz", config.sample_rate);
    println!("Max duration:    {} frames", config.max_duration);
    println!("Acoustic model:  {}", config.acoustic_model);
    println!("Vocoder model:   {}", config.vocoder_model);
    println!("Bundled vocoder: {:?}", config.bundled_vocoder);
    println!("Audio tool:      {:?}", config.audio_post.ffmpeg_path);
    println!();
    println!("Alphabets:");
    for alphabet in [
        SymbolAlphabet::EnglishBasic,
        SymbolAlphabet::EnglishBasicLowercase,
        SymbolAlphabet::EnglishExpanded,
    ] {
        println!("  {:<26} {} symbols", alphabet.name(), alphabet.vocab_size());
    }
    Ok(())
}

fn run_init(
    output: &Path,
    name: &str,
    alphabet: SymbolAlphabet,
    speakers: usize,
    mel_channels: usize,
) -> Result<()> {
    std::fs::create_dir_all(output)
        .with_context(|| format!("Failed to create {:?}", output))?;

    let acoustic = output.join(format!("{}.safetensors", name));
    let dims = FastPitchDims {
        alphabet,
        speakers,
        mel_channels,
        ..Default::default()
    };
    FastPitch::init_checkpoint(&acoustic, &dims)?;
    info!("Wrote {:?}", acoustic);

    let paired = voxhost::inference::paired_vocoder_path(&acoustic);
    FrameVocoder::init_checkpoint(&paired, mel_channels, DEFAULT_HOP_LENGTH)?;
    info!("Wrote {:?}", paired);
    Ok(())
}

fn setup_logging(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")
}

fn create_progress_bar(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(msg.to_string());
    pb
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose)?;

    info!("voxhost v{}", VERSION);

    match &cli.command {
        Commands::Synth {
            model,
            model_type,
            speakers,
            text,
            symbols,
            speaker,
            pace,
            pitch,
            durations,
            alphabet,
            vocoder,
            output,
        } => {
            let ids = match (text, symbols) {
                (Some(text), _) => alphabet.encode(text),
                (None, Some(raw)) => parse_list::<u32>(raw, "symbol")?,
                (None, None) => anyhow::bail!("Either --text or --symbols is required"),
            };
            let mut request = SynthesisRequest::new(ids).with_pace(*pace);
            if let Some(speaker) = speaker {
                request = request.with_speaker(*speaker);
            }
            if let Some(raw) = pitch {
                request = request.with_pitch(parse_list(raw, "pitch")?);
            }
            if let Some(raw) = durations {
                request = request.with_durations(parse_list(raw, "duration")?);
            }
            run_synth(&cli, model, model_type, *speakers, request, *vocoder, output)
        }
        Commands::Batch {
            model,
            speakers,
            manifest,
            vocoder,
        } => run_batch(&cli, model, *speakers, manifest, *vocoder),
        Commands::Post {
            jobs,
            workers,
            ffmpeg,
        } => run_post(&cli, jobs, *workers, ffmpeg.clone()),
        Commands::Info => run_info(&cli),
        Commands::Init {
            output,
            name,
            alphabet,
            speakers,
            mel_channels,
        } => run_init(output, name, *alphabet, *speakers, *mel_channels),
    }
}
