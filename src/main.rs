use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use frameprint::core::{CommandClassifier, FfmpegDecoder, Label};
use frameprint::{AppConfig, Fingerprint, Fingerprinter, HashStore, Pipeline, PipelineReport};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use walkdir::WalkDir;

#[derive(Parser, Debug)]
#[command(
    name = "frameprint",
    version,
    about = "Fingerprint video frames and track duplicates"
)]
struct Cli {
    /// JSON config file (default: <config dir>/frameprint/config.json if present)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Hash store location
    #[arg(long, global = true, value_name = "FILE")]
    database: Option<PathBuf>,

    /// Root directory for sampled frames
    #[arg(long, global = true, value_name = "DIR")]
    frames_dir: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Sample, fingerprint and record one video
    Process {
        /// Video file to process
        video: PathBuf,
        /// Name to record the video under (default: the file name)
        #[arg(long)]
        name: Option<String>,
        /// Keep every Nth frame
        #[arg(short, long)]
        interval: Option<u64>,
        /// Keep sampled frames in memory only
        #[arg(long)]
        no_persist: bool,
        /// External classifier, run as `<CMD> <frame path>`, printing Deepfake or Real
        #[arg(long, value_name = "CMD")]
        classifier_cmd: Option<String>,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Process every video found under a directory
    Ingest {
        /// Directory to walk
        #[arg(short, long, value_name = "DIR")]
        path: PathBuf,
        /// Keep every Nth frame
        #[arg(short, long)]
        interval: Option<u64>,
        /// Keep sampled frames in memory only
        #[arg(long)]
        no_persist: bool,
    },

    /// Check whether a fingerprint is already stored
    Check {
        /// Hex fingerprint
        phash: String,
    },

    /// Print the fingerprint of an image file
    Hash {
        /// Image to fingerprint
        image: PathBuf,
    },

    /// Create the hash store if it does not exist
    Init,

    /// List stored hash records
    List {
        /// Only records of this video
        #[arg(long)]
        video: Option<String>,
    },
}

#[derive(Serialize)]
struct ProcessOutput<'a> {
    processed_at: String,
    #[serde(flatten)]
    report: &'a PipelineReport,
    label_counts: BTreeMap<Label, usize>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config = AppConfig::load(cli.config.as_deref()).context("Failed to load config")?;
    if let Some(database) = cli.database {
        config.database_path = database;
    }
    if let Some(frames_dir) = cli.frames_dir {
        config.frames_dir = frames_dir;
    }

    match cli.command {
        Commands::Process {
            video,
            name,
            interval,
            no_persist,
            classifier_cmd,
            json,
        } => {
            apply_sampling_flags(&mut config, interval, no_persist)?;
            warn_if_no_ffmpeg();

            let mut pipeline = Pipeline::from_config(&config).with_context(|| {
                format!("Failed to open hash store {:?}", config.database_path)
            })?;
            if let Some(command) = classifier_cmd {
                if !config.persist_frames {
                    bail!("--classifier-cmd needs frames on disk; drop --no-persist");
                }
                let classifier = CommandClassifier::from_command_line(&command)
                    .context("--classifier-cmd is empty")?;
                pipeline = pipeline.with_classifier(Arc::new(classifier));
            }

            let original_name = name.unwrap_or_else(|| file_name_of(&video));
            if !json {
                println!("▶ Processing {}", video.display());
            }
            let report = benchmark("processing", !json, || {
                pipeline.process(&video, &original_name)
            })
            .with_context(|| format!("Failed to process {:?}", video))?;

            if json {
                let output = ProcessOutput {
                    processed_at: Utc::now().to_rfc3339(),
                    report: &report,
                    label_counts: report.label_counts(),
                };
                println!("{}", serde_json::to_string_pretty(&output)?);
            } else {
                print_report(&report);
            }
        }

        Commands::Ingest {
            path,
            interval,
            no_persist,
        } => {
            apply_sampling_flags(&mut config, interval, no_persist)?;
            warn_if_no_ffmpeg();

            let videos = scan_videos(&path, &config);
            if videos.is_empty() {
                println!("No videos found in {}.", path.display());
                return Ok(());
            }

            let pipeline = Pipeline::from_config(&config).with_context(|| {
                format!("Failed to open hash store {:?}", config.database_path)
            })?;

            let bar = ProgressBar::new(videos.len() as u64);
            bar.set_style(ProgressStyle::with_template(
                "{spinner:.green} [{bar:30}] {pos}/{len} {msg}",
            )?);

            let (mut hashed, mut duplicates, mut unreadable, mut failed) = (0, 0, 0, 0);
            for video in &videos {
                let file_name = file_name_of(video);
                bar.set_message(file_name.clone());
                match pipeline.process(video, &file_name) {
                    Ok(report) => {
                        if !report.opened {
                            unreadable += 1;
                            bar.println(format!("⚠️  Could not open {}", video.display()));
                        }
                        hashed += report.hashes.len();
                        duplicates += report.duplicates.len();
                    }
                    Err(err) => {
                        failed += 1;
                        bar.println(format!("❌ {}: {:#}", video.display(), err));
                    }
                }
                bar.inc(1);
            }
            bar.finish_with_message("done");

            println!(
                "\n✅ {} video(s): {} frame hash(es), {} duplicate(s), {} unreadable, {} failed",
                videos.len(),
                hashed,
                duplicates,
                unreadable,
                failed
            );
        }

        Commands::Check { phash } => {
            let store = HashStore::open(&config.database_path).with_context(|| {
                format!("Failed to open hash store {:?}", config.database_path)
            })?;
            let phash = Fingerprint::new(phash.trim().to_lowercase());

            if store.check_duplicate(&phash)? {
                match store.find(&phash)? {
                    Some(record) => println!(
                        "🔁 Duplicate: {} first seen in {} ({})",
                        phash, record.video_name, record.frame_path
                    ),
                    None => println!("🔁 Duplicate: {}", phash),
                }
            } else {
                println!("✨ {} has not been seen before.", phash);
            }
        }

        Commands::Hash { image } => {
            let fingerprinter = Fingerprinter::new(config.hash_size)?;
            let phash = fingerprinter
                .fingerprint_file(&image)
                .with_context(|| format!("Failed to fingerprint {:?}", image))?;
            println!("{}  {}", phash, image.display());
        }

        Commands::Init => {
            let store = HashStore::open(&config.database_path).with_context(|| {
                format!("Failed to initialize hash store {:?}", config.database_path)
            })?;
            println!(
                "✅ Hash store ready at {} ({} record(s))",
                store.path().display(),
                store.count()?
            );
        }

        Commands::List { video } => {
            let store = HashStore::open(&config.database_path).with_context(|| {
                format!("Failed to open hash store {:?}", config.database_path)
            })?;
            let records = store.records(video.as_deref())?;
            if records.is_empty() {
                println!("No records.");
            } else {
                println!("🗂️  {} record(s):", records.len());
                for record in &records {
                    println!(
                        "  {}  {}  {}",
                        record.phash, record.video_name, record.frame_path
                    );
                }
            }
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp(None)
        .init();
}

fn apply_sampling_flags(
    config: &mut AppConfig,
    interval: Option<u64>,
    no_persist: bool,
) -> Result<()> {
    if let Some(interval) = interval {
        config.interval = interval;
    }
    if no_persist {
        config.persist_frames = false;
    }
    config.validate()?;
    Ok(())
}

fn warn_if_no_ffmpeg() {
    if !FfmpegDecoder::is_available() {
        log::warn!("ffmpeg was not found on PATH; videos will yield no frames");
    }
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

/// Recursively walk `dir`, returning the video files it holds.
fn scan_videos(dir: &Path, config: &AppConfig) -> Vec<PathBuf> {
    let mut videos: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file() && config.is_video(entry.path()))
        .map(|entry| entry.into_path())
        .collect();
    videos.sort();
    videos
}

fn print_report(report: &PipelineReport) {
    if !report.opened {
        println!("⚠️  Could not open the video; no frames were sampled.");
        return;
    }
    if report.sampled.is_empty() {
        println!("No frames decoded.");
        return;
    }

    println!("Sampled {} frame(s) from {}:", report.sampled.len(), report.video_name);
    for frame in &report.sampled {
        let hash = report
            .hashes
            .get(frame)
            .map(|h| h.to_string())
            .unwrap_or_else(|| "-".repeat(16));
        let mut line = format!("   {}  {}", hash, frame);
        if let Some(label) = report.labels.get(frame) {
            line.push_str(&format!("  [{}]", label));
        }
        if report.duplicates.contains(frame) {
            match report.duplicate_sources.get(frame) {
                Some(owner) => line.push_str(&format!("  🔁 seen in {}", owner)),
                None => line.push_str("  🔁 seen before"),
            }
        }
        println!("{}", line);
    }

    for failure in &report.errors {
        println!("   ⚠️  {}: {}", failure.frame, failure.message);
    }

    let counts = report.label_counts();
    if !counts.is_empty() {
        let summary: Vec<String> = counts
            .iter()
            .map(|(label, count)| format!("{}: {}", label, count))
            .collect();
        println!("\n🏷️  {}", summary.join("  "));
    }

    println!(
        "\n✅ {} hash(es), {} duplicate(s)",
        report.hashes.len(),
        report.duplicates.len()
    );
}

/// Run `f()`, print how long it took (with `label`) when `show` is set, and return its result.
fn benchmark<T, F: FnOnce() -> T>(label: &str, show: bool, f: F) -> T {
    let start = Instant::now();
    let result = f();
    if show {
        println!("⏱ {} took {:.2?}", label, start.elapsed());
    }
    result
}
