use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use playlist_reconcile::config::{MatchConfig, ReconcilerConfig};
use playlist_reconcile::engine::MatchEngine;
use playlist_reconcile::library::LibraryCollection;
use playlist_reconcile::models::{LocalFile, ReconcileStats, RemoteTrack, TrackSlot};
use playlist_reconcile::progress::{create_spinner, follow_batch, format_duration, set_log_only};
use playlist_reconcile::reconciler::ConcurrentReconciler;
use playlist_reconcile::safety::validate_report_path;
use playlist_reconcile::scoring::MatchScorer;

#[derive(Parser)]
#[command(name = "playlist-reconcile")]
#[command(about = "Match a remote playlist snapshot against a local music library")]
struct Args {
    /// Playlist snapshot: JSON array of tracks
    playlist: PathBuf,

    /// Library snapshot: JSON array of local files
    library: PathBuf,

    /// Worker threads (0 = available processing units)
    #[arg(long, default_value = "0")]
    workers: usize,

    /// Acceptance threshold, overrides the config file
    #[arg(long)]
    min_confidence: Option<f64>,

    /// Scoring config (JSON); missing keys keep their defaults
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write per-track results and stats to this JSON file
    #[arg(long)]
    report: Option<PathBuf>,

    /// Hide progress bars; print periodic progress lines instead
    #[arg(long)]
    log_only: bool,

    /// Also list up to N ranked candidates per track
    #[arg(long, default_value = "0")]
    top: usize,
}

#[derive(Serialize)]
struct TrackReport<'a> {
    track: &'a RemoteTrack,
    result: &'a TrackSlot,
}

#[derive(Serialize)]
struct Report<'a> {
    stats: &'a ReconcileStats,
    tracks: Vec<TrackReport<'a>>,
}

fn load_json<T: serde::de::DeserializeOwned>(path: &Path, what: &str) -> Result<T> {
    let spinner = create_spinner(&format!("Loading {}", what));
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {} file {:?}", what, path))?;
    let value = serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse {} file {:?}", what, path))?;
    spinner.finish_and_clear();
    Ok(value)
}

fn load_config(args: &Args) -> Result<MatchConfig> {
    let mut config = match &args.config {
        Some(path) => MatchConfig::from_json_file(path)
            .with_context(|| format!("Failed to load config {:?}", path))?,
        None => MatchConfig::default(),
    };
    if let Some(min_confidence) = args.min_confidence {
        config.min_confidence = min_confidence;
    }
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn print_results(
    reconciler: &ConcurrentReconciler,
    engine: &MatchEngine,
    tracks: &[RemoteTrack],
    slots: &[TrackSlot],
    top: usize,
) -> Result<()> {
    let snapshot = reconciler.library().snapshot();

    for (track, slot) in tracks.iter().zip(slots) {
        let artist = track.artists.join(", ");
        if slot.is_local {
            println!(
                "  [{:>3.0}%] {} - {} -> {} ({})",
                slot.confidence * 100.0,
                artist,
                track.title,
                slot.path,
                slot.match_type_label()
            );
        } else {
            println!("  [ -- ] {} - {} (no local file)", artist, track.title);
        }

        if top > 0 {
            // Scores come from the per-file cache filled by the batch
            let candidates = engine
                .find_all_matches(track, &snapshot)
                .with_context(|| format!("Failed to rank candidates for '{}'", track.track_id))?;
            for candidate in candidates.iter().take(top) {
                println!(
                    "           {:>3.0}% {:<9} {} [{}]",
                    candidate.confidence * 100.0,
                    candidate.tier().label(),
                    candidate.local_file.location,
                    candidate.breakdown
                );
            }
        }
    }

    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    set_log_only(args.log_only);

    let config = load_config(&args)?;

    if let Some(ref report) = args.report {
        validate_report_path(report, &[&args.playlist, &args.library])?;
    }

    let tracks: Vec<RemoteTrack> = load_json(&args.playlist, "playlist")?;
    let files: Vec<LocalFile> = load_json(&args.library, "library")?;
    info!("Loaded {} tracks and {} local files", tracks.len(), files.len());

    let library = Arc::new(LibraryCollection::from_files(files));
    let engine = MatchEngine::new(MatchScorer::new(config));
    let reconciler = ConcurrentReconciler::new(
        Arc::clone(&library),
        engine.clone(),
        ReconcilerConfig {
            workers: args.workers,
        },
    )
    .context("Failed to start reconciler")?;

    let batch = reconciler.reconcile_playlist(tracks);
    let elapsed = follow_batch(&batch, "Matching");

    let tracks = reconciler.tracks();
    let slots = reconciler.slots();
    let stats = reconciler.stats(&batch);

    print_results(&reconciler, &engine, &tracks, &slots, args.top)?;

    println!("\n{:=<60}", "");
    println!("Reconciliation complete!");
    println!("  Tracks: {}", stats.total_tracks);
    println!("  Matched: {} ({:.1}%)", stats.matched, stats.match_rate());
    println!("  Unmatched: {}", stats.unmatched);
    if stats.failed > 0 {
        println!("  Failed: {}", stats.failed);
    }
    println!("  Library: {} files", stats.library_size);
    println!("  Elapsed: {}", format_duration(elapsed));
    println!("{:=<60}", "");

    if args.log_only {
        stats.log_phase("reconcile");
    }

    if let Some(ref path) = args.report {
        let report = Report {
            stats: &stats,
            tracks: tracks
                .iter()
                .zip(&slots)
                .map(|(track, result)| TrackReport { track, result })
                .collect(),
        };
        let json = serde_json::to_string_pretty(&report).context("Failed to serialize report")?;
        std::fs::write(path, json).with_context(|| format!("Failed to write report {:?}", path))?;
        println!("Report written to {:?}", path);
    }

    Ok(())
}
