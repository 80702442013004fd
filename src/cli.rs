// Arc Shelf CLI binary

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use env_logger::{Builder, Target};
use log::LevelFilter;
use rusqlite::Connection;

use arc_shelf_lib::backup;
use arc_shelf_lib::db::{open_db, schema};
use arc_shelf_lib::handles::{Capability, DirHandle, HandleManager};
use arc_shelf_lib::ingest;
use arc_shelf_lib::playback::{self, LoadSummary, PlaybackEvent};
use arc_shelf_lib::preview::{FfmpegGrabber, ThumbOptions};
use arc_shelf_lib::sidecar::{self, DiskWrite};
use arc_shelf_lib::{ShelfConfig, ShelfError, Store};

#[derive(Parser)]
#[command(name = "arcshelf")]
#[command(about = "Arc Shelf - A local library for episodic video", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Select (or re-select) the library root directory
    Grant {
        /// Directory whose subdirectories are arcs
        path: PathBuf,
    },

    /// Scan the library for new arcs and episodes
    Scan,

    /// List arcs
    Arcs,

    /// List the episodes of an arc
    Episodes {
        /// Arc id
        arc: String,
    },

    /// Load an episode and show where playback resumes
    Play {
        arc: String,
        episode: String,
    },

    /// Record a playback position for an episode
    Progress {
        arc: String,
        episode: String,
        /// Position in seconds
        seconds: f64,
        /// Mark the episode as watched to the end
        #[arg(long)]
        ended: bool,
    },

    /// Show or set an episode description
    Describe {
        arc: String,
        episode: String,
        /// New description text
        #[arg(long)]
        set: Option<String>,
        /// Also write the text to the sidecar file next to the video
        #[arg(long, requires = "set")]
        disk: bool,
    },

    /// Set or clear an arc description
    DescribeArc {
        arc: String,
        /// New description; omit to clear
        text: Option<String>,
    },

    /// Show the state of the library grant and tracked files
    Status,

    /// Export arcs, episodes and progress as JSON
    Export {
        /// Output file (defaults to stdout)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Import a JSON backup, replacing records with the same ids
    Import {
        /// Backup file
        path: PathBuf,
    },

    /// Remove an arc and its episodes from the library
    DeleteArc {
        /// Arc id
        arc: String,
    },
}

fn init_logger() {
    Builder::new()
        .target(Target::Stderr)
        .filter_level(LevelFilter::Warn)
        .filter_module("arc_shelf_lib", LevelFilter::Info)
        .filter_module("arcshelf", LevelFilter::Info)
        .init();
}

fn main() -> ExitCode {
    if std::env::var("RUST_LOG").is_err() {
        init_logger();
    } else {
        env_logger::init();
    }

    let cli = Cli::parse();
    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            if e.downcast_ref::<ShelfError>().is_some_and(ShelfError::needs_regrant) {
                eprintln!("Run 'arcshelf grant <library directory>' to select the library again.");
            }
            ExitCode::FAILURE
        }
    }
}

fn run(command: Commands) -> Result<()> {
    let config = ShelfConfig::from_env()?;

    match command {
        Commands::Grant { path } => cmd_grant(&config, path),
        Commands::Scan => cmd_scan(&config),
        Commands::Arcs => cmd_arcs(&config),
        Commands::Episodes { arc } => cmd_episodes(&config, &arc),
        Commands::Play { arc, episode } => cmd_play(&config, &arc, &episode),
        Commands::Progress { arc, episode, seconds, ended } => cmd_progress(&config, &arc, &episode, seconds, ended),
        Commands::Describe { arc, episode, set, disk } => cmd_describe(&config, &arc, &episode, set, disk),
        Commands::DescribeArc { arc, text } => cmd_describe_arc(&config, &arc, text),
        Commands::Status => cmd_status(&config),
        Commands::Export { out } => cmd_export(&config, out),
        Commands::Import { path } => cmd_import(&config, path),
        Commands::DeleteArc { arc } => cmd_delete_arc(&config, &arc),
    }
}

fn open(config: &ShelfConfig) -> Result<Connection> {
    Ok(open_db(&config.db_path())?)
}

fn cmd_grant(config: &ShelfConfig, path: PathBuf) -> Result<()> {
    let root_path = path.canonicalize().unwrap_or(path);
    let root = DirHandle::open(&root_path)?;
    let conn = open(config)?;

    let stored = HandleManager::new(&conn).grant_root(&root)?;
    println!("Library root set to '{}' ({})", stored.name, root_path.display());
    Ok(())
}

fn cmd_scan(config: &ShelfConfig) -> Result<()> {
    let conn = open(config)?;
    let handles = HandleManager::new(&conn);
    let options = ThumbOptions {
        time_offset: config.thumb_offset_secs,
        ..ThumbOptions::default()
    };

    let result = ingest::sync_library(&conn, &handles, &FfmpegGrabber, &options)?;

    println!("Scan complete:");
    println!("  Arcs found:        {}", result.arcs_found);
    println!("  Arcs added:        {}", result.arcs_added.len());
    println!("  Episodes found:    {}", result.episodes_found);
    println!("  Episodes added:    {}", result.episodes_added.len());
    if result.thumbnails_failed > 0 {
        println!("  Without thumbnail: {}", result.thumbnails_failed);
    }
    for error in &result.errors {
        println!("  ! {}", error);
    }
    Ok(())
}

fn cmd_arcs(config: &ShelfConfig) -> Result<()> {
    let conn = open(config)?;
    let arcs = schema::list_arcs(&conn)?;

    if arcs.is_empty() {
        println!("No arcs yet. Use 'arcshelf grant <dir>' then 'arcshelf scan'.");
        return Ok(());
    }

    println!("{:>5}  {:<30}  {:>8}  {}", "Order", "Id", "Episodes", "Name");
    println!("{}", "-".repeat(70));
    for arc in arcs {
        let count = schema::list_episodes(&conn, &arc.id)?.len();
        println!("{:>5}  {:<30}  {:>8}  {}", arc.order, arc.id, count, arc.display_name);
    }
    Ok(())
}

fn cmd_episodes(config: &ShelfConfig, arc_id: &str) -> Result<()> {
    let conn = open(config)?;
    let arc = schema::get_arc(&conn, arc_id)?.ok_or_else(|| ShelfError::ArcNotFound(arc_id.to_string()))?;
    let episodes = schema::list_episodes(&conn, &arc.id)?;
    let progress = schema::list_playback_for_arc(&conn, &arc.id)?;

    println!("{} ({} episodes)", arc.display_name, episodes.len());
    println!();
    println!("{:<24}  {:>9}  {:>9}  {}", "Id", "Duration", "Watched", "Title");
    println!("{}", "-".repeat(70));

    for ep in episodes {
        // Latest progress across file versions of this episode
        let watched = progress
            .iter()
            .filter(|p| p.episode_id == ep.id)
            .max_by_key(|p| p.last_watched)
            .map(|p| clock(p.current_time))
            .unwrap_or_else(|| "-".to_string());
        let duration = if ep.duration > 0.0 { clock(ep.duration) } else { "-".to_string() };
        println!("{:<24}  {:>9}  {:>9}  {}", ep.id, duration, watched, ep.display_name);
    }
    Ok(())
}

fn cmd_play(config: &ShelfConfig, arc_id: &str, episode_id: &str) -> Result<()> {
    let conn = open(config)?;
    let loaded = playback::load_episode(&conn, arc_id, episode_id)?;
    let summary = LoadSummary::from(&loaded);

    println!("{} / {}", loaded.arc.display_name, loaded.episode.display_name);
    println!("File:        {}", loaded.file.path().display());
    match summary.resume_at {
        Some(t) => println!("Resume at:   {}", clock(t)),
        None => println!("Resume at:   start"),
    }
    if let Some(text) = summary.description {
        println!();
        println!("{}", text);
    }
    Ok(())
}

fn cmd_progress(config: &ShelfConfig, arc_id: &str, episode_id: &str, seconds: f64, ended: bool) -> Result<()> {
    let store = Store::new(config.db_path());
    let loaded = store.with_conn(|conn| playback::load_episode(conn, arc_id, episode_id))?;

    let session = playback::spawn_session(store.clone(), loaded.session_key(), config.progress_debounce)?;
    session.send(PlaybackEvent::Loaded)?;
    session.send(PlaybackEvent::Play)?;
    session.send(PlaybackEvent::TimeUpdate {
        current_time: seconds,
        duration: loaded.episode.duration,
    })?;
    session.send(if ended { PlaybackEvent::Ended } else { PlaybackEvent::Pause })?;
    let summary = session.finish()?;

    match summary.last_written {
        Some(p) => println!("Saved {} at {}", p.id, clock(p.current_time)),
        None => println!("Nothing saved"),
    }
    store.close();
    Ok(())
}

fn cmd_describe(config: &ShelfConfig, arc_id: &str, episode_id: &str, set: Option<String>, disk: bool) -> Result<()> {
    let conn = open(config)?;
    let loaded = playback::load_episode(&conn, arc_id, episode_id)?;

    let text = match set {
        Some(text) => text,
        None => {
            match loaded.description {
                Some(desc) => println!("[{}] {}", desc.source.as_str(), desc.text),
                None => println!("No description."),
            }
            return Ok(());
        }
    };

    let outcome = sidecar::save_description(
        &conn,
        Some(&loaded.arc_dir),
        &loaded.episode,
        &text,
        disk,
        loaded.file_modified,
    )?;

    match outcome.disk {
        DiskWrite::NotRequested => println!("Description saved."),
        DiskWrite::Written => println!("Description saved and written to {}", sidecar::sidecar_name(&loaded.episode.file_name)),
        DiskWrite::NoDirectory => println!("Description saved locally; no arc directory to write to."),
        DiskWrite::Failed(e) => {
            println!("Description saved locally only.");
            return Err(e.into());
        }
    }
    Ok(())
}

fn cmd_describe_arc(config: &ShelfConfig, arc_id: &str, text: Option<String>) -> Result<()> {
    let conn = open(config)?;
    schema::update_arc_description(&conn, arc_id, text.as_deref())?;
    match text {
        Some(_) => println!("Description set for '{}'", arc_id),
        None => println!("Description cleared for '{}'", arc_id),
    }
    Ok(())
}

fn cmd_status(config: &ShelfConfig) -> Result<()> {
    let conn = open(config)?;
    let handles = HandleManager::new(&conn);

    println!("Database:    {}", config.db_path().display());
    match handles.stored_root()? {
        Some(root) => {
            let status = root.verify();
            handles.record(arc_shelf_lib::constants::ROOT_HANDLE_ID, status)?;
            println!("Library:     {} ({})", root.path().display(), status.as_str());
            println!("Name:        {}", root.name());
        }
        None => println!("Library:     not selected"),
    }
    println!("Arcs:        {}", schema::count_arcs(&conn)?);
    println!("Episodes:    {}", schema::list_all_episodes(&conn)?.len());

    let statuses = schema::list_handle_statuses(&conn)?;
    let stale = statuses.iter().filter(|s| s.status != schema::HandleStatus::Ok).count();
    println!("Tracked:     {} ({} not ok)", statuses.len(), stale);
    Ok(())
}

fn cmd_export(config: &ShelfConfig, out: Option<PathBuf>) -> Result<()> {
    let conn = open(config)?;
    let json = backup::export_json(&conn)?;

    match out {
        Some(path) => {
            fs::write(&path, json)?;
            println!("Backup written to {}", path.display());
        }
        None => println!("{}", json),
    }
    Ok(())
}

fn cmd_import(config: &ShelfConfig, path: PathBuf) -> Result<()> {
    let json = fs::read_to_string(&path)
        .map_err(|e| anyhow::anyhow!("Cannot read {}: {}", path.display(), e))?;
    let conn = open(config)?;
    let summary = backup::import_json(&conn, &json)?;

    println!(
        "Imported {} arcs, {} episodes, {} playback records",
        summary.arcs, summary.episodes, summary.playback
    );
    if summary.regressed > 0 {
        println!("  {} playback records were replaced with older positions", summary.regressed);
    }
    Ok(())
}

fn cmd_delete_arc(config: &ShelfConfig, arc_id: &str) -> Result<()> {
    let conn = open(config)?;
    let removed = schema::delete_arc(&conn, arc_id)?;
    println!("Deleted arc '{}' and {} episodes (files on disk untouched)", arc_id, removed);
    Ok(())
}

/// Seconds as H:MM:SS or M:SS.
fn clock(seconds: f64) -> String {
    let total = seconds.max(0.0) as u64;
    let (h, m, s) = (total / 3600, (total % 3600) / 60, total % 60);
    if h > 0 {
        format!("{}:{:02}:{:02}", h, m, s)
    } else {
        format!("{}:{:02}", m, s)
    }
}
