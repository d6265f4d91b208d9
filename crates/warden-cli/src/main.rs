use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use warden_core::gallery;
use warden_core::{Config, EnrolledIdentity};
use warden_hw::{Camera, Frame};
use warden_store::Store;
use warden_vision::OnnxExtractor;

mod enroll;
mod legacy_log;

/// Frames dropped after the stream starts (auto exposure settling).
const WARMUP_FRAMES: usize = 4;
/// Frames dropped between enrollment captures so the samples differ.
const FRAMES_BETWEEN_CAPTURES: usize = 15;

#[derive(Parser)]
#[command(name = "warden", about = "Warden face-recognition door access CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enroll a person from live camera captures
    Enroll {
        /// Name to greet and log this person as
        #[arg(short, long)]
        name: String,
        /// Number of frames to capture and average
        #[arg(short, long, default_value_t = 3, value_parser = clap::value_parser!(u8).range(1..=10))]
        images: u8,
        /// Overwrite an existing enrollment
        #[arg(long)]
        force: bool,
    },
    /// List enrolled users
    Users,
    /// Remove an enrolled user
    Remove {
        name: String,
    },
    /// Show access log entries
    Logs {
        /// Number of entries to show
        #[arg(short, long, default_value_t = 50)]
        limit: usize,
        /// Only show entries for this person
        #[arg(short, long)]
        user: Option<String>,
    },
    /// Register gallery identities in the database, optionally importing a
    /// legacy CSV access log
    Migrate {
        #[arg(long)]
        log_file: Option<PathBuf>,
    },
    /// Run camera and model diagnostics
    Test,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();

    match cli.command {
        Commands::Enroll { name, images, force } => enroll_user(&config, &name, images as usize, force),
        Commands::Users => list_users(&config),
        Commands::Remove { name } => remove_user(&config, &name),
        Commands::Logs { limit, user } => show_logs(&config, limit, user.as_deref()),
        Commands::Migrate { log_file } => migrate(&config, log_file.as_deref()),
        Commands::Test => diagnostics(&config),
    }
}

fn open_store(config: &Config) -> Result<Store> {
    Store::open(&config.db_path).with_context(|| format!("opening database {}", config.db_path.display()))
}

fn enroll_user(config: &Config, name: &str, images: usize, force: bool) -> Result<()> {
    let name = name.trim();
    // Validates the name before touching the camera.
    gallery::identity_path(&config.gallery_dir, name)?;
    if gallery::contains(&config.gallery_dir, name) && !force {
        bail!("user {name} is already enrolled; pass --force to overwrite");
    }

    let mut extractor = OnnxExtractor::load(&config.model_dir)?;
    let camera = Camera::open(&config.camera_device, config.camera_width, config.camera_height)?;

    println!("Capturing {images} images for {name}. Look at the camera.");
    let frames = capture_spaced(&camera, images)?;
    let embedding = enroll::average_embedding(&mut extractor, &frames)?;

    let identity = EnrolledIdentity {
        name: name.to_string(),
        embedding,
    };
    let path = gallery::save_identity(&config.gallery_dir, &identity)?;
    println!("Face embedding saved as {}", path.display());

    if open_store(config)?.add_user(name)? {
        println!("User {name} added to database");
    } else {
        println!("User {name} already in database");
    }
    println!("Successfully enrolled {name} from {images} images");
    Ok(())
}

/// Capture `count` frames spaced apart on one stream.
fn capture_spaced(camera: &Camera, count: usize) -> Result<Vec<Frame>> {
    let mut stream = camera.stream()?;
    for _ in 0..WARMUP_FRAMES {
        stream.next_frame()?;
    }

    let mut frames = Vec::with_capacity(count);
    for i in 0..count {
        if i > 0 {
            for _ in 0..FRAMES_BETWEEN_CAPTURES {
                stream.next_frame()?;
            }
        }
        frames.push(stream.next_frame()?);
        println!("  image {}/{count} captured", i + 1);
    }
    Ok(frames)
}

fn list_users(config: &Config) -> Result<()> {
    let users = open_store(config)?.list_users()?;
    if users.is_empty() {
        println!("No users enrolled");
        return Ok(());
    }

    println!("{:<24} {:<20} {:<20} {:>8}  EMBEDDING", "NAME", "ENROLLED", "LAST SEEN", "ACCESSES");
    for user in users {
        let embedding = if gallery::contains(&config.gallery_dir, &user.name) {
            "yes"
        } else {
            "missing"
        };
        println!(
            "{:<24} {:<20} {:<20} {:>8}  {embedding}",
            user.name,
            user.created_at,
            user.last_seen.as_deref().unwrap_or("never"),
            user.access_count,
        );
    }
    Ok(())
}

fn remove_user(config: &Config, name: &str) -> Result<()> {
    let removed_file = gallery::remove_identity(&config.gallery_dir, name)?;
    let removed_row = open_store(config)?.delete_user(name)?;
    if !removed_file && !removed_row {
        bail!("user {name} not found");
    }
    println!("User {name} removed");
    Ok(())
}

fn show_logs(config: &Config, limit: usize, user: Option<&str>) -> Result<()> {
    let store = open_store(config)?;
    let logs = match user {
        Some(name) => store.user_logs(name)?.into_iter().take(limit).collect(),
        None => store.recent_logs(limit)?,
    };
    if logs.is_empty() {
        println!("No access events recorded");
        return Ok(());
    }

    for log in logs {
        println!(
            "{}  {:<24} {:<20} {}",
            log.timestamp,
            log.event_type,
            log.person_name.as_deref().unwrap_or("-"),
            log.details.as_deref().unwrap_or(""),
        );
    }
    Ok(())
}

fn migrate(config: &Config, log_file: Option<&std::path::Path>) -> Result<()> {
    let store = open_store(config)?;

    let identities = gallery::load_gallery(&config.gallery_dir)?;
    let mut migrated = 0;
    for identity in &identities {
        if store.add_user(&identity.name)? {
            println!("Migrated user: {}", identity.name);
            migrated += 1;
        } else {
            println!("User {} already exists in database", identity.name);
        }
    }
    println!("Migrated {migrated} of {} users to database", identities.len());

    if let Some(path) = log_file {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading legacy log {}", path.display()))?;
        let entries = legacy_log::parse(&text);
        for entry in &entries {
            store.import_access_event(&entry.timestamp, &entry.event, entry.person.as_deref())?;
        }
        println!("Migrated {} log entries to database", entries.len());
    }
    Ok(())
}

fn diagnostics(config: &Config) -> Result<()> {
    println!("Video capture devices:");
    let devices = Camera::list_devices();
    if devices.is_empty() {
        println!("  none found");
    }
    for dev in &devices {
        println!("  {}  {} ({}, {})", dev.path, dev.name, dev.driver, dev.bus);
    }

    let (det, emb) = warden_vision::model_paths(&config.model_dir);
    for model in [&det, &emb] {
        let state = if model.exists() { "ok" } else { "MISSING" };
        println!("Model {}: {state}", model.display());
    }

    println!("Grabbing one frame from {}...", config.camera_device);
    let camera = Camera::open(&config.camera_device, config.camera_width, config.camera_height)?;
    let frame = camera
        .capture_frames(1)?
        .pop()
        .context("camera returned no frame")?;
    println!(
        "  {}x{} frame, format {:?}, average brightness {:.1}",
        frame.width,
        frame.height,
        camera.pixel_format(),
        frame.avg_brightness()
    );
    Ok(())
}
