//! atomstore Dump Binary
//!
//! Replays a data directory and prints its atoms, newest first.

use std::path::PathBuf;

use atomstore::log::DATA_FILE_NAME;
use atomstore::{Config, Particle, Universe};
use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

/// atomstore dump tool
#[derive(Parser, Debug)]
#[command(name = "atomdump")]
#[command(about = "Print the atoms of an atomstore data directory")]
#[command(version)]
struct Args {
    /// Data directory
    #[arg(short, long, default_value = "./atomstore_data")]
    data_dir: PathBuf,

    /// Print at most this many atoms
    #[arg(short, long)]
    limit: Option<usize>,

    /// Print index and encoder statistics
    #[arg(short, long)]
    stats: bool,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,atomstore=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    tracing::info!("atomdump v{}", atomstore::VERSION);
    tracing::info!("Data directory: {}", args.data_dir.display());

    if !args.data_dir.join(DATA_FILE_NAME).exists() {
        tracing::error!("No data file in {}", args.data_dir.display());
        std::process::exit(1);
    }

    let config = Config::builder().data_dir(&args.data_dir).build();
    // The data file is opened without write access; a live writer may own it
    let opened = Universe::file_backed(config).and_then(|u| u.start_read_only().map(|_| u));
    let universe = match opened {
        Ok(u) => u,
        Err(e) => {
            tracing::error!("Failed to open universe: {}", e);
            std::process::exit(1);
        }
    };

    for (key, value) in universe.custom_properties() {
        println!("# {} = {}", key, value);
    }
    println!("# ucn = {}, atoms = {}", universe.ucn(), universe.atom_count());

    let limit = args.limit.unwrap_or(usize::MAX);
    for atom in universe.global_index().all().take(limit) {
        let fields: Vec<String> = atom
            .junctions()
            .map(|(key, particle)| format!("{}={}", key, render(particle)))
            .collect();
        println!(
            "{} ucn={} {}",
            atom.id(),
            atom.ucn().unwrap_or(0),
            fields.join(" ")
        );
    }

    if args.stats {
        print!("{}", universe.index_stats());
        println!("{:?}", universe.encoder_stats());
    }

    if let Err(e) = universe.stop() {
        tracing::error!("Failed to stop universe: {}", e);
        std::process::exit(1);
    }
}

fn render(particle: &Particle) -> String {
    match particle {
        Particle::Long(v) => v.to_string(),
        Particle::Str(s) => format!("{:?}", s),
        other => match other.try_raw() {
            Ok(raw) if raw.len() <= 32 => {
                raw.iter().map(|b| format!("{:02x}", b)).collect::<String>()
            }
            Ok(raw) => format!("[{} bytes]", raw.len()),
            Err(e) => format!("<unreadable: {}>", e),
        },
    }
}
