use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use sonance_core::schema::FingerprintStore;
use sonance_etl::{discover_audio_files, ingest_all, BoundedPool, Config, Fingerprinter};

pub async fn run_ingest(config: &Config, path: PathBuf) -> Result<()> {
    let files = if path.is_dir() {
        discover_audio_files(&path)
    } else if path.is_file() {
        vec![path.clone()]
    } else {
        anyhow::bail!("No such file or directory: {}", path.display());
    };

    println!("\n🎧 Sonance Ingest\n");
    println!("  Source: {}", path.display());
    println!("  Database: {}", config.database_path.display());
    println!("  Audio files: {}", files.len());

    if files.is_empty() {
        println!("\n  Nothing to ingest.");
        return Ok(());
    }

    let fingerprint_config = config.fingerprint.clone();
    let pool = BoundedPool::new(config.pool.clone(), move || {
        Fingerprinter::new(fingerprint_config.clone())
    })
    .context("Failed to build fingerprinter pool")?;

    let store = FingerprintStore::open(&config.database_path, config.fingerprint.hashing.tables)
        .with_context(|| format!("Failed to open {}", config.database_path.display()))?;
    let store = Arc::new(Mutex::new(store));

    let report = ingest_all(store, pool.clone(), files).await;
    pool.drain().await;

    println!();
    for (path, track) in &report.ingested {
        println!("  ✓ {} → {} ({})", path.display(), track.title, track.id);
    }
    for (path, err) in &report.failed {
        println!("  ✗ {}: {}", path.display(), err);
    }

    println!(
        "\n  Stored {} of {} files",
        report.ingested.len(),
        report.total()
    );

    Ok(())
}
