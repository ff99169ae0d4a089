use anyhow::Result;

use sonance_core::schema::FingerprintStore;
use sonance_etl::Config;

pub fn show_status(config: &Config, filter: Option<String>) -> Result<()> {
    let db_path = &config.database_path;
    let store = FingerprintStore::open(db_path, config.fingerprint.hashing.tables)?;

    println!("\n📊 Sonance Status\n");
    println!("  Database: {}", db_path.display());
    println!("  Hash tables: {}", store.hash_tables());
    println!("  Tracks: {}", store.track_count()?);
    println!("  Sub-fingerprints: {}", store.sub_fingerprint_count()?);

    let tracks = match filter {
        Some(title) => store.find_tracks_by_title(&title)?,
        None => return Ok(()),
    };

    if tracks.is_empty() {
        println!("\n  No tracks match that title");
        return Ok(());
    }

    println!();
    for track in tracks {
        let subs = store.sub_fingerprints_for_track(track.id)?;
        println!(
            "  {}  {} ({:.1}s, {} sub-fingerprints)",
            track.id,
            track.title,
            track.length_secs,
            subs.len()
        );
    }

    Ok(())
}
