use anyhow::Result;

use sonance_core::schema::FingerprintStore;
use sonance_core::{Error, TrackId};
use sonance_etl::Config;

/// Delete by id when `track` parses as one, otherwise every track with that
/// exact title.
pub fn run_delete(config: &Config, track: &str) -> Result<()> {
    let mut store = FingerprintStore::open(&config.database_path, config.fingerprint.hashing.tables)?;

    let ids: Vec<TrackId> = match track.parse::<TrackId>() {
        Ok(id) => vec![id],
        Err(_) => store
            .find_tracks_by_title(track)?
            .into_iter()
            .map(|t| t.id)
            .collect(),
    };

    if ids.is_empty() {
        anyhow::bail!("No track with id or title '{}'", track);
    }

    let mut removed = 0;
    for id in ids {
        match store.delete_track(id) {
            Ok(()) => {
                println!("✓ Deleted {}", id);
                removed += 1;
            }
            Err(Error::NotFound { .. }) => println!("No track with id {}", id),
            Err(e) => return Err(e.into()),
        }
    }

    log::info!("Deleted {} track(s)", removed);
    Ok(())
}
