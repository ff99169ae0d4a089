//! Decode, fingerprint and store audio files.
//!
//! A track and all of its sub-fingerprints are written in one store
//! transaction. Nothing is persisted for a file that fails to decode or
//! yields no fingerprints.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use log::{debug, info, warn};
use sonance_core::schema::FingerprintStore;
use sonance_core::{SubFingerprint, Track};
use tokio::task::JoinSet;

use crate::codec;
use crate::error::IngestError;
use crate::fingerprint::Fingerprinter;
use crate::pool::BoundedPool;
use crate::scan::{self, TrackMetadata};

/// Decode `path` and store it as a new track.
///
/// Tags in `metadata` describe the track; a missing title falls back to
/// the file stem.
pub fn ingest_file(
    store: &mut FingerprintStore,
    fingerprinter: &Fingerprinter,
    path: &Path,
    metadata: TrackMetadata,
) -> Result<Track, IngestError> {
    let (track, subs) = fingerprint_file(fingerprinter, path, metadata)?;
    store.insert(&track, &subs)?;
    info!(
        "Ingested {} as {} ({} sub-fingerprints)",
        path.display(),
        track.id,
        subs.len()
    );
    Ok(track)
}

fn fingerprint_file(
    fingerprinter: &Fingerprinter,
    path: &Path,
    metadata: TrackMetadata,
) -> Result<(Track, Vec<SubFingerprint>), IngestError> {
    debug!("Decoding {}", path.display());
    let audio = codec::decode_file(path)?;
    let track = metadata.into_track(&scan::title_from_path(path), audio.duration_secs());

    let hashed = fingerprinter.create_fingerprints(&audio)?;
    if hashed.is_empty() {
        return Err(IngestError::NoFingerprints {
            path: path.to_path_buf(),
        });
    }
    let subs = hashed
        .into_iter()
        .map(|h| h.into_sub_fingerprint(track.id))
        .collect();
    Ok((track, subs))
}

/// Outcome of a batch ingest.
#[derive(Debug, Default)]
pub struct IngestReport {
    pub ingested: Vec<(PathBuf, Track)>,
    pub failed: Vec<(PathBuf, IngestError)>,
}

impl IngestReport {
    #[must_use]
    pub fn total(&self) -> usize {
        self.ingested.len() + self.failed.len()
    }
}

/// Ingest every file in `paths`, at most one per pooled fingerprinter at a
/// time.
///
/// Decoding and fingerprinting run on the blocking thread pool. A failing
/// file is recorded in the report and does not stop the others.
pub async fn ingest_all(
    store: Arc<Mutex<FingerprintStore>>,
    pool: BoundedPool<Fingerprinter>,
    paths: Vec<PathBuf>,
) -> IngestReport {
    let concurrency = pool.config().max_size;
    info!("Ingesting {} files ({} at a time)", paths.len(), concurrency);

    let report = run_batch(paths, concurrency, move |path| {
        ingest_one(Arc::clone(&store), pool.clone(), path)
    })
    .await;

    info!(
        "Ingest complete: {} stored, {} failed",
        report.ingested.len(),
        report.failed.len()
    );
    report
}

/// Run `ingest` for every path with at most `concurrency` in flight.
///
/// A task that panics or is cancelled is reported as
/// [`IngestError::Task`] against its path.
async fn run_batch<F, Fut>(paths: Vec<PathBuf>, concurrency: usize, ingest: F) -> IngestReport
where
    F: Fn(PathBuf) -> Fut,
    Fut: Future<Output = Result<Track, IngestError>> + Send + 'static,
{
    let mut report = IngestReport::default();
    let mut tasks = JoinSet::new();
    let mut in_flight = HashMap::new();
    let mut pending = paths.into_iter();

    loop {
        while tasks.len() < concurrency.max(1) {
            let Some(path) = pending.next() else { break };
            let handle = tasks.spawn(ingest(path.clone()));
            in_flight.insert(handle.id(), path);
        }

        let Some(joined) = tasks.join_next_with_id().await else {
            break;
        };
        let (id, outcome) = match joined {
            Ok((id, result)) => (id, result),
            Err(e) => (e.id(), Err(IngestError::Task(e.to_string()))),
        };
        let Some(path) = in_flight.remove(&id) else {
            continue;
        };
        match outcome {
            Ok(track) => report.ingested.push((path, track)),
            Err(e) => {
                warn!("Skipping {}: {}", path.display(), e);
                report.failed.push((path, e));
            }
        }
    }

    report
}

async fn ingest_one(
    store: Arc<Mutex<FingerprintStore>>,
    pool: BoundedPool<Fingerprinter>,
    path: PathBuf,
) -> Result<Track, IngestError> {
    let fingerprinter = pool.acquire().await?;

    tokio::task::spawn_blocking(move || {
        let metadata = scan::read_track_metadata(&path);
        let (track, subs) = fingerprint_file(&fingerprinter, &path, metadata)?;
        drop(fingerprinter);

        let mut store = store.lock().unwrap_or_else(PoisonError::into_inner);
        store.insert(&track, &subs)?;
        debug!(
            "Stored {} ({} sub-fingerprints)",
            path.display(),
            subs.len()
        );
        Ok(track)
    })
    .await
    .map_err(|e| IngestError::Task(e.to_string()))?
}
