use std::collections::HashMap;
use std::path::Path;

use log::{debug, info};
use sonance_core::schema::FingerprintStore;
use sonance_core::{Track, TrackId};
use sonance_etl::codec::{self, ByteStream, ContainerKind, DecodedAudio};
use sonance_etl::{Fingerprinter, HashedFingerprint};

use crate::error::SearchError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryOptions {
    /// Minimum number of hash tables a stored sub-fingerprint must share
    /// with a query fingerprint to count as a candidate.
    pub threshold_votes: u32,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self { threshold_votes: 5 }
    }
}

/// A stored track that matched a query.
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarTrack {
    pub track: Track,
    /// Match ratio in `0..=1`: the most table collisions any single query
    /// fingerprint had with this track, over the number of hash tables.
    pub score: f64,
    /// Table collisions with this track summed over every query
    /// fingerprint that reached the vote threshold.
    pub votes: u32,
    /// Query fingerprints that reached the vote threshold for this track.
    pub matched_fingerprints: usize,
}

#[derive(Debug, Default, Clone, Copy)]
struct Tally {
    votes: u32,
    matched_fingerprints: usize,
    best: u32,
}

/// Ranks stored tracks by hash collisions with a query clip.
#[derive(Debug)]
pub struct QueryEngine<'a> {
    store: &'a FingerprintStore,
    fingerprinter: &'a Fingerprinter,
    options: QueryOptions,
}

impl<'a> QueryEngine<'a> {
    pub fn new(
        store: &'a FingerprintStore,
        fingerprinter: &'a Fingerprinter,
        options: QueryOptions,
    ) -> Result<Self, SearchError> {
        if store.hash_tables() != fingerprinter.tables() {
            return Err(SearchError::TableMismatch {
                store: store.hash_tables(),
                fingerprinter: fingerprinter.tables(),
            });
        }
        if options.threshold_votes == 0 || options.threshold_votes as usize > store.hash_tables() {
            return Err(SearchError::InvalidOptions(format!(
                "threshold_votes must be between 1 and {}, got {}",
                store.hash_tables(),
                options.threshold_votes
            )));
        }
        Ok(Self {
            store,
            fingerprinter,
            options,
        })
    }

    #[must_use]
    pub const fn options(&self) -> QueryOptions {
        self.options
    }

    /// Decode a clip and return the `top_k` most similar stored tracks.
    pub fn find_similar(
        &self,
        stream: ByteStream,
        top_k: usize,
    ) -> Result<Vec<SimilarTrack>, SearchError> {
        let audio = codec::decode(stream, None)?;
        self.find_similar_audio(&audio, top_k)
    }

    /// [`find_similar`](Self::find_similar) for a file, using its
    /// extension as the container hint.
    pub fn find_similar_file(
        &self,
        path: &Path,
        top_k: usize,
    ) -> Result<Vec<SimilarTrack>, SearchError> {
        let hint = path
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(ContainerKind::from_extension);
        let audio = codec::decode(ByteStream::open(path)?, hint)?;
        self.find_similar_audio(&audio, top_k)
    }

    /// Query with decoded audio. The clip is cut at the query stride, so it
    /// need not start on a stored image boundary.
    pub fn find_similar_audio(
        &self,
        audio: &DecodedAudio,
        top_k: usize,
    ) -> Result<Vec<SimilarTrack>, SearchError> {
        let fingerprints = self.fingerprinter.create_query_fingerprints(audio)?;
        self.find_similar_fingerprints(&fingerprints, top_k)
    }

    /// Rank stored tracks against already-hashed query fingerprints.
    ///
    /// Each query fingerprint's per-track collision counts come from
    /// [`FingerprintStore::query`]; a count below the vote threshold is
    /// ignored, the rest add up to the track's votes. Ties go to the track
    /// matched by more query fingerprints, then to the lower track id.
    pub fn find_similar_fingerprints(
        &self,
        fingerprints: &[HashedFingerprint],
        top_k: usize,
    ) -> Result<Vec<SimilarTrack>, SearchError> {
        if fingerprints.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        let tables = self.store.hash_tables() as u32;
        let mut tallies: HashMap<TrackId, Tally> = HashMap::new();
        for fingerprint in fingerprints {
            let collisions = self.store.query(&fingerprint.hashes)?;
            for (track_id, count) in collisions {
                if count < self.options.threshold_votes {
                    continue;
                }
                let tally = tallies.entry(track_id).or_default();
                tally.votes += count;
                tally.matched_fingerprints += 1;
                tally.best = tally.best.max(count.min(tables));
            }
        }

        let mut ranked: Vec<(TrackId, Tally)> = tallies.into_iter().collect();
        ranked.sort_by(|(a_id, a), (b_id, b)| {
            b.votes
                .cmp(&a.votes)
                .then_with(|| b.matched_fingerprints.cmp(&a.matched_fingerprints))
                .then_with(|| a_id.cmp(b_id))
        });
        ranked.truncate(top_k);

        let mut results = Vec::with_capacity(ranked.len());
        for (track_id, tally) in ranked {
            // A track deleted since the bucket scan is dropped.
            let Some(track) = self.store.get_track(track_id)? else {
                debug!("Track {} vanished during query", track_id);
                continue;
            };
            results.push(SimilarTrack {
                track,
                score: f64::from(tally.best) / f64::from(tables),
                votes: tally.votes,
                matched_fingerprints: tally.matched_fingerprints,
            });
        }

        info!(
            "Query of {} fingerprints matched {} tracks",
            fingerprints.len(),
            results.len()
        );
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sonance_core::{HashVector, SubFingerprint};
    use sonance_etl::FingerprintConfig;

    const L: usize = 25;

    fn hashed(bins: Vec<u32>) -> HashedFingerprint {
        HashedFingerprint {
            sequence_number: 0,
            sequences_count: 1,
            sequence_at: 0.0,
            hashes: HashVector::new(bins),
        }
    }

    /// A vector sharing its first `shared` buckets with `base`.
    fn partial(base: &[u32], shared: usize) -> Vec<u32> {
        base.iter()
            .enumerate()
            .map(|(i, &b)| if i < shared { b } else { b + 1_000 })
            .collect()
    }

    fn insert(store: &mut FingerprintStore, title: &str, vectors: &[Vec<u32>]) -> Track {
        let track = Track::new(title, 10.0);
        let subs: Vec<SubFingerprint> = vectors
            .iter()
            .enumerate()
            .map(|(i, bins)| {
                SubFingerprint::new(
                    track.id,
                    i as u32,
                    vectors.len() as u32,
                    i as f64,
                    HashVector::new(bins.clone()),
                )
            })
            .collect();
        store.insert(&track, &subs).unwrap();
        track
    }

    fn setup() -> (FingerprintStore, Fingerprinter) {
        let fingerprinter = Fingerprinter::new(FingerprintConfig::default()).unwrap();
        let store = FingerprintStore::open_in_memory(L).unwrap();
        (store, fingerprinter)
    }

    #[test]
    fn test_ranks_by_votes() {
        let (mut store, fingerprinter) = setup();
        let query: Vec<u32> = (0..L as u32).collect();
        let strong = insert(&mut store, "strong", &[partial(&query, 20)]);
        let weak = insert(&mut store, "weak", &[partial(&query, 8)]);
        insert(&mut store, "below threshold", &[partial(&query, 4)]);

        let engine = QueryEngine::new(&store, &fingerprinter, QueryOptions::default()).unwrap();
        let results = engine.find_similar_fingerprints(&[hashed(query)], 10).unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].track.id, strong.id);
        assert_eq!(results[0].votes, 20);
        assert!((results[0].score - 0.8).abs() < 1e-9);
        assert_eq!(results[1].track.id, weak.id);
        assert_eq!(results[1].matched_fingerprints, 1);
    }

    #[test]
    fn test_collisions_add_up_across_sub_fingerprints() {
        let (mut store, fingerprinter) = setup();
        let query: Vec<u32> = (0..L as u32).collect();
        let repeats = insert(
            &mut store,
            "repeats",
            &[partial(&query, 10), partial(&query, 15)],
        );
        // Neither sub-fingerprint reaches the threshold alone; together
        // they do.
        let scattered = insert(
            &mut store,
            "scattered",
            &[partial(&query, 3), partial(&query, 3)],
        );

        let engine = QueryEngine::new(&store, &fingerprinter, QueryOptions::default()).unwrap();
        let results = engine.find_similar_fingerprints(&[hashed(query)], 10).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].track.id, repeats.id);
        assert_eq!(results[0].votes, 25);
        assert_eq!(results[1].track.id, scattered.id);
        assert_eq!(results[1].votes, 6);
    }

    #[test]
    fn test_score_is_best_fingerprint_capped_at_one() {
        let (mut store, fingerprinter) = setup();
        let q1: Vec<u32> = (0..L as u32).collect();
        let q2: Vec<u32> = (100..100 + L as u32).collect();
        let doubled = insert(&mut store, "doubled", &[q1.clone(), q1.clone(), partial(&q2, 10)]);

        let engine = QueryEngine::new(&store, &fingerprinter, QueryOptions::default()).unwrap();
        let results = engine
            .find_similar_fingerprints(&[hashed(q1), hashed(q2)], 10)
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].track.id, doubled.id);
        assert_eq!(results[0].votes, 60);
        assert_eq!(results[0].matched_fingerprints, 2);
        assert!((results[0].score - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_top_k_truncates() {
        let (mut store, fingerprinter) = setup();
        let query: Vec<u32> = (0..L as u32).collect();
        for (i, shared) in [6, 7, 8, 9].into_iter().enumerate() {
            insert(&mut store, &format!("t{i}"), &[partial(&query, shared)]);
        }

        let engine = QueryEngine::new(&store, &fingerprinter, QueryOptions::default()).unwrap();
        let results = engine.find_similar_fingerprints(&[hashed(query.clone())], 2).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].votes, 9);
        assert!(engine
            .find_similar_fingerprints(&[hashed(query)], 0)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_no_match_is_empty() {
        let (store, fingerprinter) = setup();
        let engine = QueryEngine::new(&store, &fingerprinter, QueryOptions::default()).unwrap();
        let query: Vec<u32> = (0..L as u32).collect();
        assert!(engine.find_similar_fingerprints(&[hashed(query)], 5).unwrap().is_empty());
        assert!(engine.find_similar_fingerprints(&[], 5).unwrap().is_empty());
    }

    #[test]
    fn test_table_mismatch_rejected() {
        let fingerprinter = Fingerprinter::new(FingerprintConfig::default()).unwrap();
        let store = FingerprintStore::open_in_memory(20).unwrap();
        assert!(matches!(
            QueryEngine::new(&store, &fingerprinter, QueryOptions::default()),
            Err(SearchError::TableMismatch {
                store: 20,
                fingerprinter: 25
            })
        ));
    }

    #[test]
    fn test_threshold_out_of_range_rejected() {
        let (store, fingerprinter) = setup();
        for threshold_votes in [0, 26] {
            assert!(matches!(
                QueryEngine::new(&store, &fingerprinter, QueryOptions { threshold_votes }),
                Err(SearchError::InvalidOptions(_))
            ));
        }
    }
}
