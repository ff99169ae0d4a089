use serde::{Deserialize, Serialize};

use crate::model::ids::{SubFingerprintId, TrackId};

/// One bucket value per hash table.
///
/// Element `i` is always the bucket of hash table `i`; the vector length is
/// the store-wide table count `L`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HashVector(Vec<u32>);

impl HashVector {
    #[must_use]
    pub const fn new(bins: Vec<u32>) -> Self {
        Self(bins)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[u32] {
        &self.0
    }

    /// Iterate `(hash_table, hash_bin)` pairs in table order.
    pub fn tables(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.0.iter().enumerate().map(|(table, &bin)| (table as u32, bin))
    }

    /// Number of tables whose buckets collide with `other`.
    #[must_use]
    pub fn matching_tables(&self, other: &Self) -> usize {
        self.0
            .iter()
            .zip(other.0.iter())
            .filter(|(a, b)| a == b)
            .count()
    }
}

impl From<Vec<u32>> for HashVector {
    fn from(bins: Vec<u32>) -> Self {
        Self(bins)
    }
}

/// The hashed fingerprint of one analysis window-block of a track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubFingerprint {
    pub id: SubFingerprintId,

    /// Owning track (foreign key only).
    pub track_id: TrackId,

    /// Position of this block in the track's fingerprint sequence.
    pub sequence_number: u32,

    /// Total number of blocks extracted from the track.
    pub sequences_count: u32,

    /// Offset of the block's first sample, in seconds.
    pub sequence_at: f64,

    pub hashes: HashVector,
}

impl SubFingerprint {
    #[must_use]
    pub fn new(
        track_id: TrackId,
        sequence_number: u32,
        sequences_count: u32,
        sequence_at: f64,
        hashes: HashVector,
    ) -> Self {
        Self {
            id: SubFingerprintId::new(),
            track_id,
            sequence_number,
            sequences_count,
            sequence_at,
            hashes,
        }
    }

    /// Project this sub-fingerprint into its normalized hash rows.
    pub fn hash_rows(&self) -> impl Iterator<Item = Hash> + '_ {
        self.hashes.tables().map(|(hash_table, hash_bin)| Hash {
            hash_table,
            hash_bin,
            track_id: self.track_id,
            sub_fingerprint_id: self.id,
        })
    }
}

/// One element of a hash vector, as stored in the inverted index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Hash {
    pub hash_table: u32,
    pub hash_bin: u32,
    pub track_id: TrackId,
    pub sub_fingerprint_id: SubFingerprintId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_vector_tables() {
        let hashes = HashVector::new(vec![7, 11, 13]);
        let tables: Vec<_> = hashes.tables().collect();
        assert_eq!(tables, vec![(0, 7), (1, 11), (2, 13)]);
    }

    #[test]
    fn test_matching_tables() {
        let a = HashVector::new(vec![1, 2, 3, 4]);
        let b = HashVector::new(vec![1, 0, 3, 0]);
        assert_eq!(a.matching_tables(&b), 2);
        assert_eq!(a.matching_tables(&a), 4);
    }

    #[test]
    fn test_hash_rows_cover_every_table() {
        let track_id = TrackId::new();
        let sub = SubFingerprint::new(track_id, 0, 1, 0.0, HashVector::new(vec![5; 25]));

        let rows: Vec<Hash> = sub.hash_rows().collect();
        assert_eq!(rows.len(), 25);
        assert!(rows.iter().all(|h| h.track_id == track_id && h.sub_fingerprint_id == sub.id));
        assert_eq!(rows[24].hash_table, 24);
    }
}
