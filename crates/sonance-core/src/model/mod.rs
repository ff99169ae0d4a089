pub mod fingerprint;
pub mod ids;
pub mod track;

pub use fingerprint::{Hash, HashVector, SubFingerprint};
pub use ids::{SubFingerprintId, TrackId};
pub use track::Track;
