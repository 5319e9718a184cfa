//! Content identity: hashes, storage keys and vector point IDs.
//!
//! Everything here is derived from the normalized bytes, so the same image
//! arriving from two sources maps to the same keys.

use uuid::Uuid;

/// Lowercase hex MD5 of the content.
pub fn content_hash(data: &[u8]) -> String {
    format!("{:x}", md5::compute(data))
}

/// Object storage key, bucketed by the first two hash characters.
pub fn storage_key(content_hash: &str, format: &str) -> String {
    let prefix = content_hash.get(..2).unwrap_or(content_hash);
    format!("{prefix}/{content_hash}.{format}")
}

/// Deterministic point ID for one content hash in one collection.
///
/// Re-ingesting the same content into the same collection overwrites the
/// same point; different collections never collide.
pub fn vector_point_id(content_hash: &str, collection: &str) -> Uuid {
    let name = format!("{content_hash}:{collection}");
    Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes())
}
