//! Image normalization and content identity.

pub mod format;
pub mod identity;

pub use format::{
    content_type_for, detect_format, dimensions, normalize, normalize_claimed, MediaFormat,
    NormalizedImage,
};
pub use identity::{content_hash, storage_key, vector_point_id};
