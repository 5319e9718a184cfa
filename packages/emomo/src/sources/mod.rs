//! Source implementations.
//!
//! - `DirectorySource` - images in a local folder tree, one category per
//!   first-level sub-directory

pub mod directory;

pub use directory::DirectorySource;
