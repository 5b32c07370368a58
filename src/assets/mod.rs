//! Asset sources: a directory on disk or a single-file bundle.

mod bundle;
mod store;

pub use bundle::{AssetBundle, BundleEntry, BundleWriter, BUNDLE_MAGIC, BUNDLE_VERSION};
pub use store::{normalize_path, AssetStore};

use thiserror::Error;

/// Failure to fetch raw bytes for an asset.
#[derive(Debug, Error)]
pub enum AssetError {
    #[error("asset not found: {0}")]
    NotFound(String),
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed bundle: {0}")]
    Malformed(String),
}
