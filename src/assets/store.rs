use std::fs;
use std::path::{Path, PathBuf};

use super::{AssetBundle, AssetError};

/// Where scene-relative asset paths are resolved.
#[derive(Debug, Clone)]
pub enum AssetStore {
    Directory(PathBuf),
    Bundle(AssetBundle),
}

impl AssetStore {
    /// Opens a directory, or a bundle when `path` is a file.
    pub fn open(path: &Path) -> Result<Self, AssetError> {
        if path.is_dir() {
            Ok(Self::Directory(path.to_path_buf()))
        } else {
            AssetBundle::open(path).map(Self::Bundle)
        }
    }

    /// Reads the bytes for a scene-relative path such as `/textures/Sky/px.png`.
    pub fn read(&self, path: &str) -> Result<Vec<u8>, AssetError> {
        let name = normalize_path(path);
        match self {
            Self::Directory(root) => {
                let full = root.join(&name);
                fs::read(&full).map_err(|source| {
                    if source.kind() == std::io::ErrorKind::NotFound {
                        AssetError::NotFound(name)
                    } else {
                        AssetError::Io {
                            path: full.display().to_string(),
                            source,
                        }
                    }
                })
            }
            Self::Bundle(bundle) => bundle.read(&name),
        }
    }

    /// Reads a UTF-8 text asset.
    pub fn read_to_string(&self, path: &str) -> Result<String, AssetError> {
        let bytes = self.read(path)?;
        String::from_utf8(bytes)
            .map_err(|err| AssetError::Malformed(format!("{path} is not valid UTF-8: {err}")))
    }

    pub fn describe(&self) -> String {
        match self {
            Self::Directory(root) => format!("directory {}", root.display()),
            Self::Bundle(bundle) => format!("bundle with {} entries", bundle.entries().len()),
        }
    }
}

/// Strips leading `/` and `./` and collapses backslashes, so URL-style and
/// relative spellings of the same file resolve to one bundle entry.
pub fn normalize_path(path: &str) -> String {
    let unified = path.replace('\\', "/");
    let mut trimmed = unified.as_str();
    loop {
        if let Some(rest) = trimmed.strip_prefix("./") {
            trimmed = rest;
        } else if let Some(rest) = trimmed.strip_prefix('/') {
            trimmed = rest;
        } else {
            break;
        }
    }
    trimmed.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::BundleWriter;
    use tempfile::tempdir;

    #[test]
    fn normalize_strips_url_prefixes() {
        assert_eq!(normalize_path("/textures/a.png"), "textures/a.png");
        assert_eq!(normalize_path("./textures/a.png"), "textures/a.png");
        assert_eq!(normalize_path("textures\\a.png"), "textures/a.png");
        assert_eq!(normalize_path("textures/a.png"), "textures/a.png");
    }

    #[test]
    fn directory_store_reads_absolute_style_paths() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("textures")).unwrap();
        fs::write(dir.path().join("textures/a.png"), [7u8, 8]).unwrap();
        let store = AssetStore::open(dir.path()).unwrap();
        assert_eq!(store.read("/textures/a.png").unwrap(), vec![7, 8]);
        assert!(matches!(
            store.read("/textures/missing.png"),
            Err(AssetError::NotFound(_))
        ));
    }

    #[test]
    fn bundle_store_reads_entries() {
        let mut writer = BundleWriter::new();
        writer.add_file("scene.xml", b"<scene/>".to_vec());
        let store =
            AssetStore::Bundle(AssetBundle::from_bytes(writer.to_bytes()).unwrap());
        assert_eq!(store.read_to_string("/scene.xml").unwrap(), "<scene/>");
    }
}
