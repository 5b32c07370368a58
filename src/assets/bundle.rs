use std::convert::TryFrom;
use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};

use super::AssetError;

pub const BUNDLE_MAGIC: &[u8; 4] = b"HBDL";
pub const BUNDLE_VERSION: u32 = 1;

const HEADER_LEN: u64 = 16;

/// File entry from the bundle table of contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleEntry {
    pub name: String,
    pub offset: u64,
    pub size: u64,
}

/// Every asset of a scene packed into one file, so the browser needs a single fetch.
#[derive(Debug, Clone)]
pub struct AssetBundle {
    backing: BundleBacking,
    version: u32,
    entries: Vec<BundleEntry>,
}

#[derive(Debug, Clone)]
enum BundleBacking {
    File(PathBuf),
    Memory(Arc<[u8]>),
}

impl AssetBundle {
    /// Opens a bundle on disk. Only the table of contents is kept in memory.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, AssetError> {
        let path_buf = path.as_ref().to_path_buf();
        let io_error = |source| AssetError::Io {
            path: path_buf.display().to_string(),
            source,
        };
        let mut file = File::open(&path_buf).map_err(io_error)?;
        let file_len = file.metadata().map_err(io_error)?.len();

        let mut header = [0u8; HEADER_LEN as usize];
        file.read_exact(&mut header).map_err(|_| {
            AssetError::Malformed(format!("bundle too small to contain header (len={file_len})"))
        })?;
        let (version, toc_offset) = parse_header(&header, file_len)?;

        let toc_len = usize::try_from(file_len - toc_offset)
            .map_err(|_| AssetError::Malformed("table of contents too large".to_string()))?;
        let mut toc = vec![0u8; toc_len];
        file.seek(SeekFrom::Start(toc_offset)).map_err(io_error)?;
        file.read_exact(&mut toc).map_err(io_error)?;
        let entries = parse_toc(&toc, toc_offset)?;

        Ok(Self {
            backing: BundleBacking::File(path_buf),
            version,
            entries,
        })
    }

    /// Creates a bundle from bytes already resident in memory.
    pub fn from_bytes(data: Vec<u8>) -> Result<Self, AssetError> {
        let storage: Arc<[u8]> = Arc::from(data.into_boxed_slice());
        let file_len = storage.len() as u64;
        if file_len < HEADER_LEN {
            return Err(AssetError::Malformed(format!(
                "bundle too small to contain header (len={file_len})"
            )));
        }
        let (version, toc_offset) = parse_header(&storage[..HEADER_LEN as usize], file_len)?;
        let entries = parse_toc(&storage[toc_offset as usize..], toc_offset)?;
        Ok(Self {
            backing: BundleBacking::Memory(storage),
            version,
            entries,
        })
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn entries(&self) -> &[BundleEntry] {
        &self.entries
    }

    pub fn entry(&self, name: &str) -> Option<&BundleEntry> {
        self.entries.iter().find(|entry| entry.name == name)
    }

    /// Reads the bytes stored under `name`.
    pub fn read(&self, name: &str) -> Result<Vec<u8>, AssetError> {
        let entry = self
            .entry(name)
            .ok_or_else(|| AssetError::NotFound(name.to_string()))?;
        match &self.backing {
            BundleBacking::File(path) => {
                let io_error = |source| AssetError::Io {
                    path: format!("{}:{}", path.display(), entry.name),
                    source,
                };
                let mut file = File::open(path).map_err(io_error)?;
                file.seek(SeekFrom::Start(entry.offset)).map_err(io_error)?;
                let mut buffer = vec![0u8; entry.size as usize];
                file.read_exact(&mut buffer).map_err(io_error)?;
                Ok(buffer)
            }
            BundleBacking::Memory(data) => {
                let start = entry.offset as usize;
                let end = start + entry.size as usize;
                data.get(start..end).map(<[u8]>::to_vec).ok_or_else(|| {
                    AssetError::Malformed(format!(
                        "entry {} extends past bundle bounds ({end} > {})",
                        entry.name,
                        data.len()
                    ))
                })
            }
        }
    }
}

/// Collects files and writes them out as a bundle.
#[derive(Debug, Default)]
pub struct BundleWriter {
    files: Vec<(String, Vec<u8>)>,
}

impl BundleWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds every file below `root`, named by its `/`-separated relative path.
    pub fn add_directory(&mut self, root: &Path) -> Result<usize> {
        let mut found = Vec::new();
        collect_files(root, root, &mut found)?;
        found.sort();
        let count = found.len();
        for (name, path) in found {
            let bytes = fs::read(&path).with_context(|| format!("reading {}", path.display()))?;
            self.add_file(name, bytes);
        }
        Ok(count)
    }

    pub fn add_file(&mut self, name: impl Into<String>, bytes: Vec<u8>) {
        let name = name.into();
        self.files.retain(|(existing, _)| *existing != name);
        self.files.push((name, bytes));
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Serialises the bundle into memory.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buffer = Vec::new();
        buffer.extend_from_slice(BUNDLE_MAGIC);
        buffer.extend_from_slice(&BUNDLE_VERSION.to_le_bytes());
        buffer.extend_from_slice(&0u64.to_le_bytes());

        let mut entries = Vec::with_capacity(self.files.len());
        for (name, bytes) in &self.files {
            entries.push((name.as_str(), buffer.len() as u64, bytes.len() as u64));
            buffer.extend_from_slice(bytes);
        }

        let toc_offset = buffer.len() as u64;
        buffer.extend_from_slice(&(entries.len() as u32).to_le_bytes());
        for (name, offset, size) in entries {
            buffer.extend_from_slice(&(name.len() as u32).to_le_bytes());
            buffer.extend_from_slice(name.as_bytes());
            buffer.extend_from_slice(&offset.to_le_bytes());
            buffer.extend_from_slice(&size.to_le_bytes());
        }
        buffer[8..16].copy_from_slice(&toc_offset.to_le_bytes());
        buffer
    }

    pub fn write_to(&self, path: &Path) -> Result<()> {
        let mut file =
            File::create(path).with_context(|| format!("creating bundle {}", path.display()))?;
        file.write_all(&self.to_bytes())
            .with_context(|| format!("writing bundle {}", path.display()))
    }
}

fn collect_files(root: &Path, dir: &Path, out: &mut Vec<(String, PathBuf)>) -> Result<()> {
    for entry in fs::read_dir(dir).with_context(|| format!("listing {}", dir.display()))? {
        let path = entry?.path();
        if path.is_dir() {
            collect_files(root, &path, out)?;
        } else {
            let relative = path
                .strip_prefix(root)
                .with_context(|| format!("{} is outside {}", path.display(), root.display()))?;
            let name = relative
                .components()
                .map(|component| component.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            out.push((name, path));
        }
    }
    Ok(())
}

fn parse_header(header: &[u8], file_len: u64) -> Result<(u32, u64), AssetError> {
    let magic = &header[..4];
    if magic != BUNDLE_MAGIC {
        return Err(AssetError::Malformed(format!(
            "invalid magic: expected HBDL, found {magic:?}"
        )));
    }
    let version = u32::from_le_bytes(header[4..8].try_into().expect("4-byte slice"));
    if version != BUNDLE_VERSION {
        return Err(AssetError::Malformed(format!(
            "unsupported bundle version {version}"
        )));
    }
    let toc_offset = u64::from_le_bytes(header[8..16].try_into().expect("8-byte slice"));
    if toc_offset < HEADER_LEN || toc_offset.saturating_add(4) > file_len {
        return Err(AssetError::Malformed(format!(
            "table of contents offset {toc_offset} is outside file bounds (len={file_len})"
        )));
    }
    Ok((version, toc_offset))
}

/// Parses the table of contents. `toc` runs from `toc_offset` to the end of the file.
fn parse_toc(toc: &[u8], toc_offset: u64) -> Result<Vec<BundleEntry>, AssetError> {
    let mut cursor = 0usize;
    let count = read_u32(toc, &mut cursor)?;
    let mut entries = Vec::with_capacity(count.min(4096) as usize);

    for _ in 0..count {
        let name_len = read_u32(toc, &mut cursor)? as usize;
        let name_bytes = cursor
            .checked_add(name_len)
            .and_then(|end| toc.get(cursor..end))
            .ok_or_else(|| AssetError::Malformed("entry name extends past end of file".into()))?;
        let name = String::from_utf8(name_bytes.to_vec())
            .map_err(|err| AssetError::Malformed(format!("invalid UTF-8 in entry name: {err}")))?;
        cursor += name_len;

        let offset = read_u64(toc, &mut cursor)?;
        let size = read_u64(toc, &mut cursor)?;
        if offset < HEADER_LEN
            || offset
                .checked_add(size)
                .filter(|end| *end <= toc_offset)
                .is_none()
        {
            return Err(AssetError::Malformed(format!(
                "entry {name} points outside the payload region (offset={offset}, size={size})"
            )));
        }
        entries.push(BundleEntry { name, offset, size });
    }

    if cursor != toc.len() {
        return Err(AssetError::Malformed(format!(
            "table of contents ended at {}, expected {}",
            toc_offset + cursor as u64,
            toc_offset + toc.len() as u64
        )));
    }
    Ok(entries)
}

fn read_u32(data: &[u8], cursor: &mut usize) -> Result<u32, AssetError> {
    let bytes = data
        .get(*cursor..*cursor + 4)
        .ok_or_else(|| AssetError::Malformed("unexpected end of bundle".into()))?;
    *cursor += 4;
    Ok(u32::from_le_bytes(bytes.try_into().expect("4-byte slice")))
}

fn read_u64(data: &[u8], cursor: &mut usize) -> Result<u64, AssetError> {
    let bytes = data
        .get(*cursor..*cursor + 8)
        .ok_or_else(|| AssetError::Malformed("unexpected end of bundle".into()))?;
    *cursor += 8;
    Ok(u64::from_le_bytes(bytes.try_into().expect("8-byte slice")))
}
