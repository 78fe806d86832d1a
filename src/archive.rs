//! Content-addressed stores of serialized creation records.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

use crate::{Hash, ResourceKind};

#[derive(Debug)]
pub enum ArchiveError {
    Io(io::Error),
    NotADirectory(PathBuf),
    UnknownEntry { kind: ResourceKind, hash: Hash },
}

impl From<io::Error> for ArchiveError {
    fn from(err: io::Error) -> Self {
        ArchiveError::Io(err)
    }
}

/// Read-only access to an archive: enumerate the hashes of a category and
/// fetch the serialized record for a `(category, hash)` key.
pub trait Archive {
    fn hashes(&self, kind: ResourceKind) -> Result<Vec<Hash>, ArchiveError>;
    fn read(&self, kind: ResourceKind, hash: Hash) -> Result<Vec<u8>, ArchiveError>;
}

/// On-disk archive: one subdirectory per category, one JSON record per
/// file, named by the zero-padded hex hash (`<root>/samplers/00000000000000a1.json`).
pub struct DirectoryArchive {
    root: PathBuf,
}

impl DirectoryArchive {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, ArchiveError> {
        let root = root.into();
        if !root.is_dir() {
            return Err(ArchiveError::NotADirectory(root));
        }
        Ok(Self { root })
    }

    fn entry_path(&self, kind: ResourceKind, hash: Hash) -> PathBuf {
        self.root
            .join(kind.directory_name())
            .join(format!("{:016x}.json", hash))
    }
}

impl Archive for DirectoryArchive {
    fn hashes(&self, kind: ResourceKind) -> Result<Vec<Hash>, ArchiveError> {
        let dir = self.root.join(kind.directory_name());
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut hashes = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().map_or(true, |ext| ext != "json") {
                continue;
            }
            let stem = match path.file_stem().and_then(|stem| stem.to_str()) {
                Some(stem) => stem,
                None => continue,
            };
            match Hash::from_str_radix(stem, 16) {
                Ok(hash) => hashes.push(hash),
                Err(_) => {
                    log::warn!("Ignoring archive entry with malformed name: {}", path.display())
                }
            }
        }
        hashes.sort_unstable();
        Ok(hashes)
    }

    fn read(&self, kind: ResourceKind, hash: Hash) -> Result<Vec<u8>, ArchiveError> {
        let path = self.entry_path(kind, hash);
        match std::fs::read(&path) {
            Ok(blob) => Ok(blob),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                Err(ArchiveError::UnknownEntry { kind, hash })
            }
            Err(err) => Err(ArchiveError::Io(err)),
        }
    }
}

/// In-memory archive for tests and embedders. Hash enumeration preserves
/// insertion order.
#[derive(Default)]
pub struct MemoryArchive {
    entries: HashMap<ResourceKind, Vec<(Hash, Vec<u8>)>>,
}

impl MemoryArchive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, kind: ResourceKind, hash: Hash, blob: Vec<u8>) {
        self.entries.entry(kind).or_default().push((hash, blob));
    }
}

impl Archive for MemoryArchive {
    fn hashes(&self, kind: ResourceKind) -> Result<Vec<Hash>, ArchiveError> {
        Ok(self
            .entries
            .get(&kind)
            .map(|entries| entries.iter().map(|(hash, _)| *hash).collect())
            .unwrap_or_default())
    }

    fn read(&self, kind: ResourceKind, hash: Hash) -> Result<Vec<u8>, ArchiveError> {
        self.entries
            .get(&kind)
            .and_then(|entries| {
                entries
                    .iter()
                    .find(|(entry_hash, _)| *entry_hash == hash)
                    .map(|(_, blob)| blob.clone())
            })
            .ok_or(ArchiveError::UnknownEntry { kind, hash })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_rejects_missing_root() {
        let result = DirectoryArchive::open("/nonexistent/archive/path");
        assert!(matches!(result, Err(ArchiveError::NotADirectory(_))));
    }

    #[test]
    fn directory_archive_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let samplers = dir.path().join("samplers");
        std::fs::create_dir(&samplers).unwrap();
        std::fs::write(samplers.join(format!("{:016x}.json", 0xa1u64)), b"{}").unwrap();
        std::fs::write(samplers.join(format!("{:016x}.json", 0x03u64)), b"{}").unwrap();
        std::fs::write(samplers.join("README.txt"), b"notes").unwrap();

        let archive = DirectoryArchive::open(dir.path()).unwrap();
        assert_eq!(archive.hashes(ResourceKind::Sampler).unwrap(), vec![0x03, 0xa1]);
        assert_eq!(archive.read(ResourceKind::Sampler, 0xa1).unwrap(), b"{}");
        assert!(archive.hashes(ResourceKind::RenderPass).unwrap().is_empty());
        assert!(matches!(
            archive.read(ResourceKind::Sampler, 0xFF),
            Err(ArchiveError::UnknownEntry { .. })
        ));
    }

    #[test]
    fn memory_archive_preserves_insertion_order() {
        let mut archive = MemoryArchive::new();
        archive.insert(ResourceKind::ShaderModule, 0x3, b"a".to_vec());
        archive.insert(ResourceKind::ShaderModule, 0x1, b"b".to_vec());
        assert_eq!(
            archive.hashes(ResourceKind::ShaderModule).unwrap(),
            vec![0x3, 0x1]
        );
        assert_eq!(archive.read(ResourceKind::ShaderModule, 0x1).unwrap(), b"b");
    }
}
