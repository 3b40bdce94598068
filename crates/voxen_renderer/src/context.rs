//! Where a scene's files live.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

pub const SCENE_SUFFIX: &str = ".json";
pub const OCTREE_SUFFIX: &str = ".octree";
pub const DUMP_SUFFIX: &str = ".dump";
pub const GRASS_SUFFIX: &str = ".grass";
pub const FOLIAGE_SUFFIX: &str = ".foliage";
pub const BACKUP_SUFFIX: &str = ".backup";

/// Scene directory and file naming.
#[derive(Debug, Clone)]
pub struct RenderContext {
    scene_dir: PathBuf,
}

impl RenderContext {
    pub fn new(scene_dir: impl Into<PathBuf>) -> Self {
        Self {
            scene_dir: scene_dir.into(),
        }
    }

    pub fn scene_dir(&self) -> &Path {
        &self.scene_dir
    }

    /// `<scene dir>/<name><suffix>`.
    pub fn file(&self, name: &str, suffix: &str) -> PathBuf {
        self.scene_dir.join(format!("{}{}", name, suffix))
    }

    pub fn scene_file(&self, name: &str) -> PathBuf {
        self.file(name, SCENE_SUFFIX)
    }

    /// PNG snapshot taken at `spp` samples.
    pub fn snapshot_file(&self, name: &str, spp: u32) -> PathBuf {
        self.scene_dir.join(format!("{}-{}.png", name, spp))
    }

    /// Open a file for writing, keeping the previous version as a backup.
    pub fn create(&self, path: &Path) -> io::Result<BufWriter<File>> {
        fs::create_dir_all(&self.scene_dir)?;
        backup_file(path)?;
        Ok(BufWriter::new(File::create(path)?))
    }

    /// Write a gzip compressed file through `write`.
    pub fn write_gzip<F>(&self, path: &Path, write: F) -> io::Result<()>
    where
        F: FnOnce(&mut dyn Write) -> io::Result<()>,
    {
        let mut encoder = GzEncoder::new(self.create(path)?, Compression::default());
        write(&mut encoder)?;
        encoder.finish()?.flush()
    }

    /// Read a gzip compressed file through `read`.
    pub fn read_gzip<T, F>(&self, path: &Path, read: F) -> io::Result<T>
    where
        F: FnOnce(&mut dyn Read) -> io::Result<T>,
    {
        let mut decoder = GzDecoder::new(BufReader::new(File::open(path)?));
        read(&mut decoder)
    }
}

/// Rename an existing file to `<file>.backup`, replacing an older backup.
pub fn backup_file(path: &Path) -> io::Result<()> {
    if !path.is_file() {
        return Ok(());
    }
    let mut backup = path.as_os_str().to_owned();
    backup.push(BACKUP_SUFFIX);
    let backup = PathBuf::from(backup);
    if backup.exists() {
        fs::remove_file(&backup)?;
    }
    log::debug!("Backing up {} to {}", path.display(), backup.display());
    fs::rename(path, backup)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_file_names() {
        let context = RenderContext::new("/scenes");
        assert_eq!(context.scene_file("test"), PathBuf::from("/scenes/test.json"));
        assert_eq!(context.file("test", OCTREE_SUFFIX), PathBuf::from("/scenes/test.octree"));
        assert_eq!(context.snapshot_file("test", 250), PathBuf::from("/scenes/test-250.png"));
    }

    #[test]
    fn test_gzip_roundtrip_with_backup() {
        let dir = tempdir().unwrap();
        let context = RenderContext::new(dir.path());
        let path = context.file("a", DUMP_SUFFIX);

        context.write_gzip(&path, |w| w.write_all(b"first")).unwrap();
        context.write_gzip(&path, |w| w.write_all(b"second")).unwrap();

        let read = |path: &Path| {
            context
                .read_gzip(path, |r| {
                    let mut s = String::new();
                    r.read_to_string(&mut s)?;
                    Ok(s)
                })
                .unwrap()
        };
        assert_eq!(read(&path), "second");
        assert_eq!(read(&dir.path().join("a.dump.backup")), "first");
    }

    #[test]
    fn test_read_missing_file() {
        let dir = tempdir().unwrap();
        let context = RenderContext::new(dir.path());
        let result = context.read_gzip(&context.file("none", OCTREE_SUFFIX), |_| Ok(()));
        assert!(result.is_err());
    }
}
