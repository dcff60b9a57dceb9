use crate::error::Result;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Atomically write `data` to `path` using a tempfile in the same directory.
/// A unit that dies mid-write never leaves a truncated curve behind.
pub fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let dir = path.parent().unwrap_or(Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Create a directory and all parents, idempotent.
pub fn ensure_dir(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path)?;
    Ok(())
}

/// Copy `src` to `dst` atomically. Returns the number of bytes copied.
pub fn copy_atomic(src: &Path, dst: &Path) -> Result<u64> {
    let data = std::fs::read(src)?;
    atomic_write(dst, &data)?;
    Ok(data.len() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn atomic_write_creates_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("curve.txt");
        atomic_write(&path, b"0.1 0.5\n").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "0.1 0.5\n");
    }

    #[test]
    fn atomic_write_creates_parents() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("curves/34.0000/34.0000_-118.0000.txt");
        atomic_write(&path, b"data").unwrap();
        assert!(path.exists());
    }

    #[test]
    fn atomic_write_overwrites() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.txt");
        atomic_write(&path, b"first").unwrap();
        atomic_write(&path, b"second").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "second");
    }

    #[test]
    fn copy_atomic_copies_bytes() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src.yaml");
        std::fs::write(&src, b"name: x\n").unwrap();
        let dst = dir.path().join("inputs/dst.yaml");
        let n = copy_atomic(&src, &dst).unwrap();
        assert_eq!(n, 8);
        assert_eq!(std::fs::read(&dst).unwrap(), b"name: x\n");
    }
}
