//! Content readers for located modules.
//!
//! A [`ModuleReader`] streams and lists the resources of one module. Each
//! open reader is an independent handle; closing one never affects others
//! opened from the same reference. Readers enforce a close contract: once
//! `close` returns, no read operation can proceed. Reads take the shared side
//! of a lock and close takes the exclusive side, so close waits for in-flight
//! reads to finish.

use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use parking_lot::RwLock;
use tar::Archive;
use url::Url;

use crate::error::{ModuleError, Result};

/// Capability to access the resources of one located module.
pub trait ModuleReader: Send + Sync {
    /// Find a resource, returning its location if present.
    fn find(&self, name: &str) -> Result<Option<Url>>;

    /// Open a resource as a byte stream.
    fn open(&self, name: &str) -> Result<Option<Box<dyn Read + Send>>> {
        Ok(self
            .read(name)?
            .map(|bytes| Box::new(Cursor::new(bytes)) as Box<dyn Read + Send>))
    }

    /// Read a resource fully into a byte buffer.
    fn read(&self, name: &str) -> Result<Option<Vec<u8>>>;

    /// List all resource names. A fresh call re-lists.
    fn list(&self) -> Result<Vec<String>>;

    /// Close the reader. All subsequent reads fail.
    fn close(&self) -> Result<()>;
}

/// Reject resource names that could escape the module root.
///
/// `None` means the resource cannot exist, which callers surface as
/// not-found rather than an error.
fn safe_resource_name(name: &str) -> Option<&str> {
    if name.is_empty() || name.starts_with('/') || name.ends_with('/') {
        return None;
    }
    if name.split('/').any(|seg| seg.is_empty() || seg == "." || seg == "..") {
        return None;
    }
    Some(name)
}

fn file_url(path: &Path) -> Result<Url> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };
    Url::from_file_path(&absolute)
        .map_err(|_| ModuleError::ContentIo(format!("cannot form URL for {}", path.display())))
}

/// Reader over an exploded module directory.
pub struct DirReader {
    root: PathBuf,
    closed: RwLock<bool>,
}

impl DirReader {
    /// Create a reader rooted at an exploded module directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            closed: RwLock::new(false),
        }
    }
}

impl ModuleReader for DirReader {
    fn find(&self, name: &str) -> Result<Option<Url>> {
        let guard = self.closed.read();
        if *guard {
            return Err(ModuleError::ReaderClosed);
        }
        let Some(name) = safe_resource_name(name) else {
            return Ok(None);
        };
        let path = self.root.join(name);
        if path.is_file() {
            Ok(Some(file_url(&path)?))
        } else {
            Ok(None)
        }
    }

    fn read(&self, name: &str) -> Result<Option<Vec<u8>>> {
        let guard = self.closed.read();
        if *guard {
            return Err(ModuleError::ReaderClosed);
        }
        let Some(name) = safe_resource_name(name) else {
            return Ok(None);
        };
        let path = self.root.join(name);
        if path.is_dir() {
            return Ok(None);
        }
        match std::fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            // The file disappearing between stat and open contributes nothing
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn list(&self) -> Result<Vec<String>> {
        let guard = self.closed.read();
        if *guard {
            return Err(ModuleError::ReaderClosed);
        }
        let mut names = Vec::new();
        for entry in walkdir::WalkDir::new(&self.root).sort_by_file_name() {
            let entry = entry.map_err(|e| ModuleError::ContentIo(e.to_string()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(&self.root)
                .map_err(|e| ModuleError::ContentIo(e.to_string()))?;
            let name = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            names.push(name);
        }
        Ok(names)
    }

    fn close(&self) -> Result<()> {
        let mut guard = self.closed.write();
        *guard = true;
        Ok(())
    }
}

/// Reader over a packed `.tgz` module artifact.
///
/// An optional entry prefix addresses one module inside a multi-module
/// packed store; resource names are relative to that prefix.
pub struct ArchiveReader {
    path: PathBuf,
    prefix: Option<String>,
    index: Vec<String>,
    closed: RwLock<bool>,
}

impl ArchiveReader {
    /// Open a packed artifact and index its entry names.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        Self::with_prefix(path, None)
    }

    /// Open one module inside a packed store, addressed by entry prefix.
    pub fn with_prefix(path: impl Into<PathBuf>, prefix: Option<String>) -> Result<Self> {
        let path = path.into();
        let mut index = Vec::new();
        scan_archive(&path, |name, _| {
            let stripped = match &prefix {
                Some(p) => match name.strip_prefix(p.as_str()).and_then(|n| n.strip_prefix('/')) {
                    Some(n) => n,
                    None => return Ok(true),
                },
                None => name,
            };
            if !stripped.is_empty() {
                index.push(stripped.to_string());
            }
            Ok(true)
        })?;
        index.sort();
        Ok(Self {
            path,
            prefix,
            index,
            closed: RwLock::new(false),
        })
    }

    fn full_entry_name(&self, name: &str) -> String {
        match &self.prefix {
            Some(p) => format!("{}/{}", p, name),
            None => name.to_string(),
        }
    }
}

impl ModuleReader for ArchiveReader {
    fn find(&self, name: &str) -> Result<Option<Url>> {
        let guard = self.closed.read();
        if *guard {
            return Err(ModuleError::ReaderClosed);
        }
        let Some(name) = safe_resource_name(name) else {
            return Ok(None);
        };
        if self.index.iter().any(|n| n == name) {
            let base = file_url(&self.path)?;
            let url = Url::parse(&format!("tgz:{}!/{}", base, self.full_entry_name(name)))
                .map_err(|e| ModuleError::ContentIo(e.to_string()))?;
            Ok(Some(url))
        } else {
            Ok(None)
        }
    }

    fn read(&self, name: &str) -> Result<Option<Vec<u8>>> {
        let guard = self.closed.read();
        if *guard {
            return Err(ModuleError::ReaderClosed);
        }
        let Some(name) = safe_resource_name(name) else {
            return Ok(None);
        };
        let wanted = self.full_entry_name(name);
        let mut found = None;
        scan_archive(&self.path, |entry_name, entry| {
            if entry_name == wanted {
                let mut bytes = Vec::new();
                entry.read_to_end(&mut bytes)?;
                found = Some(bytes);
                Ok(false)
            } else {
                Ok(true)
            }
        })?;
        Ok(found)
    }

    fn list(&self) -> Result<Vec<String>> {
        let guard = self.closed.read();
        if *guard {
            return Err(ModuleError::ReaderClosed);
        }
        Ok(self.index.clone())
    }

    fn close(&self) -> Result<()> {
        let mut guard = self.closed.write();
        *guard = true;
        Ok(())
    }
}

/// Walk the regular-file entries of a gzipped tar archive.
///
/// The callback returns `false` to stop the scan early.
pub(crate) fn scan_archive<F>(path: &Path, mut f: F) -> Result<()>
where
    F: FnMut(&str, &mut tar::Entry<'_, GzDecoder<std::fs::File>>) -> Result<bool>,
{
    let file = std::fs::File::open(path)?;
    let mut archive = Archive::new(GzDecoder::new(file));
    for entry in archive.entries()? {
        let mut entry = entry?;
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let name = {
            let path = entry.path()?;
            let name = path.to_string_lossy().replace('\\', "/");
            name.trim_start_matches("./").to_string()
        };
        if name.is_empty() {
            continue;
        }
        if !f(&name, &mut entry)? {
            break;
        }
    }
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::test_support::write_archive;
    use super::*;

    #[test]
    fn test_dir_reader_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("p/q")).unwrap();
        std::fs::write(dir.path().join("p/q/data.txt"), b"hello").unwrap();

        let reader = DirReader::new(dir.path());
        assert_eq!(reader.read("p/q/data.txt").unwrap().unwrap(), b"hello");
        assert!(reader.find("p/q/data.txt").unwrap().is_some());
        assert!(reader.read("missing").unwrap().is_none());
        assert_eq!(reader.list().unwrap(), vec!["p/q/data.txt".to_string()]);
    }

    #[test]
    fn test_dir_reader_rejects_escapes() {
        let dir = tempfile::tempdir().unwrap();
        let reader = DirReader::new(dir.path());
        assert!(reader.read("../outside").unwrap().is_none());
        assert!(reader.read("/etc/hosts").unwrap().is_none());
        assert!(reader.read("").unwrap().is_none());
    }

    #[test]
    fn test_reads_rejected_after_close() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("r.txt"), b"x").unwrap();
        let reader = DirReader::new(dir.path());
        assert!(reader.read("r.txt").unwrap().is_some());
        reader.close().unwrap();
        assert!(matches!(
            reader.read("r.txt"),
            Err(ModuleError::ReaderClosed)
        ));
        assert!(matches!(reader.list(), Err(ModuleError::ReaderClosed)));
    }

    #[test]
    fn test_archive_reader() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("m.tgz");
        write_archive(
            &archive,
            &[("p/A.class", b"aa" as &[u8]), ("p/data.txt", b"dd")],
        );

        let reader = ArchiveReader::new(&archive).unwrap();
        assert_eq!(reader.read("p/data.txt").unwrap().unwrap(), b"dd");
        assert!(reader.read("nope").unwrap().is_none());
        let url = reader.find("p/A.class").unwrap().unwrap();
        assert!(url.as_str().starts_with("tgz:"));
        assert_eq!(
            reader.list().unwrap(),
            vec!["p/A.class".to_string(), "p/data.txt".to_string()]
        );
    }

    #[test]
    fn test_archive_reader_with_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("store.tgz");
        write_archive(
            &archive,
            &[
                ("m.one/module-info.toml", b"name = \"m.one\"" as &[u8]),
                ("m.one/p/A.class", b"aa"),
                ("m.two/q/B.class", b"bb"),
            ],
        );

        let reader =
            ArchiveReader::with_prefix(&archive, Some("m.one".to_string())).unwrap();
        assert_eq!(
            reader.list().unwrap(),
            vec!["module-info.toml".to_string(), "p/A.class".to_string()]
        );
        assert!(reader.read("q/B.class").unwrap().is_none());
        assert_eq!(reader.read("p/A.class").unwrap().unwrap(), b"aa");
    }

    #[test]
    fn test_open_streams_bytes() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("r.bin"), b"stream me").unwrap();
        let reader = DirReader::new(dir.path());
        let mut stream = reader.open("r.bin").unwrap().unwrap();
        let mut out = Vec::new();
        stream.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"stream me");
    }
}
