//! The system image.
//!
//! A [`SystemImage`] is the process-scoped state object for the modules
//! shipped with the runtime. The image root contains either a single packed
//! `modules.tgz` store (image build, the fast path) or a `modules/`
//! directory of exploded per-module directories (development build). The
//! image is scanned once on open; the resulting finder and name set are
//! immutable and shared.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{debug, info};
use url::Url;

use crate::descriptor::{self, DESCRIPTOR_NAME};
use crate::error::{ModuleError, Result};
use crate::finder::{FixedFinder, ModuleFinder};
use crate::module_path;
use crate::reader::{ArchiveReader, ModuleReader};
use crate::reference::ModuleReference;
use crate::version::VersionCache;

/// File name of the packed module store.
pub const PACKED_STORE_NAME: &str = "modules.tgz";

/// Directory name of the exploded module store.
pub const EXPLODED_STORE_NAME: &str = "modules";

static NEXT_IMAGE_ID: AtomicU64 = AtomicU64::new(1);

/// The modules shipped with the runtime, scanned once and cached.
pub struct SystemImage {
    root: PathBuf,
    id: u64,
    finder: Arc<FixedFinder>,
    names: BTreeSet<String>,
}

impl SystemImage {
    /// Open a system image root.
    ///
    /// Presence of the packed store selects the fast path; its absence
    /// requires the exploded directory form.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let packed = root.join(PACKED_STORE_NAME);

        let references = if packed.is_file() {
            debug!("Opening packed system store {}", packed.display());
            scan_packed_store(&packed)?
        } else {
            let exploded = root.join(EXPLODED_STORE_NAME);
            if !exploded.is_dir() {
                return Err(ModuleError::Other(format!(
                    "system image {} has neither {} nor {}/",
                    root.display(),
                    PACKED_STORE_NAME,
                    EXPLODED_STORE_NAME
                )));
            }
            debug!("Scanning exploded system store {}", exploded.display());
            let versions = VersionCache::new();
            module_path::scan_entry(&exploded, &versions)?
        };

        let names: BTreeSet<String> = references
            .iter()
            .map(|r| r.name().to_string())
            .collect();
        info!("System image provides {} module(s)", names.len());

        Ok(Self {
            root,
            id: NEXT_IMAGE_ID.fetch_add(1, Ordering::Relaxed),
            finder: Arc::new(FixedFinder::new(references)),
            names,
        })
    }

    /// The image root path.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Identity token for this image, usable as a cache key component.
    pub fn identity(&self) -> u64 {
        self.id
    }

    /// Finder over the system modules.
    pub fn finder(&self) -> Arc<dyn ModuleFinder> {
        Arc::clone(&self.finder) as Arc<dyn ModuleFinder>
    }

    /// True if the named module ships with the image.
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// Names of all system modules.
    pub fn names(&self) -> &BTreeSet<String> {
        &self.names
    }
}

/// Scan a packed store: one archive holding per-module subtrees, each with
/// a descriptor source at its root.
fn scan_packed_store(packed: &Path) -> Result<Vec<ModuleReference>> {
    let index_reader = ArchiveReader::new(packed)?;
    let mut module_dirs = BTreeSet::new();
    for entry in index_reader.list()? {
        if let Some(i) = entry.find('/') {
            module_dirs.insert(entry[..i].to_string());
        }
    }

    let mut references = Vec::with_capacity(module_dirs.len());
    for module_dir in module_dirs {
        let reader = ArchiveReader::with_prefix(packed, Some(module_dir.clone()))?;
        let bytes = reader.read(DESCRIPTOR_NAME)?.ok_or_else(|| {
            ModuleError::Artifact {
                path: packed.display().to_string(),
                reason: format!("store entry '{}' has no {}", module_dir, DESCRIPTOR_NAME),
            }
        })?;
        let parsed = descriptor::read(&bytes)?;
        if parsed.descriptor.name() != module_dir {
            return Err(ModuleError::Artifact {
                path: packed.display().to_string(),
                reason: format!(
                    "store entry '{}' declares module '{}'",
                    module_dir,
                    parsed.descriptor.name()
                ),
            });
        }

        let file_url = Url::from_file_path(std::fs::canonicalize(packed)?)
            .map_err(|_| ModuleError::ContentIo(format!("cannot form URL for {}", packed.display())))?;
        let location = Url::parse(&format!("tgz:{}!/{}", file_url, module_dir))
            .map_err(|e| ModuleError::ContentIo(e.to_string()))?;

        let archive = packed.to_path_buf();
        let prefix = module_dir.clone();
        references.push(
            ModuleReference::new(
                parsed.descriptor,
                location,
                Arc::new(move || {
                    Ok(Box::new(ArchiveReader::with_prefix(&archive, Some(prefix.clone()))?)
                        as Box<dyn ModuleReader>)
                }),
            )
            .with_target(parsed.target),
        );
    }
    Ok(references)
}
