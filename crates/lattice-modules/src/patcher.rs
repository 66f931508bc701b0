//! Module patching.
//!
//! A [`ModulePatcher`] overrides the content of located modules with
//! out-of-band patch locations (directories or packed artifacts). Resource
//! lookups consult patch locations first and fall back to the original
//! reader; packages discovered only in patch locations extend the
//! descriptor. The descriptor source itself is never overridable.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::debug;
use url::Url;

use crate::descriptor::DESCRIPTOR_NAME;
use crate::error::{ModuleError, Result};
use crate::finder::ModuleFinder;
use crate::reader::{ArchiveReader, DirReader, ModuleReader};
use crate::reference::{ModuleReference, ReaderSupplier};

static NEXT_PATCHER_ID: AtomicU64 = AtomicU64::new(1);

/// Applies per-module content and package overrides.
pub struct ModulePatcher {
    id: u64,
    map: BTreeMap<String, Vec<PathBuf>>,
}

impl ModulePatcher {
    /// Create a patcher from a module-name to patch-location map.
    pub fn new(map: BTreeMap<String, Vec<PathBuf>>) -> Self {
        Self {
            id: NEXT_PATCHER_ID.fetch_add(1, Ordering::Relaxed),
            map,
        }
    }

    /// True if no module is patched.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// True if the named module has patch locations.
    pub fn patches(&self, module: &str) -> bool {
        self.map.contains_key(module)
    }

    /// Return a patched reference if the module is patched, the original
    /// otherwise.
    ///
    /// The derived descriptor is the original plus any packages discovered
    /// in the patch locations; requires, exports, opens and provides are
    /// unchanged.
    pub fn patch_if_needed(&self, reference: ModuleReference) -> Result<ModuleReference> {
        let Some(paths) = self.map.get(reference.name()) else {
            return Ok(reference);
        };

        let mut extra_packages = Vec::new();
        for path in paths {
            for resource in list_location(path)? {
                if let Some(package) = class_package(&resource) {
                    if !reference.descriptor().packages().contains(&package) {
                        extra_packages.push(package);
                    }
                }
            }
        }
        if !extra_packages.is_empty() {
            debug!(
                "Patch adds {} package(s) to module '{}'",
                extra_packages.len(),
                reference.name()
            );
        }

        let descriptor = reference
            .descriptor()
            .with_added_packages(extra_packages);
        let patch_paths = paths.clone();
        let original = reference.clone();
        let supplier: ReaderSupplier = Arc::new(move || {
            let mut patches = Vec::with_capacity(patch_paths.len());
            for path in &patch_paths {
                patches.push(open_location(path)?);
            }
            let fallback = original.open_reader()?;
            Ok(Box::new(PatchedReader { patches, fallback }) as Box<dyn ModuleReader>)
        });

        Ok(reference.patched(descriptor, supplier, self.id))
    }

    /// Wrap a finder so every found reference is patched if needed.
    pub fn wrap(self: Arc<Self>, inner: Arc<dyn ModuleFinder>) -> Arc<dyn ModuleFinder> {
        Arc::new(PatchedFinder {
            inner,
            patcher: self,
        })
    }
}

/// The package of a `.class` resource, if it has one.
fn class_package(resource: &str) -> Option<String> {
    if !resource.ends_with(".class") || resource.starts_with("META-INF/") {
        return None;
    }
    let package = resource[..resource.rfind('/')?].replace('/', ".");
    crate::checks::is_package_name(&package).then_some(package)
}

fn list_location(path: &Path) -> Result<Vec<String>> {
    let reader = open_location(path)?;
    reader.list()
}

fn open_location(path: &Path) -> Result<Box<dyn ModuleReader>> {
    if path.is_file() {
        Ok(Box::new(ArchiveReader::new(path)?))
    } else if path.is_dir() {
        Ok(Box::new(DirReader::new(path)))
    } else {
        Err(ModuleError::ContentIo(format!(
            "patch location {} does not exist",
            path.display()
        )))
    }
}

/// Reader that consults patch locations before the original content.
struct PatchedReader {
    patches: Vec<Box<dyn ModuleReader>>,
    fallback: Box<dyn ModuleReader>,
}

impl ModuleReader for PatchedReader {
    fn find(&self, name: &str) -> Result<Option<Url>> {
        if name != DESCRIPTOR_NAME {
            for patch in &self.patches {
                if let Some(url) = patch.find(name)? {
                    return Ok(Some(url));
                }
            }
        }
        self.fallback.find(name)
    }

    fn open(&self, name: &str) -> Result<Option<Box<dyn Read + Send>>> {
        if name != DESCRIPTOR_NAME {
            for patch in &self.patches {
                if let Some(stream) = patch.open(name)? {
                    return Ok(Some(stream));
                }
            }
        }
        self.fallback.open(name)
    }

    fn read(&self, name: &str) -> Result<Option<Vec<u8>>> {
        if name != DESCRIPTOR_NAME {
            for patch in &self.patches {
                if let Some(bytes) = patch.read(name)? {
                    return Ok(Some(bytes));
                }
            }
        }
        self.fallback.read(name)
    }

    fn list(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = Vec::new();
        for patch in &self.patches {
            names.extend(patch.list()?);
        }
        names.extend(self.fallback.list()?);
        names.sort();
        names.dedup();
        Ok(names)
    }

    fn close(&self) -> Result<()> {
        for patch in &self.patches {
            patch.close()?;
        }
        self.fallback.close()
    }
}

struct PatchedFinder {
    inner: Arc<dyn ModuleFinder>,
    patcher: Arc<ModulePatcher>,
}

impl ModuleFinder for PatchedFinder {
    fn find(&self, name: &str) -> Result<Option<ModuleReference>> {
        match self.inner.find(name)? {
            Some(reference) => Ok(Some(self.patcher.patch_if_needed(reference)?)),
            None => Ok(None),
        }
    }

    fn find_all(&self) -> Result<Vec<ModuleReference>> {
        self.inner
            .find_all()?
            .into_iter()
            .map(|r| self.patcher.patch_if_needed(r))
            .collect()
    }
}
