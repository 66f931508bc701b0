//! The module path finder.
//!
//! A [`ModulePath`] locates modules on an ordered list of path entries. Each
//! entry is either a packed `.tgz` artifact, an exploded module directory
//! (descriptor source at its root), or a directory of modules whose
//! immediate children are scanned. Entries are scanned lazily, one at a time
//! and at most once, with results cached.
//!
//! Two duplicate-name policies apply and are deliberately asymmetric:
//! duplicates discovered within one directory-of-modules scan are a hard
//! error, while duplicates across different entries resolve silently to the
//! first-scanned artifact.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;
use url::Url;

use crate::checks::{package_of, validate_class_name, validate_module_name};
use crate::descriptor::{self, ModuleDescriptor, DESCRIPTOR_NAME};
use crate::error::{ModuleError, Result};
use crate::finder::ModuleFinder;
use crate::hashes::{compute_hash, HashAlgorithm, HashSupplier};
use crate::reader::{ArchiveReader, DirReader, ModuleReader};
use crate::reference::ModuleReference;
use crate::version::VersionCache;

/// File extension of packed module artifacts.
pub const ARTIFACT_EXTENSION: &str = "tgz";

/// Directory prefix of service configuration entries in packed artifacts.
const SERVICES_PREFIX: &str = "META-INF/services/";

struct ScanState {
    next_entry: usize,
    cache: std::collections::BTreeMap<String, ModuleReference>,
}

/// Finder over an ordered list of module path entries.
pub struct ModulePath {
    entries: Vec<PathBuf>,
    versions: Arc<VersionCache>,
    state: Mutex<ScanState>,
}

impl ModulePath {
    /// Create a finder over the given entries, scanned lazily in order.
    pub fn new(entries: Vec<PathBuf>) -> Self {
        Self::with_version_cache(entries, Arc::new(VersionCache::new()))
    }

    /// Create a finder sharing a process-scoped version cache.
    pub fn with_version_cache(entries: Vec<PathBuf>, versions: Arc<VersionCache>) -> Self {
        Self {
            entries,
            versions,
            state: Mutex::new(ScanState {
                next_entry: 0,
                cache: std::collections::BTreeMap::new(),
            }),
        }
    }

    /// Scan the next unscanned entry into the cache.
    fn scan_next(&self, state: &mut ScanState) -> Result<()> {
        let entry = &self.entries[state.next_entry];
        state.next_entry += 1;

        let found = scan_entry(entry, &self.versions)?;
        debug!(
            "Scanned module path entry {}: {} module(s)",
            entry.display(),
            found.len()
        );
        for reference in found {
            let name = reference.name().to_string();
            if state.cache.contains_key(&name) {
                // First-scanned entry wins across entries
                debug!(
                    "Module '{}' from {} shadowed by an earlier entry",
                    name,
                    entry.display()
                );
                continue;
            }
            state.cache.insert(name, reference);
        }
        Ok(())
    }
}

impl ModuleFinder for ModulePath {
    fn find(&self, name: &str) -> Result<Option<ModuleReference>> {
        let mut state = self.state.lock();
        loop {
            if let Some(reference) = state.cache.get(name) {
                return Ok(Some(reference.clone()));
            }
            if state.next_entry >= self.entries.len() {
                return Ok(None);
            }
            self.scan_next(&mut state)?;
        }
    }

    fn find_all(&self) -> Result<Vec<ModuleReference>> {
        let mut state = self.state.lock();
        while state.next_entry < self.entries.len() {
            self.scan_next(&mut state)?;
        }
        Ok(state.cache.values().cloned().collect())
    }
}

/// Scan one module path entry.
pub(crate) fn scan_entry(entry: &Path, versions: &VersionCache) -> Result<Vec<ModuleReference>> {
    if entry.is_file() {
        if !is_artifact(entry) {
            return Err(ModuleError::Artifact {
                path: entry.display().to_string(),
                reason: format!("not a .{} artifact", ARTIFACT_EXTENSION),
            });
        }
        return Ok(vec![read_packed(entry, versions)?]);
    }

    if entry.join(DESCRIPTOR_NAME).is_file() {
        return Ok(vec![read_exploded(entry)?]);
    }

    // A directory of modules: scan each immediate child. Duplicates within
    // one scan are fatal; an unreadable child contributes nothing.
    let mut found: Vec<ModuleReference> = Vec::new();
    let mut names = BTreeSet::new();
    let mut children: Vec<PathBuf> = match std::fs::read_dir(entry) {
        Ok(iter) => iter
            .filter_map(|e| e.ok().map(|e| e.path()))
            .collect(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
        Err(e) => return Err(e.into()),
    };
    children.sort();

    for child in children {
        let reference = if child.is_dir() && child.join(DESCRIPTOR_NAME).is_file() {
            read_exploded(&child)?
        } else if child.is_file() && is_artifact(&child) {
            read_packed(&child, versions)?
        } else {
            continue;
        };

        if !names.insert(reference.name().to_string()) {
            return Err(ModuleError::DuplicateModule {
                name: reference.name().to_string(),
                location: entry.display().to_string(),
            });
        }
        found.push(reference);
    }
    Ok(found)
}

fn is_artifact(path: &Path) -> bool {
    path.extension().map_or(false, |e| e == ARTIFACT_EXTENSION)
}

fn entry_url(path: &Path) -> Result<Url> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };
    Url::from_file_path(&absolute)
        .map_err(|_| ModuleError::ContentIo(format!("cannot form URL for {}", path.display())))
}

/// Read an exploded module directory.
pub(crate) fn read_exploded(dir: &Path) -> Result<ModuleReference> {
    let reader = DirReader::new(dir);
    let bytes = reader.read(DESCRIPTOR_NAME)?.ok_or_else(|| {
        ModuleError::Artifact {
            path: dir.display().to_string(),
            reason: format!("missing {}", DESCRIPTOR_NAME),
        }
    })?;
    let parsed = descriptor::read(&bytes)?;

    let derived = derive_packages(reader.list()?.iter().map(|s| s.as_str()), dir)?;
    let descriptor = parsed.descriptor.with_added_packages(derived);

    let dir = dir.to_path_buf();
    let location = entry_url(&dir)?;
    let supplier_dir = dir.clone();
    Ok(ModuleReference::new(
        descriptor,
        location,
        Arc::new(move || Ok(Box::new(DirReader::new(&supplier_dir)) as Box<dyn ModuleReader>)),
    )
    .with_target(parsed.target))
}

/// Read a packed artifact, deriving an automatic module when it carries no
/// descriptor source.
pub(crate) fn read_packed(path: &Path, versions: &VersionCache) -> Result<ModuleReference> {
    let reader = ArchiveReader::new(path)?;

    let (descriptor, target) = match reader.read(DESCRIPTOR_NAME)? {
        Some(bytes) => {
            let parsed = descriptor::read(&bytes)?;
            let derived = derive_packages(reader.list()?.iter().map(|s| s.as_str()), path)?;
            (parsed.descriptor.with_added_packages(derived), parsed.target)
        }
        None => (derive_automatic(path, &reader, versions)?, None),
    };

    let location = entry_url(path)?;
    let artifact = path.to_path_buf();
    let supplier_path = artifact.clone();
    let hash_path = artifact.clone();
    Ok(ModuleReference::new(
        descriptor,
        location,
        Arc::new(move || {
            Ok(Box::new(ArchiveReader::new(&supplier_path)?) as Box<dyn ModuleReader>)
        }),
    )
    .with_target(target)
    .with_self_hash(HashSupplier::new(HashAlgorithm::Sha256, move |algorithm| {
        let reader = ArchiveReader::new(&hash_path)?;
        compute_hash(&reader, algorithm)
    })))
}

/// Derive a package set from resource names.
///
/// Only `.class` resources contribute packages. Service configuration and
/// other `META-INF` entries are skipped; top-level resources that are not
/// class files are ignored; a class file in the unnamed package is a hard
/// error.
fn derive_packages<'a, I>(names: I, origin: &Path) -> Result<BTreeSet<String>>
where
    I: Iterator<Item = &'a str>,
{
    let mut packages = BTreeSet::new();
    for name in names {
        if !name.ends_with(".class") || name.starts_with("META-INF/") {
            continue;
        }
        match name.rfind('/') {
            Some(i) => {
                let package = name[..i].replace('/', ".");
                if crate::checks::is_package_name(&package) {
                    packages.insert(package);
                } else {
                    return Err(ModuleError::Artifact {
                        path: origin.display().to_string(),
                        reason: format!("class file '{}' in invalid package", name),
                    });
                }
            }
            None => {
                return Err(ModuleError::Artifact {
                    path: origin.display().to_string(),
                    reason: format!("class file '{}' in unnamed package", name),
                });
            }
        }
    }
    Ok(packages)
}

/// Derive an automatic module descriptor from a descriptor-less artifact.
fn derive_automatic(
    path: &Path,
    reader: &ArchiveReader,
    versions: &VersionCache,
) -> Result<ModuleDescriptor> {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();

    let (raw_name, version) = split_name_and_version(&stem, versions);
    let name = clean_module_name(&raw_name);
    validate_module_name(&name).map_err(|_| ModuleError::Artifact {
        path: path.display().to_string(),
        reason: format!("cannot derive module name from '{}'", stem),
    })?;

    let entry_names = reader.list()?;
    let packages = derive_packages(entry_names.iter().map(|s| s.as_str()), path)?;

    let mut builder = ModuleDescriptor::automatic_builder(&name)?
        .packages(packages.iter().cloned())?;
    if let Some(v) = version {
        builder = builder.version_arc(v);
    }

    // Synthesize provides declarations from service configuration entries
    for entry_name in &entry_names {
        let Some(service) = entry_name.strip_prefix(SERVICES_PREFIX) else {
            continue;
        };
        if service.is_empty() || service.contains('/') {
            continue;
        }
        validate_class_name(service).map_err(|_| ModuleError::Artifact {
            path: path.display().to_string(),
            reason: format!("invalid service configuration entry '{}'", entry_name),
        })?;

        let bytes = reader.read(entry_name)?.ok_or_else(|| {
            ModuleError::ContentIo(format!("service entry '{}' vanished", entry_name))
        })?;
        let text = String::from_utf8_lossy(&bytes);
        let mut providers = Vec::new();
        for line in text.lines() {
            let line = match line.find('#') {
                Some(i) => &line[..i],
                None => line,
            };
            let provider = line.trim();
            if provider.is_empty() {
                continue;
            }
            validate_class_name(provider)?;
            let provider_package = package_of(provider).unwrap_or_default();
            if !packages.contains(provider_package) {
                return Err(ModuleError::Artifact {
                    path: path.display().to_string(),
                    reason: format!(
                        "provider '{}' not in any package of the artifact",
                        provider
                    ),
                });
            }
            providers.push(provider.to_string());
        }
        if !providers.is_empty() {
            builder = builder.provides(service, providers)?;
        }
    }

    builder.build()
}

/// Split an artifact file stem into a module name part and a parseable
/// version part at the first `-digit` occurrence.
fn split_name_and_version(
    stem: &str,
    versions: &VersionCache,
) -> (String, Option<Arc<crate::version::Version>>) {
    let bytes = stem.as_bytes();
    for (i, window) in bytes.windows(2).enumerate() {
        if window[0] == b'-' && window[1].is_ascii_digit() {
            let candidate = &stem[i + 1..];
            // Unparsable suffixes stay part of the name
            if let Ok(version) = versions.parse(candidate) {
                return (stem[..i].to_string(), Some(version));
            }
            break;
        }
    }
    (stem.to_string(), None)
}

/// Sanitize a derived module name: non-alphanumeric runs become single
/// dots, with leading and trailing dots stripped.
fn clean_module_name(raw: &str) -> String {
    let mut name = String::with_capacity(raw.len());
    let mut pending_dot = false;
    for c in raw.chars() {
        if c.is_alphanumeric() {
            if pending_dot && !name.is_empty() {
                name.push('.');
            }
            pending_dot = false;
            name.push(c);
        } else {
            pending_dot = true;
        }
    }
    name
}
