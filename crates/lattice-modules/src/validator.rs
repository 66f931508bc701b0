//! Advisory module path validation.
//!
//! The validator scans a merged view of the upgrade path, the system image
//! and the application path, and reports modules shadowed by earlier ones,
//! packages split across non-shadowed modules, and artifacts in one
//! directory claiming the same module name. It is diagnostic only: findings
//! are collected and counted, storage faults are reported rather than
//! aborting the scan, and nothing is thrown.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::descriptor::DESCRIPTOR_NAME;
use crate::module_path::{read_exploded, read_packed, ARTIFACT_EXTENSION};
use crate::reference::ModuleReference;
use crate::system::SystemImage;
use crate::version::VersionCache;

/// Outcome of a validation scan.
#[derive(Debug, Default)]
pub struct ValidatorReport {
    /// Human-readable findings, in scan order
    pub findings: Vec<String>,
    /// Number of findings
    pub errors: usize,
    /// Number of modules examined
    pub modules_scanned: usize,
}

impl ValidatorReport {
    fn report(&mut self, finding: String) {
        warn!("{}", finding);
        self.findings.push(finding);
        self.errors += 1;
    }
}

/// Scans module paths for shadowing and split-package hazards.
pub struct ModulePathValidator {
    versions: VersionCache,
    // First sighting of each module name wins; later ones are shadowed
    seen: BTreeMap<String, String>,
    // Package to owning (non-shadowed) module
    packages: BTreeMap<String, String>,
    report: ValidatorReport,
}

impl ModulePathValidator {
    /// Create a fresh validator.
    pub fn new() -> Self {
        Self {
            versions: VersionCache::new(),
            seen: BTreeMap::new(),
            packages: BTreeMap::new(),
            report: ValidatorReport::default(),
        }
    }

    /// Scan upgrade path, system image and application path in order and
    /// produce the report.
    pub fn run(
        mut self,
        upgrade_path: &[PathBuf],
        system: Option<&SystemImage>,
        app_path: &[PathBuf],
    ) -> ValidatorReport {
        for entry in upgrade_path {
            self.scan_entry(entry);
        }
        if let Some(system) = system {
            self.scan_system(system);
        }
        for entry in app_path {
            self.scan_entry(entry);
        }
        self.report
    }

    fn scan_system(&mut self, system: &SystemImage) {
        match system.finder().find_all() {
            Ok(references) => {
                let location = system.root().display().to_string();
                for reference in references {
                    self.record(reference, &location);
                }
            }
            Err(e) => {
                self.report.report(format!(
                    "error scanning system image {}: {}",
                    system.root().display(),
                    e
                ));
            }
        }
    }

    fn scan_entry(&mut self, entry: &Path) {
        if entry.is_file() {
            self.scan_one(entry);
            return;
        }
        if entry.join(DESCRIPTOR_NAME).is_file() {
            self.scan_one(entry);
            return;
        }

        // Directory of modules: track names per directory so artifacts in
        // one directory claiming the same module are reported
        let children = match std::fs::read_dir(entry) {
            Ok(iter) => {
                let mut paths: Vec<PathBuf> =
                    iter.filter_map(|e| e.ok().map(|e| e.path())).collect();
                paths.sort();
                paths
            }
            Err(e) => {
                self.report
                    .report(format!("error reading {}: {}", entry.display(), e));
                return;
            }
        };

        let mut in_this_dir: BTreeMap<String, String> = BTreeMap::new();
        for child in children {
            let Some(reference) = self.load(&child) else {
                continue;
            };
            let name = reference.name().to_string();
            let location = child.display().to_string();
            if let Some(earlier) = in_this_dir.get(&name) {
                self.report.report(format!(
                    "duplicate module '{}': {} and {}",
                    name, earlier, location
                ));
                continue;
            }
            in_this_dir.insert(name, location.clone());
            self.record(reference, &location);
        }
    }

    fn scan_one(&mut self, path: &Path) {
        if let Some(reference) = self.load(path) {
            self.record(reference, &path.display().to_string());
        }
    }

    /// Load one module, converting failures into findings.
    fn load(&mut self, path: &Path) -> Option<ModuleReference> {
        let result = if path.is_dir() {
            if !path.join(DESCRIPTOR_NAME).is_file() {
                return None;
            }
            read_exploded(path)
        } else if path.extension().map_or(false, |e| e == ARTIFACT_EXTENSION) {
            read_packed(path, &self.versions)
        } else {
            return None;
        };

        match result {
            Ok(reference) => Some(reference),
            Err(e) => {
                self.report
                    .report(format!("error scanning {}: {}", path.display(), e));
                None
            }
        }
    }

    fn record(&mut self, reference: ModuleReference, location: &str) {
        self.report.modules_scanned += 1;
        let name = reference.name().to_string();

        if let Some(earlier) = self.seen.get(&name) {
            self.report.report(format!(
                "module '{}' in {} is shadowed by {}",
                name, location, earlier
            ));
            return;
        }
        self.seen.insert(name.clone(), location.to_string());

        for package in reference.descriptor().packages() {
            if let Some(owner) = self.packages.get(package) {
                self.report.report(format!(
                    "package '{}' in both '{}' and '{}'",
                    package, owner, name
                ));
            } else {
                self.packages.insert(package.clone(), name.clone());
            }
        }
    }
}

impl Default for ModulePathValidator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_module(root: &Path, dir: &str, body: &str) {
        let path = root.join(dir);
        std::fs::create_dir_all(&path).unwrap();
        std::fs::write(path.join(DESCRIPTOR_NAME), body).unwrap();
    }

    #[test]
    fn test_clean_paths_have_no_findings() {
        let root = tempfile::tempdir().unwrap();
        write_module(root.path(), "a", "name = \"a\"\npackages = [\"a.pkg\"]");
        write_module(root.path(), "b", "name = \"b\"\npackages = [\"b.pkg\"]");

        let report =
            ModulePathValidator::new().run(&[], None, &[root.path().to_path_buf()]);
        assert_eq!(report.errors, 0);
        assert_eq!(report.modules_scanned, 2);
    }

    #[test]
    fn test_shadowed_module_reported() {
        let root = tempfile::tempdir().unwrap();
        let first = root.path().join("first");
        let second = root.path().join("second");
        std::fs::create_dir_all(&first).unwrap();
        std::fs::create_dir_all(&second).unwrap();
        write_module(&first, "m", "name = \"m\"");
        write_module(&second, "m", "name = \"m\"");

        let report = ModulePathValidator::new().run(&[], None, &[first, second]);
        assert_eq!(report.errors, 1);
        assert!(report.findings[0].contains("shadowed"));
    }

    #[test]
    fn test_split_package_reported() {
        let root = tempfile::tempdir().unwrap();
        let first = root.path().join("first");
        let second = root.path().join("second");
        std::fs::create_dir_all(&first).unwrap();
        std::fs::create_dir_all(&second).unwrap();
        write_module(&first, "a", "name = \"a\"\npackages = [\"shared.pkg\"]");
        write_module(&second, "b", "name = \"b\"\npackages = [\"shared.pkg\"]");

        let report = ModulePathValidator::new().run(&[], None, &[first, second]);
        assert_eq!(report.errors, 1);
        assert!(report.findings[0].contains("shared.pkg"));
    }

    #[test]
    fn test_unreadable_artifact_is_counted_not_fatal() {
        let root = tempfile::tempdir().unwrap();
        std::fs::write(root.path().join("broken-1.0.tgz"), b"not a tgz").unwrap();
        write_module(root.path(), "ok", "name = \"ok\"");

        let report =
            ModulePathValidator::new().run(&[], None, &[root.path().to_path_buf()]);
        assert_eq!(report.errors, 1);
        assert_eq!(report.modules_scanned, 1);
        assert!(report.findings[0].contains("broken-1.0.tgz"));
    }
}
