//! Loader authority binding.
//!
//! Every resolved module is bound to exactly one of three loading
//! authorities: boot, platform or application. Boot and platform membership
//! is fixed at build time; everything else loads through the application
//! authority. The boot authority needs no stored entry — absence means boot.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::error::{ModuleError, Result};
use crate::resolver::Configuration;
use crate::system::SystemImage;

/// The three loading authorities, in lookup precedence order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LoaderAuthority {
    /// The primary bootstrap authority
    Boot,
    /// The platform authority
    Platform,
    /// The application authority
    Application,
}

/// Build-time partition of module names into boot and platform authorities.
#[derive(Debug, Clone, Default)]
pub struct AuthorityPartition {
    boot: BTreeSet<String>,
    platform: BTreeSet<String>,
}

impl AuthorityPartition {
    /// Create a partition from boot and platform membership lists.
    pub fn new(boot: BTreeSet<String>, platform: BTreeSet<String>) -> Self {
        Self { boot, platform }
    }

    /// The authority a module name is pre-classified into.
    pub fn authority(&self, module: &str) -> LoaderAuthority {
        if self.boot.contains(module) {
            LoaderAuthority::Boot
        } else if self.platform.contains(module) {
            LoaderAuthority::Platform
        } else {
            LoaderAuthority::Application
        }
    }
}

/// Immutable module-name to loader-authority mapping for one configuration.
#[derive(Debug)]
pub struct LoaderMap {
    // Boot modules carry no entry
    map: BTreeMap<String, LoaderAuthority>,
}

impl LoaderMap {
    /// Build the mapping for a resolved configuration.
    ///
    /// Modules pre-classified as boot or platform must be locatable in the
    /// system image rather than an overridden module-path location. The
    /// cross-authority split-package check runs only when an override can
    /// actually introduce one.
    pub fn build(
        config: &Configuration,
        partition: &AuthorityPartition,
        system: &SystemImage,
        check_split_packages: bool,
    ) -> Result<LoaderMap> {
        let mut map = BTreeMap::new();
        for module in config.modules() {
            let authority = partition.authority(module.name());
            if authority != LoaderAuthority::Application && !system.contains(module.name()) {
                return Err(ModuleError::LoaderMapping(format!(
                    "module '{}' must load from the system image",
                    module.name()
                )));
            }
            if authority != LoaderAuthority::Boot {
                map.insert(module.name().to_string(), authority);
            }
        }

        if check_split_packages {
            check_authority_split(config, partition)?;
        }

        debug!(
            "Bound {} module(s) to loader authorities",
            config.modules().count()
        );
        Ok(LoaderMap { map })
    }

    /// The authority the named module is bound to.
    ///
    /// Absence of an entry means the boot authority.
    pub fn authority(&self, module: &str) -> LoaderAuthority {
        self.map
            .get(module)
            .copied()
            .unwrap_or(LoaderAuthority::Boot)
    }

    /// Names bound to the given authority. For boot this is empty since
    /// boot modules carry no entry; callers filter a configuration instead.
    pub fn modules_of(&self, authority: LoaderAuthority) -> Vec<&str> {
        self.map
            .iter()
            .filter(|(_, a)| **a == authority)
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

/// No package may be visible through more than one of the boot and platform
/// authorities.
fn check_authority_split(config: &Configuration, partition: &AuthorityPartition) -> Result<()> {
    let mut owners: BTreeMap<&str, &str> = BTreeMap::new();
    for module in config.modules() {
        if partition.authority(module.name()) == LoaderAuthority::Application {
            continue;
        }
        for package in module.descriptor().packages() {
            if let Some(first) = owners.insert(package.as_str(), module.name()) {
                return Err(ModuleError::SplitPackage {
                    package: package.clone(),
                    first: first.to_string(),
                    second: module.name().to_string(),
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::DESCRIPTOR_NAME;
    use crate::finder::ModuleFinder;
    use crate::resolver::Configuration;
    use crate::system::SystemImage;
    use crate::BASE_MODULE;
    use std::path::Path;

    fn write_system(root: &Path, modules: &[(&str, &str)]) -> SystemImage {
        for (name, body) in modules {
            let dir = root.join("modules").join(name);
            std::fs::create_dir_all(&dir).unwrap();
            std::fs::write(dir.join(DESCRIPTOR_NAME), body).unwrap();
        }
        SystemImage::open(root).unwrap()
    }

    fn base_body() -> String {
        format!("name = \"{}\"\n[[exports]]\npackage = \"lattice.lang\"\n", BASE_MODULE)
    }

    #[test]
    fn test_authority_assignment() {
        let root = tempfile::tempdir().unwrap();
        let system = write_system(
            root.path(),
            &[
                (BASE_MODULE, &base_body()),
                (
                    "lattice.net",
                    "name = \"lattice.net\"\n[[exports]]\npackage = \"lattice.net\"\n",
                ),
            ],
        );

        let config = Configuration::resolve_and_bind(
            system.finder().as_ref(),
            vec![Configuration::empty()],
            &[BASE_MODULE.to_string(), "lattice.net".to_string()],
        )
        .unwrap();

        let partition = AuthorityPartition::new(
            BTreeSet::from([BASE_MODULE.to_string()]),
            BTreeSet::from(["lattice.net".to_string()]),
        );
        let map = LoaderMap::build(&config, &partition, &system, false).unwrap();

        assert_eq!(map.authority(BASE_MODULE), LoaderAuthority::Boot);
        assert_eq!(map.authority("lattice.net"), LoaderAuthority::Platform);
        assert_eq!(map.authority("anything.else"), LoaderAuthority::Boot);
        assert_eq!(map.modules_of(LoaderAuthority::Platform), vec!["lattice.net"]);
    }

    #[test]
    fn test_platform_module_missing_from_system_fails() {
        let root = tempfile::tempdir().unwrap();
        let system = write_system(root.path(), &[(BASE_MODULE, &base_body())]);

        // Resolve an extra module from outside the system image
        let outside = tempfile::tempdir().unwrap();
        let dir = outside.path().join("stray");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(DESCRIPTOR_NAME), "name = \"stray\"").unwrap();
        let app_path = crate::module_path::ModulePath::new(vec![outside.path().to_path_buf()]);
        let finder = crate::finder::compose(vec![
            system.finder(),
            std::sync::Arc::new(app_path),
        ]);
        let config = Configuration::resolve_and_bind(
            finder.as_ref(),
            vec![Configuration::empty()],
            &["stray".to_string()],
        )
        .unwrap();

        let partition = AuthorityPartition::new(
            BTreeSet::from([BASE_MODULE.to_string()]),
            BTreeSet::from(["stray".to_string()]),
        );
        let err = LoaderMap::build(&config, &partition, &system, false).unwrap_err();
        assert!(matches!(err, ModuleError::LoaderMapping(_)));
    }

    #[test]
    fn test_cross_authority_split_package() {
        // A reused pre-resolved configuration did not run resolution checks
        // against the current module view; the authority split check is the
        // backstop for boot and platform modules.
        let root = tempfile::tempdir().unwrap();
        let system = write_system(
            root.path(),
            &[
                (BASE_MODULE, &base_body()),
                (
                    "lattice.a",
                    "name = \"lattice.a\"\npackages = [\"shared.pkg\"]\n",
                ),
                (
                    "lattice.b",
                    "name = \"lattice.b\"\npackages = [\"shared.pkg\"]\n",
                ),
            ],
        );

        let mut references = Vec::new();
        for name in [BASE_MODULE, "lattice.a", "lattice.b"] {
            references.push(system.finder().find(name).unwrap().unwrap());
        }
        let config = Configuration::of_references(references);

        let partition = AuthorityPartition::new(
            BTreeSet::from([BASE_MODULE.to_string(), "lattice.a".to_string()]),
            BTreeSet::from(["lattice.b".to_string()]),
        );
        let err = LoaderMap::build(&config, &partition, &system, true).unwrap_err();
        assert!(matches!(err, ModuleError::SplitPackage { .. }));

        // The check is skipped when no override is in effect
        assert!(LoaderMap::build(&config, &partition, &system, false).is_ok());
    }
}
