//! Bootstrap of the boot module layer.
//!
//! Composes the observable finder from the patched system image, the
//! upgrade path and the application path, applies add/limit module sets,
//! resolves the boot configuration, binds loader authorities and populates
//! the per-authority service catalogs. All inputs arrive pre-parsed as
//! plain structured values; flag decoding happens elsewhere.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, info};

use crate::error::Result;
use crate::finder::{compose, FixedFinder, ModuleFinder};
use crate::loader_map::{AuthorityPartition, LoaderAuthority, LoaderMap};
use crate::module_path::ModulePath;
use crate::patcher::ModulePatcher;
use crate::resolver::Configuration;
use crate::services::ServicesCatalog;
use crate::system::SystemImage;
use crate::version::VersionCache;

/// Pre-parsed bootstrap inputs.
#[derive(Debug, Default)]
pub struct BootConfig {
    /// The main (root) module, if any
    pub main_module: Option<String>,
    /// Extra root modules
    pub add_modules: BTreeSet<String>,
    /// Limit the observable universe to these modules and their closure
    pub limit_modules: BTreeSet<String>,
    /// Patch locations keyed by module name
    pub patches: BTreeMap<String, Vec<PathBuf>>,
    /// Upgrade path entries, searched before the system image
    pub upgrade_path: Vec<PathBuf>,
    /// Application path entries, searched after the system image
    pub app_path: Vec<PathBuf>,
    /// Boot and platform authority membership
    pub partition: AuthorityPartition,
    /// Force the cross-authority split-package check
    pub known_split_packages: bool,
}

/// The booted module layer.
pub struct BootLayer {
    configuration: Arc<Configuration>,
    loader_map: LoaderMap,
    boot_services: ServicesCatalog,
    platform_services: ServicesCatalog,
    application_services: ServicesCatalog,
}

impl BootLayer {
    /// The resolved boot configuration.
    pub fn configuration(&self) -> &Arc<Configuration> {
        &self.configuration
    }

    /// The loader authority mapping.
    pub fn loader_map(&self) -> &LoaderMap {
        &self.loader_map
    }

    /// The service catalog of one loading authority.
    pub fn services(&self, authority: LoaderAuthority) -> &ServicesCatalog {
        match authority {
            LoaderAuthority::Boot => &self.boot_services,
            LoaderAuthority::Platform => &self.platform_services,
            LoaderAuthority::Application => &self.application_services,
        }
    }
}

/// Pure cache of resolved configurations keyed by (image identity, roots).
///
/// Consulted only when no override is in effect, so a hit can never be
/// observed as a behavior difference.
#[derive(Debug, Default)]
pub struct ConfigurationCache {
    map: DashMap<(u64, Vec<String>), Arc<Configuration>>,
}

impl ConfigurationCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    fn get_or_resolve<F>(&self, key: (u64, Vec<String>), resolve: F) -> Result<Arc<Configuration>>
    where
        F: FnOnce() -> Result<Arc<Configuration>>,
    {
        if let Some(hit) = self.map.get(&key) {
            debug!("Configuration cache hit for {} root(s)", key.1.len());
            return Ok(Arc::clone(&hit));
        }
        let configuration = resolve()?;
        self.map.insert(key, Arc::clone(&configuration));
        Ok(configuration)
    }
}

/// Boot the module layer described by the config against a system image.
pub fn boot(
    system: &SystemImage,
    config: &BootConfig,
    cache: Option<&ConfigurationCache>,
) -> Result<BootLayer> {
    let patcher = (!config.patches.is_empty())
        .then(|| Arc::new(ModulePatcher::new(config.patches.clone())));
    let versions = Arc::new(VersionCache::new());

    // Observable universe: upgrade path, then system image, then app path
    let mut finders: Vec<Arc<dyn ModuleFinder>> = Vec::new();
    if !config.upgrade_path.is_empty() {
        finders.push(Arc::new(ModulePath::with_version_cache(
            config.upgrade_path.clone(),
            Arc::clone(&versions),
        )));
    }
    finders.push(system.finder());
    if !config.app_path.is_empty() {
        finders.push(Arc::new(ModulePath::with_version_cache(
            config.app_path.clone(),
            Arc::clone(&versions),
        )));
    }
    let mut finder: Arc<dyn ModuleFinder> = if finders.len() == 1 {
        finders.remove(0)
    } else {
        compose(finders)
    };
    if let Some(patcher) = &patcher {
        finder = Arc::clone(patcher).wrap(finder);
    }

    // Root set: main module plus added modules; with neither, the limit set
    // if present, otherwise every system module
    let mut roots: BTreeSet<String> = config.add_modules.clone();
    if let Some(main) = &config.main_module {
        roots.insert(main.clone());
    }
    if roots.is_empty() {
        roots = if config.limit_modules.is_empty() {
            system.names().clone()
        } else {
            config.limit_modules.clone()
        };
    }

    if !config.limit_modules.is_empty() {
        finder = limit_finder(finder, &config.limit_modules, config.main_module.as_deref())?;
    }

    let roots: Vec<String> = roots.into_iter().collect();

    // Fast path: with no override in effect, an identical (roots, image)
    // pair resolves to the same configuration and may be reused
    let no_overrides = patcher.is_none()
        && config.upgrade_path.is_empty()
        && config.app_path.is_empty()
        && config.limit_modules.is_empty();

    let parents = vec![Configuration::empty()];
    let configuration = match cache {
        Some(cache) if no_overrides => cache.get_or_resolve(
            (system.identity(), roots.clone()),
            || Configuration::resolve_and_bind(finder.as_ref(), parents.clone(), &roots),
        )?,
        _ => Configuration::resolve_and_bind(finder.as_ref(), parents, &roots)?,
    };

    let check_split = !config.app_path.is_empty() || patcher.is_some() || config.known_split_packages;
    let loader_map = LoaderMap::build(&configuration, &config.partition, system, check_split)?;

    let layer = BootLayer {
        configuration: Arc::clone(&configuration),
        loader_map,
        boot_services: ServicesCatalog::new(),
        platform_services: ServicesCatalog::new(),
        application_services: ServicesCatalog::new(),
    };
    for module in configuration.modules() {
        layer
            .services(layer.loader_map.authority(module.name()))
            .register(module.descriptor());
    }

    info!(
        "Booted module layer with {} module(s)",
        configuration.modules().count()
    );
    Ok(layer)
}

/// Restrict observability to the limit modules and their closure.
///
/// Service providers outside the limited closure become unobservable,
/// which is the purpose of limiting.
fn limit_finder(
    finder: Arc<dyn ModuleFinder>,
    limits: &BTreeSet<String>,
    main_module: Option<&str>,
) -> Result<Arc<dyn ModuleFinder>> {
    let mut roots: BTreeSet<String> = limits.clone();
    if let Some(main) = main_module {
        roots.insert(main.to_string());
    }
    let roots: Vec<String> = roots.into_iter().collect();
    let limited =
        Configuration::resolve(finder.as_ref(), vec![Configuration::empty()], &roots)?;
    debug!(
        "Limited observable universe to {} module(s)",
        limited.modules().count()
    );
    Ok(Arc::new(FixedFinder::new(
        limited.modules().map(|m| m.reference().clone()).collect::<Vec<_>>(),
    )))
}
