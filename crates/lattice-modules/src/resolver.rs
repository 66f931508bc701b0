//! Module resolution.
//!
//! The [`Resolver`] computes the transitive closure of required modules from
//! a root set against a finder, binds service providers, checks consistency
//! and produces an immutable [`Configuration`]: the resolved module set plus
//! the reads-edge relation. Resolution is all-or-nothing; any violation
//! aborts with no partial configuration.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;

use tracing::debug;

use crate::descriptor::{ModuleDescriptor, RequiresModifier};
use crate::error::{ModuleError, Result};
use crate::finder::ModuleFinder;
use crate::hashes::{self, compute_hash, DependencyGraph, HashAlgorithm, ModuleHashes};
use crate::reference::ModuleReference;
use crate::BASE_MODULE;

/// A module selected by resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedModule {
    reference: ModuleReference,
}

impl ResolvedModule {
    /// The module name.
    pub fn name(&self) -> &str {
        self.reference.name()
    }

    /// The underlying module reference.
    pub fn reference(&self) -> &ModuleReference {
        &self.reference
    }

    /// The module descriptor.
    pub fn descriptor(&self) -> &ModuleDescriptor {
        self.reference.descriptor()
    }
}

/// The immutable result of resolution.
///
/// A configuration owns the modules resolved for it and a reads relation
/// whose targets may live in parent configurations. Configurations form
/// layers: a module already resolved in an ancestor is reused, never
/// re-resolved.
#[derive(Debug)]
pub struct Configuration {
    parents: Vec<Arc<Configuration>>,
    modules: BTreeMap<String, ResolvedModule>,
    reads: BTreeMap<String, BTreeSet<String>>,
}

impl Configuration {
    /// The empty configuration, parent of all root layers.
    pub fn empty() -> Arc<Configuration> {
        Arc::new(Configuration {
            parents: Vec::new(),
            modules: BTreeMap::new(),
            reads: BTreeMap::new(),
        })
    }

    /// Resolve the root modules against a finder, without service binding.
    pub fn resolve(
        finder: &dyn ModuleFinder,
        parents: Vec<Arc<Configuration>>,
        roots: &[String],
    ) -> Result<Arc<Configuration>> {
        Resolver::new(finder, parents).resolve(roots, false)
    }

    /// Resolve the root modules and bind service providers transitively.
    pub fn resolve_and_bind(
        finder: &dyn ModuleFinder,
        parents: Vec<Arc<Configuration>>,
        roots: &[String],
    ) -> Result<Arc<Configuration>> {
        Resolver::new(finder, parents).resolve(roots, true)
    }

    /// Parent configurations.
    pub fn parents(&self) -> &[Arc<Configuration>] {
        &self.parents
    }

    /// Modules resolved in this configuration, not counting parents.
    pub fn modules(&self) -> impl Iterator<Item = &ResolvedModule> {
        self.modules.values()
    }

    /// Names of the modules in this configuration.
    pub fn module_names(&self) -> impl Iterator<Item = &str> {
        self.modules.keys().map(|s| s.as_str())
    }

    /// Find a module in this configuration or any ancestor.
    pub fn find(&self, name: &str) -> Option<&ResolvedModule> {
        if let Some(m) = self.modules.get(name) {
            return Some(m);
        }
        self.parents.iter().find_map(|p| p.find(name))
    }

    /// The names this module reads, if it belongs to this configuration.
    pub fn reads(&self, name: &str) -> Option<&BTreeSet<String>> {
        self.reads.get(name)
    }

    /// Dependency graph over this configuration's own modules.
    ///
    /// Edges point from a module to the modules it requires, restricted to
    /// modules resolved in this configuration.
    pub fn requires_graph(&self) -> DependencyGraph {
        let mut graph = DependencyGraph::new();
        for module in self.modules.values() {
            graph.add_node(module.name());
            for requires in module.descriptor().requires() {
                if self.modules.contains_key(requires.name()) {
                    graph.add_edge(module.name(), requires.name());
                }
            }
        }
        graph
    }

    /// Minimal-leaf hash-group assignment for the candidate modules.
    pub fn hash_groups(
        &self,
        candidates: &BTreeSet<String>,
    ) -> Result<BTreeMap<String, BTreeSet<String>>> {
        hashes::hash_groups(&self.requires_graph(), candidates)
    }

    /// Compute hash records for the candidate modules.
    ///
    /// Each group key maps to the digests of the modules that depend on it,
    /// ready to be recorded in the key module's artifact.
    pub fn record_hashes(
        &self,
        candidates: &BTreeSet<String>,
        algorithm: HashAlgorithm,
    ) -> Result<BTreeMap<String, ModuleHashes>> {
        let groups = self.hash_groups(candidates)?;
        let mut records = BTreeMap::new();
        for (key, members) in groups {
            let mut digests = BTreeMap::new();
            for member in members {
                let module = self.find(&member).ok_or_else(|| {
                    ModuleError::Resolution(format!("module '{}' not in configuration", member))
                })?;
                let reader = module.reference().open_reader()?;
                let digest = compute_hash(reader.as_ref(), algorithm)?;
                reader.close()?;
                digests.insert(member, digest);
            }
            records.insert(key, ModuleHashes::new(algorithm, digests));
        }
        Ok(records)
    }
}

#[cfg(test)]
impl Configuration {
    /// Build a configuration directly from references, bypassing
    /// resolution. Mirrors a reused pre-resolved configuration whose checks
    /// did not run against the current module view.
    pub(crate) fn of_references(references: Vec<ModuleReference>) -> Arc<Configuration> {
        Arc::new(Configuration {
            parents: vec![Configuration::empty()],
            modules: references
                .into_iter()
                .map(|reference| {
                    (reference.name().to_string(), ResolvedModule { reference })
                })
                .collect(),
            reads: BTreeMap::new(),
        })
    }
}

/// Trace sink receiving one line per resolved module.
pub type TraceSink<'a> = Box<dyn FnMut(&str) + 'a>;

/// Resolution engine producing [`Configuration`] values.
pub struct Resolver<'a> {
    finder: &'a dyn ModuleFinder,
    parents: Vec<Arc<Configuration>>,
    resolved: BTreeMap<String, ModuleReference>,
    trace: Option<TraceSink<'a>>,
}

impl<'a> Resolver<'a> {
    /// Create a resolver over a finder and parent configurations.
    pub fn new(finder: &'a dyn ModuleFinder, parents: Vec<Arc<Configuration>>) -> Self {
        Self {
            finder,
            parents,
            resolved: BTreeMap::new(),
            trace: None,
        }
    }

    /// Attach a trace sink. Lines are best-effort diagnostics; their order
    /// follows traversal order and carries no semantic weight.
    pub fn with_trace(mut self, sink: TraceSink<'a>) -> Self {
        self.trace = Some(sink);
        self
    }

    /// Run resolution for the given roots.
    pub fn resolve(mut self, roots: &[String], bind_services: bool) -> Result<Arc<Configuration>> {
        for root in roots {
            if self.in_parents(root) {
                continue;
            }
            let reference = self.finder.find(root)?.ok_or_else(|| {
                ModuleError::Resolution(format!("root module '{}' not found", root))
            })?;
            self.add_and_close_over(reference)?;
        }

        if bind_services {
            self.bind_services()?;
        }
        self.check_split_packages()?;

        let reads = self.compute_reads();
        debug!("Resolved {} module(s)", self.resolved.len());

        Ok(Arc::new(Configuration {
            parents: self.parents,
            modules: self
                .resolved
                .into_iter()
                .map(|(name, reference)| (name, ResolvedModule { reference }))
                .collect(),
            reads,
        }))
    }

    fn in_parents(&self, name: &str) -> bool {
        self.parents.iter().any(|p| p.find(name).is_some())
    }

    /// Add a module and pull in its transitive requires.
    fn add_and_close_over(&mut self, reference: ModuleReference) -> Result<()> {
        let mut queue: VecDeque<ModuleReference> = VecDeque::new();
        queue.push_back(reference);

        while let Some(reference) = queue.pop_front() {
            let name = reference.name().to_string();
            if let Some(existing) = self.resolved.get(&name) {
                if *existing != reference {
                    return Err(ModuleError::Resolution(format!(
                        "two distinct modules named '{}' selected",
                        name
                    )));
                }
                continue;
            }

            self.trace_line(&format!("resolved {} ({})", name, reference.location()));
            debug!("Resolved module '{}' from {}", name, reference.location());

            // Every requires must be satisfiable; a TRANSITIVE modifier only
            // affects downstream readability, not closure membership.
            let mut needed: Vec<String> = reference
                .descriptor()
                .requires()
                .iter()
                .map(|r| r.name().to_string())
                .collect();
            // Every non-base module implicitly reads the base module
            if name != BASE_MODULE && !needed.iter().any(|n| n == BASE_MODULE) {
                needed.push(BASE_MODULE.to_string());
            }
            self.resolved.insert(name.clone(), reference);

            for required in needed {
                if self.resolved.contains_key(&required) || self.in_parents(&required) {
                    continue;
                }
                let found = self.finder.find(&required)?.ok_or_else(|| {
                    ModuleError::UnresolvedDependency {
                        requirer: name.clone(),
                        missing: required.clone(),
                    }
                })?;
                queue.push_back(found);
            }
        }
        Ok(())
    }

    /// Bind service providers until a fixpoint.
    ///
    /// Scans the entire observable finder each pass: a provider module may
    /// itself use further services, so newly added modules can grow the
    /// wanted set.
    fn bind_services(&mut self) -> Result<()> {
        loop {
            let mut wanted: BTreeSet<String> = BTreeSet::new();
            for reference in self.resolved.values() {
                wanted.extend(reference.descriptor().uses().iter().cloned());
            }
            if wanted.is_empty() {
                return Ok(());
            }

            let mut providers = Vec::new();
            for candidate in self.finder.find_all()? {
                if self.resolved.contains_key(candidate.name())
                    || self.in_parents(candidate.name())
                {
                    continue;
                }
                let provides_wanted = candidate
                    .descriptor()
                    .provides()
                    .iter()
                    .any(|p| wanted.contains(p.service()));
                if provides_wanted {
                    providers.push(candidate);
                }
            }

            if providers.is_empty() {
                return Ok(());
            }
            for provider in providers {
                debug!("Service binding adds module '{}'", provider.name());
                self.add_and_close_over(provider)?;
            }
        }
    }

    /// No package may be supplied by two modules in the closure.
    fn check_split_packages(&self) -> Result<()> {
        let mut owners: BTreeMap<&str, &str> = BTreeMap::new();
        for (name, reference) in &self.resolved {
            for package in reference.descriptor().packages() {
                if let Some(first) = owners.insert(package.as_str(), name.as_str()) {
                    return Err(ModuleError::SplitPackage {
                        package: package.clone(),
                        first: first.to_string(),
                        second: name.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Build the reads relation for the resolved modules.
    ///
    /// A module reads its requires, the base module, and everything
    /// re-exported through `transitive` requires chains. Automatic modules
    /// read every module in the configuration and its ancestors.
    fn compute_reads(&self) -> BTreeMap<String, BTreeSet<String>> {
        // Fixpoint over re-export sets handles require cycles without
        // recursion: reexports(N) = U { P + reexports(P) } over N's
        // transitive requires.
        let mut reexports: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        let mut descriptors: BTreeMap<&str, &ModuleDescriptor> = BTreeMap::new();
        for (name, reference) in &self.resolved {
            descriptors.insert(name.as_str(), reference.descriptor());
            reexports.insert(name.clone(), BTreeSet::new());
        }
        let mut parent_names: BTreeSet<String> = BTreeSet::new();
        for parent in &self.parents {
            collect_names(parent, &mut parent_names);
            collect_descriptors(parent, &mut descriptors, &mut reexports);
        }

        loop {
            let mut changed = false;
            let names: Vec<String> = reexports.keys().cloned().collect();
            for name in names {
                let Some(descriptor) = descriptors.get(name.as_str()) else {
                    continue;
                };
                let mut additions = BTreeSet::new();
                for requires in descriptor.requires() {
                    if !requires.has_modifier(RequiresModifier::Transitive) {
                        continue;
                    }
                    additions.insert(requires.name().to_string());
                    if let Some(inner) = reexports.get(requires.name()) {
                        additions.extend(inner.iter().cloned());
                    }
                }
                if let Some(current) = reexports.get_mut(&name) {
                    let before = current.len();
                    current.extend(additions);
                    if current.len() != before {
                        changed = true;
                    }
                }
            }
            if !changed {
                break;
            }
        }

        let mut reads = BTreeMap::new();
        for (name, reference) in &self.resolved {
            let descriptor = reference.descriptor();
            let mut set = BTreeSet::new();

            if descriptor.is_automatic() {
                // An automatic module reads every other resolved module
                set.extend(self.resolved.keys().cloned());
                set.extend(parent_names.iter().cloned());
                set.remove(name);
            } else {
                for requires in descriptor.requires() {
                    set.insert(requires.name().to_string());
                    if let Some(exported) = reexports.get(requires.name()) {
                        set.extend(exported.iter().cloned());
                    }
                }
                set.remove(name);
            }

            if name != BASE_MODULE {
                set.insert(BASE_MODULE.to_string());
            }
            reads.insert(name.clone(), set);
        }
        reads
    }

    fn trace_line(&mut self, line: &str) {
        if let Some(sink) = self.trace.as_mut() {
            sink(line);
        }
    }
}

fn collect_names(config: &Configuration, out: &mut BTreeSet<String>) {
    out.extend(config.modules.keys().cloned());
    for parent in &config.parents {
        collect_names(parent, out);
    }
}

fn collect_descriptors<'c>(
    config: &'c Configuration,
    descriptors: &mut BTreeMap<&'c str, &'c ModuleDescriptor>,
    reexports: &mut BTreeMap<String, BTreeSet<String>>,
) {
    for (name, module) in &config.modules {
        descriptors.entry(name.as_str()).or_insert(module.descriptor());
        reexports.entry(name.clone()).or_default();
    }
    for parent in &config.parents {
        collect_descriptors(parent, descriptors, reexports);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::ModuleDescriptor;
    use crate::finder::{compose, FixedFinder};
    use crate::reader::{DirReader, ModuleReader};
    use url::Url;

    fn make_ref(descriptor: ModuleDescriptor) -> ModuleReference {
        let url = Url::parse(&format!("file:///mods/{}", descriptor.name())).unwrap();
        ModuleReference::new(
            descriptor,
            url,
            Arc::new(|| Ok(Box::new(DirReader::new("/nonexistent")) as Box<dyn ModuleReader>)),
        )
    }

    fn base() -> ModuleReference {
        make_ref(
            ModuleDescriptor::builder(BASE_MODULE)
                .unwrap()
                .exports("lattice.lang")
                .unwrap()
                .build()
                .unwrap(),
        )
    }

    fn scenario_finder() -> FixedFinder {
        let lib = make_ref(
            ModuleDescriptor::builder("lib")
                .unwrap()
                .exports("lib.api")
                .unwrap()
                .build()
                .unwrap(),
        );
        let app = make_ref(
            ModuleDescriptor::builder("app")
                .unwrap()
                .requires("lib")
                .unwrap()
                .uses("lib.spi.S")
                .unwrap()
                .build()
                .unwrap(),
        );
        let plugin = make_ref(
            ModuleDescriptor::builder("plugin")
                .unwrap()
                .requires("lib")
                .unwrap()
                .provides("lib.spi.S", vec!["plugin.Impl".into()])
                .unwrap()
                .build()
                .unwrap(),
        );
        FixedFinder::new(vec![base(), lib, app, plugin])
    }

    fn resolve_roots(finder: &dyn ModuleFinder, roots: &[&str]) -> Result<Arc<Configuration>> {
        let roots: Vec<String> = roots.iter().map(|s| s.to_string()).collect();
        Configuration::resolve_and_bind(finder, vec![Configuration::empty()], &roots)
    }

    #[test]
    fn test_end_to_end_scenario() {
        let finder = scenario_finder();
        let config = resolve_roots(&finder, &["app"]).unwrap();

        let names: BTreeSet<&str> = config.module_names().collect();
        assert_eq!(
            names,
            BTreeSet::from([BASE_MODULE, "lib", "app", "plugin"])
        );

        let app_reads = config.reads("app").unwrap();
        assert!(app_reads.contains("lib"));
        assert!(app_reads.contains(BASE_MODULE));
        let lib_reads = config.reads("lib").unwrap();
        assert!(lib_reads.contains(BASE_MODULE));
        let plugin_reads = config.reads("plugin").unwrap();
        assert!(plugin_reads.contains("lib"));
        assert!(plugin_reads.contains(BASE_MODULE));
    }

    #[test]
    fn test_closure_completeness() {
        let finder = scenario_finder();
        let config = resolve_roots(&finder, &["app"]).unwrap();
        for module in config.modules() {
            for requires in module.descriptor().requires() {
                assert!(config.find(requires.name()).is_some());
                assert!(config.reads(module.name()).unwrap().contains(requires.name()));
            }
        }
    }

    #[test]
    fn test_missing_dependency_fails() {
        let app = make_ref(
            ModuleDescriptor::builder("app")
                .unwrap()
                .requires("ghost")
                .unwrap()
                .build()
                .unwrap(),
        );
        let finder = FixedFinder::new(vec![base(), app]);
        let err = resolve_roots(&finder, &["app"]).unwrap_err();
        match err {
            ModuleError::UnresolvedDependency { requirer, missing } => {
                assert_eq!(requirer, "app");
                assert_eq!(missing, "ghost");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_root_fails() {
        let finder = FixedFinder::new(vec![base()]);
        assert!(resolve_roots(&finder, &["nope"]).is_err());
    }

    #[test]
    fn test_split_package_rejected() {
        let first = make_ref(
            ModuleDescriptor::builder("first")
                .unwrap()
                .exports("p.q")
                .unwrap()
                .build()
                .unwrap(),
        );
        let second = make_ref(
            ModuleDescriptor::builder("second")
                .unwrap()
                .exports("p.q")
                .unwrap()
                .build()
                .unwrap(),
        );
        let finder = FixedFinder::new(vec![base(), first, second]);

        // Either alone resolves fine
        assert!(resolve_roots(&finder, &["first"]).is_ok());
        assert!(resolve_roots(&finder, &["second"]).is_ok());
        // Both in one closure is fatal
        let err = resolve_roots(&finder, &["first", "second"]).unwrap_err();
        assert!(matches!(err, ModuleError::SplitPackage { .. }));
    }

    #[test]
    fn test_service_binding_fixpoint() {
        let finder = scenario_finder();
        let config = resolve_roots(&finder, &["app"]).unwrap();
        assert!(config.find("plugin").is_some());

        // Without the provider in the universe, resolution still succeeds
        // and simply drops it
        let lib = make_ref(
            ModuleDescriptor::builder("lib")
                .unwrap()
                .exports("lib.api")
                .unwrap()
                .build()
                .unwrap(),
        );
        let app = make_ref(
            ModuleDescriptor::builder("app")
                .unwrap()
                .requires("lib")
                .unwrap()
                .uses("lib.spi.S")
                .unwrap()
                .build()
                .unwrap(),
        );
        let without_plugin = FixedFinder::new(vec![base(), lib, app]);
        let config = resolve_roots(&without_plugin, &["app"]).unwrap();
        assert!(config.find("plugin").is_none());
    }

    #[test]
    fn test_service_binding_is_transitive() {
        // plugin uses a second service provided by helper; helper must be
        // pulled in by the second binding pass
        let lib = make_ref(
            ModuleDescriptor::builder("lib")
                .unwrap()
                .exports("lib.api")
                .unwrap()
                .build()
                .unwrap(),
        );
        let app = make_ref(
            ModuleDescriptor::builder("app")
                .unwrap()
                .uses("lib.spi.S")
                .unwrap()
                .build()
                .unwrap(),
        );
        let plugin = make_ref(
            ModuleDescriptor::builder("plugin")
                .unwrap()
                .provides("lib.spi.S", vec!["plugin.Impl".into()])
                .unwrap()
                .uses("lib.spi.T")
                .unwrap()
                .build()
                .unwrap(),
        );
        let helper = make_ref(
            ModuleDescriptor::builder("helper")
                .unwrap()
                .requires("lib")
                .unwrap()
                .provides("lib.spi.T", vec!["helper.Impl".into()])
                .unwrap()
                .build()
                .unwrap(),
        );
        let finder = FixedFinder::new(vec![base(), lib, app, plugin, helper]);
        let config = resolve_roots(&finder, &["app"]).unwrap();
        assert!(config.find("plugin").is_some());
        assert!(config.find("helper").is_some());
        assert!(config.find("lib").is_some());
    }

    #[test]
    fn test_determinism() {
        let finder = scenario_finder();
        let a = resolve_roots(&finder, &["app"]).unwrap();
        let b = resolve_roots(&finder, &["app"]).unwrap();
        let names_a: Vec<&str> = a.module_names().collect();
        let names_b: Vec<&str> = b.module_names().collect();
        assert_eq!(names_a, names_b);
        for name in names_a {
            assert_eq!(a.reads(name), b.reads(name));
        }
    }

    #[test]
    fn test_requires_cycle_is_legal() {
        let a = make_ref(
            ModuleDescriptor::builder("a")
                .unwrap()
                .requires("b")
                .unwrap()
                .build()
                .unwrap(),
        );
        let b = make_ref(
            ModuleDescriptor::builder("b")
                .unwrap()
                .requires("a")
                .unwrap()
                .build()
                .unwrap(),
        );
        let finder = FixedFinder::new(vec![base(), a, b]);
        let config = resolve_roots(&finder, &["a"]).unwrap();
        assert!(config.reads("a").unwrap().contains("b"));
        assert!(config.reads("b").unwrap().contains("a"));
    }

    #[test]
    fn test_transitive_requires_readability() {
        let api = make_ref(
            ModuleDescriptor::builder("api")
                .unwrap()
                .exports("api")
                .unwrap()
                .build()
                .unwrap(),
        );
        let lib = make_ref(
            ModuleDescriptor::builder("lib")
                .unwrap()
                .requires_with(
                    "api",
                    BTreeSet::from([RequiresModifier::Transitive]),
                    None,
                )
                .unwrap()
                .build()
                .unwrap(),
        );
        let app = make_ref(
            ModuleDescriptor::builder("app")
                .unwrap()
                .requires("lib")
                .unwrap()
                .build()
                .unwrap(),
        );
        let finder = FixedFinder::new(vec![base(), api, lib, app]);
        let config = resolve_roots(&finder, &["app"]).unwrap();
        // app reads api through lib's transitive requires
        assert!(config.reads("app").unwrap().contains("api"));
        // api does not read app
        assert!(!config.reads("api").unwrap().contains("app"));
    }

    #[test]
    fn test_parent_configuration_reuse() {
        let finder = FixedFinder::new(vec![base()]);
        let boot = Configuration::resolve_and_bind(
            &finder,
            vec![Configuration::empty()],
            &[BASE_MODULE.to_string()],
        )
        .unwrap();

        let app = make_ref(
            ModuleDescriptor::builder("app").unwrap().build().unwrap(),
        );
        let child_finder = FixedFinder::new(vec![app]);
        let child = Configuration::resolve_and_bind(
            &child_finder,
            vec![Arc::clone(&boot)],
            &["app".to_string()],
        )
        .unwrap();

        // base is reused from the parent layer, not re-resolved
        let names: Vec<&str> = child.module_names().collect();
        assert_eq!(names, vec!["app"]);
        assert!(child.find(BASE_MODULE).is_some());
        assert!(child.reads("app").unwrap().contains(BASE_MODULE));
    }

    #[test]
    fn test_automatic_module_reads_everything() {
        let auto = make_ref(
            ModuleDescriptor::automatic_builder("auto")
                .unwrap()
                .packages(["auto.pkg".to_string()])
                .unwrap()
                .build()
                .unwrap(),
        );
        let lib = make_ref(
            ModuleDescriptor::builder("lib")
                .unwrap()
                .exports("lib.api")
                .unwrap()
                .build()
                .unwrap(),
        );
        let finder = FixedFinder::new(vec![base(), auto, lib]);
        let config = resolve_roots(&finder, &["auto", "lib"]).unwrap();
        let auto_reads = config.reads("auto").unwrap();
        assert!(auto_reads.contains("lib"));
        assert!(auto_reads.contains(BASE_MODULE));
        assert!(!auto_reads.contains("auto"));
    }

    #[test]
    fn test_trace_sink_receives_lines() {
        let finder = scenario_finder();
        let mut lines: Vec<String> = Vec::new();
        let config = Resolver::new(&finder, vec![Configuration::empty()])
            .with_trace(Box::new(|line| lines.push(line.to_string())))
            .resolve(&["app".to_string()], true)
            .unwrap();
        assert_eq!(lines.len(), config.module_names().count());
        assert!(lines.iter().any(|l| l.contains("app")));
    }

    #[test]
    fn test_composed_finder_resolution() {
        let finder_a = Arc::new(FixedFinder::new(vec![base()]));
        let app = make_ref(
            ModuleDescriptor::builder("app").unwrap().build().unwrap(),
        );
        let finder_b = Arc::new(FixedFinder::new(vec![app]));
        let composed = compose(vec![finder_a, finder_b]);
        let config = resolve_roots(composed.as_ref(), &["app"]).unwrap();
        assert!(config.find(BASE_MODULE).is_some());
    }

    #[test]
    fn test_record_hashes() {
        use crate::descriptor::DESCRIPTOR_NAME;
        use crate::module_path::ModulePath;

        let root = tempfile::tempdir().unwrap();
        let mods = root.path().join("mods");
        for (name, body) in [
            (BASE_MODULE, format!("name = \"{}\"\n", BASE_MODULE)),
            ("lib", "name = \"lib\"\n".to_string()),
            (
                "app",
                "name = \"app\"\n[[requires]]\nname = \"lib\"\n".to_string(),
            ),
        ] {
            let dir = mods.join(name);
            std::fs::create_dir_all(&dir).unwrap();
            std::fs::write(dir.join(DESCRIPTOR_NAME), body).unwrap();
        }

        let finder = ModulePath::new(vec![mods]);
        let config = resolve_roots(&finder, &["app"]).unwrap();
        let candidates: BTreeSet<String> =
            ["lib".to_string(), "app".to_string()].into_iter().collect();
        let records = config
            .record_hashes(&candidates, HashAlgorithm::Sha256)
            .unwrap();
        let lib_record = records.get("lib").expect("group keyed by lib");
        assert!(lib_record.hash_for("app").is_some());
        assert_eq!(lib_record.algorithm(), HashAlgorithm::Sha256);
    }
}
