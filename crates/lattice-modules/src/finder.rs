//! Module finders.
//!
//! A [`ModuleFinder`] locates module references by name or enumerates all
//! modules it knows about. Finders are stateless from the caller's point of
//! view; implementations may cache internally but must support concurrent
//! `find`/`find_all`.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::Result;
use crate::reference::ModuleReference;

/// Capability to locate modules by name.
pub trait ModuleFinder: Send + Sync {
    /// Find a module by name. Absence is not an error.
    fn find(&self, name: &str) -> Result<Option<ModuleReference>>;

    /// All modules this finder can locate, one reference per name.
    fn find_all(&self) -> Result<Vec<ModuleReference>>;
}

/// A finder over a fixed, prebuilt set of references.
pub struct FixedFinder {
    modules: BTreeMap<String, ModuleReference>,
}

impl FixedFinder {
    /// Create a finder over the given references.
    ///
    /// On duplicate names the first reference wins, mirroring the shadowing
    /// policy of composed finders.
    pub fn new<I>(references: I) -> Self
    where
        I: IntoIterator<Item = ModuleReference>,
    {
        let mut modules = BTreeMap::new();
        for reference in references {
            modules
                .entry(reference.name().to_string())
                .or_insert(reference);
        }
        Self { modules }
    }

    /// Names of all modules in this finder.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.modules.keys().map(|s| s.as_str())
    }
}

impl ModuleFinder for FixedFinder {
    fn find(&self, name: &str) -> Result<Option<ModuleReference>> {
        Ok(self.modules.get(name).cloned())
    }

    fn find_all(&self) -> Result<Vec<ModuleReference>> {
        Ok(self.modules.values().cloned().collect())
    }
}

/// A finder that never finds anything.
pub struct EmptyFinder;

impl ModuleFinder for EmptyFinder {
    fn find(&self, _name: &str) -> Result<Option<ModuleReference>> {
        Ok(None)
    }

    fn find_all(&self) -> Result<Vec<ModuleReference>> {
        Ok(Vec::new())
    }
}

/// Deterministic left-to-right composition of finders.
///
/// `find` tries each child in order; `find_all` is the union with earlier
/// children shadowing later ones on name collision.
pub struct ComposedFinder {
    finders: Vec<Arc<dyn ModuleFinder>>,
}

impl ComposedFinder {
    /// Compose the given finders in precedence order.
    pub fn new(finders: Vec<Arc<dyn ModuleFinder>>) -> Self {
        Self { finders }
    }
}

impl ModuleFinder for ComposedFinder {
    fn find(&self, name: &str) -> Result<Option<ModuleReference>> {
        for finder in &self.finders {
            if let Some(reference) = finder.find(name)? {
                return Ok(Some(reference));
            }
        }
        Ok(None)
    }

    fn find_all(&self) -> Result<Vec<ModuleReference>> {
        let mut union: BTreeMap<String, ModuleReference> = BTreeMap::new();
        for finder in &self.finders {
            for reference in finder.find_all()? {
                union
                    .entry(reference.name().to_string())
                    .or_insert(reference);
            }
        }
        Ok(union.into_values().collect())
    }
}

/// Compose finders in precedence order.
pub fn compose(finders: Vec<Arc<dyn ModuleFinder>>) -> Arc<dyn ModuleFinder> {
    Arc::new(ComposedFinder::new(finders))
}
