//! Module references.
//!
//! A [`ModuleReference`] pairs a descriptor with the location of the
//! artifact supplying its content and a supplier of content readers. It may
//! also carry a target platform string, hashes of dependent modules recorded
//! by the producing build, and a lazy hash of its own content.

use std::fmt;
use std::sync::Arc;

use url::Url;

use crate::descriptor::ModuleDescriptor;
use crate::error::Result;
use crate::hashes::{HashSupplier, ModuleHashes};
use crate::reader::ModuleReader;

/// Factory for fresh reader handles over a reference's content.
pub type ReaderSupplier = Arc<dyn Fn() -> Result<Box<dyn ModuleReader>> + Send + Sync>;

/// A module descriptor bound to the artifact that supplies its content.
#[derive(Clone)]
pub struct ModuleReference {
    descriptor: Arc<ModuleDescriptor>,
    location: Url,
    reader: ReaderSupplier,
    target: Option<String>,
    recorded_hashes: Option<Arc<ModuleHashes>>,
    self_hash: Option<Arc<HashSupplier>>,
    patch_id: Option<u64>,
}

impl ModuleReference {
    /// Create a reference from a descriptor, a location and a reader
    /// supplier.
    pub fn new(descriptor: ModuleDescriptor, location: Url, reader: ReaderSupplier) -> Self {
        Self {
            descriptor: Arc::new(descriptor),
            location,
            reader,
            target: None,
            recorded_hashes: None,
            self_hash: None,
            patch_id: None,
        }
    }

    /// Attach a target platform string.
    pub fn with_target(mut self, target: Option<String>) -> Self {
        self.target = target;
        self
    }

    /// Attach hashes of dependent modules recorded by the producing build.
    pub fn with_recorded_hashes(mut self, hashes: Option<ModuleHashes>) -> Self {
        self.recorded_hashes = hashes.map(Arc::new);
        self
    }

    /// Attach a lazy supplier of this module's own content hash.
    pub fn with_self_hash(mut self, supplier: HashSupplier) -> Self {
        self.self_hash = Some(Arc::new(supplier));
        self
    }

    /// Derive a patched reference with a new descriptor and reader supplier.
    ///
    /// The patcher identity keeps references to the same content patched
    /// differently distinct.
    pub(crate) fn patched(
        &self,
        descriptor: ModuleDescriptor,
        reader: ReaderSupplier,
        patch_id: u64,
    ) -> Self {
        Self {
            descriptor: Arc::new(descriptor),
            location: self.location.clone(),
            reader,
            target: self.target.clone(),
            recorded_hashes: self.recorded_hashes.clone(),
            self_hash: None,
            patch_id: Some(patch_id),
        }
    }

    /// The module descriptor.
    pub fn descriptor(&self) -> &ModuleDescriptor {
        &self.descriptor
    }

    /// The module name, a shorthand for `descriptor().name()`.
    pub fn name(&self) -> &str {
        self.descriptor.name()
    }

    /// Location of the artifact supplying this module's content.
    pub fn location(&self) -> &Url {
        &self.location
    }

    /// The target platform string, if recorded.
    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }

    /// Hashes of dependent modules recorded by the producing build, if any.
    pub fn recorded_hashes(&self) -> Option<&ModuleHashes> {
        self.recorded_hashes.as_deref()
    }

    /// The lazily computed hash of this module's own content, if available.
    pub fn self_hash(&self) -> Result<Option<Vec<u8>>> {
        match &self.self_hash {
            Some(supplier) => Ok(Some(supplier.get()?)),
            None => Ok(None),
        }
    }

    /// The identity of the patcher that produced this reference, if any.
    pub fn patch_id(&self) -> Option<u64> {
        self.patch_id
    }

    /// Open a fresh, independent reader over this module's content.
    pub fn open_reader(&self) -> Result<Box<dyn ModuleReader>> {
        (self.reader)()
    }
}

impl PartialEq for ModuleReference {
    /// Value equality over (descriptor, location, patcher identity).
    ///
    /// Two references to the same content patched differently are
    /// intentionally distinct; content itself is never compared.
    fn eq(&self, other: &Self) -> bool {
        self.descriptor == other.descriptor
            && self.location == other.location
            && self.patch_id == other.patch_id
    }
}

impl Eq for ModuleReference {}

impl fmt::Debug for ModuleReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleReference")
            .field("module", &self.descriptor.to_string())
            .field("location", &self.location.as_str())
            .field("patch_id", &self.patch_id)
            .finish()
    }
}
