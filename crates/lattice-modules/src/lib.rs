//! # lattice-modules
//!
//! Module resolution and loading core for the Lattice runtime.
//!
//! ## Overview
//!
//! This crate turns a set of declared modules into a consistent, resolved
//! module graph and binds each resolved module to a loading authority and to
//! the artifact supplying its content:
//!
//! - Descriptor model: immutable [`ModuleDescriptor`] values parsed from
//!   `module-info.toml` sources or built programmatically
//! - Finders: directory trees, packed artifacts, the system image,
//!   composition and patching
//! - Resolver: transitive closure over requires, service binding,
//!   consistency checks, reads-edge construction
//! - Loader binding: boot / platform / application authority assignment
//! - Service catalogs: per-authority provider registries
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use lattice_modules::{boot, BootConfig, SystemImage};
//!
//! let system = SystemImage::open("/opt/lattice")?;
//! let layer = boot(&system, &BootConfig::default(), None)?;
//! for module in layer.configuration().modules() {
//!     println!("{}", module.descriptor());
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bootstrap;
pub mod checks;
pub mod descriptor;
pub mod error;
pub mod finder;
pub mod hashes;
pub mod loader_map;
pub mod module_path;
pub mod patcher;
pub mod reader;
pub mod reference;
pub mod resolver;
pub mod services;
pub mod system;
pub mod validator;
pub mod version;

// Re-exports for convenience
pub use bootstrap::{boot, BootConfig, BootLayer, ConfigurationCache};
pub use descriptor::{DescriptorBuilder, ModuleDescriptor};
pub use error::{ModuleError, Result};
pub use finder::{compose, ModuleFinder};
pub use hashes::{HashAlgorithm, ModuleHashes};
pub use loader_map::{AuthorityPartition, LoaderAuthority, LoaderMap};
pub use module_path::ModulePath;
pub use patcher::ModulePatcher;
pub use reader::ModuleReader;
pub use reference::ModuleReference;
pub use resolver::{Configuration, ResolvedModule, Resolver};
pub use services::ServicesCatalog;
pub use system::SystemImage;
pub use validator::ModulePathValidator;
pub use version::Version;

/// Name of the base module every other module implicitly reads.
pub const BASE_MODULE: &str = "lattice.base";
