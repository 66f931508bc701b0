//! Module descriptors.
//!
//! A [`ModuleDescriptor`] is the immutable value describing one module: its
//! name, optional version, the modules it requires, the packages it exports
//! and opens, the services it uses and provides, and its full package set.
//! Descriptors are constructed either by parsing a `module-info.toml`
//! descriptor source or programmatically through [`DescriptorBuilder`], and
//! are frozen once built.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use serde::Deserialize;

use crate::checks::{
    package_of, validate_class_name, validate_module_name, validate_package_name,
};
use crate::error::{ModuleError, Result};
use crate::version::Version;
use crate::BASE_MODULE;

/// The reserved descriptor-source file name.
pub const DESCRIPTOR_NAME: &str = "module-info.toml";

/// Modifiers on a module declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ModuleModifier {
    /// All packages are open for reflective access
    Open,
    /// Synthesized from an artifact without a descriptor
    Automatic,
    /// Not declared in any source
    Synthetic,
    /// Implicitly declared
    Mandated,
}

/// Modifiers on a requires declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RequiresModifier {
    /// Readers of this module also read the required module
    Transitive,
    /// Required at compile time only
    Static,
    /// Not declared in any source
    Synthetic,
    /// Implicitly declared
    Mandated,
}

impl fmt::Display for RequiresModifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequiresModifier::Transitive => f.write_str("transitive"),
            RequiresModifier::Static => f.write_str("static"),
            RequiresModifier::Synthetic => f.write_str("synthetic"),
            RequiresModifier::Mandated => f.write_str("mandated"),
        }
    }
}

/// A dependency on another module.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Requires {
    name: String,
    modifiers: BTreeSet<RequiresModifier>,
    compiled_version: Option<Arc<Version>>,
}

impl Requires {
    /// Name of the required module.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Modifiers on this requires declaration.
    pub fn modifiers(&self) -> &BTreeSet<RequiresModifier> {
        &self.modifiers
    }

    /// True if the declaration carries the given modifier.
    pub fn has_modifier(&self, m: RequiresModifier) -> bool {
        self.modifiers.contains(&m)
    }

    /// The version of the required module recorded at compile time, if any.
    pub fn compiled_version(&self) -> Option<&Version> {
        self.compiled_version.as_deref()
    }
}

impl fmt::Display for Requires {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for m in &self.modifiers {
            write!(f, "{} ", m)?;
        }
        f.write_str(&self.name)
    }
}

/// An exported package, optionally qualified to named target modules.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Exports {
    package: String,
    targets: BTreeSet<String>,
}

impl Exports {
    /// The exported package.
    pub fn package(&self) -> &str {
        &self.package
    }

    /// Target modules of a qualified export; empty for an unqualified one.
    pub fn targets(&self) -> &BTreeSet<String> {
        &self.targets
    }

    /// True if this export names target modules.
    pub fn is_qualified(&self) -> bool {
        !self.targets.is_empty()
    }
}

impl fmt::Display for Exports {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_qualified() {
            write!(f, "{} to {:?}", self.package, self.targets)
        } else {
            f.write_str(&self.package)
        }
    }
}

/// A package opened for reflective access, optionally qualified.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Opens {
    package: String,
    targets: BTreeSet<String>,
}

impl Opens {
    /// The opened package.
    pub fn package(&self) -> &str {
        &self.package
    }

    /// Target modules of a qualified opens; empty for an unqualified one.
    pub fn targets(&self) -> &BTreeSet<String> {
        &self.targets
    }

    /// True if this opens names target modules.
    pub fn is_qualified(&self) -> bool {
        !self.targets.is_empty()
    }
}

/// A service provided by a module, with its ordered provider classes.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Provides {
    service: String,
    providers: Vec<String>,
}

impl Provides {
    /// The service type name.
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Provider class names, in declaration order.
    pub fn providers(&self) -> &[String] {
        &self.providers
    }
}

impl fmt::Display for Provides {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} with {}", self.service, self.providers.join(", "))
    }
}

/// An immutable module descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleDescriptor {
    name: String,
    version: Option<Arc<Version>>,
    modifiers: BTreeSet<ModuleModifier>,
    requires: BTreeSet<Requires>,
    exports: BTreeSet<Exports>,
    opens: BTreeSet<Opens>,
    uses: BTreeSet<String>,
    provides: BTreeSet<Provides>,
    packages: BTreeSet<String>,
    main_class: Option<String>,
}

impl ModuleDescriptor {
    /// Start building a descriptor for a normal (explicit) module.
    pub fn builder(name: &str) -> Result<DescriptorBuilder> {
        DescriptorBuilder::new(name, BTreeSet::new())
    }

    /// Start building a descriptor for an open module.
    pub fn open_builder(name: &str) -> Result<DescriptorBuilder> {
        DescriptorBuilder::new(name, BTreeSet::from([ModuleModifier::Open]))
    }

    /// Start building a descriptor for an automatic module.
    ///
    /// Automatic modules have no requires, exports, opens or uses; only
    /// packages and provides may be added.
    pub fn automatic_builder(name: &str) -> Result<DescriptorBuilder> {
        DescriptorBuilder::new(name, BTreeSet::from([ModuleModifier::Automatic]))
    }

    /// The module name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The module version, if declared.
    pub fn version(&self) -> Option<&Version> {
        self.version.as_deref()
    }

    /// Module modifiers.
    pub fn modifiers(&self) -> &BTreeSet<ModuleModifier> {
        &self.modifiers
    }

    /// True for a module synthesized from a descriptor-less artifact.
    pub fn is_automatic(&self) -> bool {
        self.modifiers.contains(&ModuleModifier::Automatic)
    }

    /// True for an open module.
    pub fn is_open(&self) -> bool {
        self.modifiers.contains(&ModuleModifier::Open)
    }

    /// Requires declarations.
    pub fn requires(&self) -> &BTreeSet<Requires> {
        &self.requires
    }

    /// Exports declarations.
    pub fn exports(&self) -> &BTreeSet<Exports> {
        &self.exports
    }

    /// Opens declarations.
    pub fn opens(&self) -> &BTreeSet<Opens> {
        &self.opens
    }

    /// Service types this module uses.
    pub fn uses(&self) -> &BTreeSet<String> {
        &self.uses
    }

    /// Services this module provides.
    pub fn provides(&self) -> &BTreeSet<Provides> {
        &self.provides
    }

    /// All packages in the module, a superset of exported and opened ones.
    pub fn packages(&self) -> &BTreeSet<String> {
        &self.packages
    }

    /// The main class, if declared.
    pub fn main_class(&self) -> Option<&str> {
        self.main_class.as_deref()
    }

    /// Derive a descriptor identical to this one but with extra packages.
    ///
    /// Used when patch locations contribute packages the original descriptor
    /// does not know about. Requires, exports, opens and provides are carried
    /// over unchanged.
    pub fn with_added_packages<I>(&self, extra: I) -> ModuleDescriptor
    where
        I: IntoIterator<Item = String>,
    {
        let mut derived = self.clone();
        derived.packages.extend(extra);
        derived
    }
}

impl fmt::Display for ModuleDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version {
            Some(v) => write!(f, "{}@{}", self.name, v),
            None => f.write_str(&self.name),
        }
    }
}

/// Builder for [`ModuleDescriptor`] values.
///
/// Enforces the descriptor invariants at declaration time: names are
/// validated, duplicate declarations are rejected, and the base module
/// dependency is synthesized on build for every non-base explicit module.
pub struct DescriptorBuilder {
    name: String,
    version: Option<Arc<Version>>,
    modifiers: BTreeSet<ModuleModifier>,
    requires: BTreeMap<String, Requires>,
    exports: BTreeMap<String, Exports>,
    opens: BTreeMap<String, Opens>,
    uses: BTreeSet<String>,
    provides: BTreeMap<String, Provides>,
    packages: BTreeSet<String>,
    main_class: Option<String>,
}

impl DescriptorBuilder {
    fn new(name: &str, modifiers: BTreeSet<ModuleModifier>) -> Result<Self> {
        validate_module_name(name)?;
        Ok(Self {
            name: name.to_string(),
            version: None,
            modifiers,
            requires: BTreeMap::new(),
            exports: BTreeMap::new(),
            opens: BTreeMap::new(),
            uses: BTreeSet::new(),
            provides: BTreeMap::new(),
            packages: BTreeSet::new(),
            main_class: None,
        })
    }

    fn is_automatic(&self) -> bool {
        self.modifiers.contains(&ModuleModifier::Automatic)
    }

    fn err(&self, reason: impl Into<String>) -> ModuleError {
        ModuleError::Descriptor {
            module: self.name.clone(),
            reason: reason.into(),
        }
    }

    /// Set the module version.
    pub fn version(mut self, version: Version) -> Self {
        self.version = Some(Arc::new(version));
        self
    }

    /// Set the module version from an already interned value.
    pub fn version_arc(mut self, version: Arc<Version>) -> Self {
        self.version = Some(version);
        self
    }

    /// Add a requires declaration without modifiers.
    pub fn requires(self, name: &str) -> Result<Self> {
        self.requires_with(name, BTreeSet::new(), None)
    }

    /// Add a requires declaration with modifiers and an optional compiled
    /// version.
    pub fn requires_with(
        mut self,
        name: &str,
        modifiers: BTreeSet<RequiresModifier>,
        compiled_version: Option<Arc<Version>>,
    ) -> Result<Self> {
        validate_module_name(name)?;
        if self.is_automatic() {
            return Err(self.err("automatic module cannot declare requires"));
        }
        if name == self.name {
            return Err(self.err("module cannot require itself"));
        }
        if self.requires.contains_key(name) {
            return Err(self.err(format!("duplicate requires of '{}'", name)));
        }
        self.requires.insert(
            name.to_string(),
            Requires {
                name: name.to_string(),
                modifiers,
                compiled_version,
            },
        );
        Ok(self)
    }

    /// Add an unqualified exports declaration.
    pub fn exports(self, package: &str) -> Result<Self> {
        self.exports_to(package, BTreeSet::new())
    }

    /// Add an exports declaration qualified to the given target modules.
    pub fn exports_to(mut self, package: &str, targets: BTreeSet<String>) -> Result<Self> {
        validate_package_name(package)?;
        for target in &targets {
            validate_module_name(target)?;
        }
        if self.is_automatic() {
            return Err(self.err("automatic module cannot declare exports"));
        }
        if self.exports.contains_key(package) {
            return Err(self.err(format!("package '{}' already exported", package)));
        }
        self.packages.insert(package.to_string());
        self.exports.insert(
            package.to_string(),
            Exports {
                package: package.to_string(),
                targets,
            },
        );
        Ok(self)
    }

    /// Add an unqualified opens declaration.
    pub fn opens(self, package: &str) -> Result<Self> {
        self.opens_to(package, BTreeSet::new())
    }

    /// Add an opens declaration qualified to the given target modules.
    pub fn opens_to(mut self, package: &str, targets: BTreeSet<String>) -> Result<Self> {
        validate_package_name(package)?;
        for target in &targets {
            validate_module_name(target)?;
        }
        if self.is_automatic() {
            return Err(self.err("automatic module cannot declare opens"));
        }
        if self.modifiers.contains(&ModuleModifier::Open) {
            return Err(self.err("open module cannot declare opens"));
        }
        if self.opens.contains_key(package) {
            return Err(self.err(format!("package '{}' already opened", package)));
        }
        self.packages.insert(package.to_string());
        self.opens.insert(
            package.to_string(),
            Opens {
                package: package.to_string(),
                targets,
            },
        );
        Ok(self)
    }

    /// Add a uses declaration for a service type.
    pub fn uses(mut self, service: &str) -> Result<Self> {
        validate_class_name(service)?;
        if self.is_automatic() {
            return Err(self.err("automatic module cannot declare uses"));
        }
        if !self.uses.insert(service.to_string()) {
            return Err(self.err(format!("duplicate uses of '{}'", service)));
        }
        Ok(self)
    }

    /// Add a provides declaration for a service type.
    pub fn provides(mut self, service: &str, providers: Vec<String>) -> Result<Self> {
        validate_class_name(service)?;
        if providers.is_empty() {
            return Err(self.err(format!("empty provider list for '{}'", service)));
        }
        let mut seen = BTreeSet::new();
        for provider in &providers {
            validate_class_name(provider)?;
            if !seen.insert(provider.as_str()) {
                return Err(self.err(format!(
                    "provider '{}' declared twice for '{}'",
                    provider, service
                )));
            }
        }
        if self.provides.contains_key(service) {
            return Err(self.err(format!("service '{}' already provided", service)));
        }
        for provider in &providers {
            if let Some(pkg) = package_of(provider) {
                self.packages.insert(pkg.to_string());
            }
        }
        self.provides.insert(
            service.to_string(),
            Provides {
                service: service.to_string(),
                providers,
            },
        );
        Ok(self)
    }

    /// Add packages to the module's package set.
    pub fn packages<I>(mut self, packages: I) -> Result<Self>
    where
        I: IntoIterator<Item = String>,
    {
        for package in packages {
            validate_package_name(&package)?;
            self.packages.insert(package);
        }
        Ok(self)
    }

    /// Set the main class.
    pub fn main_class(mut self, class: &str) -> Result<Self> {
        validate_class_name(class)?;
        if let Some(pkg) = package_of(class) {
            self.packages.insert(pkg.to_string());
        }
        self.main_class = Some(class.to_string());
        Ok(self)
    }

    /// Freeze the builder into an immutable descriptor.
    ///
    /// Synthesizes the mandated base-module dependency for every explicit
    /// non-base module that does not declare one. The base module itself must
    /// have zero requires.
    pub fn build(mut self) -> Result<ModuleDescriptor> {
        if self.name == BASE_MODULE {
            if !self.requires.is_empty() {
                return Err(self.err("the base module cannot declare requires"));
            }
        } else if !self.is_automatic() && !self.requires.contains_key(BASE_MODULE) {
            self.requires.insert(
                BASE_MODULE.to_string(),
                Requires {
                    name: BASE_MODULE.to_string(),
                    modifiers: BTreeSet::from([RequiresModifier::Mandated]),
                    compiled_version: None,
                },
            );
        }

        Ok(ModuleDescriptor {
            name: self.name,
            version: self.version,
            modifiers: self.modifiers,
            requires: self.requires.into_values().collect(),
            exports: self.exports.into_values().collect(),
            opens: self.opens.into_values().collect(),
            uses: self.uses,
            provides: self.provides.into_values().collect(),
            packages: self.packages,
            main_class: self.main_class,
        })
    }
}

/// A descriptor parsed from a descriptor source, plus source-level extras
/// that do not belong to the descriptor value itself.
#[derive(Debug, Clone)]
pub struct ParsedDescriptor {
    /// The parsed descriptor
    pub descriptor: ModuleDescriptor,
    /// Target platform string, if recorded
    pub target: Option<String>,
}

/// Raw shape of a `module-info.toml` document.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RawDescriptor {
    name: String,
    version: Option<String>,
    #[serde(default)]
    open: bool,
    #[serde(default)]
    requires: Vec<RawRequires>,
    #[serde(default)]
    exports: Vec<RawPackageClause>,
    #[serde(default)]
    opens: Vec<RawPackageClause>,
    #[serde(default)]
    uses: Vec<String>,
    #[serde(default)]
    provides: Vec<RawProvides>,
    #[serde(default)]
    packages: Vec<String>,
    main_class: Option<String>,
    target: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawRequires {
    name: String,
    #[serde(default)]
    modifiers: Vec<String>,
    version: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawPackageClause {
    package: String,
    #[serde(default)]
    to: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawProvides {
    service: String,
    providers: Vec<String>,
}

/// Parse a descriptor source.
///
/// The returned descriptor already satisfies the structural invariants;
/// callers that derive extra packages from content scanning should union
/// them in with [`ModuleDescriptor::with_added_packages`].
pub fn read(bytes: &[u8]) -> Result<ParsedDescriptor> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| ModuleError::DescriptorFormat(format!("not UTF-8: {}", e)))?;
    let raw: RawDescriptor = toml::from_str(text)?;

    let mut builder = if raw.open {
        ModuleDescriptor::open_builder(&raw.name)?
    } else {
        ModuleDescriptor::builder(&raw.name)?
    };

    if let Some(v) = &raw.version {
        builder = builder.version(Version::parse(v)?);
    }
    for r in raw.requires {
        let mut modifiers = BTreeSet::new();
        for m in &r.modifiers {
            modifiers.insert(parse_requires_modifier(m)?);
        }
        let compiled = match &r.version {
            Some(v) => Some(Arc::new(Version::parse(v)?)),
            None => None,
        };
        builder = builder.requires_with(&r.name, modifiers, compiled)?;
    }
    for e in raw.exports {
        builder = builder.exports_to(&e.package, e.to.into_iter().collect())?;
    }
    for o in raw.opens {
        builder = builder.opens_to(&o.package, o.to.into_iter().collect())?;
    }
    for u in raw.uses {
        builder = builder.uses(&u)?;
    }
    for p in raw.provides {
        builder = builder.provides(&p.service, p.providers)?;
    }
    builder = builder.packages(raw.packages)?;
    if let Some(mc) = &raw.main_class {
        builder = builder.main_class(mc)?;
    }

    Ok(ParsedDescriptor {
        descriptor: builder.build()?,
        target: raw.target,
    })
}

fn parse_requires_modifier(s: &str) -> Result<RequiresModifier> {
    match s {
        "transitive" => Ok(RequiresModifier::Transitive),
        "static" => Ok(RequiresModifier::Static),
        "synthetic" => Ok(RequiresModifier::Synthetic),
        "mandated" => Ok(RequiresModifier::Mandated),
        other => Err(ModuleError::DescriptorFormat(format!(
            "unknown requires modifier '{}'",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_synthesizes_base_requires() {
        let descriptor = ModuleDescriptor::builder("app")
            .unwrap()
            .exports("app.api")
            .unwrap()
            .build()
            .unwrap();
        let base = descriptor
            .requires()
            .iter()
            .find(|r| r.name() == BASE_MODULE)
            .expect("base requires synthesized");
        assert!(base.has_modifier(RequiresModifier::Mandated));
    }

    #[test]
    fn test_base_module_has_no_requires() {
        let base = ModuleDescriptor::builder(BASE_MODULE)
            .unwrap()
            .exports("lattice.lang")
            .unwrap()
            .build()
            .unwrap();
        assert!(base.requires().is_empty());

        let err = ModuleDescriptor::builder(BASE_MODULE)
            .unwrap()
            .requires("other")
            .unwrap()
            .build();
        assert!(err.is_err());
    }

    #[test]
    fn test_duplicate_declarations_rejected() {
        let b = ModuleDescriptor::builder("m").unwrap();
        assert!(b
            .exports("p.q")
            .unwrap()
            .exports("p.q")
            .is_err());

        let b = ModuleDescriptor::builder("m").unwrap();
        assert!(b
            .requires("a")
            .unwrap()
            .requires("a")
            .is_err());

        let b = ModuleDescriptor::builder("m").unwrap();
        assert!(b
            .provides("s.Api", vec!["m.Impl".into(), "m.Impl".into()])
            .is_err());
    }

    #[test]
    fn test_automatic_module_restrictions() {
        let b = ModuleDescriptor::automatic_builder("auto").unwrap();
        assert!(b.requires("lib").is_err());
        let b = ModuleDescriptor::automatic_builder("auto").unwrap();
        assert!(b.exports("p").is_err());

        let descriptor = ModuleDescriptor::automatic_builder("auto")
            .unwrap()
            .packages(["p".to_string()])
            .unwrap()
            .provides("s.Api", vec!["p.Impl".into()])
            .unwrap()
            .build()
            .unwrap();
        assert!(descriptor.is_automatic());
        assert!(descriptor.requires().is_empty());
    }

    #[test]
    fn test_packages_superset() {
        let descriptor = ModuleDescriptor::builder("m")
            .unwrap()
            .exports("m.api")
            .unwrap()
            .opens("m.internal")
            .unwrap()
            .provides("s.Api", vec!["m.spi.Impl".into()])
            .unwrap()
            .build()
            .unwrap();
        let packages = descriptor.packages();
        assert!(packages.contains("m.api"));
        assert!(packages.contains("m.internal"));
        assert!(packages.contains("m.spi"));
    }

    #[test]
    fn test_read_descriptor_source() {
        let source = r#"
            name = "app"
            version = "1.2.0"
            uses = ["lib.spi.Service"]
            packages = ["app.util"]

            [[requires]]
            name = "lib"
            modifiers = ["transitive"]
            version = "2.0"

            [[exports]]
            package = "app"

            [[exports]]
            package = "app.internal"
            to = ["friend"]

            [[provides]]
            service = "lib.spi.Service"
            providers = ["app.ServiceImpl"]
        "#;
        let parsed = read(source.as_bytes()).unwrap();
        let d = &parsed.descriptor;
        assert_eq!(d.name(), "app");
        assert_eq!(d.version().unwrap().as_str(), "1.2.0");
        assert_eq!(d.requires().len(), 2); // lib + synthesized base
        let lib = d.requires().iter().find(|r| r.name() == "lib").unwrap();
        assert!(lib.has_modifier(RequiresModifier::Transitive));
        assert_eq!(lib.compiled_version().unwrap().as_str(), "2.0");
        assert!(d.uses().contains("lib.spi.Service"));
        assert!(d.packages().contains("app.util"));
        let internal = d
            .exports()
            .iter()
            .find(|e| e.package() == "app.internal")
            .unwrap();
        assert!(internal.is_qualified());
    }

    #[test]
    fn test_read_rejects_malformed() {
        assert!(read(b"name = \"a..b\"").is_err());
        assert!(read(b"not toml at all [").is_err());
        let dup = r#"
            name = "m"
            [[exports]]
            package = "p.q"
            [[exports]]
            package = "p.q"
        "#;
        assert!(read(dup.as_bytes()).is_err());
    }

    #[test]
    fn test_display() {
        let d = ModuleDescriptor::builder("m")
            .unwrap()
            .version(Version::parse("3.1").unwrap())
            .build()
            .unwrap();
        assert_eq!(d.to_string(), "m@3.1");
    }
}
