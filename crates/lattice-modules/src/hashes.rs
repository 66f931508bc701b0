//! Content hashing for modules.
//!
//! A module hash is a deterministic digest over the sorted list of resource
//! names and, for each name, the name bytes followed by the full resource
//! content, fed into one running digest. Sorting is lexicographic so the
//! result is reproducible regardless of listing order.
//!
//! A [`ModuleHashes`] record carries the hashes of *other* modules recorded
//! by a producer's build, used for supply-chain binding. Resolution carries
//! these records through without verifying them.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use parking_lot::Mutex;
use sha2::{Digest, Sha256, Sha384, Sha512};

use crate::error::{ModuleError, Result};
use crate::reader::ModuleReader;

/// Supported digest algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum HashAlgorithm {
    /// SHA-256
    Sha256,
    /// SHA-384
    Sha384,
    /// SHA-512
    Sha512,
}

impl HashAlgorithm {
    /// Canonical identifier for the algorithm.
    pub fn as_str(&self) -> &'static str {
        match self {
            HashAlgorithm::Sha256 => "sha256",
            HashAlgorithm::Sha384 => "sha384",
            HashAlgorithm::Sha512 => "sha512",
        }
    }

    /// Parse an algorithm identifier.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "sha256" => Ok(HashAlgorithm::Sha256),
            "sha384" => Ok(HashAlgorithm::Sha384),
            "sha512" => Ok(HashAlgorithm::Sha512),
            other => Err(ModuleError::Other(format!(
                "unknown hash algorithm '{}'",
                other
            ))),
        }
    }
}

enum Hasher {
    Sha256(Sha256),
    Sha384(Sha384),
    Sha512(Sha512),
}

impl Hasher {
    fn new(algorithm: HashAlgorithm) -> Self {
        match algorithm {
            HashAlgorithm::Sha256 => Hasher::Sha256(Sha256::new()),
            HashAlgorithm::Sha384 => Hasher::Sha384(Sha384::new()),
            HashAlgorithm::Sha512 => Hasher::Sha512(Sha512::new()),
        }
    }

    fn update(&mut self, bytes: &[u8]) {
        match self {
            Hasher::Sha256(h) => h.update(bytes),
            Hasher::Sha384(h) => h.update(bytes),
            Hasher::Sha512(h) => h.update(bytes),
        }
    }

    fn finalize(self) -> Vec<u8> {
        match self {
            Hasher::Sha256(h) => h.finalize().to_vec(),
            Hasher::Sha384(h) => h.finalize().to_vec(),
            Hasher::Sha512(h) => h.finalize().to_vec(),
        }
    }
}

/// Compute the content hash of a module through its reader.
pub fn compute_hash(reader: &dyn ModuleReader, algorithm: HashAlgorithm) -> Result<Vec<u8>> {
    let mut names = reader.list()?;
    names.sort();

    let mut hasher = Hasher::new(algorithm);
    for name in &names {
        let bytes = reader.read(name)?.ok_or_else(|| {
            ModuleError::ContentIo(format!("resource '{}' vanished during hashing", name))
        })?;
        hasher.update(name.as_bytes());
        hasher.update(&bytes);
    }
    Ok(hasher.finalize())
}

/// Immutable record of module-name to digest mappings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleHashes {
    algorithm: HashAlgorithm,
    hashes: BTreeMap<String, Vec<u8>>,
}

impl ModuleHashes {
    /// Create a record from an algorithm and a name-to-digest map.
    pub fn new(algorithm: HashAlgorithm, hashes: BTreeMap<String, Vec<u8>>) -> Self {
        Self { algorithm, hashes }
    }

    /// The digest algorithm.
    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    /// Module names with recorded digests.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.hashes.keys().map(|s| s.as_str())
    }

    /// The recorded digest for a module, if present.
    pub fn hash_for(&self, module: &str) -> Option<&[u8]> {
        self.hashes.get(module).map(|v| v.as_slice())
    }

    /// The recorded digest rendered as lowercase hex.
    pub fn hash_hex(&self, module: &str) -> Option<String> {
        self.hashes.get(module).map(hex::encode)
    }

    /// Number of recorded digests.
    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    /// True if no digests are recorded.
    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }
}

/// Lazily computed, cached hash of a module's own content.
pub struct HashSupplier {
    algorithm: HashAlgorithm,
    compute: Box<dyn Fn(HashAlgorithm) -> Result<Vec<u8>> + Send + Sync>,
    cached: Mutex<Option<Vec<u8>>>,
}

impl HashSupplier {
    /// Create a supplier that computes the digest on first use.
    pub fn new<F>(algorithm: HashAlgorithm, compute: F) -> Self
    where
        F: Fn(HashAlgorithm) -> Result<Vec<u8>> + Send + Sync + 'static,
    {
        Self {
            algorithm,
            compute: Box::new(compute),
            cached: Mutex::new(None),
        }
    }

    /// The digest algorithm.
    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    /// The digest, computed on first call and cached after.
    pub fn get(&self) -> Result<Vec<u8>> {
        let mut cached = self.cached.lock();
        if let Some(bytes) = cached.as_ref() {
            return Ok(bytes.clone());
        }
        let bytes = (self.compute)(self.algorithm)?;
        *cached = Some(bytes.clone());
        Ok(bytes)
    }
}

impl std::fmt::Debug for HashSupplier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HashSupplier")
            .field("algorithm", &self.algorithm)
            .finish()
    }
}

/// Arena-style directed graph over module names.
///
/// Nodes are interned to indices; adjacency is index lists. The iterative
/// topological sort avoids recursion-depth concerns on large graphs.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    nodes: Vec<String>,
    index: HashMap<String, usize>,
    adj: Vec<Vec<usize>>,
}

impl DependencyGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node, returning its index. Adding twice is a no-op.
    pub fn add_node(&mut self, name: &str) -> usize {
        if let Some(&i) = self.index.get(name) {
            return i;
        }
        let i = self.nodes.len();
        self.nodes.push(name.to_string());
        self.index.insert(name.to_string(), i);
        self.adj.push(Vec::new());
        i
    }

    /// Add a directed edge, interning both endpoints.
    pub fn add_edge(&mut self, from: &str, to: &str) {
        let f = self.add_node(from);
        let t = self.add_node(to);
        if !self.adj[f].contains(&t) {
            self.adj[f].push(t);
        }
    }

    /// Node count.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True if the graph has no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn transpose(&self) -> Vec<Vec<usize>> {
        let mut reversed = vec![Vec::new(); self.nodes.len()];
        for (from, targets) in self.adj.iter().enumerate() {
            for &to in targets {
                reversed[to].push(from);
            }
        }
        reversed
    }

    /// Topological order of the graph, every edge pointing forward.
    ///
    /// Fails with [`ModuleError::CycleDetected`] naming a node on the cycle.
    pub fn topological_order(&self) -> Result<Vec<usize>> {
        const WHITE: u8 = 0;
        const GRAY: u8 = 1;
        const BLACK: u8 = 2;

        let n = self.nodes.len();
        let mut state = vec![WHITE; n];
        let mut order = Vec::with_capacity(n);

        for start in 0..n {
            if state[start] != WHITE {
                continue;
            }
            // (node, next child index) pairs form the explicit DFS stack
            let mut stack: Vec<(usize, usize)> = vec![(start, 0)];
            state[start] = GRAY;
            while let Some(&(node, next)) = stack.last() {
                if next < self.adj[node].len() {
                    if let Some(top) = stack.last_mut() {
                        top.1 += 1;
                    }
                    let child = self.adj[node][next];
                    match state[child] {
                        WHITE => {
                            state[child] = GRAY;
                            stack.push((child, 0));
                        }
                        GRAY => {
                            return Err(ModuleError::CycleDetected(
                                self.nodes[child].clone(),
                            ));
                        }
                        _ => {}
                    }
                } else {
                    state[node] = BLACK;
                    order.push(node);
                    stack.pop();
                }
            }
        }

        // Post-order pushes dependencies first; reverse for forward edges
        order.reverse();
        Ok(order)
    }
}

/// Minimal-leaf hash-group assignment.
///
/// Given candidate modules inside a dependency graph (edges point from a
/// module to the modules it depends on), computes for each unassigned
/// candidate, visited in topological order, the set of other candidates that
/// depend on it. A non-empty set becomes a hash group keyed by that
/// candidate; members are assigned to exactly one group.
pub fn hash_groups(
    graph: &DependencyGraph,
    candidates: &BTreeSet<String>,
) -> Result<BTreeMap<String, BTreeSet<String>>> {
    let order = graph.topological_order()?;
    let reversed = graph.transpose();

    let mut assigned: BTreeSet<usize> = BTreeSet::new();
    let mut groups = BTreeMap::new();

    for &node in &order {
        let name = &graph.nodes[node];
        if !candidates.contains(name) || assigned.contains(&node) {
            continue;
        }

        // All modules that depend on this candidate, directly or indirectly
        let mut dependents = BTreeSet::new();
        let mut stack = vec![node];
        let mut seen = vec![false; graph.nodes.len()];
        seen[node] = true;
        while let Some(current) = stack.pop() {
            for &dependent in &reversed[current] {
                if !seen[dependent] {
                    seen[dependent] = true;
                    stack.push(dependent);
                    let dep_name = &graph.nodes[dependent];
                    if candidates.contains(dep_name) && !assigned.contains(&dependent) {
                        dependents.insert(dependent);
                    }
                }
            }
        }

        if dependents.is_empty() {
            continue;
        }
        for &d in &dependents {
            assigned.insert(d);
        }
        groups.insert(
            name.clone(),
            dependents
                .iter()
                .map(|&d| graph.nodes[d].clone())
                .collect(),
        );
    }

    Ok(groups)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::DirReader;

    #[test]
    fn test_hash_is_order_independent_and_content_sensitive() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.txt"), b"bravo").unwrap();
        std::fs::write(dir.path().join("a.txt"), b"alpha").unwrap();

        let reader = DirReader::new(dir.path());
        let first = compute_hash(&reader, HashAlgorithm::Sha256).unwrap();
        let second = compute_hash(&reader, HashAlgorithm::Sha256).unwrap();
        assert_eq!(first, second);

        // Changing one byte changes the digest
        std::fs::write(dir.path().join("a.txt"), b"alphb").unwrap();
        let third = compute_hash(&reader, HashAlgorithm::Sha256).unwrap();
        assert_ne!(first, third);
    }

    #[test]
    fn test_hashes_equality() {
        let mut m = BTreeMap::new();
        m.insert("lib".to_string(), vec![1u8, 2, 3]);
        let a = ModuleHashes::new(HashAlgorithm::Sha512, m.clone());
        let b = ModuleHashes::new(HashAlgorithm::Sha512, m.clone());
        assert_eq!(a, b);
        let c = ModuleHashes::new(HashAlgorithm::Sha256, m);
        assert_ne!(a, c);
    }

    #[test]
    fn test_supplier_caches() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let supplier = HashSupplier::new(HashAlgorithm::Sha256, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(vec![0xAB])
        });
        assert_eq!(supplier.get().unwrap(), vec![0xAB]);
        assert_eq!(supplier.get().unwrap(), vec![0xAB]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_topological_order() {
        let mut g = DependencyGraph::new();
        g.add_edge("app", "lib");
        g.add_edge("lib", "base");
        g.add_edge("app", "base");
        let order = g.topological_order().unwrap();
        let pos = |name: &str| order.iter().position(|&i| g.nodes[i] == name).unwrap();
        assert!(pos("app") < pos("lib"));
        assert!(pos("lib") < pos("base"));
    }

    #[test]
    fn test_cycle_detected() {
        let mut g = DependencyGraph::new();
        g.add_edge("a", "b");
        g.add_edge("b", "c");
        g.add_edge("c", "a");
        assert!(matches!(
            g.topological_order(),
            Err(ModuleError::CycleDetected(_))
        ));
    }

    #[test]
    fn test_hash_groups() {
        // app -> lib -> base, tool -> lib; candidates {lib, app, tool}
        let mut g = DependencyGraph::new();
        g.add_edge("app", "lib");
        g.add_edge("tool", "lib");
        g.add_edge("lib", "base");

        let candidates: BTreeSet<String> =
            ["lib", "app", "tool"].iter().map(|s| s.to_string()).collect();
        let groups = hash_groups(&g, &candidates).unwrap();

        // lib is the leaf candidate; app and tool depend on it
        let members = groups.get("lib").expect("group keyed by lib");
        assert!(members.contains("app"));
        assert!(members.contains("tool"));
        assert!(!members.contains("lib"));
        // app and tool are assigned, so no further groups
        assert_eq!(groups.len(), 1);
    }

    #[test]
    fn test_hash_groups_no_dependents() {
        let mut g = DependencyGraph::new();
        g.add_node("solo");
        let candidates: BTreeSet<String> = [("solo".to_string())].into_iter().collect();
        assert!(hash_groups(&g, &candidates).unwrap().is_empty());
    }
}
