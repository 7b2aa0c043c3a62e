//! Adapters that turn external edge producers into an observational graph.
//!
//! Import extraction and manifest discovery happen elsewhere; these types
//! only accept their output (an edge list, a `file -> imports` map, or
//! package manifests) and feed it into a [`GraphStore`].

use crate::domain::{Edge, NodeId};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use super::store::GraphStore;

/// Something that produces graph edges.
pub trait EdgeSource {
    /// Short description used in build reports.
    fn label(&self) -> String;

    /// The edges to add.
    ///
    /// # Errors
    ///
    /// Returns an error if the source data cannot be turned into edges.
    fn edges(&self) -> Result<Vec<Edge>>;

    /// Nodes to add even if no edge touches them.
    fn nodes(&self) -> Vec<NodeId> {
        Vec::new()
    }
}

/// An explicit list of edges.
#[derive(Debug, Clone, Default)]
pub struct EdgeList {
    label: String,
    edges: Vec<Edge>,
}

impl EdgeList {
    /// Wrap an in-memory edge list.
    pub fn new(label: impl Into<String>, edges: Vec<Edge>) -> Self {
        Self {
            label: label.into(),
            edges,
        }
    }

    /// Parse one JSON edge object per line. Blank lines are ignored.
    ///
    /// # Errors
    ///
    /// Returns `Error::MalformedInput` naming the first line that fails to
    /// parse.
    pub fn from_jsonl(label: impl Into<String>, content: &str) -> Result<Self> {
        let mut edges = Vec::new();
        for (idx, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let edge: Edge = serde_json::from_str(line).map_err(|e| {
                Error::MalformedInput(format!("edge list line {}: {e}", idx + 1))
            })?;
            edges.push(edge);
        }
        Ok(Self::new(label, edges))
    }
}

impl EdgeSource for EdgeList {
    fn label(&self) -> String {
        format!("{} ({} edges)", self.label, self.edges.len())
    }

    fn edges(&self) -> Result<Vec<Edge>> {
        Ok(self.edges.clone())
    }
}

/// Output of an import extractor: each file mapped to the files it imports.
#[derive(Debug, Clone, Default)]
pub struct ImportMap {
    label: String,
    imports: BTreeMap<String, Vec<String>>,
}

impl ImportMap {
    /// Wrap an in-memory import map.
    pub fn new(label: impl Into<String>, imports: BTreeMap<String, Vec<String>>) -> Self {
        Self {
            label: label.into(),
            imports,
        }
    }

    /// Parse a JSON object of `"file": ["imported", ...]`.
    ///
    /// # Errors
    ///
    /// Returns `Error::MalformedInput` if the JSON does not have that shape.
    pub fn from_json(label: impl Into<String>, content: &str) -> Result<Self> {
        let imports: BTreeMap<String, Vec<String>> = serde_json::from_str(content)
            .map_err(|e| Error::MalformedInput(format!("import map: {e}")))?;
        Ok(Self::new(label, imports))
    }
}

impl EdgeSource for ImportMap {
    fn label(&self) -> String {
        format!("{} ({} files)", self.label, self.imports.len())
    }

    fn edges(&self) -> Result<Vec<Edge>> {
        Ok(self
            .imports
            .iter()
            .flat_map(|(file, targets)| {
                targets
                    .iter()
                    .map(move |target| Edge::new(file.as_str(), target.as_str()))
            })
            .collect())
    }

    fn nodes(&self) -> Vec<NodeId> {
        self.imports.keys().map(|file| NodeId::new(file.as_str())).collect()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ManifestFile {
    name: String,
    #[serde(default)]
    dependencies: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    dev_dependencies: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    peer_dependencies: BTreeMap<String, serde_json::Value>,
}

/// A package and the packages it depends on.
///
/// Version ranges are read but ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageManifest {
    /// Package name
    pub name: String,

    /// Runtime and peer dependencies
    pub dependencies: BTreeSet<String>,

    /// Development-only dependencies
    pub dev_dependencies: BTreeSet<String>,
}

impl PackageManifest {
    /// Parse a `package.json`-style manifest.
    ///
    /// # Errors
    ///
    /// Returns `Error::MalformedInput` if the manifest has no `name` or is not
    /// valid JSON.
    pub fn from_json(content: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(content)
            .map_err(|e| Error::MalformedInput(format!("package manifest: {e}")))?;
        Self::from_value(value)
    }

    /// Read a manifest that has already been parsed as JSON.
    ///
    /// # Errors
    ///
    /// Returns `Error::MalformedInput` if the value lacks a non-empty `name`
    /// or has dependency sections of the wrong shape.
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        let file: ManifestFile = serde_json::from_value(value)
            .map_err(|e| Error::MalformedInput(format!("package manifest: {e}")))?;
        if file.name.trim().is_empty() {
            return Err(Error::MalformedInput(
                "package manifest has an empty name".to_string(),
            ));
        }

        let mut dependencies: BTreeSet<String> = file.dependencies.into_keys().collect();
        dependencies.extend(file.peer_dependencies.into_keys());

        Ok(Self {
            name: file.name,
            dependencies,
            dev_dependencies: file.dev_dependencies.into_keys().collect(),
        })
    }

    fn all_dependencies(&self) -> impl Iterator<Item = &String> {
        self.dependencies.iter().chain(self.dev_dependencies.iter())
    }
}

impl EdgeSource for PackageManifest {
    fn label(&self) -> String {
        format!("manifest {}", self.name)
    }

    fn edges(&self) -> Result<Vec<Edge>> {
        Ok(self
            .all_dependencies()
            .map(|dep| Edge::new(self.name.as_str(), dep.as_str()))
            .collect())
    }

    fn nodes(&self) -> Vec<NodeId> {
        vec![NodeId::new(self.name.as_str())]
    }
}

/// The manifests of a monorepo, optionally restricted to internal packages.
#[derive(Debug, Clone, Default)]
pub struct WorkspaceManifests {
    manifests: Vec<PackageManifest>,
    internal_only: bool,
}

impl WorkspaceManifests {
    /// Combine manifests into one source.
    #[must_use]
    pub fn new(manifests: Vec<PackageManifest>) -> Self {
        Self {
            manifests,
            internal_only: false,
        }
    }

    /// Drop dependencies on packages outside the workspace.
    #[must_use]
    pub fn internal_only(mut self) -> Self {
        self.internal_only = true;
        self
    }
}

impl EdgeSource for WorkspaceManifests {
    fn label(&self) -> String {
        format!("workspace ({} manifests)", self.manifests.len())
    }

    fn edges(&self) -> Result<Vec<Edge>> {
        let members: BTreeSet<&str> = self.manifests.iter().map(|m| m.name.as_str()).collect();
        Ok(self
            .manifests
            .iter()
            .flat_map(|manifest| {
                manifest
                    .all_dependencies()
                    .filter(|dep| !self.internal_only || members.contains(dep.as_str()))
                    .map(|dep| Edge::new(manifest.name.as_str(), dep.as_str()))
            })
            .collect())
    }

    fn nodes(&self) -> Vec<NodeId> {
        self.manifests
            .iter()
            .map(|m| NodeId::new(m.name.as_str()))
            .collect()
    }
}

/// Summary of a graph build.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BuildReport {
    /// Labels of the sources that were added
    pub sources: Vec<String>,

    /// Node count after the build
    pub nodes: usize,

    /// Edge count after the build
    pub edges: usize,

    /// Edges that were already present and got merged
    pub duplicate_edges: usize,
}

/// Collects edge sources into an observational graph.
///
/// # Example
///
/// ```
/// use tangle::domain::Edge;
/// use tangle::graph::{EdgeList, GraphBuilder};
///
/// let mut builder = GraphBuilder::new();
/// builder
///     .add_source(&EdgeList::new("inline", vec![Edge::new("a", "b")]))
///     .unwrap();
/// let (store, report) = builder.finish();
/// assert_eq!(store.edge_count(), 1);
/// assert_eq!(report.nodes, 2);
/// ```
#[derive(Debug, Default)]
pub struct GraphBuilder {
    store: GraphStore,
    report: BuildReport,
}

impl GraphBuilder {
    /// Start an empty build.
    #[must_use]
    pub fn new() -> Self {
        Self {
            store: GraphStore::observational(),
            report: BuildReport::default(),
        }
    }

    /// Add every node and edge a source produces.
    ///
    /// # Errors
    ///
    /// Returns `Error::MalformedInput` if the source fails or yields an empty
    /// id. Edges added before the failure are kept.
    pub fn add_source(&mut self, source: &dyn EdgeSource) -> Result<&mut Self> {
        for node in source.nodes() {
            let node = NodeId::parse(node.as_str())?;
            self.store.add_node(node);
        }
        self.add_edges(source.edges()?)?;
        self.report.sources.push(source.label());
        Ok(self)
    }

    /// Add raw edges.
    ///
    /// # Errors
    ///
    /// Returns `Error::MalformedInput` if an edge has an empty endpoint.
    pub fn add_edges(&mut self, edges: impl IntoIterator<Item = Edge>) -> Result<&mut Self> {
        for edge in edges {
            let from = NodeId::parse(edge.from.as_str())?;
            let to = NodeId::parse(edge.to.as_str())?;
            if !self.store.add_edge(&from, &to, edge.kind)? {
                self.report.duplicate_edges += 1;
            }
        }
        Ok(self)
    }

    /// Finish the build.
    #[must_use]
    pub fn finish(mut self) -> (GraphStore, BuildReport) {
        self.report.nodes = self.store.node_count();
        self.report.edges = self.store.edge_count();
        debug!(
            nodes = self.report.nodes,
            edges = self.report.edges,
            duplicates = self.report.duplicate_edges,
            "graph build finished"
        );
        (self.store, self.report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edge_list_from_jsonl() {
        let content = r#"{"from":"a","to":"b"}

{"from":"b","to":"c","kind":"depends_on"}
"#;
        let list = EdgeList::from_jsonl("edges.jsonl", content).unwrap();

        let edges = list.edges().unwrap();
        assert_eq!(edges.len(), 2);
        assert_eq!(edges[0], Edge::new("a", "b"));
    }

    #[test]
    fn test_edge_list_reports_bad_line() {
        let content = "{\"from\":\"a\",\"to\":\"b\"}\nnot json\n";
        let err = EdgeList::from_jsonl("edges.jsonl", content).unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_import_map_keeps_isolated_files() {
        let map = ImportMap::from_json(
            "imports",
            r#"{"src/a.ts": ["src/b.ts"], "src/lonely.ts": []}"#,
        )
        .unwrap();

        let mut builder = GraphBuilder::new();
        builder.add_source(&map).unwrap();
        let (store, report) = builder.finish();

        assert_eq!(report.nodes, 3);
        assert_eq!(report.edges, 1);
        assert!(store.contains(&NodeId::new("src/lonely.ts")));
    }

    #[test]
    fn test_manifest_merges_dependency_sections() {
        let manifest = PackageManifest::from_json(
            r#"{
                "name": "web",
                "version": "1.0.0",
                "dependencies": {"ui": "^2.0.0"},
                "devDependencies": {"test-utils": "workspace:*"},
                "peerDependencies": {"react": ">=18"}
            }"#,
        )
        .unwrap();

        assert_eq!(manifest.name, "web");
        assert_eq!(manifest.edges().unwrap().len(), 3);
        assert!(manifest.dev_dependencies.contains("test-utils"));
    }

    #[test]
    fn test_manifest_requires_name() {
        assert!(PackageManifest::from_json(r#"{"dependencies": {}}"#).is_err());
        assert!(PackageManifest::from_json(r#"{"name": "  "}"#).is_err());
    }

    #[test]
    fn test_workspace_internal_only() {
        let a = PackageManifest::from_json(r#"{"name":"a","dependencies":{"b":"1","lodash":"4"}}"#)
            .unwrap();
        let b = PackageManifest::from_json(r#"{"name":"b"}"#).unwrap();

        let workspace = WorkspaceManifests::new(vec![a, b]).internal_only();

        assert_eq!(workspace.edges().unwrap(), vec![Edge::new("a", "b")]);
    }

    #[test]
    fn test_builder_counts_duplicates() {
        let mut builder = GraphBuilder::new();
        builder
            .add_edges(vec![Edge::new("a", "b"), Edge::new("a", "b"), Edge::new("b", "a")])
            .unwrap();
        let (store, report) = builder.finish();

        assert_eq!(store.edge_count(), 2);
        assert_eq!(report.duplicate_edges, 1);
    }

    #[test]
    fn test_builder_rejects_empty_endpoint() {
        let mut builder = GraphBuilder::new();
        let result = builder.add_edges(vec![Edge::new("a", " ")]);
        assert!(matches!(result, Err(Error::MalformedInput(_))));
    }
}
