//! Dependency graph management using `petgraph`.
//!
//! Builds a directed graph from the link and volumes-from references of a
//! set of declarations and orders it so that every referenced service comes
//! before the services referencing it.

use std::collections::{HashMap, HashSet, VecDeque};

use flotilla_common::error::{FlotillaError, Result};
use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};

use crate::declaration::ServiceDeclaration;

/// References of one declaration, by target name.
#[derive(Debug, Default)]
struct NodeRefs {
    links: Vec<String>,
    volumes_from: Vec<String>,
}

/// A dependency graph of service declarations.
///
/// Node `i` corresponds to the `i`-th declaration the graph was built from.
/// Edges point from a dependency to its dependent.
#[derive(Debug)]
pub struct DependencyGraph {
    /// Internal petgraph representation, weighted by service name.
    graph: DiGraph<String, ()>,
    refs: Vec<NodeRefs>,
}

impl DependencyGraph {
    /// Builds the graph for `declarations`.
    ///
    /// References to names that are not declared add no edge; they are
    /// reported when the reference is resolved.
    ///
    /// # Errors
    ///
    /// Returns an error if two declarations share a name or a reference is
    /// malformed.
    pub fn from_declarations(declarations: &[ServiceDeclaration]) -> Result<Self> {
        let mut graph = DiGraph::new();
        let mut index = HashMap::new();
        for decl in declarations {
            let node = graph.add_node(decl.name.clone());
            if index.insert(decl.name.as_str(), node).is_some() {
                return Err(FlotillaError::config(format!(
                    "duplicate service name: \"{}\"",
                    decl.name
                )));
            }
        }

        let mut refs = Vec::with_capacity(declarations.len());
        for (i, decl) in declarations.iter().enumerate() {
            let dependent = NodeIndex::new(i);
            let node_refs = NodeRefs {
                links: decl.link_targets()?,
                volumes_from: decl.volume_targets()?,
            };
            let targets: HashSet<&str> = node_refs
                .links
                .iter()
                .chain(&node_refs.volumes_from)
                .map(String::as_str)
                .collect();
            for target in targets {
                if let Some(&dependency) = index.get(target) {
                    let _ = graph.add_edge(dependency, dependent, ());
                }
            }
            refs.push(node_refs);
        }

        Ok(Self { graph, refs })
    }

    /// Returns the number of declarations in the graph.
    #[must_use]
    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    /// Returns `true` if the graph holds no declarations.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Returns the creation order as service names.
    ///
    /// # Errors
    ///
    /// Returns a dependency error on self-references or cycles.
    pub fn resolve_order(&self) -> Result<Vec<String>> {
        let order = self.sorted_indices()?;
        Ok(order
            .into_iter()
            .filter_map(|i| self.graph.node_weight(NodeIndex::new(i)).cloned())
            .collect())
    }

    /// Returns the creation order as declaration indices.
    ///
    /// Depth-first over the dependents relation: names are visited from the
    /// end of the name-sorted list, dependents are visited before a node is
    /// finished, and finished nodes are prepended to the output. Unrelated
    /// declarations keep their name order.
    ///
    /// # Errors
    ///
    /// Returns a dependency error on self-references or cycles.
    pub fn sorted_indices(&self) -> Result<Vec<usize>> {
        let mut unvisited: Vec<NodeIndex> = self.graph.node_indices().collect();
        unvisited.sort_by(|a, b| self.graph[*a].cmp(&self.graph[*b]));

        let mut visit = Visit {
            graph: self,
            unvisited,
            in_progress: Vec::new(),
            output: VecDeque::with_capacity(self.len()),
        };
        while let Some(&last) = visit.unvisited.last() {
            visit.visit(last)?;
        }

        let order: Vec<usize> = visit.output.into_iter().map(NodeIndex::index).collect();
        tracing::debug!(services = order.len(), "service creation order resolved");
        Ok(order)
    }

    /// Dependents of `node`, in declaration order.
    fn dependents(&self, node: NodeIndex) -> Vec<NodeIndex> {
        let mut dependents: Vec<NodeIndex> = self
            .graph
            .neighbors_directed(node, Direction::Outgoing)
            .collect();
        dependents.sort_unstable();
        dependents.dedup();
        dependents
    }

    fn name(&self, node: NodeIndex) -> &str {
        self.graph.node_weight(node).map_or("", String::as_str)
    }
}

struct Visit<'g> {
    graph: &'g DependencyGraph,
    unvisited: Vec<NodeIndex>,
    in_progress: Vec<NodeIndex>,
    output: VecDeque<NodeIndex>,
}

impl Visit<'_> {
    fn visit(&mut self, node: NodeIndex) -> Result<()> {
        if self.in_progress.contains(&node) {
            return Err(self.cycle_error(node));
        }
        if !self.unvisited.contains(&node) {
            return Ok(());
        }

        self.in_progress.push(node);
        for dependent in self.graph.dependents(node) {
            self.visit(dependent)?;
        }
        self.in_progress.retain(|&n| n != node);
        self.unvisited.retain(|&n| n != node);
        self.output.push_front(node);
        Ok(())
    }

    /// Explains why `node` was reached again while still in progress.
    fn cycle_error(&self, node: NodeIndex) -> FlotillaError {
        let name = self.graph.name(node);
        let refs = self.graph.refs.get(node.index());
        let names_itself = |targets: &[String]| targets.iter().any(|t| t == name);

        if refs.is_some_and(|r| names_itself(&r.links)) {
            FlotillaError::dependency(format!("service \"{name}\" cannot link to itself"))
        } else if refs.is_some_and(|r| names_itself(&r.volumes_from)) {
            FlotillaError::dependency(format!(
                "service \"{name}\" cannot mount itself as a volume"
            ))
        } else {
            let members: Vec<String> = self
                .in_progress
                .iter()
                .map(|&n| format!("\"{}\"", self.graph.name(n)))
                .collect();
            FlotillaError::dependency(format!(
                "circular dependency between {}",
                members.join(" and ")
            ))
        }
    }
}

/// Orders declarations so that referenced services come first.
///
/// # Errors
///
/// Returns an error on duplicate names, malformed references,
/// self-references, or cycles.
pub fn sort_declarations(
    declarations: Vec<ServiceDeclaration>,
) -> Result<Vec<ServiceDeclaration>> {
    let order = DependencyGraph::from_declarations(&declarations)?.sorted_indices()?;
    let mut slots: Vec<Option<ServiceDeclaration>> = declarations.into_iter().map(Some).collect();
    Ok(order
        .into_iter()
        .filter_map(|i| slots.get_mut(i).and_then(Option::take))
        .collect())
}
