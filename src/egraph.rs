use std::fmt::{self, Debug, Display};
use std::ops::Index;

use serde::Deserialize;
use thiserror::Error;

use crate::util::IndexMap;
use crate::Symbol;

/// A key identifying one e-node in an [`EGraph`].
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(Symbol);

/// A key identifying one equivalence class in an [`EGraph`].
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClassId(Symbol);

macro_rules! impl_id {
    ($ty:ident) => {
        impl<S: AsRef<str>> From<S> for $ty {
            fn from(s: S) -> Self {
                $ty(Symbol::from(s))
            }
        }
        impl $ty {
            /// Get the string form of this id.
            pub fn as_str(self) -> &'static str {
                self.0.as_str()
            }
        }
        impl Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                Display::fmt(&self.0, f)
            }
        }
        impl Debug for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                Debug::fmt(&self.0, f)
            }
        }
    };
}

impl_id!(NodeId);
impl_id!(ClassId);

/// One concrete operator application in the e-graph.
///
/// Nodes are created once at load time and never mutated. `children`
/// reference *nodes*, not classes; a child's class is looked up through the
/// [`EGraph`]. `cost` is the coarse literal cost embedded in the source
/// document, used only as a fallback when no derived cost is supplied.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    /// The operator tag, e.g. `Tile.LDS` or a literal like `128`.
    pub op: Symbol,
    /// Ordered child node ids.
    pub children: Vec<NodeId>,
    /// The equivalence class this node belongs to.
    pub eclass: ClassId,
    /// Fallback cost baked into the source graph.
    pub cost: f64,
}

impl Node {
    /// Create a node with the given children.
    pub fn new(op: impl Into<Symbol>, eclass: impl Into<ClassId>, children: Vec<NodeId>) -> Self {
        Node {
            op: op.into(),
            children,
            eclass: eclass.into(),
            cost: 0.0,
        }
    }

    /// Create a childless node.
    pub fn leaf(op: impl Into<Symbol>, eclass: impl Into<ClassId>) -> Self {
        Self::new(op, eclass, vec![])
    }

    /// Set the fallback cost embedded in the source graph.
    pub fn with_cost(mut self, cost: f64) -> Self {
        self.cost = cost;
        self
    }

    /// Returns true if this node has no children.
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// A structural invariant of the input document was violated.
///
/// These are detected at load time and abort extraction; none of them is
/// recoverable by re-solving.
#[derive(Debug, Error)]
pub enum MalformedGraph {
    /// A node references a child id that is not in the node set.
    #[error("node {node} references nonexistent child {child}")]
    DanglingChild {
        /// The node holding the bad reference.
        node: NodeId,
        /// The missing child id.
        child: NodeId,
    },
    /// A declared root is not the class of any node.
    #[error("root class {0} is not present in the graph")]
    UnknownRoot(ClassId),
    /// A class with zero member nodes (only reachable through programmatic
    /// construction; the wire format cannot express one).
    #[error("class {0} has no member nodes")]
    EmptyClass(ClassId),
    /// The document is not valid JSON for the expected shape.
    #[error("invalid e-graph document: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Deserialize)]
struct RawNode {
    op: String,
    #[serde(default)]
    children: Vec<String>,
    eclass: String,
    #[serde(default)]
    cost: f64,
}

#[derive(Deserialize)]
struct RawGraph {
    nodes: IndexMap<String, RawNode>,
    #[serde(default)]
    root_eclasses: Vec<String>,
}

/// An in-memory view of a serialized e-graph.
///
/// Holds the node table, the class membership index (built once at load),
/// and the declared root classes. Read-only after [`EGraph::from_json_str`]
/// returns, so it may be shared freely across extraction calls.
#[derive(Debug, Clone, Default)]
pub struct EGraph {
    nodes: IndexMap<NodeId, Node>,
    classes: IndexMap<ClassId, Vec<NodeId>>,
    roots: Vec<ClassId>,
}

impl EGraph {
    /// Parse and validate a serialized e-graph document.
    pub fn from_json_str(s: &str) -> Result<Self, MalformedGraph> {
        let raw: RawGraph = serde_json::from_str(s)?;
        Self::from_raw(raw)
    }

    /// Like [`EGraph::from_json_str`], starting from an already parsed value.
    pub fn from_json_value(value: serde_json::Value) -> Result<Self, MalformedGraph> {
        let raw: RawGraph = serde_json::from_value(value)?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawGraph) -> Result<Self, MalformedGraph> {
        let mut egraph = EGraph::default();
        for (id, node) in raw.nodes {
            let children = raw_children(node.children);
            egraph.add_node(
                id,
                Node::new(node.op.as_str(), node.eclass.as_str(), children).with_cost(node.cost),
            );
        }
        for root in &raw.root_eclasses {
            egraph.add_root(root);
        }
        egraph.validate()?;
        Ok(egraph)
    }

    /// Insert a node under the given id, indexing it under its class.
    ///
    /// Intended for programmatic construction in tests and callers that
    /// build graphs directly; call [`EGraph::validate`] once done.
    pub fn add_node(&mut self, id: impl Into<NodeId>, node: Node) -> NodeId {
        let id = id.into();
        self.classes.entry(node.eclass).or_default().push(id);
        self.nodes.insert(id, node);
        id
    }

    /// Declare a root class.
    pub fn add_root(&mut self, class: impl Into<ClassId>) {
        self.roots.push(class.into());
    }

    /// Check the structural invariants the extraction engine relies on.
    ///
    /// The empty-class check is defensive: [`EGraph::add_node`] always
    /// indexes the member it inserts and the wire format derives classes
    /// from nodes, so only direct manipulation of the class index can
    /// produce one.
    pub fn validate(&self) -> Result<(), MalformedGraph> {
        for (&id, node) in &self.nodes {
            for &child in &node.children {
                if !self.nodes.contains_key(&child) {
                    return Err(MalformedGraph::DanglingChild { node: id, child });
                }
            }
        }
        for (&class, members) in &self.classes {
            if members.is_empty() {
                return Err(MalformedGraph::EmptyClass(class));
            }
        }
        for &root in &self.roots {
            if !self.classes.contains_key(&root) {
                return Err(MalformedGraph::UnknownRoot(root));
            }
        }
        Ok(())
    }

    /// The declared root classes, in document order.
    pub fn roots(&self) -> &[ClassId] {
        &self.roots
    }

    /// Number of nodes in the graph.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true if the graph has no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of equivalence classes in the graph.
    pub fn num_classes(&self) -> usize {
        self.classes.len()
    }

    /// Look up a node, if present.
    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    /// Iterate over all nodes in document order.
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes.iter().map(|(&id, node)| (id, node))
    }

    /// Iterate over all classes and their member node ids, in the order the
    /// classes were first seen in the document.
    pub fn classes(&self) -> impl Iterator<Item = (ClassId, &[NodeId])> {
        self.classes
            .iter()
            .map(|(&class, members)| (class, members.as_slice()))
    }

    /// The member node ids of a class. Empty for an unknown class.
    pub fn members(&self, class: ClassId) -> &[NodeId] {
        self.classes.get(&class).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Returns true if the class is present in the class index.
    pub fn contains_class(&self, class: ClassId) -> bool {
        self.classes.contains_key(&class)
    }

    /// The classes of a node's children, in child order.
    pub fn children_classes(&self, id: NodeId) -> impl Iterator<Item = ClassId> + '_ {
        self[id].children.iter().map(move |&child| self[child].eclass)
    }
}

fn raw_children(children: Vec<String>) -> Vec<NodeId> {
    children.iter().map(NodeId::from).collect()
}

impl Index<NodeId> for EGraph {
    type Output = Node;
    fn index(&self, id: NodeId) -> &Node {
        self.nodes
            .get(&id)
            .unwrap_or_else(|| panic!("no node with id {}", id))
    }
}
