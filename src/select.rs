use crate::egraph::{ClassId, EGraph, NodeId};
use crate::util::{HashSet, IndexMap, IndexSet};

/// An assignment of exactly one node per class, forming a rooted DAG.
///
/// A selection fresh from the solver is closed: every chosen node's
/// children's classes are also keys. After [`Selection::live`] only the
/// classes reachable from the given root remain.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selection {
    chosen: IndexMap<ClassId, NodeId>,
}

impl Selection {
    /// An empty selection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Choose `node` for `class`, replacing any previous choice.
    pub fn insert(&mut self, class: ClassId, node: NodeId) {
        self.chosen.insert(class, node);
    }

    /// The chosen node for a class, if the class is selected.
    pub fn get(&self, class: ClassId) -> Option<NodeId> {
        self.chosen.get(&class).copied()
    }

    /// Returns true if the class has a chosen node.
    pub fn contains(&self, class: ClassId) -> bool {
        self.chosen.contains_key(&class)
    }

    /// Number of selected classes.
    pub fn len(&self) -> usize {
        self.chosen.len()
    }

    /// Returns true if nothing is selected.
    pub fn is_empty(&self) -> bool {
        self.chosen.is_empty()
    }

    /// Iterate over `(class, chosen node)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (ClassId, NodeId)> + '_ {
        self.chosen.iter().map(|(&class, &node)| (class, node))
    }

    /// Restrict this selection to the classes reachable from `root` by
    /// walking chosen nodes' children's classes.
    ///
    /// The solver leaves unreachable classes free, so two selections can
    /// differ only in regions the root never exercises; filtering first
    /// makes those differences disappear. Idempotent.
    pub fn live(&self, egraph: &EGraph, root: ClassId) -> Selection {
        let mut keep = Selection::new();
        let mut seen: HashSet<ClassId> = HashSet::default();
        let mut todo = vec![root];
        while let Some(class) = todo.pop() {
            if !seen.insert(class) {
                continue;
            }
            if let Some(node) = self.get(class) {
                keep.insert(class, node);
                for &child in &egraph[node].children {
                    todo.push(egraph[child].eclass);
                }
            }
        }
        keep
    }
}

impl FromIterator<(ClassId, NodeId)> for Selection {
    fn from_iter<I: IntoIterator<Item = (ClassId, NodeId)>>(iter: I) -> Self {
        Selection {
            chosen: iter.into_iter().collect(),
        }
    }
}

/// Render the selection rooted at `root` as a nested expression string.
///
/// A leaf renders as its op tag, an interior node as `op(child, child)`.
/// An unselected class renders as an `<id>` placeholder; that should not
/// happen for a closed selection, but a deliberately filtered one may be
/// rendered from a non-root class. No cycle protection is needed: a valid
/// selection is acyclic at the class level.
pub fn format_selection(egraph: &EGraph, selection: &Selection, root: ClassId) -> String {
    let node = match selection.get(root) {
        Some(node) => node,
        None => return format!("<{}>", root),
    };
    let node = &egraph[node];
    if node.is_leaf() {
        return node.op.to_string();
    }
    let children: Vec<String> = node
        .children
        .iter()
        .map(|&child| format_selection(egraph, selection, egraph[child].eclass))
        .collect();
    format!("{}({})", node.op, children.join(", "))
}

/// Keep one selection per distinct root-visible structure.
///
/// Each selection is filtered to its live classes and rendered with
/// [`format_selection`]; the first occurrence of each rendering survives,
/// in discovery order. The returned selections are the filtered ones.
pub fn dedup_selections(
    egraph: &EGraph,
    selections: Vec<Selection>,
    root: ClassId,
) -> Vec<Selection> {
    let mut seen: IndexSet<String> = IndexSet::default();
    let mut unique = Vec::new();
    for selection in selections {
        let live = selection.live(egraph, root);
        if seen.insert(format_selection(egraph, &live, root)) {
            unique.push(live);
        }
    }
    unique
}
