use log::debug;

use crate::egraph::{ClassId, EGraph, NodeId};
use crate::util::{HashMap, IndexMap};
use crate::Symbol;

/// Global memory to shared memory load.
pub const OP_LDS: &str = "Tile.LDS";
/// Shared memory to register load.
pub const OP_LDR: &str = "Tile.LDR";
/// Register to shared memory store.
pub const OP_STS: &str = "Tile.STS";
/// Shared memory to global memory store.
pub const OP_STG: &str = "Tile.STG";
/// Fused multiply-accumulate; moves shared operands to registers implicitly.
pub const OP_WGMMA: &str = "Tile.WGMMA";

const MOVEMENT_OPS: [&str; 4] = [OP_LDS, OP_LDR, OP_STS, OP_STG];

/// Property accessor: row count of a tile.
pub const ACC_ROWS: &str = "·.rows";
/// Property accessor: column count of a tile.
pub const ACC_COLS: &str = "·.cols";
/// Property accessor: element width in bytes.
pub const ACC_DTYPE_BYTES: &str = "·.dtype_bytes";
/// Property accessor: how many times the op executes.
pub const ACC_LOOP_ITERS: &str = "·.loop_iters";
/// Property accessor: which memory tier the tile resides in.
pub const ACC_MEM_REGION: &str = "·.mem_region";

/// The memory tier a tile currently resides in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemRegion {
    /// Device global memory.
    Global,
    /// On-chip shared memory staging.
    Shared,
    /// The register file.
    Registers,
}

impl MemRegion {
    fn from_op(op: &str) -> Option<Self> {
        match op {
            "MemRegion.GLOBAL" => Some(MemRegion::Global),
            "MemRegion.SHARED" => Some(MemRegion::Shared),
            "MemRegion.REGISTERS" => Some(MemRegion::Registers),
            _ => None,
        }
    }
}

/// Shape and placement attributes of one tile-shaped class, reconstructed
/// from the accessor nodes embedded in the graph.
///
/// Missing attributes stay `None` and fall back to conservative values in
/// the cost formulas: shape dimensions to 0, trip count to 1. An upstream
/// rule set that forgot to propagate attributes therefore under-costs a
/// node rather than failing; [`derive_costs`] logs those nodes at `debug!`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TileAttrs {
    /// Row count.
    pub rows: Option<i64>,
    /// Column count.
    pub cols: Option<i64>,
    /// Element width in bytes.
    pub dtype_bytes: Option<i64>,
    /// How many times the producing op executes.
    pub loop_iters: Option<i64>,
    /// Which memory tier the tile resides in.
    pub mem_region: Option<MemRegion>,
}

impl TileAttrs {
    /// Size of the tile in bytes; 0 if any dimension is unknown.
    pub fn bytes(&self) -> i64 {
        self.rows.unwrap_or(0) * self.cols.unwrap_or(0) * self.dtype_bytes.unwrap_or(0)
    }

    /// Trip count, defaulting to a single execution.
    pub fn iters(&self) -> i64 {
        self.loop_iters.unwrap_or(1)
    }
}

/// Reconstruct per-class [`TileAttrs`] from the accessor nodes in the graph.
///
/// Accessors are single-child nodes: the child is the tile being described,
/// and the accessor's own class holds the value (an integer literal node,
/// or a `MemRegion.*` constant node for the storage tier).
pub fn derive_attrs(egraph: &EGraph) -> IndexMap<ClassId, TileAttrs> {
    // Integer literal nodes give their class a value.
    let mut class_values: HashMap<ClassId, i64> = HashMap::default();
    // MemRegion constant nodes name their class.
    let mut region_names: HashMap<ClassId, MemRegion> = HashMap::default();
    for (_, node) in egraph.nodes() {
        if let Ok(value) = node.op.as_str().parse::<i64>() {
            class_values.insert(node.eclass, value);
        } else if let Some(region) = MemRegion::from_op(node.op.as_str()) {
            region_names.insert(node.eclass, region);
        }
    }

    let mut attrs: IndexMap<ClassId, TileAttrs> = IndexMap::default();
    for (_, node) in egraph.nodes() {
        if node.children.len() != 1 {
            continue;
        }
        let tile = egraph[node.children[0]].eclass;
        let value = class_values.get(&node.eclass).copied();
        match node.op.as_str() {
            ACC_ROWS => {
                if let Some(v) = value {
                    attrs.entry(tile).or_default().rows = Some(v);
                }
            }
            ACC_COLS => {
                if let Some(v) = value {
                    attrs.entry(tile).or_default().cols = Some(v);
                }
            }
            ACC_DTYPE_BYTES => {
                if let Some(v) = value {
                    attrs.entry(tile).or_default().dtype_bytes = Some(v);
                }
            }
            ACC_LOOP_ITERS => {
                if let Some(v) = value {
                    attrs.entry(tile).or_default().loop_iters = Some(v);
                }
            }
            ACC_MEM_REGION => {
                if let Some(&region) = region_names.get(&node.eclass) {
                    attrs.entry(tile).or_default().mem_region = Some(region);
                }
            }
            _ => {}
        }
    }
    attrs
}

/// Derive a traffic cost for every node in the graph.
///
/// Data movement ops pay for their own output tile once per trip:
/// `rows × cols × dtype_bytes × loop_iters`. The fused `Tile.WGMMA` pays
/// the implicit shared-to-register load of any operand still in shared
/// memory; operands already in registers contribute nothing. Everything
/// else (pure compute, literals, accessors) costs 0.
///
/// Costs are per node, not per class: sibling nodes in one class can sit in
/// different memory tiers, and choosing between them is the whole point of
/// extraction.
pub fn derive_costs(egraph: &EGraph) -> IndexMap<NodeId, f64> {
    let attrs = derive_attrs(egraph);
    let attr = |class: ClassId| attrs.get(&class).copied().unwrap_or_default();

    let mut costs: IndexMap<NodeId, f64> = IndexMap::default();
    for (id, node) in egraph.nodes() {
        let op = node.op.as_str();
        let cost = if MOVEMENT_OPS.contains(&op) {
            let out = attr(node.eclass);
            if out == TileAttrs::default() {
                debug!("movement node {} ({}) has no derived attributes", id, op);
            }
            (out.bytes() * out.iters()) as f64
        } else if op == OP_WGMMA && node.children.len() == 2 {
            let out = attr(node.eclass);
            let staged: i64 = node
                .children
                .iter()
                .map(|&child| attr(egraph[child].eclass))
                .filter(|operand| operand.mem_region == Some(MemRegion::Shared))
                .map(|operand| operand.bytes())
                .sum();
            (staged * out.iters()) as f64
        } else {
            0.0
        };
        costs.insert(id, cost);
    }
    costs
}

/// The traffic actually incurred by a selection: every selected class whose
/// chosen node moves data, with the op and the bytes moved.
///
/// Each class appears at most once, so nothing is double counted; summing
/// the third column of the result reproduces the movement portion of the
/// extraction objective. A node missing from `costs` is priced by its
/// embedded fallback cost, the same way [`IlpExtractor`] prices it.
///
/// [`IlpExtractor`]: crate::extract::IlpExtractor
pub fn transaction_summary(
    egraph: &EGraph,
    selection: &crate::select::Selection,
    costs: &IndexMap<NodeId, f64>,
) -> Vec<(ClassId, Symbol, f64)> {
    let mut summary = Vec::new();
    for (class, node) in selection.iter() {
        let cost = match costs.get(&node) {
            Some(&cost) => cost,
            None => egraph[node].cost,
        };
        if cost > 0.0 {
            summary.push((class, egraph[node].op, cost));
        }
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::egraph::Node;

    /// Attach an integer attribute to `tile` by adding a literal node and an
    /// accessor node pointing at it.
    fn attach_attr(egraph: &mut EGraph, tile: NodeId, accessor: &str, value: i64) -> ClassId {
        let name = accessor.trim_start_matches("·.");
        let value_class = ClassId::from(format!("c-{}-{}", name, tile));
        egraph.add_node(
            format!("lit-{}-{}", value, value_class),
            Node::leaf(value.to_string(), value_class),
        );
        egraph.add_node(
            format!("acc-{}-{}", name, tile),
            Node::new(accessor, value_class, vec![tile]),
        );
        value_class
    }

    /// Attach a storage tier to `tile` the same way.
    fn attach_region(egraph: &mut EGraph, tile: NodeId, region: &str) -> ClassId {
        let value_class = ClassId::from(format!("c-region-{}", tile));
        egraph.add_node(format!("tag-{}", value_class), Node::leaf(region, value_class));
        egraph.add_node(
            format!("acc-region-{}", tile),
            Node::new(ACC_MEM_REGION, value_class, vec![tile]),
        );
        value_class
    }

    fn get(costs: &IndexMap<NodeId, f64>, id: &str) -> f64 {
        costs[&NodeId::from(id)]
    }

    #[test]
    fn lds_pays_tile_bytes_per_trip() {
        let mut egraph = EGraph::default();
        egraph.add_node("src", Node::leaf("input-A", "c-src"));
        let lds = egraph.add_node("lds", Node::new(OP_LDS, "c-lds", vec!["src".into()]));
        attach_attr(&mut egraph, lds, ACC_ROWS, 128);
        attach_attr(&mut egraph, lds, ACC_COLS, 64);
        attach_attr(&mut egraph, lds, ACC_DTYPE_BYTES, 2);
        attach_attr(&mut egraph, lds, ACC_LOOP_ITERS, 8);
        egraph.add_root("c-lds");
        egraph.validate().unwrap();

        let costs = derive_costs(&egraph);
        assert_eq!(get(&costs, "lds"), (128 * 64 * 2 * 8) as f64);
        assert_eq!(get(&costs, "lds"), 131072.0);
        // Accessors and literals are free.
        assert_eq!(get(&costs, "src"), 0.0);
    }

    #[test]
    fn wgmma_pays_only_for_shared_operands() {
        let mut egraph = EGraph::default();
        let a = egraph.add_node("a", Node::leaf("A", "c-a"));
        let b = egraph.add_node("b", Node::leaf("B", "c-b"));
        let mma = egraph.add_node(
            "mma",
            Node::new(OP_WGMMA, "c-out", vec!["a".into(), "b".into()]),
        );
        attach_attr(&mut egraph, a, ACC_ROWS, 64);
        attach_attr(&mut egraph, a, ACC_COLS, 128);
        attach_attr(&mut egraph, a, ACC_DTYPE_BYTES, 2);
        attach_region(&mut egraph, a, "MemRegion.SHARED");
        attach_attr(&mut egraph, b, ACC_ROWS, 128);
        attach_attr(&mut egraph, b, ACC_COLS, 64);
        attach_attr(&mut egraph, b, ACC_DTYPE_BYTES, 2);
        attach_region(&mut egraph, b, "MemRegion.REGISTERS");
        attach_attr(&mut egraph, mma, ACC_LOOP_ITERS, 4);
        egraph.add_root("c-out");
        egraph.validate().unwrap();

        let costs = derive_costs(&egraph);
        // Only the shared operand is staged: 64*128*2 bytes, 4 trips.
        assert_eq!(get(&costs, "mma"), (64 * 128 * 2 * 4) as f64);
    }

    #[test]
    fn missing_attributes_are_conservative() {
        let mut egraph = EGraph::default();
        egraph.add_node("src", Node::leaf("input", "c-src"));
        let lds = egraph.add_node("lds", Node::new(OP_LDS, "c-lds", vec!["src".into()]));
        // Shape known, trip count missing: defaults to one execution.
        attach_attr(&mut egraph, lds, ACC_ROWS, 16);
        attach_attr(&mut egraph, lds, ACC_COLS, 16);
        attach_attr(&mut egraph, lds, ACC_DTYPE_BYTES, 4);
        // A second movement node with no attributes at all costs 0.
        egraph.add_node("sts", Node::new(OP_STS, "c-sts", vec!["src".into()]));
        egraph.validate().unwrap();

        let costs = derive_costs(&egraph);
        assert_eq!(get(&costs, "lds"), (16 * 16 * 4) as f64);
        assert_eq!(get(&costs, "sts"), 0.0);
    }

    #[test]
    fn summary_prices_missing_nodes_like_the_extractor() {
        let mut egraph = EGraph::default();
        egraph.add_node("src", Node::leaf("input", "c-src"));
        egraph.add_node(
            "lds",
            Node::new(OP_LDS, "c-lds", vec!["src".into()]).with_cost(42.0),
        );
        egraph.validate().unwrap();

        let selection: crate::select::Selection = [
            ("c-lds".into(), "lds".into()),
            ("c-src".into(), "src".into()),
        ]
        .into_iter()
        .collect();

        // No derived costs supplied: the embedded fallback is what the
        // objective would have charged, so the summary reports it too.
        let costs = IndexMap::default();
        let summary = transaction_summary(&egraph, &selection, &costs);
        let expected: Vec<(ClassId, Symbol, f64)> =
            vec![("c-lds".into(), Symbol::from(OP_LDS), 42.0)];
        assert_eq!(summary, expected);
    }

    #[test]
    fn attrs_land_on_the_child_class() {
        let mut egraph = EGraph::default();
        let t = egraph.add_node("t", Node::leaf("T", "c-t"));
        attach_attr(&mut egraph, t, ACC_ROWS, 32);
        let attrs = derive_attrs(&egraph);
        assert_eq!(attrs[&ClassId::from("c-t")].rows, Some(32));
        // The accessor's own class carries no attributes.
        assert!(!attrs.contains_key(&ClassId::from("c-rows-t")));
    }
}
