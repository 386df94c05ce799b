#![warn(missing_docs)]
/*!

`tile-extract` picks the single cheapest concrete computation out of a
serialized e-graph.

An upstream equality-saturation engine groups equivalent sub-expressions
into classes and serializes the result as a JSON document of e-nodes and
root classes. This crate loads that document, derives a data-movement cost
for every node from the analysis accessors embedded in the graph (tile
shapes, trip counts, memory tiers), and solves a 0/1 integer program that
selects exactly one node per reachable class at minimum total cost. Because
equally-cheap realizations are operationally interesting, the solver can
also enumerate *all* optimal selections via no-good cuts, filter each down
to the classes its root actually reaches, and deduplicate the results by
their rendered structure.

```no_run
use tile_extract::*;

# fn main() -> Result<(), Box<dyn std::error::Error>> {
let egraph = EGraph::from_json_str(&std::fs::read_to_string("egraph.json")?)?;
let costs = derive_costs(&egraph);
let extractor = IlpExtractor::new(&egraph, &costs);

let (total, selection) = extractor.solve(good_lp::default_solver)?;
let root = egraph.roots()[0];
println!("{}", format_selection(&egraph, &selection.live(&egraph, root), root));
println!("cost: {} bytes", total);
# Ok(())
# }
```

## Logging

Several parts of `tile-extract` dump useful logging info using the
[`log`](https://docs.rs/log/) crate. The easiest way to see this info is to
use the [`env_logger`](https://docs.rs/env_logger/) crate in your binary or
test, with the environment variable `RUST_LOG=tile_extract=debug`.

*/

mod cost;
mod egraph;
mod extract;
mod select;
mod util;

pub use {
    cost::{
        derive_attrs, derive_costs, transaction_summary, MemRegion, TileAttrs, ACC_COLS,
        ACC_DTYPE_BYTES, ACC_LOOP_ITERS, ACC_MEM_REGION, ACC_ROWS, OP_LDR, OP_LDS, OP_STG, OP_STS,
        OP_WGMMA,
    },
    egraph::{ClassId, EGraph, MalformedGraph, Node, NodeId},
    extract::{ExtractError, IlpExtractor},
    select::{dedup_selections, format_selection, Selection},
    util::Symbol,
};

#[cfg(test)]
fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}
