use good_lp::*;
use log::{debug, info};
use thiserror::Error;

use crate::egraph::{ClassId, EGraph, NodeId};
use crate::select::Selection;
use crate::util::{HashMap, IndexMap};

/// Extraction failed to produce a selection.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// The program has no feasible assignment. With a validated graph this
    /// only happens for an empty root set; it is never a zero-cost result.
    #[error("no feasible selection for the given roots")]
    Infeasible,
    /// The solver itself failed. The model is deterministic, so retrying
    /// gives no benefit; the error is propagated as-is.
    #[error("solver failure: {0}")]
    Solver(ResolutionError),
}

struct ClassVars {
    active: Variable,
    nodes: Vec<Variable>,
}

/// Selects the minimum-cost DAG from an e-graph by 0/1 integer programming.
///
/// One binary variable per node (selected) and per class (active). The
/// objective is the cost-weighted sum of selected nodes, subject to: every
/// root class active, exactly one node selected per active class, and every
/// child class of a selected node active. Unreachable classes are left
/// free; with nonnegative costs the optimizer keeps them at zero.
pub struct IlpExtractor<'a> {
    egraph: &'a EGraph,
    costs: &'a IndexMap<NodeId, f64>,
}

impl<'a> IlpExtractor<'a> {
    /// Build an extractor over `egraph` using `costs` for the objective.
    ///
    /// A node missing from `costs` falls back to the literal cost embedded
    /// in the source document.
    pub fn new(egraph: &'a EGraph, costs: &'a IndexMap<NodeId, f64>) -> Self {
        IlpExtractor { egraph, costs }
    }

    fn node_cost(&self, id: NodeId) -> f64 {
        match self.costs.get(&id) {
            Some(&cost) => cost,
            None => self.egraph[id].cost,
        }
    }

    /// Solve once, returning the optimal cost and selection.
    pub fn solve<S: Solver>(&self, solver: S) -> Result<(f64, Selection), ExtractError>
    where
        S::Model: SolverModel<Error = ResolutionError>,
    {
        self.solve_once(solver, None, &[])?
            .ok_or(ExtractError::Infeasible)
    }

    /// Enumerate every distinct optimal selection, up to `max_solutions`.
    ///
    /// The first solve establishes the optimum. Each further solve rebuilds
    /// the same program with the objective pinned to that optimum and one
    /// no-good cut per selection already found, so it must differ in at
    /// least one chosen node. Stopping before the cap means the returned
    /// set is complete: no other optimal selection exists.
    pub fn solve_all<S: Solver + Copy>(
        &self,
        solver: S,
        max_solutions: usize,
    ) -> Result<(f64, Vec<Selection>), ExtractError>
    where
        S::Model: SolverModel<Error = ResolutionError>,
    {
        let (optimal, first) = self.solve(solver)?;
        let mut found = vec![first];
        while found.len() < max_solutions {
            match self.solve_once(solver, Some(optimal), &found)? {
                Some((_, next)) => {
                    debug!("found alternate optimum #{}", found.len() + 1);
                    found.push(next);
                }
                None => break,
            }
        }
        info!(
            "{} optimal selection(s) at cost {}",
            found.len(),
            optimal
        );
        Ok((optimal, found))
    }

    /// Build and solve the program from scratch. `pin` fixes the objective
    /// to a known optimum; `excluded` adds one no-good cut per prior
    /// selection. Returns `None` on infeasibility.
    fn solve_once<S: Solver>(
        &self,
        solver: S,
        pin: Option<f64>,
        excluded: &[Selection],
    ) -> Result<Option<(f64, Selection)>, ExtractError>
    where
        S::Model: SolverModel<Error = ResolutionError>,
    {
        let egraph = self.egraph;
        if egraph.roots().is_empty() {
            return Ok(None);
        }

        let bool_kind = VariableDefinition::new().binary();
        let mut problem_vars = ProblemVariables::default();
        let mut node_vars: HashMap<NodeId, Variable> = HashMap::default();
        let vars: IndexMap<ClassId, ClassVars> = egraph
            .classes()
            .map(|(class, members)| {
                let cvars = ClassVars {
                    active: problem_vars.add(bool_kind.clone()),
                    nodes: problem_vars.add_vector(bool_kind.clone(), members.len()),
                };
                for (&member, &var) in members.iter().zip(&cvars.nodes) {
                    node_vars.insert(member, var);
                }
                (class, cvars)
            })
            .collect();

        let mut objective: Expression = 0.into();
        for (_, members) in egraph.classes() {
            for &member in members {
                objective += node_vars[&member] * self.node_cost(member);
            }
        }

        let mut model = problem_vars.minimise(objective.clone()).using(solver);

        if let Some(target) = pin {
            model.add_constraint(objective.eq(target));
        }

        for &root in egraph.roots() {
            // a root absent from the class index is caught at load time;
            // treat it as infeasible if validation was skipped
            let Some(root_vars) = vars.get(&root) else {
                return Ok(None);
            };
            model.add_constraint(Expression::from(root_vars.active).eq(1));
        }

        for (class, class_vars) in &vars {
            // exactly one node in an active class, none in an inactive one
            let sum_nodes: Expression = class_vars.nodes.iter().sum();
            model.add_constraint(sum_nodes.eq(class_vars.active));

            for (&member, &node_var) in egraph.members(*class).iter().zip(&class_vars.nodes) {
                for child_class in egraph.children_classes(member) {
                    // choosing a node activates each child class
                    model.add_constraint(Expression::from(node_var).leq(vars[&child_class].active));
                }
            }
        }

        for prior in excluded {
            // the next solution must differ from this one in at least one node
            let sum_prior: Expression = prior
                .iter()
                .filter_map(|(_, node)| node_vars.get(&node))
                .sum();
            model.add_constraint(sum_prior.leq(prior.len() as f64 - 1.0));
        }

        let solution = match model.solve() {
            Ok(solution) => solution,
            Err(ResolutionError::Infeasible) => return Ok(None),
            Err(err) => return Err(ExtractError::Solver(err)),
        };

        let mut selection = Selection::new();
        let mut total = 0.0;
        for (class, class_vars) in &vars {
            if solution.value(class_vars.active) <= 0.5 {
                continue;
            }
            for (&member, &var) in egraph.members(*class).iter().zip(&class_vars.nodes) {
                if solution.value(var) > 0.5 {
                    selection.insert(*class, member);
                    total += self.node_cost(member);
                    break;
                }
            }
        }
        debug!(
            "ILP solve: {} nodes, {} classes, cost {}",
            egraph.len(),
            egraph.num_classes(),
            total
        );
        Ok(Some((total, selection)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::egraph::Node;
    use crate::select::{dedup_selections, format_selection};

    fn closed(egraph: &EGraph, selection: &Selection) -> bool {
        selection.iter().all(|(_, node)| {
            egraph
                .children_classes(node)
                .all(|child| selection.contains(child))
        })
    }

    #[test]
    fn picks_the_cheap_alternative() {
        crate::init_logger();
        let mut egraph = EGraph::default();
        egraph.add_node("x", Node::leaf("x", "c-x"));
        egraph.add_node(
            "slow",
            Node::new("slow", "c-out", vec!["x".into()]).with_cost(10.0),
        );
        egraph.add_node(
            "fast",
            Node::new("fast", "c-out", vec!["x".into()]).with_cost(3.0),
        );
        egraph.add_root("c-out");
        egraph.validate().unwrap();

        let costs = IndexMap::default();
        let (total, selection) = IlpExtractor::new(&egraph, &costs)
            .solve(default_solver)
            .unwrap();
        assert_eq!(total, 3.0);
        assert_eq!(selection.get("c-out".into()), Some("fast".into()));
        assert!(closed(&egraph, &selection));
    }

    #[test]
    fn selection_is_closed_and_single_representative() {
        let mut egraph = EGraph::default();
        egraph.add_node("a", Node::leaf("a", "c-a"));
        egraph.add_node("b", Node::leaf("b", "c-b"));
        egraph.add_node(
            "f",
            Node::new("f", "c-f", vec!["a".into(), "b".into()]).with_cost(1.0),
        );
        egraph.add_node("g", Node::new("g", "c-f", vec!["a".into()]).with_cost(1.0));
        egraph.add_root("c-f");
        egraph.validate().unwrap();

        let costs = crate::cost::derive_costs(&egraph);
        let (total, selection) = IlpExtractor::new(&egraph, &costs)
            .solve(default_solver)
            .unwrap();
        assert!(closed(&egraph, &selection));
        // cost additivity: re-sum the chosen nodes independently
        let resummed: f64 = selection
            .iter()
            .map(|(_, node)| costs.get(&node).copied().unwrap_or(egraph[node].cost))
            .sum();
        assert!((total - resummed).abs() < 1e-6);
        // exactly one member of c-f chosen
        let chosen = selection.get("c-f".into()).unwrap();
        assert!(chosen == "f".into() || chosen == "g".into());
    }

    // The bounds must let callers stay generic over the backend instead of
    // naming a concrete solver.
    fn extract_with<S: Solver>(
        egraph: &EGraph,
        costs: &IndexMap<NodeId, f64>,
        solver: S,
    ) -> Result<(f64, Selection), ExtractError>
    where
        S::Model: SolverModel<Error = ResolutionError>,
    {
        IlpExtractor::new(egraph, costs).solve(solver)
    }

    #[test]
    fn solve_is_generic_over_solver_backends() {
        let mut egraph = EGraph::default();
        egraph.add_node("x", Node::leaf("x", "c-x").with_cost(2.0));
        egraph.add_root("c-x");
        egraph.validate().unwrap();

        let costs = IndexMap::default();
        let (total, selection) = extract_with(&egraph, &costs, default_solver).unwrap();
        assert_eq!(total, 2.0);
        assert_eq!(selection.get("c-x".into()), Some("x".into()));
    }

    #[test]
    fn empty_roots_are_infeasible() {
        let mut egraph = EGraph::default();
        egraph.add_node("x", Node::leaf("x", "c-x"));
        egraph.validate().unwrap();
        let costs = IndexMap::default();
        let err = IlpExtractor::new(&egraph, &costs)
            .solve(default_solver)
            .unwrap_err();
        assert!(matches!(err, ExtractError::Infeasible));
    }

    #[test]
    fn enumerates_both_optima() {
        crate::init_logger();
        // combine(5, 5) and a bare literal tie at cost 0
        let mut egraph = EGraph::default();
        egraph.add_node("lit5", Node::leaf("5", "c-5"));
        egraph.add_node(
            "n1",
            Node::new("combine", "c-out", vec!["lit5".into(), "lit5".into()]),
        );
        egraph.add_node("n2", Node::leaf("literal", "c-out"));
        egraph.add_root("c-out");
        egraph.validate().unwrap();

        let costs = crate::cost::derive_costs(&egraph);
        let extractor = IlpExtractor::new(&egraph, &costs);
        let (optimal, selections) = extractor.solve_all(default_solver, 10).unwrap();
        assert_eq!(optimal, 0.0);

        // No-good cuts guarantee the raw selections are pairwise distinct.
        for (i, a) in selections.iter().enumerate() {
            for b in &selections[i + 1..] {
                assert_ne!(a, b);
            }
        }

        let root = ClassId::from("c-out");
        let unique = dedup_selections(&egraph, selections, root);
        let mut rendered: Vec<String> = unique
            .iter()
            .map(|s| format_selection(&egraph, s, root))
            .collect();
        rendered.sort();
        assert_eq!(rendered, vec!["combine(5, 5)", "literal"]);
    }

    #[test]
    fn cap_limits_enumeration() {
        let mut egraph = EGraph::default();
        for i in 0..4 {
            egraph.add_node(format!("alt{}", i), Node::leaf(format!("v{}", i), "c-out"));
        }
        egraph.add_root("c-out");
        egraph.validate().unwrap();

        let costs = IndexMap::default();
        let extractor = IlpExtractor::new(&egraph, &costs);
        let (_, capped) = extractor.solve_all(default_solver, 2).unwrap();
        assert_eq!(capped.len(), 2);
        let (_, all) = extractor.solve_all(default_solver, 10).unwrap();
        assert_eq!(all.len(), 4);
    }
}
