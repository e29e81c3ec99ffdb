use crate::cyk::chart::{BackPointer, Chart};
use crate::symbol::Symbol;
use crate::tree::{DerivationTree, NodeId};

/// An unexpanded non-terminal node, remembering which chart cell justifies
/// it.
#[derive(Debug, Clone)]
struct Hole {
    node: NodeId,
    span: usize,
    start: usize,
    label: Symbol,
}

#[derive(Debug, Clone)]
struct PartialParse {
    tree: DerivationTree,
    pending: Vec<Hole>,
}

/// Walks backpointers from the top cell's start-symbol entry and
/// materializes every distinct derivation tree. At a branch point (an entry
/// justified by more than one backpointer) the partial tree built so far is
/// cloned once per alternative, so every combination of choices completes
/// exactly once. Output order is unspecified.
pub fn build_forest(chart: &Chart, start_symbol: &Symbol, n: usize) -> Vec<DerivationTree> {
    let mut completed = Vec::new();
    if !chart.cell(n - 1, 0).contains_key(start_symbol) {
        return completed;
    }

    let mut tree = DerivationTree::new(start_symbol.clone());
    let root = tree.root();
    let mut worklist = vec![PartialParse {
        tree,
        pending: vec![Hole {
            node: root,
            span: n - 1,
            start: 0,
            label: start_symbol.clone(),
        }],
    }];

    while let Some(mut partial) = worklist.pop() {
        let Some(hole) = partial.pending.pop() else {
            completed.push(partial.tree);
            continue;
        };
        let Some(backpointers) = chart.cell(hole.span, hole.start).get(&hole.label) else {
            continue; // no justification left for this branch
        };
        for backpointer in backpointers.iter().skip(1) {
            let mut branch = partial.clone();
            expand(&mut branch, &hole, backpointer);
            worklist.push(branch);
        }
        if let Some(first) = backpointers.first() {
            expand(&mut partial, &hole, first);
            worklist.push(partial);
        }
    }
    completed
}

fn expand(partial: &mut PartialParse, hole: &Hole, backpointer: &BackPointer) {
    match backpointer {
        BackPointer::Leaf { terminal } => {
            partial.tree.add_child(hole.node, terminal.clone());
        }
        BackPointer::Split { point, left, right } => {
            let left_node = partial.tree.add_child(hole.node, left.clone());
            let right_node = partial.tree.add_child(hole.node, right.clone());
            partial.pending.push(Hole {
                node: right_node,
                span: hole.span - point - 1,
                start: hole.start + point + 1,
                label: right.clone(),
            });
            partial.pending.push(Hole {
                node: left_node,
                span: *point,
                start: hole.start,
                label: left.clone(),
            });
        }
    }
}
