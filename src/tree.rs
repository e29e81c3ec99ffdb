use smallvec::SmallVec;
use std::fmt::{Display, Formatter};

use crate::symbol::Symbol;

pub type NodeId = usize;

#[derive(Debug, Clone)]
pub struct TreeNode {
    pub label: Symbol,
    pub children: SmallVec<[NodeId; 2]>,
}

/// A derivation tree stored as an arena of nodes. Node 0 is the root; leaf
/// non-terminal nodes carry one terminal-labeled child, internal nodes carry
/// exactly two (the grammar is in Chomsky Normal Form).
#[derive(Debug, Clone)]
pub struct DerivationTree {
    nodes: Vec<TreeNode>,
}

impl DerivationTree {
    pub fn new(root_label: Symbol) -> Self {
        DerivationTree {
            nodes: vec![TreeNode {
                label: root_label,
                children: SmallVec::new(),
            }],
        }
    }

    pub fn root(&self) -> NodeId {
        0
    }

    pub fn node(&self, id: NodeId) -> &TreeNode {
        &self.nodes[id]
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Appends a new node under `parent` and returns its id.
    pub fn add_child(&mut self, parent: NodeId, label: Symbol) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(TreeNode {
            label,
            children: SmallVec::new(),
        });
        self.nodes[parent].children.push(id);
        id
    }

    /// Leaf labels in left-to-right order; for a completed derivation tree
    /// this is the parsed sentence.
    pub fn yield_tokens(&self) -> Vec<Symbol> {
        let mut tokens = Vec::new();
        let mut stack = vec![self.root()];
        while let Some(id) = stack.pop() {
            let node = &self.nodes[id];
            if node.children.is_empty() {
                tokens.push(node.label.clone());
            } else {
                for &child in node.children.iter().rev() {
                    stack.push(child);
                }
            }
        }
        tokens
    }

    /// Generic graph description (named nodes, labeled edges) handed to the
    /// external renderer; edge labels are child positions.
    pub fn to_graph(&self) -> TreeGraph {
        let mut graph = TreeGraph::default();
        for (id, node) in self.nodes.iter().enumerate() {
            graph.nodes.push(GraphNode {
                id: format!("n{}", id),
                label: node.label.display(),
            });
            for (position, &child) in node.children.iter().enumerate() {
                graph.edges.push(GraphEdge {
                    from: format!("n{}", id),
                    to: format!("n{}", child),
                    label: position.to_string(),
                });
            }
        }
        graph
    }

    fn write_indented(&self, f: &mut Formatter<'_>, id: NodeId, depth: usize) -> std::fmt::Result {
        writeln!(f, "{}{}", "  ".repeat(depth), self.nodes[id].label)?;
        for &child in self.nodes[id].children.iter() {
            self.write_indented(f, child, depth + 1)?;
        }
        Ok(())
    }
}

impl Display for DerivationTree {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        self.write_indented(f, self.root(), 0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphNode {
    pub id: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphEdge {
    pub from: String,
    pub to: String,
    pub label: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TreeGraph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}
