use thiserror::Error;

use crate::tree::{DerivationTree, TreeGraph};

#[derive(Debug, Error)]
#[error("tree rendering failed: {0}")]
pub struct RenderError(pub String);

/// Image produced by the external renderer. The payload bytes are opaque to
/// the core; width and height are whatever the renderer reports for them.
#[derive(Debug, Clone)]
pub struct RenderedTree {
    pub payload: Vec<u8>,
    pub width: f64,
    pub height: f64,
    pub sentence: String,
}

/// External collaborator turning one derivation tree into an image.
pub trait TreeRenderer {
    fn render(&self, graph: &TreeGraph, sentence: &str) -> Result<RenderedTree, RenderError>;
}

/// One renderer call per tree of the forest.
pub fn render_forest(
    renderer: &dyn TreeRenderer,
    forest: &[DerivationTree],
    sentence: &str,
) -> Result<Vec<RenderedTree>, RenderError> {
    forest
        .iter()
        .map(|tree| renderer.render(&tree.to_graph(), sentence))
        .collect()
}
