use thiserror::Error;

/// Errors surfaced by grammar ingestion, normalization and parsing.
///
/// Ingestion and normalization errors abort the whole pipeline for that
/// grammar; no partial model is handed to the chart engine. A sentence that
/// is simply not in the language is a negative result, not an error.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GrammarError {
    #[error("malformed rule line {line:?}: {detail}")]
    MalformedRule { line: String, detail: &'static str },

    #[error("the grammar generates nothing: start symbol {start} lost all productions")]
    EmptyLanguage { start: String },

    #[error("fresh symbol {name} collides with an existing grammar symbol")]
    PrefixCollision { name: String },

    #[error("token {token:?} matches no terminal production in the grammar")]
    UnknownSymbol { token: String },
}
