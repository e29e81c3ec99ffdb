use std::time::{Duration, Instant};

use rayon::prelude::*;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use tracing::debug;

use crate::cyk::forest::build_forest;
use crate::error::GrammarError;
use crate::grammar::grammar::Grammar;
use crate::language::Language;
use crate::symbol::Symbol;
use crate::tree::DerivationTree;

/// One recorded justification for a non-terminal's presence in a chart
/// cell. Every firing combination is recorded, not just the first, so the
/// forest builder can enumerate all derivations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackPointer {
    /// The non-terminal derives the single token under the cell.
    Leaf { terminal: Symbol },
    /// A binary rule fired; the left child covers `point + 1` tokens of the
    /// span, the right child the remainder.
    Split {
        point: usize,
        left: Symbol,
        right: Symbol,
    },
}

pub type Cell = FxHashMap<Symbol, SmallVec<[BackPointer; 2]>>;

/// Triangular table of `(span_length, start_offset)` cells; row `l` holds
/// the cells for spans of `l + 1` tokens.
pub struct Chart {
    rows: Vec<Vec<Cell>>,
}

impl Chart {
    pub fn cell(&self, span: usize, start: usize) -> &Cell {
        &self.rows[span][start]
    }

    /// The full-span cell; acceptance is membership of the start symbol
    /// here.
    pub fn top(&self) -> &Cell {
        &self.rows[self.rows.len() - 1][0]
    }
}

/// Outcome of one CYK invocation.
#[derive(Debug, Clone)]
pub struct ParseResult {
    pub accepted: bool,
    pub elapsed: Duration,
    pub forest: Vec<DerivationTree>,
}

impl ParseResult {
    fn rejected(started: Instant) -> Self {
        ParseResult {
            accepted: false,
            elapsed: started.elapsed(),
            forest: Vec::new(),
        }
    }
}

pub fn tokenize(sentence: &str) -> Vec<Symbol> {
    sentence.split_whitespace().map(Symbol::new).collect()
}

/// CYK recognizer/parser over a frozen CNF grammar. Construction
/// precomputes the lexical index (token -> deriving heads) and the binary
/// rule list; each invocation allocates a private chart and never mutates
/// the grammar, so one parser may serve concurrent sentences.
pub struct CykParser<'g> {
    grammar: &'g Grammar,
    lexical: FxHashMap<Symbol, Vec<Symbol>>,
    binary_rules: Vec<(Symbol, Symbol, Symbol)>, // (head, left, right)
}

impl<'g> CykParser<'g> {
    pub fn new(grammar: &'g Grammar) -> Self {
        assert!(
            grammar.is_normal_form(),
            "CYK requires a grammar in Chomsky Normal Form"
        );
        let mut lexical: FxHashMap<Symbol, Vec<Symbol>> = FxHashMap::default();
        let mut binary_rules = Vec::new();
        for (head, bodies) in &grammar.productions {
            for body in bodies {
                match body.as_slice() {
                    [terminal] => lexical
                        .entry(terminal.clone())
                        .or_default()
                        .push(head.clone()),
                    [left, right] => {
                        binary_rules.push((head.clone(), left.clone(), right.clone()))
                    }
                    _ => unreachable!("normal form bodies have length 1 or 2"),
                }
            }
        }
        CykParser {
            grammar,
            lexical,
            binary_rules,
        }
    }

    /// A token with no matching terminal production anywhere in the grammar
    /// cannot be derived; the sentence is rejected before any chart work.
    fn check_tokens(&self, tokens: &[Symbol]) -> Result<(), GrammarError> {
        for token in tokens {
            if !self.lexical.contains_key(token) {
                return Err(GrammarError::UnknownSymbol {
                    token: token.name.clone(),
                });
            }
        }
        Ok(())
    }

    fn build_chart(&self, tokens: &[Symbol]) -> Chart {
        let n = tokens.len();
        let mut rows: Vec<Vec<Cell>> = Vec::with_capacity(n);

        // Span length 0: single tokens against the lexical index.
        let base: Vec<Cell> = tokens
            .iter()
            .map(|token| {
                let mut cell = Cell::default();
                if let Some(heads) = self.lexical.get(token) {
                    for head in heads {
                        cell.entry(head.clone()).or_default().push(BackPointer::Leaf {
                            terminal: token.clone(),
                        });
                    }
                }
                cell
            })
            .collect();
        rows.push(base);

        // Cells of one span length only read strictly shorter spans, so each
        // round fans out per start offset and joins before the next length.
        for span in 1..n {
            let row: Vec<Cell> = (0..n - span)
                .into_par_iter()
                .map(|start| {
                    let mut cell = Cell::default();
                    for point in 0..span {
                        let left_cell = &rows[point][start];
                        let right_cell = &rows[span - point - 1][start + point + 1];
                        if left_cell.is_empty() || right_cell.is_empty() {
                            continue;
                        }
                        for (head, left, right) in &self.binary_rules {
                            if left_cell.contains_key(left) && right_cell.contains_key(right) {
                                cell.entry(head.clone()).or_default().push(
                                    BackPointer::Split {
                                        point,
                                        left: left.clone(),
                                        right: right.clone(),
                                    },
                                );
                            }
                        }
                    }
                    cell
                })
                .collect();
            rows.push(row);
        }
        Chart { rows }
    }

    /// Membership only; no forest is materialized. The empty sentence is
    /// not supported and always rejected.
    pub fn recognize(&self, tokens: &[Symbol]) -> bool {
        if tokens.is_empty() {
            return false;
        }
        if let Err(err) = self.check_tokens(tokens) {
            debug!(%err, "sentence rejected before chart construction");
            return false;
        }
        let chart = self.build_chart(tokens);
        chart.top().contains_key(&self.grammar.start_symbol)
    }

    /// Parses a whitespace-tokenized sentence; on acceptance the complete
    /// ambiguity-aware parse forest is extracted from the backpointers.
    pub fn parse(&self, sentence: &str) -> ParseResult {
        let started = Instant::now();
        let tokens = tokenize(sentence);
        if tokens.is_empty() {
            return ParseResult::rejected(started);
        }
        if let Err(err) = self.check_tokens(&tokens) {
            debug!(%err, "sentence rejected before chart construction");
            return ParseResult::rejected(started);
        }

        let chart = self.build_chart(&tokens);
        let accepted = chart.top().contains_key(&self.grammar.start_symbol);
        let forest = if accepted {
            build_forest(&chart, &self.grammar.start_symbol, tokens.len())
        } else {
            Vec::new()
        };
        ParseResult {
            accepted,
            elapsed: started.elapsed(),
            forest,
        }
    }
}

impl Language for CykParser<'_> {
    fn accepts(&self, input: &[Symbol]) -> bool {
        self.recognize(input)
    }
}
