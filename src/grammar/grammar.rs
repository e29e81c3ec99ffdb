use hashbrown::{HashMap, HashSet};
use once_cell::sync::OnceCell;
use std::fmt::{Display, Formatter};
use tracing::debug;

use crate::error::GrammarError;
use crate::symbol::{epsilon, Symbol, SymbolKind};

/// An ordered, non-empty production right-hand side. The epsilon production
/// is represented as a body holding exactly the epsilon marker.
pub type Body = Vec<Symbol>;

pub fn is_epsilon_body(body: &[Symbol]) -> bool {
    body.len() == 1 && body[0].is_epsilon()
}

pub fn is_unit_body(body: &[Symbol]) -> bool {
    body.len() == 1 && body[0].is_non_terminal()
}

#[derive(Debug, Clone)]
pub struct Grammar {
    pub productions: HashMap<Symbol, HashSet<Body>>, // non-terminal -> alternative bodies

    pub start_symbol: Symbol, // head of the first rule line, fixed once set
    pub fresh_prefix: String, // prefix for all symbols invented during normalization

    // Derived from `productions`; rebuilt wholesale by `recompute_indices`
    // because the normalization passes rewrite the table destructively.
    pub terminals: HashSet<Symbol>,
    pub non_terminals: HashSet<Symbol>,
    pub nullable: HashSet<Symbol>,
    pub adjacency: HashMap<Symbol, HashSet<Symbol>>, // head -> symbols used in its bodies

    normal_form: OnceCell<bool>,
}

impl Grammar {
    /// Reads a grammar from a string of text, one rule per line:
    ///
    ///   `HEAD -> body1 | body2 | ... | bodyn`
    ///
    /// Bodies are whitespace-separated symbol tokens. Repeated heads merge
    /// their alternatives; the first head becomes the start symbol. When no
    /// `fresh_prefix` is given, one is chosen that cannot collide with any
    /// symbol of the grammar.
    pub fn from_text(text: &str, fresh_prefix: Option<&str>) -> Result<Self, GrammarError> {
        let lines: Vec<&str> = text.lines().collect();
        Self::from_lines(&lines, fresh_prefix)
    }

    pub fn from_lines(lines: &[&str], fresh_prefix: Option<&str>) -> Result<Self, GrammarError> {
        let mut productions: HashMap<Symbol, HashSet<Body>> = HashMap::new();
        let mut start_symbol: Option<Symbol> = None;

        for raw in lines {
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }
            Self::read_line(line, &mut productions, &mut start_symbol)?;
        }

        let start_symbol = start_symbol.ok_or(GrammarError::MalformedRule {
            line: String::new(),
            detail: "grammar contains no rules",
        })?;

        let mut grammar = Grammar {
            productions,
            start_symbol,
            fresh_prefix: String::new(),
            terminals: HashSet::new(),
            non_terminals: HashSet::new(),
            nullable: HashSet::new(),
            adjacency: HashMap::new(),
            normal_form: OnceCell::new(),
        };
        grammar.recompute_indices();
        grammar.fresh_prefix = match fresh_prefix {
            Some(prefix) => prefix.to_string(),
            None => choose_fresh_prefix(&grammar.terminals, &grammar.non_terminals),
        };
        debug!(
            rules = grammar.productions.len(),
            terminals = grammar.terminals.len(),
            start = %grammar.start_symbol,
            prefix = %grammar.fresh_prefix,
            "grammar ingested"
        );
        Ok(grammar)
    }

    /// Internal helper to process a single rule line.
    fn read_line(
        line: &str,
        productions: &mut HashMap<Symbol, HashSet<Body>>,
        start_symbol: &mut Option<Symbol>,
    ) -> Result<(), GrammarError> {
        let Some((head_text, body_text)) = line.split_once("->") else {
            return Err(GrammarError::MalformedRule {
                line: line.to_string(),
                detail: "missing \"->\" separator",
            });
        };

        let head = Symbol::new(head_text.trim());
        if head.kind() != SymbolKind::NonTerminal {
            return Err(GrammarError::MalformedRule {
                line: line.to_string(),
                detail: "rule head is not a non-terminal",
            });
        }
        if start_symbol.is_none() {
            *start_symbol = Some(head.clone());
        }

        let alternatives = productions.entry(head).or_default();
        for alternative in body_text.split('|') {
            let tokens: Vec<Symbol> = alternative.split_whitespace().map(Symbol::new).collect();
            if tokens.is_empty() {
                return Err(GrammarError::MalformedRule {
                    line: line.to_string(),
                    detail: "empty body",
                });
            }
            // Epsilon tokens mixed into a longer alternative carry no
            // content; an alternative of only epsilon tokens is the epsilon
            // body.
            let body: Body = tokens.into_iter().filter(|s| !s.is_epsilon()).collect();
            if body.is_empty() {
                alternatives.insert(vec![epsilon()]);
            } else {
                alternatives.insert(body);
            }
        }
        Ok(())
    }

    /// Clears and rebuilds every derived index from the current production
    /// table: terminal/non-terminal membership, the nullable set and the
    /// per-non-terminal adjacency. Passes must call this before relying on
    /// the derived sets; none of them are maintained incrementally.
    pub fn recompute_indices(&mut self) {
        self.terminals.clear();
        self.non_terminals.clear();
        self.adjacency.clear();

        for (head, bodies) in &self.productions {
            self.non_terminals.insert(head.clone());
            let used = self.adjacency.entry(head.clone()).or_default();
            for body in bodies {
                for symbol in body {
                    match symbol.kind() {
                        SymbolKind::Terminal => {
                            self.terminals.insert(symbol.clone());
                        }
                        SymbolKind::NonTerminal => {
                            self.non_terminals.insert(symbol.clone());
                        }
                        SymbolKind::Epsilon => continue, // marker, not alphabet
                    }
                    used.insert(symbol.clone());
                }
            }
        }

        let (nullable, _) = self.compute_nullable();
        self.nullable = nullable;
        self.normal_form = OnceCell::new();
    }

    /// Least fixpoint of "has an epsilon body, or a body of only nullable
    /// symbols". The second value is false when the bounded-iteration guard
    /// fired before the fixpoint settled.
    pub fn compute_nullable(&self) -> (HashSet<Symbol>, bool) {
        let mut nullable: HashSet<Symbol> = HashSet::new();
        let total = self.productions.len();
        let mut rounds = 0usize;
        loop {
            let mut changed = false;
            for (head, bodies) in &self.productions {
                if nullable.contains(head) {
                    continue;
                }
                let derives_empty = bodies.iter().any(|body| {
                    body.iter()
                        .all(|symbol| symbol.is_epsilon() || nullable.contains(symbol))
                });
                if derives_empty {
                    nullable.insert(head.clone());
                    changed = true;
                }
            }
            if !changed {
                return (nullable, true);
            }
            rounds += 1;
            if rounds > total {
                return (nullable, false);
            }
        }
    }

    /// Returns `fresh_prefix + counter` as a new non-terminal name. The
    /// caller owns the monotonic counter; the result is checked against the
    /// existing alphabet so a colliding prefix surfaces instead of silently
    /// capturing a pre-existing symbol.
    pub fn fresh_symbol(&self, counter: usize) -> Result<Symbol, GrammarError> {
        let symbol = Symbol::from_string(format!("{}{}", self.fresh_prefix, counter));
        if self.terminals.contains(&symbol) || self.non_terminals.contains(&symbol) {
            return Err(GrammarError::PrefixCollision { name: symbol.name });
        }
        Ok(symbol)
    }

    /// Checks the Chomsky Normal Form shape: every body is one terminal or
    /// two non-terminals. Cached until the next `recompute_indices`.
    pub fn is_normal_form(&self) -> bool {
        *self.normal_form.get_or_init(|| self._is_normal_form())
    }

    fn _is_normal_form(&self) -> bool {
        for bodies in self.productions.values() {
            for body in bodies {
                match body.as_slice() {
                    [symbol] => {
                        if !symbol.is_terminal() {
                            return false;
                        }
                    }
                    [left, right] => {
                        if !left.is_non_terminal() || !right.is_non_terminal() {
                            return false;
                        }
                    }
                    _ => return false,
                }
            }
        }
        true
    }

    /// Display dump of the start symbol, fresh prefix and every
    /// non-terminal's alternative set. The format is for humans; nothing
    /// parses it back.
    pub fn to_text(&self) -> String {
        let mut result = String::new();
        result.push_str("Start Symbol: ");
        result.push_str(self.start_symbol.get_name());
        result.push('\n');
        result.push_str("Fresh Prefix: ");
        result.push_str(&self.fresh_prefix);
        result.push('\n');

        let mut heads: Vec<&Symbol> = self.productions.keys().collect();
        heads.sort();
        for head in heads {
            let mut alternatives: Vec<String> = self.productions[head]
                .iter()
                .map(|body| {
                    body.iter()
                        .map(Symbol::get_name)
                        .collect::<Vec<_>>()
                        .join(" ")
                })
                .collect();
            alternatives.sort();
            result.push_str(&format!("{} -> {}\n", head, alternatives.join(" | ")));
        }

        let mut terminals: Vec<&Symbol> = self.terminals.iter().collect();
        terminals.sort();
        result.push_str("Terminals:");
        for terminal in terminals {
            result.push(' ');
            result.push_str(terminal.get_name());
        }
        result
    }
}

impl Display for Grammar {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_text())
    }
}

/// Shortest uppercase letter string that is not a prefix of any existing
/// symbol name; `prefix + index` can then never equal a pre-existing name.
fn choose_fresh_prefix(terminals: &HashSet<Symbol>, non_terminals: &HashSet<Symbol>) -> String {
    let mut length = 1;
    loop {
        for letter in 'A'..='Z' {
            let candidate: String = std::iter::repeat(letter).take(length).collect();
            let taken = terminals
                .iter()
                .chain(non_terminals.iter())
                .any(|symbol| symbol.name.starts_with(&candidate));
            if !taken {
                return candidate;
            }
        }
        length += 1;
    }
}
