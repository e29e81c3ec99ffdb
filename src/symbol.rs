use std::fmt::{Display, Formatter};

/// The reserved empty-string marker. A body consisting of exactly this
/// symbol denotes an epsilon production; the marker never enters the
/// terminal or non-terminal alphabet.
pub const EPSILON: &str = "ϵ";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SymbolKind {
    Terminal,
    NonTerminal,
    Epsilon,
}

#[derive(Debug, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct Symbol {
    pub name: String, // Textual representation of the symbol
}

impl Symbol {
    /// Create a new Symbol
    pub fn new(name: &str) -> Self {
        Symbol {
            name: name.to_string(),
        }
    }

    /// Create a new Symbol from a String
    pub fn from_string(name: String) -> Self {
        Symbol { name }
    }

    /// Get the name of the symbol
    pub fn get_name(&self) -> &str {
        &self.name
    }

    /// Display the symbol as its name
    pub fn display(&self) -> String {
        self.name.clone()
    }

    /// Classifies the symbol purely from its surface form.
    ///
    /// A token made of nothing but uppercase letters and digits, with at
    /// least one uppercase letter, is a non-terminal. The epsilon marker is
    /// its own class. Everything else is a terminal.
    pub fn kind(&self) -> SymbolKind {
        if self.name == EPSILON {
            return SymbolKind::Epsilon;
        }
        let shape_ok = self
            .name
            .chars()
            .all(|c| c.is_uppercase() || c.is_ascii_digit());
        if shape_ok && self.name.chars().any(|c| c.is_uppercase()) {
            SymbolKind::NonTerminal
        } else {
            SymbolKind::Terminal
        }
    }

    pub fn is_non_terminal(&self) -> bool {
        self.kind() == SymbolKind::NonTerminal
    }

    pub fn is_terminal(&self) -> bool {
        self.kind() == SymbolKind::Terminal
    }

    pub fn is_epsilon(&self) -> bool {
        self.kind() == SymbolKind::Epsilon
    }
}

impl Display for Symbol {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

pub fn epsilon() -> Symbol {
    Symbol::new(EPSILON)
}
