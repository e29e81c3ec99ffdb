use hashbrown::{HashMap, HashSet};
use tracing::{debug, warn};

use crate::error::GrammarError;
use crate::grammar::grammar::{is_epsilon_body, is_unit_body, Body, Grammar};
use crate::symbol::Symbol;

/// A grammar frozen in Chomsky Normal Form, plus what normalization learned
/// on the way there. The grammar is meant to be shared read-only with any
/// number of concurrent CYK invocations afterwards.
#[derive(Debug, Clone)]
pub struct Normalized {
    pub grammar: Grammar,
    /// True when the nullable fixpoint was abandoned by the bounded-iteration
    /// guard; epsilon elimination then dropped derivations to terminate.
    pub lossy_epsilon: bool,
    /// Whether the original start symbol could derive the empty string. The
    /// normalized table cannot express the empty derivation and the chart
    /// engine rejects empty sentences, so callers that care must consult
    /// this flag themselves.
    pub start_nullable: bool,
}

/// Runs the four normalization passes over `grammar` and freezes the result.
pub fn normalize(grammar: Grammar) -> Result<Normalized, GrammarError> {
    Normalizer::new(grammar).run()
}

/// Owns a grammar for the duration of one normalization run, together with
/// the single monotonic counter all fresh names are drawn from.
pub struct Normalizer {
    pub grammar: Grammar,
    counter: usize,
    lossy_epsilon: bool,
    start_nullable: bool,
}

impl Normalizer {
    pub fn new(grammar: Grammar) -> Self {
        Normalizer {
            grammar,
            counter: 0,
            lossy_epsilon: false,
            start_nullable: false,
        }
    }

    /// Epsilon, unit, useless, then binarization; indices are rebuilt
    /// between passes because each pass rewrites the table destructively.
    pub fn run(mut self) -> Result<Normalized, GrammarError> {
        self.grammar.recompute_indices();
        self.eliminate_epsilon();
        self.grammar.recompute_indices();
        self.eliminate_unit_productions();
        self.eliminate_useless_symbols()?;
        self.isolate_terminals()?;
        self.grammar.recompute_indices();
        self.decompose_long_bodies()?;
        self.grammar.recompute_indices();
        debug!(
            rules = self.grammar.productions.len(),
            lossy = self.lossy_epsilon,
            "normalization finished"
        );
        Ok(Normalized {
            grammar: self.grammar,
            lossy_epsilon: self.lossy_epsilon,
            start_nullable: self.start_nullable,
        })
    }

    fn next_fresh_symbol(&mut self) -> Result<Symbol, GrammarError> {
        let symbol = self.grammar.fresh_symbol(self.counter)?;
        self.counter += 1;
        Ok(symbol)
    }

    /// Removes epsilon bodies while preserving the language. For every body
    /// containing nullable symbols, every variant obtained by deleting a
    /// subset of those occurrences is added; empty variants propagate
    /// nullability instead of becoming bodies. Start-symbol nullability is
    /// recorded for `Normalized::start_nullable` — the empty sentence is not
    /// representable in the table and stays unsupported at parse time.
    pub fn eliminate_epsilon(&mut self) {
        let (nullable, converged) = self.grammar.compute_nullable();
        self.start_nullable = nullable.contains(&self.grammar.start_symbol);

        if converged {
            let mut expanded: HashMap<Symbol, HashSet<Body>> =
                HashMap::with_capacity(self.grammar.productions.len());
            for (head, bodies) in &self.grammar.productions {
                let mut new_bodies = HashSet::new();
                for body in bodies {
                    for variant in body_without_nullable(body, &nullable) {
                        if !variant.is_empty() {
                            new_bodies.insert(variant);
                        }
                    }
                }
                expanded.insert(head.clone(), new_bodies);
            }
            self.grammar.productions = expanded;
        } else {
            // Guard fired: keep the table as-is and only strip the marker
            // bodies below. Completeness is sacrificed for termination.
            warn!("nullable fixpoint abandoned early; epsilon elimination is lossy");
            self.lossy_epsilon = true;
        }

        for bodies in self.grammar.productions.values_mut() {
            bodies.retain(|body| !is_epsilon_body(body));
        }
        self.grammar.nullable = nullable;
    }

    /// Removes unit (single non-terminal) bodies by substitution: for every
    /// pair `(A, B)` reachable through chains of unit bodies, `A` receives
    /// all of `B`'s non-unit bodies. The table is replaced wholesale.
    pub fn eliminate_unit_productions(&mut self) {
        let mut unit_targets: HashMap<Symbol, HashSet<Symbol>> = HashMap::new();
        for (head, bodies) in &self.grammar.productions {
            for body in bodies {
                if is_unit_body(body) {
                    unit_targets
                        .entry(head.clone())
                        .or_default()
                        .insert(body[0].clone());
                }
            }
        }

        // Reflexive seeds, expanded by worklist; the visited set makes
        // cyclic unit chains terminate.
        let mut unit_pairs: HashSet<(Symbol, Symbol)> = self
            .grammar
            .productions
            .keys()
            .map(|head| (head.clone(), head.clone()))
            .collect();
        let mut to_process: Vec<(Symbol, Symbol)> = unit_pairs.iter().cloned().collect();
        while let Some((head, target)) = to_process.pop() {
            let Some(next_targets) = unit_targets.get(&target) else {
                continue;
            };
            for next in next_targets {
                let pair = (head.clone(), next.clone());
                if unit_pairs.insert(pair.clone()) {
                    to_process.push(pair);
                }
            }
        }

        let mut new_productions: HashMap<Symbol, HashSet<Body>> = self
            .grammar
            .productions
            .keys()
            .map(|head| (head.clone(), HashSet::new()))
            .collect();
        for (head, target) in &unit_pairs {
            let Some(bodies) = self.grammar.productions.get(target) else {
                continue;
            };
            let slot = new_productions
                .get_mut(head)
                .expect("unit pair heads are production keys");
            for body in bodies {
                if !is_unit_body(body) {
                    slot.insert(body.clone());
                }
            }
        }
        self.grammar.productions = new_productions;
    }

    /// Deletes non-generating symbols, then symbols unreachable from the
    /// start symbol. The generating set is a least-fixpoint closure computed
    /// once, before the structural deletions; a body proven generating by
    /// the closure only mentions symbols the deletions keep, so no second
    /// analysis round is required.
    pub fn eliminate_useless_symbols(&mut self) -> Result<(), GrammarError> {
        self.grammar.recompute_indices();

        let mut generating: HashSet<Symbol> = HashSet::new();
        let mut changed = true;
        while changed {
            changed = false;
            for (head, bodies) in &self.grammar.productions {
                if generating.contains(head) {
                    continue;
                }
                let produces = bodies.iter().any(|body| {
                    body.iter()
                        .all(|symbol| symbol.is_terminal() || generating.contains(symbol))
                });
                if produces {
                    generating.insert(head.clone());
                    changed = true;
                }
            }
        }

        self.grammar
            .productions
            .retain(|head, _| generating.contains(head));
        for bodies in self.grammar.productions.values_mut() {
            bodies.retain(|body| {
                body.iter()
                    .all(|symbol| symbol.is_terminal() || generating.contains(symbol))
            });
        }

        let start = self.grammar.start_symbol.clone();
        if self
            .grammar
            .productions
            .get(&start)
            .map_or(true, |bodies| bodies.is_empty())
        {
            return Err(GrammarError::EmptyLanguage { start: start.name });
        }

        self.grammar.recompute_indices();
        let mut reachable: HashSet<Symbol> = HashSet::new();
        reachable.insert(start.clone());
        let mut stack = vec![start];
        while let Some(symbol) = stack.pop() {
            let Some(neighbors) = self.grammar.adjacency.get(&symbol) else {
                continue;
            };
            for next in neighbors {
                if next.is_non_terminal() && reachable.insert(next.clone()) {
                    stack.push(next.clone());
                }
            }
        }
        self.grammar
            .productions
            .retain(|head, _| reachable.contains(head));
        self.grammar.recompute_indices();
        Ok(())
    }

    /// Replaces every terminal occurring inside a body of length > 1 with a
    /// fresh non-terminal deriving exactly that terminal. Each distinct
    /// terminal gets one proxy, reused across all its occurrences.
    pub fn isolate_terminals(&mut self) -> Result<(), GrammarError> {
        let table = std::mem::take(&mut self.grammar.productions);
        let mut proxies: HashMap<Symbol, Symbol> = HashMap::new();
        let mut proxy_rules: Vec<(Symbol, Symbol)> = Vec::new();
        let mut new_table: HashMap<Symbol, HashSet<Body>> = HashMap::with_capacity(table.len());

        for (head, bodies) in &table {
            let mut new_bodies = HashSet::new();
            for body in bodies {
                if body.len() <= 1 {
                    new_bodies.insert(body.clone());
                    continue;
                }
                let mut new_body = Body::with_capacity(body.len());
                for symbol in body {
                    if !symbol.is_terminal() {
                        new_body.push(symbol.clone());
                        continue;
                    }
                    let proxy = match proxies.get(symbol) {
                        Some(existing) => existing.clone(),
                        None => {
                            let fresh = self.next_fresh_symbol()?;
                            proxies.insert(symbol.clone(), fresh.clone());
                            proxy_rules.push((fresh.clone(), symbol.clone()));
                            fresh
                        }
                    };
                    new_body.push(proxy);
                }
                new_bodies.insert(new_body);
            }
            new_table.insert(head.clone(), new_bodies);
        }

        for (proxy, terminal) in proxy_rules {
            new_table.entry(proxy).or_default().insert(vec![terminal]);
        }
        self.grammar.productions = new_table;
        Ok(())
    }

    /// Right-folds every body `X1 X2 ... Xk` with `k > 2` into a chain
    /// `A -> X1 C1`, `C1 -> X2 C2`, ..., `Ck-2 -> Xk-1 Xk`. Chain links come
    /// from the run-wide counter, so links of different bodies never clash.
    pub fn decompose_long_bodies(&mut self) -> Result<(), GrammarError> {
        let table = std::mem::take(&mut self.grammar.productions);
        let mut new_table: HashMap<Symbol, HashSet<Body>> = HashMap::with_capacity(table.len());

        for (head, bodies) in table {
            for body in bodies {
                if body.len() <= 2 {
                    new_table.entry(head.clone()).or_default().insert(body);
                    continue;
                }
                let mut chain_head = head.clone();
                for symbol in &body[..body.len() - 2] {
                    let link = self.next_fresh_symbol()?;
                    new_table
                        .entry(chain_head)
                        .or_default()
                        .insert(vec![symbol.clone(), link.clone()]);
                    chain_head = link;
                }
                new_table
                    .entry(chain_head)
                    .or_default()
                    .insert(body[body.len() - 2..].to_vec());
            }
        }
        self.grammar.productions = new_table;
        Ok(())
    }
}

/// Generates every variant of `body` obtained by deleting any subset of its
/// nullable occurrences; non-nullable symbols keep their order and count.
fn body_without_nullable(body: &[Symbol], nullable: &HashSet<Symbol>) -> Vec<Body> {
    match body.iter().position(|symbol| nullable.contains(symbol)) {
        Some(index) => {
            let tails = body_without_nullable(&body[index + 1..], nullable);
            let mut variants = Vec::with_capacity(tails.len() * 2);
            let mut prefix = body[..index].to_vec();
            // drop the nullable occurrence
            for tail in &tails {
                let mut variant = prefix.clone();
                variant.extend(tail.iter().cloned());
                variants.push(variant);
            }
            // keep it
            prefix.push(body[index].clone());
            for tail in &tails {
                let mut variant = prefix.clone();
                variant.extend(tail.iter().cloned());
                variants.push(variant);
            }
            variants
        }
        None => vec![body.to_vec()],
    }
}
