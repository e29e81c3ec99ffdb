use std::collections::{HashSet, VecDeque};

use chartlang::cyk::chart::{tokenize, CykParser};
use chartlang::grammar::grammar::Grammar;
use chartlang::grammar::normalize::normalize;
use chartlang::language::Language;
use chartlang::render::{render_forest, RenderError, RenderedTree, TreeRenderer};
use chartlang::symbol::Symbol;
use chartlang::tree::{DerivationTree, TreeGraph};
use pretty_assertions::assert_eq;

fn cnf(text: &str) -> Grammar {
    normalize(Grammar::from_text(text, None).expect("grammar should parse"))
        .expect("normalization should succeed")
        .grammar
}

#[test]
fn test_balanced_pairs() {
    let grammar = cnf("S -> a S b | a b");
    let parser = CykParser::new(&grammar);

    for word in ["a b", "a a b b", "a a a b b b"] {
        assert!(
            parser.accepts_string(word),
            "'{}' should be accepted, but is not",
            word
        );
    }
    for word in ["a b b", "a", "b a", "a a b", "b"] {
        assert!(
            !parser.accepts_string(word),
            "'{}' should be rejected, but is not",
            word
        );
    }
}

#[test]
fn test_epsilon_shortened_sentence() {
    let grammar = cnf(
        r#"
        S -> A B
        A -> a
        B -> b | ϵ
        "#,
    );
    let parser = CykParser::new(&grammar);
    assert!(parser.accepts_string("a"));
    assert!(parser.accepts_string("a b"));
    assert!(!parser.accepts_string("b"));
}

#[test]
fn test_arithmetic_expression_single_tree() {
    let grammar = cnf(
        r#"
        E -> E + T | T
        T -> T * F | F
        F -> ( E ) | id
        "#,
    );
    let parser = CykParser::new(&grammar);

    let result = parser.parse("id + id");
    assert!(result.accepted);
    assert_eq!(result.forest.len(), 1, "the sentence is unambiguous");
    assert_eq!(result.forest[0].yield_tokens(), tokenize("id + id"));

    let result = parser.parse("( id + id ) * id");
    assert!(result.accepted);
    assert_eq!(result.forest.len(), 1);

    assert!(!parser.parse("id + + id").accepted);
}

#[test]
fn test_ambiguous_sentence_yields_two_trees() {
    // S -> S S | a is already in normal form; "a a a" brackets two ways
    let grammar = cnf("S -> S S | a");
    let parser = CykParser::new(&grammar);

    let result = parser.parse("a a a");
    assert!(result.accepted);
    assert_eq!(result.forest.len(), 2, "both derivations must be produced");
    let first = result.forest[0].to_string();
    let second = result.forest[1].to_string();
    assert_ne!(first, second, "the two trees must be distinct");
    for tree in &result.forest {
        assert_eq!(tree.yield_tokens(), tokenize("a a a"));
    }
}

#[test]
fn test_unknown_token_is_a_plain_rejection() {
    let grammar = cnf("S -> a S b | a b");
    let parser = CykParser::new(&grammar);

    let result = parser.parse("a z b");
    assert!(!result.accepted);
    assert!(result.forest.is_empty());
}

#[test]
fn test_empty_sentence_is_rejected() {
    let grammar = cnf("S -> a S | a");
    let parser = CykParser::new(&grammar);
    assert!(!parser.parse("").accepted);
    assert!(!parser.parse("   ").accepted);
    assert!(!parser.recognize(&[]));
}

/// Post-CNF trees: internal nodes have two non-terminal children, leaf
/// non-terminals exactly one terminal child.
fn assert_tree_shape(tree: &DerivationTree) {
    let mut stack = vec![tree.root()];
    while let Some(id) = stack.pop() {
        let node = tree.node(id);
        match node.children.len() {
            0 => assert!(node.label.is_terminal(), "leaf {} is not a terminal", node.label),
            1 => {
                assert!(node.label.is_non_terminal());
                let child = tree.node(node.children[0]);
                assert!(
                    child.children.is_empty() && child.label.is_terminal(),
                    "unary node {} must wrap a terminal leaf",
                    node.label
                );
            }
            2 => {
                assert!(node.label.is_non_terminal());
                for &child in node.children.iter() {
                    assert!(tree.node(child).label.is_non_terminal());
                    stack.push(child);
                }
            }
            n => panic!("node {} has {} children", node.label, n),
        }
        if node.children.len() == 1 {
            stack.push(node.children[0]);
        }
    }
}

#[test]
fn test_tree_shape_and_root() {
    let grammar = cnf("S -> a S b | a b");
    let parser = CykParser::new(&grammar);

    let result = parser.parse("a a b b");
    assert!(result.accepted);
    for tree in &result.forest {
        assert_eq!(tree.node(tree.root()).label, grammar.start_symbol);
        assert_tree_shape(tree);
        assert_eq!(tree.yield_tokens(), tokenize("a a b b"));
    }
}

#[test]
fn test_tree_graph_description() {
    let grammar = cnf("S -> a b");
    let parser = CykParser::new(&grammar);

    let result = parser.parse("a b");
    assert!(result.accepted);
    assert_eq!(result.forest.len(), 1);

    let graph = result.forest[0].to_graph();
    let tree = &result.forest[0];
    assert_eq!(graph.nodes.len(), tree.node_count());
    assert_eq!(graph.edges.len(), tree.node_count() - 1, "a tree has n - 1 edges");
    for edge in &graph.edges {
        assert!(graph.nodes.iter().any(|node| node.id == edge.from));
        assert!(graph.nodes.iter().any(|node| node.id == edge.to));
    }
}

struct StubRenderer;

impl TreeRenderer for StubRenderer {
    fn render(&self, graph: &TreeGraph, sentence: &str) -> Result<RenderedTree, RenderError> {
        let labels: Vec<&str> = graph.nodes.iter().map(|node| node.label.as_str()).collect();
        Ok(RenderedTree {
            payload: labels.join(",").into_bytes(),
            width: 640.0,
            height: 480.0,
            sentence: sentence.to_string(),
        })
    }
}

#[test]
fn test_render_forest_one_call_per_tree() {
    let grammar = cnf("S -> S S | a");
    let parser = CykParser::new(&grammar);

    let result = parser.parse("a a a");
    let images = render_forest(&StubRenderer, &result.forest, "a a a").unwrap();
    assert_eq!(images.len(), result.forest.len());
    for image in &images {
        assert_eq!(image.sentence, "a a a");
        assert!(!image.payload.is_empty());
    }
}

#[test]
fn test_parser_is_reusable_across_sentences() {
    let grammar = cnf("S -> a S b | a b");
    let parser = CykParser::new(&grammar);
    assert!(parser.parse("a b").accepted);
    assert!(!parser.parse("b a").accepted);
    assert!(parser.parse("a a b b").accepted);
}

/// Brute-force leftmost derivation search over the *original* grammar; body
/// lengths never shrink here, so pruning at the target length is sound.
fn derives(grammar: &Grammar, target: &[Symbol]) -> bool {
    let mut seen: HashSet<Vec<Symbol>> = HashSet::new();
    let mut queue: VecDeque<Vec<Symbol>> = VecDeque::new();
    let start = vec![grammar.start_symbol.clone()];
    seen.insert(start.clone());
    queue.push_back(start);

    while let Some(form) = queue.pop_front() {
        if form.len() > target.len() {
            continue;
        }
        if form.iter().all(|symbol| symbol.is_terminal()) {
            if form == target {
                return true;
            }
            continue;
        }
        let position = form
            .iter()
            .position(|symbol| symbol.is_non_terminal())
            .unwrap();
        let Some(bodies) = grammar.productions.get(&form[position]) else {
            continue;
        };
        for body in bodies {
            let mut next: Vec<Symbol> = Vec::with_capacity(form.len() + body.len());
            next.extend_from_slice(&form[..position]);
            next.extend(body.iter().filter(|s| !s.is_epsilon()).cloned());
            next.extend_from_slice(&form[position + 1..]);
            if seen.insert(next.clone()) {
                queue.push_back(next);
            }
        }
    }
    false
}

#[test]
fn test_agreement_with_reference_recognizer() {
    let text = "S -> a S b | a b";
    let original = Grammar::from_text(text, None).unwrap();
    let grammar = cnf(text);
    let parser = CykParser::new(&grammar);

    // every sentence over {a, b} up to length 4
    let alphabet = ["a", "b"];
    for length in 1..=4usize {
        for index in 0..alphabet.len().pow(length as u32) {
            let mut tokens = Vec::with_capacity(length);
            let mut rest = index;
            for _ in 0..length {
                tokens.push(Symbol::new(alphabet[rest % alphabet.len()]));
                rest /= alphabet.len();
            }
            assert_eq!(
                parser.recognize(&tokens),
                derives(&original, &tokens),
                "CYK and the reference recognizer disagree on {:?}",
                tokens
            );
        }
    }
}
