use indextree::{Arena, NodeEdge, NodeId};
use memchr::memchr2_iter;
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use std::fs::File;
use std::io;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatasetParseError {
    #[error(transparent)]
    IoError(#[from] io::Error),
    #[error(transparent)]
    ParseError(#[from] TreeParseError),
}

#[derive(Error, Debug)]
pub enum TreeParseError {
    #[error("tree string contains non ascii characters")]
    IsNotAscii,
    #[error(transparent)]
    LineReadError(#[from] io::Error),
    #[error("tree string has incorrect bracket notation format: {}", .0)]
    IncorrectFormat(String),
    #[error("label is not present in the dictionary")]
    UnknownLabel,
}

pub type LabelId = i32;

pub type ParsedTree = Arena<LabelId>;

static DICTIONARY_TAG: AtomicU32 = AtomicU32::new(0);

/// Interns label strings to dense ids, in first-seen order.
///
/// Ids are never reassigned; re-inserting a known label returns its prior id.
/// Every dictionary instance carries a process-unique tag so that indexes
/// built from different dictionaries can be told apart.
#[derive(Debug)]
pub struct LabelDictionary {
    map: FxHashMap<String, LabelId>,
    labels: Vec<String>,
    tag: u32,
}

impl Default for LabelDictionary {
    fn default() -> Self {
        Self::new()
    }
}

impl LabelDictionary {
    pub fn new() -> Self {
        Self {
            map: FxHashMap::default(),
            labels: Vec::new(),
            tag: DICTIONARY_TAG.fetch_add(1, Ordering::Relaxed),
        }
    }

    pub fn insert(&mut self, label: &str) -> LabelId {
        if let Some(id) = self.map.get(label) {
            return *id;
        }
        let id = self.labels.len() as LabelId;
        self.map.insert(label.to_owned(), id);
        self.labels.push(label.to_owned());
        id
    }

    pub fn get(&self, label: &str) -> Option<LabelId> {
        self.map.get(label).copied()
    }

    /// Label text for an id handed out by this dictionary.
    pub fn resolve(&self, id: LabelId) -> Option<&str> {
        self.labels.get(id as usize).map(String::as_str)
    }

    pub fn size(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn tag(&self) -> u32 {
        self.tag
    }
}

const TOKEN_START: u8 = b'{';
const TOKEN_END: u8 = b'}';
const ESCAPE_CHAR: u8 = b'\\';

#[inline(always)]
fn is_escaped(byte_string: &[u8], offset: usize) -> bool {
    offset > 0
        && byte_string[offset - 1] == ESCAPE_CHAR
        && !(offset > 1 && byte_string[offset - 2] == ESCAPE_CHAR)
}

/// A structural token of bracket notation. Every opening brace carries the
/// label that follows it; escape characters stay part of the label text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token<'a> {
    Open(&'a str),
    Close,
}

fn braces_parity_check(parity: &mut i32, addorsub: i32) -> Result<(), TreeParseError> {
    *parity += addorsub;
    if *parity < 0 {
        return Err(TreeParseError::IncorrectFormat(
            "Parity of braces does not match".to_owned(),
        ));
    }
    Ok(())
}

/// Checks that unescaped braces are balanced and nested, with at least one pair.
pub fn validate(tree_str: &str) -> bool {
    let tree_bytes = tree_str.as_bytes();
    let mut parity = 0i32;
    let mut pairs = 0usize;
    for pos in memchr2_iter(TOKEN_START, TOKEN_END, tree_bytes) {
        if is_escaped(tree_bytes, pos) {
            continue;
        }
        if tree_bytes[pos] == TOKEN_START {
            parity += 1;
        } else {
            parity -= 1;
            pairs += 1;
            if parity < 0 {
                return false;
            }
        }
    }
    parity == 0 && pairs > 0
}

pub fn parse_tree_tokens(tree_str: &str) -> Result<Vec<Token<'_>>, TreeParseError> {
    use TreeParseError as TPE;

    let tree_bytes = tree_str.as_bytes();
    let token_positions: Vec<usize> = memchr2_iter(TOKEN_START, TOKEN_END, tree_bytes)
        .filter(|char_pos| !is_escaped(tree_bytes, *char_pos))
        .collect();

    if token_positions.len() < 2 {
        return Err(TPE::IncorrectFormat(
            "Minimal of 2 brackets not found!".to_owned(),
        ));
    }

    let mut tokens = Vec::with_capacity(token_positions.len());
    let mut parity_check = 0;

    let mut token_iterator = token_positions.iter().peekable();

    while let Some(token_pos) = token_iterator.next() {
        match tree_bytes[*token_pos] {
            TOKEN_START => {
                braces_parity_check(&mut parity_check, 1)?;
                let Some(token_end) = token_iterator.peek() else {
                    let err_msg = format!("Label has no ending token near col {token_pos}");
                    return Err(TPE::IncorrectFormat(err_msg));
                };
                tokens.push(Token::Open(&tree_str[(token_pos + 1)..**token_end]));
            }
            TOKEN_END => {
                braces_parity_check(&mut parity_check, -1)?;
                tokens.push(Token::Close);
            }
            _ => unreachable!("memchr2 yields only brace positions"),
        }
    }

    if parity_check != 0 {
        return Err(TPE::IncorrectFormat(
            "Parity of braces does not match".to_owned(),
        ));
    }

    Ok(tokens)
}

fn intern_labels(tokens: &[Token<'_>], label_dict: &mut LabelDictionary) {
    for token in tokens {
        if let Token::Open(label) = token {
            label_dict.insert(label);
        }
    }
}

/// Builds the arena tree out of a token stream. All labels must already be
/// interned in the dictionary.
pub fn parse_tree(
    tokens: &[Token<'_>],
    label_dict: &LabelDictionary,
) -> Result<ParsedTree, TreeParseError> {
    let mut tree_arena = ParsedTree::with_capacity(tokens.len() / 2);
    let mut node_stack: Vec<NodeId> = vec![];
    let mut root_seen = false;

    for t in tokens {
        match t {
            Token::Open(label_str) => {
                let Some(label) = label_dict.get(label_str) else {
                    return Err(TreeParseError::UnknownLabel);
                };
                let n = tree_arena.new_node(label);
                if let Some(last_node) = node_stack.last() {
                    last_node.append(n, &mut tree_arena);
                } else if root_seen {
                    return Err(TreeParseError::IncorrectFormat(
                        "More than one tree on a single line".to_owned(),
                    ));
                } else {
                    root_seen = true;
                }
                node_stack.push(n);
            }
            Token::Close => {
                if node_stack.pop().is_none() {
                    return Err(TreeParseError::IncorrectFormat(
                        "Wrong bracket pairing".to_owned(),
                    ));
                }
            }
        }
    }

    if !node_stack.is_empty() {
        return Err(TreeParseError::IncorrectFormat(
            "Reached end of input with unclosed brackets".to_owned(),
        ));
    }

    Ok(tree_arena)
}

/// Parses one tree, interning its labels into the dictionary.
pub fn parse_single(
    tree_str: &str,
    label_dict: &mut LabelDictionary,
) -> Result<ParsedTree, TreeParseError> {
    if !tree_str.is_ascii() {
        return Err(TreeParseError::IsNotAscii);
    }
    let tokens = parse_tree_tokens(tree_str.trim_end())?;
    intern_labels(&tokens, label_dict);
    parse_tree(&tokens, label_dict)
}

/// Parses a file with one tree per line, preserving line positions.
///
/// Malformed lines yield `None` and a diagnostic on stderr; processing
/// continues. Labels of all well-formed lines are interned into the shared
/// dictionary.
pub fn parse_lines(
    dataset_file: &impl AsRef<Path>,
    label_dict: &mut LabelDictionary,
) -> Result<Vec<Option<ParsedTree>>, DatasetParseError> {
    let reader = BufReader::new(File::open(dataset_file)?);
    let tree_lines = reader.lines().collect::<Result<Vec<String>, _>>()?;

    let (sender, receiver) = crossbeam_channel::unbounded::<String>();
    let ld = Arc::new(Mutex::new(label_dict));
    let copy_ld = Arc::clone(&ld);

    let tokenized: Vec<Result<Vec<Token<'_>>, TreeParseError>> = std::thread::scope(|s| {
        s.spawn(move || {
            let mut ld = copy_ld.lock().unwrap();
            while let Ok(label) = receiver.recv() {
                ld.insert(&label);
            }
        });

        tree_lines
            .par_iter()
            .map_with(sender, |s, tree_line| {
                if !tree_line.is_ascii() {
                    return Err(TreeParseError::IsNotAscii);
                }
                let tokens = parse_tree_tokens(tree_line.trim_end())?;
                for token in &tokens {
                    if let Token::Open(label) = token {
                        s.send((*label).to_owned()).expect("Failed sending label");
                    }
                }
                Ok(tokens)
            })
            .collect()
    });

    let label_dict: &LabelDictionary = Arc::try_unwrap(ld)
        .expect("Arc has references")
        .into_inner()
        .unwrap();

    let trees = tokenized
        .into_par_iter()
        .map(|tokens| {
            tokens
                .and_then(|tokens| parse_tree(&tokens, label_dict))
                .ok()
        })
        .collect::<Vec<_>>();

    for (line_no, tree) in trees.iter().enumerate() {
        if tree.is_none() {
            eprintln!(
                "Skipping malformed tree on line {} of {}",
                line_no + 1,
                dataset_file.as_ref().display()
            );
        }
    }

    Ok(trees)
}

/// Renders a tree back into bracket notation. Inverse of [`parse_single`] for
/// canonical inputs (labels keep their escape characters verbatim).
pub fn tree_to_bracket(tree: &ParsedTree, label_dict: &LabelDictionary) -> String {
    let mut bracket_notation = String::with_capacity(tree.count() * 4);
    let Some(root) = tree.iter().next() else {
        return bracket_notation;
    };
    let root_id = tree.get_node_id(root).expect("Root ID not found!");

    for edge in root_id.traverse(tree) {
        match edge {
            NodeEdge::Start(node_id) => {
                bracket_notation.push('{');
                let label = *tree.get(node_id).unwrap().get();
                bracket_notation
                    .push_str(label_dict.resolve(label).expect("label id out of range"));
            }
            NodeEdge::End(_) => {
                bracket_notation.push('}');
            }
        }
    }

    bracket_notation
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_into_tokens() {
        let tokens = parse_tree_tokens("{einsteinstrasse{1}{3}}");
        assert!(tokens.is_ok());
        let tokens = tokens.unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Open("einsteinstrasse"),
                Token::Open("1"),
                Token::Close,
                Token::Open("3"),
                Token::Close,
                Token::Close,
            ]
        );
    }

    #[test]
    fn test_parses_escaped() {
        let tokens = parse_tree_tokens(r"{article{key{An optimization of \{log\} data}}}");
        assert!(tokens.is_ok());
        let tokens = tokens.unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Open("article"),
                Token::Open("key"),
                Token::Open(r"An optimization of \{log\} data"),
                Token::Close,
                Token::Close,
                Token::Close,
            ]
        );
    }

    #[test]
    fn test_parses_into_tree_arena() {
        let mut ld = LabelDictionary::new();
        let tree_arena = parse_single("{einsteinstrasse{1}{3}}", &mut ld).unwrap();

        let mut arena = ParsedTree::new();
        let n1 = arena.new_node(0);
        let n2 = arena.new_node(1);
        let n3 = arena.new_node(2);
        n1.append(n2, &mut arena);
        n1.append(n3, &mut arena);

        assert_eq!(tree_arena, arena);
    }

    #[test]
    fn test_label_ids_are_dense_and_stable() {
        let mut ld = LabelDictionary::new();
        parse_single("{b{e}{d{a}}}", &mut ld).unwrap();
        parse_single("{d{c}{f{g}{d{a}}}}", &mut ld).unwrap();

        assert_eq!(ld.size(), 7);
        assert_eq!(ld.get("b"), Some(0));
        assert_eq!(ld.get("e"), Some(1));
        assert_eq!(ld.get("d"), Some(2));
        assert_eq!(ld.get("a"), Some(3));
        assert_eq!(ld.get("c"), Some(4));
        assert_eq!(ld.get("f"), Some(5));
        assert_eq!(ld.get("g"), Some(6));
        // re-inserting keeps the prior id
        assert_eq!(ld.insert("d"), 2);
        assert_eq!(ld.resolve(2), Some("d"));
    }

    #[test]
    fn test_parses_empty_label() {
        let mut ld = LabelDictionary::new();
        let arena = parse_single("{wendelsteinstrasse{1{{1}{2}{3}{4}{5}{6}{7}{14}}}}", &mut ld);
        assert!(arena.is_ok());
        let arena = arena.unwrap();
        assert_eq!(
            arena.count(),
            11,
            "Parser did not deal with empty label accordingly"
        );
        assert_eq!(ld.get(""), Some(2));
    }

    #[test]
    fn test_rejects_malformed() {
        let mut ld = LabelDictionary::new();
        assert!(parse_single("{a}{b}", &mut ld).is_err(), "two roots");
        assert!(parse_single("{a{b}", &mut ld).is_err(), "unclosed");
        assert!(parse_single("a}}", &mut ld).is_err(), "close before open");
        assert!(parse_single("", &mut ld).is_err(), "empty input");
        assert!(parse_single("nolabels", &mut ld).is_err(), "no brackets");
    }

    #[test]
    fn test_validate() {
        assert!(validate("{a{b}{c}}"));
        assert!(validate("{}"));
        assert!(validate(r"{a\{b}"));
        assert!(!validate("{a{b}"));
        assert!(!validate("}a{"));
        assert!(!validate("plain text"));
    }

    #[test]
    fn test_bracket_round_trip() {
        let mut ld = LabelDictionary::new();
        for input in [
            "{a}",
            "{f{d{a}{c{b}}}{e}}",
            "{}",
            r"{x{a\{esc\}aped}{b}}",
            "{pietro gobetti str.{8}{10}}",
        ] {
            let tree = parse_single(input, &mut ld).unwrap();
            assert_eq!(tree_to_bracket(&tree, &ld), input);
        }
    }
}
