use super::error::TreeError;
use super::node::NodeId;
use super::tree::Tree;
use nom::{
    branch::alt,
    bytes::complete::{is_not, take_while},
    character::complete::{char, digit1, multispace0},
    combinator::{cut, map, map_res, opt, recognize},
    error::{context, ContextError, ErrorKind, FromExternalError, ParseError},
    multi::{many1, separated_list1},
    sequence::{delimited, preceded},
    IResult, Offset, Parser,
};
use std::collections::BTreeMap;

// ================================================================================================
// Error Handling Structures
// ================================================================================================

#[derive(Clone, Debug, PartialEq)]
pub enum DetailedErrorKind {
    Context(&'static str),
    Nom(ErrorKind),
}

/// A custom error type for nom that accumulates context and error kinds,
/// so failures report what was being parsed and where.
#[derive(Clone, Debug, PartialEq)]
pub struct DetailedError<'a> {
    pub errors: Vec<(&'a str, DetailedErrorKind)>,
}

impl<'a> ParseError<&'a str> for DetailedError<'a> {
    fn from_error_kind(input: &'a str, kind: ErrorKind) -> Self {
        DetailedError {
            errors: vec![(input, DetailedErrorKind::Nom(kind))],
        }
    }

    fn append(input: &'a str, kind: ErrorKind, mut other: Self) -> Self {
        other.errors.push((input, DetailedErrorKind::Nom(kind)));
        other
    }
}

impl<'a> ContextError<&'a str> for DetailedError<'a> {
    fn add_context(input: &'a str, ctx: &'static str, mut other: Self) -> Self {
        other.errors.push((input, DetailedErrorKind::Context(ctx)));
        other
    }
}

impl<'a, E> FromExternalError<&'a str, E> for DetailedError<'a> {
    fn from_external_error(input: &'a str, kind: ErrorKind, _e: E) -> Self {
        DetailedError {
            errors: vec![(input, DetailedErrorKind::Nom(kind))],
        }
    }
}

// ================================================================================================
// Intermediate Structure
// ================================================================================================

/// `ParsedNode` is a temporary recursive structure used during parsing.
///
/// Parsing a recursive format like Newick is easiest into a recursive data
/// type; the final `Tree` uses an arena (flat vector) instead. After parsing
/// completes, `to_tree` converts one into the other.
#[derive(Debug)]
struct ParsedNode {
    name: Option<String>,
    length: Option<f64>,
    properties: Option<BTreeMap<String, String>>, // NHX tags: [&&NHX:key=value]
    children: Vec<ParsedNode>,
}

impl ParsedNode {
    fn new() -> Self {
        Self {
            name: None,
            length: None,
            properties: None,
            children: Vec::new(),
        }
    }

    /// Converts this recursive `ParsedNode` into nodes in the provided `Tree`
    /// arena. Returns the `NodeId` of the created node.
    fn to_tree(self, tree: &mut Tree) -> NodeId {
        let id = tree.add_node();
        for child in self.children {
            let child_id = child.to_tree(tree);
            // The unwrap is safe because `id` was just created.
            tree.add_child(id, child_id).unwrap();
        }
        if let Some(node) = tree.get_node_mut(id) {
            node.name = self.name;
            node.length = self.length;
            node.properties = self.properties;
        }
        id
    }
}

// ================================================================================================
// Parsers
// ================================================================================================

// 1. Whitespace eater.
// Wraps another parser and ignores surrounding whitespace, making the
// grammar robust against formatting variations (multi-line trees etc.).
fn ws<'a, F, O, E>(inner: F) -> impl Parser<&'a str, Output = O, Error = E>
where
    F: Parser<&'a str, Output = O, Error = E>,
    E: ParseError<&'a str>,
{
    delimited(multispace0, inner, multispace0)
}

// 2. Label.
// Supports:
// - Unquoted strings (stops at reserved chars: "():;,[]")
// - Single quoted strings ('Homo sapiens'), '' escapes a quote
// - Double quoted strings ("Homo sapiens"), "" escapes a quote
fn parse_label(input: &str) -> IResult<&str, String, DetailedError<'_>> {
    let unquoted = map(
        take_while(|c: char| !"():;,[]".contains(c)),
        |s: &str| s.trim().to_string(),
    );

    let single_quoted = delimited(
        char('\''),
        map(is_not("'"), |s: &str| s.replace("''", "'")),
        char('\''),
    );

    let double_quoted = delimited(
        char('"'),
        map(is_not("\""), |s: &str| s.replace("\"\"", "\"")),
        char('"'),
    );

    context("label", alt((single_quoted, double_quoted, unquoted))).parse(input)
}

// 3. Length.
// Branch length follows a colon (e.g., ":0.123"); supports scientific
// notation. `cut` prevents backtracking once a ':' has been seen, so the
// error message says "expected float" instead of trying other branches.
fn parse_length(input: &str) -> IResult<&str, f64, DetailedError<'_>> {
    context(
        "length",
        preceded(
            ws(char(':')),
            cut(map_res(
                recognize((
                    opt(char('-')),
                    digit1,
                    opt((char('.'), digit1)),
                    opt((
                        alt((char('e'), char('E'))),
                        opt(alt((char('+'), char('-')))),
                        digit1,
                    )),
                )),
                |s: &str| s.parse::<f64>(),
            )),
        ),
    )
    .parse(input)
}

// 4. Comment.
// Parses bracketed comments. NHX (New Hampshire eXtended) comments carry
// per-node properties ([&&NHX:S=human:D=Y]) and are returned as a map;
// plain comments are ignored.
fn parse_comment(
    input: &str,
) -> IResult<&str, Option<BTreeMap<String, String>>, DetailedError<'_>> {
    let comment_content = delimited(ws(char('[')), is_not("]"), char(']'));

    context(
        "comment",
        map(opt(comment_content), |content: Option<&str>| {
            if let Some(s) = content {
                if s.starts_with("&&NHX") {
                    let mut props = BTreeMap::new();
                    for part in s.split(':') {
                        if part == "&&NHX" {
                            continue;
                        }
                        if let Some((k, v)) = part.split_once('=') {
                            props.insert(k.to_string(), v.to_string());
                        }
                    }
                    if !props.is_empty() {
                        return Some(props);
                    }
                }
            }
            None
        }),
    )
    .parse(input)
}

// 5. Subtree.
// Recursive parser for a node and its children.
// General Newick structure: (child1, child2, ...)Label:Length[Comment]
fn parse_subtree(input: &str) -> IResult<&str, ParsedNode, DetailedError<'_>> {
    let (input, children) = context(
        "children",
        opt(delimited(
            ws(char('(')),
            separated_list1(ws(char(',')), parse_subtree),
            ws(char(')')),
        )),
    )
    .parse(input)?;

    let (input, label) = opt(parse_label).parse(input)?;

    // Newick allows comments before or after length, so parse both.
    let (input, comment1) = parse_comment(input)?;
    let (input, length) = opt(parse_length).parse(input)?;
    let (input, comment2) = parse_comment(input)?;

    let mut node = ParsedNode::new();
    if let Some(c) = children {
        node.children = c;
    }
    if let Some(l) = label {
        if !l.is_empty() {
            node.name = Some(l);
        }
    }
    node.length = length;

    if comment1.is_some() || comment2.is_some() {
        let mut props = BTreeMap::new();
        if let Some(p) = comment1 {
            props.extend(p);
        }
        if let Some(p) = comment2 {
            props.extend(p);
        }
        node.properties = Some(props);
    }

    Ok((input, node))
}

// ================================================================================================
// Entry Points
// ================================================================================================

/// Parses a single Newick tree string. Expects a terminating ';'.
pub fn parse_newick(input: &str) -> Result<Tree, TreeError> {
    let mut parser = (ws(parse_subtree), ws(char(';')));

    match parser.parse(input) {
        Ok((_, (root_node, _))) => {
            let mut tree = Tree::new();
            let root_id = root_node.to_tree(&mut tree);
            tree.set_root(root_id);
            Ok(tree)
        }
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => Err(make_tree_error(input, e)),
        Err(nom::Err::Incomplete(_)) => Err(TreeError::ParseError {
            message: "Incomplete input".to_string(),
            line: 0,
            column: 0,
            snippet: "".to_string(),
        }),
    }
}

/// Parses a string containing multiple Newick trees (one per ';').
/// Top-level bracketed blocks (e.g. Nexus-style headers) are skipped.
pub fn parse_newick_multi(input: &str) -> Result<Vec<Tree>, TreeError> {
    let valid_tree = map((ws(parse_subtree), ws(char(';'))), |(root, _)| Some(root));

    let garbage = map(
        ws(delimited(char('['), take_while(|c| c != ']'), char(']'))),
        |_| None,
    );

    let mut parser = many1(alt((valid_tree, garbage)));

    match parser.parse(input) {
        Ok((_, trees_data)) => {
            let mut trees = Vec::new();
            for root_opt in trees_data {
                if let Some(root_node) = root_opt {
                    let mut tree = Tree::new();
                    let root_id = root_node.to_tree(&mut tree);
                    tree.set_root(root_id);
                    trees.push(tree);
                }
            }
            Ok(trees)
        }
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => Err(make_tree_error(input, e)),
        Err(nom::Err::Incomplete(_)) => Err(TreeError::ParseError {
            message: "Incomplete input".to_string(),
            line: 0,
            column: 0,
            snippet: "".to_string(),
        }),
    }
}

// Helper to convert nom errors into friendly TreeError
fn make_tree_error(input: &str, e: DetailedError) -> TreeError {
    let (remaining, _) = e.errors.first().unwrap();
    let offset = input.offset(remaining);

    // Calculate line/col
    let prefix = &input[..offset];
    let line = prefix.chars().filter(|&c| c == '\n').count() + 1;
    let last_newline = prefix.rfind('\n').map(|p| p + 1).unwrap_or(0);
    let column = offset - last_newline + 1;

    let mut msg = String::new();
    for (_, kind) in e.errors.iter().rev() {
        match kind {
            DetailedErrorKind::Context(ctx) => {
                msg.push_str(&format!("while parsing {}:\n", ctx));
            }
            DetailedErrorKind::Nom(k) => {
                msg.push_str(&format!("  error: {:?}\n", k));
            }
        }
    }

    TreeError::ParseError {
        message: msg,
        line,
        column,
        snippet: remaining.chars().take(50).collect(),
    }
}

impl Tree {
    /// Parse a Newick string into a Tree.
    ///
    /// # Example
    /// ```
    /// use pnj::libs::phylo::tree::Tree;
    ///
    /// let tree = Tree::from_newick("(A:0.1,B:0.2)Root;").unwrap();
    /// assert_eq!(tree.len(), 3);
    ///
    /// assert!(Tree::from_newick("(A,B:invalid)C;").is_err());
    /// ```
    pub fn from_newick(input: &str) -> Result<Self, TreeError> {
        parse_newick(input)
    }

    pub fn from_newick_multi(input: &str) -> Result<Vec<Self>, TreeError> {
        parse_newick_multi(input)
    }
}
