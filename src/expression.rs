//! Filter expression grammar, parser and compiler
//!
//! Ignore rules are small boolean expressions over the three strings of a
//! [`FileRecord`], parsed one per line from an `ignore` file:
//!
//! ```text
//! Or        := And ('||' And)*
//! And       := Unit ('&&' Unit)*
//! Unit      := Delimited | Matcher
//! Delimited := '(' Or ')' | '[' Or ']' | '{' Or '}' | '<' Or '>' | '"' Or '"' | "'" Or "'"
//! Matcher   := [Subject] Kind Pattern
//! ```
//!
//! `Subject` is one of `absolute:`, `relative:`, `filename:` and may be
//! omitted (forced to `absolute:`) for the three kinds that do not look at a
//! path string: `symbolic-link`, `max-size:`, `has-sibling:`. A pattern runs
//! verbatim from the character after its kind prefix to the next structural
//! token of the enclosing context (`&&`, `||` or the closing bracket), so it
//! may contain spaces; it must be non-empty for every kind except
//! `symbolic-link`, which must have none.
//!
//! Parsing is recursive descent. Every node records its byte span in the
//! original rule text so that syntax errors and trailing garbage are reported
//! with exact offsets. [`FilterExpression::matcher`] compiles a parsed node
//! into a boxed predicate over [`FileRecord`]; `max-size:` and `has-sibling:`
//! consult the filesystem lazily, which is why the predicate returns a
//! `Result`.

use crate::error::{Result, ShadowError};
use crate::record::FileRecord;
use regex::Regex;
use std::fs;

/// The string of a [`FileRecord`] a matcher compares against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Subject {
    /// The directory-suffixed absolute path
    Absolute,
    /// The directory-suffixed tree-relative path
    Relative,
    /// The directory-suffixed filename
    Filename,
}

impl Subject {
    const ALL: [Subject; 3] = [Subject::Absolute, Subject::Relative, Subject::Filename];

    /// The prefix token introducing this subject in rule text
    pub fn prefix(self) -> &'static str {
        match self {
            Subject::Absolute => "absolute:",
            Subject::Relative => "relative:",
            Subject::Filename => "filename:",
        }
    }

    fn pick(self, file: &FileRecord) -> &str {
        match self {
            Subject::Absolute => &file.absolute,
            Subject::Relative => &file.relative,
            Subject::Filename => &file.filename,
        }
    }
}

/// The comparison a matcher performs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    /// Exact string equality
    Equals,
    /// String suffix test
    EndWith,
    /// Regular expression, find semantics (matches anywhere)
    Regex,
    /// The entry is a symbolic link; takes no pattern
    SymbolicLink,
    /// The entry is not a directory and larger than the pattern in bytes
    MaxSize,
    /// A path equal to the pattern exists next to the entry
    HasSibling,
}

impl MatchKind {
    const ALL: [MatchKind; 6] = [
        MatchKind::Equals,
        MatchKind::EndWith,
        MatchKind::Regex,
        MatchKind::SymbolicLink,
        MatchKind::MaxSize,
        MatchKind::HasSibling,
    ];

    /// The prefix token introducing this kind in rule text
    pub fn prefix(self) -> &'static str {
        match self {
            MatchKind::Equals => "equals:",
            MatchKind::EndWith => "end-with:",
            MatchKind::Regex => "reg-ex:",
            MatchKind::SymbolicLink => "symbolic-link",
            MatchKind::MaxSize => "max-size:",
            MatchKind::HasSibling => "has-sibling:",
        }
    }
}

/// The boolean connectives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    /// Both operands must match; binds tighter than `Or`
    And,
    /// Either operand may match
    Or,
}

/// A compiled ignore predicate
pub type MatcherFn = Box<dyn Fn(&FileRecord) -> Result<bool>>;

/// A parsed filter rule
///
/// A sum of the three node shapes the grammar produces. Each node carries its
/// byte span in the original rule text.
#[derive(Debug, Clone)]
pub enum FilterExpression {
    /// A leaf comparison
    Matcher {
        /// Byte offset of the first character of the node
        start: usize,
        /// Byte offset one past the last character of the node
        end: usize,
        /// Which record string is compared
        subject: Subject,
        /// How it is compared
        kind: MatchKind,
        /// The comparison operand, verbatim from the rule text
        pattern: String,
        /// Byte offset where the pattern starts, for error reporting
        pattern_start: usize,
    },
    /// An `&&` or `||` combination
    Binary {
        /// Byte offset of the first character of the node
        start: usize,
        /// Byte offset one past the last character of the node
        end: usize,
        /// The connective
        operator: Operator,
        /// Left operand
        left: Box<FilterExpression>,
        /// Right operand
        right: Box<FilterExpression>,
    },
    /// A bracketed sub-expression; transparent to evaluation and indexing
    Delimited {
        /// Byte offset of the first character of the node
        start: usize,
        /// Byte offset one past the last character of the node
        end: usize,
        /// The wrapped expression
        inner: Box<FilterExpression>,
    },
}

/// The bracket pairs accepted around a sub-expression
const DELIMITERS: [(u8, &str); 6] = [
    (b'(', ")"),
    (b'[', "]"),
    (b'{', "}"),
    (b'<', ">"),
    (b'"', "\""),
    (b'\'', "'"),
];

impl FilterExpression {
    /// Parse one complete rule line
    ///
    /// Fails with [`ShadowError::TrailingInput`] if characters remain after
    /// the expression, and with the specific syntax error otherwise.
    pub fn parse(code: &str) -> Result<FilterExpression> {
        let expression = parse_or(code, 0, &[])?;
        if expression.end() != code.len() {
            return Err(ShadowError::TrailingInput {
                offset: expression.end(),
                expression: code.to_string(),
            });
        }
        Ok(expression)
    }

    /// Byte offset of the first character of this node
    pub fn start(&self) -> usize {
        match self {
            FilterExpression::Matcher { start, .. }
            | FilterExpression::Binary { start, .. }
            | FilterExpression::Delimited { start, .. } => *start,
        }
    }

    /// Byte offset one past the last character of this node
    pub fn end(&self) -> usize {
        match self {
            FilterExpression::Matcher { end, .. }
            | FilterExpression::Binary { end, .. }
            | FilterExpression::Delimited { end, .. } => *end,
        }
    }

    /// The exact-match key this expression can be indexed under, if any
    ///
    /// An expression is indexable iff it is an `equals:` matcher, or an `&&`
    /// whose left or right side is indexable (left tried first). `||` and
    /// every other leaf kind are never indexable. The key identifies a bucket
    /// (by subject) and the exact string to file the whole predicate under.
    pub fn index_key(&self) -> Option<(Subject, &str)> {
        match self {
            FilterExpression::Matcher {
                subject,
                kind: MatchKind::Equals,
                pattern,
                ..
            } => Some((*subject, pattern)),
            FilterExpression::Matcher { .. } => None,
            FilterExpression::Binary {
                operator: Operator::And,
                left,
                right,
                ..
            } => left.index_key().or_else(|| right.index_key()),
            FilterExpression::Binary { .. } => None,
            FilterExpression::Delimited { inner, .. } => inner.index_key(),
        }
    }

    /// Compile this expression into a predicate over [`FileRecord`]
    ///
    /// Regular expressions and size limits are compiled here, so a bad
    /// `reg-ex:` or `max-size:` pattern fails the load, not the traversal.
    pub fn matcher(&self) -> Result<MatcherFn> {
        match self {
            FilterExpression::Delimited { inner, .. } => inner.matcher(),
            FilterExpression::Binary {
                operator,
                left,
                right,
                ..
            } => {
                let left = left.matcher()?;
                let right = right.matcher()?;
                Ok(match operator {
                    Operator::And => {
                        Box::new(move |file: &FileRecord| Ok(left(file)? && right(file)?))
                    }
                    Operator::Or => {
                        Box::new(move |file: &FileRecord| Ok(left(file)? || right(file)?))
                    }
                })
            }
            FilterExpression::Matcher {
                subject,
                kind,
                pattern,
                pattern_start,
                ..
            } => compile_matcher(*subject, *kind, pattern, *pattern_start),
        }
    }
}

fn compile_matcher(
    subject: Subject,
    kind: MatchKind,
    pattern: &str,
    pattern_start: usize,
) -> Result<MatcherFn> {
    match kind {
        MatchKind::Equals => {
            let pattern = pattern.to_string();
            Ok(Box::new(move |file| Ok(subject.pick(file) == pattern)))
        }
        MatchKind::EndWith => {
            let pattern = pattern.to_string();
            Ok(Box::new(move |file| {
                Ok(subject.pick(file).ends_with(&pattern))
            }))
        }
        MatchKind::Regex => {
            let regex = Regex::new(pattern).map_err(|err| {
                ShadowError::invalid_pattern(pattern_start, pattern, err.to_string())
            })?;
            Ok(Box::new(move |file| Ok(regex.is_match(subject.pick(file)))))
        }
        MatchKind::SymbolicLink => Ok(Box::new(|file| Ok(file.absolute_path.is_symlink()))),
        MatchKind::MaxSize => {
            let max_size: u64 = pattern.parse().map_err(|_| {
                ShadowError::invalid_pattern(pattern_start, pattern, "not a byte count")
            })?;
            Ok(Box::new(move |file| {
                if file.is_directory {
                    return Ok(false);
                }
                Ok(fs::metadata(&file.absolute_path)?.len() > max_size)
            }))
        }
        MatchKind::HasSibling => {
            let sibling = pattern.to_string();
            Ok(Box::new(move |file| {
                Ok(match file.absolute_path.parent() {
                    Some(parent) => parent.join(&sibling).exists(),
                    None => false,
                })
            }))
        }
    }
}

fn starts_with_at(code: &str, token: &str, offset: usize) -> bool {
    offset <= code.len() && code.as_bytes()[offset..].starts_with(token.as_bytes())
}

/// First offset at or after `start` holding neither a space nor a tab
fn non_space(code: &str, start: usize) -> usize {
    let bytes = code.as_bytes();
    let mut i = start;
    while i < bytes.len() && (bytes[i] == b' ' || bytes[i] == b'\t') {
        i += 1;
    }
    i
}

/// Offset of the first end token at or after `start`, or the end of input
///
/// With no end tokens (a bare top-level matcher) the pattern runs to the end
/// of the line. Token starts are ASCII, so bytewise scanning is sound.
fn find_end_of_pattern(code: &str, start: usize, end_tokens: &[&str]) -> usize {
    if end_tokens.is_empty() {
        return code.len();
    }
    let bytes = code.as_bytes();
    let mut i = start;
    while i < bytes.len() {
        for token in end_tokens {
            if bytes[i..].starts_with(token.as_bytes()) {
                return i;
            }
        }
        i += 1;
    }
    code.len()
}

fn parse_or(code: &str, start: usize, end_tokens: &[&str]) -> Result<FilterExpression> {
    let mut tokens = end_tokens.to_vec();
    tokens.push("||");
    let mut left = parse_and(code, start, &tokens)?;
    let mut operator = left.end();
    while starts_with_at(code, "||", operator) {
        let right = parse_and(code, operator + 2, &tokens)?;
        let end = right.end();
        left = FilterExpression::Binary {
            start,
            end,
            operator: Operator::Or,
            left: Box::new(left),
            right: Box::new(right),
        };
        operator = non_space(code, end);
    }
    Ok(left)
}

fn parse_and(code: &str, start: usize, end_tokens: &[&str]) -> Result<FilterExpression> {
    let mut tokens = end_tokens.to_vec();
    tokens.push("&&");
    let mut left = parse_unit(code, start, &tokens)?;
    let mut operator = left.end();
    while starts_with_at(code, "&&", operator) {
        let right = parse_unit(code, operator + 2, &tokens)?;
        let end = right.end();
        left = FilterExpression::Binary {
            start,
            end,
            operator: Operator::And,
            left: Box::new(left),
            right: Box::new(right),
        };
        operator = non_space(code, end);
    }
    Ok(left)
}

fn parse_unit(code: &str, start: usize, end_tokens: &[&str]) -> Result<FilterExpression> {
    if let Some(delimited) = parse_delimited(code, start)? {
        return Ok(delimited);
    }
    parse_matcher(code, start, end_tokens)
}

fn parse_delimited(code: &str, start: usize) -> Result<Option<FilterExpression>> {
    for (open, close) in DELIMITERS {
        if let Some(expression) = parse_bracketed(open, close, code, start)? {
            return Ok(Some(expression));
        }
    }
    Ok(None)
}

fn parse_bracketed(
    open: u8,
    close: &'static str,
    code: &str,
    start: usize,
) -> Result<Option<FilterExpression>> {
    let left = non_space(code, start);
    if left >= code.len() || code.as_bytes()[left] != open {
        return Ok(None);
    }
    let inner = parse_or(code, left + 1, &[close])?;
    let right = non_space(code, inner.end());
    if !starts_with_at(code, close, right) {
        return Err(ShadowError::MissingDelimiter {
            delimiter: close.as_bytes()[0] as char,
            offset: right,
            expression: code.to_string(),
        });
    }
    let end = non_space(code, right + 1);
    Ok(Some(FilterExpression::Delimited {
        start,
        end,
        inner: Box::new(inner),
    }))
}

fn parse_matcher(code: &str, start: usize, end_tokens: &[&str]) -> Result<FilterExpression> {
    let mut pos = non_space(code, start);
    let subject;
    let kind;
    if starts_with_at(code, MatchKind::SymbolicLink.prefix(), pos) {
        subject = Subject::Absolute;
        kind = MatchKind::SymbolicLink;
    } else if starts_with_at(code, MatchKind::MaxSize.prefix(), pos) {
        subject = Subject::Absolute;
        kind = MatchKind::MaxSize;
    } else if starts_with_at(code, MatchKind::HasSibling.prefix(), pos) {
        subject = Subject::Absolute;
        kind = MatchKind::HasSibling;
    } else {
        subject = find_subject(code, pos)?;
        pos += subject.prefix().len();
        kind = find_kind(code, pos)?;
    }
    pos += kind.prefix().len();
    let pattern_start = pos;
    let pattern_end = find_end_of_pattern(code, pattern_start, end_tokens);
    if pattern_end == pattern_start && kind != MatchKind::SymbolicLink {
        return Err(ShadowError::EmptyPattern {
            offset: pattern_start,
            expression: code.to_string(),
        });
    }
    if pattern_end != pattern_start && kind == MatchKind::SymbolicLink {
        return Err(ShadowError::UnexpectedPattern {
            offset: pattern_start,
            expression: code.to_string(),
        });
    }
    let pattern = code[pattern_start..pattern_end].to_string();
    // Reject unusable patterns at parse time so the whole rule line is
    // available for the error message.
    match kind {
        MatchKind::Regex => {
            Regex::new(&pattern).map_err(|err| {
                ShadowError::invalid_pattern(pattern_start, code, err.to_string())
            })?;
        }
        MatchKind::MaxSize => {
            pattern.parse::<u64>().map_err(|_| {
                ShadowError::invalid_pattern(pattern_start, code, "not a byte count")
            })?;
        }
        _ => {}
    }
    Ok(FilterExpression::Matcher {
        start,
        end: pattern_end,
        subject,
        kind,
        pattern,
        pattern_start,
    })
}

fn find_subject(code: &str, pos: usize) -> Result<Subject> {
    for subject in Subject::ALL {
        if starts_with_at(code, subject.prefix(), pos) {
            return Ok(subject);
        }
    }
    Err(ShadowError::MissingPrefix {
        expected: Subject::ALL.map(Subject::prefix).join(", "),
        offset: pos,
        expression: code.to_string(),
    })
}

fn find_kind(code: &str, pos: usize) -> Result<MatchKind> {
    for kind in MatchKind::ALL {
        if starts_with_at(code, kind.prefix(), pos) {
            return Ok(kind);
        }
    }
    Err(ShadowError::MissingPrefix {
        expected: MatchKind::ALL.map(MatchKind::prefix).join(", "),
        offset: pos,
        expression: code.to_string(),
    })
}
