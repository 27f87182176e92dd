//! Parsers for the algebra engine's text output.
//!
//! Everything the engine reports crosses the boundary as plain text in a
//! handful of line-oriented shapes:
//!
//! * flat expressions (`x2^3*y-2*x2+1`), with `^` or `**` powers,
//! * factored products (`2*x^2*(x+y)^3`),
//! * wrapped lists keyed by `_[k]=`, long entries continued on the next
//!   line,
//! * indentation-nested lists keyed by `[k]:`,
//! * comma lists inside a single line,
//! * a ring descriptor printout carrying `coefficients:` and `names`
//!   attributes.
//!
//! The expression grammar is deliberately small: integers, named
//! variables (an indexed name like `x(1)` flattens to `x1`), products,
//! signed integer powers, division by invertible factors, and sums.
//! Malformed lines in the list formats are skipped rather than rejected,
//! matching the permissive reader this replaces.

use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::One;
use regex_lite::Regex;
use thiserror::Error;

use super::factor::Factored;
use super::poly::{Poly, Var};

/// Failure modes of the expression and descriptor parsers.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// A character that fits no grammar rule at this point.
    #[error("unexpected character `{found}` at position {position}")]
    UnexpectedChar {
        /// Character offset into the input.
        position: usize,
        /// The offending character.
        found: char,
    },
    /// Input ended mid-expression.
    #[error("expression ended unexpectedly")]
    UnexpectedEnd,
    /// Input was empty or all whitespace.
    #[error("empty expression")]
    Empty,
    /// An integer literal that does not fit the exponent range.
    #[error("integer at position {position} is out of range")]
    IntegerRange {
        /// Character offset into the input.
        position: usize,
    },
    /// A negative power or division applied to a multi-term expression.
    #[error("cannot invert a multi-term expression at position {position}")]
    NonInvertible {
        /// Character offset into the input.
        position: usize,
    },
    /// A ring printout without the named attribute.
    #[error("ring printout lacks a `{missing}` attribute")]
    RingAttribute {
        /// The attribute that was not found.
        missing: &'static str,
    },
    /// The ring descriptor patterns failed to compile.
    #[error("malformed ring descriptor pattern")]
    RingDescriptor,
}

/// One node of an indentation-nested engine list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListNode {
    /// A body block, wrapped lines joined without separator.
    Leaf(String),
    /// A `[k]:`-keyed block of child nodes, in key order.
    List(Vec<ListNode>),
}

impl ListNode {
    /// The body text, when this node is a leaf.
    pub fn as_leaf(&self) -> Option<&str> {
        match self {
            ListNode::Leaf(s) => Some(s),
            ListNode::List(_) => None,
        }
    }

    /// The child nodes, when this node is a list.
    pub fn as_list(&self) -> Option<&[ListNode]> {
        match self {
            ListNode::Leaf(_) => None,
            ListNode::List(items) => Some(items),
        }
    }
}

/// The coefficient field and variable names of an engine ring printout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RingDescriptor {
    /// Coefficient ring name as printed, e.g. `QQ`.
    pub coefficients: String,
    /// Declared variables in printout order, indexed names flattened.
    pub variables: Vec<Var>,
}

/// Parses a full arithmetic expression into a polynomial.
pub fn parse_expr(text: &str) -> Result<Poly, ParseError> {
    if text.trim().is_empty() {
        return Err(ParseError::Empty);
    }
    let mut cur = Cursor::new(text);
    let poly = cur.sum()?;
    cur.skip_ws();
    match cur.peek() {
        None => Ok(poly),
        Some(found) => Err(ParseError::UnexpectedChar {
            position: cur.pos,
            found,
        }),
    }
}

/// Parses a product of factors without expanding it.
///
/// A top-level sum falls back to [`parse_expr`] and is kept as a single
/// unrefined base.
pub fn parse_factored(text: &str) -> Result<Factored, ParseError> {
    if text.trim().is_empty() {
        return Err(ParseError::Empty);
    }
    if has_top_level_sum(text) {
        return Ok(Factored::from_poly(parse_expr(text)?));
    }
    let mut cur = Cursor::new(text);
    let mut unit = BigRational::one();
    let mut factors: Vec<(Poly, i64)> = Vec::new();
    let mut invert = false;
    loop {
        cur.skip_ws();
        while let Some(c) = cur.peek() {
            match c {
                '-' => {
                    unit = -unit;
                    cur.bump();
                }
                '+' => {
                    cur.bump();
                }
                _ => break,
            }
            cur.skip_ws();
        }
        let base = cur.atom()?;
        cur.skip_ws();
        let mut exp = 1i64;
        if cur.eat_str("**") || cur.eat('^') {
            cur.skip_ws();
            exp = cur.signed_integer()?;
        }
        if invert {
            exp = -exp;
        }
        factors.push((base, exp));
        cur.skip_ws();
        invert = match cur.peek() {
            None => break,
            Some('*') => {
                cur.bump();
                false
            }
            Some('/') => {
                cur.bump();
                true
            }
            Some(found) => {
                return Err(ParseError::UnexpectedChar {
                    position: cur.pos,
                    found,
                })
            }
        };
    }
    Ok(Factored::new(unit, factors))
}

/// Splits a line at top-level commas, respecting parentheses and
/// brackets. Entries are trimmed; empty entries are dropped.
pub fn parse_comma_list(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut depth = 0i32;
    let mut current = String::new();
    for c in text.chars() {
        match c {
            '(' | '[' => {
                depth += 1;
                current.push(c);
            }
            ')' | ']' => {
                depth -= 1;
                current.push(c);
            }
            ',' if depth == 0 => {
                let entry = current.trim();
                if !entry.is_empty() {
                    out.push(entry.to_string());
                }
                current.clear();
            }
            _ => current.push(c),
        }
    }
    let entry = current.trim();
    if !entry.is_empty() {
        out.push(entry.to_string());
    }
    out
}

/// Collects the entries of a `_[k]=` keyed printout.
///
/// Lines that start a new entry carry the `_[k]=` prefix; any other
/// nonblank line continues the previous entry. Trailing commas are
/// stripped. Lines before the first entry are dropped.
pub fn parse_wrapped_list(text: &str) -> Vec<String> {
    let mut entries: Vec<String> = Vec::new();
    for raw in text.lines() {
        let mut line = raw.trim();
        if line.is_empty() {
            continue;
        }
        line = line.strip_suffix(',').unwrap_or(line);
        if let Some(body) = wrapped_entry_body(line) {
            entries.push(body.to_string());
        } else if let Some(last) = entries.last_mut() {
            last.push_str(line);
        }
    }
    entries
}

fn wrapped_entry_body(line: &str) -> Option<&str> {
    let rest = line.strip_prefix("_[")?;
    let close = rest.find(']')?;
    if close == 0 || !rest[..close].bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    rest[close + 1..].strip_prefix('=')
}

/// Parses an indentation-nested `[k]:` printout.
///
/// A block whose minimally indented lines carry `[k]:` headers becomes a
/// [`ListNode::List`]; any other block becomes a [`ListNode::Leaf`] with
/// its wrapped lines joined without separator. Stray lines between
/// headers are skipped.
pub fn parse_bracketed(text: &str) -> ListNode {
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    parse_block(&lines)
}

fn parse_block(lines: &[&str]) -> ListNode {
    if lines.is_empty() {
        return ListNode::Leaf(String::new());
    }
    let base_indent = lines.iter().map(|l| indent_of(l)).min().unwrap_or(0);
    let has_headers = lines
        .iter()
        .any(|l| indent_of(l) == base_indent && is_header(l.trim()));
    if !has_headers {
        let body: String = lines.iter().map(|l| l.trim()).collect();
        return ListNode::Leaf(body);
    }
    let mut items = Vec::new();
    let mut idx = 0;
    while idx < lines.len() {
        let line = lines[idx];
        if indent_of(line) == base_indent && is_header(line.trim()) {
            let start = idx + 1;
            let mut end = start;
            while end < lines.len()
                && !(indent_of(lines[end]) <= base_indent && is_header(lines[end].trim()))
            {
                end += 1;
            }
            items.push(parse_block(&lines[start..end]));
            idx = end;
        } else {
            idx += 1;
        }
    }
    ListNode::List(items)
}

fn indent_of(line: &str) -> usize {
    line.chars().take_while(|c| c.is_whitespace()).count()
}

fn is_header(line: &str) -> bool {
    line.strip_prefix('[')
        .and_then(|rest| rest.strip_suffix("]:"))
        .is_some_and(|key| !key.is_empty() && key.bytes().all(|b| b.is_ascii_digit()))
}

/// Extracts coefficient ring and variable names from a ring printout.
///
/// Attributes are matched at their last occurrence, since engine chatter
/// earlier in the transcript may mention the same words. Indexed names
/// like `x(1)` flatten to `x1`.
pub fn parse_ring(printout: &str) -> Result<RingDescriptor, ParseError> {
    let coeff_re =
        Regex::new(r"coefficients:\s*(\S+)").map_err(|_| ParseError::RingDescriptor)?;
    let names_re = Regex::new(r"names:?\s+(.+)").map_err(|_| ParseError::RingDescriptor)?;
    let coefficients = coeff_re
        .captures_iter(printout)
        .last()
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or(ParseError::RingAttribute {
            missing: "coefficients",
        })?;
    let names_raw = names_re
        .captures_iter(printout)
        .last()
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or(ParseError::RingAttribute { missing: "names" })?;
    let variables: Vec<Var> = names_raw
        .replace(['(', ')'], "")
        .split_whitespace()
        .map(Var::new)
        .collect();
    if variables.is_empty() {
        return Err(ParseError::RingAttribute { missing: "names" });
    }
    Ok(RingDescriptor {
        coefficients,
        variables,
    })
}

/// True when a `+` or `-` acts as a binary sum at nesting depth zero.
fn has_top_level_sum(text: &str) -> bool {
    let mut depth = 0i32;
    let mut prev: Option<char> = None;
    for c in text.chars() {
        match c {
            '(' | '[' => depth += 1,
            ')' | ']' => depth -= 1,
            '+' | '-' if depth == 0 => {
                if let Some(p) = prev {
                    if !matches!(p, '*' | '/' | '^' | '(' | '+' | '-') {
                        return true;
                    }
                }
            }
            _ => {}
        }
        if !c.is_whitespace() {
            prev = Some(c);
        }
    }
    false
}

/// Character cursor shared by the expression and product grammars.
struct Cursor {
    chars: Vec<char>,
    pos: usize,
}

impl Cursor {
    fn new(text: &str) -> Self {
        Cursor {
            chars: text.chars().collect(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) {
        self.pos += 1;
    }

    fn eat(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn eat_str(&mut self, s: &str) -> bool {
        let mut probe = self.pos;
        for c in s.chars() {
            if self.chars.get(probe) != Some(&c) {
                return false;
            }
            probe += 1;
        }
        self.pos = probe;
        true
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(|c| c.is_whitespace()) {
            self.bump();
        }
    }

    /// `expr := signed_product (('+' | '-') signed_product)*`; the
    /// operator signs are consumed by the operand itself.
    fn sum(&mut self) -> Result<Poly, ParseError> {
        let mut acc = self.signed_product()?;
        loop {
            self.skip_ws();
            match self.peek() {
                Some('+') | Some('-') => {
                    let next = self.signed_product()?;
                    acc = acc + next;
                }
                _ => break,
            }
        }
        Ok(acc)
    }

    fn signed_product(&mut self) -> Result<Poly, ParseError> {
        self.skip_ws();
        let mut negative = false;
        while let Some(c) = self.peek() {
            match c {
                '-' => {
                    negative = !negative;
                    self.bump();
                }
                '+' => self.bump(),
                _ => break,
            }
            self.skip_ws();
        }
        let p = self.product()?;
        Ok(if negative { -p } else { p })
    }

    fn product(&mut self) -> Result<Poly, ParseError> {
        let mut acc = self.power()?;
        loop {
            self.skip_ws();
            match self.peek() {
                Some('*') => {
                    self.bump();
                    let rhs = self.power()?;
                    acc = &acc * &rhs;
                }
                Some('/') => {
                    let position = self.pos;
                    self.bump();
                    let rhs = self.power()?;
                    let inv = rhs
                        .pow_i64(-1)
                        .map_err(|_| ParseError::NonInvertible { position })?;
                    acc = &acc * &inv;
                }
                _ => break,
            }
        }
        Ok(acc)
    }

    fn power(&mut self) -> Result<Poly, ParseError> {
        self.skip_ws();
        let base = self.atom()?;
        self.skip_ws();
        if !(self.eat_str("**") || self.eat('^')) {
            return Ok(base);
        }
        let position = self.pos;
        self.skip_ws();
        let exp = self.signed_integer()?;
        base.pow_i64(exp)
            .map_err(|_| ParseError::NonInvertible { position })
    }

    fn atom(&mut self) -> Result<Poly, ParseError> {
        self.skip_ws();
        match self.peek() {
            None => Err(ParseError::UnexpectedEnd),
            Some('(') => {
                self.bump();
                let inner = self.sum()?;
                self.skip_ws();
                match self.peek() {
                    Some(')') => {
                        self.bump();
                        Ok(inner)
                    }
                    Some(found) => Err(ParseError::UnexpectedChar {
                        position: self.pos,
                        found,
                    }),
                    None => Err(ParseError::UnexpectedEnd),
                }
            }
            Some(c) if c.is_ascii_digit() => self.integer_poly(),
            Some(c) if c.is_ascii_alphabetic() || c == '_' => self.variable(),
            Some(found) => Err(ParseError::UnexpectedChar {
                position: self.pos,
                found,
            }),
        }
    }

    fn integer_poly(&mut self) -> Result<Poly, ParseError> {
        let position = self.pos;
        let digits = self.digit_run();
        BigInt::parse_bytes(digits.as_bytes(), 10)
            .map(|n| Poly::constant(BigRational::from_integer(n)))
            .ok_or(ParseError::IntegerRange { position })
    }

    fn variable(&mut self) -> Result<Poly, ParseError> {
        let mut name = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '_' {
                name.push(c);
                self.bump();
            } else {
                break;
            }
        }
        // Indexed names print as `x(1)`; the index folds into the name.
        if self.peek() == Some('(') {
            let mut probe = self.pos + 1;
            let mut index = String::new();
            while let Some(&c) = self.chars.get(probe) {
                if c.is_ascii_digit() {
                    index.push(c);
                    probe += 1;
                } else {
                    break;
                }
            }
            if !index.is_empty() && self.chars.get(probe) == Some(&')') {
                name.push_str(&index);
                self.pos = probe + 1;
            }
        }
        Ok(Poly::var(Var::new(name)))
    }

    fn signed_integer(&mut self) -> Result<i64, ParseError> {
        let position = self.pos;
        let negative = if self.eat('-') {
            true
        } else {
            self.eat('+');
            false
        };
        self.skip_ws();
        if !self.peek().is_some_and(|c| c.is_ascii_digit()) {
            return match self.peek() {
                Some(found) => Err(ParseError::UnexpectedChar {
                    position: self.pos,
                    found,
                }),
                None => Err(ParseError::UnexpectedEnd),
            };
        }
        let digits = self.digit_run();
        let value: i64 = digits
            .parse()
            .map_err(|_| ParseError::IntegerRange { position })?;
        Ok(if negative { -value } else { value })
    }

    fn digit_run(&mut self) -> String {
        let mut digits = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                digits.push(c);
                self.bump();
            } else {
                break;
            }
        }
        digits
    }
}
