use std::iter::Peekable;
use std::str::Chars;

use crate::dom::dom_model::{Document, NodeId};
use crate::dom::error::DomError;

/// Parsed CSS-like selector.
///
/// Supports the subset the selector engine emits plus the common shorthands:
/// type, `#id`, `.class`, `[attr]`, `[attr="value"]`, `:nth-child(n)`, and the
/// descendant (` `) and child (`>`) combinators.
#[derive(Debug, Clone, PartialEq)]
pub struct Selector {
    /// Compound selectors left to right; the combinator links a part to the one before it.
    parts: Vec<(Combinator, Compound)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Combinator {
    Descendant,
    Child,
}

#[derive(Debug, Clone, Default, PartialEq)]
struct Compound {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attributes: Vec<(String, Option<String>)>,
    nth_child: Option<usize>,
}

impl Compound {
    fn is_empty(&self) -> bool {
        self.tag.is_none()
            && self.id.is_none()
            && self.classes.is_empty()
            && self.attributes.is_empty()
            && self.nth_child.is_none()
    }

    fn matches(&self, doc: &Document, node: NodeId) -> bool {
        let Some(tag) = doc.tag(node) else {
            return false;
        };
        if let Some(want) = &self.tag {
            if want != "*" && !want.eq_ignore_ascii_case(tag) {
                return false;
            }
        }
        if let Some(id) = &self.id {
            if doc.get_attribute(node, "id") != Some(id.as_str()) {
                return false;
            }
        }
        if !self.classes.is_empty() {
            let classes = doc.classes(node);
            if !self.classes.iter().all(|c| classes.contains(&c.as_str())) {
                return false;
            }
        }
        for (name, value) in &self.attributes {
            match (doc.get_attribute(node, name), value) {
                (None, _) => return false,
                (Some(actual), Some(expected)) if actual != expected => return false,
                _ => {}
            }
        }
        if let Some(n) = self.nth_child {
            if doc.child_position(node) != Some(n) {
                return false;
            }
        }
        true
    }
}

impl Selector {
    pub fn parse(input: &str) -> Result<Selector, DomError> {
        let fail = |reason: &str| DomError::SelectorParse {
            selector: input.to_string(),
            reason: reason.to_string(),
        };

        let mut chars = input.trim().chars().peekable();
        let mut parts: Vec<(Combinator, Compound)> = Vec::new();
        let mut pending = Combinator::Descendant;

        loop {
            let compound = parse_compound(&mut chars).map_err(|r| fail(&r))?;
            if compound.is_empty() {
                return Err(fail(if parts.is_empty() {
                    "empty selector"
                } else {
                    "dangling combinator"
                }));
            }
            parts.push((pending, compound));

            let mut saw_space = false;
            while chars.peek().is_some_and(|c| c.is_whitespace()) {
                chars.next();
                saw_space = true;
            }
            match chars.peek() {
                None => break,
                Some('>') => {
                    chars.next();
                    while chars.peek().is_some_and(|c| c.is_whitespace()) {
                        chars.next();
                    }
                    pending = Combinator::Child;
                }
                Some(_) if saw_space => pending = Combinator::Descendant,
                Some(c) => return Err(fail(&format!("unexpected '{}'", c))),
            }
        }

        Ok(Selector { parts })
    }

    pub fn matches(&self, doc: &Document, node: NodeId) -> bool {
        match self.parts.len() {
            0 => false,
            n => self.matches_at(doc, node, n - 1),
        }
    }

    fn matches_at(&self, doc: &Document, node: NodeId, index: usize) -> bool {
        let (combinator, compound) = &self.parts[index];
        if !compound.matches(doc, node) {
            return false;
        }
        if index == 0 {
            return true;
        }

        match combinator {
            Combinator::Child => doc
                .parent(node)
                .is_some_and(|p| self.matches_at(doc, p, index - 1)),
            Combinator::Descendant => {
                let mut ancestor = doc.parent(node);
                while let Some(a) = ancestor {
                    if self.matches_at(doc, a, index - 1) {
                        return true;
                    }
                    ancestor = doc.parent(a);
                }
                false
            }
        }
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '-' || c == '_'
}

fn parse_ident(chars: &mut Peekable<Chars<'_>>) -> String {
    let mut out = String::new();
    while let Some(&c) = chars.peek() {
        if is_ident_char(c) {
            out.push(c);
            chars.next();
        } else {
            break;
        }
    }
    out
}

fn parse_compound(chars: &mut Peekable<Chars<'_>>) -> Result<Compound, String> {
    let mut compound = Compound::default();

    if chars.peek() == Some(&'*') {
        chars.next();
        compound.tag = Some("*".into());
    } else if chars.peek().is_some_and(|c| is_ident_char(*c)) {
        compound.tag = Some(parse_ident(chars).to_ascii_lowercase());
    }

    while let Some(&c) = chars.peek() {
        match c {
            '#' => {
                chars.next();
                let id = parse_ident(chars);
                if id.is_empty() {
                    return Err("empty id".into());
                }
                compound.id = Some(id);
            }
            '.' => {
                chars.next();
                let class = parse_ident(chars);
                if class.is_empty() {
                    return Err("empty class".into());
                }
                compound.classes.push(class);
            }
            '[' => {
                chars.next();
                compound.attributes.push(parse_attribute(chars)?);
            }
            ':' => {
                chars.next();
                compound.nth_child = Some(parse_nth_child(chars)?);
            }
            _ => break,
        }
    }

    Ok(compound)
}

fn parse_attribute(chars: &mut Peekable<Chars<'_>>) -> Result<(String, Option<String>), String> {
    let name = parse_ident(chars);
    if name.is_empty() {
        return Err("empty attribute name".into());
    }

    match chars.next() {
        Some(']') => Ok((name, None)),
        Some('=') => {
            let value = match chars.peek() {
                Some('"') | Some('\'') => parse_quoted(chars)?,
                _ => parse_ident(chars),
            };
            match chars.next() {
                Some(']') => Ok((name, Some(value))),
                _ => Err(format!("unterminated attribute [{}]", name)),
            }
        }
        _ => Err(format!("unterminated attribute [{}]", name)),
    }
}

fn parse_quoted(chars: &mut Peekable<Chars<'_>>) -> Result<String, String> {
    let quote = chars.next().ok_or("missing quote")?;
    let mut out = String::new();
    loop {
        match chars.next() {
            Some('\\') => match chars.next() {
                Some(escaped) => out.push(escaped),
                None => return Err("dangling escape".into()),
            },
            Some(c) if c == quote => return Ok(out),
            Some(c) => out.push(c),
            None => return Err("unterminated string".into()),
        }
    }
}

fn parse_nth_child(chars: &mut Peekable<Chars<'_>>) -> Result<usize, String> {
    let name = parse_ident(chars);
    if name != "nth-child" {
        return Err(format!("unsupported pseudo-class :{}", name));
    }
    if chars.next() != Some('(') {
        return Err("expected '(' after :nth-child".into());
    }
    let digits: String = std::iter::from_fn(|| chars.next_if(|c| c.is_ascii_digit())).collect();
    if chars.next() != Some(')') {
        return Err("expected ')' after :nth-child index".into());
    }
    match digits.parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(format!("invalid :nth-child index '{}'", digits)),
    }
}
