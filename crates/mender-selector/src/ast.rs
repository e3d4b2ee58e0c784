//! Selector syntax tree
//!
//! [`Selector`] is a left-to-right chain of [`CompoundSelector`]s. `Display`
//! renders the canonical form, which parses back to a selector matching the
//! same elements.

use crate::error::SelectorSyntaxError;
use crate::parser;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::{self, Display, Formatter, Write};
use std::str::FromStr;

/// Relation between a compound selector and the one to its left
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Combinator {
    /// Whitespace: any ancestor
    Descendant,
    /// `>`: the parent
    Child,
}

/// `[name]` or `[name="value"]`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AttributeSelector {
    pub name: String,
    pub value: Option<String>,
}

impl AttributeSelector {
    /// Presence test
    #[inline]
    #[must_use]
    pub fn present(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: None,
        }
    }

    /// Exact value test
    #[inline]
    #[must_use]
    pub fn equals(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: Some(value.into()),
        }
    }
}

/// One compound selector: tag plus predicates, all of which must hold
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct CompoundSelector {
    /// Lowercase tag; `None` matches any tag
    pub tag: Option<String>,
    /// Written as `*`
    pub universal: bool,
    pub id: Option<String>,
    pub classes: Vec<String>,
    pub attributes: Vec<AttributeSelector>,
    /// One-based position among siblings
    pub nth_child: Option<usize>,
}

impl CompoundSelector {
    /// `*`
    #[inline]
    #[must_use]
    pub fn any() -> Self {
        Self {
            universal: true,
            ..Self::default()
        }
    }

    /// Bare tag name
    #[inline]
    #[must_use]
    pub fn tag(tag: impl Into<String>) -> Self {
        Self {
            tag: Some(tag.into().to_ascii_lowercase()),
            ..Self::default()
        }
    }

    /// Add `#id`
    #[inline]
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Add `.class`
    #[inline]
    #[must_use]
    pub fn with_class(mut self, class_name: impl Into<String>) -> Self {
        self.classes.push(class_name.into());
        self
    }

    /// Add `[name="value"]`
    #[inline]
    #[must_use]
    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push(AttributeSelector::equals(name, value));
        self
    }

    /// Add `[name]`
    #[inline]
    #[must_use]
    pub fn with_attr_present(mut self, name: impl Into<String>) -> Self {
        self.attributes.push(AttributeSelector::present(name));
        self
    }

    /// Add `:nth-child(n)`
    #[inline]
    #[must_use]
    pub fn with_nth_child(mut self, n: usize) -> Self {
        self.nth_child = Some(n);
        self
    }

    /// Value required for `name`, from `#id` or an `[name="value"]` predicate
    #[must_use]
    pub fn attribute_value(&self, name: &str) -> Option<&str> {
        if name == "id" {
            if let Some(id) = &self.id {
                return Some(id);
            }
        }
        self.attributes
            .iter()
            .find(|a| a.name == name)
            .and_then(|a| a.value.as_deref())
    }

    pub(crate) fn is_empty(&self) -> bool {
        !self.universal
            && self.tag.is_none()
            && self.id.is_none()
            && self.classes.is_empty()
            && self.attributes.is_empty()
            && self.nth_child.is_none()
    }
}

impl Display for CompoundSelector {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.tag {
            Some(tag) => f.write_str(tag)?,
            None if self.universal || self.is_empty() => f.write_char('*')?,
            None => {}
        }
        if let Some(id) = &self.id {
            if is_identifier(id) {
                write!(f, "#{id}")?;
            } else {
                f.write_str("[id=")?;
                write_quoted(f, id)?;
                f.write_char(']')?;
            }
        }
        for class_name in &self.classes {
            write!(f, ".{class_name}")?;
        }
        for attr in &self.attributes {
            match &attr.value {
                None => write!(f, "[{}]", attr.name)?,
                Some(value) => {
                    write!(f, "[{}=", attr.name)?;
                    write_quoted(f, value)?;
                    f.write_char(']')?;
                }
            }
        }
        if let Some(n) = self.nth_child {
            write!(f, ":nth-child({n})")?;
        }
        Ok(())
    }
}

fn write_quoted(f: &mut Formatter<'_>, value: &str) -> fmt::Result {
    f.write_char('"')?;
    for c in value.chars() {
        if c == '"' || c == '\\' {
            f.write_char('\\')?;
        }
        f.write_char(c)?;
    }
    f.write_char('"')
}

/// Whether `value` can be written bare after `#`, `.` or as a tag
#[must_use]
pub fn is_identifier(value: &str) -> bool {
    !value.is_empty() && value.chars().all(parser::is_ident_char)
}

/// A compound selector with its combinator to the left
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SelectorPart {
    /// `None` only for the leftmost part
    pub combinator: Option<Combinator>,
    pub compound: CompoundSelector,
}

/// Parsed selector expression
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Selector {
    parts: Vec<SelectorPart>,
}

impl Selector {
    /// Selector with a single compound
    #[must_use]
    pub fn new(compound: CompoundSelector) -> Self {
        Self {
            parts: vec![SelectorPart {
                combinator: None,
                compound,
            }],
        }
    }

    /// Append a compound to the right
    #[must_use]
    pub fn then(mut self, combinator: Combinator, compound: CompoundSelector) -> Self {
        self.parts.push(SelectorPart {
            combinator: Some(combinator),
            compound,
        });
        self
    }

    /// Parse an expression
    ///
    /// # Errors
    /// Returns error identifying the offending token
    pub fn parse(expr: &str) -> Result<Self, SelectorSyntaxError> {
        parser::parse(expr).map(|parts| Self { parts })
    }

    /// Parts left to right
    #[inline]
    #[must_use]
    pub fn parts(&self) -> &[SelectorPart] {
        &self.parts
    }

    /// The rightmost compound, which the matched elements satisfy
    #[inline]
    #[must_use]
    pub fn subject(&self) -> &CompoundSelector {
        // A parsed or constructed selector always has at least one part.
        &self.parts[self.parts.len() - 1].compound
    }

    /// Every attribute name the selector constrains, `id` and `class` included
    pub fn attribute_names(&self) -> impl Iterator<Item = &str> {
        self.parts.iter().flat_map(|p| {
            let c = &p.compound;
            c.id.as_ref()
                .map(|_| "id")
                .into_iter()
                .chain((!c.classes.is_empty()).then_some("class"))
                .chain(c.attributes.iter().map(|a| a.name.as_str()))
        })
    }
}

impl Display for Selector {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for part in &self.parts {
            match part.combinator {
                None => {}
                Some(Combinator::Descendant) => f.write_char(' ')?,
                Some(Combinator::Child) => f.write_str(" > ")?,
            }
            write!(f, "{}", part.compound)?;
        }
        Ok(())
    }
}

impl FromStr for Selector {
    type Err = SelectorSyntaxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Selector {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Selector {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let expr = String::deserialize(deserializer)?;
        Self::parse(&expr).map_err(serde::de::Error::custom)
    }
}
