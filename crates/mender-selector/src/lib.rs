//! Mender Selectors
//!
//! A small, well-defined locator grammar and its evaluator over
//! [`DomSnapshot`](mender_dom::DomSnapshot)s.
//!
//! # Grammar
//!
//! A selector is one or more compound selectors joined by the descendant
//! combinator (whitespace) or the child combinator (`>`). A compound selector
//! is an optional tag name or `*`, followed by any of:
//!
//! - `#id`
//! - `.class`
//! - `[attr]`, `[attr="value"]`, `[attr='value']`, `[attr=value]`
//! - `:nth-child(n)`
//!
//! Tag names match case-insensitively; attribute values match exactly.
//! Anything else is a [`SelectorSyntaxError`].
//!
//! # Example
//!
//! ```rust,ignore
//! use mender_selector::{evaluate, Selector};
//!
//! let selector: Selector = "form.login > button[type=submit]".parse()?;
//! let matches = selector.select(&snapshot);
//! let same = evaluate("form.login > button[type=submit]", &snapshot)?;
//! assert_eq!(matches, same);
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod ast;
mod error;
mod eval;
mod parser;

pub use ast::{is_identifier, AttributeSelector, Combinator, CompoundSelector, Selector, SelectorPart};
pub use error::SelectorSyntaxError;
pub use eval::evaluate;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
