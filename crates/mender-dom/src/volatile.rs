//! Volatility rules
//!
//! Classes and attributes that change between renders without the element
//! changing identity: CSS-in-JS hashes, framework state classes, inline
//! styles, expansion state. Healing and diffing skip them.

use once_cell::sync::Lazy;
use regex::Regex;

static GENERATED_CLASS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?x)
        ^(css|sc|jsx|emotion|styled|svelte|astro)-[A-Za-z0-9_-]+$   # css-in-js prefixes
        | ^jss\d+$
        | [0-9]{4,}                                                 # long digit runs
        ",
    )
    .expect("generated-class pattern is valid")
});

const STATE_CLASSES: &[&str] = &[
    "active",
    "focus",
    "focused",
    "hover",
    "hovered",
    "selected",
    "open",
    "visible",
    "hidden",
    "loading",
];

const STATE_CLASS_PREFIXES: &[&str] = &["is-", "has-", "ng-"];

const VOLATILE_ATTRIBUTES: &[&str] = &[
    "style",
    "tabindex",
    "data-reactid",
    "data-reactroot",
    "data-state",
    "aria-expanded",
    "aria-selected",
    "aria-pressed",
    "aria-checked",
];

const VOLATILE_ATTRIBUTE_PREFIXES: &[&str] = &["data-v-", "data-react-", "_ngcontent-", "_nghost-"];

/// Whether a class token is generated or describes transient state
#[must_use]
pub fn is_volatile_class(class_name: &str) -> bool {
    STATE_CLASSES.contains(&class_name)
        || STATE_CLASS_PREFIXES.iter().any(|p| class_name.starts_with(p))
        || GENERATED_CLASS.is_match(class_name)
        || looks_like_hash(class_name)
}

// Bare build hashes such as `a1b2c3d4e5` or `_3xk9f2`.
fn looks_like_hash(class_name: &str) -> bool {
    let body = class_name.trim_start_matches('_');
    body.len() >= 6
        && body.chars().all(|c| c.is_ascii_alphanumeric())
        && body.chars().filter(char::is_ascii_digit).count() >= 3
}

/// Whether an attribute holds render state rather than identity
#[must_use]
pub fn is_volatile_attribute(name: &str) -> bool {
    VOLATILE_ATTRIBUTES.contains(&name)
        || VOLATILE_ATTRIBUTE_PREFIXES.iter().any(|p| name.starts_with(p))
}

/// Class tokens that survive re-renders, in source order
pub fn stable_classes<'a>(class_attr: &'a str) -> impl Iterator<Item = &'a str> + 'a {
    class_attr.split_whitespace().filter(|c| !is_volatile_class(c))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_classes_are_volatile() {
        for class in ["css-1x2y3z", "sc-bdVaJa", "jsx-2841", "jss12", "a1b2c3d4e5", "_3xk9f2a"] {
            assert!(is_volatile_class(class), "{class} should be volatile");
        }
    }

    #[test]
    fn state_classes_are_volatile() {
        for class in ["active", "is-open", "ng-touched", "has-error"] {
            assert!(is_volatile_class(class), "{class} should be volatile");
        }
    }

    #[test]
    fn semantic_classes_are_stable() {
        for class in ["btn", "btn-primary", "login-form", "nav-item", "submit", "col-md-6", "grid2x2"] {
            assert!(!is_volatile_class(class), "{class} should be stable");
        }
    }

    #[test]
    fn volatile_attributes() {
        assert!(is_volatile_attribute("style"));
        assert!(is_volatile_attribute("data-v-7ba5bd90"));
        assert!(is_volatile_attribute("aria-expanded"));
        assert!(!is_volatile_attribute("id"));
        assert!(!is_volatile_attribute("data-testid"));
        assert!(!is_volatile_attribute("aria-label"));
    }

    #[test]
    fn stable_classes_filters_in_order() {
        let classes: Vec<_> = stable_classes("btn css-9f8e7d active btn-primary").collect();
        assert_eq!(classes, vec!["btn", "btn-primary"]);
    }
}
