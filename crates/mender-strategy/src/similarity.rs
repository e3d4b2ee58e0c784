//! String and text similarity
//!
//! All scores are in `[0, 1]`.

use std::collections::BTreeSet;

/// Interactive tag names
pub const INTERACTIVE_TAGS: &[&str] = &["button", "a", "input", "select", "textarea"];

/// ARIA roles treated as interactive
pub const INTERACTIVE_ROLES: &[&str] = &[
    "button", "link", "checkbox", "radio", "textbox", "combobox", "menuitem", "tab", "option",
    "switch",
];

/// Edit distance over chars
#[must_use]
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = previous[j] + usize::from(ca != cb);
            current[j + 1] = substitution.min(previous[j + 1] + 1).min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous[b.len()]
}

/// `1 - distance / longer length`; two empty strings are identical
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn string_similarity(a: &str, b: &str) -> f64 {
    let longest = a.chars().count().max(b.chars().count());
    if longest == 0 {
        return 1.0;
    }
    1.0 - levenshtein(a, b) as f64 / longest as f64
}

fn words(value: &str) -> Vec<String> {
    // Split on separators and lower-to-upper case boundaries.
    let mut out = Vec::new();
    let mut word = String::new();
    let mut previous_lower = false;
    for c in value.chars() {
        if c == '-' || c == '_' || c == '.' || c.is_whitespace() {
            if !word.is_empty() {
                out.push(std::mem::take(&mut word));
            }
            previous_lower = false;
            continue;
        }
        if c.is_uppercase() && previous_lower && !word.is_empty() {
            out.push(std::mem::take(&mut word));
        }
        previous_lower = c.is_lowercase() || c.is_ascii_digit();
        word.extend(c.to_lowercase());
    }
    if !word.is_empty() {
        out.push(word);
    }
    out
}

/// Lowercase with separators removed: `Submit_Btn` and `submit-btn` agree
#[must_use]
pub fn normalize_identifier(value: &str) -> String {
    words(value).concat()
}

/// `submit-btn`
#[must_use]
pub fn to_kebab_case(value: &str) -> String {
    words(value).join("-")
}

/// `submit_btn`
#[must_use]
pub fn to_snake_case(value: &str) -> String {
    words(value).join("_")
}

/// `submitBtn`
#[must_use]
pub fn to_camel_case(value: &str) -> String {
    let mut out = String::new();
    for (i, word) in words(value).into_iter().enumerate() {
        if i == 0 {
            out.push_str(&word);
        } else {
            let mut chars = word.chars();
            if let Some(first) = chars.next() {
                out.extend(first.to_uppercase());
                out.push_str(chars.as_str());
            }
        }
    }
    out
}

/// Similarity of two test-id values
///
/// Best of the raw comparison, the separator-normalised comparison and the
/// kebab/snake/camel conversions of `a` against `b`. Only the raw
/// comparison can reach 1.0.
#[must_use]
pub fn test_id_similarity(a: &str, b: &str) -> f64 {
    let raw = string_similarity(a, b);
    if raw >= 1.0 {
        return 1.0;
    }
    let normalized = string_similarity(&normalize_identifier(a), &normalize_identifier(b)) * 0.95;
    let converted = [to_kebab_case(a), to_snake_case(a), to_camel_case(a)]
        .iter()
        .map(|variant| string_similarity(variant, b) * 0.95)
        .fold(0.0, f64::max);
    raw.max(normalized).max(converted)
}

/// Lowercase words with edge punctuation stripped, single-space separated
#[must_use]
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .map(|w| w.trim_matches(|c: char| c.is_ascii_punctuation()).to_lowercase())
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Jaccard over words longer than two characters
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn word_overlap(a: &str, b: &str) -> f64 {
    let significant = |s: &str| -> BTreeSet<String> {
        s.split_whitespace()
            .map(str::to_lowercase)
            .filter(|w| w.chars().count() > 2)
            .collect()
    };
    let (wa, wb) = (significant(a), significant(b));
    if wa.is_empty() || wb.is_empty() {
        return 0.0;
    }
    let intersection = wa.intersection(&wb).count();
    let union = wa.union(&wb).count();
    intersection as f64 / union as f64
}

/// Containment or positional character agreement
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn char_similarity(a: &str, b: &str) -> f64 {
    let a = a.trim().to_lowercase();
    let b = b.trim().to_lowercase();
    if a == b {
        return 1.0;
    }
    let (la, lb) = (a.chars().count(), b.chars().count());
    if la == 0 || lb == 0 {
        return 0.0;
    }
    let (shorter, longer) = (la.min(lb) as f64, la.max(lb) as f64);
    if a.contains(&b) || b.contains(&a) {
        return shorter / longer * 0.95;
    }
    let positional = a.chars().zip(b.chars()).filter(|(x, y)| x == y).count();
    positional as f64 / longer
}

/// Combined text similarity
///
/// Word overlap weighs 0.7 when `original` has more than three words and 0.4
/// otherwise; character similarity takes the rest. Texts equal after
/// normalisation score 1.0.
#[must_use]
pub fn text_similarity(original: &str, candidate: &str) -> f64 {
    let (a, b) = (normalize_text(original), normalize_text(candidate));
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 1.0;
    }
    let weight = if a.split(' ').count() > 3 { 0.7 } else { 0.4 };
    word_overlap(&a, &b) * weight + char_similarity(&a, &b) * (1.0 - weight)
}

/// Jaccard similarity of two sets; two empty sets score 1.0
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn jaccard<T: Ord>(a: &BTreeSet<T>, b: &BTreeSet<T>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 1.0;
    }
    a.intersection(b).count() as f64 / union as f64
}
