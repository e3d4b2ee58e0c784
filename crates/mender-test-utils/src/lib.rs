//! Testing utilities for the Mender workspace
//!
//! Page fixtures for the healing scenarios and proptest generators.

#![allow(missing_docs)]

use mender_dom::{DomSnapshot, RawNode};
use proptest::prelude::*;

pub const LOGIN_URL: &str = "https://app.example.com/login";
pub const SHOP_URL: &str = "https://shop.example.com/products";

pub fn snapshot(root: RawNode) -> DomSnapshot {
    DomSnapshot::capture(root).unwrap()
}

pub fn snapshot_at(url: &str, root: RawNode) -> DomSnapshot {
    snapshot(root).with_page_url(url)
}

fn field(label: &str, name: &str, kind: &str) -> RawNode {
    RawNode::element("div").attr("class", "field").children([
        RawNode::element("label").attr("for", name).text(label),
        RawNode::element("input")
            .attr("id", name)
            .attr("name", name)
            .attr("type", kind),
    ])
}

fn page_shell(main: RawNode) -> RawNode {
    RawNode::element("html").child(
        RawNode::element("body").children([
            RawNode::element("header").child(
                RawNode::element("nav").attr("class", "top-nav").children([
                    RawNode::element("a").attr("href", "/").text("Home"),
                    RawNode::element("a").attr("href", "/help").text("Help"),
                ]),
            ),
            RawNode::element("main").attr("class", "container").child(main),
        ]),
    )
}

fn login_form(button: RawNode) -> RawNode {
    page_shell(
        RawNode::element("form")
            .attr("class", "login-form css-1x2y3z")
            .children([
                field("Email", "email", "email"),
                field("Password", "password", "password"),
                button,
            ]),
    )
}

/// Login page whose submit button is `button#submit-btn` with text "Login"
pub fn login_original() -> RawNode {
    login_form(
        RawNode::element("button")
            .attr("id", "submit-btn")
            .attr("class", "btn btn-primary")
            .attr("type", "submit")
            .text("Login"),
    )
}

/// Same page after the id was replaced by `data-testid="submit-btn"`
pub fn login_with_testid() -> RawNode {
    login_form(
        RawNode::element("button")
            .attr("data-testid", "submit-btn")
            .attr("class", "btn btn-primary css-9z8y7x")
            .attr("type", "submit")
            .text("Login"),
    )
}

/// Same page after the id was renamed and no test id was added
pub fn login_with_renamed_id() -> RawNode {
    login_form(
        RawNode::element("button")
            .attr("id", "login-btn")
            .attr("class", "btn btn-primary")
            .attr("type", "submit")
            .text("Login"),
    )
}

/// Same page with the button relabelled "Sign in" and stripped of identifying attributes
pub fn login_relabelled() -> RawNode {
    login_form(
        RawNode::element("button")
            .attr("class", "btn btn-primary")
            .text("Sign in"),
    )
}

/// Login page plus a promo banner with its own "Login" button
pub fn login_with_duplicate_text() -> RawNode {
    let mut root = login_with_renamed_id();
    let banner = RawNode::element("aside").attr("class", "promo").child(
        RawNode::element("button")
            .attr("class", "btn btn-link")
            .text("Login"),
    );
    root.children[0].children.push(banner);
    root
}

/// Product grid with repeated card markup
pub fn product_grid(products: &[&str]) -> RawNode {
    let cards = products.iter().map(|name| {
        RawNode::element("div")
            .attr("class", "card product")
            .children([
                RawNode::element("h3").attr("class", "title").text(*name),
                RawNode::element("button")
                    .attr("class", "btn add-to-cart")
                    .text("Add to cart"),
            ])
    });
    page_shell(RawNode::element("section").attr("class", "grid").children(cards))
}

/// Scenario A: `(original, current)` snapshots for `#submit-btn`
pub fn scenario_testid() -> (DomSnapshot, DomSnapshot) {
    (
        snapshot_at(LOGIN_URL, login_original()),
        snapshot_at(LOGIN_URL, login_with_testid()),
    )
}

/// Scenario B: a page where `.nonexistent-class` has no analog anywhere
pub fn scenario_unhealable() -> (DomSnapshot, DomSnapshot) {
    (
        snapshot_at(LOGIN_URL, login_original()),
        snapshot_at(LOGIN_URL, login_with_renamed_id()),
    )
}

pub fn arb_tag() -> impl Strategy<Value = &'static str> {
    prop_oneof![
        Just("div"),
        Just("span"),
        Just("button"),
        Just("a"),
        Just("input"),
        Just("li"),
    ]
}

fn arb_element() -> impl Strategy<Value = RawNode> {
    (
        arb_tag(),
        proptest::option::of(prop_oneof![Just("Login"), Just("Save"), Just("Add to cart")]),
        proptest::option::of(prop_oneof![Just("btn"), Just("btn primary"), Just("row")]),
        proptest::option::of("[a-z]{1,5}"),
        proptest::option::of(prop_oneof![Just("submit-btn"), Just("save-btn")]),
    )
        .prop_map(|(tag, text, class, id, test_id)| {
            let mut node = RawNode::element(tag);
            if let Some(text) = text {
                node = node.text(text);
            }
            if let Some(class) = class {
                node = node.attr("class", class);
            }
            if let Some(id) = id {
                node = node.attr("id", id);
            }
            if let Some(test_id) = test_id {
                node = node.attr("data-testid", test_id);
            }
            node
        })
}

/// Random element trees up to depth 4
pub fn arb_page() -> impl Strategy<Value = RawNode> {
    arb_element().prop_recursive(4, 40, 5, |inner| {
        (arb_element(), prop::collection::vec(inner, 0..5))
            .prop_map(|(parent, children)| parent.children(children))
    })
}

/// Selector expressions built from the same vocabulary as [`arb_page`]
pub fn arb_selector_expr() -> impl Strategy<Value = String> {
    let compound = prop_oneof![
        arb_tag().prop_map(str::to_string),
        Just(".btn".to_string()),
        Just(".row".to_string()),
        Just("[data-testid]".to_string()),
        Just(r#"[data-testid="submit-btn"]"#.to_string()),
        Just("*:nth-child(2)".to_string()),
        (arb_tag(), "[a-z]{1,2}").prop_map(|(t, id)| format!("{t}#{id}")),
    ];
    (
        prop::collection::vec(compound, 1..4),
        prop::collection::vec(prop_oneof![Just(" "), Just(" > ")], 3),
    )
        .prop_map(|(parts, joins)| {
            let mut expr = parts[0].clone();
            for (part, join) in parts.iter().skip(1).zip(joins) {
                expr.push_str(join);
                expr.push_str(part);
            }
            expr
        })
}
