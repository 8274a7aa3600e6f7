use page_assist::selector::selector_engine::{generate_selector, is_css_safe_id};

mod common;

use crate::common::utils::{element, page};

// =========================================================================
// Identity-based selectors
// =========================================================================

#[test]
fn safe_id_wins() {
    let mut doc = page();
    let body = doc.body();
    let area = element(&mut doc, body, "textarea", &[("id", "comment_box-1"), ("name", "body")]);

    assert_eq!(generate_selector(&doc, area), "#comment_box-1");
    assert_eq!(doc.query_selector("#comment_box-1").unwrap(), Some(area));
}

#[test]
fn unsafe_id_falls_through_to_naming_attributes() {
    let mut doc = page();
    let body = doc.body();
    let input = element(&mut doc, body, "input", &[("id", "user:email"), ("name", "email")]);

    assert!(!is_css_safe_id("user:email"));
    assert_eq!(generate_selector(&doc, input), "input[name=\"email\"]");
}

#[test]
fn naming_attributes_follow_priority_order() {
    let mut doc = page();
    let body = doc.body();
    let by_testid = element(
        &mut doc,
        body,
        "textarea",
        &[("placeholder", "Write..."), ("data-testid", "composer")],
    );
    let by_placeholder = element(&mut doc, body, "input", &[("placeholder", "Search"), ("role", "searchbox")]);

    assert_eq!(generate_selector(&doc, by_testid), "textarea[data-testid=\"composer\"]");
    assert_eq!(generate_selector(&doc, by_placeholder), "input[placeholder=\"Search\"]");
}

#[test]
fn attribute_values_with_quotes_round_trip() {
    let mut doc = page();
    let body = doc.body();
    let area = element(&mut doc, body, "textarea", &[("aria-label", r#"Reply to "Ann" \ team"#)]);

    let selector = generate_selector(&doc, area);
    assert_eq!(selector, r#"textarea[aria-label="Reply to \"Ann\" \\ team"]"#);
    assert_eq!(doc.query_selector(&selector).unwrap(), Some(area));
}

// =========================================================================
// Class and positional fallbacks
// =========================================================================

#[test]
fn text_fields_use_type_and_stable_classes() {
    let mut doc = page();
    let body = doc.body();
    let input = element(
        &mut doc,
        body,
        "input",
        &[("type", "text"), ("class", "css-1x2y field btn--big form-input wide extra")],
    );

    let selector = generate_selector(&doc, input);
    assert_eq!(selector, "input[type=\"text\"].field.form-input");
    assert_eq!(doc.query_selector(&selector).unwrap(), Some(input));
}

#[test]
fn plain_elements_get_a_positional_chain() {
    let mut doc = page();
    let body = doc.body();
    let main = element(&mut doc, body, "main", &[]);
    element(&mut doc, main, "p", &[]);
    let section = element(&mut doc, main, "section", &[]);
    let editor = element(&mut doc, section, "div", &[("contenteditable", "true")]);

    let selector = generate_selector(&doc, editor);
    assert_eq!(selector, "body > main:nth-child(1) > section:nth-child(2) > div:nth-child(1)");
    assert_eq!(doc.query_selector(&selector).unwrap(), Some(editor));
}

#[test]
fn positional_chain_stops_at_an_id_anchor() {
    let mut doc = page();
    let body = doc.body();
    let app = element(&mut doc, body, "div", &[("id", "app")]);
    let wrap = element(&mut doc, app, "div", &[]);
    let editor = element(&mut doc, wrap, "div", &[("contenteditable", "")]);

    let selector = generate_selector(&doc, editor);
    assert_eq!(selector, "#app > div:nth-child(1) > div:nth-child(1)");
    assert_eq!(doc.query_selector(&selector).unwrap(), Some(editor));
}

#[test]
fn positional_chain_is_capped_at_three_ancestors() {
    let mut doc = page();
    let mut parent = doc.body();
    for _ in 0..5 {
        parent = element(&mut doc, parent, "div", &[]);
    }
    let leaf = element(&mut doc, parent, "span", &[]);

    let selector = generate_selector(&doc, leaf);
    assert_eq!(selector.matches(" > ").count(), 3, "{}", selector);
    assert!(selector.starts_with("div:nth-child(1)"));
    assert_eq!(doc.query_selector(&selector).unwrap(), Some(leaf));
}

#[test]
fn freed_element_yields_empty_selector() {
    let mut doc = page();
    let body = doc.body();
    let area = element(&mut doc, body, "textarea", &[]);
    doc.remove(area).unwrap();

    assert_eq!(generate_selector(&doc, area), "");
}
