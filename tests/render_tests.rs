use std::io;

use page_assist::completion::client::{CompletionBackend, ReplayBackend};
use page_assist::completion::error::CompletionError;
use page_assist::dom::text_carrier::carrier_for;
use page_assist::render::stream_renderer::{RenderError, StreamSession, render};

mod common;

use crate::common::utils::{element, page, replay, sse_record, textarea};

fn ok(parts: &[&str]) -> Vec<Result<String, CompletionError>> {
    parts.iter().map(|p| Ok(p.to_string())).collect()
}

fn broken() -> Result<String, CompletionError> {
    Err(CompletionError::Stream(io::Error::new(io::ErrorKind::ConnectionReset, "reset")))
}

// =========================================================================
// Successful streams
// =========================================================================

#[test]
fn fragments_accumulate_into_the_textarea() {
    let mut doc = page();
    let area = textarea(&mut doc, "a");
    doc.set_value(area, "Say hi").unwrap();
    let carrier = carrier_for(&doc, area).unwrap();

    let stream = replay(&["Hel", "lo"]).stream_completion("sk", "m", "Say hi").unwrap();
    let reply = render(stream, &mut doc, carrier.as_ref()).unwrap();

    assert_eq!(reply, "Hello");
    assert_eq!(doc.value(area), Some("Hello"));
}

#[test]
fn each_fragment_rewrites_the_whole_buffer_and_scrolls() {
    let mut doc = page();
    let area = textarea(&mut doc, "a");
    let carrier = carrier_for(&doc, area).unwrap();
    let mut session = StreamSession::begin(&doc, carrier.as_ref());

    for (fragment, expected) in [("one\n", "one\n"), ("", "one\n"), ("two", "one\ntwo")] {
        session.apply(&mut doc, carrier.as_ref(), fragment).unwrap();
        assert_eq!(doc.value(area), Some(expected));
        assert_eq!(doc.scroll_top(area), doc.scroll_height(area));
    }
    assert_eq!(session.fragments(), 2, "empty fragments are ignored");
    assert_eq!(session.finish(), "one\ntwo");
}

#[test]
fn content_editable_target_gets_text_content() {
    let mut doc = page();
    let body = doc.body();
    let editor = element(&mut doc, body, "div", &[("contenteditable", "true")]);
    doc.set_text_content(editor, "draft").unwrap();
    let carrier = carrier_for(&doc, editor).unwrap();

    let reply = render(ok(&["Final ", "copy"]), &mut doc, carrier.as_ref()).unwrap();
    assert_eq!(reply, "Final copy");
    assert_eq!(doc.text_content(editor), "Final copy");
}

#[test]
fn empty_stream_leaves_the_target_cleared() {
    let mut doc = page();
    let area = textarea(&mut doc, "a");
    doc.set_value(area, "before").unwrap();
    let carrier = carrier_for(&doc, area).unwrap();

    let reply = render(ok(&[]), &mut doc, carrier.as_ref()).unwrap();
    assert_eq!(reply, "");
    assert_eq!(doc.value(area), Some(""));
}

// =========================================================================
// Rollback
// =========================================================================

#[test]
fn failure_mid_stream_restores_the_original_exactly() {
    for original in ["Draft reply", "", "  spaced\n\nlines  "] {
        let mut doc = page();
        let area = textarea(&mut doc, "a");
        doc.set_value(area, original).unwrap();
        let carrier = carrier_for(&doc, area).unwrap();

        let mut fragments = ok(&["partial ", "text"]);
        fragments.push(broken());
        let err = render(fragments, &mut doc, carrier.as_ref()).unwrap_err();

        assert!(matches!(err, RenderError::Completion(CompletionError::Stream(_))));
        assert_eq!(doc.value(area), Some(original));
    }
}

#[test]
fn failure_before_any_fragment_restores_the_original() {
    let mut doc = page();
    let body = doc.body();
    let editor = element(&mut doc, body, "div", &[("contenteditable", "")]);
    doc.set_text_content(editor, "keep me").unwrap();
    let carrier = carrier_for(&doc, editor).unwrap();

    let backend = ReplayBackend::new(Vec::<Vec<u8>>::new()).failing_after_chunks();
    let stream = backend.stream_completion("sk", "m", "p").unwrap();
    assert!(render(stream, &mut doc, carrier.as_ref()).is_err());
    assert_eq!(doc.text_content(editor), "keep me");
}

#[test]
fn replayed_stream_failure_restores_the_original() {
    let mut doc = page();
    let area = textarea(&mut doc, "a");
    doc.set_value(area, "Original").unwrap();
    let carrier = carrier_for(&doc, area).unwrap();

    let backend = ReplayBackend::new([sse_record("Hel")]).failing_after_chunks();
    let stream = backend.stream_completion("sk", "m", "p").unwrap();
    assert!(render(stream, &mut doc, carrier.as_ref()).is_err());
    assert_eq!(doc.value(area), Some("Original"));
}

#[test]
fn target_removed_mid_stream_is_a_dom_error() {
    let mut doc = page();
    let area = textarea(&mut doc, "a");
    let carrier = carrier_for(&doc, area).unwrap();
    let mut session = StreamSession::begin(&doc, carrier.as_ref());
    session.apply(&mut doc, carrier.as_ref(), "first").unwrap();

    doc.remove(area).unwrap();
    let err = session.apply(&mut doc, carrier.as_ref(), "second").unwrap_err();
    assert!(matches!(RenderError::from(err), RenderError::Dom(_)));

    // Nothing left to restore; rollback must not panic
    session.rollback(&mut doc, carrier.as_ref());
    assert_eq!(session.original(), "");
    assert_eq!(session.buffer(), "firstsecond");
}
