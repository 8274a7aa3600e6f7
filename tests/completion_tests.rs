use page_assist::completion::{
    api::{ChatRequest, StreamChunk},
    client::{ClientOptions, CompletionBackend, CompletionClient, ReplayBackend, check_credentials},
    error::{CompletionError, PayloadError},
    sse::{Fragments, SseDecoder, SseEvent, parse_delta},
};
use serde_json::json;

mod common;

use crate::common::utils::{sse_body, sse_record};

fn collect(backend: &dyn CompletionBackend) -> Vec<Result<String, CompletionError>> {
    backend.stream_completion("sk-test", "gpt-test", "prompt").unwrap().collect()
}

// =========================================================================
// Wire format
// =========================================================================

#[test]
fn request_body_is_a_single_streaming_user_message() {
    let request = ChatRequest::streaming_user_prompt("gpt-4o-mini", "Fix: helo");
    assert_eq!(
        serde_json::to_value(&request).unwrap(),
        json!({
            "model": "gpt-4o-mini",
            "messages": [{ "role": "user", "content": "Fix: helo" }],
            "stream": true
        })
    );
}

#[test]
fn delta_extraction_tolerates_missing_fields() {
    assert_eq!(parse_delta(r#"{"choices":[{"delta":{"content":"Hi"}}]}"#).unwrap().as_deref(), Some("Hi"));
    assert_eq!(parse_delta(r#"{"choices":[{"delta":{"role":"assistant"}}]}"#).unwrap(), None);
    assert_eq!(parse_delta(r#"{"choices":[]}"#).unwrap(), None);
    assert_eq!(parse_delta(r#"{"id":"x"}"#).unwrap(), None);
    assert!(matches!(parse_delta("{oops"), Err(PayloadError::Json(_))));

    let chunk: StreamChunk = serde_json::from_str(r#"{"choices":[{"delta":null}]}"#).unwrap();
    assert_eq!(chunk.into_content(), None);
}

#[test]
fn decoder_accepts_data_without_space_and_flags_bad_utf8() {
    let mut decoder = SseDecoder::new();
    let mut events = decoder.push(b"data:{\"choices\":[]}\n");
    events.extend(decoder.push(b"data: \xff\xfe\n"));
    events.extend(decoder.push(b"data: [DONE]"));
    events.extend(decoder.finish());

    assert!(matches!(&events[0], SseEvent::Data(p) if p == "{\"choices\":[]}"));
    assert!(matches!(&events[1], SseEvent::Malformed(PayloadError::Encoding)));
    assert!(matches!(&events[2], SseEvent::Done), "unterminated trailing record is flushed");
}

// =========================================================================
// Fragment iteration
// =========================================================================

#[test]
fn fragments_skip_noise_and_stop_at_done() {
    let body = format!(
        "{}: comment\n\ndata: {{not json}}\n\n{}data: [DONE]\n\n{}",
        sse_record("Hel"),
        sse_record("lo"),
        sse_record("after done")
    );
    let mut fragments = Fragments::new(body.as_bytes());

    let texts: Vec<String> = fragments.by_ref().map(Result::unwrap).collect();
    assert_eq!(texts, vec!["Hel", "lo"]);
    assert_eq!(fragments.skipped(), 1);
}

#[test]
fn record_split_across_reads_is_one_fragment() {
    let record = sse_record("héllo");
    let bytes = record.as_bytes();
    let split = record.find("é").unwrap() + 1;
    let backend = ReplayBackend::new([bytes[..split].to_vec(), bytes[split..].to_vec()]);

    let texts: Vec<String> = collect(&backend).into_iter().map(Result::unwrap).collect();
    assert_eq!(texts, vec!["héllo"]);
}

#[test]
fn empty_deltas_are_not_fragments() {
    let backend = ReplayBackend::new([sse_record(""), sse_record("x"), sse_record("")]);
    let texts: Vec<String> = collect(&backend).into_iter().map(Result::unwrap).collect();
    assert_eq!(texts, vec!["x"]);
}

#[test]
fn broken_stream_yields_one_error_then_ends() {
    let backend = ReplayBackend::new([sse_record("partial")]).failing_after_chunks();
    let items = collect(&backend);

    assert_eq!(items.len(), 2);
    assert_eq!(items[0].as_ref().unwrap(), "partial");
    assert!(matches!(items[1], Err(CompletionError::Stream(_))));
}

// =========================================================================
// Credentials and refusals
// =========================================================================

#[test]
fn missing_credentials_fail_before_any_request() {
    assert!(check_credentials("", "m").unwrap_err().is_config());
    assert!(check_credentials("k", " ").unwrap_err().is_config());
    assert!(check_credentials("k", "m").is_ok());

    let backend = ReplayBackend::new([sse_record("never")]);
    let err = backend.stream_completion("", "gpt-test", "p").err().unwrap();
    assert!(matches!(err, CompletionError::Config(ref what) if what == "API key"));
    assert!(!err.is_transport());
}

#[test]
fn rejected_request_is_a_transport_error() {
    let err = ReplayBackend::rejecting(401).stream_completion("sk", "m", "p").err().unwrap();
    assert!(matches!(err, CompletionError::Status { status: 401, .. }));
    assert!(err.is_transport());
}

// =========================================================================
// HTTP client against a mock endpoint
// =========================================================================

mod http {
    use super::*;
    use wiremock::{Mock, MockServer, ResponseTemplate, matchers};

    fn client_for(server_uri: &str) -> CompletionClient {
        CompletionClient::new(ClientOptions {
            endpoint: format!("{}/v1/chat/completions", server_uri),
            ..Default::default()
        })
        .unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn streams_fragments_from_the_endpoint() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .and(matchers::path("/v1/chat/completions"))
            .and(matchers::header("authorization", "Bearer sk-test"))
            .and(matchers::body_partial_json(json!({
                "model": "gpt-test",
                "stream": true,
                "messages": [{ "role": "user", "content": "Say hi" }]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_raw(sse_body(&["Hel", "lo"]), "text/event-stream"))
            .expect(1)
            .mount(&server)
            .await;

        let uri = server.uri();
        let texts = tokio::task::spawn_blocking(move || {
            let client = client_for(&uri);
            client
                .stream_completion("sk-test", "gpt-test", "Say hi")
                .unwrap()
                .collect::<Result<Vec<String>, CompletionError>>()
        })
        .await
        .unwrap()
        .unwrap();

        assert_eq!(texts, vec!["Hel", "lo"]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn error_status_carries_the_body() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("{\"error\":\"bad key\"}"))
            .mount(&server)
            .await;

        let uri = server.uri();
        let err = tokio::task::spawn_blocking(move || {
            client_for(&uri).stream_completion("sk-wrong", "gpt-test", "hi").err()
        })
        .await
        .unwrap()
        .unwrap();

        match err {
            CompletionError::Status { status, body } => {
                assert_eq!(status, 401);
                assert!(body.contains("bad key"));
            }
            other => panic!("expected status error, got {:?}", other),
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn missing_model_never_reaches_the_endpoint() {
        let server = MockServer::start().await;
        Mock::given(matchers::any())
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let uri = server.uri();
        let err = tokio::task::spawn_blocking(move || client_for(&uri).stream_completion("sk-test", "", "hi").err())
            .await
            .unwrap()
            .unwrap();

        assert!(err.is_config());
    }

    #[test]
    fn unreachable_endpoint_is_a_network_error() {
        let client = CompletionClient::new(ClientOptions {
            endpoint: "http://127.0.0.1:9/v1/chat/completions".into(),
            ..Default::default()
        })
        .unwrap();

        let err = client.stream_completion("sk", "m", "p").err().unwrap();
        assert!(matches!(err, CompletionError::Network(_)));
        assert!(err.is_transport());
    }
}
