//! Tests for ghost-core: urls, wire protocol, statuses, errors

use ghost_core::*;

// ===========================================================================
// Url::new_id
// ===========================================================================

#[test]
fn new_id_is_pure() {
    let url = Url::new("weather").with_arg("city", "Paris");
    let a = url.new_id(&[("process_id", "p1")], &["x"], true);
    let b = url.clone().new_id(&[("process_id", "p1")], &["x"], true);
    assert_eq!(a, b);
}

#[test]
fn new_id_args_only_when_requested() {
    let paris = Url::new("weather").with_arg("city", "Paris");
    let tokyo = Url::new("weather").with_arg("city", "Tokyo");
    assert_ne!(paris.new_id(&[], &[], true), tokyo.new_id(&[], &[], true));
    // singleton: args excluded, the two collide intentionally
    assert_eq!(paris.new_id(&[], &[], false), tokyo.new_id(&[], &[], false));
}

#[test]
fn new_id_depends_on_extras_and_enums() {
    let url = Url::new("weather");
    let base = url.new_id(&[], &[], false);
    assert_ne!(base, url.new_id(&[("process_id", "p1")], &[], false));
    assert_ne!(base, url.new_id(&[], &["clone-1"], false));
    assert_ne!(
        url.new_id(&[], &["a", "b"], false),
        url.new_id(&[], &["b", "a"], false)
    );
}

#[test]
fn new_id_differs_by_think() {
    assert_ne!(
        Url::new("a").new_id(&[], &[], true),
        Url::new("b").new_id(&[], &[], true)
    );
}

#[test]
fn new_id_is_hex() {
    let id = Url::new("a").new_id(&[], &[], true);
    assert_eq!(id.len(), 64);
    assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
}

// ===========================================================================
// TaskStatus / TaskLevel
// ===========================================================================

#[test]
fn status_classification() {
    assert!(TaskStatus::Finished.is_final());
    assert!(TaskStatus::Dead.is_final());
    assert!(!TaskStatus::Canceling.is_final());
    for status in [
        TaskStatus::New,
        TaskStatus::Running,
        TaskStatus::Waiting,
        TaskStatus::Preempting,
        TaskStatus::Depending,
        TaskStatus::Yielding,
    ] {
        assert!(status.is_working(), "{status} should be working");
    }
    assert!(!TaskStatus::Failing.is_working());
    assert!(TaskStatus::Failing.is_withdrawing());
}

#[test]
fn status_serializes_lowercase() {
    assert_eq!(serde_json::to_string(&TaskStatus::Waiting).unwrap(), r#""waiting""#);
    assert_eq!(serde_json::to_string(&TaskLevel::Protected).unwrap(), r#""protected""#);
}

#[test]
fn level_ordering() {
    assert!(TaskLevel::Private < TaskLevel::Protected);
    assert!(TaskLevel::Protected < TaskLevel::Public);
    assert_eq!(TaskLevel::default(), TaskLevel::Public);
}

// ===========================================================================
// Protocol
// ===========================================================================

#[test]
fn input_parses_kind_keyed_body() {
    let json = r#"{
        "mid": "m1",
        "payload": { "body": { "text": { "content": "hi" }, "button": { "id": 3 } } },
        "trace": { "clone_id": "c1", "session_id": "s1" }
    }"#;
    let input: Input = serde_json::from_str(json).unwrap();
    assert_eq!(input.text_content(), Some("hi"));
    assert_eq!(input.payload.body.events["button"]["id"], 3);
    assert_eq!(input.payload.body.kinds(), vec!["text", "button"]);
    assert!(!input.stateless);
    assert_eq!(input.trace.process_id(), "s1");
}

#[test]
fn tasked_payload_parses() {
    let json = r#"{
        "mid": "m1",
        "payload": { "body": { "tasked": {
            "think": "T", "stage": "s2", "status": "waiting", "args": { "k": 1 }
        } } },
        "trace": { "clone_id": "c1", "session_id": "s1", "process_id": "p9" }
    }"#;
    let input: Input = serde_json::from_str(json).unwrap();
    let tasked = input.tasked_payload().unwrap();
    assert_eq!(tasked.status, TaskStatus::Waiting);
    assert_eq!(tasked.url(), Url::new("T").with_stage("s2").with_arg("k", 1));
    assert_eq!(input.trace.process_id(), "p9");
}

#[test]
fn output_reply_inherits_trace() {
    let input = Input::text(Trace::new("c1", "s1"), "hi").into_async();
    let output = Output::reply(&input, Some("t1".into()), MessageBody::text("hello"));
    assert_eq!(output.input_mid, input.mid);
    assert_eq!(output.trace, input.trace);
    assert!(output.is_async);
    assert_eq!(output.text(), Some("hello"));
    assert!(!output.is_quit());
}

#[test]
fn signal_serializes_uppercase() {
    let body = MessageBody::signal(SignalCode::Quit);
    let json = serde_json::to_value(&body).unwrap();
    assert_eq!(json["signal"]["code"], "QUIT");
}

#[test]
fn empty_kinds_are_skipped() {
    let json = serde_json::to_string(&MessageBody::text("x")).unwrap();
    assert_eq!(json, r#"{"text":{"content":"x"}}"#);
}

// ===========================================================================
// Errors
// ===========================================================================

#[test]
fn error_codes() {
    assert_eq!(Error::busy("p1").errcode(), codes::BUSY);
    assert_eq!(Error::context("nope").errcode(), codes::CONTEXT);
    assert_eq!(Error::context_with_code(418, "teapot").errcode(), 418);
    assert_eq!(Error::MindsetNotFound("x".into()).errcode(), codes::MINDSET_NOT_FOUND);
    assert_eq!(Error::OperatorLoop("Await".into()).errcode(), codes::OPERATOR_LOOP);
}

#[test]
fn fatal_errors() {
    assert!(Error::MindsetNotFound("x".into()).is_fatal());
    assert!(Error::StackOverflow { limit: 3, trace: String::new() }.is_fatal());
    assert!(Error::OperatorLoop("x".into()).is_fatal());
    assert!(Error::Bootstrap("x".into()).is_fatal());
    assert!(!Error::busy("p").is_fatal());
    assert!(!Error::unexpected("x").is_fatal());
    assert!(!Error::context("x").is_fatal());
}

#[test]
fn error_display() {
    assert_eq!(Error::busy("p1").to_string(), "process p1 is busy");
    assert_eq!(Error::context("bad city").to_string(), "bad city");
}
