mod common;

use addendum_triage::classifier::{
    ClassificationResult, Classifier, NO_REASONING, RequestTemplate, Verdict, parse_reply,
};
use addendum_triage::engine::{ChatReply, ServiceError};
use addendum_triage::policy::RetryPolicy;
use common::{ScriptedService, answer, timeout};
use regex::Regex;
use std::time::Duration;

fn reply(content: &str) -> ChatReply {
    ChatReply {
        content: content.to_string(),
        thinking: String::new(),
    }
}

fn template() -> RequestTemplate {
    RequestTemplate {
        model: "test-model".to_string(),
        reasoning_effort: "low".to_string(),
        instructions: "decide".to_string(),
        temperature: 0.1,
        top_p: 0.9,
        num_predict: 64,
    }
}

fn classifier<F>(svc: &ScriptedService<F>, attempts: u32) -> Classifier<&ScriptedService<F>>
where
    F: Fn(&str, usize) -> Result<ChatReply, ServiceError>,
{
    Classifier::new(
        svc,
        template(),
        RetryPolicy::immediate(attempts, Duration::from_secs(5)),
        Some(Regex::new("(?i)addend(um|a)").unwrap()),
        true,
    )
}

#[test]
fn parses_imaging_answer_with_content() {
    let r = parse_reply(&ChatReply {
        content: r#"{"is_imaging_related": true, "addendum_content": "New 4 mm nodule in the RLL."}"#
            .to_string(),
        thinking: "new finding".to_string(),
    });
    assert_eq!(r.verdict, Verdict::Imaging);
    assert_eq!(r.addendum.as_deref(), Some("New 4 mm nodule in the RLL."));
    assert_eq!(r.reasoning, "new finding");
}

#[test]
fn not_imaging_drops_content() {
    let r = parse_reply(&reply(
        r#"{"is_imaging_related": false, "addendum_content": "Results discussed with Dr. A."}"#,
    ));
    assert_eq!(r.verdict, Verdict::NotImaging);
    assert_eq!(r.addendum, None);
}

#[test]
fn accepts_yes_no_strings_and_null_content() {
    let r = parse_reply(&reply(r#"{"is_imaging_related": "Yes", "addendum_content": null}"#));
    assert_eq!(r.verdict, Verdict::Imaging);
    assert_eq!(r.addendum, None);

    let r = parse_reply(&reply(r#"{"is_imaging_related": "no", "addendum_content": null, "reasoning": "typo fix"}"#));
    assert_eq!(r.verdict, Verdict::NotImaging);
    assert_eq!(r.reasoning, "typo fix");
}

#[test]
fn missing_rationale_is_noted() {
    let r = parse_reply(&reply(r#"{"is_imaging_related": false, "addendum_content": null}"#));
    assert_eq!(r.verdict, Verdict::NotImaging);
    assert_eq!(r.reasoning, NO_REASONING);
}

#[test]
fn off_shape_answers_become_errors_with_raw_text() {
    let cases = [
        "The addendum is imaging related.",
        r#"["yes"]"#,
        r#"{"addendum_content": "x"}"#,
        r#"{"is_imaging_related": "maybe", "addendum_content": null}"#,
        r#"{"is_imaging_related": 1, "addendum_content": null}"#,
        r#"{"is_imaging_related": true}"#,
        r#"{"is_imaging_related": true, "addendum_content": 7}"#,
    ];
    for raw in cases {
        let r = parse_reply(&reply(raw));
        assert_eq!(r.verdict, Verdict::Error, "{raw}");
        assert!(r.reasoning.contains(raw), "raw answer kept for {raw}");
    }
}

#[test]
fn empty_report_skips_the_service() {
    let svc = ScriptedService::new(|_, _| Ok(answer(true, Some("x"))));
    let c = classifier(&svc, 2);
    let r = c.classify("   \r\n\t ");
    assert_eq!(r, ClassificationResult::not_imaging("Empty report"));
    assert_eq!(svc.call_count(), 0);
}

#[test]
fn report_without_marker_skips_the_service() {
    let svc = ScriptedService::new(|_, _| Ok(answer(true, Some("x"))));
    let c = classifier(&svc, 2);
    let r = c.classify("FINDINGS: Normal chest.");
    assert_eq!(r.verdict, Verdict::NotImaging);
    assert_eq!(r.reasoning, "No addendum marker found");
    assert_eq!(svc.call_count(), 0);
}

#[test]
fn transient_failure_is_retried_then_succeeds() {
    let svc = ScriptedService::new(|_, n| {
        if n == 0 {
            Err(timeout())
        } else {
            Ok(answer(true, Some("New fracture.")))
        }
    });
    let c = classifier(&svc, 3);
    let r = c.classify("ADDENDUM: new fracture of the left 5th rib.");
    assert_eq!(r.verdict, Verdict::Imaging);
    assert_eq!(r.attempts, 2);
    assert_eq!(svc.call_count(), 2);
}

#[test]
fn exhausted_retries_yield_error_verdict() {
    let svc = ScriptedService::new(|_, _| Err(timeout()));
    let c = classifier(&svc, 2);
    let r = c.classify("Addendum: something");
    assert_eq!(r.verdict, Verdict::Error);
    assert_eq!(r.attempts, 2);
    assert!(r.reasoning.contains("2 attempt(s)"));
    assert_eq!(svc.call_count(), 2);
}

#[test]
fn client_errors_and_malformed_bodies_are_not_retried() {
    let svc = ScriptedService::new(|_, _| {
        Err(ServiceError::Status {
            status: 404,
            body: "model not found".to_string(),
        })
    });
    let r = classifier(&svc, 3).classify("Addendum: x");
    assert_eq!(r.verdict, Verdict::Error);
    assert_eq!(svc.call_count(), 1);

    let svc = ScriptedService::new(|_, _| {
        Err(ServiceError::Malformed {
            message: "missing message".to_string(),
            raw: "{\"oops\":1}".to_string(),
        })
    });
    let r = classifier(&svc, 3).classify("Addendum: x");
    assert_eq!(r.verdict, Verdict::Error);
    assert!(r.reasoning.contains("{\"oops\":1}"));
    assert_eq!(svc.call_count(), 1);
}

#[test]
fn retries_use_the_longer_timeout() {
    let svc = ScriptedService::new(|_, _| Err(timeout()));
    let policy = RetryPolicy {
        max_attempts: 2,
        first_timeout: Duration::from_secs(300),
        retry_timeout: Duration::from_secs(600),
        initial_backoff: Duration::ZERO,
        backoff_multiplier: 1.0,
        max_backoff: Duration::ZERO,
    };
    let c = Classifier::new(&svc, template(), policy, None, true);
    c.classify("Addendum: x");
    assert_eq!(
        svc.timeouts(),
        vec![Duration::from_secs(300), Duration::from_secs(600)]
    );
}

#[test]
fn text_is_normalized_before_sending() {
    let svc = ScriptedService::new(|_, _| Ok(answer(false, None)));
    let c = classifier(&svc, 1);
    c.classify("  ADDENDUM:\r\nno change\u{7}  ");
    assert_eq!(svc.texts(), vec!["ADDENDUM:\nno change".to_string()]);
}

#[test]
fn backoff_grows_and_is_capped() {
    let policy = RetryPolicy {
        max_attempts: 5,
        first_timeout: Duration::from_secs(1),
        retry_timeout: Duration::from_secs(1),
        initial_backoff: Duration::from_millis(100),
        backoff_multiplier: 2.0,
        max_backoff: Duration::from_millis(300),
    };
    assert_eq!(policy.backoff_after(1), Duration::from_millis(100));
    assert_eq!(policy.backoff_after(2), Duration::from_millis(200));
    assert_eq!(policy.backoff_after(3), Duration::from_millis(300));
    assert!(policy.has_attempt_after(4));
    assert!(!policy.has_attempt_after(5));
}
