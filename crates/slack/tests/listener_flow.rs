use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use mockito::Matcher;
use serde_json::json;
use triage_slack::agent_client::{AgentClient, AgentClientError};
use triage_slack::events::HandlerResult;
use triage_slack::listener::{ListenerError, ListenerResponse, RequestHeaders, SlackListener};
use triage_slack::signature::{SignatureError, SignatureVerifier};
use triage_slack::web::HttpSlackWebApi;
use triage_slack::default_dispatcher;

const SIGNING_SECRET: &str = "listener-test-secret";

struct CannedAgent;

#[async_trait]
impl AgentClient for CannedAgent {
    async fn invoke(
        &self,
        message: &str,
        _correlation_id: &str,
    ) -> Result<String, AgentClientError> {
        Ok(format!("I filed **a bug** for: {message}"))
    }
}

fn verifier() -> SignatureVerifier {
    SignatureVerifier::new(SIGNING_SECRET.to_owned().into(), Duration::from_secs(300))
}

fn signed(body: &str) -> RequestHeaders {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).expect("clock").as_secs().to_string();
    let signature = verifier().sign(&now, body.as_bytes()).expect("sign");
    RequestHeaders { timestamp: Some(now), signature: Some(signature), retry_num: None }
}

fn listener(slack_api: &str) -> SlackListener {
    let web = Arc::new(
        HttpSlackWebApi::new(slack_api, "xoxb-test".to_owned().into(), Duration::from_secs(5))
            .expect("web client"),
    );
    let dispatcher = default_dispatcher(Arc::new(CannedAgent), web.clone(), "all-ai-tools-testing");
    SlackListener::new(verifier(), dispatcher, web)
}

fn message_event(event_id: &str) -> String {
    json!({
        "type": "event_callback",
        "team_id": "T1",
        "event_id": event_id,
        "event": {
            "type": "message",
            "channel": "CTEST",
            "user": "U1",
            "text": "The export button crashes",
            "ts": "1700000000.000100"
        }
    })
    .to_string()
}

#[tokio::test]
async fn url_verification_echoes_challenge() {
    let listener = listener("http://127.0.0.1:9");
    let body = r#"{"type":"url_verification","challenge":"3eZbrw1aBm2rZgRNFdxV2595E9CY3gmdALWMmHkvFXO7tYXAYM8P","token":"x"}"#;

    let response = listener.accept(&signed(body), body.as_bytes()).await.expect("accepted");

    assert_eq!(
        response,
        ListenerResponse::Challenge(
            "3eZbrw1aBm2rZgRNFdxV2595E9CY3gmdALWMmHkvFXO7tYXAYM8P".to_owned()
        )
    );
}

#[tokio::test]
async fn unsigned_or_tampered_requests_are_rejected() {
    let listener = listener("http://127.0.0.1:9");
    let body = message_event("Ev1");

    let unsigned = listener.accept(&RequestHeaders::default(), body.as_bytes()).await;
    let error = unsigned.expect_err("unsigned");
    assert_eq!(error.status_code(), 401);

    let headers = signed(&body);
    let tampered = body.replace("crashes", "works");
    let error = listener.accept(&headers, tampered.as_bytes()).await.expect_err("tampered");
    assert!(matches!(error, ListenerError::Signature(SignatureError::Mismatch)));
}

#[tokio::test]
async fn message_is_answered_in_thread_and_redeliveries_are_dropped() {
    let mut slack = mockito::Server::new_async().await;
    let lookup = slack
        .mock("GET", "/conversations.info")
        .match_query(Matcher::UrlEncoded("channel".into(), "CTEST".into()))
        .with_status(200)
        .with_body(
            r#"{"ok": true, "channel": {"id": "CTEST", "name": "all-ai-tools-testing", "name_normalized": "all-ai-tools-testing"}}"#,
        )
        .expect(1)
        .create_async()
        .await;
    let post = slack
        .mock("POST", "/chat.postMessage")
        .match_body(Matcher::Json(json!({
            "channel": "CTEST",
            "thread_ts": "1700000000.000100",
            "text": "I filed *a bug* for: The export button crashes"
        })))
        .with_status(200)
        .with_body(r#"{"ok": true}"#)
        .expect(1)
        .create_async()
        .await;
    let listener = listener(&slack.url());
    let body = message_event("Ev42");

    let ListenerResponse::Accepted(envelope) =
        listener.accept(&signed(&body), body.as_bytes()).await.expect("accepted")
    else {
        panic!("expected the event to be accepted");
    };
    let result = listener.process(&envelope).await.expect("processed");
    assert!(matches!(result, HandlerResult::Responded(_)));

    let again = listener.accept(&signed(&body), body.as_bytes()).await.expect("acknowledged");
    assert_eq!(again, ListenerResponse::Duplicate { event_id: "Ev42".to_owned() });

    let mut retry_headers = signed(&message_event("Ev43"));
    retry_headers.retry_num = Some("1".to_owned());
    let retried = listener
        .accept(&retry_headers, message_event("Ev43").as_bytes())
        .await
        .expect("acknowledged");
    assert_eq!(retried, ListenerResponse::Duplicate { event_id: "Ev43".to_owned() });

    lookup.assert_async().await;
    post.assert_async().await;
}

#[tokio::test]
async fn unknown_payload_types_are_acknowledged() {
    let listener = listener("http://127.0.0.1:9");
    let body = r#"{"type":"app_rate_limited","minute_rate_limited":1518467820}"#;

    let response = listener.accept(&signed(body), body.as_bytes()).await.expect("acknowledged");

    assert_eq!(response, ListenerResponse::Acknowledged);
}

#[tokio::test]
async fn team_join_is_accepted_and_ignored() {
    let listener = listener("http://127.0.0.1:9");
    let body = json!({
        "type": "event_callback",
        "event_id": "EvJoin",
        "event": {"type": "team_join", "user": {"id": "U7", "real_name": "New Hire"}}
    })
    .to_string();

    let response = listener.accept(&signed(&body), body.as_bytes()).await.expect("accepted");
    let ListenerResponse::Accepted(envelope) = response else {
        panic!("expected the event to be accepted, got {response:?}");
    };

    let handled = listener.process(&envelope).await.expect("processed");
    assert_eq!(handled, HandlerResult::Ignored);
}
