use serde_json::json;

use rt_session_rs::protocol::client_events::ClientEvent;
use rt_session_rs::protocol::models::{Item, SessionConfig};
use rt_session_rs::{ErrorPayload, ServerEvent};

#[test]
fn parses_session_created() {
    let raw = r#"{
        "type": "session.created",
        "event_id": "evt_1",
        "session": {
            "id": "sess_abc",
            "modalities": ["text", "audio"],
            "voice": "alloy",
            "turn_detection": { "type": "server_vad", "threshold": 0.5 }
        }
    }"#;

    let event: ServerEvent = serde_json::from_str(raw).expect("parses");
    match event {
        ServerEvent::SessionCreated { event_id, session } => {
            assert_eq!(event_id.as_deref(), Some("evt_1"));
            assert_eq!(session.id.as_deref(), Some("sess_abc"));
            assert_eq!(session.config.voice.as_deref(), Some("alloy"));
            assert_eq!(
                session
                    .config
                    .turn_detection
                    .as_ref()
                    .and_then(|td| td.threshold),
                Some(0.5)
            );
        }
        other => panic!("unexpected variant: {other:?}"),
    }
}

#[test]
fn parses_text_delta_without_optional_ids() {
    let raw = r#"{ "type": "response.text.delta", "delta": "Hel" }"#;
    let event: ServerEvent = serde_json::from_str(raw).expect("parses");
    match event {
        ServerEvent::ResponseTextDelta {
            response_id,
            item_id,
            delta,
            ..
        } => {
            assert_eq!(response_id, None);
            assert_eq!(item_id, None);
            assert_eq!(delta, "Hel");
        }
        other => panic!("unexpected variant: {other:?}"),
    }
}

#[test]
fn parses_function_call_arguments_done() {
    let raw = r#"{
        "type": "response.function_call_arguments.done",
        "event_id": "evt_9",
        "response_id": "resp_1",
        "call_id": "call_1",
        "name": "get_weather",
        "arguments": "{\"location\":\"Oslo\"}"
    }"#;
    let event: ServerEvent = serde_json::from_str(raw).expect("parses");
    match event {
        ServerEvent::ResponseFunctionCallArgumentsDone {
            call_id,
            name,
            arguments,
            ..
        } => {
            assert_eq!(call_id, "call_1");
            assert_eq!(name.as_deref(), Some("get_weather"));
            assert_eq!(arguments.as_deref(), Some("{\"location\":\"Oslo\"}"));
        }
        other => panic!("unexpected variant: {other:?}"),
    }
}

#[test]
fn error_payload_accepts_both_wire_shapes() {
    let detail: ServerEvent = serde_json::from_str(
        r#"{ "type": "error", "error": { "message": "boom", "code": "server_error" } }"#,
    )
    .expect("parses");
    match detail {
        ServerEvent::Error { error, .. } => {
            assert_eq!(error.message(), "boom");
            assert!(matches!(error, ErrorPayload::Detail { .. }));
        }
        other => panic!("unexpected variant: {other:?}"),
    }

    let text: ServerEvent =
        serde_json::from_str(r#"{ "type": "error", "error": "plain failure" }"#).expect("parses");
    match text {
        ServerEvent::Error { error, .. } => {
            assert_eq!(error.message(), "plain failure");
            assert!(matches!(error, ErrorPayload::Text(_)));
        }
        other => panic!("unexpected variant: {other:?}"),
    }
}

#[test]
fn unknown_tag_round_trips_as_raw_json() {
    let raw = r#"{ "type": "rate_limits.updated", "event_id": "evt_5", "rate_limits": [] }"#;
    let event: ServerEvent = serde_json::from_str(raw).expect("never fails on unknown tags");
    match &event {
        ServerEvent::Unknown(value) => {
            assert_eq!(value.get("type"), Some(&json!("rate_limits.updated")));
        }
        other => panic!("unexpected variant: {other:?}"),
    }
    assert_eq!(event.event_id(), Some("evt_5"));
}

#[test]
fn known_tag_with_bad_payload_degrades_to_unknown() {
    // `delta` must be a string; routing still must not fail.
    let raw = r#"{ "type": "response.text.delta", "delta": 42 }"#;
    let event: ServerEvent = serde_json::from_str(raw).expect("parses");
    assert!(matches!(event, ServerEvent::Unknown(_)));
}

#[test]
fn event_id_accessor_covers_known_variants() {
    let event: ServerEvent = serde_json::from_str(
        r#"{ "type": "response.created", "event_id": "evt_3", "response": { "id": "resp_1" } }"#,
    )
    .expect("parses");
    assert_eq!(event.event_id(), Some("evt_3"));
}

#[test]
fn session_update_serializes_sparsely() {
    let event = ClientEvent::SessionUpdate {
        event_id: None,
        session: Box::new(SessionConfig::new().with_instructions("Short answers.")),
    };
    let value = serde_json::to_value(&event).unwrap();
    assert_eq!(
        value,
        json!({
            "type": "session.update",
            "session": { "instructions": "Short answers." }
        })
    );
}

#[test]
fn conversation_item_create_wire_shape() {
    let event = ClientEvent::ConversationItemCreate {
        event_id: Some("evt_c1".to_string()),
        previous_item_id: None,
        item: Box::new(Item::user_text("hello")),
    };
    let value = serde_json::to_value(&event).unwrap();
    assert_eq!(
        value,
        json!({
            "type": "conversation.item.create",
            "event_id": "evt_c1",
            "item": {
                "type": "message",
                "role": "user",
                "content": [{ "type": "input_text", "text": "hello" }]
            }
        })
    );
}

#[test]
fn response_create_omits_absent_config() {
    let value = serde_json::to_value(ClientEvent::ResponseCreate {
        event_id: None,
        response: None,
    })
    .unwrap();
    assert_eq!(value, json!({ "type": "response.create" }));
}

#[test]
fn client_events_round_trip() {
    let events = vec![
        ClientEvent::InputAudioBufferAppend {
            event_id: None,
            audio: "cGNtMTY=".to_string(),
        },
        ClientEvent::InputAudioBufferCommit { event_id: None },
        ClientEvent::InputAudioBufferClear { event_id: None },
        ClientEvent::ResponseCancel {
            event_id: None,
            response_id: Some("resp_1".to_string()),
        },
    ];
    for event in events {
        let json = serde_json::to_string(&event).unwrap();
        let back: ClientEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }
}
