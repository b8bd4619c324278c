use std::sync::Arc;
use std::sync::Mutex;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{Value, json};

use rt_session_rs::router::Router;
use rt_session_rs::router::handlers::EventHandlers;
use rt_session_rs::router::outbound::OutboundMessage;
use rt_session_rs::router::state::SessionPhase;
use rt_session_rs::router::tools::ToolRegistry;
use rt_session_rs::{Error, ServerEvent};

fn event(value: Value) -> ServerEvent {
    serde_json::from_value(value).expect("event parses")
}

fn session_created() -> ServerEvent {
    event(json!({
        "type": "session.created",
        "event_id": "evt_1",
        "session": { "id": "sess_1", "modalities": ["text"] }
    }))
}

async fn ready_router(handlers: EventHandlers, tools: ToolRegistry) -> Router {
    let mut router = Router::new(handlers, tools);
    router.begin_connect().expect("fresh router connects");
    let out = router.dispatch(session_created()).await.expect("routes");
    assert!(out.is_empty());
    assert!(router.is_ready());
    router
}

#[derive(Clone, Default)]
struct Captured {
    texts: Arc<Mutex<Vec<String>>>,
    audio: Arc<Mutex<Vec<Vec<Vec<u8>>>>>,
    transcripts: Arc<Mutex<Vec<String>>>,
}

fn capturing_handlers(captured: &Captured) -> EventHandlers {
    let texts = Arc::clone(&captured.texts);
    let audio = Arc::clone(&captured.audio);
    let transcripts = Arc::clone(&captured.transcripts);
    EventHandlers::new()
        .on_text(move |text| {
            let texts = Arc::clone(&texts);
            async move {
                texts.lock().unwrap().push(text);
                Ok(())
            }
        })
        .on_audio(move |chunks| {
            let audio = Arc::clone(&audio);
            async move {
                audio.lock().unwrap().push(chunks);
                Ok(())
            }
        })
        .on_transcript(move |transcript| {
            let transcripts = Arc::clone(&transcripts);
            async move {
                transcripts.lock().unwrap().push(transcript);
                Ok(())
            }
        })
}

#[tokio::test]
async fn text_deltas_accumulate_into_one_handler_call() {
    let captured = Captured::default();
    let mut router = ready_router(capturing_handlers(&captured), ToolRegistry::new()).await;

    router
        .dispatch(event(json!({ "type": "response.created", "response": { "id": "resp_1" } })))
        .await
        .unwrap();
    for delta in ["Hel", "lo"] {
        router
            .dispatch(event(json!({
                "type": "response.text.delta",
                "response_id": "resp_1",
                "delta": delta
            })))
            .await
            .unwrap();
        assert!(captured.texts.lock().unwrap().is_empty());
    }
    router
        .dispatch(event(json!({ "type": "response.text.done", "response_id": "resp_1" })))
        .await
        .unwrap();

    assert_eq!(*captured.texts.lock().unwrap(), vec!["Hello".to_string()]);
    assert_eq!(router.violation_count(), 0);
}

#[tokio::test]
async fn audio_chunks_keep_arrival_order() {
    let captured = Captured::default();
    let mut router = ready_router(capturing_handlers(&captured), ToolRegistry::new()).await;

    let original: Vec<u8> = (0u8..64).collect();
    router
        .dispatch(event(json!({ "type": "response.created", "response": { "id": "resp_1" } })))
        .await
        .unwrap();
    for chunk in original.chunks(9) {
        router
            .dispatch(event(json!({
                "type": "response.audio.delta",
                "delta": BASE64.encode(chunk)
            })))
            .await
            .unwrap();
    }
    router
        .dispatch(event(json!({ "type": "response.audio.done" })))
        .await
        .unwrap();

    let audio = captured.audio.lock().unwrap();
    assert_eq!(audio.len(), 1);
    assert_eq!(audio[0].concat(), original);
}

#[tokio::test]
async fn duplicate_response_created_counts_a_violation() {
    let mut router = ready_router(EventHandlers::new(), ToolRegistry::new()).await;

    router
        .dispatch(event(json!({ "type": "response.created", "response": { "id": "resp_1" } })))
        .await
        .unwrap();
    router
        .dispatch(event(json!({ "type": "response.created", "response": { "id": "resp_2" } })))
        .await
        .unwrap();

    assert_eq!(router.violation_count(), 1);
}

#[tokio::test]
async fn delta_without_active_response_is_dropped() {
    let captured = Captured::default();
    let mut router = ready_router(capturing_handlers(&captured), ToolRegistry::new()).await;

    router
        .dispatch(event(json!({ "type": "response.text.delta", "delta": "stray" })))
        .await
        .unwrap();

    assert_eq!(router.violation_count(), 1);
    assert!(captured.texts.lock().unwrap().is_empty());
}

#[tokio::test]
async fn duplicate_done_counts_a_violation_and_emits_once() {
    let captured = Captured::default();
    let mut router = ready_router(capturing_handlers(&captured), ToolRegistry::new()).await;

    router
        .dispatch(event(json!({ "type": "response.created", "response": { "id": "resp_1" } })))
        .await
        .unwrap();
    router
        .dispatch(event(json!({ "type": "response.text.delta", "delta": "hi" })))
        .await
        .unwrap();
    router
        .dispatch(event(json!({ "type": "response.text.done" })))
        .await
        .unwrap();
    router
        .dispatch(event(json!({ "type": "response.text.done" })))
        .await
        .unwrap();

    assert_eq!(*captured.texts.lock().unwrap(), vec!["hi".to_string()]);
    assert_eq!(router.violation_count(), 1);
}

#[tokio::test]
async fn response_done_force_seals_open_streams() {
    let captured = Captured::default();
    let mut router = ready_router(capturing_handlers(&captured), ToolRegistry::new()).await;

    router
        .dispatch(event(json!({ "type": "response.created", "response": { "id": "resp_1" } })))
        .await
        .unwrap();
    router
        .dispatch(event(json!({ "type": "response.text.delta", "delta": "partial" })))
        .await
        .unwrap();
    router
        .dispatch(event(json!({
            "type": "response.done",
            "response": { "id": "resp_1", "status": "completed" }
        })))
        .await
        .unwrap();

    // The partial text is still delivered, but the missing text.done counts.
    assert_eq!(*captured.texts.lock().unwrap(), vec!["partial".to_string()]);
    assert_eq!(router.violation_count(), 1);
}

#[derive(Deserialize, JsonSchema)]
struct WeatherArgs {
    location: String,
}

fn weather_tools() -> ToolRegistry {
    let mut tools = ToolRegistry::new();
    tools.tool("get_weather", |args: WeatherArgs| async move {
        Ok(json!({ "location": args.location, "temp_c": 21 }))
    });
    tools
}

#[tokio::test]
async fn tool_call_resolves_to_result_and_response_request() {
    let mut router = ready_router(EventHandlers::new(), weather_tools()).await;

    router
        .dispatch(event(json!({ "type": "response.created", "response": { "id": "resp_1" } })))
        .await
        .unwrap();
    for delta in ["{\"loca", "tion\":\"Oslo\"}"] {
        let out = router
            .dispatch(event(json!({
                "type": "response.function_call_arguments.delta",
                "call_id": "call_1",
                "delta": delta
            })))
            .await
            .unwrap();
        assert!(out.is_empty());
    }
    let out = router
        .dispatch(event(json!({
            "type": "response.function_call_arguments.done",
            "call_id": "call_1",
            "name": "get_weather"
        })))
        .await
        .unwrap();

    assert_eq!(out.len(), 2);
    let submission = serde_json::to_value(&out[0]).unwrap();
    assert_eq!(
        submission.get("type"),
        Some(&json!("conversation.item.create"))
    );
    assert_eq!(
        submission.pointer("/item/type"),
        Some(&json!("function_call_output"))
    );
    assert_eq!(submission.pointer("/item/call_id"), Some(&json!("call_1")));
    let output: Value =
        serde_json::from_str(submission.pointer("/item/output").unwrap().as_str().unwrap())
            .unwrap();
    assert_eq!(output, json!({ "location": "Oslo", "temp_c": 21 }));

    let follow_up = serde_json::to_value(&out[1]).unwrap();
    assert_eq!(follow_up.get("type"), Some(&json!("response.create")));
    assert_eq!(router.violation_count(), 0);
}

#[tokio::test]
async fn unknown_function_resolves_to_error_result() {
    let mut router = ready_router(EventHandlers::new(), weather_tools()).await;

    let out = router
        .dispatch(event(json!({
            "type": "response.function_call_arguments.done",
            "call_id": "call_1",
            "name": "get_stock_price",
            "arguments": "{}"
        })))
        .await
        .unwrap();

    assert_eq!(out.len(), 2);
    let submission = serde_json::to_value(&out[0]).unwrap();
    let output = submission.pointer("/item/output").unwrap().as_str().unwrap();
    assert!(output.contains("unknown function"));
}

#[tokio::test]
async fn malformed_arguments_resolve_to_error_result() {
    let mut router = ready_router(EventHandlers::new(), weather_tools()).await;

    router
        .dispatch(event(json!({
            "type": "response.function_call_arguments.delta",
            "call_id": "call_1",
            "delta": "{\"location\": oops"
        })))
        .await
        .unwrap();
    let out = router
        .dispatch(event(json!({
            "type": "response.function_call_arguments.done",
            "call_id": "call_1",
            "name": "get_weather"
        })))
        .await
        .unwrap();

    assert_eq!(out.len(), 2);
    let submission = serde_json::to_value(&out[0]).unwrap();
    let output = submission.pointer("/item/output").unwrap().as_str().unwrap();
    assert!(output.contains("not valid JSON"));
}

#[tokio::test]
async fn tool_call_handler_overrides_registry() {
    let handlers = EventHandlers::new().on_tool_call(|call| async move {
        Ok(rt_session_rs::ToolResult {
            call_id: call.call_id,
            output: json!("handled elsewhere"),
        })
    });
    let mut router = ready_router(handlers, weather_tools()).await;

    let out = router
        .dispatch(event(json!({
            "type": "response.function_call_arguments.done",
            "call_id": "call_1",
            "name": "get_weather",
            "arguments": "{\"location\":\"Oslo\"}"
        })))
        .await
        .unwrap();

    let submission = serde_json::to_value(&out[0]).unwrap();
    assert_eq!(
        submission.pointer("/item/output"),
        Some(&json!("\"handled elsewhere\""))
    );
}

#[tokio::test]
async fn unknown_event_tag_is_routed_to_unhandled() {
    let seen = Arc::new(Mutex::new(Vec::<Value>::new()));
    let sink = Arc::clone(&seen);
    let handlers = EventHandlers::new().on_unhandled(move |raw| {
        let sink = Arc::clone(&sink);
        async move {
            sink.lock().unwrap().push(raw);
            Ok(())
        }
    });
    let mut router = ready_router(handlers, ToolRegistry::new()).await;

    let out = router
        .dispatch(event(json!({ "type": "conversation.updated.v2", "payload": { "n": 1 } })))
        .await
        .unwrap();

    assert!(out.is_empty());
    assert_eq!(router.violation_count(), 0);
    assert!(router.is_ready());
    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].get("type"), Some(&json!("conversation.updated.v2")));
}

#[tokio::test]
async fn events_after_close_are_no_ops() {
    let captured = Captured::default();
    let mut router = ready_router(capturing_handlers(&captured), ToolRegistry::new()).await;
    router.close();
    assert_eq!(router.phase(), SessionPhase::Closed);

    router
        .dispatch(event(json!({ "type": "response.created", "response": { "id": "resp_1" } })))
        .await
        .unwrap();
    router
        .dispatch(event(json!({ "type": "response.text.delta", "delta": "late" })))
        .await
        .unwrap();
    let out = router
        .dispatch(event(json!({
            "type": "response.function_call_arguments.done",
            "call_id": "call_1",
            "name": "get_weather",
            "arguments": "{}"
        })))
        .await
        .unwrap();

    assert!(out.is_empty());
    assert_eq!(router.violation_count(), 0);
    assert!(captured.texts.lock().unwrap().is_empty());
}

#[tokio::test]
async fn cancelled_response_discards_partial_output() {
    let captured = Captured::default();
    let mut router = ready_router(capturing_handlers(&captured), ToolRegistry::new()).await;

    router
        .dispatch(event(json!({ "type": "response.created", "response": { "id": "resp_1" } })))
        .await
        .unwrap();
    router
        .dispatch(event(json!({ "type": "response.text.delta", "delta": "never heard" })))
        .await
        .unwrap();
    router
        .dispatch(event(json!({ "type": "response.cancelled", "response_id": "resp_1" })))
        .await
        .unwrap();

    assert!(captured.texts.lock().unwrap().is_empty());
    assert_eq!(router.violation_count(), 0);

    // A fresh response can start cleanly afterwards.
    router
        .dispatch(event(json!({ "type": "response.created", "response": { "id": "resp_2" } })))
        .await
        .unwrap();
    assert_eq!(router.violation_count(), 0);
}

#[tokio::test]
async fn outbound_is_gated_on_readiness() {
    let mut router = Router::new(EventHandlers::new(), ToolRegistry::new());
    router.begin_connect().unwrap();

    let result = router.prepare_send(OutboundMessage::user_message("early").unwrap());
    assert!(matches!(
        result,
        Err(Error::InvalidState(SessionPhase::Connecting))
    ));

    router.dispatch(session_created()).await.unwrap();
    assert!(
        router
            .prepare_send(OutboundMessage::user_message("now").unwrap())
            .is_ok()
    );
}

#[tokio::test]
async fn manual_result_for_resolved_call_is_rejected() {
    let mut router = ready_router(EventHandlers::new(), weather_tools()).await;

    router
        .dispatch(event(json!({
            "type": "response.function_call_arguments.done",
            "call_id": "call_1",
            "name": "get_weather",
            "arguments": "{\"location\":\"Oslo\"}"
        })))
        .await
        .unwrap();

    let manual = OutboundMessage::tool_result("call_1", json!({ "temp_c": -5 })).unwrap();
    assert!(matches!(
        router.prepare_send(manual),
        Err(Error::UnknownToolCallId(id)) if id == "call_1"
    ));

    let never_seen = OutboundMessage::tool_result("call_9", json!(null)).unwrap();
    assert!(matches!(
        router.prepare_send(never_seen),
        Err(Error::UnknownToolCallId(id)) if id == "call_9"
    ));
}

#[tokio::test]
async fn manual_submission_retires_the_call() {
    let mut router = ready_router(EventHandlers::new(), weather_tools()).await;

    router
        .dispatch(event(json!({ "type": "response.created", "response": { "id": "resp_1" } })))
        .await
        .unwrap();
    router
        .dispatch(event(json!({
            "type": "response.function_call_arguments.delta",
            "call_id": "call_1",
            "delta": "{\"location\":\"Oslo\"}"
        })))
        .await
        .unwrap();

    let manual = OutboundMessage::tool_result("call_1", json!({ "temp_c": -5 })).unwrap();
    assert!(router.prepare_send(manual).is_ok());
    router.mark_submitted("call_1");

    // The server's done for the same call must not produce a second result.
    let out = router
        .dispatch(event(json!({
            "type": "response.function_call_arguments.done",
            "call_id": "call_1",
            "name": "get_weather"
        })))
        .await
        .unwrap();

    assert!(out.is_empty());
    assert_eq!(router.violation_count(), 1);
}

#[tokio::test]
async fn created_items_reach_the_handler() {
    let items = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&items);
    let handlers = EventHandlers::new().on_item_created(move |item| {
        let sink = Arc::clone(&sink);
        async move {
            sink.lock().unwrap().push(item);
            Ok(())
        }
    });
    let mut router = ready_router(handlers, ToolRegistry::new()).await;

    router
        .dispatch(event(json!({
            "type": "conversation.item.created",
            "previous_item_id": null,
            "item": {
                "type": "message",
                "id": "item_1",
                "role": "user",
                "content": [{ "type": "input_text", "text": "hi" }]
            }
        })))
        .await
        .unwrap();

    let items = items.lock().unwrap();
    assert_eq!(items.len(), 1);
    assert!(matches!(
        &items[0],
        rt_session_rs::Item::Message { id: Some(id), .. } if id == "item_1"
    ));
}

#[tokio::test]
async fn turn_signals_reach_the_handler() {
    let signals = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&signals);
    let handlers = EventHandlers::new().on_turn_signal(move |signal| {
        let sink = Arc::clone(&sink);
        async move {
            sink.lock().unwrap().push(signal);
            Ok(())
        }
    });
    let mut router = ready_router(handlers, ToolRegistry::new()).await;

    router
        .dispatch(event(json!({
            "type": "input_audio_buffer.speech_started",
            "audio_start_ms": 120
        })))
        .await
        .unwrap();
    router
        .dispatch(event(json!({
            "type": "input_audio_buffer.speech_stopped",
            "audio_end_ms": 880
        })))
        .await
        .unwrap();
    router
        .dispatch(event(json!({
            "type": "input_audio_buffer.committed",
            "item_id": "item_7"
        })))
        .await
        .unwrap();

    use rt_session_rs::TurnSignal;
    assert_eq!(
        *signals.lock().unwrap(),
        vec![
            TurnSignal::SpeechStarted {
                audio_start_ms: Some(120)
            },
            TurnSignal::SpeechStopped {
                audio_end_ms: Some(880)
            },
            TurnSignal::Committed {
                item_id: Some("item_7".to_string())
            },
        ]
    );
}
