//! End-to-end tests for the HTTP routes, driven through the router with the
//! in-memory store and scripted integrations.

mod common;

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use serde_json::{json, Value};
use tower::util::ServiceExt; // for `oneshot`

use common::*;
use repair_desk::store::Store;
use repair_desk::types::ESCALATION_REPLY;

async fn seed_brake_shops(harness: &Harness) {
    harness
        .add_provider("Brake Masters", &["Brakes & Rotors"], 40.01, -74.0)
        .await;
    harness
        .add_provider("Stop Shop", &["Tires", "brakes"], 40.1, -74.0)
        .await;
    harness.add_provider("Far Brakes", &["Brakes"], 41.0, -74.0).await;
    harness.add_provider("Fourth Brake", &["Brakes"], 42.0, -74.0).await;
    harness.add_provider("Engine Pros", &["Engine"], 40.0, -74.0).await;
    harness
        .add_provider("Brake Repair Co", &["Brake Repair"], 40.0, -74.0)
        .await;
}

async fn call(harness: &Harness, request: Request<Body>) -> (StatusCode, Value) {
    let response = harness.router().oneshot(request).await.unwrap();
    let status = response.status();
    (status, extract_json(response.into_body()).await)
}

#[tokio::test]
async fn health_reports_ok() {
    let harness = Harness::new();
    let (status, body) = call(&harness, empty_request("GET", "/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], json!(true));
    assert!(body["now"].is_string());
}

#[tokio::test]
async fn submitted_issue_is_matched_to_closest_category_shops() {
    let harness = Harness::new();
    seed_brake_shops(&harness).await;

    let (status, outcome) = call(
        &harness,
        json_request(
            "POST",
            "/api/leads",
            json!({
                "userId": "user-1",
                "address": "350 5th Ave, New York",
                "issueDescription": "Squealing noise every time I brake",
                "carModel": "Civic 2015"
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(outcome.get("error").is_none());
    let names = outcome["result"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["name"].as_str().unwrap().to_string())
        .collect::<Vec<_>>();
    assert_eq!(names, vec!["Brake Masters", "Stop Shop", "Far Brakes"]);
    assert_eq!(
        step_names(&outcome),
        vec![
            "Geocode Address",
            "Extract Coordinates",
            "Parse Issue",
            "Save Lead",
            "Find Providers",
            "Sort & Filter Providers",
            "Assign Providers to Lead",
            "Notify Providers",
        ]
    );

    let sent = harness.mailer.sent.lock().unwrap().clone();
    assert_eq!(sent.len(), 3);
    assert!(sent
        .iter()
        .all(|(_, subject)| subject == "New Auto Repair Request"));

    let leads = harness.store.list_leads().await.unwrap();
    assert_eq!(leads.len(), 1);
    let lead = &leads[0];
    assert_eq!(lead.car_model, "Civic 2015");
    assert_eq!(lead.issue_category.as_deref(), Some("Brakes"));
    assert_eq!(lead.issue_description, "Brakes squeal when stopping.");
    assert_eq!(lead.latitude, Some(40.0));
    assert_eq!(lead.assigned_providers.len(), 3);
}

#[tokio::test]
async fn failed_notification_keeps_provider_in_result() {
    let harness = Harness::with(
        RecordingMailer {
            fail_for: Some("stop-shop@shops.test".to_string()),
            ..Default::default()
        },
        Arc::new(StaticMedia),
    );
    seed_brake_shops(&harness).await;

    let (status, outcome) = call(
        &harness,
        json_request(
            "POST",
            "/api/leads",
            json!({
                "userId": "user-1",
                "address": "somewhere",
                "issueDescription": "brakes grind"
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let names = outcome["result"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["name"].as_str().unwrap().to_string())
        .collect::<Vec<_>>();
    assert_eq!(names, vec!["Brake Masters", "Stop Shop", "Far Brakes"]);

    let notify = outcome["trace"]
        .as_array()
        .unwrap()
        .iter()
        .find(|s| s["step"] == "Notify Providers")
        .unwrap();
    let statuses = notify["output"]
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["status"].as_str().unwrap().to_string())
        .collect::<Vec<_>>();
    assert_eq!(statuses, vec!["sent", "failed", "sent"]);
    assert_eq!(harness.mailer.sent.lock().unwrap().len(), 2);

    let lead = &harness.store.list_leads().await.unwrap()[0];
    assert_eq!(lead.assigned_providers.len(), 3);
}

#[tokio::test]
async fn issue_without_mail_configured_still_lists_providers() {
    let harness = Harness::with(
        RecordingMailer {
            unconfigured: true,
            ..Default::default()
        },
        Arc::new(StaticMedia),
    );
    harness.add_provider("Brake Masters", &["Brakes"], 40.01, -74.0).await;

    let (status, outcome) = call(
        &harness,
        json_request(
            "POST",
            "/api/leads",
            json!({ "userId": "u", "address": "a", "issueDescription": "brakes" }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(outcome.get("error").is_none());
    assert_eq!(outcome["result"][0]["name"], json!("Brake Masters"));
    let lead = &harness.store.list_leads().await.unwrap()[0];
    assert_eq!(lead.assigned_providers.len(), 1);
}

#[tokio::test]
async fn issue_without_address_is_rejected() {
    let harness = Harness::new();
    let (status, body) = call(
        &harness,
        json_request(
            "POST",
            "/api/leads",
            json!({ "userId": "u", "address": " ", "issueDescription": "noise" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], json!("BAD_REQUEST"));
    assert!(harness.store.list_leads().await.unwrap().is_empty());
}

#[tokio::test]
async fn issue_body_missing_a_field_is_a_bad_request() {
    let harness = Harness::new();
    let (status, body) = call(
        &harness,
        json_request(
            "POST",
            "/api/leads",
            json!({ "userId": "u", "issueDescription": "noise" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], json!("BAD_REQUEST"));
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .contains("missing field `address`"));
}

#[tokio::test]
async fn malformed_bodies_and_queries_are_bad_requests() {
    let harness = Harness::new();

    let broken = Request::builder()
        .method("POST")
        .uri("/api/ratings")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = call(&harness, broken).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], json!("BAD_REQUEST"));

    let (status, body) = call(
        &harness,
        empty_request("GET", "/api/providers/nearby?latitude=north"),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], json!("BAD_REQUEST"));
}

#[tokio::test]
async fn failing_step_keeps_trace_up_to_the_failure() {
    let harness = Harness::without_llm();
    let (status, outcome) = call(
        &harness,
        json_request(
            "POST",
            "/api/leads",
            json!({ "userId": "u", "address": "a", "issueDescription": "noise" }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(outcome["result"], Value::Null);
    assert_eq!(
        outcome["error"],
        json!("OPENAI_API_KEY environment variable is required")
    );
    assert_eq!(
        step_names(&outcome),
        vec!["Geocode Address", "Extract Coordinates"]
    );
}

#[tokio::test]
async fn chat_message_gets_assistant_reply_and_history() {
    let harness = Harness::new();
    let (status, outcome) = call(
        &harness,
        json_request(
            "POST",
            "/api/chat/messages",
            json!({ "sessionId": "web-1", "message": "my brakes squeal" }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(outcome["result"]["sender"], json!("agent"));
    assert_eq!(
        outcome["result"]["message"],
        json!("Assistant reply to: my brakes squeal")
    );

    let (_, history) = call(
        &harness,
        empty_request("GET", "/api/chat/sessions/web-1/messages"),
    )
    .await;
    let senders = history["result"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["sender"].as_str().unwrap().to_string())
        .collect::<Vec<_>>();
    assert_eq!(senders, vec!["user", "agent"]);
    assert!(harness.mailer.sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn asking_for_a_human_escalates_and_shows_in_analytics() {
    let harness = Harness::new();
    let (status, outcome) = call(
        &harness,
        json_request(
            "POST",
            "/api/chat/messages",
            json!({ "sessionId": "web-2", "message": "Let me talk to a Human" }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(outcome["result"], json!(ESCALATION_REPLY));
    assert!(step_names(&outcome).contains(&"Notify Admin".to_string()));
    let sent = harness.mailer.sent.lock().unwrap().clone();
    assert_eq!(
        sent,
        vec![(
            "admin@yourapp.com".to_string(),
            "Customer Requesting Human Support".to_string()
        )]
    );

    let (_, analytics) = call(&harness, empty_request("GET", "/api/admin/analytics")).await;
    let stats = &analytics["result"];
    assert_eq!(stats["totalSessions"], json!(1));
    assert_eq!(stats["totalUserMessages"], json!(1));
    assert_eq!(stats["totalAiMessages"], json!(0));
    assert_eq!(stats["escalationCount"], json!(1));
    assert_eq!(stats["escalationRate"], json!(100));
    assert_eq!(stats["messagesByDay"].as_object().unwrap().len(), 7);
    assert_eq!(stats["recentEscalations"][0]["sessionId"], json!("web-2"));

    let (_, sessions) = call(&harness, empty_request("GET", "/api/admin/sessions")).await;
    assert_eq!(sessions["result"][0]["isEscalated"], json!(true));
    assert_eq!(sessions["result"][0]["messageCount"], json!(2));
}

#[tokio::test]
async fn escalate_route_stores_canned_reply() {
    let harness = Harness::new();
    let (status, outcome) = call(
        &harness,
        empty_request("POST", "/api/chat/sessions/web-3/escalate"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(outcome["result"], json!(ESCALATION_REPLY));

    let messages = harness.store.session_messages("web-3").await.unwrap();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].is_escalation());
}

#[tokio::test]
async fn ratings_update_provider_average() {
    let harness = Harness::new();
    let provider_id = harness
        .add_provider("Brake Masters", &["Brakes"], 40.0, -74.0)
        .await;

    for rating in [4.0, 5.0] {
        let (status, outcome) = call(
            &harness,
            json_request(
                "POST",
                "/api/ratings",
                json!({
                    "providerId": provider_id,
                    "userId": "u1",
                    "rating": rating,
                    "comment": "good"
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            outcome["result"],
            json!("Rating submitted and provider score updated successfully.")
        );
    }

    let provider = harness.store.get_provider(&provider_id).await.unwrap().unwrap();
    assert_eq!(provider.rating, Some(4.5));
}

#[tokio::test]
async fn invalid_ratings_are_refused() {
    let harness = Harness::new();
    let provider_id = harness.add_provider("Shop", &["Brakes"], 0.0, 0.0).await;

    let (status, _) = call(
        &harness,
        json_request(
            "POST",
            "/api/ratings",
            json!({ "providerId": provider_id, "userId": "u", "rating": 6 }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = call(
        &harness,
        json_request(
            "POST",
            "/api/ratings",
            json!({ "providerId": "nope", "userId": "u", "rating": 3 }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], json!("NOT_FOUND"));
    assert!(harness.store.list_ratings().await.unwrap().is_empty());
}

#[tokio::test]
async fn nearby_providers_sorted_by_distance() {
    let harness = Harness::new();
    seed_brake_shops(&harness).await;

    let (status, outcome) = call(
        &harness,
        empty_request("GET", "/api/providers/nearby?latitude=42.0&longitude=-74.0"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let nearby = outcome["result"]["nearby"].as_array().unwrap();
    assert_eq!(nearby.len(), 6);
    assert_eq!(nearby[0]["name"], json!("Fourth Brake"));
    assert_eq!(nearby[0]["distance"], json!(0.0));
    assert_eq!(nearby[0]["rating"], json!(0.0));
    assert_eq!(outcome["result"]["all"].as_array().unwrap().len(), 6);

    let (_, admin) = call(&harness, empty_request("GET", "/api/admin/providers")).await;
    assert_eq!(admin["result"]["nearby"].as_array().unwrap().len(), 6);
}

#[tokio::test]
async fn provider_sees_open_leads_until_resolved() {
    let harness = Harness::new();
    seed_brake_shops(&harness).await;
    call(
        &harness,
        json_request(
            "POST",
            "/api/leads",
            json!({ "userId": "u", "address": "a", "issueDescription": "brakes" }),
        ),
    )
    .await;
    let lead = harness.store.list_leads().await.unwrap().remove(0);
    let provider_id = lead.assigned_providers[0].id.clone();

    let uri = format!("/api/providers/{provider_id}/leads");
    let (_, open) = call(&harness, empty_request("GET", &uri)).await;
    assert_eq!(open["result"].as_array().unwrap().len(), 1);

    let status_uri = format!("/api/leads/{}/status", lead.id);
    let (status, updated) = call(
        &harness,
        json_request("PATCH", &status_uri, json!({ "status": "resolved" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["result"]["status"], json!("Resolved"));

    let (_, open) = call(&harness, empty_request("GET", &uri)).await;
    assert!(open["result"].as_array().unwrap().is_empty());

    let (status, _) = call(
        &harness,
        json_request("PATCH", &status_uri, json!({ "status": "archived" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(
        &harness,
        json_request(
            "PATCH",
            "/api/leads/missing/status",
            json!({ "status": "Contacted" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, all) = call(&harness, empty_request("GET", "/api/admin/leads")).await;
    assert_eq!(all["result"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn admin_can_register_providers_and_reply() {
    let harness = Harness::new();
    let (status, created) = call(
        &harness,
        json_request(
            "POST",
            "/api/admin/providers",
            json!({
                "name": "Quick Lube",
                "services": ["Oil change"],
                "email": "lube@shops.test",
                "latitude": 40.5,
                "longitude": -73.9
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(created["result"]["name"], json!("Quick Lube"));

    let (status, _) = call(
        &harness,
        json_request(
            "POST",
            "/api/admin/providers",
            json!({ "name": "Nowhere", "latitude": 123.0, "longitude": 0.0 }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, sent) = call(
        &harness,
        json_request(
            "POST",
            "/api/admin/messages",
            json!({ "sessionId": "web-9", "message": "We will call you today." }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(sent["result"]["sender"], json!("agent"));
    assert_eq!(harness.store.list_providers().await.unwrap().len(), 1);
}

fn form_request(uri: &str, form: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(form.to_string()))
        .unwrap()
}

#[tokio::test]
async fn whatsapp_text_message_gets_contextual_reply() {
    let harness = Harness::new();
    seed_brake_shops(&harness).await;

    let (status, body) = call(
        &harness,
        form_request(
            "/whatsapp-webhook",
            "From=whatsapp%3A%2B15550100&Body=Mis+frenos+hacen+ruido&ProfileName=Ana",
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["result"], json!("OK"));
    assert!(body["timestamp"].is_string());

    let messages = harness.store.list_messages().await.unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].message, "Mis frenos hacen ruido");
    assert_eq!(messages[1].message, "Assistant reply to: Customer Name: Ana");
    assert_eq!(messages[0].session_id, messages[1].session_id);
}

#[tokio::test]
async fn whatsapp_voice_note_degrades_when_media_is_unreachable() {
    let harness = Harness::with(RecordingMailer::default(), Arc::new(FailingMedia));

    let (status, body) = call(
        &harness,
        form_request(
            "/whatsapp-webhook",
            "From=whatsapp%3A%2B15550101&Body=&MediaContentType0=audio%2Fogg&MediaUrl0=https%3A%2F%2Fmedia.test%2Fnote",
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"], json!("OK"));
    // Anonymous sender falls back to the default name in the reply context.
    let messages = harness.store.list_messages().await.unwrap();
    assert_eq!(
        messages.last().unwrap().message,
        "Assistant reply to: Customer Name: Customer"
    );
}

#[tokio::test]
async fn webhook_failure_answers_500() {
    let harness = Harness::without_llm();
    let (status, body) = call(
        &harness,
        form_request("/whatsapp-webhook", "From=whatsapp%3A%2B1&Body=hello"),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], json!("Webhook processing failed"));
    assert_eq!(
        body["message"],
        json!("OPENAI_API_KEY environment variable is required")
    );
    assert_eq!(
        step_names(&body),
        vec![
            "Create Session",
            "Save WhatsApp Session Record",
            "Save User Message",
            "Prepare Input",
            "Use Text Body",
        ]
    );
}

#[tokio::test]
async fn whatsapp_voice_note_is_transcribed_before_reply() {
    let harness = Harness::new();
    seed_brake_shops(&harness).await;

    let (status, body) = call(
        &harness,
        form_request(
            "/whatsapp-webhook",
            "From=whatsapp%3A%2B15550102&Body=&ProfileName=Luis&MediaContentType0=audio%2Fogg&MediaUrl0=https%3A%2F%2Fmedia.test%2Fnote",
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"], json!("OK"));
    assert_eq!(
        step_names(&body),
        vec![
            "Create Session",
            "Save WhatsApp Session Record",
            "Save User Message",
            "Prepare Input",
            "Transcribe Voice Note",
            "Extract Transcript",
            "Extract English Intent",
            "Parse Issue",
            "Fetch Providers",
            "Build Context",
            "AI Assistant",
            "Save AI Reply",
        ]
    );

    let trace = body["trace"].as_array().unwrap();
    assert_eq!(trace[3]["output"]["isAudio"], json!(true));
    assert_eq!(trace[3]["output"]["mimeType"], json!("audio/ogg"));
    assert_eq!(
        trace[5]["output"]["resolvedText"],
        json!("mis frenos hacen ruido")
    );
    assert_eq!(trace[6]["input"], json!("mis frenos hacen ruido"));

    let context = trace[9]["output"]["contextPrompt"].as_str().unwrap();
    assert!(context.starts_with("Customer Name: Luis"));
    assert!(context.contains("Customer's Original Message: [voice message]"));
    assert!(context.contains("my brakes are making noise"));
    assert!(context.contains("Brake Masters"));
}

#[tokio::test]
async fn voice_chat_with_silent_audio_uses_placeholder_transcript() {
    let harness = Harness::with_speech(Arc::new(SilentSpeech));

    let (status, outcome) = call(
        &harness,
        json_request(
            "POST",
            "/api/voice",
            json!({ "sessionId": "voice-2", "base64Audio": "AAAA" }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let reply = &outcome["result"];
    assert_eq!(reply["transcript"], json!("[Could not transcribe audio]"));
    assert_eq!(reply["mimeType"], json!("audio/mpeg"));
    assert_eq!(reply["success"], json!(true));

    let stt = &outcome["trace"][0];
    assert_eq!(stt["step"], json!("Voice STT"));
    assert_eq!(stt["input"]["mimeType"], json!("audio/webm"));

    let messages = harness.store.session_messages("voice-2").await.unwrap();
    assert_eq!(messages[0].message, "[Could not transcribe audio]");
}

#[tokio::test]
async fn voice_chat_returns_spoken_reply() {
    let harness = Harness::new();
    seed_brake_shops(&harness).await;

    let (status, outcome) = call(
        &harness,
        json_request(
            "POST",
            "/api/voice",
            json!({ "sessionId": "voice-1", "base64Audio": "AAAA", "mimeType": "audio/webm" }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let reply = &outcome["result"];
    assert_eq!(reply["audioBase64"], json!("SUQz"));
    assert_eq!(reply["mimeType"], json!("audio/mpeg"));
    assert_eq!(reply["transcript"], json!("mis frenos hacen ruido"));
    assert_eq!(reply["detectedLanguage"], json!("Spanish"));
    assert_eq!(reply["issueCategory"], json!("Brakes"));
    assert_eq!(reply["carModel"], json!("Honda Civic"));
    assert_eq!(reply["success"], json!(true));

    let messages = harness.store.session_messages("voice-1").await.unwrap();
    assert_eq!(messages.len(), 2);
}

#[tokio::test]
async fn tool_call_finds_providers_with_string_coordinates() {
    let harness = Harness::new();
    seed_brake_shops(&harness).await;

    let (status, body) = call(
        &harness,
        json_request(
            "POST",
            "/elevenlabs-tool-call",
            json!({
                "tool_name": "find_providers",
                "parameters": { "category": "brakes", "latitude": "40.0", "longitude": "-74.0" },
                "conversation_id": "conv-1"
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let result = &body["result"];
    assert_eq!(result["tool"], json!("find_providers"));
    assert_eq!(result["count"], json!(4));
    assert_eq!(result["providers"][0]["name"], json!("Brake Masters"));
    assert_eq!(result["providers"][0]["distance_km"], json!(1.11));
}

#[tokio::test]
async fn tool_call_serves_categories_stats_and_unknown_tools() {
    let harness = Harness::new();
    seed_brake_shops(&harness).await;

    let (_, categories) = call(
        &harness,
        json_request(
            "POST",
            "/elevenlabs-tool-call",
            json!({ "name": "get_issue_categories" }),
        ),
    )
    .await;
    assert_eq!(categories["result"]["categories"].as_array().unwrap().len(), 8);

    let (_, stats) = call(
        &harness,
        json_request(
            "POST",
            "/elevenlabs-tool-call",
            json!({ "tool": { "name": "get_platform_stats" } }),
        ),
    )
    .await;
    assert_eq!(stats["result"]["total_providers"], json!(6));
    assert_eq!(stats["result"]["total_leads"], json!(0));
    assert_eq!(stats["result"]["tool"], json!("get_platform_stats"));

    let (status, unknown) = call(
        &harness,
        json_request("POST", "/elevenlabs-tool-call", json!({ "tool_name": "book_slot" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(unknown["result"]["error"], json!(true));
    assert_eq!(unknown["result"]["tool"], json!("book_slot"));
}
