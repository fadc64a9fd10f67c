use axum::http::StatusCode;
use cleanup_shared::auth::create_test_request;
use cleanup_shared::models::AttendeeStatus;
use cleanup_shared::test_utils::fixtures::{active_event, minor, minor_record};
use cleanup_shared::test_utils::http_test_utils::response_to_json;
use serde_json::json;
use tower::ServiceExt;

use super::*;

#[tokio::test]
async fn test_check_is_public() {
    let (app, t) = create_test_app();
    t.events.insert(active_event("e1", 10));
    t.attendees.insert_legacy("e1", GUARDIAN, "active");

    let response = app
        .clone()
        .oneshot(create_test_request(
            "POST",
            "/rsvps/check",
            "",
            Some(json!({ "event_id": "e1", "email": GUARDIAN })),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = response_to_json(response).await;
    assert_eq!(body["isRegistered"], true);
    assert_eq!(body["status"], "active");
    assert_eq!(body["capacity"], 10);
}

#[tokio::test]
async fn test_submit_requires_live_session() {
    let (app, t) = create_test_app();
    t.events.insert(active_event("e1", 10));
    let payload = json!({
        "event_id": "e1",
        "attendees": [{ "type": "guardian", "id": GUARDIAN }]
    });

    for token in ["", "unknown-token", EXPIRED_TOKEN] {
        let response = app
            .clone()
            .oneshot(create_test_request(
                "POST",
                "/rsvps/submit",
                token,
                Some(payload.clone()),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = response_to_json(response).await;
        assert_eq!(body["error"]["code"], "UNAUTHORIZED");
    }
    assert_eq!(t.attendees.active_for_event("e1"), 0);
}

#[tokio::test]
async fn test_submit_then_duplicate() {
    let (app, t) = create_test_app();
    t.events.insert(active_event("e1", 10));
    t.minors.insert(minor(GUARDIAN, "minor-1", 2015));
    let payload = json!({
        "event_id": "e1",
        "guardian_email": GUARDIAN,
        "attendees": [
            { "type": "guardian", "id": GUARDIAN },
            { "type": "minor", "id": "minor-1" }
        ]
    });

    let response = app
        .clone()
        .oneshot(create_test_request(
            "POST",
            "/rsvps/submit",
            GUARDIAN_TOKEN,
            Some(payload.clone()),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_to_json(response).await;
    assert_eq!(body["registered"].as_array().unwrap().len(), 2);
    assert_eq!(body["active_count"], 2);
    assert_eq!(body["remaining_capacity"], 8);

    let response = app
        .clone()
        .oneshot(create_test_request(
            "POST",
            "/rsvps/submit",
            GUARDIAN_TOKEN,
            Some(payload),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_to_json(response).await;
    assert!(body["registered"].as_array().unwrap().is_empty());
    assert_eq!(body["already_registered"].as_array().unwrap().len(), 2);
    assert_eq!(body["already_registered"][0]["code"], "DUPLICATE_ATTENDEE");
    assert_eq!(body["already_registered"][0]["attendee_id"], GUARDIAN);
    assert_eq!(t.events.active_count("e1"), Some(2));
}

#[tokio::test]
async fn test_submit_over_capacity_reports_remaining_slots() {
    let (app, t) = create_test_app();
    t.events.insert(active_event("e1", 1));
    t.minors.insert(minor(GUARDIAN, "minor-1", 2015));

    let response = app
        .clone()
        .oneshot(create_test_request(
            "POST",
            "/rsvps/submit",
            GUARDIAN_TOKEN,
            Some(json!({
                "event_id": "e1",
                "attendees": [
                    { "type": "guardian", "id": GUARDIAN },
                    { "type": "minor", "id": "minor-1" }
                ]
            })),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = response_to_json(response).await;
    assert_eq!(body["error"]["code"], "CAPACITY_EXCEEDED");
    assert_eq!(body["error"]["remaining_slots"], 1);
    assert_eq!(t.attendees.active_for_event("e1"), 0);
}

#[tokio::test]
async fn test_submit_for_someone_else_is_forbidden() {
    let (app, t) = create_test_app();
    t.events.insert(active_event("e1", 10));

    let response = app
        .clone()
        .oneshot(create_test_request(
            "POST",
            "/rsvps/submit",
            GUARDIAN_TOKEN,
            Some(json!({
                "event_id": "e1",
                "guardian_email": OTHER_GUARDIAN,
                "attendees": [{ "type": "guardian", "id": OTHER_GUARDIAN }]
            })),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = response_to_json(response).await;
    assert_eq!(body["error"]["code"], "FORBIDDEN");

    // Emails are matched exactly, the same way attendee ownership is
    let response = app
        .clone()
        .oneshot(create_test_request(
            "POST",
            "/rsvps/submit",
            GUARDIAN_TOKEN,
            Some(json!({
                "event_id": "e1",
                "guardian_email": "G@X.com",
                "attendees": [{ "type": "guardian", "id": GUARDIAN }]
            })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(t.attendees.active_for_event("e1"), 0);
}

#[tokio::test]
async fn test_submit_unknown_event() {
    let (app, _t) = create_test_app();

    let response = app
        .clone()
        .oneshot(create_test_request(
            "POST",
            "/rsvps/submit",
            GUARDIAN_TOKEN,
            Some(json!({
                "event_id": "missing",
                "attendees": [{ "type": "guardian", "id": GUARDIAN }]
            })),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = response_to_json(response).await;
    assert_eq!(body["error"]["code"], "EVENT_NOT_FOUND");
}

#[tokio::test]
async fn test_cancel_other_guardians_minor_is_rejected() {
    let (app, t) = create_test_app();
    let mut event = active_event("e1", 10);
    event.active_count = Some(1);
    t.events.insert(event);
    t.attendees
        .insert(minor_record("e1", GUARDIAN, "minor-1", AttendeeStatus::Active));

    let response = app
        .clone()
        .oneshot(create_test_request(
            "POST",
            "/rsvps/cancel",
            OTHER_TOKEN,
            Some(json!({ "event_id": "e1", "attendee_id": "minor-1" })),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = response_to_json(response).await;
    assert_eq!(body["error"]["code"], "UNAUTHORIZED_CANCELLATION");
    assert_eq!(
        t.attendees.get("e1", "minor-1").unwrap().status,
        AttendeeStatus::Active
    );
}

#[tokio::test]
async fn test_cancel_is_idempotent() {
    let (app, t) = create_test_app();
    let mut event = active_event("e1", 10);
    event.active_count = Some(1);
    t.events.insert(event);
    t.attendees
        .insert(minor_record("e1", GUARDIAN, "minor-1", AttendeeStatus::Active));
    let payload = json!({ "event_id": "e1", "attendee_id": "minor-1", "reason": "Sick" });

    let response = app
        .clone()
        .oneshot(create_test_request(
            "POST",
            "/rsvps/cancel",
            GUARDIAN_TOKEN,
            Some(payload.clone()),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_to_json(response).await;
    assert_eq!(body["cancelled"], true);
    assert_eq!(body["already_cancelled"], false);
    assert_eq!(body["remaining_capacity"], 10);
    assert!(body["hours_before_event"].as_f64().unwrap() > 23.0);

    let response = app
        .clone()
        .oneshot(create_test_request(
            "POST",
            "/rsvps/cancel",
            GUARDIAN_TOKEN,
            Some(payload),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_to_json(response).await;
    assert_eq!(body["already_cancelled"], true);
    assert_eq!(t.events.active_count("e1"), Some(0));
}

#[tokio::test]
async fn test_list_requires_admin() {
    let (app, t) = create_test_app();
    t.events.insert(active_event("e1", 10));
    t.attendees
        .insert(minor_record("e1", GUARDIAN, "minor-1", AttendeeStatus::Cancelled));
    t.attendees.insert_legacy("e1", OTHER_GUARDIAN, "active");

    let response = app
        .clone()
        .oneshot(create_test_request(
            "POST",
            "/rsvps/list",
            GUARDIAN_TOKEN,
            Some(json!({ "event_id": "e1" })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .clone()
        .oneshot(create_test_request(
            "POST",
            "/rsvps/list",
            ADMIN_TOKEN,
            Some(json!({ "event_id": "e1" })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_to_json(response).await;
    assert_eq!(body["attendees"].as_array().unwrap().len(), 2);
    assert_eq!(body["statistics"]["total"], 2);
    assert_eq!(body["statistics"]["cancelled"], 1);
    assert_eq!(body["event"]["event_id"], "e1");
}

#[tokio::test]
async fn test_mark_attendance() {
    let (app, t) = create_test_app();
    let mut event = active_event("e1", 10);
    event.active_count = Some(1);
    t.events.insert(event);
    t.attendees
        .insert(minor_record("e1", GUARDIAN, "minor-1", AttendeeStatus::Active));

    let response = app
        .clone()
        .oneshot(create_test_request(
            "POST",
            "/rsvps/attendance",
            ADMIN_TOKEN,
            Some(json!({ "event_id": "e1", "attendee_id": "minor-1", "status": "attended" })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_to_json(response).await;
    assert_eq!(body["rsvp"]["status"], "attended");
    assert_eq!(body["changed"], true);
    assert_eq!(t.events.active_count("e1"), Some(0));

    let response = app
        .clone()
        .oneshot(create_test_request(
            "POST",
            "/rsvps/attendance",
            ADMIN_TOKEN,
            Some(json!({ "event_id": "e1", "attendee_id": "minor-1", "status": "cancelled" })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_mistaken_no_show_can_be_cleared() {
    let (app, t) = create_test_app();
    let mut event = active_event("e1", 10);
    event.active_count = Some(0);
    t.events.insert(event);
    t.attendees
        .insert(minor_record("e1", GUARDIAN, "minor-1", AttendeeStatus::NoShow));

    let response = app
        .clone()
        .oneshot(create_test_request(
            "POST",
            "/rsvps/attendance",
            ADMIN_TOKEN,
            Some(json!({ "event_id": "e1", "attendee_id": "minor-1", "status": "active" })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_to_json(response).await;
    assert_eq!(body["rsvp"]["status"], "active");
    assert_eq!(body["changed"], true);
    assert_eq!(t.events.active_count("e1"), Some(1));
}

#[tokio::test]
async fn test_unknown_route_is_404() {
    let (app, _t) = create_test_app();

    let response = app
        .clone()
        .oneshot(create_test_request("GET", "/nope", GUARDIAN_TOKEN, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
