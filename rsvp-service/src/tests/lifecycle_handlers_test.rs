use axum::http::StatusCode;
use chrono::{Duration, Utc};
use cleanup_shared::auth::create_test_request;
use cleanup_shared::models::{AttendeeStatus, EventStatus};
use cleanup_shared::test_utils::fixtures::{active_event, guardian_record, minor_record};
use cleanup_shared::test_utils::http_test_utils::response_to_json;
use serde_json::json;
use tower::ServiceExt;

use super::*;

#[tokio::test]
async fn test_lifecycle_requires_admin() {
    let (app, _t) = create_test_app();

    let response = app
        .clone()
        .oneshot(create_test_request(
            "POST",
            "/events/lifecycle",
            GUARDIAN_TOKEN,
            Some(json!({ "action": "categorize_events" })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_unknown_action_is_a_validation_error() {
    let (app, _t) = create_test_app();

    let response = app
        .clone()
        .oneshot(create_test_request(
            "POST",
            "/events/lifecycle",
            ADMIN_TOKEN,
            Some(json!({ "action": "delete_everything" })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = response_to_json(response).await;
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_cancel_event_notifies_each_guardian_once() {
    let (app, t) = create_test_app();
    let mut event = active_event("e1", 10);
    event.active_count = Some(3);
    t.events.insert(event);
    t.attendees
        .insert(guardian_record("e1", GUARDIAN, AttendeeStatus::Active));
    t.attendees
        .insert(minor_record("e1", GUARDIAN, "minor-1", AttendeeStatus::Active));
    t.attendees
        .insert(guardian_record("e1", OTHER_GUARDIAN, AttendeeStatus::Active));

    let response = app
        .clone()
        .oneshot(create_test_request(
            "POST",
            "/events/lifecycle",
            ADMIN_TOKEN,
            Some(json!({ "action": "cancel_event", "event_id": "e1", "reason": "Storm" })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_to_json(response).await;
    assert_eq!(body["cancelled_rsvps"], 3);
    assert_eq!(body["notifications_sent"], 2);
    assert_eq!(body["result"]["reason"], "Storm");

    assert_eq!(t.events.status("e1"), Some(EventStatus::Cancelled));
    assert_eq!(t.events.active_count("e1"), Some(0));
    let notices = t.notifier.notices();
    assert_eq!(notices.len(), 2);
    assert!(notices.iter().all(|n| n.reason == "Storm"));
}

#[tokio::test]
async fn test_update_completed_events() {
    let (app, t) = create_test_app();
    let mut done = active_event("done", 10);
    done.start_time = Utc::now() - Duration::hours(5);
    done.end_time = Utc::now() - Duration::hours(2);
    t.events.insert(done);
    t.events.insert(active_event("upcoming", 10));

    let request = json!({ "action": "update_completed_events" });
    let response = app
        .clone()
        .oneshot(create_test_request(
            "POST",
            "/events/lifecycle",
            ADMIN_TOKEN,
            Some(request.clone()),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_to_json(response).await;
    assert_eq!(body["updated_count"], 1);
    assert_eq!(body["updated"][0], "done");
    assert_eq!(t.events.status("upcoming"), Some(EventStatus::Active));

    let response = app
        .clone()
        .oneshot(create_test_request(
            "POST",
            "/events/lifecycle",
            ADMIN_TOKEN,
            Some(request),
        ))
        .await
        .unwrap();
    let body = response_to_json(response).await;
    assert_eq!(body["updated_count"], 0);
}

#[tokio::test]
async fn test_archive_events_before_date() {
    let (app, t) = create_test_app();
    let mut old = active_event("old", 10);
    old.status = EventStatus::Completed;
    old.start_time = Utc::now() - Duration::days(400);
    old.end_time = old.start_time + Duration::hours(3);
    t.events.insert(old);
    let mut recent = active_event("recent", 10);
    recent.status = EventStatus::Completed;
    recent.start_time = Utc::now() - Duration::days(2);
    recent.end_time = recent.start_time + Duration::hours(3);
    t.events.insert(recent);

    let cutoff = (Utc::now() - Duration::days(30)).format("%Y-%m-%d").to_string();
    let response = app
        .clone()
        .oneshot(create_test_request(
            "POST",
            "/events/lifecycle",
            ADMIN_TOKEN,
            Some(json!({ "action": "archive_events", "archive_before_date": cutoff })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_to_json(response).await;
    assert_eq!(body["archived_count"], 1);
    assert_eq!(t.events.status("old"), Some(EventStatus::Archived));
    assert_eq!(t.events.status("recent"), Some(EventStatus::Completed));

    let response = app
        .clone()
        .oneshot(create_test_request(
            "POST",
            "/events/lifecycle",
            ADMIN_TOKEN,
            Some(json!({
                "action": "archive_events",
                "archive_before_date": cutoff,
                "archive_status": "active"
            })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_categorize_events() {
    let (app, t) = create_test_app();
    t.events.insert(active_event("upcoming", 10));
    let mut current = active_event("current", 10);
    current.start_time = Utc::now() - Duration::hours(1);
    current.end_time = Utc::now() + Duration::hours(1);
    t.events.insert(current);

    let response = app
        .clone()
        .oneshot(create_test_request(
            "POST",
            "/events/lifecycle",
            ADMIN_TOKEN,
            Some(json!({ "action": "categorize_events" })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_to_json(response).await;
    assert_eq!(body["counts"]["upcoming"], 1);
    assert_eq!(body["counts"]["current"], 1);
    assert_eq!(body["counts"]["past"], 0);
    assert_eq!(body["categories"]["current"][0]["event_id"], "current");
}

#[tokio::test]
async fn test_create_event() {
    let (app, t) = create_test_app();
    let payload = json!({
        "event_id": "beach-june",
        "title": "Beach Cleanup",
        "start_time": "2030-06-01T09:00:00Z",
        "end_time": "2030-06-01T12:00:00Z",
        "location": { "name": "North beach" },
        "capacity": 25
    });

    let response = app
        .clone()
        .oneshot(create_test_request(
            "POST",
            "/events",
            GUARDIAN_TOKEN,
            Some(payload.clone()),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .clone()
        .oneshot(create_test_request("POST", "/events", ADMIN_TOKEN, Some(payload)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_to_json(response).await;
    assert_eq!(body["event"]["status"], "active");
    assert_eq!(body["event"]["active_count"], 0);
    assert_eq!(t.events.get_sync("beach-june").unwrap().capacity, 25);
}
