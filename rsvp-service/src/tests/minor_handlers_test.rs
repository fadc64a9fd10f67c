use axum::http::StatusCode;
use cleanup_shared::auth::create_test_request;
use cleanup_shared::models::AttendeeStatus;
use cleanup_shared::test_utils::fixtures::{active_event, minor, minor_record};
use cleanup_shared::test_utils::http_test_utils::response_to_json;
use serde_json::json;
use tower::ServiceExt;

use super::*;

#[tokio::test]
async fn test_create_and_list_minors() {
    let (app, t) = create_test_app();

    let response = app
        .clone()
        .oneshot(create_test_request(
            "POST",
            "/minors",
            GUARDIAN_TOKEN,
            Some(json!({
                "first_name": "Sam",
                "last_name": "Lee",
                "date_of_birth": "2015-04-01",
                "email": "Sam@Example.com"
            })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_to_json(response).await;
    let minor_id = body["minor"]["minor_id"].as_str().unwrap().to_string();
    assert_eq!(body["minor"]["email"], "sam@example.com");
    assert!(t.minors.get_sync(GUARDIAN, &minor_id).is_some());

    let response = app
        .clone()
        .oneshot(create_test_request("GET", "/minors", GUARDIAN_TOKEN, None))
        .await
        .unwrap();
    let body = response_to_json(response).await;
    assert_eq!(body["minors"].as_array().unwrap().len(), 1);

    let response = app
        .clone()
        .oneshot(create_test_request("GET", "/minors", OTHER_TOKEN, None))
        .await
        .unwrap();
    let body = response_to_json(response).await;
    assert!(body["minors"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_adult_is_not_a_minor() {
    let (app, _t) = create_test_app();

    let response = app
        .clone()
        .oneshot(create_test_request(
            "POST",
            "/minors",
            GUARDIAN_TOKEN,
            Some(json!({
                "first_name": "Pat",
                "last_name": "Lee",
                "date_of_birth": "1990-01-01"
            })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = response_to_json(response).await;
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_update_minor() {
    let (app, t) = create_test_app();
    t.minors.insert(minor(GUARDIAN, "m1", 2015));

    let response = app
        .clone()
        .oneshot(create_test_request(
            "PUT",
            "/minors/m1",
            GUARDIAN_TOKEN,
            Some(json!({ "first_name": "Robin" })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_to_json(response).await;
    assert_eq!(body["minor"]["first_name"], "Robin");

    let response = app
        .clone()
        .oneshot(create_test_request(
            "PUT",
            "/minors/m1",
            OTHER_TOKEN,
            Some(json!({ "first_name": "Mallory" })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(t.minors.get_sync(GUARDIAN, "m1").unwrap().first_name, "Robin");
}

#[tokio::test]
async fn test_delete_minor_cancels_upcoming_rsvps() {
    let (app, t) = create_test_app();
    t.minors.insert(minor(GUARDIAN, "m1", 2015));
    let mut event = active_event("e1", 5);
    event.active_count = Some(1);
    t.events.insert(event);
    t.attendees
        .insert(minor_record("e1", GUARDIAN, "m1", AttendeeStatus::Active));

    let response = app
        .clone()
        .oneshot(create_test_request("DELETE", "/minors/m1", GUARDIAN_TOKEN, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_to_json(response).await;
    assert_eq!(body["cancelled_rsvps"], 1);
    assert!(t.minors.get_sync(GUARDIAN, "m1").is_none());
    assert_eq!(t.events.active_count("e1"), Some(0));

    let response = app
        .clone()
        .oneshot(create_test_request("DELETE", "/minors/m1", GUARDIAN_TOKEN, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = response_to_json(response).await;
    assert_eq!(body["error"]["code"], "MINOR_NOT_FOUND");
}
