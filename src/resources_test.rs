use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use tokio::sync::Notify;

use super::*;
use crate::api::LOGIN_PATH;
use crate::store::MemorySessionStore;
use crate::test_support::{Reply, StubServer};

fn user_json(email: &str) -> Value {
    json!({
        "id": "u1",
        "email": email,
        "dog_name": null,
        "dog_photo_url": null,
        "location_lat": 45.5,
        "location_lng": -73.6,
        "created_at": "2025-01-01T00:00:00"
    })
}

// =============================================================================
// Query + payload shapes
// =============================================================================

#[test]
fn notification_query_default_path() {
    assert_eq!(NotificationQuery::default().path(), "/notifications/me?page=1&page_size=10&unread_only=false");
}

#[test]
fn notification_query_unread_only_path() {
    let query = NotificationQuery { page: 3, page_size: 25, unread_only: true };
    assert_eq!(query.path(), "/notifications/me?page=3&page_size=25&unread_only=true");
}

#[test]
fn new_account_omits_unset_profile_fields() {
    let account = NewAccount {
        email: "user@example.com".into(),
        password: "password123".into(),
        dog_name: Some("Rex".into()),
        ..NewAccount::default()
    };
    assert_eq!(
        serde_json::to_value(&account).unwrap(),
        json!({ "email": "user@example.com", "password": "password123", "dog_name": "Rex" })
    );
}

#[test]
fn user_tolerates_missing_optional_fields() {
    let user: User =
        serde_json::from_value(json!({ "id": "u1", "email": "a@b.c", "created_at": "2025-01-01T00:00:00" })).unwrap();
    assert_eq!(user.dog_name, None);
    assert_eq!(user.location_lat, None);
}

// =============================================================================
// Endpoints
// =============================================================================

#[tokio::test]
async fn register_posts_json_without_credential() {
    let stub = StubServer::builder()
        .route("POST", REGISTER_PATH, Reply::json(200, user_json("user@example.com")))
        .spawn()
        .await;
    let account = NewAccount { email: "user@example.com".into(), password: "password123".into(), ..NewAccount::default() };

    let user = register(&stub.client(), &account).await.unwrap();

    assert_eq!(user.email, "user@example.com");
    assert_eq!(user.location_lat, Some(45.5));
    let seen = stub.last();
    assert_eq!(seen.authorization, None);
    assert_eq!(seen.content_type.as_deref(), Some("application/json"));
}

#[tokio::test]
async fn register_duplicate_surfaces_server_text() {
    let stub = StubServer::builder()
        .route("POST", REGISTER_PATH, Reply::json(400, json!({ "detail": "Email already registered" })))
        .spawn()
        .await;
    let account = NewAccount { email: "user@example.com".into(), password: "password123".into(), ..NewAccount::default() };

    let err = register(&stub.client(), &account).await.unwrap_err();

    assert_eq!(err.status(), Some(400));
    assert_eq!(err.to_string(), json!({ "detail": "Email already registered" }).to_string());
}

#[tokio::test]
async fn notifications_decodes_page() {
    let stub = StubServer::builder()
        .route(
            "GET",
            NOTIFICATIONS_PATH,
            Reply::json(
                200,
                json!({
                    "items": [{ "id": 4, "message": "New offer nearby", "is_read": false, "created_at": "2025-01-02T10:00:00" }],
                    "total": 11
                }),
            ),
        )
        .spawn()
        .await;

    let page = notifications(&stub.client(), "abc123", &NotificationQuery::default()).await.unwrap();

    assert_eq!(page.total, 11);
    assert_eq!(page.items[0].message, "New offer nearby");
    assert_eq!(stub.last().path, "/notifications/me?page=1&page_size=10&unread_only=false");
}

#[tokio::test]
async fn mark_read_helpers_hit_expected_paths() {
    let stub = StubServer::builder()
        .route("PUT", "/notifications/4/read", Reply::text(204, ""))
        .route("POST", READ_ALL_NOTIFICATIONS_PATH, Reply::text(200, "null"))
        .spawn()
        .await;
    let api = stub.client();

    mark_notification_read(&api, "abc123", 4).await.unwrap();
    mark_all_notifications_read(&api, "abc123").await.unwrap();

    let paths: Vec<String> = stub.seen().into_iter().map(|s| s.path).collect();
    assert_eq!(paths, ["/notifications/4/read", "/notifications/me/read-all"]);
}

#[tokio::test]
async fn update_profile_sends_only_set_fields() {
    let stub = StubServer::builder().route("PUT", ME_PATH, Reply::json(200, user_json("user@example.com"))).spawn().await;
    let update = ProfileUpdate { dog_name: Some("Rex".into()), ..ProfileUpdate::default() };

    update_profile(&stub.client(), "abc123", &update).await.unwrap();

    assert_eq!(serde_json::from_str::<Value>(&stub.last().body).unwrap(), json!({ "dog_name": "Rex" }));
}

// =============================================================================
// UserBadge
// =============================================================================

#[tokio::test]
async fn badge_shows_email_for_current_credential() {
    let stub = StubServer::builder().route("GET", ME_PATH, Reply::json(200, user_json("user@example.com"))).spawn().await;
    let controller = SessionController::new(stub.client(), Arc::new(MemorySessionStore::with_token("abc123")));
    let badge = UserBadge::new(controller);

    badge.refresh().await.unwrap();

    assert_eq!(badge.email().as_deref(), Some("user@example.com"));
    assert_eq!(stub.last().authorization.as_deref(), Some("Bearer abc123"));
}

#[tokio::test]
async fn badge_clears_when_logged_out() {
    let stub = StubServer::builder().route("GET", ME_PATH, Reply::json(200, user_json("user@example.com"))).spawn().await;
    let controller = SessionController::new(stub.client(), Arc::new(MemorySessionStore::with_token("abc123")));
    let badge = UserBadge::new(controller.clone());
    badge.refresh().await.unwrap();

    controller.logout();
    badge.refresh().await.unwrap();

    assert_eq!(badge.email(), None);
    assert_eq!(stub.seen().len(), 1);
}

#[tokio::test]
async fn badge_discards_superseded_refresh() {
    let gate = Arc::new(Notify::new());
    let stub = StubServer::builder()
        .route("GET", ME_PATH, Reply::json(200, user_json("user@example.com")).gated(gate.clone()))
        .spawn()
        .await;
    let controller = SessionController::new(stub.client(), Arc::new(MemorySessionStore::with_token("abc123")));
    let badge = Arc::new(UserBadge::new(controller.clone()));

    let slow = {
        let badge = Arc::clone(&badge);
        tokio::spawn(async move { badge.refresh().await })
    };
    while stub.seen().is_empty() {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    controller.logout();
    badge.refresh().await.unwrap();
    gate.notify_one();
    slow.await.unwrap().unwrap();

    assert_eq!(badge.email(), None);
}

#[tokio::test]
async fn badge_drops_in_flight_refresh_when_logged_out() {
    let gate = Arc::new(Notify::new());
    let stub = StubServer::builder()
        .route("GET", ME_PATH, Reply::json(200, user_json("user@example.com")).gated(gate.clone()))
        .spawn()
        .await;
    let controller = SessionController::new(stub.client(), Arc::new(MemorySessionStore::with_token("abc123")));
    let badge = Arc::new(UserBadge::new(controller.clone()));

    let slow = {
        let badge = Arc::clone(&badge);
        tokio::spawn(async move { badge.refresh().await })
    };
    while stub.seen().is_empty() {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    controller.logout();
    gate.notify_one();
    slow.await.unwrap().unwrap();

    assert_eq!(badge.email(), None);
}

#[tokio::test]
async fn badge_email_disappears_with_its_credential() {
    let stub = StubServer::builder().route("GET", ME_PATH, Reply::json(200, user_json("user@example.com"))).spawn().await;
    let controller = SessionController::new(stub.client(), Arc::new(MemorySessionStore::with_token("abc123")));
    let badge = UserBadge::new(controller.clone());
    badge.refresh().await.unwrap();
    assert_eq!(badge.email().as_deref(), Some("user@example.com"));

    controller.logout();

    assert_eq!(badge.email(), None);
}

#[tokio::test]
async fn badge_follows_session_changes() {
    let stub = StubServer::builder()
        .route("POST", LOGIN_PATH, Reply::json(200, json!({ "access_token": "abc123" })))
        .route("GET", ME_PATH, Reply::json(200, user_json("user@example.com")))
        .spawn()
        .await;
    let controller = SessionController::new(stub.client(), Arc::new(MemorySessionStore::new()));
    let badge = UserBadge::new(controller.clone());

    controller.login("user@example.com", "password123").await.unwrap();
    assert!(badge.changed().await.unwrap());
    assert_eq!(badge.email().as_deref(), Some("user@example.com"));
    assert_eq!(stub.last().authorization.as_deref(), Some("Bearer abc123"));

    controller.logout();
    assert!(badge.changed().await.unwrap());
    assert_eq!(badge.email(), None);
    assert_eq!(stub.seen().len(), 2);
}

#[tokio::test]
async fn badge_change_cancels_outstanding_refresh() {
    let gate = Arc::new(Notify::new());
    let stub = StubServer::builder()
        .route("GET", ME_PATH, Reply::json(200, user_json("user@example.com")).gated(gate.clone()))
        .spawn()
        .await;
    let controller = SessionController::new(stub.client(), Arc::new(MemorySessionStore::with_token("abc123")));
    let badge = Arc::new(UserBadge::new(controller.clone()));

    let slow = {
        let badge = Arc::clone(&badge);
        tokio::spawn(async move { badge.refresh().await })
    };
    while stub.seen().is_empty() {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    controller.logout();
    assert!(badge.changed().await.unwrap());
    gate.notify_one();
    slow.await.unwrap().unwrap();

    assert_eq!(badge.email(), None);
    assert_eq!(stub.seen().len(), 1);
}
