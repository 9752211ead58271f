use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use destek_api::{AppState, AppStateInner, router};
use destek_db::Database;
use destek_gateway::Dispatcher;

const SECRET: &str = "test-secret";

fn app() -> (Router, AppState) {
    let db = Database::open_in_memory().unwrap();
    let state: AppState = Arc::new(AppStateInner {
        db: Arc::new(db),
        jwt_secret: SECRET.into(),
        token_ttl: chrono::Duration::hours(1),
        dispatcher: Dispatcher::new(),
    });
    (router(state.clone()), state)
}

async fn send(app: &Router, method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let req = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let res = app.clone().oneshot(req).await.unwrap();
    let status = res.status();
    let bytes = res.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn register(app: &Router, email: &str, role: &str) -> (String, String) {
    let (status, body) = send(
        app,
        "POST",
        "/api/auth/register",
        None,
        Some(json!({ "email": email, "password": "correct-horse", "name": "Test", "role": role })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    (
        body["token"].as_str().unwrap().to_string(),
        body["user"]["id"].as_str().unwrap().to_string(),
    )
}

/// Bootstrap the admin account and log in as it.
async fn login_admin(app: &Router, state: &AppState) -> (String, String) {
    destek_api::auth::bootstrap_admin(&state.db, "admin@example.com", "admin-password").unwrap();
    let (status, body) = send(
        app,
        "POST",
        "/api/auth/login",
        None,
        Some(json!({ "email": "admin@example.com", "password": "admin-password" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    (
        body["token"].as_str().unwrap().to_string(),
        body["user"]["id"].as_str().unwrap().to_string(),
    )
}

#[tokio::test]
async fn health_reports_ok() {
    let (app, _) = app();
    let (status, body) = send(&app, "GET", "/api/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "ok", "connectedClients": 0 }));
}

#[tokio::test]
async fn register_login_and_me() {
    let (app, _) = app();
    let (token, id) = register(&app, "ayse@example.com", "customer").await;

    let (status, body) = send(&app, "GET", "/api/auth/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], id);
    assert_eq!(body["role"], "customer");
    assert!(body.get("passwordHash").is_none());

    let (status, body) = send(
        &app,
        "POST",
        "/api/auth/login",
        None,
        Some(json!({ "email": "AYSE@example.com", "password": "correct-horse" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["token"].is_string());

    let (status, body) = send(
        &app,
        "POST",
        "/api/auth/login",
        None,
        Some(json!({ "email": "ayse@example.com", "password": "wrong-password" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Invalid email or password");
}

#[tokio::test]
async fn duplicate_email_conflicts() {
    let (app, _) = app();
    register(&app, "dup@example.com", "customer").await;
    let (status, _) = send(
        &app,
        "POST",
        "/api/auth/register",
        None,
        Some(json!({ "email": "dup@example.com", "password": "correct-horse", "name": "Again" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn admin_cannot_self_register() {
    let (app, _) = app();
    let (status, _) = send(
        &app,
        "POST",
        "/api/auth/register",
        None,
        Some(json!({ "email": "root@example.com", "password": "correct-horse", "name": "Root", "role": "admin" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn protected_routes_need_a_token() {
    let (app, _) = app();
    let (status, _) = send(&app, "GET", "/api/tickets", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&app, "GET", "/api/tickets", Some("garbage"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn validation_errors_are_400_with_details() {
    let (app, _) = app();
    let (token, _) = register(&app, "val@example.com", "customer").await;

    let (status, body) = send(
        &app,
        "POST",
        "/api/tickets",
        Some(&token),
        Some(json!({ "subject": "x", "body": "" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["details"]["subject"].is_array());
    assert!(body["details"]["body"].is_array());

    let (status, _) = send(&app, "POST", "/api/tickets", Some(&token), Some(json!({ "nope": 1 }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn ticket_lifecycle_and_ownership() {
    let (app, _) = app();
    let (owner, _) = register(&app, "owner@example.com", "customer").await;
    let (other, _) = register(&app, "other@example.com", "customer").await;

    let (status, ticket) = send(
        &app,
        "POST",
        "/api/tickets",
        Some(&owner),
        Some(json!({ "subject": "Kargo gecikti", "body": "Siparisim hala gelmedi", "priority": "high" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(ticket["status"], "open");
    assert_eq!(ticket["priority"], "high");
    assert!(ticket["reference"].as_str().unwrap().starts_with("TCK-"));
    let id = ticket["id"].as_str().unwrap();

    let (status, detail) = send(&app, "GET", &format!("/api/tickets/{id}"), Some(&owner), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["ticket"]["id"], id);
    assert_eq!(detail["messages"], json!([]));

    let (status, _) = send(&app, "GET", &format!("/api/tickets/{id}"), Some(&other), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, list) = send(&app, "GET", "/api/tickets", Some(&other), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list, json!([]));

    let (status, message) = send(
        &app,
        "POST",
        &format!("/api/tickets/{id}/messages"),
        Some(&owner),
        Some(json!({ "content": "Any update?" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(message["isAdmin"], false);

    // Owners may close but not reprioritize.
    let (status, _) = send(
        &app,
        "PATCH",
        &format!("/api/tickets/{id}"),
        Some(&owner),
        Some(json!({ "priority": "urgent" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, closed) = send(
        &app,
        "PATCH",
        &format!("/api/tickets/{id}"),
        Some(&owner),
        Some(json!({ "status": "closed" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(closed["status"], "closed");

    let (status, _) = send(
        &app,
        "POST",
        &format!("/api/tickets/{id}/messages"),
        Some(&owner),
        Some(json!({ "content": "Hello?" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, "DELETE", &format!("/api/tickets/{id}"), Some(&owner), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn unknown_ticket_is_404() {
    let (app, _) = app();
    let (token, _) = register(&app, "lost@example.com", "customer").await;
    let (status, body) = send(
        &app,
        "GET",
        "/api/tickets/00000000-0000-4000-8000-000000000000",
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Ticket not found");

    let (status, _) = send(&app, "GET", "/api/tickets/not-a-uuid", Some(&token), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn admin_reply_moves_ticket_in_progress() {
    let (app, state) = app();
    let (customer, customer_id) = register(&app, "c@example.com", "customer").await;
    let (admin, _) = login_admin(&app, &state).await;

    let (_, ticket) = send(
        &app,
        "POST",
        "/api/tickets",
        Some(&customer),
        Some(json!({ "subject": "Refund", "body": "Please refund" })),
    )
    .await;
    let id = ticket["id"].as_str().unwrap();

    let (status, _) = send(
        &app,
        "POST",
        &format!("/api/tickets/{id}/messages"),
        Some(&admin),
        Some(json!({ "content": "Looking into it" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, detail) = send(&app, "GET", &format!("/api/tickets/{id}"), Some(&customer), None).await;
    assert_eq!(detail["ticket"]["status"], "in_progress");
    assert_eq!(detail["messages"][0]["isAdmin"], true);

    let (_, notes) = send(&app, "GET", "/api/notifications?unread=true", Some(&customer), None).await;
    let notes = notes.as_array().unwrap();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0]["type"], "ticket_reply");
    assert_eq!(notes[0]["userId"], customer_id);

    let (status, count) = send(&app, "POST", "/api/notifications/read-all", Some(&customer), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(count["updated"], 1);
}

#[tokio::test]
async fn order_flow_with_stock_and_chat() {
    let (app, _) = app();
    let (seller, _) = register(&app, "seller@example.com", "seller").await;
    let (buyer, buyer_id) = register(&app, "buyer@example.com", "customer").await;

    let (status, _) = send(
        &app,
        "POST",
        "/api/products",
        Some(&buyer),
        Some(json!({ "name": "Nope", "price": 1.0, "stock": 1, "category": "misc" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, product) = send(
        &app,
        "POST",
        "/api/products",
        Some(&seller),
        Some(json!({ "name": "Cay bardagi", "description": "6'li set", "price": 12.5, "stock": 3, "category": "kitchen" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let product_id = product["id"].as_str().unwrap();

    let (status, list) = send(&app, "GET", "/api/products?q=bardag", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list.as_array().unwrap().len(), 1);

    let (status, _) = send(
        &app,
        "POST",
        "/api/orders",
        Some(&seller),
        Some(json!({ "productId": product_id, "quantity": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        &app,
        "POST",
        "/api/orders",
        Some(&buyer),
        Some(json!({ "productId": product_id, "quantity": 5 })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "Only 3 left in stock");

    let (status, placed) = send(
        &app,
        "POST",
        "/api/orders",
        Some(&buyer),
        Some(json!({ "productId": product_id, "quantity": 2 })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(placed["order"]["status"], "pending");
    assert_eq!(placed["order"]["totalPrice"], 25.0);
    assert_eq!(placed["chatRoom"]["buyerId"], buyer_id);
    let order_id = placed["order"]["id"].as_str().unwrap();
    let room_id = placed["chatRoom"]["id"].as_str().unwrap();

    let (_, product) = send(&app, "GET", &format!("/api/products/{product_id}"), None, None).await;
    assert_eq!(product["stock"], 1);

    let (status, _) = send(&app, "DELETE", &format!("/api/products/{product_id}"), Some(&seller), None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = send(
        &app,
        "POST",
        &format!("/api/chat-rooms/{room_id}/messages"),
        Some(&seller),
        Some(json!({ "content": "Kargoya verildi" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, messages) = send(&app, "GET", &format!("/api/chat-rooms/{room_id}/messages"), Some(&buyer), None).await;
    assert_eq!(messages.as_array().unwrap().len(), 1);

    let (_, read) = send(&app, "POST", &format!("/api/chat-rooms/{room_id}/read"), Some(&buyer), None).await;
    assert_eq!(read["updated"], 1);

    // Buyers cannot ship their own order.
    let (status, _) = send(
        &app,
        "PATCH",
        &format!("/api/orders/{order_id}/status"),
        Some(&buyer),
        Some(json!({ "status": "shipped" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, cancelled) = send(
        &app,
        "PATCH",
        &format!("/api/orders/{order_id}/status"),
        Some(&buyer),
        Some(json!({ "status": "cancelled" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cancelled["status"], "cancelled");

    let (_, product) = send(&app, "GET", &format!("/api/products/{product_id}"), None, None).await;
    assert_eq!(product["stock"], 3);

    let (status, body) = send(
        &app,
        "PATCH",
        &format!("/api/orders/{order_id}/status"),
        Some(&seller),
        Some(json!({ "status": "confirmed" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Cannot move order from cancelled to confirmed");
}

#[tokio::test]
async fn ticket_assignment_requires_an_admin_and_can_be_cleared() {
    let (app, state) = app();
    let (customer, customer_id) = register(&app, "assign@example.com", "customer").await;
    let (admin, admin_id) = login_admin(&app, &state).await;

    let (_, ticket) = send(
        &app,
        "POST",
        "/api/tickets",
        Some(&customer),
        Some(json!({ "subject": "Fatura", "body": "Faturam eksik" })),
    )
    .await;
    let uri = format!("/api/tickets/{}", ticket["id"].as_str().unwrap());

    let (status, body) = send(&app, "PATCH", &uri, Some(&admin), Some(json!({ "assignedTo": customer_id }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "assignedTo must be an admin");

    let (status, assigned) = send(&app, "PATCH", &uri, Some(&admin), Some(json!({ "assignedTo": admin_id }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(assigned["assignedTo"], admin_id);

    let (status, cleared) = send(&app, "PATCH", &uri, Some(&admin), Some(json!({ "assignedTo": null }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cleared["assignedTo"], Value::Null);

    // Owners cannot touch the assignee either.
    let (status, _) = send(&app, "PATCH", &uri, Some(&customer), Some(json!({ "assignedTo": null }))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn buyer_cannot_cancel_a_confirmed_order() {
    let (app, _) = app();
    let (seller, _) = register(&app, "s2@example.com", "seller").await;
    let (buyer, _) = register(&app, "b2@example.com", "customer").await;

    let (_, product) = send(
        &app,
        "POST",
        "/api/products",
        Some(&seller),
        Some(json!({ "name": "Termos", "price": 300.0, "stock": 2, "category": "outdoor" })),
    )
    .await;
    let (_, placed) = send(
        &app,
        "POST",
        "/api/orders",
        Some(&buyer),
        Some(json!({ "productId": product["id"], "quantity": 1 })),
    )
    .await;
    let uri = format!("/api/orders/{}/status", placed["order"]["id"].as_str().unwrap());

    let (status, _) = send(&app, "PATCH", &uri, Some(&seller), Some(json!({ "status": "confirmed" }))).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&app, "PATCH", &uri, Some(&buyer), Some(json!({ "status": "cancelled" }))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (_, product) = send(&app, "GET", &format!("/api/products/{}", product["id"].as_str().unwrap()), None, None).await;
    assert_eq!(product["stock"], 1);
}

#[tokio::test]
async fn notifications_are_private_to_their_owner() {
    let (app, state) = app();
    let (customer, _) = register(&app, "n1@example.com", "customer").await;
    let (other, _) = register(&app, "n2@example.com", "customer").await;
    let (admin, _) = login_admin(&app, &state).await;

    let (_, ticket) = send(
        &app,
        "POST",
        "/api/tickets",
        Some(&customer),
        Some(json!({ "subject": "Iade", "body": "Urun bozuk geldi" })),
    )
    .await;
    send(
        &app,
        "POST",
        &format!("/api/tickets/{}/messages", ticket["id"].as_str().unwrap()),
        Some(&admin),
        Some(json!({ "content": "Kargo kodu gonderildi" })),
    )
    .await;

    let (_, notes) = send(&app, "GET", "/api/notifications", Some(&customer), None).await;
    let note_id = notes[0]["id"].as_str().unwrap().to_string();
    let uri = format!("/api/notifications/{note_id}/read");

    let (status, _) = send(&app, "POST", &uri, Some(&other), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, notes) = send(&app, "GET", "/api/notifications?unread=true", Some(&customer), None).await;
    assert_eq!(notes.as_array().unwrap().len(), 1);

    let (status, body) = send(&app, "POST", &uri, Some(&customer), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["updated"], 1);

    let (_, notes) = send(&app, "GET", "/api/notifications?unread=true", Some(&customer), None).await;
    assert_eq!(notes, json!([]));
}

#[tokio::test]
async fn only_the_owner_may_edit_or_delete_a_product() {
    let (app, state) = app();
    let (owner, _) = register(&app, "p1@example.com", "seller").await;
    let (rival, _) = register(&app, "p2@example.com", "seller").await;
    let (admin, _) = login_admin(&app, &state).await;

    let (_, product) = send(
        &app,
        "POST",
        "/api/products",
        Some(&owner),
        Some(json!({ "name": "Fener", "price": 80.0, "stock": 4, "category": "outdoor" })),
    )
    .await;
    let uri = format!("/api/products/{}", product["id"].as_str().unwrap());

    let (status, _) = send(&app, "PATCH", &uri, Some(&rival), Some(json!({ "price": 1.0 }))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = send(&app, "DELETE", &uri, Some(&rival), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, updated) = send(&app, "PATCH", &uri, Some(&owner), Some(json!({ "stock": 9 }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["stock"], 9);
    assert_eq!(updated["price"], 80.0);

    let (status, _) = send(&app, "DELETE", &uri, Some(&admin), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = send(&app, "GET", &uri, None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn product_search_sorts_and_filters_by_price() {
    let (app, _) = app();
    let (seller, _) = register(&app, "shop@example.com", "seller").await;
    for (name, price) in [("Kupa", 40.0), ("Demlik", 250.0), ("Tepsi", 120.0)] {
        let (status, _) = send(
            &app,
            "POST",
            "/api/products",
            Some(&seller),
            Some(json!({ "name": name, "price": price, "stock": 1, "category": "kitchen" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let names = |body: &Value| -> Vec<String> {
        body.as_array()
            .unwrap()
            .iter()
            .map(|p| p["name"].as_str().unwrap().to_string())
            .collect()
    };

    let (status, body) = send(&app, "GET", "/api/products?sort=price_asc", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(names(&body), ["Kupa", "Tepsi", "Demlik"]);

    let (_, body) = send(&app, "GET", "/api/products?sort=price_desc", None, None).await;
    assert_eq!(names(&body), ["Demlik", "Tepsi", "Kupa"]);

    let (_, body) = send(&app, "GET", "/api/products?minPrice=50&maxPrice=200", None, None).await;
    assert_eq!(names(&body), ["Tepsi"]);

    let (_, body) = send(&app, "GET", "/api/products?sort=price_asc&limit=1&offset=1", None, None).await;
    assert_eq!(names(&body), ["Tepsi"]);

    let (status, body) = send(&app, "GET", "/api/products?minPrice=300&maxPrice=100", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "minPrice is greater than maxPrice");

    let (status, _) = send(&app, "GET", "/api/products?sort=cheapest", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
