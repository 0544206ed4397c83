//! API integration tests
//!
//! Drives the full `/api` router with axum-test over in-memory SQLite.
//! Email is disabled, no chat model is configured, and Instagram serves its
//! mock feed.

use axum::http::{header, HeaderName, HeaderValue, StatusCode};
use axum_test::TestServer;
use serde_json::{json, Value};
use std::sync::Arc;

use brokerage::api::{self, AppState};
use brokerage::cache::create_cache;
use brokerage::config::Config;
use brokerage::db::{create_test_pool, migrations};
use brokerage::services::email::DisabledMailer;
use brokerage::services::hash_password;

const ADMIN_USER: &str = "broker";
const ADMIN_PASSWORD: &str = "curb-appeal";
const IMPORT_TOKEN: &str = "extension-secret";

fn bearer(token: &str) -> HeaderValue {
    HeaderValue::from_str(&format!("Bearer {}", token)).unwrap()
}

fn admin_token_header() -> HeaderName {
    HeaderName::from_static("x-admin-token")
}

// ============================================================================
// Test Setup Helpers
// ============================================================================

async fn build_test_server() -> TestServer {
    let pool = create_test_pool().await.expect("Failed to create test pool");
    migrations::run_migrations(&pool).await.expect("Failed to run migrations");

    let mut config = Config::default();
    config.admin.username = ADMIN_USER.to_string();
    config.admin.password_hash = Some(hash_password(ADMIN_PASSWORD).unwrap());
    config.admin.import_token = Some(IMPORT_TOKEN.to_string());

    let state = AppState::build(
        pool,
        &config,
        create_cache(&config.cache),
        reqwest::Client::new(),
        Arc::new(DisabledMailer),
        None,
    );
    let app = api::build_router(state, &config.server.cors_origin).expect("Failed to build router");
    TestServer::new(app).expect("Failed to create test server")
}

async fn login(server: &TestServer) -> String {
    let response = server
        .post("/api/auth/login")
        .json(&json!({"username": ADMIN_USER, "password": ADMIN_PASSWORD}))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    body["token"].as_str().expect("token in login response").to_string()
}

async fn create_listing(server: &TestServer, token: &str, body: Value) -> Value {
    let response = server
        .post("/api/listings")
        .add_header(header::AUTHORIZATION, bearer(token))
        .json(&body)
        .await;
    response.assert_status(StatusCode::CREATED);
    response.json()
}

// ============================================================================
// Health
// ============================================================================

#[tokio::test]
async fn test_health_reports_ok() {
    let server = build_test_server().await;

    let response = server.get("/api/health").await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["database"], true);
    assert_eq!(body["ai_enabled"], false);
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn test_unknown_api_route_is_json_404() {
    let server = build_test_server().await;

    let response = server.get("/api/nope").await;
    response.assert_status_not_found();
    let body: Value = response.json();
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

// ============================================================================
// Auth
// ============================================================================

#[tokio::test]
async fn test_login_sets_cookie_and_me_works() {
    let server = build_test_server().await;

    let response = server
        .post("/api/auth/login")
        .json(&json!({"username": ADMIN_USER, "password": ADMIN_PASSWORD}))
        .await;
    response.assert_status_ok();
    let cookie = response.header(header::SET_COOKIE);
    let cookie = cookie.to_str().unwrap();
    assert!(cookie.starts_with("admin_session="));
    assert!(cookie.contains("HttpOnly"));

    let body: Value = response.json();
    let token = body["token"].as_str().unwrap();
    assert_eq!(body["admin"]["username"], ADMIN_USER);

    let me = server
        .get("/api/auth/me")
        .add_header(header::COOKIE, HeaderValue::from_str(&format!("admin_session={}", token)).unwrap())
        .await;
    me.assert_status_ok();
    let me: Value = me.json();
    assert_eq!(me["username"], ADMIN_USER);
}

#[tokio::test]
async fn test_wrong_password_is_unauthorized() {
    let server = build_test_server().await;

    let response = server
        .post("/api/auth/login")
        .json(&json!({"username": ADMIN_USER, "password": "wrong"}))
        .await;
    response.assert_status_unauthorized();
    let body: Value = response.json();
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn test_login_locked_after_five_failures() {
    let server = build_test_server().await;

    for _ in 0..5 {
        server
            .post("/api/auth/login")
            .json(&json!({"username": ADMIN_USER, "password": "guess"}))
            .await
            .assert_status_unauthorized();
    }

    // Even the right password is refused while the username is locked
    let response = server
        .post("/api/auth/login")
        .json(&json!({"username": ADMIN_USER, "password": ADMIN_PASSWORD}))
        .await;
    response.assert_status(StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().get(header::RETRY_AFTER).is_some());
    let body: Value = response.json();
    assert_eq!(body["error"]["code"], "RATE_LIMIT");
}

#[tokio::test]
async fn test_logout_invalidates_token() {
    let server = build_test_server().await;
    let token = login(&server).await;

    server
        .post("/api/auth/logout")
        .add_header(header::AUTHORIZATION, bearer(&token))
        .await
        .assert_status(StatusCode::NO_CONTENT);

    server
        .get("/api/auth/me")
        .add_header(header::AUTHORIZATION, bearer(&token))
        .await
        .assert_status_unauthorized();
}

#[tokio::test]
async fn test_admin_routes_require_session() {
    let server = build_test_server().await;

    server.get("/api/leads").await.assert_status_unauthorized();
    server.get("/api/leads/stats").await.assert_status_unauthorized();
    server
        .post("/api/listings")
        .json(&json!({"title": "x", "address": "y", "city": "z", "price": 1}))
        .await
        .assert_status_unauthorized();
    server
        .get("/api/auth/me")
        .add_header(header::AUTHORIZATION, bearer("not-a-real-token"))
        .await
        .assert_status_unauthorized();
}

// ============================================================================
// Listings
// ============================================================================

#[tokio::test]
async fn test_listing_crud_and_visibility() {
    let server = build_test_server().await;
    let token = login(&server).await;

    let active = create_listing(
        &server,
        &token,
        json!({
            "title": "Bungalow with pool",
            "address": "12 Elm St",
            "city": "Austin",
            "state": "TX",
            "zip_code": "78704",
            "price": 525000,
            "bedrooms": 3,
            "bathrooms": 2.0,
            "features": ["pool"],
        }),
    )
    .await;
    assert_eq!(active["status"], "active");
    assert_eq!(active["listing_type"], "sale");

    let sold = create_listing(
        &server,
        &token,
        json!({
            "title": "Sold loft",
            "address": "5 Congress Ave",
            "city": "Austin",
            "price": 400000,
            "status": "sold",
        }),
    )
    .await;

    // Public list hides sold listings
    let response = server.get("/api/listings").await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["count"], 1);
    assert_eq!(body["listings"][0]["id"], active["id"]);

    // Public detail of a sold listing is a 404, the admin still sees it
    let sold_path = format!("/api/listings/{}", sold["id"]);
    server.get(&sold_path).await.assert_status_not_found();
    server
        .get(&sold_path)
        .add_header(header::AUTHORIZATION, bearer(&token))
        .await
        .assert_status_ok();

    // all=true is admin only
    server.get("/api/listings?all=true").await.assert_status_unauthorized();
    let all: Value = server
        .get("/api/listings?all=true")
        .add_header(header::AUTHORIZATION, bearer(&token))
        .await
        .json();
    assert_eq!(all["count"], 2);

    // Update clears the cached public list
    let active_path = format!("/api/listings/{}", active["id"]);
    let response = server
        .patch(&active_path)
        .add_header(header::AUTHORIZATION, bearer(&token))
        .json(&json!({"price": 499000, "featured": true}))
        .await;
    response.assert_status_ok();
    let listed: Value = server.get("/api/listings").await.json();
    assert_eq!(listed["listings"][0]["price"], 499000);

    server
        .delete(&active_path)
        .add_header(header::AUTHORIZATION, bearer(&token))
        .await
        .assert_status(StatusCode::NO_CONTENT);
    server.get(&active_path).await.assert_status_not_found();
}

#[tokio::test]
async fn test_listing_validation_errors() {
    let server = build_test_server().await;
    let token = login(&server).await;

    let response = server
        .post("/api/listings")
        .add_header(header::AUTHORIZATION, bearer(&token))
        .json(&json!({"title": "  ", "address": "1 A St", "city": "Austin", "price": 100}))
        .await;
    response.assert_status_bad_request();
    let body: Value = response.json();
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

    server
        .post("/api/listings")
        .add_header(header::AUTHORIZATION, bearer(&token))
        .json(&json!({"title": "T", "address": "1 A St", "city": "Austin", "price": 100, "property_type": "castle"}))
        .await
        .assert_status_bad_request();

    server
        .get("/api/listings?property_type=castle")
        .await
        .assert_status_bad_request();
}

// ============================================================================
// Search
// ============================================================================

#[tokio::test]
async fn test_search_ranks_matching_listings() {
    let server = build_test_server().await;
    let token = login(&server).await;

    create_listing(
        &server,
        &token,
        json!({"title": "Family home", "address": "1 Oak Ln", "city": "Austin", "price": 450000,
               "bedrooms": 3, "bathrooms": 2.0, "features": ["pool", "garage"]}),
    )
    .await;
    create_listing(
        &server,
        &token,
        json!({"title": "Studio condo", "address": "9 Main St", "city": "Dallas", "price": 250000,
               "property_type": "condo", "bedrooms": 0}),
    )
    .await;

    let response = server
        .post("/api/search")
        .json(&json!({"query": "3 bedroom house in Austin under $500k with a pool"}))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["criteria"]["min_bedrooms"], 3);
    assert_eq!(body["criteria"]["max_price"], 500000);
    let results = body["results"].as_array().unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["listing"]["title"], "Family home");
    assert!(body["summary"].as_str().unwrap().len() > 0);
}

// ============================================================================
// Leads
// ============================================================================

#[tokio::test]
async fn test_lead_capture_and_admin_crm() {
    let server = build_test_server().await;
    let token = login(&server).await;

    let response = server
        .post("/api/leads")
        .json(&json!({"name": "Dana Reyes", "email": "dana@example.com", "message": "Interested in selling", "intent": "sell"}))
        .await;
    response.assert_status(StatusCode::CREATED);
    let lead: Value = response.json();
    assert_eq!(lead["status"], "new");
    assert_eq!(lead["source"], "contact_form");
    let lead_path = format!("/api/leads/{}", lead["id"]);

    // Outbound contact moves the lead along
    server
        .post(&format!("{}/communications", lead_path))
        .add_header(header::AUTHORIZATION, bearer(&token))
        .json(&json!({"channel": "phone", "direction": "outbound", "summary": "Left a voicemail"}))
        .await
        .assert_status(StatusCode::CREATED);
    let note = server
        .post(&format!("{}/notes", lead_path))
        .add_header(header::AUTHORIZATION, bearer(&token))
        .json(&json!({"body": "Wants a valuation next week"}))
        .await;
    note.assert_status(StatusCode::CREATED);
    let note: Value = note.json();
    assert_eq!(note["author"], ADMIN_USER);

    let detail: Value = server
        .get(&lead_path)
        .add_header(header::AUTHORIZATION, bearer(&token))
        .await
        .json();
    assert_eq!(detail["status"], "contacted");
    assert_eq!(detail["communications"].as_array().unwrap().len(), 1);
    assert_eq!(detail["notes"].as_array().unwrap().len(), 1);

    let list: Value = server
        .get("/api/leads?status=contacted&q=dana")
        .add_header(header::AUTHORIZATION, bearer(&token))
        .await
        .json();
    assert_eq!(list["total"], 1);

    let stats: Value = server
        .get("/api/leads/stats")
        .add_header(header::AUTHORIZATION, bearer(&token))
        .await
        .json();
    assert_eq!(stats["total"], 1);
    assert_eq!(stats["contacted"], 1);

    server
        .delete(&lead_path)
        .add_header(header::AUTHORIZATION, bearer(&token))
        .await
        .assert_status(StatusCode::NO_CONTENT);
    server
        .get(&lead_path)
        .add_header(header::AUTHORIZATION, bearer(&token))
        .await
        .assert_status_not_found();
}

#[tokio::test]
async fn test_lead_capture_validation() {
    let server = build_test_server().await;

    let response = server
        .post("/api/leads")
        .json(&json!({"name": "No Contact"}))
        .await;
    response.assert_status_bad_request();

    server
        .post("/api/leads")
        .json(&json!({"name": "Bad Email", "email": "not-an-email"}))
        .await
        .assert_status_bad_request();
}

#[tokio::test]
async fn test_lead_submissions_are_rate_limited_per_ip() {
    let server = build_test_server().await;
    let ip = HeaderValue::from_static("203.0.113.50");

    // Default allowance is 20 submissions per window
    for i in 0..20 {
        server
            .post("/api/leads")
            .add_header(HeaderName::from_static("x-forwarded-for"), ip.clone())
            .json(&json!({"name": format!("Visitor {}", i), "phone": "512-555-0100"}))
            .await
            .assert_status(StatusCode::CREATED);
    }

    server
        .post("/api/leads")
        .add_header(HeaderName::from_static("x-forwarded-for"), ip)
        .json(&json!({"name": "One Too Many", "phone": "512-555-0100"}))
        .await
        .assert_status(StatusCode::TOO_MANY_REQUESTS);

    // Another client is unaffected
    server
        .post("/api/leads")
        .add_header(HeaderName::from_static("x-forwarded-for"), HeaderValue::from_static("198.51.100.9"))
        .json(&json!({"name": "Neighbor", "phone": "512-555-0199"}))
        .await
        .assert_status(StatusCode::CREATED);
}

// ============================================================================
// Chat
// ============================================================================

#[tokio::test]
async fn test_chat_matches_listings_and_captures_lead_once() {
    let server = build_test_server().await;
    let token = login(&server).await;

    create_listing(
        &server,
        &token,
        json!({"title": "Lakeside house", "address": "3 Shore Dr", "city": "Austin", "price": 600000,
               "bedrooms": 4, "bathrooms": 3.0, "features": ["waterfront"]}),
    )
    .await;

    let first = server
        .post("/api/chat")
        .json(&json!({"messages": [
            {"role": "user", "content": "I want to buy a 4 bedroom house in Austin"}
        ]}))
        .await;
    first.assert_status_ok();
    let first: Value = first.json();
    assert_eq!(first["intent"], "buy");
    assert_eq!(first["source"], "rules");
    assert_eq!(first["lead_created"], false);
    assert_eq!(first["matches"].as_array().unwrap().len(), 1);

    let second: Value = server
        .post("/api/chat")
        .json(&json!({"messages": [
            {"role": "user", "content": "I want to buy a 4 bedroom house in Austin"},
            {"role": "assistant", "content": first["reply"]},
            {"role": "user", "content": "My name is Sam Ortiz, email sam@example.com"}
        ]}))
        .await
        .json();
    assert_eq!(second["lead_created"], true);
    let lead_id = second["lead_id"].as_i64().unwrap();

    // Echoing lead_id back does not create another lead
    let third: Value = server
        .post("/api/chat")
        .json(&json!({
            "lead_id": lead_id,
            "messages": [
                {"role": "user", "content": "I want to buy a 4 bedroom house in Austin"},
                {"role": "user", "content": "My name is Sam Ortiz, email sam@example.com"},
                {"role": "user", "content": "Thanks!"}
            ]
        }))
        .await
        .json();
    assert_eq!(third["lead_created"], false);
    assert_eq!(third["lead_id"], lead_id);

    let leads: Value = server
        .get("/api/leads?source=chat")
        .add_header(header::AUTHORIZATION, bearer(&token))
        .await
        .json();
    assert_eq!(leads["total"], 1);
    assert_eq!(leads["items"][0]["name"], "Sam Ortiz");
}

#[tokio::test]
async fn test_chat_requires_a_user_message() {
    let server = build_test_server().await;

    let response = server.post("/api/chat").json(&json!({"messages": []})).await;
    response.assert_status_bad_request();
}

// ============================================================================
// Import drafts
// ============================================================================

#[tokio::test]
async fn test_import_requires_token() {
    let server = build_test_server().await;

    server
        .post("/api/import")
        .json(&json!({"title": "Scraped"}))
        .await
        .assert_status_unauthorized();
    server
        .post("/api/import")
        .add_header(admin_token_header(), HeaderValue::from_static("wrong"))
        .json(&json!({"title": "Scraped"}))
        .await
        .assert_status_unauthorized();
    server.get("/api/import").await.assert_status_unauthorized();
}

#[tokio::test]
async fn test_import_draft_approve_once() {
    let server = build_test_server().await;
    let token = login(&server).await;

    let response = server
        .post("/api/import")
        .add_header(admin_token_header(), HeaderValue::from_static(IMPORT_TOKEN))
        .json(&json!({
            "title": "  Craftsman near the park ",
            "address": "44 Park Pl",
            "city": "Austin",
            "price": "$615,000",
            "property_type": "Single Family Residence",
            "source_url": "https://listings.example/44-park"
        }))
        .await;
    response.assert_status(StatusCode::CREATED);
    let draft: Value = response.json();
    assert_eq!(draft["status"], "pending");
    assert_eq!(draft["payload"]["price"], 615000);
    let draft_id = draft["id"].as_i64().unwrap();

    // The extension can list drafts with its token
    let drafts: Value = server
        .get("/api/import?status=pending")
        .add_header(admin_token_header(), HeaderValue::from_static(IMPORT_TOKEN))
        .await
        .json();
    assert_eq!(drafts.as_array().unwrap().len(), 1);

    let approve_path = format!("/api/import/{}/approve", draft_id);
    let response = server
        .post(&approve_path)
        .add_header(header::AUTHORIZATION, bearer(&token))
        .json(&json!({"overrides": {"bedrooms": 3}}))
        .await;
    response.assert_status(StatusCode::CREATED);
    let approved: Value = response.json();
    assert_eq!(approved["draft"]["status"], "approved");
    assert_eq!(approved["listing"]["title"], "Craftsman near the park");
    assert_eq!(approved["listing"]["bedrooms"], 3);
    assert_eq!(approved["draft"]["listing_id"], approved["listing"]["id"]);

    server
        .post(&approve_path)
        .add_header(header::AUTHORIZATION, bearer(&token))
        .await
        .assert_status(StatusCode::CONFLICT);
    server
        .post(&format!("/api/import/{}/reject", draft_id))
        .add_header(header::AUTHORIZATION, bearer(&token))
        .await
        .assert_status(StatusCode::CONFLICT);

    let listings: Value = server.get("/api/listings").await.json();
    assert_eq!(listings["count"], 1);
}

// ============================================================================
// Instagram
// ============================================================================

#[tokio::test]
async fn test_instagram_serves_mock_feed_without_token() {
    let server = build_test_server().await;

    let response = server.get("/api/instagram?limit=3").await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["source"], "mock");
    assert_eq!(body["posts"].as_array().unwrap().len(), 3);
}
