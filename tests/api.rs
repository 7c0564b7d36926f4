use actix_web::web::Data;
use actix_web::{test, App};
use ripple::storage::{ImageStore, PlaceholderStore};
use sea_orm::{DatabaseBackend, MockDatabase};
use std::sync::Arc;

/// The routing-level tests below never reach the store; an empty mock
/// connection satisfies the pool without a live database.
fn init_test_pool() {
    let _ = ripple::db::set_db_pool(
        MockDatabase::new(DatabaseBackend::Postgres).into_connection(),
    );
}

fn image_store() -> Data<Arc<dyn ImageStore>> {
    Data::new(Arc::new(PlaceholderStore))
}

#[actix_rt::test]
async fn preflight_short_circuits_with_cors_headers() {
    init_test_pool();
    let app = test::init_service(
        App::new()
            .wrap(ripple::web::cors_headers())
            .configure(ripple::web::configure),
    )
    .await;

    let req = test::TestRequest::with_uri("/api")
        .method(actix_web::http::Method::OPTIONS)
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), actix_web::http::StatusCode::OK);
    assert_eq!(
        resp.headers()
            .get("Access-Control-Allow-Origin")
            .and_then(|v| v.to_str().ok()),
        Some("*")
    );
    assert_eq!(
        resp.headers()
            .get("Access-Control-Max-Age")
            .and_then(|v| v.to_str().ok()),
        Some("86400")
    );
}

#[actix_rt::test]
async fn unknown_action_is_not_found() {
    init_test_pool();
    let app = test::init_service(App::new().configure(ripple::web::configure)).await;

    let req = test::TestRequest::get()
        .uri("/api?action=bogus")
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), actix_web::http::StatusCode::NOT_FOUND);
}

#[actix_rt::test]
async fn unknown_path_is_not_found() {
    init_test_pool();
    let app = test::init_service(App::new().configure(ripple::web::configure)).await;

    let req = test::TestRequest::get().uri("/nope").to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), actix_web::http::StatusCode::NOT_FOUND);
}

#[actix_rt::test]
async fn create_without_token_is_unauthorized() {
    init_test_pool();
    let app = test::init_service(App::new().configure(ripple::web::configure)).await;

    let req = test::TestRequest::post()
        .uri("/api?action=create")
        .set_json(serde_json::json!({ "content": "hello" }))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), actix_web::http::StatusCode::UNAUTHORIZED);
}

#[actix_rt::test]
async fn follow_without_token_is_unauthorized() {
    init_test_pool();
    let app = test::init_service(App::new().configure(ripple::web::configure)).await;

    let req = test::TestRequest::post()
        .uri("/api?action=follow")
        .set_json(serde_json::json!({ "user_id": 1 }))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), actix_web::http::StatusCode::UNAUTHORIZED);
}

#[actix_rt::test]
async fn upload_without_token_is_unauthorized() {
    init_test_pool();
    let app = test::init_service(
        App::new()
            .app_data(image_store())
            .configure(ripple::web::configure),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/api/upload")
        .set_json(serde_json::json!({ "image": "data:image/png;base64,aGVsbG8=" }))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), actix_web::http::StatusCode::UNAUTHORIZED);
}

#[actix_rt::test]
async fn large_upload_passes_the_transport_and_fails_auth() {
    init_test_pool();
    let app = test::init_service(
        App::new()
            .app_data(image_store())
            .configure(ripple::web::configure),
    )
    .await;

    // ~1.3MB of data-URI must clear the body limit and reach the handler,
    // where the missing token answers 401, not 413
    let image = format!("data:image/png;base64,{}", "A".repeat(1_300_000));
    let req = test::TestRequest::post()
        .uri("/api/upload")
        .set_json(serde_json::json!({ "image": image }))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), actix_web::http::StatusCode::UNAUTHORIZED);
}

#[actix_rt::test]
async fn register_with_short_password_is_rejected() {
    init_test_pool();
    let app = test::init_service(App::new().configure(ripple::web::configure)).await;

    let req = test::TestRequest::post()
        .uri("/api?action=register")
        .set_json(serde_json::json!({
            "username": "alice",
            "email": "alice@x.com",
            "password": "short",
            "fullName": "Alice A",
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), actix_web::http::StatusCode::BAD_REQUEST);
}

#[actix_rt::test]
async fn register_with_invalid_json_is_rejected() {
    init_test_pool();
    let app = test::init_service(App::new().configure(ripple::web::configure)).await;

    let req = test::TestRequest::post()
        .uri("/api?action=register")
        .insert_header(("Content-Type", "application/json"))
        .set_payload("this is not json")
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), actix_web::http::StatusCode::BAD_REQUEST);
}

#[actix_rt::test]
async fn logout_without_token_is_a_noop() {
    init_test_pool();
    let app = test::init_service(App::new().configure(ripple::web::configure)).await;

    let req = test::TestRequest::post()
        .uri("/api?action=logout")
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), actix_web::http::StatusCode::OK);
}

#[actix_rt::test]
async fn search_requires_a_query() {
    init_test_pool();
    let app = test::init_service(App::new().configure(ripple::web::configure)).await;

    let req = test::TestRequest::get()
        .uri("/api?action=search&q=")
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), actix_web::http::StatusCode::BAD_REQUEST);
}
