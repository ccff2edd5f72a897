//! Router-level checks that resolve before any query reaches the database.

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;

use linkzur_marketplace::{
    api::{self, AppState},
    auth::{AuthKeys, Claims, Role},
    config::Config,
    notify::{LogMailer, Notifier},
    render::TextInvoiceRenderer,
    storage::LocalFileStore,
};

const SECRET: &str = "router-test-secret";

fn app() -> Router {
    let config = Config::for_tests(SECRET);
    let db = PgPoolOptions::new().connect_lazy(&config.database_url).unwrap();
    let state = AppState {
        notifier: Notifier::new(db.clone(), Arc::new(LogMailer), config.mail_from.clone()),
        auth: AuthKeys::from_secret(SECRET),
        files: Arc::new(LocalFileStore::new(&config.media_root, config.media_url.clone())),
        renderer: Arc::new(TextInvoiceRenderer),
        config: Arc::new(config),
        db,
    };
    api::router(state)
}

fn token(role: Role, staff: bool) -> String {
    let claims = Claims {
        sub: Uuid::now_v7(),
        role,
        staff,
        email: None,
        exp: (chrono::Utc::now().timestamp() + 3600) as usize,
    };
    AuthKeys::from_secret(SECRET).sign(&claims).unwrap()
}

fn request(method: Method, uri: &str, bearer: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(t) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {t}"));
    }
    match body {
        Some(v) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(v.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(req: Request<Body>) -> (StatusCode, Value) {
    let response = app().oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

#[tokio::test]
async fn health_reports_service() {
    let (status, body) = send(request(Method::GET, "/health", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["service"], "linkzur-marketplace");
}

#[tokio::test]
async fn missing_token_is_unauthenticated() {
    let (status, body) = send(request(Method::GET, "/cart", None, None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["detail"], "Authentication credentials were not provided");
}

#[tokio::test]
async fn forged_token_is_unauthenticated() {
    let forged = AuthKeys::from_secret("someone-else")
        .sign(&Claims { sub: Uuid::now_v7(), role: Role::Buyer, staff: false, email: None, exp: usize::MAX / 2 })
        .unwrap();
    let (status, _) = send(request(Method::GET, "/orders", Some(&forged), None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn sellers_cannot_use_the_cart() {
    let seller = token(Role::Seller, false);
    let body = json!({ "product_id": Uuid::now_v7(), "quantity": 1 });
    let (status, _) = send(request(Method::POST, "/cart/add", Some(&seller), Some(body))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn buyers_cannot_create_products() {
    let buyer = token(Role::Buyer, false);
    let body = json!({ "ref_no": "AB-1", "name": "Pipette", "category": "instruments" });
    let (status, _) = send(request(Method::POST, "/products", Some(&buyer), Some(body))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn seller_approval_is_staff_only() {
    let seller = token(Role::Seller, false);
    let uri = format!("/admin/sellers/{}/approve", Uuid::now_v7());
    let (status, _) = send(request(Method::POST, &uri, Some(&seller), None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn invalid_cart_quantity_is_a_field_error() {
    let buyer = token(Role::Buyer, false);
    let body = json!({ "product_id": Uuid::now_v7(), "quantity": 0 });
    let (status, body) = send(request(Method::POST, "/cart/add", Some(&buyer), Some(body))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["errors"]["quantity"].is_array());
}

#[tokio::test]
async fn unknown_dashboard_period_is_rejected() {
    let seller = token(Role::Seller, false);
    let (status, body) = send(request(Method::GET, "/seller/dashboard/stats?period=decade", Some(&seller), None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["errors"]["period"].is_array());
}

#[tokio::test]
async fn buyers_have_no_dashboard() {
    let buyer = token(Role::Buyer, false);
    let (status, _) = send(request(Method::GET, "/seller/dashboard/sales-trends", Some(&buyer), None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn unknown_order_status_is_a_field_error() {
    let seller = token(Role::Seller, false);
    let uri = format!("/orders/{}/update-status", Uuid::now_v7());
    let (status, body) = send(request(Method::PATCH, &uri, Some(&seller), Some(json!({ "status": "teleported" })))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["errors"]["status"].is_array());
}

#[tokio::test]
async fn malformed_json_is_a_bad_request() {
    let buyer = token(Role::Buyer, false);
    let req = Request::builder()
        .method(Method::POST)
        .uri("/orders/place")
        .header(header::AUTHORIZATION, format!("Bearer {buyer}"))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, _) = send(req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn malformed_quotation_request_is_rejected() {
    let buyer = token(Role::Buyer, false);
    let req = Request::builder()
        .method(Method::POST)
        .uri(format!("/quotation-requests/products/{}/request", Uuid::now_v7()))
        .header(header::AUTHORIZATION, format!("Bearer {buyer}"))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{\"variant_id\": 42"))
        .unwrap();
    let (status, body) = send(req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"].as_str().unwrap().starts_with("Invalid JSON body"));
}

#[tokio::test]
async fn incomplete_seller_registration_lists_every_field() {
    let boundary = "seller-form";
    let form = format!(
        "--{boundary}\r\nContent-Disposition: form-data; name=\"email\"\r\n\r\nnot-an-email\r\n\
         --{boundary}\r\nContent-Disposition: form-data; name=\"pan_number\"\r\n\r\n1234\r\n--{boundary}--\r\n"
    );
    let req = Request::builder()
        .method(Method::POST)
        .uri("/register/seller")
        .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={boundary}"))
        .body(Body::from(form))
        .unwrap();
    let (status, body) = send(req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    for field in ["name", "email", "company_name", "pan_number"] {
        assert!(body["errors"][field].is_array(), "{field} missing from {body}");
    }
}

#[tokio::test]
async fn buyer_signup_needs_a_valid_email() {
    let body = json!({ "email": "lab-at-uni", "name": "Central Lab" });
    let (status, body) = send(request(Method::POST, "/register/buyer", None, Some(body))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["errors"]["email"].is_array());
}

#[tokio::test]
async fn profile_requires_a_token() {
    let (status, _) = send(request(Method::GET, "/profile", None, None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
