/*!
 * Documentation and Notification Route Tests
 *
 * Covers the HTTP Basic gate on /docs, the machine-readable catalog, the
 * liveness probe, and the notification mail route without SMTP configured.
 */

mod common;

use axum::Json;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use common::*;
use home_finance_server::auth::AuthUser;
use home_finance_server::docs::{docs_page, endpoints, live};
use home_finance_server::mailer::send_notification;
use home_finance_server::models::EmailSendPayload;

fn basic_headers(usuario: &str, password: &str) -> HeaderMap {
    let encoded = BASE64.encode(format!("{}:{}", usuario, password));
    let mut headers = HeaderMap::new();
    headers.insert(
        header::AUTHORIZATION,
        HeaderValue::from_str(&format!("Basic {}", encoded)).unwrap(),
    );
    headers
}

#[tokio::test]
async fn docs_challenge_carries_the_realm() {
    let state = setup_state().await;

    let response = docs_page(State(state.clone()), HeaderMap::new()).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        response
            .headers()
            .get(header::WWW_AUTHENTICATE)
            .and_then(|v| v.to_str().ok()),
        Some("Basic realm=\"Login Required\"")
    );

    let response = docs_page(
        State(state.clone()),
        basic_headers(TEST_ADMIN, "incorrecta"),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = docs_page(
        State(state),
        basic_headers(TEST_ADMIN, TEST_ADMIN_PASSWORD),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn docs_refuses_blocked_accounts() {
    let state = setup_state().await;
    create_test_user(&state.db, "bloqueada", "Clave!123", "usuario", false).await;

    let response = docs_page(State(state), basic_headers("bloqueada", "Clave!123")).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn endpoints_catalog_lists_every_group() {
    let (status, Json(catalog)) = endpoints().await;
    assert_eq!(status, StatusCode::OK);
    for group in ["auth", "users", "expenses", "incomes", "debts", "debtors", "roles", "scores", "logs", "email", "meta"] {
        assert!(catalog.get(group).is_some(), "missing group {}", group);
    }
}

#[tokio::test]
async fn live_reports_ok() {
    let (status, Json(body)) = live().await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn send_notification_requires_a_message() {
    let state = setup_state().await;

    let err = send_notification(
        State(state),
        AuthUser {
            usuario: TEST_ADMIN.to_string(),
        },
        Json(EmailSendPayload {
            asunto: Some("Aviso".to_string()),
            mensaje: None,
        }),
    )
    .await
    .expect_err("missing message should fail");
    assert_eq!(err.0, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn send_notification_without_smtp_is_a_server_error() {
    let state = setup_state().await;

    let err = send_notification(
        State(state),
        AuthUser {
            usuario: TEST_ADMIN.to_string(),
        },
        Json(EmailSendPayload {
            asunto: None,
            mensaje: Some("El servidor necesita atención".to_string()),
        }),
    )
    .await
    .expect_err("no SMTP relay configured");
    assert_eq!(err.0, StatusCode::INTERNAL_SERVER_ERROR);
}
