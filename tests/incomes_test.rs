/*!
 * Income Integration Tests
 *
 * Covers income creation, validation, and the filtered listing with its
 * running total.
 */

mod common;

use axum::Json;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use common::*;
use home_finance_server::auth::AuthUser;
use home_finance_server::incomes::{create_income, list_incomes};
use home_finance_server::logs::RequestMeta;
use home_finance_server::models::{CreateIncomePayload, IncomeFilters};

fn user(usuario: &str) -> AuthUser {
    AuthUser {
        usuario: usuario.to_string(),
    }
}

fn payload(amount: f64, category: &str) -> CreateIncomePayload {
    CreateIncomePayload {
        amount: Some(amount),
        description: Some("Ingreso de prueba".to_string()),
        category: Some(category.to_string()),
    }
}

#[tokio::test]
async fn create_income_records_the_caller_as_owner() {
    let state = setup_state().await;
    create_test_user(&state.db, "asalariada", "Clave!123", "usuario", true).await;

    let (status, Json(income)) = create_income(
        State(state.clone()),
        user("asalariada"),
        RequestMeta::default(),
        Json(payload(1500.0, "salario")),
    )
    .await
    .expect("creation should succeed");
    assert_eq!(status, StatusCode::CREATED);
    assert!((income.amount - 1500.0).abs() < f64::EPSILON);
    assert_eq!(income.category, "salario");
    assert_eq!(income.nombre_usuario.as_deref(), Some("Nombre de asalariada"));
}

#[tokio::test]
async fn create_income_validates_amount_and_category() {
    let state = setup_state().await;
    create_test_user(&state.db, "asalariada", "Clave!123", "usuario", true).await;

    let err = create_income(
        State(state.clone()),
        user("asalariada"),
        RequestMeta::default(),
        Json(payload(0.0, "salario")),
    )
    .await
    .expect_err("zero amount should fail");
    assert_eq!(err.0, StatusCode::BAD_REQUEST);

    let err = create_income(
        State(state.clone()),
        user("asalariada"),
        RequestMeta::default(),
        Json(CreateIncomePayload {
            amount: Some(100.0),
            description: None,
            category: None,
        }),
    )
    .await
    .expect_err("missing category should fail");
    assert_eq!(err.0, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn list_incomes_filters_and_totals() {
    let state = setup_state().await;
    create_test_user(&state.db, "asalariada", "Clave!123", "usuario", true).await;

    for (amount, category) in [(1000.0, "salario"), (200.0, "ventas"), (300.0, "ventas")] {
        create_income(
            State(state.clone()),
            user("asalariada"),
            RequestMeta::default(),
            Json(payload(amount, category)),
        )
        .await
        .expect("creation should succeed");
    }

    let (_, Json(all)) = list_incomes(
        State(state.clone()),
        user("asalariada"),
        Query(IncomeFilters::default()),
    )
    .await
    .expect("listing should succeed");
    assert_eq!(all.incomes.len(), 3);
    assert!((all.total - 1500.0).abs() < f64::EPSILON);
    assert_eq!(all.categories, vec!["salario".to_string(), "ventas".to_string()]);

    let (_, Json(filtered)) = list_incomes(
        State(state),
        user("asalariada"),
        Query(IncomeFilters {
            start_date: None,
            end_date: None,
            category: Some("ventas".to_string()),
        }),
    )
    .await
    .expect("filtered listing should succeed");
    assert_eq!(filtered.incomes.len(), 2);
    assert!((filtered.total - 500.0).abs() < f64::EPSILON);
}
