use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
};
use libsql::params_from_iter;

use crate::AppState;
use crate::auth::{self, AuthUser};
use crate::logs::{self, RequestMeta};
use crate::models::{CreateIncomePayload, IncomeFilters, IncomeRow, IncomesResponse};
use crate::utils::{ApiError, bad_request, db_error};

fn extract_income_row(row: &libsql::Row) -> Result<IncomeRow, ApiError> {
    Ok(IncomeRow {
        id: row.get(0).map_err(|_| db_error())?,
        amount: row.get(1).map_err(|_| db_error())?,
        description: row.get(2).map_err(|_| db_error())?,
        category: row.get(3).map_err(|_| db_error())?,
        date: row.get(4).map_err(|_| db_error())?,
        nombre_usuario: row.get(5).map_err(|_| db_error())?,
    })
}

/// GET /incomes — any authenticated user.
pub async fn list_incomes(
    State(state): State<AppState>,
    _user: AuthUser,
    Query(filters): Query<IncomeFilters>,
) -> Result<(StatusCode, Json<IncomesResponse>), ApiError> {
    let mut clauses: Vec<String> = Vec::new();
    let mut values: Vec<libsql::Value> = Vec::new();
    if let Some(v) = filters.start_date.as_deref().filter(|v| !v.is_empty()) {
        clauses.push("i.date >= ?".to_string());
        values.push(libsql::Value::Text(v.to_string()));
    }
    if let Some(v) = filters.end_date.as_deref().filter(|v| !v.is_empty()) {
        clauses.push("i.date <= ?".to_string());
        values.push(libsql::Value::Text(v.to_string()));
    }
    if let Some(v) = filters.category.as_deref().filter(|v| !v.is_empty()) {
        clauses.push("i.category = ?".to_string());
        values.push(libsql::Value::Text(v.to_string()));
    }
    let where_clause = if clauses.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", clauses.join(" AND "))
    };

    let conn = state.db.read().await;
    let mut rows = conn
        .query(
            &format!(
                "SELECT i.id, i.amount, i.description, i.category, i.date, u.nombre \
                 FROM incomes i LEFT JOIN usuarios u ON u.id = i.user_id{} \
                 ORDER BY i.date DESC",
                where_clause
            ),
            params_from_iter(values),
        )
        .await
        .map_err(|_| db_error())?;

    let mut incomes = Vec::new();
    while let Some(row) = rows.next().await.map_err(|_| db_error())? {
        incomes.push(extract_income_row(&row)?);
    }
    let total = incomes.iter().map(|i| i.amount).sum();

    let mut categories = Vec::new();
    let mut cat_rows = conn
        .query("SELECT DISTINCT category FROM incomes ORDER BY category", ())
        .await
        .map_err(|_| db_error())?;
    while let Some(row) = cat_rows.next().await.map_err(|_| db_error())? {
        categories.push(row.get(0).map_err(|_| db_error())?);
    }

    Ok((
        StatusCode::OK,
        Json(IncomesResponse {
            incomes,
            total,
            categories,
        }),
    ))
}

/// POST /incomes — any authenticated user.
pub async fn create_income(
    State(state): State<AppState>,
    user: AuthUser,
    meta: RequestMeta,
    Json(payload): Json<CreateIncomePayload>,
) -> Result<(StatusCode, Json<IncomeRow>), ApiError> {
    let Some(amount) = payload.amount else {
        return Err(bad_request("Se requiere el monto"));
    };
    if amount <= 0.0 {
        return Err(bad_request("El monto debe ser mayor que cero"));
    }
    let Some(category) = payload.category.filter(|c| !c.trim().is_empty()) else {
        return Err(bad_request("Se requiere la categoría"));
    };

    let user_id = auth::get_user_id(&state.db, &user.usuario).await?;
    let income_id = {
        let conn = state.db.write().await;
        conn.execute(
            "INSERT INTO incomes (amount, description, category, user_id) VALUES (?, ?, ?, ?)",
            (
                amount,
                payload.description.as_deref(),
                category.as_str(),
                user_id,
            ),
        )
        .await
        .map_err(|_| db_error())?;
        conn.last_insert_rowid()
    };

    logs::record(
        &state.db,
        &meta,
        "crear",
        "incomes",
        &user.usuario,
        Some(serde_json::json!({ "id": income_id, "amount": amount, "category": category })),
    )
    .await;

    let income = {
        let conn = state.db.read().await;
        let mut rows = conn
            .query(
                "SELECT i.id, i.amount, i.description, i.category, i.date, u.nombre \
                 FROM incomes i LEFT JOIN usuarios u ON u.id = i.user_id WHERE i.id = ?",
                [income_id],
            )
            .await
            .map_err(|_| db_error())?;
        match rows.next().await.map_err(|_| db_error())? {
            Some(row) => extract_income_row(&row)?,
            None => return Err(db_error()),
        }
    };

    Ok((StatusCode::CREATED, Json(income)))
}
