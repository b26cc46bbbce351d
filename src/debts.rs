use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use libsql::params_from_iter;

use crate::AppState;
use crate::auth::{self, AuthUser};
use crate::constants::*;
use crate::database::Db;
use crate::logs::{self, RequestMeta};
use crate::models::{
    CreateDebtPayload, CreateDebtResponse, DebtFilters, DebtRow, DebtsResponse, MessageResponse,
    UpdateDebtPayload,
};
use crate::utils::{ApiError, bad_request, db_error, not_found};

const DEBT_SELECT: &str = r#"
SELECT d.id, d.amount, d.description, d.date, d.is_paid, u.nombre, dr.nombre
FROM debts d
LEFT JOIN usuarios u ON u.id = d.user_id
JOIN debtors dr ON dr.id = d.debtor_id
"#;

fn extract_debt_row(row: &libsql::Row) -> Result<DebtRow, ApiError> {
    let is_paid: i64 = row.get(4).map_err(|_| db_error())?;
    Ok(DebtRow {
        id: row.get(0).map_err(|_| db_error())?,
        amount: row.get(1).map_err(|_| db_error())?,
        description: row.get(2).map_err(|_| db_error())?,
        date: row.get(3).map_err(|_| db_error())?,
        is_paid: is_paid != 0,
        nombre_usuario: row.get(5).map_err(|_| db_error())?,
        nombre_deudor: row.get(6).map_err(|_| db_error())?,
    })
}

async fn fetch_debt(db: &Db, debt_id: i64) -> Result<DebtRow, ApiError> {
    let conn = db.read().await;
    let mut rows = conn
        .query(&format!("{} WHERE d.id = ?", DEBT_SELECT), [debt_id])
        .await
        .map_err(|_| db_error())?;
    match rows.next().await.map_err(|_| db_error())? {
        Some(row) => extract_debt_row(&row),
        None => Err(not_found("Deuda no encontrada")),
    }
}

async fn debt_owner_id(db: &Db, debt_id: i64) -> Result<i64, ApiError> {
    let conn = db.read().await;
    let mut rows = conn
        .query("SELECT user_id FROM debts WHERE id = ?", [debt_id])
        .await
        .map_err(|_| db_error())?;
    match rows.next().await.map_err(|_| db_error())? {
        Some(row) => row.get(0).map_err(|_| db_error()),
        None => Err(not_found("Deuda no encontrada")),
    }
}

/// GET /debts — any authenticated user. Returns the filtered rows, their
/// sum and the distinct list of owning users.
pub async fn list_debts(
    State(state): State<AppState>,
    _user: AuthUser,
    Query(filters): Query<DebtFilters>,
) -> Result<(StatusCode, Json<DebtsResponse>), ApiError> {
    let mut clauses: Vec<String> = Vec::new();
    let mut values: Vec<libsql::Value> = Vec::new();
    if let Some(v) = filters.start_date.as_deref().filter(|v| !v.is_empty()) {
        clauses.push("d.date >= ?".to_string());
        values.push(libsql::Value::Text(v.to_string()));
    }
    if let Some(v) = filters.end_date.as_deref().filter(|v| !v.is_empty()) {
        clauses.push("d.date <= ?".to_string());
        values.push(libsql::Value::Text(v.to_string()));
    }
    if let Some(v) = filters.usuario.as_deref().filter(|v| !v.is_empty()) {
        clauses.push("u.usuario = ?".to_string());
        values.push(libsql::Value::Text(v.to_string()));
    }
    if let Some(v) = filters.deudor.as_deref().filter(|v| !v.is_empty()) {
        clauses.push("dr.nombre = ?".to_string());
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
            &format!("{}{} ORDER BY d.date DESC", DEBT_SELECT, where_clause),
            params_from_iter(values),
        )
        .await
        .map_err(|_| db_error())?;

    let mut debts = Vec::new();
    while let Some(row) = rows.next().await.map_err(|_| db_error())? {
        debts.push(extract_debt_row(&row)?);
    }
    let total = debts.iter().map(|d| d.amount).sum();

    let mut users = Vec::new();
    let mut user_rows = conn
        .query(
            r#"
            SELECT DISTINCT u.nombre FROM debts d
            JOIN usuarios u ON u.id = d.user_id
            WHERE u.nombre IS NOT NULL ORDER BY u.nombre
            "#,
            (),
        )
        .await
        .map_err(|_| db_error())?;
    while let Some(row) = user_rows.next().await.map_err(|_| db_error())? {
        users.push(row.get(0).map_err(|_| db_error())?);
    }

    Ok((StatusCode::OK, Json(DebtsResponse { debts, total, users })))
}

/// POST /debts — any authenticated user. The debtor must already exist.
pub async fn create_debt(
    State(state): State<AppState>,
    user: AuthUser,
    meta: RequestMeta,
    Json(payload): Json<CreateDebtPayload>,
) -> Result<(StatusCode, Json<CreateDebtResponse>), ApiError> {
    let Some(amount) = payload.amount else {
        return Err(bad_request("Se requiere el monto"));
    };
    if amount <= 0.0 {
        return Err(bad_request("El monto debe ser mayor que cero"));
    }
    let Some(debtor_id) = payload.debtor_id else {
        return Err(bad_request("Se requiere el deudor"));
    };

    let user_id = auth::get_user_id(&state.db, &user.usuario).await?;
    let debt_id = {
        let conn = state.db.write().await;

        let mut debtor = conn
            .query("SELECT id FROM debtors WHERE id = ?", [debtor_id])
            .await
            .map_err(|_| db_error())?;
        if debtor.next().await.map_err(|_| db_error())?.is_none() {
            return Err(not_found("Deudor no encontrado"));
        }
        drop(debtor);

        conn.execute(
            "INSERT INTO debts (amount, description, user_id, debtor_id) VALUES (?, ?, ?, ?)",
            (amount, payload.description.as_deref(), user_id, debtor_id),
        )
        .await
        .map_err(|_| db_error())?;
        conn.last_insert_rowid()
    };

    logs::record(
        &state.db,
        &meta,
        "crear",
        "debts",
        &user.usuario,
        Some(serde_json::json!({ "id": debt_id, "amount": amount, "debtor_id": debtor_id })),
    )
    .await;

    let debt = fetch_debt(&state.db, debt_id).await?;
    Ok((
        StatusCode::CREATED,
        Json(CreateDebtResponse {
            mensaje: "Deuda registrada correctamente".to_string(),
            debt,
        }),
    ))
}

/// PATCH /debts/{id} — requires `editar_deudas`; callers may only touch
/// their own debts, anyone else's id reads as missing. Only the provided
/// fields change.
pub async fn update_debt(
    State(state): State<AppState>,
    user: AuthUser,
    meta: RequestMeta,
    Path(debt_id): Path<i64>,
    Json(payload): Json<UpdateDebtPayload>,
) -> Result<(StatusCode, Json<CreateDebtResponse>), ApiError> {
    auth::require_permission(&state.db, &user.usuario, PERM_EDIT_DEBTS).await?;

    if payload.amount.is_none()
        && payload.debtor_id.is_none()
        && payload.description.is_none()
        && payload.is_paid.is_none()
    {
        return Err(bad_request("No se proporcionaron campos para actualizar"));
    }
    if let Some(amount) = payload.amount {
        if amount <= 0.0 {
            return Err(bad_request("El monto debe ser mayor que cero"));
        }
    }

    let owner_id = debt_owner_id(&state.db, debt_id).await?;
    let caller_id = auth::get_user_id(&state.db, &user.usuario).await?;
    if owner_id != caller_id {
        return Err(not_found("Deuda no encontrada"));
    }

    {
        let conn = state.db.write().await;
        if let Some(amount) = payload.amount {
            conn.execute(
                "UPDATE debts SET amount = ? WHERE id = ?",
                (amount, debt_id),
            )
            .await
            .map_err(|_| db_error())?;
        }
        if let Some(debtor_id) = payload.debtor_id {
            let mut debtor = conn
                .query("SELECT id FROM debtors WHERE id = ?", [debtor_id])
                .await
                .map_err(|_| db_error())?;
            if debtor.next().await.map_err(|_| db_error())?.is_none() {
                return Err(not_found("Deudor no encontrado"));
            }
            drop(debtor);
            conn.execute(
                "UPDATE debts SET debtor_id = ? WHERE id = ?",
                (debtor_id, debt_id),
            )
            .await
            .map_err(|_| db_error())?;
        }
        if let Some(description) = payload.description.as_deref() {
            conn.execute(
                "UPDATE debts SET description = ? WHERE id = ?",
                (description, debt_id),
            )
            .await
            .map_err(|_| db_error())?;
        }
        if let Some(is_paid) = payload.is_paid {
            conn.execute(
                "UPDATE debts SET is_paid = ? WHERE id = ?",
                (is_paid as i64, debt_id),
            )
            .await
            .map_err(|_| db_error())?;
        }
    }

    logs::record(
        &state.db,
        &meta,
        "actualizar",
        "debts",
        &user.usuario,
        Some(serde_json::json!({ "id": debt_id })),
    )
    .await;

    let debt = fetch_debt(&state.db, debt_id).await?;
    Ok((
        StatusCode::OK,
        Json(CreateDebtResponse {
            mensaje: "Deuda actualizada correctamente".to_string(),
            debt,
        }),
    ))
}

/// DELETE /debts/{id} — the caller must be an admin AND the debt's owner.
pub async fn delete_debt(
    State(state): State<AppState>,
    user: AuthUser,
    meta: RequestMeta,
    Path(debt_id): Path<i64>,
) -> Result<(StatusCode, Json<MessageResponse>), ApiError> {
    auth::require_admin(&state.db, &user.usuario).await?;

    let owner_id = debt_owner_id(&state.db, debt_id).await?;
    let caller_id = auth::get_user_id(&state.db, &user.usuario).await?;
    if owner_id != caller_id {
        return Err(not_found("Deuda no encontrada"));
    }

    {
        let conn = state.db.write().await;
        conn.execute("DELETE FROM debts WHERE id = ?", [debt_id])
            .await
            .map_err(|_| db_error())?;
    }

    logs::record(
        &state.db,
        &meta,
        "eliminar",
        "debts",
        &user.usuario,
        Some(serde_json::json!({ "id": debt_id })),
    )
    .await;

    Ok((
        StatusCode::OK,
        Json(MessageResponse {
            mensaje: "Deuda eliminada correctamente".to_string(),
        }),
    ))
}
