use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};

use crate::AppState;
use crate::auth::AuthUser;
use crate::database::Db;
use crate::logs::{self, RequestMeta};
use crate::models::{
    CreateDebtorPayload, Debtor, DebtorResponse, DebtorsResponse, UpdateDebtorPayload,
};
use crate::utils::{ApiError, bad_request, db_error, is_valid_email, not_found};

fn extract_debtor(row: &libsql::Row) -> Result<Debtor, ApiError> {
    Ok(Debtor {
        id: row.get(0).map_err(|_| db_error())?,
        nombre: row.get(1).map_err(|_| db_error())?,
        email: row.get(2).map_err(|_| db_error())?,
        telefono: row.get(3).map_err(|_| db_error())?,
        fecha_creacion: row.get(4).map_err(|_| db_error())?,
    })
}

async fn fetch_debtor(db: &Db, debtor_id: i64) -> Result<Debtor, ApiError> {
    let conn = db.read().await;
    let mut rows = conn
        .query(
            "SELECT id, nombre, email, telefono, fecha_creacion FROM debtors WHERE id = ?",
            [debtor_id],
        )
        .await
        .map_err(|_| db_error())?;
    match rows.next().await.map_err(|_| db_error())? {
        Some(row) => extract_debtor(&row),
        None => Err(not_found("Deudor no encontrado")),
    }
}

/// GET /debtors — any authenticated user.
pub async fn list_debtors(
    State(state): State<AppState>,
    _user: AuthUser,
) -> Result<(StatusCode, Json<DebtorsResponse>), ApiError> {
    let conn = state.db.read().await;
    let mut rows = conn
        .query(
            "SELECT id, nombre, email, telefono, fecha_creacion FROM debtors ORDER BY nombre",
            (),
        )
        .await
        .map_err(|_| db_error())?;

    let mut debtors = Vec::new();
    while let Some(row) = rows.next().await.map_err(|_| db_error())? {
        debtors.push(extract_debtor(&row)?);
    }

    Ok((StatusCode::OK, Json(DebtorsResponse { debtors })))
}

/// POST /debtors — any authenticated user.
pub async fn create_debtor(
    State(state): State<AppState>,
    user: AuthUser,
    meta: RequestMeta,
    Json(payload): Json<CreateDebtorPayload>,
) -> Result<(StatusCode, Json<DebtorResponse>), ApiError> {
    let Some(nombre) = payload.nombre.filter(|n| !n.trim().is_empty()) else {
        return Err(bad_request("Se requiere el nombre del deudor"));
    };
    if let Some(email) = payload.email.as_deref().filter(|e| !e.is_empty()) {
        if !is_valid_email(email) {
            return Err(bad_request("El email no tiene un formato válido"));
        }
    }

    let debtor_id = {
        let conn = state.db.write().await;
        conn.execute(
            "INSERT INTO debtors (nombre, email, telefono) VALUES (?, ?, ?)",
            (
                nombre.as_str(),
                payload.email.as_deref().filter(|e| !e.is_empty()),
                payload.telefono.as_deref(),
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
        "debtors",
        &user.usuario,
        Some(serde_json::json!({ "id": debtor_id, "nombre": nombre })),
    )
    .await;

    let debtor = fetch_debtor(&state.db, debtor_id).await?;
    Ok((
        StatusCode::CREATED,
        Json(DebtorResponse {
            mensaje: "Deudor registrado correctamente".to_string(),
            debtor,
        }),
    ))
}

/// PUT /debtors/{id} — any authenticated user.
pub async fn update_debtor(
    State(state): State<AppState>,
    user: AuthUser,
    meta: RequestMeta,
    Path(debtor_id): Path<i64>,
    Json(payload): Json<UpdateDebtorPayload>,
) -> Result<(StatusCode, Json<DebtorResponse>), ApiError> {
    if payload.nombre.is_none() && payload.email.is_none() && payload.telefono.is_none() {
        return Err(bad_request("No se proporcionaron campos para actualizar"));
    }
    if let Some(email) = payload.email.as_deref().filter(|e| !e.is_empty()) {
        if !is_valid_email(email) {
            return Err(bad_request("El email no tiene un formato válido"));
        }
    }

    {
        let conn = state.db.write().await;

        let mut exists = conn
            .query("SELECT id FROM debtors WHERE id = ?", [debtor_id])
            .await
            .map_err(|_| db_error())?;
        if exists.next().await.map_err(|_| db_error())?.is_none() {
            return Err(not_found("Deudor no encontrado"));
        }
        drop(exists);

        if let Some(nombre) = payload.nombre.as_deref() {
            if nombre.trim().is_empty() {
                return Err(bad_request("El nombre no puede estar vacío"));
            }
            conn.execute(
                "UPDATE debtors SET nombre = ? WHERE id = ?",
                (nombre, debtor_id),
            )
            .await
            .map_err(|_| db_error())?;
        }
        if let Some(email) = payload.email.as_deref() {
            conn.execute(
                "UPDATE debtors SET email = ? WHERE id = ?",
                (email, debtor_id),
            )
            .await
            .map_err(|_| db_error())?;
        }
        if let Some(telefono) = payload.telefono.as_deref() {
            conn.execute(
                "UPDATE debtors SET telefono = ? WHERE id = ?",
                (telefono, debtor_id),
            )
            .await
            .map_err(|_| db_error())?;
        }
    }

    logs::record(
        &state.db,
        &meta,
        "actualizar",
        "debtors",
        &user.usuario,
        Some(serde_json::json!({ "id": debtor_id })),
    )
    .await;

    let debtor = fetch_debtor(&state.db, debtor_id).await?;
    Ok((
        StatusCode::OK,
        Json(DebtorResponse {
            mensaje: "Deudor actualizado correctamente".to_string(),
            debtor,
        }),
    ))
}
