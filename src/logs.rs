use axum::{
    Json,
    extract::{Query, State},
    http::{StatusCode, request::Parts},
};
use libsql::params_from_iter;

use crate::AppState;
use crate::auth::AuthUser;
use crate::constants::*;
use crate::database::Db;
use crate::models::{LogEntry, LogFilterValues, LogQueryParams, LogsResponse};
use crate::utils::{ApiError, db_error};

/// Client metadata attached to every audit entry. Extraction never fails;
/// missing headers just leave the fields empty.
#[derive(Debug, Clone, Default)]
pub struct RequestMeta {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

impl<S> axum::extract::FromRequestParts<S> for RequestMeta
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let ip = parts
            .headers
            .get("x-forwarded-for")
            .or_else(|| parts.headers.get("x-real-ip"))
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(',').next().unwrap_or(v).trim().to_string())
            .filter(|v| !v.is_empty());
        let user_agent = parts
            .headers
            .get(axum::http::header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        Ok(RequestMeta { ip, user_agent })
    }
}

/// Appends an audit entry. Failures never bubble up to the caller: the
/// business operation has already happened, so a broken audit insert is
/// logged and swallowed.
pub async fn record(
    db: &Db,
    meta: &RequestMeta,
    accion: &str,
    tabla: &str,
    usuario: &str,
    detalles: Option<serde_json::Value>,
) {
    let detalles_text = detalles.map(|v| v.to_string());
    let conn = db.write().await;
    let result = conn
        .execute(
            r#"
            INSERT INTO logs (accion, tabla, usuario, ip, dispositivo, detalles)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
            (
                accion,
                tabla,
                usuario,
                meta.ip.as_deref(),
                meta.user_agent.as_deref(),
                detalles_text.as_deref(),
            ),
        )
        .await;
    if let Err(e) = result {
        tracing::error!(accion, tabla, usuario, error = %e, "failed to write audit entry");
    }
}

fn sanitize_sort(params: &LogQueryParams) -> (String, String) {
    let field = params
        .sort_by
        .as_deref()
        .filter(|f| LOG_SORT_FIELDS.contains(f))
        .unwrap_or(DEFAULT_LOG_SORT_FIELD)
        .to_string();
    let order = match params.sort_order.as_deref() {
        Some(o) if o.eq_ignore_ascii_case("asc") => "ASC".to_string(),
        Some(o) if o.eq_ignore_ascii_case("desc") => "DESC".to_string(),
        _ => DEFAULT_LOG_SORT_ORDER.to_string(),
    };
    (field, order)
}

fn build_filter_clause(params: &LogQueryParams) -> (String, Vec<libsql::Value>) {
    let mut clauses: Vec<String> = Vec::new();
    let mut values: Vec<libsql::Value> = Vec::new();

    for (column, value) in [
        ("accion", &params.accion),
        ("tabla", &params.tabla),
        ("usuario", &params.usuario),
        ("ip", &params.ip),
    ] {
        if let Some(v) = value.as_deref().filter(|v| !v.is_empty()) {
            clauses.push(format!("{} LIKE ?", column));
            values.push(libsql::Value::Text(format!("%{}%", v)));
        }
    }
    if let Some(inicio) = params.fecha_inicio.as_deref().filter(|v| !v.is_empty()) {
        clauses.push("created_at >= ?".to_string());
        values.push(libsql::Value::Text(inicio.to_string()));
    }
    if let Some(fin) = params.fecha_fin.as_deref().filter(|v| !v.is_empty()) {
        clauses.push("created_at <= ?".to_string());
        values.push(libsql::Value::Text(fin.to_string()));
    }

    let clause = if clauses.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", clauses.join(" AND "))
    };
    (clause, values)
}

async fn distinct_values(conn: &libsql::Connection, column: &str) -> Result<Vec<String>, ApiError> {
    let mut rows = conn
        .query(
            &format!(
                "SELECT DISTINCT {col} FROM logs WHERE {col} IS NOT NULL ORDER BY {col}",
                col = column
            ),
            (),
        )
        .await
        .map_err(|_| db_error())?;
    let mut out = Vec::new();
    while let Some(row) = rows.next().await.map_err(|_| db_error())? {
        out.push(row.get(0).map_err(|_| db_error())?);
    }
    Ok(out)
}

fn extract_log_entry(row: &libsql::Row) -> Result<LogEntry, ApiError> {
    let detalles_text: Option<String> = row.get(6).map_err(|_| db_error())?;
    let detalles = detalles_text.map(|text| {
        serde_json::from_str(&text).unwrap_or(serde_json::Value::String(text))
    });
    Ok(LogEntry {
        id: row.get(0).map_err(|_| db_error())?,
        accion: row.get(1).map_err(|_| db_error())?,
        tabla: row.get(2).map_err(|_| db_error())?,
        usuario: row.get(3).map_err(|_| db_error())?,
        ip: row.get(4).map_err(|_| db_error())?,
        dispositivo: row.get(5).map_err(|_| db_error())?,
        detalles,
        created_at: row.get(7).map_err(|_| db_error())?,
    })
}

/// Filtered, sorted, paginated view over the audit trail, plus the distinct
/// value lists the frontend uses to populate its filter dropdowns.
pub async fn query_logs(db: &Db, params: &LogQueryParams) -> Result<LogsResponse, ApiError> {
    let page = params.page.unwrap_or(DEFAULT_LOG_PAGE).max(1);
    let per_page = params.per_page.unwrap_or(DEFAULT_LOGS_PER_PAGE).max(1);
    let (sort_field, sort_order) = sanitize_sort(params);
    let (filter_clause, filter_values) = build_filter_clause(params);

    let conn = db.read().await;

    let mut count_rows = conn
        .query(
            &format!("SELECT COUNT(*) FROM logs{}", filter_clause),
            params_from_iter(filter_values.clone()),
        )
        .await
        .map_err(|_| db_error())?;
    let total: u64 = match count_rows.next().await.map_err(|_| db_error())? {
        Some(row) => row.get::<i64>(0).map_err(|_| db_error())? as u64,
        None => 0,
    };

    let offset = (page as u64 - 1) * per_page as u64;
    let mut page_values = filter_values;
    page_values.push(libsql::Value::Integer(per_page as i64));
    page_values.push(libsql::Value::Integer(offset as i64));

    let mut rows = conn
        .query(
            &format!(
                "SELECT id, accion, tabla, usuario, ip, dispositivo, detalles, created_at \
                 FROM logs{} ORDER BY {} {} LIMIT ? OFFSET ?",
                filter_clause, sort_field, sort_order
            ),
            params_from_iter(page_values),
        )
        .await
        .map_err(|_| db_error())?;

    let mut logs = Vec::new();
    while let Some(row) = rows.next().await.map_err(|_| db_error())? {
        logs.push(extract_log_entry(&row)?);
    }

    let filters = LogFilterValues {
        acciones: distinct_values(&conn, "accion").await?,
        tablas: distinct_values(&conn, "tabla").await?,
        usuarios: distinct_values(&conn, "usuario").await?,
    };

    let total_pages = total.div_ceil(per_page as u64);

    Ok(LogsResponse {
        logs,
        total,
        page,
        per_page,
        total_pages,
        filters,
    })
}

/// GET /logs — any authenticated user.
pub async fn get_logs(
    State(state): State<AppState>,
    _user: AuthUser,
    Query(params): Query<LogQueryParams>,
) -> Result<(StatusCode, Json<LogsResponse>), ApiError> {
    let response = query_logs(&state.db, &params).await?;
    Ok((StatusCode::OK, Json(response)))
}
