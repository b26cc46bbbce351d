use axum::{
    Json,
    extract::{Multipart, Path, Query, State},
    http::{HeaderName, StatusCode, header},
};
use libsql::params_from_iter;

use crate::AppState;
use crate::auth::{self, AuthUser};
use crate::constants::*;
use crate::database::Db;
use crate::logs::{self, RequestMeta};
use crate::models::{
    CreateExpenseResponse, DeleteExpenseResponse, ExpenseFilters, ExpenseRow, ExpensesResponse,
    Invoice,
};
use crate::utils::{ApiError, bad_request, db_error, not_found};

/// Checks an uploaded invoice against the extension and size rules, and
/// derives the stored mime type from the extension.
pub fn validate_invoice(name: &str, content: &[u8]) -> Result<Invoice, ApiError> {
    let extension = name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    if !ALLOWED_INVOICE_EXTENSIONS.contains(&extension.as_str()) {
        return Err(bad_request(
            "Tipo de archivo no permitido. Solo se aceptan PDF, JPG y JPEG",
        ));
    }
    if content.len() > MAX_INVOICE_SIZE {
        return Err(bad_request("La factura no puede superar los 2 MB"));
    }
    if content.is_empty() {
        return Err(bad_request("La factura está vacía"));
    }
    let file_type = if extension == "pdf" {
        "application/pdf"
    } else {
        "image/jpeg"
    };
    Ok(Invoice {
        content: content.to_vec(),
        name: name.to_string(),
        file_type: file_type.to_string(),
    })
}

fn extract_expense_row(row: &libsql::Row) -> Result<ExpenseRow, ApiError> {
    let invoice_name: Option<String> = row.get(6).map_err(|_| db_error())?;
    Ok(ExpenseRow {
        id: row.get(0).map_err(|_| db_error())?,
        amount: row.get(1).map_err(|_| db_error())?,
        category: row.get(2).map_err(|_| db_error())?,
        description: row.get(3).map_err(|_| db_error())?,
        date: row.get(4).map_err(|_| db_error())?,
        nombre_usuario: row.get(5).map_err(|_| db_error())?,
        has_invoice: invoice_name.is_some(),
        invoice_name,
        invoice_type: row.get(7).map_err(|_| db_error())?,
    })
}

/// GET /expenses — any authenticated user. Returns the filtered rows,
/// their sum, and the distinct category list for the filter dropdown.
pub async fn list_expenses(
    State(state): State<AppState>,
    _user: AuthUser,
    Query(filters): Query<ExpenseFilters>,
) -> Result<(StatusCode, Json<ExpensesResponse>), ApiError> {
    let mut clauses: Vec<String> = Vec::new();
    let mut values: Vec<libsql::Value> = Vec::new();
    if let Some(v) = filters.start_date.as_deref().filter(|v| !v.is_empty()) {
        clauses.push("e.date >= ?".to_string());
        values.push(libsql::Value::Text(v.to_string()));
    }
    if let Some(v) = filters.end_date.as_deref().filter(|v| !v.is_empty()) {
        clauses.push("e.date <= ?".to_string());
        values.push(libsql::Value::Text(v.to_string()));
    }
    if let Some(v) = filters.category.as_deref().filter(|v| !v.is_empty()) {
        clauses.push("e.category = ?".to_string());
        values.push(libsql::Value::Text(v.to_string()));
    }
    if let Some(v) = filters.usuario.as_deref().filter(|v| !v.is_empty()) {
        clauses.push("u.usuario = ?".to_string());
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
                "SELECT e.id, e.amount, e.category, e.description, e.date, u.nombre, \
                        e.invoice_name, e.invoice_type \
                 FROM expenses e LEFT JOIN usuarios u ON u.id = e.user_id{} \
                 ORDER BY e.date DESC",
                where_clause
            ),
            params_from_iter(values),
        )
        .await
        .map_err(|_| db_error())?;

    let mut expenses = Vec::new();
    while let Some(row) = rows.next().await.map_err(|_| db_error())? {
        expenses.push(extract_expense_row(&row)?);
    }
    let total = expenses.iter().map(|e| e.amount).sum();

    let mut categories = Vec::new();
    let mut cat_rows = conn
        .query(
            "SELECT DISTINCT category FROM expenses ORDER BY category",
            (),
        )
        .await
        .map_err(|_| db_error())?;
    while let Some(row) = cat_rows.next().await.map_err(|_| db_error())? {
        categories.push(row.get(0).map_err(|_| db_error())?);
    }

    Ok((
        StatusCode::OK,
        Json(ExpensesResponse {
            expenses,
            total,
            categories,
        }),
    ))
}

/// POST /expenses — any authenticated user. Multipart form with `amount`,
/// `category`, `description` and an optional `invoice` file.
pub async fn create_expense(
    State(state): State<AppState>,
    user: AuthUser,
    meta: RequestMeta,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<CreateExpenseResponse>), ApiError> {
    let mut amount: Option<f64> = None;
    let mut category: Option<String> = None;
    let mut description: Option<String> = None;
    let mut invoice: Option<Invoice> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| bad_request("Formulario multipart inválido"))?
    {
        let field_name = field.name().unwrap_or_default().to_string();
        match field_name.as_str() {
            "amount" => {
                let text = field
                    .text()
                    .await
                    .map_err(|_| bad_request("No se pudo leer el campo 'amount'"))?;
                amount = Some(
                    text.parse::<f64>()
                        .map_err(|_| bad_request("El monto debe ser un número"))?,
                );
            }
            "category" => {
                category = Some(
                    field
                        .text()
                        .await
                        .map_err(|_| bad_request("No se pudo leer el campo 'category'"))?,
                );
            }
            "description" => {
                description = Some(
                    field
                        .text()
                        .await
                        .map_err(|_| bad_request("No se pudo leer el campo 'description'"))?,
                );
            }
            "invoice" => {
                let name = field
                    .file_name()
                    .map(str::to_string)
                    .ok_or_else(|| bad_request("La factura no tiene nombre de archivo"))?;
                let content = field
                    .bytes()
                    .await
                    .map_err(|_| bad_request("No se pudo leer la factura"))?;
                invoice = Some(validate_invoice(&name, &content)?);
            }
            _ => {}
        }
    }

    let Some(amount) = amount else {
        return Err(bad_request("Se requiere el monto"));
    };
    if amount <= 0.0 {
        return Err(bad_request("El monto debe ser mayor que cero"));
    }
    let Some(category) = category.filter(|c| !c.trim().is_empty()) else {
        return Err(bad_request("Se requiere la categoría"));
    };
    let Some(description) = description.filter(|d| !d.trim().is_empty()) else {
        return Err(bad_request("Se requiere la descripción"));
    };

    let user_id = auth::get_user_id(&state.db, &user.usuario).await?;
    let expense_id = {
        let conn = state.db.write().await;
        let (invoice_blob, invoice_name, invoice_type) = match &invoice {
            Some(inv) => (
                Some(inv.content.clone()),
                Some(inv.name.as_str()),
                Some(inv.file_type.as_str()),
            ),
            None => (None, None, None),
        };
        conn.execute(
            r#"
            INSERT INTO expenses (amount, category, description, user_id, invoice, invoice_name, invoice_type)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
            (
                amount,
                category.as_str(),
                description.as_str(),
                user_id,
                invoice_blob,
                invoice_name,
                invoice_type,
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
        "expenses",
        &user.usuario,
        Some(serde_json::json!({ "id": expense_id, "amount": amount, "category": category })),
    )
    .await;

    let expense = {
        let conn = state.db.read().await;
        let mut rows = conn
            .query(
                "SELECT e.id, e.amount, e.category, e.description, e.date, u.nombre, \
                        e.invoice_name, e.invoice_type \
                 FROM expenses e LEFT JOIN usuarios u ON u.id = e.user_id WHERE e.id = ?",
                [expense_id],
            )
            .await
            .map_err(|_| db_error())?;
        match rows.next().await.map_err(|_| db_error())? {
            Some(row) => extract_expense_row(&row)?,
            None => return Err(db_error()),
        }
    };

    Ok((
        StatusCode::CREATED,
        Json(CreateExpenseResponse {
            mensaje: "Gasto registrado correctamente".to_string(),
            expense,
        }),
    ))
}

/// Fetches the stored invoice blob for an expense. Scoped to the owning
/// user, so someone else's expense id looks like a missing one.
pub async fn fetch_invoice(db: &Db, expense_id: i64, user_id: i64) -> Result<Invoice, ApiError> {
    let conn = db.read().await;
    let mut rows = conn
        .query(
            "SELECT invoice, invoice_name, invoice_type FROM expenses WHERE id = ? AND user_id = ?",
            (expense_id, user_id),
        )
        .await
        .map_err(|_| db_error())?;
    let Some(row) = rows.next().await.map_err(|_| db_error())? else {
        return Err(not_found("Gasto no encontrado"));
    };
    let content: Option<Vec<u8>> = row.get(0).map_err(|_| db_error())?;
    let name: Option<String> = row.get(1).map_err(|_| db_error())?;
    let file_type: Option<String> = row.get(2).map_err(|_| db_error())?;
    match (content, name, file_type) {
        (Some(content), Some(name), Some(file_type)) => Ok(Invoice {
            content,
            name,
            file_type,
        }),
        _ => Err(not_found("El gasto no tiene factura adjunta")),
    }
}

/// GET /expenses/{id}/invoice — downloads the attachment byte for byte.
pub async fn get_invoice(
    State(state): State<AppState>,
    user: AuthUser,
    Path(expense_id): Path<i64>,
) -> Result<(StatusCode, [(HeaderName, String); 2], Vec<u8>), ApiError> {
    let user_id = auth::get_user_id(&state.db, &user.usuario).await?;
    let invoice = fetch_invoice(&state.db, expense_id, user_id).await?;
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, invoice.file_type),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", invoice.name),
            ),
        ],
        invoice.content,
    ))
}

/// DELETE /expenses/{id} — admin only.
pub async fn delete_expense(
    State(state): State<AppState>,
    user: AuthUser,
    meta: RequestMeta,
    Path(expense_id): Path<i64>,
) -> Result<(StatusCode, Json<DeleteExpenseResponse>), ApiError> {
    auth::require_admin(&state.db, &user.usuario).await?;

    let affected = {
        let conn = state.db.write().await;
        conn.execute("DELETE FROM expenses WHERE id = ?", [expense_id])
            .await
            .map_err(|_| db_error())?
    };
    if affected == 0 {
        return Err(not_found("Gasto no encontrado"));
    }

    logs::record(
        &state.db,
        &meta,
        "eliminar",
        "expenses",
        &user.usuario,
        Some(serde_json::json!({ "id": expense_id })),
    )
    .await;

    Ok((
        StatusCode::OK,
        Json(DeleteExpenseResponse {
            mensaje: "Gasto eliminado correctamente".to_string(),
            expense_id,
        }),
    ))
}
