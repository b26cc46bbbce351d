use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use libsql::params_from_iter;

use crate::AppState;
use crate::auth::{self, AuthUser};
use crate::constants::*;
use crate::logs::{self, RequestMeta};
use crate::models::{
    CreateRolePayload, MessageResponse, PermissionRow, RoleMutationResponse, RoleRow,
    RolesResponse, UpdateRolePayload,
};
use crate::utils::{ApiError, bad_request, conflict, db_error, forbidden, not_found};

/// GET /roles — admin only. Each role carries a comma-joined permission
/// list; the available catalog rides alongside for the role editor.
pub async fn list_roles(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<(StatusCode, Json<RolesResponse>), ApiError> {
    auth::require_admin(&state.db, &user.usuario).await?;

    let conn = state.db.read().await;
    let mut rows = conn
        .query(
            r#"
            SELECT r.id, r.nombre, r.descripcion, GROUP_CONCAT(p.nombre)
            FROM roles r
            LEFT JOIN roles_permisos rp ON rp.rol_id = r.id
            LEFT JOIN permisos p ON p.id = rp.permiso_id
            GROUP BY r.id
            ORDER BY r.nombre
            "#,
            (),
        )
        .await
        .map_err(|_| db_error())?;

    let mut roles = Vec::new();
    while let Some(row) = rows.next().await.map_err(|_| db_error())? {
        roles.push(RoleRow {
            id: row.get(0).map_err(|_| db_error())?,
            nombre: row.get(1).map_err(|_| db_error())?,
            descripcion: row.get(2).map_err(|_| db_error())?,
            permisos: row.get(3).map_err(|_| db_error())?,
        });
    }

    let mut permisos_disponibles = Vec::new();
    let mut perm_rows = conn
        .query("SELECT id, nombre, descripcion FROM permisos ORDER BY nombre", ())
        .await
        .map_err(|_| db_error())?;
    while let Some(row) = perm_rows.next().await.map_err(|_| db_error())? {
        permisos_disponibles.push(PermissionRow {
            id: row.get(0).map_err(|_| db_error())?,
            nombre: row.get(1).map_err(|_| db_error())?,
            descripcion: row.get(2).map_err(|_| db_error())?,
        });
    }

    Ok((
        StatusCode::OK,
        Json(RolesResponse {
            roles,
            permisos_disponibles,
        }),
    ))
}

async fn fetch_role_row(conn: &libsql::Connection, rol_id: i64) -> Result<RoleRow, ApiError> {
    let mut rows = conn
        .query(
            r#"
            SELECT r.id, r.nombre, r.descripcion, GROUP_CONCAT(p.nombre)
            FROM roles r
            LEFT JOIN roles_permisos rp ON rp.rol_id = r.id
            LEFT JOIN permisos p ON p.id = rp.permiso_id
            WHERE r.id = ?
            GROUP BY r.id
            "#,
            [rol_id],
        )
        .await
        .map_err(|_| db_error())?;
    match rows.next().await.map_err(|_| db_error())? {
        Some(row) => Ok(RoleRow {
            id: row.get(0).map_err(|_| db_error())?,
            nombre: row.get(1).map_err(|_| db_error())?,
            descripcion: row.get(2).map_err(|_| db_error())?,
            permisos: row.get(3).map_err(|_| db_error())?,
        }),
        None => Err(not_found("Rol no encontrado")),
    }
}

async fn validate_permission_ids(
    conn: &libsql::Connection,
    ids: &[i64],
) -> Result<(), ApiError> {
    if ids.is_empty() {
        return Ok(());
    }
    let placeholders = vec!["?"; ids.len()].join(", ");
    let values: Vec<libsql::Value> = ids.iter().map(|id| libsql::Value::Integer(*id)).collect();
    let mut rows = conn
        .query(
            &format!("SELECT COUNT(*) FROM permisos WHERE id IN ({})", placeholders),
            params_from_iter(values),
        )
        .await
        .map_err(|_| db_error())?;
    let count: i64 = match rows.next().await.map_err(|_| db_error())? {
        Some(row) => row.get(0).map_err(|_| db_error())?,
        None => 0,
    };
    if count as usize != ids.len() {
        return Err(bad_request("Uno o más permisos no existen"));
    }
    Ok(())
}

/// POST /roles — admin only. The role row and its grants commit together.
pub async fn create_role(
    State(state): State<AppState>,
    user: AuthUser,
    meta: RequestMeta,
    Json(payload): Json<CreateRolePayload>,
) -> Result<(StatusCode, Json<RoleMutationResponse>), ApiError> {
    auth::require_admin(&state.db, &user.usuario).await?;

    let Some(nombre) = payload.nombre.filter(|n| !n.trim().is_empty()) else {
        return Err(bad_request("Se requiere el nombre del rol"));
    };
    let permisos = payload.permisos.unwrap_or_default();

    let rol = {
        let conn = state.db.write().await;

        let mut existing = conn
            .query("SELECT id FROM roles WHERE nombre = ?", [nombre.as_str()])
            .await
            .map_err(|_| db_error())?;
        if existing.next().await.map_err(|_| db_error())?.is_some() {
            return Err(conflict("El rol ya existe"));
        }
        drop(existing);

        validate_permission_ids(&conn, &permisos).await?;

        let tx = conn.transaction().await.map_err(|_| db_error())?;
        tx.execute(
            "INSERT INTO roles (nombre, descripcion) VALUES (?, ?)",
            (nombre.as_str(), payload.descripcion.as_deref()),
        )
        .await
        .map_err(|_| db_error())?;
        let rol_id = tx.last_insert_rowid();
        for permiso_id in &permisos {
            tx.execute(
                "INSERT INTO roles_permisos (rol_id, permiso_id) VALUES (?, ?)",
                (rol_id, *permiso_id),
            )
            .await
            .map_err(|_| db_error())?;
        }
        tx.commit().await.map_err(|_| db_error())?;

        fetch_role_row(&conn, rol_id).await?
    };

    logs::record(
        &state.db,
        &meta,
        "crear",
        "roles",
        &user.usuario,
        Some(serde_json::json!({ "rol": &nombre, "permisos": permisos })),
    )
    .await;

    Ok((
        StatusCode::CREATED,
        Json(RoleMutationResponse {
            mensaje: format!("Rol '{}' creado correctamente", nombre),
            rol,
        }),
    ))
}

/// PUT /roles/{id} — admin only. Replaces the grant set atomically.
pub async fn update_role(
    State(state): State<AppState>,
    user: AuthUser,
    meta: RequestMeta,
    Path(rol_id): Path<i64>,
    Json(payload): Json<UpdateRolePayload>,
) -> Result<(StatusCode, Json<RoleMutationResponse>), ApiError> {
    auth::require_admin(&state.db, &user.usuario).await?;

    let Some(permisos) = payload.permisos else {
        return Err(bad_request("Se requiere la lista de permisos"));
    };

    let rol = {
        let conn = state.db.write().await;

        let mut rows = conn
            .query("SELECT nombre FROM roles WHERE id = ?", [rol_id])
            .await
            .map_err(|_| db_error())?;
        if rows.next().await.map_err(|_| db_error())?.is_none() {
            return Err(not_found("Rol no encontrado"));
        }
        drop(rows);

        validate_permission_ids(&conn, &permisos).await?;

        let tx = conn.transaction().await.map_err(|_| db_error())?;
        tx.execute("DELETE FROM roles_permisos WHERE rol_id = ?", [rol_id])
            .await
            .map_err(|_| db_error())?;
        for permiso_id in &permisos {
            tx.execute(
                "INSERT INTO roles_permisos (rol_id, permiso_id) VALUES (?, ?)",
                (rol_id, *permiso_id),
            )
            .await
            .map_err(|_| db_error())?;
        }
        tx.commit().await.map_err(|_| db_error())?;

        fetch_role_row(&conn, rol_id).await?
    };

    logs::record(
        &state.db,
        &meta,
        "actualizar",
        "roles",
        &user.usuario,
        Some(serde_json::json!({ "rol": &rol.nombre, "permisos": permisos })),
    )
    .await;

    let mensaje = format!("Permisos del rol '{}' actualizados", rol.nombre);
    Ok((StatusCode::OK, Json(RoleMutationResponse { mensaje, rol })))
}

/// DELETE /roles/{id} — admin only. The `admin` role and any role still
/// assigned to users are protected.
pub async fn delete_role(
    State(state): State<AppState>,
    user: AuthUser,
    meta: RequestMeta,
    Path(rol_id): Path<i64>,
) -> Result<(StatusCode, Json<MessageResponse>), ApiError> {
    auth::require_admin(&state.db, &user.usuario).await?;

    let nombre = {
        let conn = state.db.write().await;

        let mut rows = conn
            .query("SELECT nombre FROM roles WHERE id = ?", [rol_id])
            .await
            .map_err(|_| db_error())?;
        let nombre: String = match rows.next().await.map_err(|_| db_error())? {
            Some(row) => row.get(0).map_err(|_| db_error())?,
            None => return Err(not_found("Rol no encontrado")),
        };
        drop(rows);

        if nombre == ROLE_ADMIN {
            return Err(forbidden("El rol admin no se puede eliminar"));
        }

        let mut in_use = conn
            .query("SELECT COUNT(*) FROM usuarios WHERE rol_id = ?", [rol_id])
            .await
            .map_err(|_| db_error())?;
        let count: i64 = match in_use.next().await.map_err(|_| db_error())? {
            Some(row) => row.get(0).map_err(|_| db_error())?,
            None => 0,
        };
        if count > 0 {
            return Err(bad_request("El rol está asignado a uno o más usuarios"));
        }
        drop(in_use);

        conn.execute("DELETE FROM roles WHERE id = ?", [rol_id])
            .await
            .map_err(|_| db_error())?;
        nombre
    };

    logs::record(
        &state.db,
        &meta,
        "eliminar",
        "roles",
        &user.usuario,
        Some(serde_json::json!({ "rol": &nombre })),
    )
    .await;

    Ok((
        StatusCode::OK,
        Json(MessageResponse {
            mensaje: format!("Rol '{}' eliminado", nombre),
        }),
    ))
}
