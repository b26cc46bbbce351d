use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use rand::Rng;
use rand::seq::SliceRandom;

use crate::AppState;
use crate::auth::{self, AuthUser};
use crate::constants::*;
use crate::database::{Db, hash_password};
use crate::logs::{self, RequestMeta};
use crate::mailer;
use crate::models::{
    CreateUserPayload, CreateUserResponse, EmailWarning, ResetPasswordResponse,
    ToggleStatusResponse, UpdateUserPayload, UpdateUserResponse, UserRow, UsersResponse,
};
use crate::utils::{
    ApiError, bad_request, conflict, db_error, forbidden, internal_error, is_valid_email,
    not_found, validate_string_length,
};

/// Random initial password: 12 characters with at least one lowercase
/// letter, one uppercase letter, one digit and one symbol.
pub fn generate_password() -> String {
    const LOWER: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
    const UPPER: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
    const DIGITS: &[u8] = b"0123456789";

    let symbols = PASSWORD_SYMBOLS.as_bytes();
    let mut rng = rand::thread_rng();
    let mut chars: Vec<u8> = vec![
        LOWER[rng.gen_range(0..LOWER.len())],
        UPPER[rng.gen_range(0..UPPER.len())],
        DIGITS[rng.gen_range(0..DIGITS.len())],
        symbols[rng.gen_range(0..symbols.len())],
    ];
    let pool: Vec<u8> = [LOWER, UPPER, DIGITS, symbols].concat();
    while chars.len() < GENERATED_PASSWORD_LENGTH {
        chars.push(pool[rng.gen_range(0..pool.len())]);
    }
    chars.shuffle(&mut rng);
    String::from_utf8_lossy(&chars).into_owned()
}

async fn fetch_user_row(conn: &libsql::Connection, usuario: &str) -> Result<Option<UserRow>, ApiError> {
    let mut rows = conn
        .query(
            r#"
            SELECT u.id, u.usuario, u.nombre, u.email, u.activo, r.nombre, r.descripcion
            FROM usuarios u
            LEFT JOIN roles r ON r.id = u.rol_id
            WHERE u.usuario = ?
            "#,
            [usuario],
        )
        .await
        .map_err(|_| db_error())?;
    match rows.next().await.map_err(|_| db_error())? {
        Some(row) => Ok(Some(extract_user_row(&row)?)),
        None => Ok(None),
    }
}

fn extract_user_row(row: &libsql::Row) -> Result<UserRow, ApiError> {
    let activo: i64 = row.get(4).map_err(|_| db_error())?;
    Ok(UserRow {
        id: row.get(0).map_err(|_| db_error())?,
        usuario: row.get(1).map_err(|_| db_error())?,
        nombre: row.get(2).map_err(|_| db_error())?,
        email: row.get(3).map_err(|_| db_error())?,
        activo: activo != 0,
        rol: row.get(5).map_err(|_| db_error())?,
        rol_descripcion: row.get(6).map_err(|_| db_error())?,
    })
}

async fn role_id_by_name(conn: &libsql::Connection, nombre: &str) -> Result<i64, ApiError> {
    let mut rows = conn
        .query("SELECT id FROM roles WHERE nombre = ?", [nombre])
        .await
        .map_err(|_| db_error())?;
    match rows.next().await.map_err(|_| db_error())? {
        Some(row) => row.get(0).map_err(|_| db_error()),
        None => Err(bad_request(format!("El rol '{}' no existe", nombre))),
    }
}

/// Admin gate that leaves an `acceso_denegado` trail when it fails.
async fn require_admin_logged(
    db: &Db,
    meta: &RequestMeta,
    usuario: &str,
    tabla: &str,
) -> Result<(), ApiError> {
    if let Err(e) = auth::require_admin(db, usuario).await {
        logs::record(db, meta, "acceso_denegado", tabla, usuario, None).await;
        return Err(e);
    }
    Ok(())
}

/// Permission gate that leaves an `acceso_denegado` trail when it fails.
async fn require_permission_logged(
    db: &Db,
    meta: &RequestMeta,
    usuario: &str,
    permiso: &str,
    tabla: &str,
) -> Result<(), ApiError> {
    if let Err(e) = auth::require_permission(db, usuario, permiso).await {
        logs::record(db, meta, "acceso_denegado", tabla, usuario, None).await;
        return Err(e);
    }
    Ok(())
}

/// GET /users — any authenticated user.
pub async fn list_users(
    State(state): State<AppState>,
    _user: AuthUser,
) -> Result<(StatusCode, Json<UsersResponse>), ApiError> {
    let conn = state.db.read().await;
    let mut rows = conn
        .query(
            r#"
            SELECT u.id, u.usuario, u.nombre, u.email, u.activo, r.nombre, r.descripcion
            FROM usuarios u
            LEFT JOIN roles r ON r.id = u.rol_id
            ORDER BY u.usuario
            "#,
            (),
        )
        .await
        .map_err(|_| db_error())?;

    let mut usuarios = Vec::new();
    while let Some(row) = rows.next().await.map_err(|_| db_error())? {
        usuarios.push(extract_user_row(&row)?);
    }

    Ok((StatusCode::OK, Json(UsersResponse { usuarios })))
}

/// Failure trail for user creation attempts that never reach the insert.
async fn record_create_failure(db: &Db, meta: &RequestMeta, actor: &str, motivo: &str) {
    logs::record(
        db,
        meta,
        "crear_usuario_fallido",
        "usuarios",
        actor,
        Some(serde_json::json!({ "motivo": motivo })),
    )
    .await;
}

/// POST /users — requires `gestionar_usuarios`. The initial password is
/// generated when the payload omits one, and mailed to the new account; a
/// failed send degrades to a warning in the response carrying the password.
pub async fn create_user(
    State(state): State<AppState>,
    user: AuthUser,
    meta: RequestMeta,
    Json(payload): Json<CreateUserPayload>,
) -> Result<(StatusCode, Json<CreateUserResponse>), ApiError> {
    require_permission_logged(&state.db, &meta, &user.usuario, PERM_MANAGE_USERS, "usuarios")
        .await?;

    let Some(usuario) = payload.usuario.filter(|u| !u.trim().is_empty()) else {
        record_create_failure(&state.db, &meta, &user.usuario, "usuario faltante").await;
        return Err(bad_request("Se requiere el nombre de usuario"));
    };
    validate_string_length(&usuario, "usuario", 100)?;

    let Some(nombre) = payload.nombre.filter(|n| !n.trim().is_empty()) else {
        record_create_failure(&state.db, &meta, &user.usuario, "nombre faltante").await;
        return Err(bad_request("Se requiere el nombre completo"));
    };
    let Some(email) = payload.email.filter(|e| !e.trim().is_empty()) else {
        record_create_failure(&state.db, &meta, &user.usuario, "email faltante").await;
        return Err(bad_request("Se requiere el email"));
    };
    if !is_valid_email(&email) {
        record_create_failure(&state.db, &meta, &user.usuario, "email inválido").await;
        return Err(bad_request("El email no tiene un formato válido"));
    }
    let Some(rol) = payload.rol.filter(|r| !r.trim().is_empty()) else {
        record_create_failure(&state.db, &meta, &user.usuario, "rol faltante").await;
        return Err(bad_request("Se requiere el rol"));
    };

    let password = payload
        .password
        .filter(|p| !p.is_empty())
        .unwrap_or_else(generate_password);
    let hash = hash_password(&password)
        .map_err(|e| internal_error(format!("Failed to hash password: {}", e)))?;

    {
        let conn = state.db.write().await;

        let mut existing = conn
            .query(
                "SELECT id FROM usuarios WHERE LOWER(usuario) = LOWER(?)",
                [usuario.as_str()],
            )
            .await
            .map_err(|_| db_error())?;
        if existing.next().await.map_err(|_| db_error())?.is_some() {
            drop(existing);
            drop(conn);
            record_create_failure(&state.db, &meta, &user.usuario, "usuario duplicado").await;
            return Err(conflict("El usuario ya existe"));
        }
        drop(existing);

        let mut existing_email = conn
            .query(
                "SELECT id FROM usuarios WHERE LOWER(email) = LOWER(?)",
                [email.as_str()],
            )
            .await
            .map_err(|_| db_error())?;
        if existing_email.next().await.map_err(|_| db_error())?.is_some() {
            drop(existing_email);
            drop(conn);
            record_create_failure(&state.db, &meta, &user.usuario, "email duplicado").await;
            return Err(conflict("El email ya está registrado"));
        }
        drop(existing_email);

        let rol_id = role_id_by_name(&conn, &rol).await?;
        conn.execute(
            r#"
            INSERT INTO usuarios (usuario, password, nombre, email, rol_id, activo)
            VALUES (?, ?, ?, ?, ?, 1)
            "#,
            (
                usuario.as_str(),
                hash.as_str(),
                nombre.as_str(),
                email.as_str(),
                rol_id,
            ),
        )
        .await
        .map_err(|_| db_error())?;
    }

    logs::record(
        &state.db,
        &meta,
        "crear_usuario",
        "usuarios",
        &user.usuario,
        Some(serde_json::json!({ "usuario": &usuario, "rol": &rol })),
    )
    .await;

    let mut warning = None;
    if let Err(e) = mailer::send_welcome_email(&state.config, &email, &usuario, &password).await {
        tracing::warn!(usuario = %usuario, error = %e, "welcome email failed");
        warning = Some(EmailWarning {
            mensaje: "No se pudo enviar el email de bienvenida".to_string(),
            detalles: format!("Contraseña temporal: {}", password),
        });
    }

    Ok((
        StatusCode::CREATED,
        Json(CreateUserResponse {
            mensaje: "Usuario creado correctamente".to_string(),
            usuario,
            warning,
        }),
    ))
}

/// POST /users/{id}/toggle-status — admin only. The seeded primary admin
/// can never be deactivated.
pub async fn toggle_user_status(
    State(state): State<AppState>,
    user: AuthUser,
    meta: RequestMeta,
    Path(user_id): Path<i64>,
) -> Result<(StatusCode, Json<ToggleStatusResponse>), ApiError> {
    require_admin_logged(&state.db, &meta, &user.usuario, "usuarios").await?;

    let (target, activo) = {
        let conn = state.db.write().await;
        let mut rows = conn
            .query("SELECT usuario, activo FROM usuarios WHERE id = ?", [user_id])
            .await
            .map_err(|_| db_error())?;
        let (target, current): (String, i64) = match rows.next().await.map_err(|_| db_error())? {
            Some(row) => (
                row.get(0).map_err(|_| db_error())?,
                row.get(1).map_err(|_| db_error())?,
            ),
            None => return Err(not_found("Usuario no encontrado")),
        };
        drop(rows);

        if target == state.config.admin_user {
            return Err(forbidden(
                "La cuenta del administrador principal no puede ser desactivada",
            ));
        }

        let next = if current != 0 { 0i64 } else { 1i64 };
        conn.execute(
            "UPDATE usuarios SET activo = ? WHERE id = ?",
            (next, user_id),
        )
        .await
        .map_err(|_| db_error())?;
        (target, next != 0)
    };

    let accion = if activo { "desbloquear" } else { "bloquear" };
    logs::record(
        &state.db,
        &meta,
        accion,
        "usuarios",
        &user.usuario,
        Some(serde_json::json!({ "usuario": &target })),
    )
    .await;

    let mensaje = if activo {
        format!("Usuario '{}' activado", target)
    } else {
        format!("Usuario '{}' desactivado", target)
    };
    Ok((
        StatusCode::OK,
        Json(ToggleStatusResponse {
            mensaje,
            usuario: target,
            activo,
        }),
    ))
}

/// PUT /users/{id} — admin only. Only the provided fields change.
pub async fn update_user(
    State(state): State<AppState>,
    user: AuthUser,
    meta: RequestMeta,
    Path(user_id): Path<i64>,
    Json(payload): Json<UpdateUserPayload>,
) -> Result<(StatusCode, Json<UpdateUserResponse>), ApiError> {
    require_admin_logged(&state.db, &meta, &user.usuario, "usuarios").await?;

    if payload.nombre.is_none() && payload.email.is_none() && payload.rol.is_none() {
        return Err(bad_request("No se proporcionaron campos para actualizar"));
    }
    if let Some(email) = payload.email.as_deref().filter(|e| !e.is_empty()) {
        if !is_valid_email(email) {
            return Err(bad_request("El email no tiene un formato válido"));
        }
    }

    let mut cambios: Vec<&str> = Vec::new();
    let (target, detalles) = {
        let conn = state.db.write().await;

        let mut rows = conn
            .query("SELECT usuario FROM usuarios WHERE id = ?", [user_id])
            .await
            .map_err(|_| db_error())?;
        let target: String = match rows.next().await.map_err(|_| db_error())? {
            Some(row) => row.get(0).map_err(|_| db_error())?,
            None => return Err(not_found("Usuario no encontrado")),
        };
        drop(rows);

        if payload.rol.is_some() && target == state.config.admin_user {
            return Err(forbidden(
                "No se puede cambiar el rol del administrador principal",
            ));
        }

        if let Some(nombre) = payload.nombre.as_deref() {
            conn.execute(
                "UPDATE usuarios SET nombre = ? WHERE id = ?",
                (nombre, user_id),
            )
            .await
            .map_err(|_| db_error())?;
            cambios.push("nombre");
        }
        if let Some(email) = payload.email.as_deref() {
            let mut taken = conn
                .query(
                    "SELECT id FROM usuarios WHERE LOWER(email) = LOWER(?) AND id != ?",
                    (email, user_id),
                )
                .await
                .map_err(|_| db_error())?;
            if taken.next().await.map_err(|_| db_error())?.is_some() {
                return Err(conflict("El email ya está registrado"));
            }
            drop(taken);

            conn.execute(
                "UPDATE usuarios SET email = ? WHERE id = ?",
                (email, user_id),
            )
            .await
            .map_err(|_| db_error())?;
            cambios.push("email");
        }
        if let Some(rol) = payload.rol.as_deref() {
            let rol_id = role_id_by_name(&conn, rol).await?;
            conn.execute(
                "UPDATE usuarios SET rol_id = ? WHERE id = ?",
                (rol_id, user_id),
            )
            .await
            .map_err(|_| db_error())?;
            cambios.push("rol");
        }

        let detalles = fetch_user_row(&conn, &target)
            .await?
            .ok_or_else(|| not_found("Usuario no encontrado"))?;
        (target, detalles)
    };

    logs::record(
        &state.db,
        &meta,
        "actualizar_usuario",
        "usuarios",
        &user.usuario,
        Some(serde_json::json!({ "usuario": &target, "campos": cambios })),
    )
    .await;

    Ok((
        StatusCode::OK,
        Json(UpdateUserResponse {
            mensaje: "Usuario actualizado correctamente".to_string(),
            detalles,
        }),
    ))
}

/// POST /users/{id}/reset-password — admin only. A fresh password is
/// generated and mailed; when the mail cannot go out the password rides in
/// the response warning so the admin can hand it over.
pub async fn reset_password(
    State(state): State<AppState>,
    user: AuthUser,
    meta: RequestMeta,
    Path(user_id): Path<i64>,
) -> Result<(StatusCode, Json<ResetPasswordResponse>), ApiError> {
    require_admin_logged(&state.db, &meta, &user.usuario, "usuarios").await?;

    let password = generate_password();
    let hash = hash_password(&password)
        .map_err(|e| internal_error(format!("Failed to hash password: {}", e)))?;

    let (target, email): (String, Option<String>) = {
        let conn = state.db.write().await;
        let mut rows = conn
            .query("SELECT usuario, email FROM usuarios WHERE id = ?", [user_id])
            .await
            .map_err(|_| db_error())?;
        let (target, email) = match rows.next().await.map_err(|_| db_error())? {
            Some(row) => (
                row.get::<String>(0).map_err(|_| db_error())?,
                row.get::<Option<String>>(1).map_err(|_| db_error())?,
            ),
            None => return Err(not_found("Usuario no encontrado")),
        };
        drop(rows);

        if target == state.config.admin_user {
            return Err(forbidden(
                "La contraseña del administrador principal no puede restablecerse por esta vía",
            ));
        }

        conn.execute(
            "UPDATE usuarios SET password = ? WHERE id = ?",
            (hash.as_str(), user_id),
        )
        .await
        .map_err(|_| db_error())?;
        (target, email)
    };

    logs::record(
        &state.db,
        &meta,
        "restablecer_password",
        "usuarios",
        &user.usuario,
        Some(serde_json::json!({ "usuario": &target })),
    )
    .await;

    let mut warning = None;
    match email.as_deref() {
        Some(addr) => {
            if let Err(e) =
                mailer::send_password_reset_email(&state.config, addr, &target, &password).await
            {
                tracing::warn!(usuario = %target, error = %e, "password reset email failed");
                warning = Some(EmailWarning {
                    mensaje: "No se pudo enviar el email con la nueva contraseña".to_string(),
                    detalles: format!("Nueva contraseña: {}", password),
                });
            }
        }
        None => {
            warning = Some(EmailWarning {
                mensaje: "El usuario no tiene email registrado".to_string(),
                detalles: format!("Nueva contraseña: {}", password),
            });
        }
    }

    Ok((
        StatusCode::OK,
        Json(ResetPasswordResponse {
            mensaje: "Contraseña restablecida correctamente".to_string(),
            usuario: target,
            email,
            warning,
        }),
    ))
}
