use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordVerifier},
};
use axum::{
    Json,
    extract::{FromRef, FromRequestParts, State},
    http::{StatusCode, header, request::Parts},
};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::constants::*;
use crate::database::{Db, hash_password};
use crate::logs::{self, RequestMeta};
use crate::mailer;
use crate::models::{
    ChangePasswordPayload, LoginPayload, LoginResponse, MessageResponse, PermissionEntry,
    PermissionsResponse,
};
use crate::utils::{ApiError, bad_request, db_error, forbidden, internal_error, unauthorized};

/// Bearer token claims: subject is the username.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Claims {
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}

/// Issues an HS256 token for the given username, valid for one hour.
pub fn issue_token(secret: &str, usuario: &str) -> Result<String, ApiError> {
    let now = time::OffsetDateTime::now_utc().unix_timestamp();
    let claims = Claims {
        sub: usuario.to_string(),
        iat: now,
        exp: now + TOKEN_EXPIRY_SECS,
    };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| internal_error(format!("Failed to issue token: {}", e)))
}

/// Validates signature and expiry, returning the decoded claims.
pub fn decode_token(secret: &str, token: &str) -> Result<Claims, ApiError> {
    let validation = Validation::new(Algorithm::HS256);
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|e| match e.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => unauthorized(ERR_TOKEN_EXPIRED),
        _ => unauthorized(ERR_MISSING_TOKEN),
    })
}

/// The authenticated caller of a protected route, extracted from the
/// `Authorization: Bearer` header. Extraction only verifies the token; role
/// and permission checks are separate.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub usuario: String,
}

impl<S> FromRequestParts<S> for AuthUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app = AppState::from_ref(state);

        let header = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| unauthorized(ERR_MISSING_TOKEN))?;
        let token = header
            .strip_prefix("Bearer ")
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| unauthorized(ERR_MISSING_TOKEN))?;

        let claims = decode_token(&app.config.jwt_secret, token)?;
        Ok(AuthUser {
            usuario: claims.sub,
        })
    }
}

pub fn verify_password(password: &str, hash: &str) -> Result<bool, ApiError> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|e| internal_error(format!("Failed to parse password hash: {}", e)))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

/// Outcome of a successful credential check.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub id: i64,
    pub usuario: String,
    pub nombre: Option<String>,
    pub email: Option<String>,
    pub rol: Option<String>,
    pub permisos: Vec<PermissionEntry>,
}

/// Checks credentials against the stored hash and the active flag, then
/// resolves the role's permission set. Inactive accounts get a distinct
/// message so the frontend can tell them apart from bad credentials.
pub async fn authenticate(db: &Db, usuario: &str, password: &str) -> Result<AuthenticatedUser, ApiError> {
    let conn = db.read().await;
    let mut rows = conn
        .query(
            r#"
            SELECT u.id, u.usuario, u.password, u.nombre, u.email, u.activo, u.rol_id, r.nombre
            FROM usuarios u
            LEFT JOIN roles r ON r.id = u.rol_id
            WHERE u.usuario = ?
            "#,
            [usuario],
        )
        .await
        .map_err(|_| db_error())?;

    let Some(row) = rows.next().await.map_err(|_| db_error())? else {
        return Err(unauthorized(ERR_INVALID_CREDENTIALS));
    };

    let id: i64 = row.get(0).map_err(|_| db_error())?;
    let usuario: String = row.get(1).map_err(|_| db_error())?;
    let stored_hash: String = row.get(2).map_err(|_| db_error())?;
    let nombre: Option<String> = row.get(3).map_err(|_| db_error())?;
    let email: Option<String> = row.get(4).map_err(|_| db_error())?;
    let activo: i64 = row.get(5).map_err(|_| db_error())?;
    let rol_id: Option<i64> = row.get(6).map_err(|_| db_error())?;
    let rol: Option<String> = row.get(7).map_err(|_| db_error())?;
    drop(rows);

    if !verify_password(password, &stored_hash)? {
        return Err(unauthorized(ERR_INVALID_CREDENTIALS));
    }
    if activo == 0 {
        return Err(unauthorized(ERR_ACCOUNT_BLOCKED));
    }

    let permisos = match rol_id {
        Some(rol_id) => fetch_role_permissions(&conn, rol_id).await?,
        None => Vec::new(),
    };

    Ok(AuthenticatedUser {
        id,
        usuario,
        nombre,
        email,
        rol,
        permisos,
    })
}

async fn fetch_role_permissions(
    conn: &libsql::Connection,
    rol_id: i64,
) -> Result<Vec<PermissionEntry>, ApiError> {
    let mut rows = conn
        .query(
            r#"
            SELECT p.nombre, p.descripcion
            FROM roles_permisos rp
            JOIN permisos p ON p.id = rp.permiso_id
            WHERE rp.rol_id = ?
            ORDER BY p.nombre
            "#,
            [rol_id],
        )
        .await
        .map_err(|_| db_error())?;

    let mut permisos = Vec::new();
    while let Some(row) = rows.next().await.map_err(|_| db_error())? {
        permisos.push(PermissionEntry {
            permiso: row.get(0).map_err(|_| db_error())?,
            descripcion: row.get(1).map_err(|_| db_error())?,
        });
    }
    Ok(permisos)
}

/// POST /login
pub async fn login(
    State(state): State<AppState>,
    meta: RequestMeta,
    Json(payload): Json<LoginPayload>,
) -> Result<(StatusCode, Json<LoginResponse>), ApiError> {
    let (Some(usuario), Some(password)) = (payload.usuario, payload.password) else {
        return Err(bad_request("Se requieren usuario y contraseña"));
    };

    let user = authenticate(&state.db, &usuario, &password).await?;
    let token = issue_token(&state.config.jwt_secret, &user.usuario)?;

    logs::record(
        &state.db,
        &meta,
        "login_exitoso",
        "usuarios",
        &user.usuario,
        None,
    )
    .await;

    Ok((
        StatusCode::OK,
        Json(LoginResponse {
            mensaje: "Login exitoso".to_string(),
            token,
            usuario: user.usuario,
            rol: user.rol,
            permisos: user.permisos,
        }),
    ))
}

/// Resolves a username to its user id. 404 when the account is gone.
pub async fn get_user_id(db: &Db, usuario: &str) -> Result<i64, ApiError> {
    let conn = db.read().await;
    let mut rows = conn
        .query("SELECT id FROM usuarios WHERE usuario = ?", [usuario])
        .await
        .map_err(|_| db_error())?;
    match rows.next().await.map_err(|_| db_error())? {
        Some(row) => row.get(0).map_err(|_| db_error()),
        None => Err(crate::utils::not_found("Usuario no encontrado")),
    }
}

/// Role name lookup for the admin gate.
pub async fn get_role_name(db: &Db, usuario: &str) -> Result<Option<String>, ApiError> {
    let conn = db.read().await;
    let mut rows = conn
        .query(
            r#"
            SELECT r.nombre
            FROM usuarios u
            JOIN roles r ON u.rol_id = r.id
            WHERE u.usuario = ?
            "#,
            [usuario],
        )
        .await
        .map_err(|_| db_error())?;
    match rows.next().await.map_err(|_| db_error())? {
        Some(row) => Ok(Some(row.get(0).map_err(|_| db_error())?)),
        None => Ok(None),
    }
}

/// Fails with 403 unless the caller's role is literally `admin`. Every
/// admin-gated handler goes through here instead of re-deriving the check.
pub async fn require_admin(db: &Db, usuario: &str) -> Result<(), ApiError> {
    match get_role_name(db, usuario).await? {
        Some(rol) if rol == ROLE_ADMIN => Ok(()),
        _ => Err(forbidden(ERR_NOT_ADMIN)),
    }
}

/// The three-table membership join: does the user's role carry the named
/// permission?
pub async fn user_has_permission(db: &Db, usuario: &str, permiso: &str) -> Result<bool, ApiError> {
    let conn = db.read().await;
    let mut rows = conn
        .query(
            r#"
            SELECT COUNT(*)
            FROM usuarios u
            JOIN roles_permisos rp ON u.rol_id = rp.rol_id
            JOIN permisos p ON rp.permiso_id = p.id
            WHERE u.usuario = ? AND p.nombre = ?
            "#,
            (usuario, permiso),
        )
        .await
        .map_err(|_| db_error())?;
    let count: i64 = match rows.next().await.map_err(|_| db_error())? {
        Some(row) => row.get(0).map_err(|_| db_error())?,
        None => 0,
    };
    Ok(count > 0)
}

pub async fn require_permission(db: &Db, usuario: &str, permiso: &str) -> Result<(), ApiError> {
    if user_has_permission(db, usuario, permiso).await? {
        Ok(())
    } else {
        Err(forbidden(format!("No tienes el permiso '{}'", permiso)))
    }
}

/// Password policy for self-service changes: at least 8 characters with one
/// uppercase letter, one lowercase letter, one digit and one symbol.
pub fn validate_password_policy(password: &str) -> Result<(), ApiError> {
    if password.len() < MIN_PASSWORD_LENGTH {
        return Err(bad_request(format!(
            "La contraseña debe tener al menos {} caracteres",
            MIN_PASSWORD_LENGTH
        )));
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        return Err(bad_request(
            "La contraseña debe contener al menos una letra mayúscula",
        ));
    }
    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        return Err(bad_request(
            "La contraseña debe contener al menos una letra minúscula",
        ));
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err(bad_request(
            "La contraseña debe contener al menos un número",
        ));
    }
    if !password
        .chars()
        .any(|c| "!@#$%^&*(),.?\":{}|<>".contains(c))
    {
        return Err(bad_request(
            "La contraseña debe contener al menos un carácter especial",
        ));
    }
    Ok(())
}

/// POST /users/change-password — self-service, any authenticated user.
pub async fn change_password(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<ChangePasswordPayload>,
) -> Result<(StatusCode, Json<MessageResponse>), ApiError> {
    let (Some(current_password), Some(new_password)) =
        (payload.current_password, payload.new_password)
    else {
        return Err(bad_request("Se requiere la contraseña actual y la nueva"));
    };

    validate_password_policy(&new_password)?;

    let (stored_hash, email): (String, Option<String>) = {
        let conn = state.db.read().await;
        let mut rows = conn
            .query(
                "SELECT password, email FROM usuarios WHERE usuario = ?",
                [user.usuario.as_str()],
            )
            .await
            .map_err(|_| db_error())?;
        match rows.next().await.map_err(|_| db_error())? {
            Some(row) => (
                row.get(0).map_err(|_| db_error())?,
                row.get(1).map_err(|_| db_error())?,
            ),
            None => return Err(unauthorized(ERR_INVALID_CREDENTIALS)),
        }
    };

    if !verify_password(&current_password, &stored_hash)? {
        return Err(unauthorized("La contraseña actual es incorrecta"));
    }

    let new_hash = hash_password(&new_password)
        .map_err(|e| internal_error(format!("Failed to hash password: {}", e)))?;
    {
        let conn = state.db.write().await;
        conn.execute(
            "UPDATE usuarios SET password = ? WHERE usuario = ?",
            (new_hash.as_str(), user.usuario.as_str()),
        )
        .await
        .map_err(|_| db_error())?;
    }

    // Change notification is best-effort; the update above has committed.
    if let Some(email) = email {
        if let Err(e) =
            mailer::send_password_change_notification(&state.config, &email, &user.usuario).await
        {
            tracing::warn!(usuario = %user.usuario, error = %e, "password change notification failed");
        }
    }

    Ok((
        StatusCode::OK,
        Json(MessageResponse {
            mensaje: "Contraseña actualizada correctamente".to_string(),
        }),
    ))
}

/// GET /users/permissions — the caller's role and permission list.
pub async fn get_permissions(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<(StatusCode, Json<PermissionsResponse>), ApiError> {
    let (rol_id, rol): (Option<i64>, Option<String>) = {
        let conn = state.db.read().await;
        let mut rows = conn
            .query(
                r#"
                SELECT u.rol_id, r.nombre
                FROM usuarios u
                LEFT JOIN roles r ON r.id = u.rol_id
                WHERE u.usuario = ?
                "#,
                [user.usuario.as_str()],
            )
            .await
            .map_err(|_| db_error())?;
        match rows.next().await.map_err(|_| db_error())? {
            Some(row) => (
                row.get(0).map_err(|_| db_error())?,
                row.get(1).map_err(|_| db_error())?,
            ),
            None => return Err(crate::utils::not_found("Usuario no encontrado")),
        }
    };

    let permisos = match rol_id {
        Some(rol_id) => {
            let conn = state.db.read().await;
            fetch_role_permissions(&conn, rol_id).await?
        }
        None => Vec::new(),
    };

    Ok((
        StatusCode::OK,
        Json(PermissionsResponse {
            usuario: user.usuario,
            rol,
            permisos,
        }),
    ))
}
