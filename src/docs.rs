use axum::{
    Json,
    extract::State,
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{Html, IntoResponse, Response},
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;

use crate::AppState;
use crate::auth;
use crate::database::Db;
use crate::utils::{ApiError, unauthorized};

const DOCS_HTML: &str = r#"<!DOCTYPE html>
<html lang="es">
<head>
  <meta charset="utf-8">
  <title>API de finanzas del hogar</title>
  <style>
    body { font-family: sans-serif; max-width: 56rem; margin: 2rem auto; padding: 0 1rem; }
    code { background: #f2f2f2; padding: 0.1rem 0.3rem; border-radius: 3px; }
    table { border-collapse: collapse; width: 100%; }
    th, td { border: 1px solid #ccc; padding: 0.4rem 0.6rem; text-align: left; }
  </style>
</head>
<body>
  <h1>API de finanzas del hogar</h1>
  <p>Todas las rutas protegidas requieren <code>Authorization: Bearer &lt;token&gt;</code>.
     El token se obtiene en <code>POST /login</code> y expira en una hora.</p>
  <table>
    <tr><th>Método</th><th>Ruta</th><th>Descripción</th></tr>
    <tr><td>POST</td><td>/login</td><td>Iniciar sesión y obtener token</td></tr>
    <tr><td>GET</td><td>/users</td><td>Listar usuarios (admin)</td></tr>
    <tr><td>POST</td><td>/users</td><td>Crear usuario (admin)</td></tr>
    <tr><td>PUT</td><td>/users/{id}</td><td>Actualizar usuario (admin)</td></tr>
    <tr><td>POST</td><td>/users/{id}/toggle-status</td><td>Bloquear o desbloquear (admin)</td></tr>
    <tr><td>POST</td><td>/users/{id}/reset-password</td><td>Restablecer contraseña (admin)</td></tr>
    <tr><td>POST</td><td>/users/change-password</td><td>Cambiar la propia contraseña</td></tr>
    <tr><td>GET</td><td>/users/permissions</td><td>Permisos del usuario autenticado</td></tr>
    <tr><td>GET</td><td>/expenses</td><td>Listar gastos con filtros</td></tr>
    <tr><td>POST</td><td>/expenses</td><td>Crear gasto (multipart, factura opcional)</td></tr>
    <tr><td>GET</td><td>/expenses/{id}/invoice</td><td>Descargar factura adjunta</td></tr>
    <tr><td>DELETE</td><td>/expenses/{id}</td><td>Eliminar gasto (admin)</td></tr>
    <tr><td>GET</td><td>/incomes</td><td>Listar ingresos con filtros</td></tr>
    <tr><td>POST</td><td>/incomes</td><td>Registrar ingreso</td></tr>
    <tr><td>GET</td><td>/debts</td><td>Listar deudas con filtros</td></tr>
    <tr><td>POST</td><td>/debts</td><td>Registrar deuda</td></tr>
    <tr><td>PATCH</td><td>/debts/{id}</td><td>Actualizar deuda</td></tr>
    <tr><td>DELETE</td><td>/debts/{id}</td><td>Eliminar deuda (admin propietario)</td></tr>
    <tr><td>GET</td><td>/debtors</td><td>Listar deudores</td></tr>
    <tr><td>POST</td><td>/debtors</td><td>Registrar deudor</td></tr>
    <tr><td>PUT</td><td>/debtors/{id}</td><td>Actualizar deudor</td></tr>
    <tr><td>GET</td><td>/roles</td><td>Listar roles y permisos (admin)</td></tr>
    <tr><td>POST</td><td>/roles</td><td>Crear rol (admin)</td></tr>
    <tr><td>PUT</td><td>/roles/{id}</td><td>Actualizar permisos de un rol (admin)</td></tr>
    <tr><td>DELETE</td><td>/roles/{id}</td><td>Eliminar rol (admin)</td></tr>
    <tr><td>POST</td><td>/scores</td><td>Guardar puntuación (público)</td></tr>
    <tr><td>GET</td><td>/scores/top</td><td>Top 10 de puntuaciones (público)</td></tr>
    <tr><td>DELETE</td><td>/scores/delete-all</td><td>Borrar puntuaciones (token maestro)</td></tr>
    <tr><td>GET</td><td>/logs</td><td>Consultar el registro de auditoría</td></tr>
    <tr><td>POST</td><td>/email/send</td><td>Enviar notificación por correo</td></tr>
    <tr><td>GET</td><td>/live</td><td>Comprobación de vida</td></tr>
    <tr><td>GET</td><td>/endpoints</td><td>Catálogo de rutas en JSON</td></tr>
  </table>
</body>
</html>
"#;

/// Checks an `Authorization: Basic` header against the users table. The
/// same credential rules as /login apply, blocked accounts included.
async fn check_basic_auth(db: &Db, headers: &HeaderMap) -> Result<(), ApiError> {
    let header = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| unauthorized("Se requiere autenticación"))?;
    let encoded = header
        .strip_prefix("Basic ")
        .ok_or_else(|| unauthorized("Se requiere autenticación"))?;
    let decoded = BASE64
        .decode(encoded.trim())
        .map_err(|_| unauthorized("Credenciales mal codificadas"))?;
    let decoded =
        String::from_utf8(decoded).map_err(|_| unauthorized("Credenciales mal codificadas"))?;
    let (usuario, password) = decoded
        .split_once(':')
        .ok_or_else(|| unauthorized("Credenciales mal codificadas"))?;
    auth::authenticate(db, usuario, password).await?;
    Ok(())
}

/// GET /docs — the HTML reference page, behind HTTP Basic.
pub async fn docs_page(State(state): State<AppState>, headers: HeaderMap) -> Response {
    match check_basic_auth(&state.db, &headers).await {
        Ok(()) => Html(DOCS_HTML).into_response(),
        Err(err) => {
            let mut response = err.into_response();
            response.headers_mut().insert(
                header::WWW_AUTHENTICATE,
                HeaderValue::from_static("Basic realm=\"Login Required\""),
            );
            response
        }
    }
}

/// GET /endpoints — machine-readable route catalog.
pub async fn endpoints() -> (StatusCode, Json<serde_json::Value>) {
    let catalog = serde_json::json!({
        "auth": [
            { "method": "POST", "path": "/login" },
        ],
        "users": [
            { "method": "GET", "path": "/users" },
            { "method": "POST", "path": "/users" },
            { "method": "PUT", "path": "/users/{id}" },
            { "method": "POST", "path": "/users/{id}/toggle-status" },
            { "method": "POST", "path": "/users/{id}/reset-password" },
            { "method": "POST", "path": "/users/change-password" },
            { "method": "GET", "path": "/users/permissions" },
        ],
        "expenses": [
            { "method": "GET", "path": "/expenses" },
            { "method": "POST", "path": "/expenses" },
            { "method": "GET", "path": "/expenses/{id}/invoice" },
            { "method": "DELETE", "path": "/expenses/{id}" },
        ],
        "incomes": [
            { "method": "GET", "path": "/incomes" },
            { "method": "POST", "path": "/incomes" },
        ],
        "debts": [
            { "method": "GET", "path": "/debts" },
            { "method": "POST", "path": "/debts" },
            { "method": "PATCH", "path": "/debts/{id}" },
            { "method": "DELETE", "path": "/debts/{id}" },
        ],
        "debtors": [
            { "method": "GET", "path": "/debtors" },
            { "method": "POST", "path": "/debtors" },
            { "method": "PUT", "path": "/debtors/{id}" },
        ],
        "roles": [
            { "method": "GET", "path": "/roles" },
            { "method": "POST", "path": "/roles" },
            { "method": "PUT", "path": "/roles/{id}" },
            { "method": "DELETE", "path": "/roles/{id}" },
        ],
        "scores": [
            { "method": "POST", "path": "/scores" },
            { "method": "GET", "path": "/scores/top" },
            { "method": "DELETE", "path": "/scores/delete-all" },
        ],
        "logs": [
            { "method": "GET", "path": "/logs" },
        ],
        "email": [
            { "method": "POST", "path": "/email/send" },
        ],
        "meta": [
            { "method": "GET", "path": "/live" },
            { "method": "GET", "path": "/endpoints" },
            { "method": "GET", "path": "/docs" },
        ],
    });
    (StatusCode::OK, Json(catalog))
}

/// GET /live — liveness probe.
pub async fn live() -> (StatusCode, Json<serde_json::Value>) {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}
