use anyhow::{Context, Result, anyhow};
use axum::{Json, extract::State, http::StatusCode};
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::AppState;
use crate::auth::AuthUser;
use crate::config::Config;
use crate::models::{EmailSendPayload, MessageResponse};
use crate::utils::{ApiError, bad_request, internal_error};

fn transport(config: &Config) -> Result<(AsyncSmtpTransport<Tokio1Executor>, String)> {
    let smtp = config
        .smtp
        .as_ref()
        .ok_or_else(|| anyhow!("SMTP is not configured"))?;
    let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&smtp.server)
        .context("invalid SMTP server")?
        .port(smtp.port)
        .credentials(Credentials::new(smtp.user.clone(), smtp.password.clone()))
        .build();
    Ok((mailer, smtp.user.clone()))
}

async fn send(config: &Config, to: &str, subject: &str, body: String) -> Result<()> {
    let (mailer, from) = transport(config)?;
    let message = Message::builder()
        .from(from.parse().context("invalid sender address")?)
        .to(to.parse().context("invalid recipient address")?)
        .subject(subject)
        .header(ContentType::TEXT_PLAIN)
        .body(body)
        .context("failed to build message")?;
    mailer.send(message).await.context("SMTP send failed")?;
    Ok(())
}

/// Welcome mail with the generated initial password. Callers treat a
/// failure as a warning, never as a failed user creation.
pub async fn send_welcome_email(
    config: &Config,
    to: &str,
    usuario: &str,
    password: &str,
) -> Result<()> {
    let body = format!(
        "Hola,\n\n\
         Se ha creado una cuenta para ti en el sistema de finanzas.\n\n\
         Usuario: {}\n\
         Contraseña temporal: {}\n\n\
         Por favor cambia tu contraseña después de iniciar sesión.",
        usuario, password
    );
    send(config, to, "Bienvenido al sistema de finanzas", body).await
}

/// Mails a freshly generated password after an admin reset.
pub async fn send_password_reset_email(
    config: &Config,
    to: &str,
    usuario: &str,
    password: &str,
) -> Result<()> {
    let body = format!(
        "Hola,\n\n\
         Un administrador ha restablecido tu contraseña.\n\n\
         Usuario: {}\n\
         Nueva contraseña: {}\n\n\
         Por favor cambia tu contraseña después de iniciar sesión.",
        usuario, password
    );
    send(config, to, "Tu contraseña ha sido restablecida", body).await
}

/// Courtesy notification after a self-service password change.
pub async fn send_password_change_notification(
    config: &Config,
    to: &str,
    usuario: &str,
) -> Result<()> {
    let body = format!(
        "Hola {},\n\n\
         Tu contraseña ha sido cambiada correctamente.\n\
         Si no fuiste tú, contacta al administrador de inmediato.",
        usuario
    );
    send(config, to, "Contraseña actualizada", body).await
}

/// POST /email/send — mails an arbitrary message to the fixed recipient.
pub async fn send_notification(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<EmailSendPayload>,
) -> Result<(StatusCode, Json<MessageResponse>), ApiError> {
    let Some(mensaje) = payload.mensaje.filter(|m| !m.trim().is_empty()) else {
        return Err(bad_request("Se requiere el mensaje"));
    };
    let asunto = payload
        .asunto
        .filter(|a| !a.trim().is_empty())
        .unwrap_or_else(|| "Notificación del sistema de finanzas".to_string());

    let body = format!("Mensaje enviado por {}:\n\n{}", auth.usuario, mensaje);
    if let Err(err) = send_admin_notification(&state.config, &asunto, body).await {
        tracing::error!(error = %err, "failed to send notification email");
        return Err(internal_error("No se pudo enviar el correo"));
    }

    Ok((
        StatusCode::OK,
        Json(MessageResponse {
            mensaje: "Correo enviado".to_string(),
        }),
    ))
}

/// Notifies the fixed recipient configured via NOTIFY_RECIPIENT.
pub async fn send_admin_notification(config: &Config, subject: &str, body: String) -> Result<()> {
    let recipient = config
        .smtp
        .as_ref()
        .map(|s| s.notify_recipient.clone())
        .ok_or_else(|| anyhow!("SMTP is not configured"))?;
    send(config, &recipient, subject, body).await
}
