/*!
 * User Management Integration Tests
 *
 * Covers the user routes: creation with generated or supplied passwords,
 * the duplicate guard, id-addressed activation toggling (including the
 * protected primary admin), partial updates, password resets and the
 * self-service password change.
 */

mod common;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::*;

use home_finance_server::auth::AuthUser;
use home_finance_server::auth::{authenticate, get_user_id};
use home_finance_server::constants::{GENERATED_PASSWORD_LENGTH, PASSWORD_SYMBOLS};
use home_finance_server::logs::RequestMeta;
use home_finance_server::models::{ChangePasswordPayload, CreateUserPayload, UpdateUserPayload};
use home_finance_server::users::{
    create_user, generate_password, reset_password, toggle_user_status, update_user,
};

fn admin() -> AuthUser {
    AuthUser {
        usuario: TEST_ADMIN.to_string(),
    }
}

#[test]
fn generated_passwords_hold_every_character_class() {
    for _ in 0..50 {
        let password = generate_password();
        assert_eq!(password.len(), GENERATED_PASSWORD_LENGTH);
        assert!(password.chars().any(|c| c.is_ascii_lowercase()));
        assert!(password.chars().any(|c| c.is_ascii_uppercase()));
        assert!(password.chars().any(|c| c.is_ascii_digit()));
        assert!(password.chars().any(|c| PASSWORD_SYMBOLS.contains(c)));
    }
}

#[test]
fn generated_passwords_differ() {
    let a = generate_password();
    let b = generate_password();
    assert_ne!(a, b);
}

#[tokio::test]
async fn create_user_without_smtp_returns_password_in_warning() {
    let state = setup_state().await;

    let (status, Json(body)) = create_user(
        State(state.clone()),
        admin(),
        RequestMeta::default(),
        Json(CreateUserPayload {
            usuario: Some("nuevo".to_string()),
            nombre: Some("Nuevo Usuario".to_string()),
            email: Some("nuevo@example.com".to_string()),
            rol: Some("usuario".to_string()),
            password: None,
        }),
    )
    .await
    .expect("creation should succeed");

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body.usuario, "nuevo");
    let warning = body.warning.expect("no SMTP configured, warning expected");
    let password = warning
        .detalles
        .rsplit(": ")
        .next()
        .expect("warning carries the password");

    // The generated password must actually open the new account.
    let user = authenticate(&state.db, "nuevo", password)
        .await
        .expect("generated password should authenticate");
    assert_eq!(user.rol.as_deref(), Some("usuario"));
}

fn full_payload(usuario: &str, email: &str) -> CreateUserPayload {
    CreateUserPayload {
        usuario: Some(usuario.to_string()),
        nombre: Some(format!("Nombre de {}", usuario)),
        email: Some(email.to_string()),
        rol: Some("usuario".to_string()),
        password: None,
    }
}

#[tokio::test]
async fn create_user_rejects_duplicates_case_insensitively() {
    let state = setup_state().await;
    create_test_user(&state.db, "repetido", "Clave!123", "usuario", true).await;

    let err = create_user(
        State(state.clone()),
        admin(),
        RequestMeta::default(),
        Json(full_payload("Repetido", "repetido@example.com")),
    )
    .await
    .expect_err("duplicate username should fail");
    assert_eq!(err.0, StatusCode::CONFLICT);

    // The same guard covers the email, also ignoring case.
    let (status, _) = create_user(
        State(state.clone()),
        admin(),
        RequestMeta::default(),
        Json(full_payload("titular", "titular@example.com")),
    )
    .await
    .expect("first owner of the email should succeed");
    assert_eq!(status, StatusCode::CREATED);

    let err = create_user(
        State(state.clone()),
        admin(),
        RequestMeta::default(),
        Json(full_payload("otra", "TITULAR@example.com")),
    )
    .await
    .expect_err("duplicate email should fail");
    assert_eq!(err.0, StatusCode::CONFLICT);

    let conn = state.db.read().await;
    let mut rows = conn
        .query(
            "SELECT COUNT(*) FROM logs WHERE accion = 'crear_usuario_fallido'",
            (),
        )
        .await
        .unwrap();
    let count: i64 = rows.next().await.unwrap().unwrap().get(0).unwrap();
    assert_eq!(count, 2);
}

#[tokio::test]
async fn create_user_requires_every_field() {
    let state = setup_state().await;

    let mut sin_nombre = full_payload("alguien", "alguien@example.com");
    sin_nombre.nombre = None;
    let mut sin_email = full_payload("alguien", "alguien@example.com");
    sin_email.email = None;
    let mut sin_rol = full_payload("alguien", "alguien@example.com");
    sin_rol.rol = None;

    for payload in [sin_nombre, sin_email, sin_rol] {
        let err = create_user(State(state.clone()), admin(), RequestMeta::default(), Json(payload))
            .await
            .expect_err("incomplete payload should fail");
        assert_eq!(err.0, StatusCode::BAD_REQUEST);
    }
}

#[tokio::test]
async fn create_user_rejects_unknown_role_and_bad_email() {
    let state = setup_state().await;

    let mut rol_malo = full_payload("alguien", "alguien@example.com");
    rol_malo.rol = Some("inexistente".to_string());
    let err = create_user(
        State(state.clone()),
        admin(),
        RequestMeta::default(),
        Json(rol_malo),
    )
    .await
    .expect_err("unknown role should fail");
    assert_eq!(err.0, StatusCode::BAD_REQUEST);

    let err = create_user(
        State(state),
        admin(),
        RequestMeta::default(),
        Json(full_payload("alguien", "esto no es un email")),
    )
    .await
    .expect_err("malformed email should fail");
    assert_eq!(err.0, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn non_admin_is_refused_and_audited() {
    let state = setup_state().await;
    create_test_user(&state.db, "normal", "Clave!123", "usuario", true).await;

    let err = create_user(
        State(state.clone()),
        AuthUser {
            usuario: "normal".to_string(),
        },
        RequestMeta::default(),
        Json(full_payload("colado", "colado@example.com")),
    )
    .await
    .expect_err("caller without gestionar_usuarios should be refused");
    assert_eq!(err.0, StatusCode::FORBIDDEN);

    let conn = state.db.read().await;
    let mut rows = conn
        .query(
            "SELECT COUNT(*) FROM logs WHERE accion = 'acceso_denegado' AND usuario = 'normal'",
            (),
        )
        .await
        .unwrap();
    let count: i64 = rows.next().await.unwrap().unwrap().get(0).unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
async fn supplied_password_is_kept_and_welcome_email_attempted() {
    let state = setup_state().await;

    let mut payload = full_payload("elegido", "elegido@example.com");
    payload.password = Some("corta".to_string());
    let (status, Json(body)) = create_user(
        State(state.clone()),
        admin(),
        RequestMeta::default(),
        Json(payload),
    )
    .await
    .expect("supplied password is taken as-is");
    assert_eq!(status, StatusCode::CREATED);

    // The welcome mail goes out for supplied passwords too; without SMTP
    // that surfaces as the warning carrying the password.
    let warning = body.warning.expect("no SMTP configured, warning expected");
    assert!(warning.detalles.ends_with("corta"));

    authenticate(&state.db, "elegido", "corta")
        .await
        .expect("supplied password should authenticate");
}

#[tokio::test]
async fn any_authenticated_user_can_list_users() {
    let state = setup_state().await;
    create_test_user(&state.db, "normal", "Clave!123", "usuario", true).await;

    let (status, Json(body)) = home_finance_server::users::list_users(
        State(state),
        AuthUser {
            usuario: "normal".to_string(),
        },
    )
    .await
    .expect("listing is open to any bearer");
    assert_eq!(status, StatusCode::OK);
    assert!(body.usuarios.iter().any(|u| u.usuario == "normal"));
}

#[tokio::test]
async fn toggle_twice_returns_to_active() {
    let state = setup_state().await;
    let objetivo_id =
        create_test_user(&state.db, "objetivo", "Clave!123", "usuario", true).await;

    let (_, Json(first)) = toggle_user_status(
        State(state.clone()),
        admin(),
        RequestMeta::default(),
        Path(objetivo_id),
    )
    .await
    .expect("first toggle should succeed");
    assert!(!first.activo);

    // A blocked account cannot log in.
    let err = authenticate(&state.db, "objetivo", "Clave!123")
        .await
        .expect_err("blocked account should fail");
    assert_eq!(err.0, StatusCode::UNAUTHORIZED);

    let (_, Json(second)) = toggle_user_status(
        State(state.clone()),
        admin(),
        RequestMeta::default(),
        Path(objetivo_id),
    )
    .await
    .expect("second toggle should succeed");
    assert!(second.activo);

    authenticate(&state.db, "objetivo", "Clave!123")
        .await
        .expect("reactivated account should log in");
}

#[tokio::test]
async fn primary_admin_cannot_be_toggled() {
    let state = setup_state().await;
    let admin_id = get_user_id(&state.db, TEST_ADMIN).await.unwrap();

    let err = toggle_user_status(
        State(state),
        admin(),
        RequestMeta::default(),
        Path(admin_id),
    )
    .await
    .expect_err("primary admin is protected");
    assert_eq!(err.0, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn toggle_unknown_user_is_not_found() {
    let state = setup_state().await;

    let err = toggle_user_status(
        State(state),
        admin(),
        RequestMeta::default(),
        Path(9999),
    )
    .await
    .expect_err("unknown user should fail");
    assert_eq!(err.0, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn update_user_changes_only_provided_fields() {
    let state = setup_state().await;
    let editable_id =
        create_test_user(&state.db, "editable", "Clave!123", "usuario", true).await;

    let (status, Json(body)) = update_user(
        State(state.clone()),
        admin(),
        RequestMeta::default(),
        Path(editable_id),
        Json(UpdateUserPayload {
            nombre: None,
            email: Some("editable@example.com".to_string()),
            rol: Some("invitado".to_string()),
        }),
    )
    .await
    .expect("update should succeed");

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.detalles.email.as_deref(), Some("editable@example.com"));
    assert_eq!(body.detalles.rol.as_deref(), Some("invitado"));
    // nombre was not in the payload and must survive.
    assert_eq!(body.detalles.nombre.as_deref(), Some("Nombre de editable"));
}

#[tokio::test]
async fn update_user_rejects_taken_email_and_admin_role_change() {
    let state = setup_state().await;
    let editable_id =
        create_test_user(&state.db, "editable", "Clave!123", "usuario", true).await;
    let admin_id = get_user_id(&state.db, TEST_ADMIN).await.unwrap();

    // admin@example.com belongs to the seeded primary admin.
    let err = update_user(
        State(state.clone()),
        admin(),
        RequestMeta::default(),
        Path(editable_id),
        Json(UpdateUserPayload {
            nombre: None,
            email: Some("Admin@example.com".to_string()),
            rol: None,
        }),
    )
    .await
    .expect_err("email already registered to another user");
    assert_eq!(err.0, StatusCode::CONFLICT);

    let err = update_user(
        State(state),
        admin(),
        RequestMeta::default(),
        Path(admin_id),
        Json(UpdateUserPayload {
            nombre: None,
            email: None,
            rol: Some("usuario".to_string()),
        }),
    )
    .await
    .expect_err("primary admin role is immutable");
    assert_eq!(err.0, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn update_user_with_empty_payload_is_rejected() {
    let state = setup_state().await;
    let editable_id =
        create_test_user(&state.db, "editable", "Clave!123", "usuario", true).await;

    let err = update_user(
        State(state),
        admin(),
        RequestMeta::default(),
        Path(editable_id),
        Json(UpdateUserPayload::default()),
    )
    .await
    .expect_err("empty payload should fail");
    assert_eq!(err.0, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn reset_password_invalidates_the_old_one() {
    let state = setup_state().await;
    let olvidadizo_id =
        create_test_user(&state.db, "olvidadizo", "Clave!123", "usuario", true).await;

    let (status, Json(body)) = reset_password(
        State(state.clone()),
        admin(),
        RequestMeta::default(),
        Path(olvidadizo_id),
    )
    .await
    .expect("reset should succeed");
    assert_eq!(status, StatusCode::OK);

    let warning = body.warning.expect("no email on file, warning expected");
    let password = warning
        .detalles
        .rsplit(": ")
        .next()
        .expect("warning carries the new password");

    authenticate(&state.db, "olvidadizo", password)
        .await
        .expect("new password should authenticate");
    let err = authenticate(&state.db, "olvidadizo", "Clave!123")
        .await
        .expect_err("old password must be dead");
    assert_eq!(err.0, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn primary_admin_password_cannot_be_reset() {
    let state = setup_state().await;
    let admin_id = get_user_id(&state.db, TEST_ADMIN).await.unwrap();

    let err = reset_password(
        State(state),
        admin(),
        RequestMeta::default(),
        Path(admin_id),
    )
    .await
    .expect_err("primary admin is protected");
    assert_eq!(err.0, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn change_password_verifies_current_and_rotates() {
    let state = setup_state().await;
    create_test_user(&state.db, "rotador", "Clave!123", "usuario", true).await;
    let caller = AuthUser {
        usuario: "rotador".to_string(),
    };

    let err = home_finance_server::auth::change_password(
        State(state.clone()),
        caller.clone(),
        Json(ChangePasswordPayload {
            current_password: Some("equivocada".to_string()),
            new_password: Some("Nueva!Clave9".to_string()),
        }),
    )
    .await
    .expect_err("wrong current password should be refused");
    assert_eq!(err.0, StatusCode::UNAUTHORIZED);

    let (status, _) = home_finance_server::auth::change_password(
        State(state.clone()),
        caller,
        Json(ChangePasswordPayload {
            current_password: Some("Clave!123".to_string()),
            new_password: Some("Nueva!Clave9".to_string()),
        }),
    )
    .await
    .expect("correct current password should rotate");
    assert_eq!(status, StatusCode::OK);

    authenticate(&state.db, "rotador", "Nueva!Clave9")
        .await
        .expect("new password should authenticate");
    let err = authenticate(&state.db, "rotador", "Clave!123")
        .await
        .expect_err("old password must be dead");
    assert_eq!(err.0, StatusCode::UNAUTHORIZED);
}
