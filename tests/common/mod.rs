use std::sync::Arc;

use tempfile::tempdir;

use home_finance_server::AppState;
use home_finance_server::config::Config;
use home_finance_server::database::{Db, hash_password, init_db, seed_admin_user};

pub const TEST_JWT_SECRET: &str = "una-clave-de-prueba-suficientemente-larga";
pub const TEST_ADMIN: &str = "admin_principal";
pub const TEST_ADMIN_PASSWORD: &str = "Adm1n!pass";
pub const TEST_MASTER_TOKEN: &str = "master-secret";

pub fn test_config() -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: "0".to_string(),
        data_path: "unused".to_string(),
        jwt_secret: TEST_JWT_SECRET.to_string(),
        admin_user: TEST_ADMIN.to_string(),
        admin_password: TEST_ADMIN_PASSWORD.to_string(),
        admin_email: Some("admin@example.com".to_string()),
        master_token: Some(TEST_MASTER_TOKEN.to_string()),
        smtp: None,
    }
}

/// Fresh application state over an isolated temporary database, with the
/// primary admin account seeded.
pub async fn setup_state() -> AppState {
    let temp_dir = tempdir().expect("Failed to create temporary directory");
    let data_path = temp_dir
        .path()
        .to_str()
        .expect("Failed to convert path to string")
        .to_string();

    let db = init_db(&data_path)
        .await
        .unwrap_or_else(|e| panic!("Failed to initialize database at {}: {}", data_path, e));
    seed_admin_user(&db, TEST_ADMIN, TEST_ADMIN_PASSWORD, Some("admin@example.com"))
        .await
        .expect("Failed to seed admin account");

    // Keep the temp_dir alive by leaking it (for test duration)
    std::mem::forget(temp_dir);

    AppState {
        db,
        config: Arc::new(test_config()),
    }
}

/// Inserts a user with the given role name and returns its id.
pub async fn create_test_user(
    db: &Db,
    usuario: &str,
    password: &str,
    rol: &str,
    activo: bool,
) -> i64 {
    let hash = hash_password(password).expect("Failed to hash password");
    let conn = db.write().await;
    conn.execute(
        r#"
        INSERT INTO usuarios (usuario, password, nombre, email, rol_id, activo)
        SELECT ?, ?, ?, NULL, id, ? FROM roles WHERE nombre = ?
        "#,
        (
            usuario,
            hash.as_str(),
            format!("Nombre de {}", usuario),
            activo as i64,
            rol,
        ),
    )
    .await
    .unwrap_or_else(|e| panic!("Failed to insert test user '{}': {}", usuario, e));
    conn.last_insert_rowid()
}

/// Grants an extra permission to a seeded role.
pub async fn grant_permission(db: &Db, rol: &str, permiso: &str) {
    let conn = db.write().await;
    conn.execute(
        r#"
        INSERT OR IGNORE INTO roles_permisos (rol_id, permiso_id)
        SELECT r.id, p.id FROM roles r, permisos p
        WHERE r.nombre = ? AND p.nombre = ?
        "#,
        (rol, permiso),
    )
    .await
    .unwrap_or_else(|e| panic!("Failed to grant '{}' to '{}': {}", permiso, rol, e));
}

pub async fn create_test_debtor(db: &Db, nombre: &str) -> i64 {
    let conn = db.write().await;
    conn.execute("INSERT INTO debtors (nombre) VALUES (?)", [nombre])
        .await
        .unwrap_or_else(|e| panic!("Failed to insert test debtor '{}': {}", nombre, e));
    conn.last_insert_rowid()
}

pub async fn create_test_debt(db: &Db, user_id: i64, debtor_id: i64, amount: f64) -> i64 {
    let conn = db.write().await;
    conn.execute(
        "INSERT INTO debts (amount, description, user_id, debtor_id) VALUES (?, 'Deuda de prueba', ?, ?)",
        (amount, user_id, debtor_id),
    )
    .await
    .unwrap_or_else(|e| panic!("Failed to insert test debt: {}", e));
    conn.last_insert_rowid()
}

/// Inserts an expense with an attached invoice blob and returns its id.
pub async fn create_test_expense_with_invoice(
    db: &Db,
    user_id: i64,
    content: &[u8],
    name: &str,
    file_type: &str,
) -> i64 {
    let conn = db.write().await;
    conn.execute(
        r#"
        INSERT INTO expenses (amount, category, description, user_id, invoice, invoice_name, invoice_type)
        VALUES (42.0, 'hogar', 'Gasto de prueba', ?, ?, ?, ?)
        "#,
        (user_id, content.to_vec(), name, file_type),
    )
    .await
    .unwrap_or_else(|e| panic!("Failed to insert test expense: {}", e));
    conn.last_insert_rowid()
}

pub async fn insert_test_log(db: &Db, accion: &str, tabla: &str, usuario: &str) {
    let conn = db.write().await;
    conn.execute(
        "INSERT INTO logs (accion, tabla, usuario, ip) VALUES (?, ?, ?, '127.0.0.1')",
        (accion, tabla, usuario),
    )
    .await
    .unwrap_or_else(|e| panic!("Failed to insert test log: {}", e));
}

pub async fn insert_test_score(db: &Db, name: &str, score: i64, timestamp: i64, is_valid: bool) {
    let conn = db.write().await;
    conn.execute(
        r#"
        INSERT INTO scores (name, score, timestamp, session_id, is_valid)
        VALUES (?, ?, ?, ?, ?)
        "#,
        (
            name,
            score,
            timestamp,
            format!("session-{}-{}", name, timestamp),
            is_valid as i64,
        ),
    )
    .await
    .unwrap_or_else(|e| panic!("Failed to insert test score: {}", e));
}
