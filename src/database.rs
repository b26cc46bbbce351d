use anyhow::Result;
use argon2::Argon2;
use argon2::password_hash::{PasswordHasher, SaltString, rand_core::OsRng};
use libsql::{Builder, Connection};
use std::{path::Path, sync::Arc};
use tokio::sync::RwLock;

use crate::constants::*;

pub type Db = Arc<RwLock<Connection>>;

const CREATE_ROLES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS roles (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    nombre       TEXT    NOT NULL UNIQUE,
    descripcion  TEXT
);
"#;

const CREATE_PERMISSIONS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS permisos (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    nombre       TEXT    NOT NULL UNIQUE,
    descripcion  TEXT
);
"#;

const CREATE_ROLE_PERMISSIONS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS roles_permisos (
    rol_id      INTEGER NOT NULL,
    permiso_id  INTEGER NOT NULL,
    PRIMARY KEY (rol_id, permiso_id),
    FOREIGN KEY (rol_id) REFERENCES roles(id) ON DELETE CASCADE,
    FOREIGN KEY (permiso_id) REFERENCES permisos(id) ON DELETE CASCADE
);
"#;

const CREATE_USERS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS usuarios (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    usuario         TEXT    NOT NULL UNIQUE,
    password        TEXT    NOT NULL,
    nombre          TEXT,
    email           TEXT    UNIQUE,
    rol_id          INTEGER,
    activo          INTEGER DEFAULT 1,
    fecha_creacion  TEXT    DEFAULT CURRENT_TIMESTAMP,
    FOREIGN KEY (rol_id) REFERENCES roles(id)
);
"#;

const CREATE_EXPENSES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS expenses (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    amount        REAL    NOT NULL,
    category      TEXT    NOT NULL,
    description   TEXT,
    date          TEXT    DEFAULT CURRENT_TIMESTAMP,
    user_id       INTEGER NOT NULL,
    invoice       BLOB,
    invoice_name  TEXT,
    invoice_type  TEXT,
    FOREIGN KEY (user_id) REFERENCES usuarios(id)
);
"#;

const CREATE_DEBTORS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS debtors (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    nombre          TEXT    NOT NULL,
    email           TEXT,
    telefono        TEXT,
    fecha_creacion  TEXT    DEFAULT CURRENT_TIMESTAMP
);
"#;

const CREATE_DEBTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS debts (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    amount       REAL    NOT NULL,
    description  TEXT,
    date         TEXT    DEFAULT CURRENT_TIMESTAMP,
    is_paid      INTEGER DEFAULT 0,
    user_id      INTEGER NOT NULL,
    debtor_id    INTEGER NOT NULL,
    FOREIGN KEY (user_id) REFERENCES usuarios(id),
    FOREIGN KEY (debtor_id) REFERENCES debtors(id)
);
"#;

const CREATE_INCOMES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS incomes (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    amount       REAL    NOT NULL,
    description  TEXT,
    category     TEXT    NOT NULL,
    date         TEXT    DEFAULT CURRENT_TIMESTAMP,
    user_id      INTEGER NOT NULL,
    FOREIGN KEY (user_id) REFERENCES usuarios(id)
);
"#;

const CREATE_SCORES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS scores (
    id                 INTEGER PRIMARY KEY AUTOINCREMENT,
    name               TEXT    NOT NULL,
    score              INTEGER NOT NULL,
    timestamp          INTEGER NOT NULL,
    session_id         TEXT    NOT NULL,
    is_valid           INTEGER DEFAULT 1,
    game_duration      INTEGER,
    interaction_count  INTEGER,
    game_version       TEXT,
    platform           TEXT,
    user_agent         TEXT,
    created_at         TEXT    DEFAULT CURRENT_TIMESTAMP
);
"#;

const CREATE_LOGS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS logs (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    accion       TEXT NOT NULL,
    tabla        TEXT NOT NULL,
    usuario      TEXT NOT NULL,
    ip           TEXT,
    dispositivo  TEXT,
    detalles     TEXT,
    created_at   TEXT DEFAULT CURRENT_TIMESTAMP
);
"#;

const SEED_ROLES: &str = r#"
INSERT OR IGNORE INTO roles (nombre, descripcion) VALUES
    ('admin', 'Administrador con acceso total'),
    ('usuario', 'Usuario estándar'),
    ('invitado', 'Usuario con acceso limitado');
"#;

const SEED_PERMISSIONS: &str = r#"
INSERT OR IGNORE INTO permisos (nombre, descripcion) VALUES
    ('ver_gastos', 'Puede ver gastos'),
    ('crear_gastos', 'Puede crear nuevos gastos'),
    ('editar_gastos', 'Puede editar gastos existentes'),
    ('eliminar_gastos', 'Puede eliminar gastos'),
    ('ver_deudas', 'Puede ver deudas'),
    ('crear_deudas', 'Puede crear nuevas deudas'),
    ('editar_deudas', 'Puede editar deudas existentes'),
    ('eliminar_deudas', 'Puede eliminar deudas'),
    ('gestionar_usuarios', 'Puede gestionar usuarios'),
    ('ver_logs', 'Puede ver los logs del sistema');
"#;

// Admin gets the full catalog; standard users may view and create; guests
// may only view.
const SEED_ADMIN_GRANTS: &str = r#"
INSERT OR IGNORE INTO roles_permisos (rol_id, permiso_id)
SELECT r.id, p.id FROM roles r, permisos p WHERE r.nombre = 'admin';
"#;

const SEED_USER_GRANTS: &str = r#"
INSERT OR IGNORE INTO roles_permisos (rol_id, permiso_id)
SELECT r.id, p.id FROM roles r, permisos p
WHERE r.nombre = 'usuario'
  AND p.nombre IN ('ver_gastos', 'crear_gastos', 'ver_deudas', 'crear_deudas');
"#;

const SEED_GUEST_GRANTS: &str = r#"
INSERT OR IGNORE INTO roles_permisos (rol_id, permiso_id)
SELECT r.id, p.id FROM roles r, permisos p
WHERE r.nombre = 'invitado'
  AND p.nombre IN ('ver_gastos', 'ver_deudas');
"#;

/// Opens (creating if needed) the application database and applies the
/// idempotent schema plus the role/permission seed. No migrations framework:
/// every statement is safe to re-run.
pub async fn init_db(data_dir: &str) -> Result<Db> {
    tokio::fs::create_dir_all(data_dir).await?;
    let path = Path::new(data_dir).join(DATABASE_FILE);
    let db = Builder::new_local(path).build().await?;
    let conn = db.connect()?;

    conn.execute("PRAGMA foreign_keys = ON", ()).await?;

    for statement in [
        CREATE_ROLES_TABLE,
        CREATE_PERMISSIONS_TABLE,
        CREATE_ROLE_PERMISSIONS_TABLE,
        CREATE_USERS_TABLE,
        CREATE_EXPENSES_TABLE,
        CREATE_DEBTORS_TABLE,
        CREATE_DEBTS_TABLE,
        CREATE_INCOMES_TABLE,
        CREATE_SCORES_TABLE,
        CREATE_LOGS_TABLE,
        SEED_ROLES,
        SEED_PERMISSIONS,
        SEED_ADMIN_GRANTS,
        SEED_USER_GRANTS,
        SEED_GUEST_GRANTS,
    ] {
        conn.execute(statement, ()).await?;
    }

    Ok(Arc::new(RwLock::new(conn)))
}

/// Seeds the primary admin account if it does not exist yet. The password is
/// hashed before storage; the account lands in the `admin` role.
pub async fn seed_admin_user(
    db: &Db,
    usuario: &str,
    password: &str,
    email: Option<&str>,
) -> Result<()> {
    let hash = hash_password(password)?;
    let conn = db.write().await;
    conn.execute(
        r#"
        INSERT OR IGNORE INTO usuarios (usuario, password, nombre, email, rol_id, activo)
        SELECT ?, ?, 'Administrador', ?, id, 1 FROM roles WHERE nombre = ?
        "#,
        (usuario, hash.as_str(), email, ROLE_ADMIN),
    )
    .await?;
    Ok(())
}

/// Argon2 hash with a fresh random salt.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))?
        .to_string();
    Ok(hash)
}
