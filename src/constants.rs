// Server configuration
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: &str = "3000";
pub const DEFAULT_DATA_PATH: &str = "data";
pub const DATABASE_FILE: &str = "finance.db";

// Token configuration
pub const TOKEN_EXPIRY_SECS: i64 = 3600; // 1 hour
pub const MIN_JWT_SECRET_LENGTH: usize = 32;

// Invoice attachments
pub const MAX_INVOICE_SIZE: usize = 2 * 1024 * 1024; // 2 MiB
pub const ALLOWED_INVOICE_EXTENSIONS: [&str; 3] = ["pdf", "jpg", "jpeg"];

// Password policy (self-service change) and generated passwords
pub const MIN_PASSWORD_LENGTH: usize = 8;
pub const GENERATED_PASSWORD_LENGTH: usize = 12;
pub const PASSWORD_SYMBOLS: &str = "!@#$%^&*";

// Scores
pub const SCORE_TEXT_MAX_LENGTH: usize = 100;
pub const TOP_SCORES_LIMIT: u32 = 10;

// Audit log pagination
pub const DEFAULT_LOG_PAGE: u32 = 1;
pub const DEFAULT_LOGS_PER_PAGE: u32 = 10;
pub const LOG_SORT_FIELDS: [&str; 6] = ["id", "accion", "tabla", "usuario", "ip", "created_at"];
pub const DEFAULT_LOG_SORT_FIELD: &str = "created_at";
pub const DEFAULT_LOG_SORT_ORDER: &str = "DESC";

// Seed role and enforced permissions. The full permission catalog is
// seeded in database.rs; only these names are checked in code.
pub const ROLE_ADMIN: &str = "admin";
pub const PERM_EDIT_DEBTS: &str = "editar_deudas";
pub const PERM_MANAGE_USERS: &str = "gestionar_usuarios";

// Error messages
pub const ERR_DATABASE_OPERATION: &str = "Database operation failed";
pub const ERR_INVALID_CREDENTIALS: &str = "Usuario o contraseña incorrectos";
pub const ERR_ACCOUNT_BLOCKED: &str = "La cuenta está bloqueada";
pub const ERR_MISSING_TOKEN: &str = "Missing or invalid bearer token";
pub const ERR_TOKEN_EXPIRED: &str = "Token expired";
pub const ERR_NOT_ADMIN: &str = "Se requiere rol de administrador";
