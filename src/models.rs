use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Users & auth

/// A user as listed by `GET /users`: joined with its role.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct UserRow {
    pub id: i64,
    pub usuario: String,
    pub nombre: Option<String>,
    pub email: Option<String>,
    pub activo: bool,
    pub rol: Option<String>,
    pub rol_descripcion: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct LoginPayload {
    pub usuario: Option<String>,
    pub password: Option<String>,
}

#[derive(Serialize, Debug, Clone)]
pub struct PermissionEntry {
    pub permiso: String,
    pub descripcion: Option<String>,
}

#[derive(Serialize, Debug)]
pub struct LoginResponse {
    pub mensaje: String,
    pub token: String,
    pub usuario: String,
    pub rol: Option<String>,
    pub permisos: Vec<PermissionEntry>,
}

#[derive(Deserialize, Debug)]
pub struct CreateUserPayload {
    pub usuario: Option<String>,
    pub nombre: Option<String>,
    pub email: Option<String>,
    pub rol: Option<String>,
    pub password: Option<String>,
}

#[derive(Serialize, Debug)]
pub struct EmailWarning {
    pub mensaje: String,
    pub detalles: String,
}

#[derive(Serialize, Debug)]
pub struct CreateUserResponse {
    pub mensaje: String,
    pub usuario: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<EmailWarning>,
}

#[derive(Serialize, Debug)]
pub struct UsersResponse {
    pub usuarios: Vec<UserRow>,
}

#[derive(Deserialize, Debug, Default)]
pub struct UpdateUserPayload {
    pub nombre: Option<String>,
    pub email: Option<String>,
    pub rol: Option<String>,
}

#[derive(Serialize, Debug)]
pub struct UpdateUserResponse {
    pub mensaje: String,
    pub detalles: UserRow,
}

#[derive(Serialize, Debug)]
pub struct ToggleStatusResponse {
    pub mensaje: String,
    pub usuario: String,
    pub activo: bool,
}

#[derive(Serialize, Debug)]
pub struct ResetPasswordResponse {
    pub mensaje: String,
    pub usuario: String,
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<EmailWarning>,
}

#[derive(Deserialize, Debug)]
pub struct ChangePasswordPayload {
    pub current_password: Option<String>,
    pub new_password: Option<String>,
}

#[derive(Serialize, Debug)]
pub struct MessageResponse {
    pub mensaje: String,
}

#[derive(Deserialize, Debug)]
pub struct EmailSendPayload {
    pub asunto: Option<String>,
    pub mensaje: Option<String>,
}

#[derive(Serialize, Debug)]
pub struct PermissionsResponse {
    pub usuario: String,
    pub rol: Option<String>,
    pub permisos: Vec<PermissionEntry>,
}

// ---------------------------------------------------------------------------
// Expenses

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ExpenseRow {
    pub id: i64,
    pub amount: f64,
    pub category: String,
    pub description: Option<String>,
    pub date: String,
    pub nombre_usuario: Option<String>,
    pub has_invoice: bool,
    pub invoice_name: Option<String>,
    pub invoice_type: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
pub struct ExpenseFilters {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub category: Option<String>,
    pub usuario: Option<String>,
}

#[derive(Serialize, Debug)]
pub struct ExpensesResponse {
    pub expenses: Vec<ExpenseRow>,
    pub total: f64,
    pub categories: Vec<String>,
}

#[derive(Serialize, Debug)]
pub struct CreateExpenseResponse {
    pub mensaje: String,
    pub expense: ExpenseRow,
}

#[derive(Serialize, Debug)]
pub struct DeleteExpenseResponse {
    pub mensaje: String,
    pub expense_id: i64,
}

/// An invoice blob as stored next to its expense row.
#[derive(Debug, Clone)]
pub struct Invoice {
    pub content: Vec<u8>,
    pub name: String,
    pub file_type: String,
}

// ---------------------------------------------------------------------------
// Debts & debtors

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct DebtRow {
    pub id: i64,
    pub amount: f64,
    pub description: Option<String>,
    pub date: String,
    pub is_paid: bool,
    pub nombre_usuario: Option<String>,
    pub nombre_deudor: String,
}

#[derive(Deserialize, Debug, Default)]
pub struct DebtFilters {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub usuario: Option<String>,
    pub deudor: Option<String>,
}

#[derive(Serialize, Debug)]
pub struct DebtsResponse {
    pub debts: Vec<DebtRow>,
    pub total: f64,
    pub users: Vec<String>,
}

#[derive(Deserialize, Debug)]
pub struct CreateDebtPayload {
    pub amount: Option<f64>,
    pub description: Option<String>,
    pub debtor_id: Option<i64>,
}

#[derive(Serialize, Debug)]
pub struct CreateDebtResponse {
    pub mensaje: String,
    pub debt: DebtRow,
}

#[derive(Deserialize, Debug, Default)]
pub struct UpdateDebtPayload {
    pub amount: Option<f64>,
    pub debtor_id: Option<i64>,
    pub description: Option<String>,
    pub is_paid: Option<bool>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Debtor {
    pub id: i64,
    pub nombre: String,
    pub email: Option<String>,
    pub telefono: Option<String>,
    pub fecha_creacion: String,
}

#[derive(Serialize, Debug)]
pub struct DebtorsResponse {
    pub debtors: Vec<Debtor>,
}

#[derive(Deserialize, Debug)]
pub struct CreateDebtorPayload {
    pub nombre: Option<String>,
    pub email: Option<String>,
    pub telefono: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
pub struct UpdateDebtorPayload {
    pub nombre: Option<String>,
    pub email: Option<String>,
    pub telefono: Option<String>,
}

#[derive(Serialize, Debug)]
pub struct DebtorResponse {
    pub mensaje: String,
    pub debtor: Debtor,
}

// ---------------------------------------------------------------------------
// Incomes

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct IncomeRow {
    pub id: i64,
    pub amount: f64,
    pub description: Option<String>,
    pub category: String,
    pub date: String,
    pub nombre_usuario: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
pub struct IncomeFilters {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub category: Option<String>,
}

#[derive(Serialize, Debug)]
pub struct IncomesResponse {
    pub incomes: Vec<IncomeRow>,
    pub total: f64,
    pub categories: Vec<String>,
}

#[derive(Deserialize, Debug)]
pub struct CreateIncomePayload {
    pub amount: Option<f64>,
    pub description: Option<String>,
    pub category: Option<String>,
}

// ---------------------------------------------------------------------------
// Roles

/// A role plus a comma-joined string of its permission names.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct RoleRow {
    pub id: i64,
    pub nombre: String,
    pub descripcion: Option<String>,
    pub permisos: Option<String>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct PermissionRow {
    pub id: i64,
    pub nombre: String,
    pub descripcion: Option<String>,
}

#[derive(Serialize, Debug)]
pub struct RolesResponse {
    pub roles: Vec<RoleRow>,
    pub permisos_disponibles: Vec<PermissionRow>,
}

#[derive(Deserialize, Debug)]
pub struct CreateRolePayload {
    pub nombre: Option<String>,
    pub descripcion: Option<String>,
    pub permisos: Option<Vec<i64>>,
}

#[derive(Deserialize, Debug)]
pub struct UpdateRolePayload {
    pub permisos: Option<Vec<i64>>,
}

/// Returned by role create/update: the affected role with its final
/// grant set, joined the same way `GET /roles` joins it.
#[derive(Serialize, Debug)]
pub struct RoleMutationResponse {
    pub mensaje: String,
    pub rol: RoleRow,
}

// ---------------------------------------------------------------------------
// Scores

/// Game clients are not uniform about numeric types: some send
/// `"score": "150"`. Accept either form.
fn lenient_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumOrStr {
        Num(i64),
        Str(String),
    }

    match Option::<NumOrStr>::deserialize(deserializer)? {
        None => Ok(None),
        Some(NumOrStr::Num(n)) => Ok(Some(n)),
        Some(NumOrStr::Str(s)) => s
            .trim()
            .parse::<i64>()
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct ScorePayload {
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub score: Option<i64>,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub timestamp: Option<i64>,
    pub session_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub game_duration: Option<i64>,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub interaction_count: Option<i64>,
    pub game_version: Option<String>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ScoreRow {
    pub name: String,
    pub score: i64,
    pub timestamp: i64,
    pub session_id: String,
    pub game_duration: Option<i64>,
    pub interaction_count: Option<i64>,
    pub game_version: Option<String>,
    pub platform: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: String,
}

#[derive(Serialize, Debug)]
pub struct SaveScoreResponse {
    pub mensaje: String,
    pub id: i64,
}

#[derive(Serialize, Debug)]
pub struct TopScoresResponse {
    pub mensaje: String,
    pub scores: Vec<ScoreRow>,
}

#[derive(Serialize, Debug)]
pub struct DeleteScoresResponse {
    pub mensaje: String,
    pub deleted: u64,
}

// ---------------------------------------------------------------------------
// Audit log

#[derive(Serialize, Debug, Clone)]
pub struct LogEntry {
    pub id: i64,
    pub accion: String,
    pub tabla: String,
    pub usuario: String,
    pub ip: Option<String>,
    pub dispositivo: Option<String>,
    pub detalles: Option<serde_json::Value>,
    pub created_at: String,
}

#[derive(Deserialize, Debug, Default)]
pub struct LogQueryParams {
    pub accion: Option<String>,
    pub tabla: Option<String>,
    pub usuario: Option<String>,
    pub ip: Option<String>,
    pub fecha_inicio: Option<String>,
    pub fecha_fin: Option<String>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Serialize, Debug)]
pub struct LogFilterValues {
    pub acciones: Vec<String>,
    pub tablas: Vec<String>,
    pub usuarios: Vec<String>,
}

#[derive(Serialize, Debug)]
pub struct LogsResponse {
    pub logs: Vec<LogEntry>,
    pub total: u64,
    pub page: u32,
    pub per_page: u32,
    pub total_pages: u64,
    pub filters: LogFilterValues,
}
