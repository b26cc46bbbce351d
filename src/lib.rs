use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, FromRef};
use axum::routing::{delete, get, patch, post, put};
use axum::Router;
use tower_http::trace::TraceLayer;

pub mod auth;
pub mod config;
pub mod constants;
pub mod database;
pub mod debtors;
pub mod debts;
pub mod docs;
pub mod expenses;
pub mod incomes;
pub mod logs;
pub mod mailer;
pub mod models;
pub mod roles;
pub mod scores;
pub mod users;
pub mod utils;

use config::Config;
use database::Db;

/// Shared application state: one database handle plus the immutable
/// configuration loaded at startup.
#[derive(Clone)]
pub struct AppState {
    pub db: Db,
    pub config: Arc<Config>,
}

impl FromRef<AppState> for Db {
    fn from_ref(state: &AppState) -> Db {
        state.db.clone()
    }
}

impl FromRef<AppState> for Arc<Config> {
    fn from_ref(state: &AppState) -> Arc<Config> {
        state.config.clone()
    }
}

/// Builds the full application router. Multipart expense uploads get a
/// raised body limit so an oversized invoice is rejected by the size check
/// with a 400 instead of being cut off at the transport with a 413.
pub fn app(state: AppState) -> Router {
    let expense_routes = Router::new()
        .route("/expenses", get(expenses::list_expenses).post(expenses::create_expense))
        .route("/expenses/{id}", delete(expenses::delete_expense))
        .route("/expenses/{id}/invoice", get(expenses::get_invoice))
        .layer(DefaultBodyLimit::max(8 * 1024 * 1024));

    Router::new()
        .route("/login", post(auth::login))
        .route("/users", get(users::list_users).post(users::create_user))
        .route("/users/change-password", post(auth::change_password))
        .route("/users/permissions", get(auth::get_permissions))
        .route("/users/{id}", put(users::update_user))
        .route("/users/{id}/toggle-status", post(users::toggle_user_status))
        .route("/users/{id}/reset-password", post(users::reset_password))
        .merge(expense_routes)
        .route("/incomes", get(incomes::list_incomes).post(incomes::create_income))
        .route("/debts", get(debts::list_debts).post(debts::create_debt))
        .route(
            "/debts/{id}",
            patch(debts::update_debt).delete(debts::delete_debt),
        )
        .route("/debtors", get(debtors::list_debtors).post(debtors::create_debtor))
        .route("/debtors/{id}", put(debtors::update_debtor))
        .route("/roles", get(roles::list_roles).post(roles::create_role))
        .route(
            "/roles/{id}",
            put(roles::update_role).delete(roles::delete_role),
        )
        .route("/scores", post(scores::save_score))
        .route("/scores/top", get(scores::top_scores))
        .route("/scores/delete-all", delete(scores::delete_all_scores))
        .route("/logs", get(logs::get_logs))
        .route("/email/send", post(mailer::send_notification))
        .route("/docs", get(docs::docs_page))
        .route("/endpoints", get(docs::endpoints))
        .route("/live", get(docs::live))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
