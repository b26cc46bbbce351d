use axum::{
    Json,
    extract::State,
    http::{HeaderMap, StatusCode},
};

use crate::AppState;
use crate::config::Config;
use crate::constants::*;
use crate::models::{
    DeleteScoresResponse, SaveScoreResponse, ScorePayload, ScoreRow, TopScoresResponse,
};
use crate::utils::{ApiError, bad_request, db_error, unauthorized};

/// Coarse anti-abuse gate shared by all score routes: when a master token
/// is configured, the X-Master-Token header must match; when it is not,
/// the leaderboard is open.
fn check_master_token(config: &Config, headers: &HeaderMap) -> Result<(), ApiError> {
    let Some(expected) = config.master_token.as_deref() else {
        return Ok(());
    };
    let presented = headers.get("x-master-token").and_then(|v| v.to_str().ok());
    if presented == Some(expected) {
        Ok(())
    } else {
        Err(unauthorized("Token maestro inválido"))
    }
}

/// Keeps only word characters, whitespace and hyphens, then trims and
/// truncates to the storage limit.
pub fn sanitize_text(input: &str) -> String {
    let cleaned: String = input
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '-' || c.is_whitespace())
        .collect();
    cleaned.trim().chars().take(SCORE_TEXT_MAX_LENGTH).collect()
}

fn truncated_header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim_matches('"'))
        .map(sanitize_text)
        .filter(|v| !v.is_empty())
}

/// POST /scores — stores a leaderboard entry with sanitized text fields and
/// header-derived platform/user-agent metadata.
pub async fn save_score(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<ScorePayload>,
) -> Result<(StatusCode, Json<SaveScoreResponse>), ApiError> {
    check_master_token(&state.config, &headers)?;

    let name = sanitize_text(payload.name.as_deref().unwrap_or_default());
    if name.is_empty() {
        return Err(bad_request("Se requiere el nombre del jugador"));
    }
    let Some(score) = payload.score else {
        return Err(bad_request("Se requiere la puntuación"));
    };
    if score < 0 {
        return Err(bad_request("La puntuación no puede ser negativa"));
    }
    let Some(timestamp) = payload.timestamp else {
        return Err(bad_request("Se requiere el timestamp"));
    };
    let session_id = sanitize_text(payload.session_id.as_deref().unwrap_or_default());
    if session_id.is_empty() {
        return Err(bad_request("Se requiere el identificador de sesión"));
    }
    let Some(game_duration) = payload.game_duration else {
        return Err(bad_request("Se requiere la duración de la partida"));
    };
    let Some(interaction_count) = payload.interaction_count else {
        return Err(bad_request("Se requiere el número de interacciones"));
    };

    let game_version = payload.game_version.as_deref().map(sanitize_text);
    let platform = truncated_header(&headers, "sec-ch-ua-platform");
    let user_agent = truncated_header(&headers, "user-agent");

    let id = {
        let conn = state.db.write().await;
        conn.execute(
            r#"
            INSERT INTO scores
                (name, score, timestamp, session_id, is_valid, game_duration,
                 interaction_count, game_version, platform, user_agent)
            VALUES (?, ?, ?, ?, 1, ?, ?, ?, ?, ?)
            "#,
            (
                name.as_str(),
                score,
                timestamp,
                session_id.as_str(),
                game_duration,
                interaction_count,
                game_version.as_deref(),
                platform.as_deref(),
                user_agent.as_deref(),
            ),
        )
        .await
        .map_err(|_| db_error())?;
        conn.last_insert_rowid()
    };

    Ok((
        StatusCode::CREATED,
        Json(SaveScoreResponse {
            mensaje: "Puntuación guardada".to_string(),
            id,
        }),
    ))
}

/// GET /scores/top — the ten best valid scores, best first; ties break
/// toward the earlier submission.
pub async fn top_scores(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<(StatusCode, Json<TopScoresResponse>), ApiError> {
    check_master_token(&state.config, &headers)?;

    let conn = state.db.read().await;
    let mut rows = conn
        .query(
            r#"
            SELECT name, score, timestamp, session_id, game_duration,
                   interaction_count, game_version, platform, user_agent, created_at
            FROM scores
            WHERE is_valid = 1
            ORDER BY score DESC, timestamp ASC
            LIMIT ?
            "#,
            [TOP_SCORES_LIMIT as i64],
        )
        .await
        .map_err(|_| db_error())?;

    let mut scores = Vec::new();
    while let Some(row) = rows.next().await.map_err(|_| db_error())? {
        scores.push(ScoreRow {
            name: row.get(0).map_err(|_| db_error())?,
            score: row.get(1).map_err(|_| db_error())?,
            timestamp: row.get(2).map_err(|_| db_error())?,
            session_id: row.get(3).map_err(|_| db_error())?,
            game_duration: row.get(4).map_err(|_| db_error())?,
            interaction_count: row.get(5).map_err(|_| db_error())?,
            game_version: row.get(6).map_err(|_| db_error())?,
            platform: row.get(7).map_err(|_| db_error())?,
            user_agent: row.get(8).map_err(|_| db_error())?,
            created_at: row.get(9).map_err(|_| db_error())?,
        });
    }

    Ok((
        StatusCode::OK,
        Json(TopScoresResponse {
            mensaje: "Top de puntuaciones".to_string(),
            scores,
        }),
    ))
}

/// DELETE /scores/delete-all — wipes the leaderboard, returns the count.
pub async fn delete_all_scores(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<(StatusCode, Json<DeleteScoresResponse>), ApiError> {
    check_master_token(&state.config, &headers)?;

    let deleted = {
        let conn = state.db.write().await;
        conn.execute("DELETE FROM scores", ())
            .await
            .map_err(|_| db_error())?
    };

    Ok((
        StatusCode::OK,
        Json(DeleteScoresResponse {
            mensaje: "Puntuaciones eliminadas".to_string(),
            deleted,
        }),
    ))
}
