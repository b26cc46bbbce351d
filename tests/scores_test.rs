/*!
 * Leaderboard Integration Tests
 *
 * Covers text sanitization, score submission validation, the top-ten query
 * over valid entries, and the master-token gate shared by all three routes.
 */

mod common;

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use common::*;
use home_finance_server::AppState;
use home_finance_server::constants::SCORE_TEXT_MAX_LENGTH;
use home_finance_server::models::ScorePayload;
use home_finance_server::scores::{delete_all_scores, sanitize_text, save_score, top_scores};

fn payload(name: &str, score: i64) -> ScorePayload {
    ScorePayload {
        name: Some(name.to_string()),
        score: Some(score),
        timestamp: Some(1_700_000_000),
        session_id: Some("sesion-1".to_string()),
        game_duration: Some(90),
        interaction_count: Some(42),
        game_version: None,
    }
}

fn master_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert("x-master-token", HeaderValue::from_static(TEST_MASTER_TOKEN));
    headers
}

/// State with no master token configured, so the leaderboard is open.
async fn open_state() -> AppState {
    let mut state = setup_state().await;
    let mut config = test_config();
    config.master_token = None;
    state.config = Arc::new(config);
    state
}

#[test]
fn sanitize_keeps_word_characters_spaces_and_hyphens() {
    assert_eq!(sanitize_text("<script>alert('x')</script>"), "scriptalertxscript");
    assert_eq!(sanitize_text("ana-maría_99"), "ana-maría_99");
    assert_eq!(sanitize_text("ana & bob; \"ok\""), "ana  bob ok");
    assert_eq!(sanitize_text("  espacios  "), "espacios");

    let long = "a".repeat(500);
    assert_eq!(sanitize_text(&long).chars().count(), SCORE_TEXT_MAX_LENGTH);
}

#[tokio::test]
async fn numeric_fields_accept_strings() {
    // Some game builds serialize every field as a string.
    let raw = serde_json::json!({
        "name": "jugadora",
        "score": "150",
        "timestamp": 1_700_000_000,
        "session_id": "sesion-2",
        "game_duration": " 90 ",
        "interaction_count": "42"
    });
    let parsed: ScorePayload = serde_json::from_value(raw).expect("string numbers parse");
    assert_eq!(parsed.score, Some(150));
    assert_eq!(parsed.game_duration, Some(90));
    assert_eq!(parsed.interaction_count, Some(42));

    let state = open_state().await;
    let (status, _) = save_score(State(state), HeaderMap::new(), Json(parsed))
        .await
        .expect("coerced payload should save");
    assert_eq!(status, StatusCode::CREATED);

    let raw = serde_json::json!({ "name": "jugadora", "score": "no-numérico" });
    assert!(serde_json::from_value::<ScorePayload>(raw).is_err());
}

#[tokio::test]
async fn save_score_sanitizes_and_reads_platform_header() {
    let state = open_state().await;

    let mut headers = HeaderMap::new();
    headers.insert("sec-ch-ua-platform", HeaderValue::from_static("\"Linux\""));
    headers.insert("user-agent", HeaderValue::from_static("Mozilla/5.0 test"));

    let (status, Json(body)) = save_score(
        State(state.clone()),
        headers,
        Json(payload("<jugadora>", 120)),
    )
    .await
    .expect("save should succeed");
    assert_eq!(status, StatusCode::CREATED);
    assert!(body.id > 0);

    let conn = state.db.read().await;
    let mut rows = conn
        .query(
            "SELECT name, is_valid, platform FROM scores WHERE id = ?",
            [body.id],
        )
        .await
        .unwrap();
    let row = rows.next().await.unwrap().unwrap();
    let name: String = row.get(0).unwrap();
    let is_valid: i64 = row.get(1).unwrap();
    let platform: Option<String> = row.get(2).unwrap();
    assert_eq!(name, "jugadora");
    assert_eq!(is_valid, 1);
    assert_eq!(platform.as_deref(), Some("Linux"));
}

#[tokio::test]
async fn save_score_requires_every_field() {
    let state = open_state().await;

    let cases = [
        ScorePayload {
            name: None,
            ..payload("jugadora", 10)
        },
        ScorePayload {
            name: Some("<>&;".to_string()),
            ..payload("jugadora", 10)
        },
        ScorePayload {
            score: None,
            ..payload("jugadora", 10)
        },
        ScorePayload {
            timestamp: None,
            ..payload("jugadora", 10)
        },
        ScorePayload {
            session_id: None,
            ..payload("jugadora", 10)
        },
        ScorePayload {
            game_duration: None,
            ..payload("jugadora", 10)
        },
        ScorePayload {
            interaction_count: None,
            ..payload("jugadora", 10)
        },
    ];
    for case in cases {
        let err = save_score(State(state.clone()), HeaderMap::new(), Json(case))
            .await
            .expect_err("incomplete payload should fail");
        assert_eq!(err.0, StatusCode::BAD_REQUEST);
    }

    let err = save_score(
        State(state),
        HeaderMap::new(),
        Json(payload("jugadora", -1)),
    )
    .await
    .expect_err("negative score should fail");
    assert_eq!(err.0, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn top_scores_returns_ten_best_valid_entries() {
    let state = open_state().await;

    // 12 valid entries plus a huge invalid one that must not surface.
    for i in 0..12 {
        insert_test_score(&state.db, &format!("jugador{}", i), i * 10, 1_700_000_000 + i, true)
            .await;
    }
    insert_test_score(&state.db, "tramposo", 99_999, 1_700_000_100, false).await;

    let (status, Json(body)) = top_scores(State(state), HeaderMap::new())
        .await
        .expect("query should succeed");
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.scores.len(), 10);
    assert_eq!(body.scores[0].name, "jugador11");
    assert_eq!(body.scores[0].score, 110);
    assert!(body.scores.iter().all(|s| s.name != "tramposo"));

    // Strictly non-increasing.
    for pair in body.scores.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
}

#[tokio::test]
async fn configured_master_token_gates_every_route() {
    let state = setup_state().await;

    let err = save_score(
        State(state.clone()),
        HeaderMap::new(),
        Json(payload("jugadora", 10)),
    )
    .await
    .expect_err("missing token should fail");
    assert_eq!(err.0, StatusCode::UNAUTHORIZED);

    let mut wrong = HeaderMap::new();
    wrong.insert("x-master-token", HeaderValue::from_static("incorrecto"));
    let err = top_scores(State(state.clone()), wrong)
        .await
        .expect_err("wrong token should fail");
    assert_eq!(err.0, StatusCode::UNAUTHORIZED);

    let (status, _) = save_score(
        State(state.clone()),
        master_headers(),
        Json(payload("jugadora", 10)),
    )
    .await
    .expect("right token should succeed");
    assert_eq!(status, StatusCode::CREATED);

    let (status, Json(body)) = delete_all_scores(State(state), master_headers())
        .await
        .expect("right token should succeed");
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.deleted, 1);
}

#[tokio::test]
async fn delete_all_is_open_when_no_master_token_is_configured() {
    let state = open_state().await;
    insert_test_score(&state.db, "jugadora", 10, 1_700_000_000, true).await;

    let (status, Json(body)) = delete_all_scores(State(state.clone()), HeaderMap::new())
        .await
        .expect("open leaderboard should accept the wipe");
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.deleted, 1);

    let (_, Json(top)) = top_scores(State(state), HeaderMap::new())
        .await
        .expect("query should succeed");
    assert!(top.scores.is_empty());
}
