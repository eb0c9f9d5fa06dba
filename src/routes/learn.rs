use std::collections::HashMap;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::Router;
use serde::{Deserialize, Serialize};

use crate::auth::AuthUser;
use crate::extractors::JsonBody;
use crate::learn::initializer::build_pool;
use crate::learn::session::{GradeOutcome, LearnSession, RoundTransition, SessionContext};
use crate::learn::source::{RecordStore, TermSource};
use crate::learn::types::{AnswerMode, LearnMode, SessionStats, TermRecord};
use crate::learn::ModeConfig;
use crate::response::{created, ok, AppError};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/sessions", post(start_session))
        .route("/sessions/:id", get(get_session).delete(close_session))
        .route("/sessions/:id/next", get(next_term))
        .route("/sessions/:id/grade", post(grade_term))
        .route("/sessions/:id/advance", post(advance_round))
        .route("/sessions/:id/reshuffle", post(reshuffle))
}

/// Per-session overrides on top of the learner's saved preferences.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartSessionRequest {
    study_set_id: String,
    learn_mode: Option<LearnMode>,
    answer_mode: Option<AnswerMode>,
    starred_only: Option<bool>,
    shuffle: Option<bool>,
    mastery_threshold: Option<u32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionView {
    session_id: String,
    study_set_id: String,
    review_only: bool,
    starred_only: bool,
    answer_mode: AnswerMode,
    mastery_threshold: u32,
    stats: SessionStats,
}

impl SessionView {
    fn of(session: &LearnSession) -> Self {
        let mode = session.mode();
        Self {
            session_id: session.id().to_string(),
            study_set_id: session.set_id().to_string(),
            review_only: mode.review_only,
            starred_only: mode.starred_only,
            answer_mode: mode.answer_mode,
            mastery_threshold: session.mastery_threshold(),
            stats: session.stats(),
        }
    }
}

async fn start_session(
    auth: AuthUser,
    State(state): State<AppState>,
    JsonBody(req): JsonBody<StartSessionRequest>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    let set_id = req.study_set_id.as_str();
    let terms = state.store().terms_for_set(set_id)?;
    let container = state.store().get_or_default_container(&auth.user_id, set_id)?;

    let mut mode = container.mode_config();
    if let Some(learn_mode) = req.learn_mode {
        mode.review_only = learn_mode == LearnMode::Review;
    }
    if let Some(answer_mode) = req.answer_mode {
        mode.answer_mode = answer_mode;
    }
    if let Some(starred_only) = req.starred_only {
        mode.starred_only = starred_only;
    }
    if let Some(shuffle) = req.shuffle {
        mode.shuffle = shuffle;
    }
    mode.mastery_threshold = req.mastery_threshold;
    mode.validate()?;

    // 同一用户同一学习集只保留一个会话；旧会话尚未落盘的改动比存储更新
    let previous = state.registry().remove_for_set(&auth.user_id, set_id).await;
    let mut records: HashMap<String, TermRecord> = state
        .store()
        .learn_records(&auth.user_id, set_id)?
        .into_iter()
        .map(|r| (r.term_id.clone(), r))
        .collect();
    let mut live_round = 0;
    for old in &previous {
        if !old.mode().review_only {
            live_round = live_round.max(old.round());
        }
        for record in old.changed_records() {
            records.insert(record.term_id.clone(), record);
        }
    }
    state.retire_sessions(previous).await;

    let records: Vec<TermRecord> = records.into_values().collect();
    let start_round = starting_round(&mode, container.learn_round.max(live_round), &records);
    let pool = build_pool(terms, records, &mode)?;

    let session = LearnSession::new(
        SessionContext {
            user_id: auth.user_id.clone(),
            set_id: set_id.to_string(),
            start_round,
        },
        pool,
        mode,
        state.scheduler(),
        state.record_sink(),
    )?;
    let view = SessionView::of(&session);

    let replaced = state.registry().insert(session).await;
    state.retire_sessions(replaced).await;

    Ok(created(view))
}

/// Learn passes resume the saved round. A review pass opens a fresh round so
/// every admitted term is presented again.
fn starting_round(mode: &ModeConfig, saved_round: u32, records: &[TermRecord]) -> u32 {
    if !mode.review_only {
        return saved_round.max(1);
    }
    let last_seen = records
        .iter()
        .filter_map(|r| r.appeared_in_round)
        .max()
        .unwrap_or(0);
    saved_round.max(last_seen) + 1
}

async fn with_session<T, F>(
    state: &AppState,
    session_id: &str,
    user_id: &str,
    f: F,
) -> Result<T, AppError>
where
    F: FnOnce(&mut LearnSession) -> Result<T, AppError>,
{
    let slot = state
        .registry()
        .get(session_id, user_id)
        .await
        .ok_or_else(|| AppError::not_found("Learn session not found"))?;
    let mut slot = slot.lock().await;
    let session = slot
        .session_mut()
        .ok_or_else(|| AppError::not_found("Learn session not found"))?;
    f(session)
}

async fn get_session(
    auth: AuthUser,
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    let view = with_session(&state, &id, &auth.user_id, |s| Ok(SessionView::of(s))).await?;
    Ok(ok(view))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TermView {
    id: String,
    word: String,
    definition: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct NextTermResponse {
    round: u32,
    round_complete: bool,
    session_complete: bool,
    term: Option<TermView>,
    record: Option<TermRecord>,
}

async fn next_term(
    auth: AuthUser,
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    let response = with_session(&state, &id, &auth.user_id, |s| {
        let round = s.round();
        let picked = s.select_next().map(|entry| {
            let term = TermView {
                id: entry.term.id.clone(),
                word: entry.term.word.clone(),
                definition: entry.term.definition.clone(),
            };
            (term, entry.record.clone())
        });
        match picked {
            Ok((term, record)) => Ok(NextTermResponse {
                round,
                round_complete: false,
                session_complete: false,
                term: Some(term),
                record: Some(record),
            }),
            Err(e) if e.is_completion_signal() => Ok(NextTermResponse {
                round,
                round_complete: true,
                session_complete: s.is_complete(),
                term: None,
                record: None,
            }),
            Err(e) => Err(e.into()),
        }
    })
    .await?;
    Ok(ok(response))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GradeRequest {
    term_id: String,
    correct: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GradeResponse {
    #[serde(flatten)]
    outcome: GradeOutcome,
    stats: SessionStats,
}

async fn grade_term(
    auth: AuthUser,
    Path(id): Path<String>,
    State(state): State<AppState>,
    JsonBody(req): JsonBody<GradeRequest>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    let response = with_session(&state, &id, &auth.user_id, |s| {
        let outcome = s.grade(&req.term_id, req.correct)?;
        Ok(GradeResponse {
            outcome,
            stats: s.stats(),
        })
    })
    .await?;
    Ok(ok(response))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AdvanceResponse {
    transition: RoundTransition,
    stats: SessionStats,
}

async fn advance_round(
    auth: AuthUser,
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    let response = with_session(&state, &id, &auth.user_id, |s| {
        let transition = s.advance_round()?;
        Ok(AdvanceResponse {
            transition,
            stats: s.stats(),
        })
    })
    .await?;
    Ok(ok(response))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ReshuffleResponse {
    moved: usize,
    stats: SessionStats,
}

async fn reshuffle(
    auth: AuthUser,
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    let response = with_session(&state, &id, &auth.user_id, |s| {
        let moved = s.reshuffle();
        Ok(ReshuffleResponse {
            moved,
            stats: s.stats(),
        })
    })
    .await?;
    Ok(ok(response))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CloseResponse {
    session_id: String,
    closed: bool,
}

async fn close_session(
    auth: AuthUser,
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    let session = state
        .registry()
        .remove(&id, &auth.user_id)
        .await
        .ok_or_else(|| AppError::not_found("Learn session not found"))?;
    state.retire_sessions(vec![session]).await;

    Ok(ok(CloseResponse {
        session_id: id,
        closed: true,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seen(id: &str, round: u32) -> TermRecord {
        TermRecord {
            appeared_in_round: Some(round),
            ..TermRecord::fresh(id)
        }
    }

    #[test]
    fn learn_mode_resumes_saved_round() {
        let mode = ModeConfig::default();
        assert_eq!(starting_round(&mode, 3, &[seen("a", 3)]), 3);
        assert_eq!(starting_round(&mode, 0, &[]), 1);
    }

    #[test]
    fn review_opens_a_fresh_round() {
        let mode = ModeConfig {
            review_only: true,
            ..ModeConfig::default()
        };
        assert_eq!(starting_round(&mode, 2, &[seen("a", 2)]), 3);
        assert_eq!(starting_round(&mode, 1, &[seen("a", 4)]), 5);
    }
}
