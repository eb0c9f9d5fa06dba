use axum::extract::{Path, State};
use axum::routing::{get, patch, post, put};
use axum::Router;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::auth::AuthUser;
use crate::extractors::JsonBody;
use crate::learn::types::{AnswerMode, LearnMode};
use crate::response::{created, ok, AppError};
use crate::state::AppState;
use crate::store::operations::containers::Container;
use crate::store::operations::study_sets::{StoredTerm, StudySet};
use crate::validation;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_study_sets).post(create_study_set))
        .route("/:id", get(get_study_set))
        .route(
            "/:id/starred/:term_id",
            put(star_term).delete(unstar_term),
        )
        .route("/:id/learn-settings", patch(update_learn_settings))
        .route("/:id/learn/reset", post(reset_learn_progress))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateTermRequest {
    word: String,
    definition: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateStudySetRequest {
    title: String,
    description: Option<String>,
    terms: Vec<CreateTermRequest>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StudySetDetail {
    study_set: StudySet,
    terms: Vec<StoredTerm>,
    container: Container,
}

async fn create_study_set(
    auth: AuthUser,
    State(state): State<AppState>,
    JsonBody(req): JsonBody<CreateStudySetRequest>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    let description = req.description.unwrap_or_default();
    validation::validate_title(&req.title)
        .map_err(|m| AppError::bad_request("STUDY_SET_INVALID_TITLE", m))?;
    validation::validate_description(&description)
        .map_err(|m| AppError::bad_request("STUDY_SET_INVALID_DESCRIPTION", m))?;
    validation::validate_term_count(req.terms.len())
        .map_err(|m| AppError::bad_request("STUDY_SET_INVALID_TERMS", m))?;
    for term in &req.terms {
        validation::validate_term_text(&term.word, &term.definition)
            .map_err(|m| AppError::bad_request("STUDY_SET_INVALID_TERMS", m))?;
    }

    let now = Utc::now();
    let study_set = StudySet {
        id: uuid::Uuid::new_v4().to_string(),
        user_id: auth.user_id.clone(),
        title: req.title.trim().to_string(),
        description,
        created_at: now,
        updated_at: now,
    };
    let terms: Vec<StoredTerm> = req
        .terms
        .into_iter()
        .enumerate()
        .map(|(rank, t)| StoredTerm {
            id: uuid::Uuid::new_v4().to_string(),
            study_set_id: study_set.id.clone(),
            word: t.word,
            definition: t.definition,
            rank: rank as i64,
        })
        .collect();

    state.store().create_study_set(&study_set, &terms)?;
    tracing::info!(set_id = %study_set.id, terms = terms.len(), "Study set created");

    let container = Container::new(&auth.user_id, &study_set.id);
    Ok(created(StudySetDetail {
        study_set,
        terms,
        container,
    }))
}

async fn list_study_sets(
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    let sets = state.store().list_user_study_sets(&auth.user_id)?;
    Ok(ok(sets))
}

async fn get_study_set(
    auth: AuthUser,
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    let study_set = state.store().require_study_set(&id)?;
    let terms = state.store().list_terms(&id)?;
    let container = state.store().touch_container(&auth.user_id, &id)?;

    Ok(ok(StudySetDetail {
        study_set,
        terms,
        container,
    }))
}

async fn star_term(
    auth: AuthUser,
    Path((id, term_id)): Path<(String, String)>,
    State(state): State<AppState>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    state.store().require_study_set(&id)?;
    let container = state.store().star_term(&auth.user_id, &id, &term_id)?;
    Ok(ok(container))
}

async fn unstar_term(
    auth: AuthUser,
    Path((id, term_id)): Path<(String, String)>,
    State(state): State<AppState>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    state.store().require_study_set(&id)?;
    let container = state.store().unstar_term(&auth.user_id, &id, &term_id)?;
    Ok(ok(container))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LearnSettingsRequest {
    learn_mode: Option<LearnMode>,
    answer_mode: Option<AnswerMode>,
    shuffle_learn: Option<bool>,
    study_starred: Option<bool>,
}

/// Preferences apply to sessions started afterwards; a running session keeps its mode.
async fn update_learn_settings(
    auth: AuthUser,
    Path(id): Path<String>,
    State(state): State<AppState>,
    JsonBody(req): JsonBody<LearnSettingsRequest>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    state.store().require_study_set(&id)?;
    let container = state.store().update_container(&auth.user_id, &id, |c| {
        if let Some(mode) = req.learn_mode {
            c.learn_mode = mode;
        }
        if let Some(mode) = req.answer_mode {
            c.answer_mode = mode;
        }
        if let Some(shuffle) = req.shuffle_learn {
            c.shuffle_learn = shuffle;
        }
        if let Some(starred) = req.study_starred {
            c.study_starred = starred;
        }
    })?;
    Ok(ok(container))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ResetResponse {
    removed_records: usize,
    closed_sessions: usize,
}

async fn reset_learn_progress(
    auth: AuthUser,
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    state.store().require_study_set(&id)?;

    // 进度被清空，活跃会话的未落盘记录直接丢弃
    let closed = state.registry().remove_for_set(&auth.user_id, &id).await;
    let closed_sessions = closed.len();
    drop(closed);

    let removed_records = state.store().reset_learn_progress(&auth.user_id, &id)?;
    Ok(ok(ResetResponse {
        removed_records,
        closed_sessions,
    }))
}
