use axum::http::Method;
use axum::Router;
use serde_json::{json, Value};

use super::http::{assert_status_ok_json, call_as};

/// Creates a study set with terms `word-0..` through the API and returns the
/// response `data`.
pub async fn create_study_set(app: &Router, user_id: &str, term_count: usize) -> Value {
    let terms: Vec<Value> = (0..term_count)
        .map(|i| json!({ "word": format!("word-{i}"), "definition": format!("def-{i}") }))
        .collect();
    let (status, body) = call_as(
        app,
        user_id,
        Method::POST,
        "/api/study-sets",
        Some(json!({ "title": "Fixture set", "terms": terms })),
    )
    .await;
    assert_status_ok_json(status, &body);
    body["data"].clone()
}

pub fn set_id(detail: &Value) -> String {
    detail["studySet"]["id"].as_str().expect("set id").to_string()
}

pub fn term_ids(detail: &Value) -> Vec<String> {
    detail["terms"]
        .as_array()
        .expect("terms")
        .iter()
        .map(|t| t["id"].as_str().expect("term id").to_string())
        .collect()
}

pub async fn start_session(app: &Router, user_id: &str, body: Value) -> String {
    let (status, resp) = call_as(app, user_id, Method::POST, "/api/learn/sessions", Some(body)).await;
    assert_status_ok_json(status, &resp);
    resp["data"]["sessionId"]
        .as_str()
        .expect("session id")
        .to_string()
}

/// Pulls the next term id, or `None` when the round is exhausted.
pub async fn next_term(app: &Router, user_id: &str, session_id: &str) -> Option<String> {
    let (status, body) = call_as(
        app,
        user_id,
        Method::GET,
        &format!("/api/learn/sessions/{session_id}/next"),
        None,
    )
    .await;
    assert_status_ok_json(status, &body);
    body["data"]["term"]["id"].as_str().map(str::to_string)
}

pub async fn grade(app: &Router, user_id: &str, session_id: &str, term_id: &str, correct: bool) -> Value {
    let (status, body) = call_as(
        app,
        user_id,
        Method::POST,
        &format!("/api/learn/sessions/{session_id}/grade"),
        Some(json!({ "termId": term_id, "correct": correct })),
    )
    .await;
    assert_status_ok_json(status, &body);
    body["data"].clone()
}
