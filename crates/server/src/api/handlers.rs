use axum::{extract::State, Json};
use serde::Serialize;
use std::sync::Arc;
use transmute_core::format::{capabilities, known_tags, targets_for, Capability, Family};
use transmute_core::{FormatTag, SanitizedConfig};

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub converter: String,
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        converter: state.converter().name().to_string(),
    })
}

pub async fn get_config(State(state): State<Arc<AppState>>) -> Json<SanitizedConfig> {
    Json(state.sanitized_config())
}

/// One known format and everything it converts into.
#[derive(Serialize)]
pub struct FormatInfo {
    pub tag: FormatTag,
    pub family: Family,
    pub mime_type: &'static str,
    pub targets: Vec<FormatTag>,
}

#[derive(Serialize)]
pub struct FormatsResponse {
    pub capabilities: &'static [Capability],
    pub formats: Vec<FormatInfo>,
}

pub async fn list_formats() -> Json<FormatsResponse> {
    let formats = known_tags()
        .map(|tag| FormatInfo {
            family: tag.family(),
            mime_type: tag.mime_type(),
            targets: targets_for(&tag),
            tag,
        })
        .collect();

    Json(FormatsResponse {
        capabilities: capabilities(),
        formats,
    })
}
