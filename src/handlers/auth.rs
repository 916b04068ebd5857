use crate::error::AppResult;
use crate::state::AppState;
use crate::webauthn::types::*;
use crate::webauthn::{authentication, registration};
use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    Json,
};

// Extractor rejections are taken as `Result` so they become `AppError`s
// with a JSON body instead of axum's plain-text reply.

// Registration endpoints

pub async fn register_start(
    State(state): State<AppState>,
    payload: Result<Json<StartRequest>, JsonRejection>,
) -> AppResult<Json<RegistrationOptions>> {
    let Json(req) = payload?;
    let options = registration::begin_registration(&state, &req.username).await?;

    Ok(Json(options))
}

/// `GET /api/auth/register/start?username=...`
pub async fn register_start_query(
    State(state): State<AppState>,
    query: Result<Query<StartRequest>, QueryRejection>,
) -> AppResult<Json<RegistrationOptions>> {
    let Query(req) = query?;
    let options = registration::begin_registration(&state, &req.username).await?;

    Ok(Json(options))
}

pub async fn register_finish(
    State(state): State<AppState>,
    payload: Result<Json<FinishRequest>, JsonRejection>,
) -> AppResult<Json<Verification>> {
    let Json(req) = payload?;
    let verification =
        registration::finish_registration(&state, &req.username, &req.credential).await?;

    Ok(Json(verification))
}

// Authentication endpoints

pub async fn authenticate_start(
    State(state): State<AppState>,
    payload: Result<Json<StartRequest>, JsonRejection>,
) -> AppResult<Json<AuthenticationOptions>> {
    let Json(req) = payload?;
    let options = authentication::begin_authentication(&state, &req.username).await?;

    Ok(Json(options))
}

/// `GET /api/auth/authenticate/start?username=...`
pub async fn authenticate_start_query(
    State(state): State<AppState>,
    query: Result<Query<StartRequest>, QueryRejection>,
) -> AppResult<Json<AuthenticationOptions>> {
    let Query(req) = query?;
    let options = authentication::begin_authentication(&state, &req.username).await?;

    Ok(Json(options))
}

pub async fn authenticate_finish(
    State(state): State<AppState>,
    payload: Result<Json<FinishRequest>, JsonRejection>,
) -> AppResult<Json<Verification>> {
    let Json(req) = payload?;
    let verification =
        authentication::finish_authentication(&state, &req.username, &req.credential).await?;

    Ok(Json(verification))
}
