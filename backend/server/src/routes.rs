use std::sync::Arc;

use axum::{
    Json,
    extract::{self, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Serialize;
use tracing::{debug, info};

use crate::{
    accounts::{self, HistoryResponse, RegisterRequest, RegisterResponse},
    auth::{Identity, Verifier},
    credits::{self, AddCreditsRequest, AddCreditsResponse, RedeemRequest, RedeemResponse},
    error::AppError,
    game::{self, GameData},
    models::Profile,
    results::{self, DrawsResponse, ResultsResponse},
    state::State,
    store::Store,
    tickets::{self, BuyTicketRequest, BuyTicketResponse},
};

type AppState<S, V> = extract::State<Arc<State<S, V>>>;

#[derive(Serialize)]
pub struct Success {
    success: bool,
}

fn payload<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    payload.map(|Json(body)| body).map_err(|e| {
        debug!("Rejected payload: {e}");
        AppError::MalformedPayload
    })
}

pub async fn game_data_handler<S: Store, V: Verifier>(
    extract::State(state): AppState<S, V>,
    identity: Identity,
) -> Result<Json<GameData>, AppError> {
    Ok(Json(game::game_data(&state.store, &identity.uid).await?))
}

pub async fn buy_ticket_handler<S: Store, V: Verifier>(
    extract::State(state): AppState<S, V>,
    identity: Identity,
    body: Result<Json<BuyTicketRequest>, JsonRejection>,
) -> Result<Json<BuyTicketResponse>, AppError> {
    let request = payload(body)?;

    Ok(Json(
        tickets::buy_ticket(&state.store, &identity.uid, request).await?,
    ))
}

pub async fn add_credits_handler<S: Store, V: Verifier>(
    extract::State(state): AppState<S, V>,
    identity: Identity,
    body: Result<Json<AddCreditsRequest>, JsonRejection>,
) -> Result<Json<AddCreditsResponse>, AppError> {
    let request = payload(body)?;

    Ok(Json(
        credits::add_credits(
            &state.store,
            &identity.uid,
            request,
            state.config.max_top_up,
        )
        .await?,
    ))
}

pub async fn redeem_code_handler<S: Store, V: Verifier>(
    extract::State(state): AppState<S, V>,
    identity: Identity,
    body: Result<Json<RedeemRequest>, JsonRejection>,
) -> Result<Json<RedeemResponse>, AppError> {
    let request = payload(body)?;

    Ok(Json(
        credits::redeem_code(&state.store, &identity.uid, request).await?,
    ))
}

pub async fn register_handler<S: Store, V: Verifier>(
    extract::State(state): AppState<S, V>,
    identity: Identity,
    body: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<Json<RegisterResponse>, AppError> {
    // an empty body is a plain sign-in without sponsor
    let request = match body {
        Err(JsonRejection::MissingJsonContentType(_)) => RegisterRequest::default(),
        body => payload(body)?,
    };

    Ok(Json(
        accounts::register(
            &state.store,
            &identity,
            request,
            state.config.welcome_credits,
        )
        .await?,
    ))
}

pub async fn complete_profile_handler<S: Store, V: Verifier>(
    extract::State(state): AppState<S, V>,
    identity: Identity,
    body: Result<Json<Profile>, JsonRejection>,
) -> Result<Json<Success>, AppError> {
    let profile = payload(body)?;
    accounts::complete_profile(&state.store, &identity.uid, profile).await?;

    Ok(Json(Success { success: true }))
}

pub async fn history_handler<S: Store, V: Verifier>(
    extract::State(state): AppState<S, V>,
    identity: Identity,
) -> Result<Json<HistoryResponse>, AppError> {
    Ok(Json(accounts::history(&state.store, &identity.uid).await?))
}

pub async fn results_handler<S: Store, V: Verifier>(
    extract::State(state): AppState<S, V>,
    _identity: Identity,
) -> Result<Json<ResultsResponse>, AppError> {
    Ok(Json(results::results(&state.store).await?))
}

pub async fn draws_handler<S: Store, V: Verifier>(
    extract::State(state): AppState<S, V>,
    _identity: Identity,
) -> Result<Json<DrawsResponse>, AppError> {
    Ok(Json(results::draws(&state.store).await?))
}

pub async fn probe_handler<S: Store, V: Verifier>(
    extract::State(state): AppState<S, V>,
) -> Result<impl IntoResponse, AppError> {
    state.store.ping().await?;
    info!("Store probe succeeded");

    Ok((StatusCode::OK, "Connexion au store OK!"))
}
