//! Defines the Axum API routes and handlers.

use std::sync::Arc;

use crate::roaster::Roaster;
use crate::web::models::{ErrorResponse, GainsBody, StatusResponse, TargetRequest};
use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::{get, post, put},
};
use roastero_shared::Recipe;

pub type AppState = Arc<Roaster>;

type ApiError = (StatusCode, Json<ErrorResponse>);

/// Creates the Axum router with all the API endpoints.
pub fn create_router(roaster: AppState) -> Router {
    Router::new()
        .route("/api/v1/status", get(get_status))
        .route("/api/v1/roast", post(start_roast))
        .route("/api/v1/roast/clear", post(clear_roast))
        .route("/api/v1/pid", get(get_gains).put(set_gains))
        .route("/api/v1/target", put(set_target))
        .with_state(roaster)
}

async fn get_status(State(roaster): State<AppState>) -> Json<StatusResponse> {
    let (status, roast_id) = roaster.status_with_roast_id().await;
    Json(StatusResponse { status, roast_id })
}

/// Starts a roast from the recipe in the body. Invalid recipes are rejected
/// with 422 and leave the roaster untouched.
async fn start_roast(
    State(roaster): State<AppState>,
    Json(recipe): Json<Recipe>,
) -> Result<StatusCode, ApiError> {
    match roaster.start_roast(&recipe).await {
        Ok(()) => Ok(StatusCode::ACCEPTED),
        Err(e) => {
            tracing::warn!("Rejected roast request: {}", e);
            Err((StatusCode::UNPROCESSABLE_ENTITY, Json(ErrorResponse::new(e))))
        }
    }
}

async fn clear_roast(State(roaster): State<AppState>) -> StatusCode {
    roaster.clear_roast().await;
    StatusCode::NO_CONTENT
}

async fn get_gains(State(roaster): State<AppState>) -> Json<GainsBody> {
    Json(roaster.gains().await.into())
}

async fn set_gains(
    State(roaster): State<AppState>,
    Json(gains): Json<GainsBody>,
) -> Result<Json<GainsBody>, ApiError> {
    if ![gains.p, gains.i, gains.d].iter().all(|g| g.is_finite() && *g >= 0.0) {
        return Err((
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(ErrorResponse::new("gains must be finite and non-negative")),
        ));
    }
    roaster.set_gains(gains.p, gains.i, gains.d).await;
    Ok(Json(gains))
}

async fn set_target(
    State(roaster): State<AppState>,
    Json(request): Json<TargetRequest>,
) -> Result<StatusCode, ApiError> {
    let max = roaster.config().roast.max_target_temp;
    if !(0..=max).contains(&request.target_temp) {
        return Err((
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(ErrorResponse::new(format!("target temperature must be within 0..={}", max))),
        ));
    }
    roaster.set_target_temp(request.target_temp).await;
    Ok(StatusCode::NO_CONTENT)
}
