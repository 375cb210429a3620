use axum::{extract::rejection::JsonRejection, extract::State, routing::post, Json, Router};
use tracing::instrument;

use crate::{
    auth::dto::AuthResponse,
    error::AppError,
    payments::{
        dto::{CreateOrderRequest, CreateOrderResponse, VerifyPaymentRequest},
        services::{self, PaymentClaim},
    },
    state::AppState,
};

pub fn payment_routes() -> Router<AppState> {
    Router::new()
        .route("/payment/create-order", post(create_order))
        .route("/payment/verify", post(verify))
}

#[instrument(skip(state, payload))]
pub async fn create_order(
    State(state): State<AppState>,
    payload: Result<Json<CreateOrderRequest>, JsonRejection>,
) -> Result<Json<CreateOrderResponse>, AppError> {
    let Json(payload) = payload?;
    let order = services::create_order(&state, payload).await?;
    Ok(Json(CreateOrderResponse {
        order_id: order.id,
        amount: order.amount,
        currency: order.currency,
    }))
}

#[instrument(skip(state, payload))]
pub async fn verify(
    State(state): State<AppState>,
    payload: Result<Json<VerifyPaymentRequest>, JsonRejection>,
) -> Result<Json<AuthResponse>, AppError> {
    let Json(payload) = payload?;
    let claim = PaymentClaim::try_from(payload)?;
    let provisioned = services::verify_and_provision(&state, claim).await?;
    Ok(Json(AuthResponse {
        message: "Payment verified and course purchased successfully",
        token: provisioned.token,
        user: provisioned.user,
    }))
}
