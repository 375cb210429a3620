use axum::{extract::State, routing::get, Json, Router};
use tracing::{instrument, warn};

use crate::{
    auth::jwt::AuthUser,
    error::AppError,
    state::AppState,
    users::dto::{ProfileResponse, ProfileUser, PurchaseView},
};

pub fn user_routes() -> Router<AppState> {
    Router::new().route("/user/profile", get(profile))
}

#[instrument(skip_all)]
pub async fn profile(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
) -> Result<Json<ProfileResponse>, AppError> {
    let user = state
        .users
        .find_by_id(claims.user_id)
        .await
        .map_err(AppError::internal)?
        .ok_or_else(|| {
            warn!(user_id = %claims.user_id, "token subject no longer exists");
            AppError::NotFound("User not found".into())
        })?;

    let purchases = state
        .purchases
        .list_by_user(user.id)
        .await
        .map_err(AppError::internal)?;

    Ok(Json(ProfileResponse {
        user: ProfileUser::from(user),
        purchases: purchases.into_iter().map(PurchaseView::from).collect(),
    }))
}
