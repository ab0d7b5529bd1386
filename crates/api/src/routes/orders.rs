//! Customer order view.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use domain::Order;
use store::CommerceStore;

use super::parse_order_id;
use crate::error::ApiError;
use crate::identity::Caller;
use crate::state::AppState;

/// GET /orders/{id}
///
/// Orders owned by someone else read as not found.
#[tracing::instrument(skip(state, caller), fields(user_id = %caller.user_id()))]
pub async fn get<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<Order>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let order = state
        .checkout
        .load_owned(caller.user_id(), order_id)
        .await?;
    Ok(Json(order))
}
