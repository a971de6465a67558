mod health;
mod metrics;
mod predict;

use crate::{auth::require_api_key, model_service::ModelService, server::SharedState};
use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};

pub use health::healthcheck;
pub use metrics::metrics_handler;
pub use predict::{predict_image, PredictionResponse};

/// `/health` and `/metrics` are open, `/predict` sits behind the API key.
pub fn api_routes<M: ModelService>(state: SharedState<M>, body_limit_bytes: usize) -> Router {
    let guarded: Router<SharedState<M>> = Router::new()
        .route("/predict", post(predict_image::<M>))
        .route_layer(middleware::from_fn_with_state(
            state.api_key.clone(),
            require_api_key,
        ));

    Router::new()
        .route("/health", get(healthcheck))
        .route("/metrics", get(metrics_handler::<M>))
        .merge(guarded)
        .layer(DefaultBodyLimit::max(body_limit_bytes))
        .with_state(state)
}
