// Route definitions for the coderun API

use axum::{
    routing::{get, post},
    Router,
};
use coderun_engine::Transport;
use std::sync::Arc;

use crate::{handlers, AppState};

pub fn build_router<T: Transport + 'static>(state: Arc<AppState<T>>) -> Router {
    Router::new()
        .route("/execute", post(handlers::execute::<T>))
        .route("/languages", get(handlers::list_languages::<T>))
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::prometheus_metrics))
        .with_state(state)
}
