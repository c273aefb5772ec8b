pub mod handlers;

pub use handlers::*;

use crate::service::SearchOrchestrator;
use axum::{
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;

/// 匹配结果与设置接口
pub fn router(orchestrator: Arc<SearchOrchestrator>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/match/result", get(get_result))
        .route("/api/match/transaction", post(select_transaction))
        .route("/api/match/retry", post(retry))
        .route("/api/match/show-all", post(show_all))
        .route("/api/settings", get(get_settings))
        .route("/api/settings/filters", post(toggle_filter))
        .route("/api/settings/sort", put(update_sort))
        .route("/api/settings/round-off", put(update_round_off))
        .with_state(orchestrator)
}
