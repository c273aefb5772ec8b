use crate::models::{
    BankTransaction, ConfigurationError, FilterId, MatchConfiguration, MatchResult, SortField,
    SortOrder,
};
use crate::service::SearchOrchestrator;
use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// 请求体: 开关单个过滤项
#[derive(Debug, Deserialize)]
pub struct FilterToggleRequest {
    pub filter: String,
    pub enabled: bool,
}

/// 请求体: 排序设置 (字段和方向可单独更新)
#[derive(Debug, Deserialize)]
pub struct SortRequest {
    pub field: Option<String>,
    pub order: Option<String>,
}

/// 请求体: 取整容差, 数字或文本
#[derive(Debug, Deserialize)]
pub struct RoundOffRequest {
    pub value: Value,
}

/// 设置变更响应: 新设置 + 重算后的结果
#[derive(Debug, Serialize)]
pub struct SettingsResponse {
    pub settings: MatchConfiguration,
    pub result: MatchResult,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub message: String,
}

fn bad_request(e: ConfigurationError) -> Response {
    let response = ErrorResponse {
        success: false,
        message: format!("Error: {}", e),
    };
    (StatusCode::BAD_REQUEST, Json(response)).into_response()
}

fn result_response(result: MatchResult) -> Response {
    (StatusCode::OK, Json(result)).into_response()
}

async fn settings_changed(orchestrator: &SearchOrchestrator) -> Response {
    let result = orchestrator.on_settings_changed().await;
    let response = SettingsResponse {
        settings: orchestrator.settings().snapshot(),
        result,
    };
    (StatusCode::OK, Json(response)).into_response()
}

/// 健康检查
pub async fn health_check() -> &'static str {
    "OK"
}

/// 当前匹配结果
pub async fn get_result(State(orchestrator): State<Arc<SearchOrchestrator>>) -> Response {
    result_response(orchestrator.current())
}

/// 选择待匹配流水
pub async fn select_transaction(
    State(orchestrator): State<Arc<SearchOrchestrator>>,
    Json(transaction): Json<BankTransaction>,
) -> Response {
    result_response(orchestrator.select_transaction(transaction).await)
}

/// 出错后重试
pub async fn retry(State(orchestrator): State<Arc<SearchOrchestrator>>) -> Response {
    result_response(orchestrator.retry().await)
}

/// Show All Invoices (Debug)
pub async fn show_all(State(orchestrator): State<Arc<SearchOrchestrator>>) -> Response {
    result_response(orchestrator.show_all().await)
}

pub async fn get_settings(State(orchestrator): State<Arc<SearchOrchestrator>>) -> Response {
    (StatusCode::OK, Json(orchestrator.settings().snapshot())).into_response()
}

pub async fn toggle_filter(
    State(orchestrator): State<Arc<SearchOrchestrator>>,
    Json(req): Json<FilterToggleRequest>,
) -> Response {
    let filter: FilterId = match req.filter.parse() {
        Ok(f) => f,
        Err(e) => return bad_request(e),
    };
    orchestrator.settings().set_filter(filter, req.enabled);
    settings_changed(&orchestrator).await
}

pub async fn update_sort(
    State(orchestrator): State<Arc<SearchOrchestrator>>,
    Json(req): Json<SortRequest>,
) -> Response {
    let field = match req.field.as_deref().map(str::parse::<SortField>).transpose() {
        Ok(f) => f,
        Err(e) => return bad_request(e),
    };
    let order = match req.order.as_deref().map(str::parse::<SortOrder>).transpose() {
        Ok(o) => o,
        Err(e) => return bad_request(e),
    };

    let settings = orchestrator.settings();
    if let Some(field) = field {
        settings.set_sort_field(field);
    }
    if let Some(order) = order {
        settings.set_sort_order(order);
    }
    settings_changed(&orchestrator).await
}

/// 无效容差静默忽略, 返回未变化的设置
pub async fn update_round_off(
    State(orchestrator): State<Arc<SearchOrchestrator>>,
    Json(req): Json<RoundOffRequest>,
) -> Response {
    let settings = orchestrator.settings();
    let outcome = match &req.value {
        Value::Number(n) => match n.as_i64() {
            Some(v) => settings.set_round_off(v),
            None => Err(ConfigurationError::InvalidTolerance(n.to_string())),
        },
        Value::String(s) => settings.set_round_off_from_str(s),
        other => Err(ConfigurationError::InvalidTolerance(other.to_string())),
    };
    if let Err(e) = outcome {
        tracing::debug!("忽略容差更新: {}", e);
    }
    settings_changed(&orchestrator).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Invoice, MatchStatus};
    use crate::service::{CandidatePlanner, MatchSettings};
    use crate::source::{InvoiceQuery, InvoiceSource, SourceError};
    use async_trait::async_trait;

    struct EmptySource;

    #[async_trait]
    impl InvoiceSource for EmptySource {
        async fn get_list(&self, _query: &InvoiceQuery) -> Result<Vec<Invoice>, SourceError> {
            Ok(Vec::new())
        }
    }

    fn orchestrator() -> Arc<SearchOrchestrator> {
        Arc::new(SearchOrchestrator::new(
            Arc::new(EmptySource),
            Arc::new(MatchSettings::in_memory()),
            CandidatePlanner::new("Acme Ltd"),
        ))
    }

    #[tokio::test]
    async fn unknown_filter_is_bad_request() {
        let req = FilterToggleRequest {
            filter: "exact_match".to_string(),
            enabled: true,
        };
        let response = toggle_filter(State(orchestrator()), Json(req)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unknown_sort_order_is_bad_request() {
        let req = SortRequest {
            field: Some("posting_date".to_string()),
            order: Some("sideways".to_string()),
        };
        let orch = orchestrator();
        let response = update_sort(State(orch.clone()), Json(req)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        // 任一字段无效时整体不生效
        assert_eq!(orch.settings().snapshot(), MatchConfiguration::default());
    }

    #[tokio::test]
    async fn invalid_round_off_is_ignored() {
        let orch = orchestrator();
        let req = RoundOffRequest {
            value: Value::from(-3),
        };
        let response = update_round_off(State(orch.clone()), Json(req)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(orch.settings().snapshot().round_off_tolerance(), 100);

        let req = RoundOffRequest {
            value: Value::from("40"),
        };
        update_round_off(State(orch.clone()), Json(req)).await;
        assert_eq!(orch.settings().snapshot().round_off_tolerance(), 40);
    }

    #[tokio::test]
    async fn result_starts_idle() {
        let orch = orchestrator();
        let response = get_result(State(orch.clone())).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(orch.current().status, MatchStatus::Idle);
    }
}
