use super::invoice::Invoice;
use serde::Serialize;

/// 产生候选集的查询阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryStage {
    Exact,
    Fallback,
    Debug,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchStatus {
    Idle,
    Loading,
    Ready,
    Error,
}

/// 当前匹配结果, 每次重算整体替换
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchResult {
    pub invoices: Vec<Invoice>,
    pub source: Option<QueryStage>,
    pub status: MatchStatus,
    pub error: Option<String>,
    /// 产生该结果的交易
    pub transaction: Option<String>,
}

impl MatchResult {
    pub fn idle(transaction: Option<String>) -> Self {
        Self {
            invoices: Vec::new(),
            source: None,
            status: MatchStatus::Idle,
            error: None,
            transaction,
        }
    }

    pub fn loading(stage: QueryStage, transaction: Option<String>) -> Self {
        Self {
            invoices: Vec::new(),
            source: Some(stage),
            status: MatchStatus::Loading,
            error: None,
            transaction,
        }
    }

    pub fn ready(stage: QueryStage, invoices: Vec<Invoice>, transaction: Option<String>) -> Self {
        Self {
            invoices,
            source: Some(stage),
            status: MatchStatus::Ready,
            error: None,
            transaction,
        }
    }

    pub fn error(stage: QueryStage, message: String, transaction: Option<String>) -> Self {
        Self {
            invoices: Vec::new(),
            source: Some(stage),
            status: MatchStatus::Error,
            error: Some(message),
            transaction,
        }
    }

    /// 空结果时展示 "Show All Invoices (Debug)" 入口
    pub fn offers_debug_search(&self) -> bool {
        self.status == MatchStatus::Ready && self.invoices.is_empty()
    }
}

impl Default for MatchResult {
    fn default() -> Self {
        Self::idle(None)
    }
}
