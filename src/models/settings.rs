use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const DEFAULT_ROUND_OFF_TOLERANCE: u32 = 100;

/// 设置边界上的校验错误 (调用方静默忽略, 保留原值)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("invalid round-off tolerance: {0}")]
    InvalidTolerance(String),

    #[error("unknown match filter: {0}")]
    UnknownFilter(String),

    #[error("unknown sort field: {0}")]
    UnknownSortField(String),

    #[error("unknown sort order: {0}")]
    UnknownSortOrder(String),
}

/// 匹配过滤开关
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterId {
    PaymentEntry,
    JournalEntry,
    PurchaseInvoice,
    SalesInvoice,
    ExpenseClaim,
    BankTransaction,
    InvoiceMatching,
    ExactAmountMatch,
    GroupByCustomer,
}

impl FilterId {
    pub const ALL: [FilterId; 9] = [
        FilterId::PaymentEntry,
        FilterId::JournalEntry,
        FilterId::PurchaseInvoice,
        FilterId::SalesInvoice,
        FilterId::ExpenseClaim,
        FilterId::BankTransaction,
        FilterId::InvoiceMatching,
        FilterId::ExactAmountMatch,
        FilterId::GroupByCustomer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FilterId::PaymentEntry => "payment_entry",
            FilterId::JournalEntry => "journal_entry",
            FilterId::PurchaseInvoice => "purchase_invoice",
            FilterId::SalesInvoice => "sales_invoice",
            FilterId::ExpenseClaim => "expense_claim",
            FilterId::BankTransaction => "bank_transaction",
            FilterId::InvoiceMatching => "invoice_matching",
            FilterId::ExactAmountMatch => "exact_amount_match",
            FilterId::GroupByCustomer => "group_by_customer",
        }
    }
}

impl fmt::Display for FilterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FilterId {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FilterId::ALL
            .iter()
            .copied()
            .find(|f| f.as_str() == s)
            .ok_or_else(|| ConfigurationError::UnknownFilter(s.to_string()))
    }
}

/// 排序字段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    #[default]
    OutstandingAmount,
    PostingDate,
    CustomerName,
    GrandTotal,
    DueDate,
}

impl FromStr for SortField {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "outstanding_amount" => Ok(SortField::OutstandingAmount),
            "posting_date" => Ok(SortField::PostingDate),
            "customer_name" => Ok(SortField::CustomerName),
            "grand_total" => Ok(SortField::GrandTotal),
            "due_date" => Ok(SortField::DueDate),
            other => Err(ConfigurationError::UnknownSortField(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl FromStr for SortOrder {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            other => Err(ConfigurationError::UnknownSortOrder(other.to_string())),
        }
    }
}

/// 匹配配置快照
///
/// 由 `MatchSettings` 服务持有并持久化, 以值的形式传给匹配引擎。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchConfiguration {
    pub enabled_filters: BTreeSet<FilterId>,
    pub sort_field: SortField,
    pub sort_order: SortOrder,
    round_off_tolerance: u32,
}

impl Default for MatchConfiguration {
    fn default() -> Self {
        Self {
            enabled_filters: [
                FilterId::PaymentEntry,
                FilterId::JournalEntry,
                FilterId::SalesInvoice,
                FilterId::ExactAmountMatch,
            ]
            .into_iter()
            .collect(),
            sort_field: SortField::default(),
            sort_order: SortOrder::default(),
            round_off_tolerance: DEFAULT_ROUND_OFF_TOLERANCE,
        }
    }
}

impl MatchConfiguration {
    pub fn is_enabled(&self, filter: FilterId) -> bool {
        self.enabled_filters.contains(&filter)
    }

    pub fn round_off_tolerance(&self) -> u32 {
        self.round_off_tolerance
    }

    /// 容差必须为正数, 否则拒绝且不改变当前值
    pub fn set_round_off_tolerance(&mut self, value: i64) -> Result<(), ConfigurationError> {
        match u32::try_from(value) {
            Ok(v) if v > 0 => {
                self.round_off_tolerance = v;
                Ok(())
            }
            _ => Err(ConfigurationError::InvalidTolerance(value.to_string())),
        }
    }

    /// 解析用户输入的容差文本 (整数)
    pub fn set_round_off_from_str(&mut self, raw: &str) -> Result<(), ConfigurationError> {
        let value: i64 = raw
            .trim()
            .parse()
            .map_err(|_| ConfigurationError::InvalidTolerance(raw.to_string()))?;
        self.set_round_off_tolerance(value)
    }

    pub fn with_filters<I: IntoIterator<Item = FilterId>>(mut self, filters: I) -> Self {
        self.enabled_filters = filters.into_iter().collect();
        self
    }

    pub fn with_sort(mut self, field: SortField, order: SortOrder) -> Self {
        self.sort_field = field;
        self.sort_order = order;
        self
    }

    pub fn with_tolerance(mut self, tolerance: u32) -> Self {
        if tolerance > 0 {
            self.round_off_tolerance = tolerance;
        }
        self
    }
}
