//! 发票数据源契约: 按过滤条件返回 "Sales Invoice" 记录

pub mod frappe;
pub mod postgres;

use crate::models::Invoice;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use thiserror::Error;

pub use frappe::FrappeInvoiceSource;
pub use postgres::PgInvoiceSource;

pub const SALES_INVOICE_DOCTYPE: &str = "Sales Invoice";

/// 查询投影字段
pub const INVOICE_FIELDS: [&str; 9] = [
    "name",
    "customer",
    "customer_name",
    "posting_date",
    "grand_total",
    "status",
    "outstanding_amount",
    "due_date",
    "currency",
];

/// 可出现在过滤条件中的字段 (投影 + 公司)
pub const FILTERABLE_FIELDS: [&str; 10] = [
    "name",
    "customer",
    "customer_name",
    "posting_date",
    "grand_total",
    "status",
    "outstanding_amount",
    "due_date",
    "currency",
    "company",
];

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("HTTP error! status: {status}")]
    Http { status: u16 },

    #[error("malformed response: {0}")]
    Decode(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("unsupported field: {0}")]
    UnsupportedField(String),
}

impl From<reqwest::Error> for SourceError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            SourceError::Decode(e.to_string())
        } else {
            SourceError::Transport(e.to_string())
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FilterOp {
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
}

impl FilterOp {
    pub fn as_sql(&self) -> &'static str {
        match self {
            FilterOp::Eq => "=",
            FilterOp::Ne => "<>",
            FilterOp::Gt => ">",
            FilterOp::Ge => ">=",
            FilterOp::Lt => "<",
            FilterOp::Le => "<=",
        }
    }
}

/// 过滤三元组 (field, operator, value), 序列化为 `["grand_total", "=", 5000]`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryFilter(pub &'static str, pub FilterOp, pub Value);

impl QueryFilter {
    pub fn new(field: &'static str, op: FilterOp, value: impl Into<Value>) -> Self {
        Self(field, op, value.into())
    }

    pub fn field(&self) -> &'static str {
        self.0
    }

    pub fn op(&self) -> FilterOp {
        self.1
    }

    pub fn value(&self) -> &Value {
        &self.2
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderBy {
    pub field: &'static str,
    pub descending: bool,
}

impl OrderBy {
    pub fn desc(field: &'static str) -> Self {
        Self { field, descending: true }
    }
}

impl fmt::Display for OrderBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.field, if self.descending { "desc" } else { "asc" })
    }
}

impl Serialize for OrderBy {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// `frappe.client.get_list` 风格的查询
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvoiceQuery {
    pub doctype: &'static str,
    pub fields: Vec<&'static str>,
    pub filters: Vec<QueryFilter>,
    pub order_by: OrderBy,
    pub limit_page_length: u32,
}

impl InvoiceQuery {
    pub fn sales_invoices(filters: Vec<QueryFilter>, order_by: OrderBy, limit: u32) -> Self {
        Self {
            doctype: SALES_INVOICE_DOCTYPE,
            fields: INVOICE_FIELDS.to_vec(),
            filters,
            order_by,
            limit_page_length: limit,
        }
    }

    /// 字段白名单校验, SQL 拼接前必须调用
    pub fn validate(&self) -> Result<(), SourceError> {
        let projected = self.fields.iter().copied();
        let filtered = self.filters.iter().map(QueryFilter::field);
        projected
            .chain(filtered)
            .chain(std::iter::once(self.order_by.field))
            .find(|f| !FILTERABLE_FIELDS.contains(f))
            .map_or(Ok(()), |f| Err(SourceError::UnsupportedField(f.to_string())))
    }
}

/// 外部发票数据源
#[async_trait]
pub trait InvoiceSource: Send + Sync {
    async fn get_list(&self, query: &InvoiceQuery) -> Result<Vec<Invoice>, SourceError>;
}
