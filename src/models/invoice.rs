use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;

/// 销售发票状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InvoiceStatus {
    Draft,
    Unpaid,
    #[serde(rename = "Partly Paid")]
    PartlyPaid,
    Overdue,
    Paid,
    Cancelled,
    /// 数据源返回的其他状态 (Return, Credit Note Issued ...)
    #[serde(other)]
    Other,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Draft => "Draft",
            InvoiceStatus::Unpaid => "Unpaid",
            InvoiceStatus::PartlyPaid => "Partly Paid",
            InvoiceStatus::Overdue => "Overdue",
            InvoiceStatus::Paid => "Paid",
            InvoiceStatus::Cancelled => "Cancelled",
            InvoiceStatus::Other => "Other",
        }
    }
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InvoiceStatus {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "Draft" => InvoiceStatus::Draft,
            "Unpaid" => InvoiceStatus::Unpaid,
            "Partly Paid" => InvoiceStatus::PartlyPaid,
            "Overdue" => InvoiceStatus::Overdue,
            "Paid" => InvoiceStatus::Paid,
            "Cancelled" => InvoiceStatus::Cancelled,
            _ => InvoiceStatus::Other,
        })
    }
}

/// 待收销售发票快照 (只读, 由外部数据源持有)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub name: String,
    pub customer: String,
    #[serde(default)]
    pub customer_name: Option<String>,
    pub posting_date: NaiveDate,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    pub grand_total: BigDecimal,
    #[serde(default)]
    pub outstanding_amount: Option<BigDecimal>,
    pub status: InvoiceStatus,
    #[serde(default)]
    pub currency: Option<String>,
}

impl Invoice {
    /// 有效金额: 未清金额存在时取未清金额, 否则取价税合计
    pub fn effective_amount(&self) -> &BigDecimal {
        self.outstanding_amount.as_ref().unwrap_or(&self.grand_total)
    }

    /// 排序/展示用的客户名
    pub fn display_customer(&self) -> &str {
        self.customer_name.as_deref().unwrap_or(&self.customer)
    }
}

/// 数据库行 ("tabSales Invoice")
#[derive(Debug, Clone, FromRow)]
pub struct SalesInvoiceRow {
    pub name: String,
    pub customer: String,
    pub customer_name: Option<String>,
    pub posting_date: NaiveDate,
    pub due_date: Option<NaiveDate>,
    pub grand_total: BigDecimal,
    pub outstanding_amount: Option<BigDecimal>,
    pub status: String,
    pub currency: Option<String>,
}

impl From<SalesInvoiceRow> for Invoice {
    fn from(row: SalesInvoiceRow) -> Self {
        let status = row.status.parse().unwrap_or(InvoiceStatus::Other);
        Self {
            name: row.name,
            customer: row.customer,
            customer_name: row.customer_name,
            posting_date: row.posting_date,
            due_date: row.due_date,
            grand_total: row.grand_total,
            outstanding_amount: row.outstanding_amount,
            status,
            currency: row.currency,
        }
    }
}
