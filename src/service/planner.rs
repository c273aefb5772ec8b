use crate::models::{Invoice, InvoiceStatus, MatchConfiguration, QueryStage};
use crate::service::engine;
use crate::source::{FilterOp, InvoiceQuery, OrderBy, QueryFilter};
use bigdecimal::{BigDecimal, Zero};

pub const EXACT_PAGE_SIZE: u32 = 10;
pub const FALLBACK_PAGE_SIZE: u32 = 20;
pub const DEBUG_PAGE_SIZE: u32 = 50;

/// 候选查询规划: 精确 → 兜底 → 调试全量
#[derive(Debug, Clone)]
pub struct CandidatePlanner {
    company: String,
}

impl CandidatePlanner {
    pub fn new(company: impl Into<String>) -> Self {
        Self {
            company: company.into(),
        }
    }

    pub fn company(&self) -> &str {
        &self.company
    }

    fn status_filters(excluded: &[InvoiceStatus]) -> impl Iterator<Item = QueryFilter> + '_ {
        excluded
            .iter()
            .map(|s| QueryFilter::new("status", FilterOp::Ne, s.as_str()))
    }

    fn company_filter(&self) -> QueryFilter {
        QueryFilter::new("company", FilterOp::Eq, self.company.as_str())
    }

    /// 阶段对应的查询
    pub fn query_for(&self, stage: QueryStage, match_amount: &BigDecimal) -> InvoiceQuery {
        const SETTLED: [InvoiceStatus; 3] = [
            InvoiceStatus::Cancelled,
            InvoiceStatus::Draft,
            InvoiceStatus::Paid,
        ];

        let (mut filters, limit): (Vec<QueryFilter>, u32) = match stage {
            QueryStage::Exact => (
                vec![QueryFilter::new("grand_total", FilterOp::Eq, match_amount.to_string())],
                EXACT_PAGE_SIZE,
            ),
            QueryStage::Fallback => (
                vec![QueryFilter::new("outstanding_amount", FilterOp::Gt, 0)],
                FALLBACK_PAGE_SIZE,
            ),
            QueryStage::Debug => (Vec::new(), DEBUG_PAGE_SIZE),
        };

        let excluded: &[InvoiceStatus] = match stage {
            QueryStage::Debug => &SETTLED[..2],
            _ => &SETTLED,
        };
        filters.extend(Self::status_filters(excluded));
        filters.push(self.company_filter());

        InvoiceQuery::sales_invoices(filters, OrderBy::desc("posting_date"), limit)
    }

    /// 阶段原始结果 → 引擎输入的候选集
    ///
    /// 兜底阶段只保留与匹配金额相对差 ≤ 10% 的发票。
    pub fn narrow(&self, stage: QueryStage, raw: Vec<Invoice>, match_amount: &BigDecimal) -> Vec<Invoice> {
        match stage {
            QueryStage::Fallback => raw
                .into_iter()
                .filter(|inv| within_relative_difference(inv, match_amount))
                .collect(),
            QueryStage::Exact | QueryStage::Debug => raw,
        }
    }

    /// 候选集经过匹配引擎后才是最终结果
    pub fn finalize(
        &self,
        stage: QueryStage,
        candidates: &[Invoice],
        match_amount: &BigDecimal,
        config: &MatchConfiguration,
    ) -> Vec<Invoice> {
        engine::rank_candidates(candidates, match_amount, config, stage)
    }
}

/// |outstanding − amount| / amount ≤ 10%, 金额为 0 时不匹配
pub fn within_relative_difference(invoice: &Invoice, match_amount: &BigDecimal) -> bool {
    if match_amount.is_zero() {
        return false;
    }
    let difference = (invoice.effective_amount() - match_amount).abs();
    difference * BigDecimal::from(10) <= *match_amount
}
