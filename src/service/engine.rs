//! 匹配引擎: 金额策略 → 未清金额下限 → 按客户合并 → 排序
//!
//! 纯函数, 无 I/O, 无共享可变状态。

use crate::models::{FilterId, Invoice, MatchConfiguration, QueryStage, SortField, SortOrder};
use bigdecimal::{BigDecimal, Zero};
use chrono::NaiveDate;
use indexmap::IndexMap;
use std::cmp::Ordering;

/// 四舍五入 (远离零方向) 到整数
fn round_half_away_from_zero(value: &BigDecimal) -> BigDecimal {
    let half = BigDecimal::new(5.into(), 1);
    let rounded = (value.abs() + half).with_scale(0);
    if *value < BigDecimal::zero() {
        -rounded
    } else {
        rounded
    }
}

/// 取整到 `tolerance` 的最近倍数
pub fn round_to_multiple(amount: &BigDecimal, tolerance: u32) -> BigDecimal {
    let step = BigDecimal::from(tolerance.max(1));
    round_half_away_from_zero(&(amount.clone() / step.clone())) * step
}

/// 金额策略: 精确匹配或按容差取整后匹配
pub fn passes_amount_policy(
    invoice: &Invoice,
    match_amount: &BigDecimal,
    config: &MatchConfiguration,
) -> bool {
    if config.is_enabled(FilterId::ExactAmountMatch) {
        invoice.effective_amount() == match_amount
    } else {
        let tolerance = config.round_off_tolerance();
        round_to_multiple(invoice.effective_amount(), tolerance)
            == round_to_multiple(match_amount, tolerance)
    }
}

/// 候选发票必须能吸收整笔流水金额
pub fn covers_match_amount(invoice: &Invoice, match_amount: &BigDecimal) -> bool {
    invoice.effective_amount() >= match_amount
}

/// 同一客户只保留有效金额最小的一张 (并列取先出现者)
pub fn consolidate_by_customer(invoices: Vec<Invoice>) -> Vec<Invoice> {
    let mut by_customer: IndexMap<String, Invoice> = IndexMap::new();
    for invoice in invoices {
        match by_customer.get_mut(&invoice.customer) {
            Some(kept) => {
                if invoice.effective_amount() < kept.effective_amount() {
                    *kept = invoice;
                }
            }
            None => {
                by_customer.insert(invoice.customer.clone(), invoice);
            }
        }
    }
    by_customer.into_values().collect()
}

fn due_date_key(invoice: &Invoice) -> NaiveDate {
    // 缺失的到期日按 1970-01-01 处理
    invoice.due_date.unwrap_or_default()
}

fn compare_by_field(a: &Invoice, b: &Invoice, field: SortField) -> Ordering {
    match field {
        SortField::OutstandingAmount => a.effective_amount().cmp(b.effective_amount()),
        SortField::GrandTotal => a.grand_total.cmp(&b.grand_total),
        SortField::PostingDate => a.posting_date.cmp(&b.posting_date),
        SortField::DueDate => due_date_key(a).cmp(&due_date_key(b)),
        SortField::CustomerName => a
            .display_customer()
            .to_lowercase()
            .cmp(&b.display_customer().to_lowercase()),
    }
}

/// 按配置排序, 主键相同时按发票号升序
pub fn sort_invoices(invoices: &mut [Invoice], field: SortField, order: SortOrder) {
    invoices.sort_by(|a, b| {
        let primary = compare_by_field(a, b, field);
        let primary = match order {
            SortOrder::Asc => primary,
            SortOrder::Desc => primary.reverse(),
        };
        primary.then_with(|| a.name.cmp(&b.name))
    });
}

/// 对候选集执行完整的过滤排序流水线
///
/// `Debug` 阶段跳过金额策略, 其余步骤照常执行。空结果不是错误。
pub fn rank_candidates(
    candidates: &[Invoice],
    match_amount: &BigDecimal,
    config: &MatchConfiguration,
    stage: QueryStage,
) -> Vec<Invoice> {
    let mut filtered: Vec<Invoice> = if stage == QueryStage::Debug {
        candidates.to_vec()
    } else {
        candidates
            .iter()
            .filter(|inv| passes_amount_policy(inv, match_amount, config))
            .cloned()
            .collect()
    };
    tracing::debug!(
        "金额策略后: {}/{} (exact={}, tolerance={})",
        filtered.len(),
        candidates.len(),
        config.is_enabled(FilterId::ExactAmountMatch),
        config.round_off_tolerance()
    );

    filtered.retain(|inv| covers_match_amount(inv, match_amount));
    tracing::debug!("未清金额下限 (>= {}) 后: {}", match_amount, filtered.len());

    if config.is_enabled(FilterId::GroupByCustomer) {
        filtered = consolidate_by_customer(filtered);
        tracing::debug!("按客户合并后: {}", filtered.len());
    }

    sort_invoices(&mut filtered, config.sort_field, config.sort_order);
    filtered
}
