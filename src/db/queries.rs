use crate::models::{Invoice, SalesInvoiceRow};
use crate::source::{InvoiceQuery, QueryFilter, SourceError};
use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use serde_json::Value;
use sqlx::{PgPool, Postgres, QueryBuilder};
use std::str::FromStr;

const AMOUNT_FIELDS: [&str; 2] = ["grand_total", "outstanding_amount"];
const DATE_FIELDS: [&str; 2] = ["posting_date", "due_date"];

/// 过滤值转成文本 (数字/字符串都接受)
fn value_text(filter: &QueryFilter) -> Result<String, SourceError> {
    match filter.value() {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(SourceError::Decode(format!(
            "unsupported filter value for {}: {}",
            filter.field(),
            other
        ))),
    }
}

/// 按字段类型绑定过滤值
fn push_filter_value(
    builder: &mut QueryBuilder<'_, Postgres>,
    filter: &QueryFilter,
) -> Result<(), SourceError> {
    let text = value_text(filter)?;
    if AMOUNT_FIELDS.contains(&filter.field()) {
        let amount = BigDecimal::from_str(&text)
            .map_err(|e| SourceError::Decode(format!("{}: {}", filter.field(), e)))?;
        builder.push_bind(amount);
    } else if DATE_FIELDS.contains(&filter.field()) {
        let date = NaiveDate::from_str(&text)
            .map_err(|e| SourceError::Decode(format!("{}: {}", filter.field(), e)))?;
        builder.push_bind(date);
    } else {
        builder.push_bind(text);
    }
    Ok(())
}

/// 把 get_list 查询编译成 SQL
///
/// 字段名来自白名单, 所有值都走绑定参数。
pub fn build_list_query(query: &InvoiceQuery) -> Result<QueryBuilder<'static, Postgres>, SourceError> {
    query.validate()?;

    let mut builder = QueryBuilder::new("SELECT ");
    builder.push(
        query
            .fields
            .iter()
            .map(|f| format!("\"{}\"", f))
            .collect::<Vec<_>>()
            .join(", "),
    );
    builder.push(" FROM \"tabSales Invoice\"");

    for (idx, filter) in query.filters.iter().enumerate() {
        builder.push(if idx == 0 { " WHERE " } else { " AND " });
        builder.push(format!("\"{}\" {} ", filter.field(), filter.op().as_sql()));
        push_filter_value(&mut builder, filter)?;
    }

    builder.push(format!(
        " ORDER BY \"{}\" {}",
        query.order_by.field,
        if query.order_by.descending { "DESC" } else { "ASC" }
    ));
    builder.push(" LIMIT ");
    builder.push_bind(i64::from(query.limit_page_length));

    Ok(builder)
}

/// 查询销售发票列表
pub async fn list_sales_invoices(
    pool: &PgPool,
    query: &InvoiceQuery,
) -> Result<Vec<Invoice>, SourceError> {
    let mut builder = build_list_query(query)?;

    tracing::debug!("执行发票查询: {}", builder.sql());
    let start_time = std::time::Instant::now();

    let rows = builder
        .build_query_as::<SalesInvoiceRow>()
        .fetch_all(pool)
        .await?;

    tracing::debug!("发票查询完成, {} 行, 耗时: {:?}", rows.len(), start_time.elapsed());

    Ok(rows.into_iter().map(Invoice::from).collect())
}
