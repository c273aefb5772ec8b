use super::{InvoiceQuery, InvoiceSource, SourceError};
use crate::db::queries;
use crate::models::Invoice;
use async_trait::async_trait;
use sqlx::PgPool;

/// 直连 ERP 数据库的发票数据源
pub struct PgInvoiceSource {
    pool: PgPool,
}

impl PgInvoiceSource {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl InvoiceSource for PgInvoiceSource {
    async fn get_list(&self, query: &InvoiceQuery) -> Result<Vec<Invoice>, SourceError> {
        queries::list_sales_invoices(&self.pool, query).await
    }
}
