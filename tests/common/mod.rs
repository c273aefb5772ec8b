#![allow(dead_code)]

use async_trait::async_trait;
use bankrec_invoice_match::models::{BankTransaction, Invoice, InvoiceStatus};
use bankrec_invoice_match::source::{InvoiceQuery, InvoiceSource, SourceError};
use bankrec_invoice_match::{CandidatePlanner, MatchSettings, SearchOrchestrator};
use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use std::collections::VecDeque;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;

pub const COMPANY: &str = "Acme Ltd";

pub fn amount(s: &str) -> BigDecimal {
    BigDecimal::from_str(s).unwrap()
}

pub fn invoice(name: &str, customer: &str, outstanding: &str) -> Invoice {
    Invoice {
        name: name.to_string(),
        customer: customer.to_string(),
        customer_name: None,
        posting_date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
        due_date: None,
        grand_total: amount(outstanding),
        outstanding_amount: Some(amount(outstanding)),
        status: InvoiceStatus::Unpaid,
        currency: Some("INR".to_string()),
    }
}

pub fn deposit(name: &str, value: &str) -> BankTransaction {
    BankTransaction {
        name: name.to_string(),
        amount: amount(value),
        date: NaiveDate::from_ymd_opt(2024, 6, 3).unwrap(),
        description: Some(format!("NEFT CR {}", name)),
        currency: Some("INR".to_string()),
    }
}

pub fn withdrawal(name: &str, value: &str) -> BankTransaction {
    BankTransaction {
        amount: -amount(value),
        ..deposit(name, value)
    }
}

pub fn names(list: &[Invoice]) -> Vec<&str> {
    list.iter().map(|i| i.name.as_str()).collect()
}

type Reply = Result<Vec<Invoice>, SourceError>;

/// 按调用顺序返回预设响应; 可选地让某次调用等待放行
#[derive(Default)]
pub struct ScriptedSource {
    replies: Mutex<VecDeque<(Option<oneshot::Receiver<()>>, Reply)>>,
    calls: Mutex<Vec<InvoiceQuery>>,
}

impl ScriptedSource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn reply(&self, invoices: Vec<Invoice>) {
        self.replies.lock().unwrap().push_back((None, Ok(invoices)));
    }

    pub fn fail(&self, error: SourceError) {
        self.replies.lock().unwrap().push_back((None, Err(error)));
    }

    /// 返回的 sender 被触发 (或丢弃) 前该次调用不会完成
    pub fn reply_gated(&self, invoices: Vec<Invoice>) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.replies.lock().unwrap().push_back((Some(rx), Ok(invoices)));
        tx
    }

    pub fn calls(&self) -> Vec<InvoiceQuery> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl InvoiceSource for ScriptedSource {
    async fn get_list(&self, query: &InvoiceQuery) -> Result<Vec<Invoice>, SourceError> {
        self.calls.lock().unwrap().push(query.clone());
        let next = self.replies.lock().unwrap().pop_front();
        let Some((gate, reply)) = next else {
            return Ok(Vec::new());
        };
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        reply
    }
}

pub fn orchestrator(source: Arc<ScriptedSource>) -> Arc<SearchOrchestrator> {
    orchestrator_with(source, MatchSettings::in_memory())
}

pub fn orchestrator_with(source: Arc<ScriptedSource>, settings: MatchSettings) -> Arc<SearchOrchestrator> {
    Arc::new(SearchOrchestrator::new(
        source,
        Arc::new(settings),
        CandidatePlanner::new(COMPANY),
    ))
}
