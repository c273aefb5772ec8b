use crate::models::{
    BankTransaction, FilterId, Invoice, MatchResult, MatchStatus, QueryStage,
};
use crate::service::planner::CandidatePlanner;
use crate::service::settings::MatchSettings;
use crate::source::InvoiceSource;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;

#[derive(Debug, Default)]
struct Session {
    /// 每次发起新搜索递增, 迟到的旧响应据此丢弃
    generation: u64,
    transaction: Option<BankTransaction>,
    /// 最近一次成功阶段的候选集 (引擎输入)
    candidates: Option<(QueryStage, Vec<Invoice>)>,
}

/// 搜索编排: 精确 → 兜底, 以及用户触发的调试全量查询
///
/// 同一时刻只有一个有效的查询; 结果通过 watch 通道整体发布。
pub struct SearchOrchestrator {
    source: Arc<dyn InvoiceSource>,
    settings: Arc<MatchSettings>,
    planner: CandidatePlanner,
    session: Mutex<Session>,
    results: watch::Sender<MatchResult>,
}

impl SearchOrchestrator {
    pub fn new(
        source: Arc<dyn InvoiceSource>,
        settings: Arc<MatchSettings>,
        planner: CandidatePlanner,
    ) -> Self {
        let (results, _) = watch::channel(MatchResult::default());
        Self {
            source,
            settings,
            planner,
            session: Mutex::new(Session::default()),
            results,
        }
    }

    pub fn settings(&self) -> &Arc<MatchSettings> {
        &self.settings
    }

    /// 订阅结果更新
    pub fn subscribe(&self) -> watch::Receiver<MatchResult> {
        self.results.subscribe()
    }

    pub fn current(&self) -> MatchResult {
        self.results.borrow().clone()
    }

    fn lock(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, result: MatchResult) -> MatchResult {
        self.results.send_replace(result.clone());
        result
    }

    fn is_eligible(&self, transaction: &BankTransaction) -> bool {
        !transaction.is_withdrawal() && self.settings.snapshot().is_enabled(FilterId::SalesInvoice)
    }

    /// 开始新一轮搜索: 作废在途请求, 不符合条件时直接回到 idle
    fn begin(&self, stage: QueryStage) -> Option<(u64, BankTransaction)> {
        let mut session = self.lock();
        session.generation += 1;
        session.candidates = None;

        let transaction = session.transaction.clone();
        match transaction {
            Some(tx) if self.is_eligible(&tx) => {
                self.publish(MatchResult::loading(stage, Some(tx.name.clone())));
                Some((session.generation, tx))
            }
            other => {
                if let Some(tx) = &other {
                    tracing::info!("流水 {} 不参与销售发票匹配", tx.name);
                }
                self.publish(MatchResult::idle(other.map(|tx| tx.name)));
                None
            }
        }
    }

    /// 仅当仍是最新一轮时提交结果
    fn commit(
        &self,
        generation: u64,
        candidates: Option<(QueryStage, Vec<Invoice>)>,
        result: MatchResult,
    ) -> MatchResult {
        let mut session = self.lock();
        if session.generation != generation {
            tracing::warn!(
                "丢弃过期响应: generation {} (当前 {})",
                generation,
                session.generation
            );
            return self.current();
        }
        session.candidates = candidates;
        self.publish(result)
    }

    fn is_current(&self, generation: u64) -> bool {
        self.lock().generation == generation
    }

    async fn run(&self, first_stage: QueryStage) -> MatchResult {
        let Some((generation, transaction)) = self.begin(first_stage) else {
            return self.current();
        };
        let match_amount = transaction.match_amount();
        let tx_name = Some(transaction.name.clone());
        let mut stage = first_stage;

        loop {
            let query = self.planner.query_for(stage, &match_amount);
            tracing::info!(
                "[{:?}] 流水 {}: 查询销售发票, 金额 {}, 公司 {}",
                stage,
                transaction.name,
                match_amount,
                self.planner.company()
            );

            let raw = match self.source.get_list(&query).await {
                Ok(raw) => raw,
                Err(e) => {
                    tracing::error!("[{:?}] 流水 {}: 查询失败: {}", stage, transaction.name, e);
                    let message = match stage {
                        QueryStage::Debug => format!("Failed to load all invoices: {}", e),
                        _ => format!("Failed to load sales invoices: {}", e),
                    };
                    return self.commit(generation, None, MatchResult::error(stage, message, tx_name));
                }
            };

            if stage == QueryStage::Exact && raw.is_empty() {
                if !self.is_current(generation) {
                    tracing::warn!("流水 {}: 搜索已被取代, 不再执行兜底查询", transaction.name);
                    return self.current();
                }
                tracing::info!("流水 {}: 没有精确金额匹配, 执行兜底查询", transaction.name);
                stage = QueryStage::Fallback;
                self.commit(generation, None, MatchResult::loading(stage, tx_name.clone()));
                continue;
            }

            let fetched = raw.len();
            let candidates = self.planner.narrow(stage, raw, &match_amount);
            let config = self.settings.snapshot();
            let invoices = self.planner.finalize(stage, &candidates, &match_amount, &config);
            tracing::info!(
                "[{:?}] 流水 {}: 查询 {} 张, 候选 {} 张, 匹配 {} 张",
                stage,
                transaction.name,
                fetched,
                candidates.len(),
                invoices.len()
            );

            return self.commit(
                generation,
                Some((stage, candidates)),
                MatchResult::ready(stage, invoices, tx_name),
            );
        }
    }

    /// 切换当前流水; 流水或金额变化时重新进入精确查询
    pub async fn select_transaction(&self, transaction: BankTransaction) -> MatchResult {
        self.settings.activate_transaction(&transaction);

        {
            let mut session = self.lock();
            let unchanged = session.transaction.as_ref().is_some_and(|current| {
                current.name == transaction.name && current.match_amount() == transaction.match_amount()
            });
            let status = self.results.borrow().status;
            if unchanged && matches!(status, MatchStatus::Loading | MatchStatus::Ready) {
                return self.current();
            }
            session.transaction = Some(transaction);
        }

        self.run(QueryStage::Exact).await
    }

    /// 显式重试: 从精确查询重新开始
    pub async fn retry(&self) -> MatchResult {
        self.run(QueryStage::Exact).await
    }

    /// 调试: 不带金额条件的全量查询, 仍经过匹配引擎
    pub async fn show_all(&self) -> MatchResult {
        self.run(QueryStage::Debug).await
    }

    /// 配置变化后用缓存候选集同步重算, 不重新查询
    pub fn recompute(&self) -> MatchResult {
        let session = self.lock();
        let (Some(transaction), Some((stage, candidates))) =
            (&session.transaction, &session.candidates)
        else {
            return self.current();
        };

        let config = self.settings.snapshot();
        let invoices = self
            .planner
            .finalize(*stage, candidates, &transaction.match_amount(), &config);
        tracing::debug!("流水 {}: 配置变化, 重算得到 {} 张", transaction.name, invoices.len());
        self.publish(MatchResult::ready(*stage, invoices, Some(transaction.name.clone())))
    }

    /// 设置变化入口
    ///
    /// 不再符合条件时回到 idle; 已有候选集时同步重算;
    /// `sales_invoice` 重新启用且尚未搜索过时发起精确查询。
    pub async fn on_settings_changed(&self) -> MatchResult {
        let (eligible, has_candidates, status) = {
            let session = self.lock();
            let eligible = session
                .transaction
                .as_ref()
                .is_some_and(|tx| self.is_eligible(tx));
            (eligible, session.candidates.is_some(), self.results.borrow().status)
        };

        match (eligible, has_candidates, status) {
            (false, _, MatchStatus::Idle) => self.current(),
            (false, _, _) => {
                let mut session = self.lock();
                session.generation += 1;
                session.candidates = None;
                let name = session.transaction.as_ref().map(|tx| tx.name.clone());
                self.publish(MatchResult::idle(name))
            }
            (true, true, _) => self.recompute(),
            (true, false, MatchStatus::Idle) => self.run(QueryStage::Exact).await,
            (true, false, _) => self.current(),
        }
    }
}
