use crate::models::{
    BankTransaction, ConfigurationError, FilterId, MatchConfiguration, SortField, SortOrder,
};
use dashmap::DashMap;
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::{Arc, PoisonError, RwLock};

pub const KEY_MATCH_FILTERS: &str = "mint-bank-rec-match-filters";
pub const KEY_SORT_FIELD: &str = "mint-bank-rec-invoice-sort-field";
pub const KEY_SORT_ORDER: &str = "mint-bank-rec-invoice-sort-order";
pub const KEY_ROUND_OFF: &str = "mint-bank-rec-round-off-value";

/// 键值设置存储
pub trait SettingsStore: Send + Sync {
    fn get(&self, key: &str) -> Option<Value>;
    fn set(&self, key: &str, value: Value);
}

/// 进程内设置存储
#[derive(Debug, Default)]
pub struct MemorySettingsStore {
    entries: DashMap<String, Value>,
}

impl MemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SettingsStore for MemorySettingsStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.entries.get(key).map(|v| v.value().clone())
    }

    fn set(&self, key: &str, value: Value) {
        self.entries.insert(key.to_string(), value);
    }
}

#[derive(Debug)]
struct SettingsState {
    config: MatchConfiguration,
    withdrawal_active: bool,
    /// `sales_invoice` 是被付款流水移除的 (而非用户关闭)
    sales_invoice_suppressed: bool,
}

/// 匹配配置服务: 单一持有者, 每个字段的更新都是原子的
///
/// 付款流水激活期间 `sales_invoice` 过滤永远不会被启用。
pub struct MatchSettings {
    store: Arc<dyn SettingsStore>,
    state: RwLock<SettingsState>,
}

fn load_filters(value: Value) -> Option<BTreeSet<FilterId>> {
    let ids: Vec<String> = serde_json::from_value(value).ok()?;
    Some(
        ids.iter()
            .filter_map(|id| match id.parse::<FilterId>() {
                Ok(f) => Some(f),
                Err(e) => {
                    tracing::warn!("忽略存储中的过滤项: {}", e);
                    None
                }
            })
            .collect(),
    )
}

fn load_configuration(store: &dyn SettingsStore) -> MatchConfiguration {
    let mut config = MatchConfiguration::default();

    if let Some(filters) = store.get(KEY_MATCH_FILTERS).and_then(load_filters) {
        config.enabled_filters = filters;
    }
    if let Some(field) = store
        .get(KEY_SORT_FIELD)
        .and_then(|v| v.as_str().and_then(|s| s.parse::<SortField>().ok()))
    {
        config.sort_field = field;
    }
    if let Some(order) = store
        .get(KEY_SORT_ORDER)
        .and_then(|v| v.as_str().and_then(|s| s.parse::<SortOrder>().ok()))
    {
        config.sort_order = order;
    }
    if let Some(raw) = store.get(KEY_ROUND_OFF) {
        let accepted = match &raw {
            Value::Number(n) => n.as_i64().map(|v| config.set_round_off_tolerance(v)),
            Value::String(s) => Some(config.set_round_off_from_str(s)),
            _ => None,
        };
        if !matches!(accepted, Some(Ok(()))) {
            tracing::warn!("存储中的容差无效, 使用默认值: {}", raw);
        }
    }

    config
}

impl MatchSettings {
    pub fn new(store: Arc<dyn SettingsStore>) -> Self {
        let config = load_configuration(store.as_ref());
        tracing::info!(
            "匹配配置已加载: filters={:?}, sort={:?} {:?}, tolerance={}",
            config.enabled_filters,
            config.sort_field,
            config.sort_order,
            config.round_off_tolerance()
        );
        Self {
            store,
            state: RwLock::new(SettingsState {
                config,
                withdrawal_active: false,
                sales_invoice_suppressed: false,
            }),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemorySettingsStore::new()))
    }

    /// 当前配置快照
    pub fn snapshot(&self) -> MatchConfiguration {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .config
            .clone()
    }

    fn update<R>(&self, f: impl FnOnce(&mut SettingsState) -> R) -> R {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut state)
    }

    fn persist_filters(&self, filters: &BTreeSet<FilterId>) {
        let ids: Vec<&str> = filters.iter().map(FilterId::as_str).collect();
        self.store.set(KEY_MATCH_FILTERS, Value::from(ids));
    }

    /// 开关单个过滤项, 返回配置是否发生变化
    pub fn set_filter(&self, filter: FilterId, enabled: bool) -> bool {
        let changed = self.update(|state| {
            if enabled && filter == FilterId::SalesInvoice && state.withdrawal_active {
                tracing::warn!("付款流水不能启用 sales_invoice 过滤, 已忽略");
                return None;
            }
            if !enabled && filter == FilterId::SalesInvoice {
                state.sales_invoice_suppressed = false;
            }
            let changed = if enabled {
                state.config.enabled_filters.insert(filter)
            } else {
                state.config.enabled_filters.remove(&filter)
            };
            changed.then(|| state.config.enabled_filters.clone())
        });

        match changed {
            Some(filters) => {
                tracing::info!("过滤项 {} -> {}", filter, enabled);
                self.persist_filters(&filters);
                true
            }
            None => false,
        }
    }

    pub fn set_sort_field(&self, field: SortField) {
        self.update(|state| state.config.sort_field = field);
        self.store.set(KEY_SORT_FIELD, serde_json::to_value(field).unwrap_or(Value::Null));
    }

    pub fn set_sort_order(&self, order: SortOrder) {
        self.update(|state| state.config.sort_order = order);
        self.store.set(KEY_SORT_ORDER, serde_json::to_value(order).unwrap_or(Value::Null));
    }

    /// 无效值被拒绝, 原值保留
    pub fn set_round_off(&self, value: i64) -> Result<(), ConfigurationError> {
        self.update(|state| state.config.set_round_off_tolerance(value))
            .map_err(|e| {
                tracing::warn!("{}", e);
                e
            })?;
        self.store.set(KEY_ROUND_OFF, Value::from(value));
        Ok(())
    }

    pub fn set_round_off_from_str(&self, raw: &str) -> Result<(), ConfigurationError> {
        let tolerance = self
            .update(|state| {
                state
                    .config
                    .set_round_off_from_str(raw)
                    .map(|()| state.config.round_off_tolerance())
            })
            .map_err(|e| {
                tracing::warn!("{}", e);
                e
            })?;
        self.store.set(KEY_ROUND_OFF, Value::from(tolerance));
        Ok(())
    }

    /// 切换当前流水
    ///
    /// 付款流水会立刻移除 `sales_invoice`; 之后切回收款流水时恢复被移除的过滤项。
    pub fn activate_transaction(&self, transaction: &BankTransaction) {
        let withdrawal = transaction.is_withdrawal();
        let changed = self.update(|state| {
            state.withdrawal_active = withdrawal;
            let changed = if withdrawal {
                let removed = state.config.enabled_filters.remove(&FilterId::SalesInvoice);
                state.sales_invoice_suppressed |= removed;
                removed
            } else if state.sales_invoice_suppressed {
                state.sales_invoice_suppressed = false;
                state.config.enabled_filters.insert(FilterId::SalesInvoice)
            } else {
                false
            };
            changed.then(|| state.config.enabled_filters.clone())
        });

        if let Some(filters) = changed {
            if withdrawal {
                tracing::info!("流水 {} 为付款, 已移除 sales_invoice 过滤", transaction.name);
            } else {
                tracing::info!("流水 {} 为收款, 已恢复 sales_invoice 过滤", transaction.name);
            }
            self.persist_filters(&filters);
        }
    }

    #[cfg(test)]
    fn withdrawal_active(&self) -> bool {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .withdrawal_active
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bigdecimal::BigDecimal;
    use chrono::NaiveDate;
    use serde_json::json;
    use std::str::FromStr;

    fn tx(amount: &str) -> BankTransaction {
        BankTransaction {
            name: "BT-1".to_string(),
            amount: BigDecimal::from_str(amount).unwrap(),
            date: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            description: None,
            currency: None,
        }
    }

    #[test]
    fn loads_persisted_values() {
        let store = Arc::new(MemorySettingsStore::new());
        store.set(KEY_MATCH_FILTERS, json!(["sales_invoice", "group_by_customer", "bogus"]));
        store.set(KEY_SORT_FIELD, json!("due_date"));
        store.set(KEY_SORT_ORDER, json!("desc"));
        store.set(KEY_ROUND_OFF, json!(250));

        let settings = MatchSettings::new(store);
        let cfg = settings.snapshot();
        assert_eq!(
            cfg.enabled_filters,
            [FilterId::SalesInvoice, FilterId::GroupByCustomer]
                .into_iter()
                .collect::<BTreeSet<_>>()
        );
        assert_eq!(cfg.sort_field, SortField::DueDate);
        assert_eq!(cfg.sort_order, SortOrder::Desc);
        assert_eq!(cfg.round_off_tolerance(), 250);
    }

    #[test]
    fn malformed_persisted_values_fall_back_to_defaults() {
        let store = Arc::new(MemorySettingsStore::new());
        store.set(KEY_MATCH_FILTERS, json!("not-a-list"));
        store.set(KEY_SORT_FIELD, json!("amount"));
        store.set(KEY_ROUND_OFF, json!(-5));
        let cfg = MatchSettings::new(store).snapshot();
        assert_eq!(cfg, MatchConfiguration::default());
    }

    #[test]
    fn toggling_one_filter_leaves_others() {
        let settings = MatchSettings::in_memory();
        let before = settings.snapshot();
        assert!(settings.set_filter(FilterId::GroupByCustomer, true));
        let after = settings.snapshot();
        assert!(after.is_enabled(FilterId::GroupByCustomer));
        for f in before.enabled_filters {
            assert!(after.is_enabled(f));
        }
        assert!(!settings.set_filter(FilterId::GroupByCustomer, true));
    }

    #[test]
    fn writes_through_to_store() {
        let store = Arc::new(MemorySettingsStore::new());
        let settings = MatchSettings::new(store.clone());
        settings.set_filter(FilterId::ExactAmountMatch, false);
        settings.set_sort_field(SortField::CustomerName);
        settings.set_sort_order(SortOrder::Desc);
        settings.set_round_off(50).unwrap();

        assert_eq!(
            store.get(KEY_MATCH_FILTERS),
            Some(json!(["payment_entry", "journal_entry", "sales_invoice"]))
        );
        assert_eq!(store.get(KEY_SORT_FIELD), Some(json!("customer_name")));
        assert_eq!(store.get(KEY_SORT_ORDER), Some(json!("desc")));
        assert_eq!(store.get(KEY_ROUND_OFF), Some(json!(50)));
    }

    #[test]
    fn invalid_tolerance_is_rejected_without_side_effects() {
        let store = Arc::new(MemorySettingsStore::new());
        let settings = MatchSettings::new(store.clone());
        assert!(settings.set_round_off(0).is_err());
        assert!(settings.set_round_off_from_str("ten").is_err());
        assert_eq!(settings.snapshot().round_off_tolerance(), 100);
        assert_eq!(store.get(KEY_ROUND_OFF), None);
        settings.set_round_off_from_str("75").unwrap();
        assert_eq!(store.get(KEY_ROUND_OFF), Some(json!(75)));
    }

    #[test]
    fn withdrawal_removes_and_blocks_sales_invoice() {
        let settings = MatchSettings::in_memory();
        assert!(settings.snapshot().is_enabled(FilterId::SalesInvoice));

        settings.activate_transaction(&tx("-320.00"));
        assert!(settings.withdrawal_active());
        assert!(!settings.snapshot().is_enabled(FilterId::SalesInvoice));

        assert!(!settings.set_filter(FilterId::SalesInvoice, true));
        assert!(!settings.snapshot().is_enabled(FilterId::SalesInvoice));
        // 其他过滤项不受影响
        assert!(settings.set_filter(FilterId::PurchaseInvoice, true));

        // 切回收款流水时恢复
        settings.activate_transaction(&tx("320.00"));
        assert!(!settings.withdrawal_active());
        assert!(settings.snapshot().is_enabled(FilterId::SalesInvoice));
        assert!(settings.snapshot().is_enabled(FilterId::PurchaseInvoice));
    }

    #[test]
    fn deposit_restores_sales_invoice_and_persists_it() {
        let store = Arc::new(MemorySettingsStore::new());
        let settings = MatchSettings::new(store.clone());

        settings.activate_transaction(&tx("-50"));
        settings.activate_transaction(&tx("-75"));
        assert_eq!(
            store.get(KEY_MATCH_FILTERS),
            Some(json!(["payment_entry", "journal_entry", "exact_amount_match"]))
        );

        settings.activate_transaction(&tx("75"));
        assert!(settings.snapshot().is_enabled(FilterId::SalesInvoice));
        assert_eq!(
            store.get(KEY_MATCH_FILTERS),
            Some(json!(["payment_entry", "journal_entry", "sales_invoice", "exact_amount_match"]))
        );
    }

    #[test]
    fn deposit_keeps_user_disabled_sales_invoice_off() {
        let settings = MatchSettings::in_memory();
        assert!(settings.set_filter(FilterId::SalesInvoice, false));

        settings.activate_transaction(&tx("-50"));
        settings.activate_transaction(&tx("50"));
        assert!(!settings.snapshot().is_enabled(FilterId::SalesInvoice));

        // 付款流水期间用户显式关闭, 同样不恢复
        let settings = MatchSettings::in_memory();
        settings.activate_transaction(&tx("-50"));
        assert!(!settings.set_filter(FilterId::SalesInvoice, false));
        settings.activate_transaction(&tx("50"));
        assert!(!settings.snapshot().is_enabled(FilterId::SalesInvoice));
    }
}
