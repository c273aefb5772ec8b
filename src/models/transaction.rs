use bigdecimal::{BigDecimal, Zero};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// 未对账银行流水 (只读)
///
/// `amount` 带符号: 正数为收款 (deposit), 负数为付款 (withdrawal)。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankTransaction {
    pub name: String,
    pub amount: BigDecimal,
    pub date: NaiveDate,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub currency: Option<String>,
}

impl BankTransaction {
    /// 付款流水不能匹配销售发票
    pub fn is_withdrawal(&self) -> bool {
        self.amount < BigDecimal::zero()
    }

    /// 匹配金额 (无符号)
    pub fn match_amount(&self) -> BigDecimal {
        self.amount.abs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn tx(amount: &str) -> BankTransaction {
        BankTransaction {
            name: "BT-0001".to_string(),
            amount: BigDecimal::from_str(amount).unwrap(),
            date: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            description: Some("NEFT ACME TRADERS".to_string()),
            currency: None,
        }
    }

    #[test]
    fn deposit_is_eligible() {
        let t = tx("5000");
        assert!(!t.is_withdrawal());
        assert_eq!(t.match_amount(), BigDecimal::from(5000));
    }

    #[test]
    fn withdrawal_uses_unsigned_amount() {
        let t = tx("-1250.50");
        assert!(t.is_withdrawal());
        assert_eq!(t.match_amount(), BigDecimal::from_str("1250.50").unwrap());
    }

    #[test]
    fn zero_amount_is_not_a_withdrawal() {
        assert!(!tx("0").is_withdrawal());
    }
}
