use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// 各项费用
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Charges {
    /// 水费小计（Imp_Total）
    pub base_total: f64,
    /// 排污附加费（Imp_Alcanta）
    pub sewer_surcharge: f64,
    /// 表单/管理费（Imp_Rep）
    pub admin_fee: f64,
    /// 滞纳金（Imp_Recargo）
    pub penalty_surcharge: f64,
    /// 最终开票金额（Imp_Factura）
    pub invoiced_total: f64,
    /// 第 1886 号法律减免金额
    pub legal_discount: f64,
}

/// 待开票的计费记录
///
/// 由上游计费计算生成，本 crate 只读取，唯一的写入路径是
/// [`RecordStore::set_confirmation`](crate::infrastructure::RecordStore::set_confirmation)。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BillingRecord {
    /// 内部记录 ID（Factura）
    pub record_id: i64,
    /// 发票序号（Num_Factura），为 0 表示尚未分配
    pub sequence_number: i64,
    /// 用户编号（Abonado）
    pub account_id: String,
    pub reading: f64,
    pub consumption_m3: f64,
    pub charges: Charges,
    pub payment_date: Option<NaiveDate>,
    /// 用户证件号（NODOC）
    pub document_id: String,
    pub category: String,
    pub zone: String,
    pub address: String,
    /// 是否享受第 1886 号法律优惠
    pub legal_benefit: bool,
    /// 税号（NIT）
    pub tax_id: String,
    /// 名称（Razón social）
    pub legal_name: String,
    /// 豁免标记（Liberacion）
    pub exempt: bool,
}

impl BillingRecord {
    /// 序号已分配
    pub fn is_numbered(&self) -> bool {
        self.sequence_number != 0
    }
}

/// 开票服务返回的确认码（CUF）
///
/// 一旦写入记录便不可再改，是"已开票"的唯一依据。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfirmationCode(String);

impl ConfirmationCode {
    /// 空字符串不是合法的确认码
    pub fn new(code: impl Into<String>) -> Option<Self> {
        let code = code.into();
        let trimmed = code.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConfirmationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confirmation_code_rejects_blank() {
        assert!(ConfirmationCode::new("").is_none());
        assert!(ConfirmationCode::new("   ").is_none());
        assert_eq!(ConfirmationCode::new(" ABC123 ").unwrap().as_str(), "ABC123");
    }

    #[test]
    fn test_is_numbered() {
        let mut record = BillingRecord::default();
        assert!(!record.is_numbered());
        record.sequence_number = 42;
        assert!(record.is_numbered());
    }

    #[test]
    fn test_payment_date_serialized_as_iso_date() {
        let record = BillingRecord {
            record_id: 7,
            payment_date: NaiveDate::from_ymd_opt(2024, 5, 10),
            ..BillingRecord::default()
        };

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["payment_date"], "2024-05-10");

        let back: BillingRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }
}
