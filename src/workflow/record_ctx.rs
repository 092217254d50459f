//! 记录处理上下文
//!
//! 封装"我正在处理哪一期、哪个用户的哪张发票"这一信息，仅用于日志

use std::fmt::Display;

use crate::models::BillingRecord;

#[derive(Debug, Clone)]
pub struct RecordCtx {
    pub record_id: i64,
    pub account_id: String,
    pub sequence_number: i64,
}

impl RecordCtx {
    pub fn of(record: &BillingRecord) -> Self {
        Self {
            record_id: record.record_id,
            account_id: record.account_id.clone(),
            sequence_number: record.sequence_number,
        }
    }
}

impl Display for RecordCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[用户 #{} 记录 #{} 序号 #{}]",
            self.account_id, self.record_id, self.sequence_number
        )
    }
}
