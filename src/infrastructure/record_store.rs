//! 计费记录存储 - 基础设施层
//!
//! 只暴露"读批次 / 查缺失读数 / 修正序号 / 写确认码"四项能力，
//! 不关心流程顺序。

use async_trait::async_trait;
use std::collections::BTreeSet;
use thiserror::Error;

use crate::models::{BillingRecord, ConfirmationCode, Period};

/// 存储错误
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("记录不存在: {0}")]
    NotFound(i64),

    /// 确认码一经写入不可修改
    #[error("记录 {record_id} 已有确认码 {existing}")]
    AlreadyConfirmed { record_id: i64, existing: String },

    #[error("数据库错误: {0}")]
    Database(String),

    #[error("连接错误: {0}")]
    Connection(String),

    #[error("数据无效: {0}")]
    InvalidData(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Database(err.to_string())
    }
}

/// 序号修正规则：`sequence_number = record_id - offset`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NumberingRule {
    pub offset: i64,
}

impl NumberingRule {
    pub fn new(offset: i64) -> Self {
        Self { offset }
    }

    pub fn sequence_for(&self, record_id: i64) -> i64 {
        record_id - self.offset
    }
}

/// 计费记录存储
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// 可开票记录：期次匹配、服务有效、金额 > 0、尚无确认码，按序号升序
    async fn eligible_batch(&self, period: &Period) -> Result<Vec<BillingRecord>, StoreError>;

    /// 本期没有服务记录的有效用户
    async fn missing_readings(&self, period: &Period) -> Result<BTreeSet<String>, StoreError>;

    /// 为本期序号为 0 的记录批量分配序号，返回受影响行数
    async fn apply_numbering_correction(
        &self,
        period: &Period,
        rule: NumberingRule,
    ) -> Result<u64, StoreError>;

    /// 写入确认码，仅当记录尚无确认码时成功
    async fn set_confirmation(
        &self,
        record_id: i64,
        code: &ConfirmationCode,
    ) -> Result<(), StoreError>;

    /// 当前处于处理中的发行期次
    async fn active_period(&self) -> Result<Option<Period>, StoreError>;
}

/// 统一的批次排序：序号升序，序号相同按记录 ID
pub(crate) fn sort_for_submission(records: &mut [BillingRecord]) {
    records.sort_by_key(|r| (r.sequence_number, r.record_id));
}
