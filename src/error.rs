//! 错误类型
//!
//! - [`PipelineError`]：整批级别，中止本次运行并返回给调用方
//! - [`RecordError`]：单条记录级别，只计入失败，不影响其他记录

use thiserror::Error;

use crate::clients::InvoicingError;
use crate::infrastructure::StoreError;
use crate::models::{ConfirmationCode, Period};
use crate::services::invoice_formatter::FormatError;

/// 整批级别错误
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("没有处于处理中的发行期次")]
    NoActivePeriod,

    #[error("查询发行期次失败: {0}")]
    PeriodLookup(#[source] StoreError),

    /// 前置条件不满足：有效用户缺少本期读数
    #[error("期次 {period} 有 {} 个用户缺少读数", .accounts.len())]
    MissingReadings {
        period: Period,
        accounts: Vec<String>,
    },

    #[error("缺失读数检查失败: {0}")]
    PreconditionQuery(#[source] StoreError),

    #[error("发票序号修正失败: {0}")]
    NumberingUpdate(#[source] StoreError),

    #[error("读取待开票记录失败: {0}")]
    BatchLoad(#[source] StoreError),

    #[error("{} 条记录仍未分配发票序号", .record_ids.len())]
    UnnumberedRecords { record_ids: Vec<i64> },
}

/// 单条记录错误
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("发票请求体生成失败: {0}")]
    Payload(#[from] FormatError),

    #[error("开票失败: {0}")]
    Submission(#[from] InvoicingError),

    /// 服务端已受理但确认码未落库，下次运行会重新提交
    #[error("开票成功 (确认码 {code}) 但写入确认码失败: {source}")]
    Persist {
        code: ConfirmationCode,
        #[source]
        source: StoreError,
    },

    #[error("任务异常终止: {0}")]
    TaskAborted(String),
}

impl RecordError {
    /// 失败分类标签，写入失败清单
    pub fn kind(&self) -> &'static str {
        match self {
            RecordError::Payload(_) => "PAYLOAD_FAILED",
            RecordError::Submission(_) => "SUBMIT_FAILED",
            RecordError::Persist { .. } => "PERSIST_FAILED",
            RecordError::TaskAborted(_) => "TASK_ABORTED",
        }
    }
}

/// 流水线结果类型
pub type PipelineResult<T> = Result<T, PipelineError>;
