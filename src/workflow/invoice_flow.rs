//! 单张发票处理流程 - 流程层
//!
//! 核心职责：定义"一条计费记录"的完整处理流程
//!
//! 流程顺序：
//! 1. 生成请求体
//! 2. 提交开票服务
//! 3. 写入确认码
//!
//! 任一步失败都只影响本条记录，确认码保持为空，下次运行会重新选中。

use std::sync::Arc;
use tracing::{error, info, warn};

use crate::clients::InvoicingService;
use crate::error::RecordError;
use crate::infrastructure::RecordStore;
use crate::models::{BillingRecord, ConfirmationCode, Period};
use crate::services::InvoiceFormatter;
use crate::workflow::record_ctx::RecordCtx;

/// 单条记录的处理结果
#[derive(Debug)]
pub enum RecordOutcome {
    Success(ConfirmationCode),
    Failure(RecordError),
}

/// 单张发票处理流程
///
/// - 不持有批次，不出现 Vec<BillingRecord>
/// - 不做重试
/// - 不关心并发
pub struct InvoiceFlow {
    formatter: Arc<InvoiceFormatter>,
    invoicing: Arc<dyn InvoicingService>,
    store: Arc<dyn RecordStore>,
}

impl InvoiceFlow {
    pub fn new(
        formatter: Arc<InvoiceFormatter>,
        invoicing: Arc<dyn InvoicingService>,
        store: Arc<dyn RecordStore>,
    ) -> Self {
        Self {
            formatter,
            invoicing,
            store,
        }
    }

    pub async fn run(&self, record: &BillingRecord, period: &Period) -> RecordOutcome {
        let ctx = RecordCtx::of(record);
        match self.issue(record, period, &ctx).await {
            Ok(code) => {
                info!("{} ✓ 开票成功，确认码 {}", ctx, code);
                RecordOutcome::Success(code)
            }
            Err(e) => {
                if let RecordError::Persist { code, .. } = &e {
                    error!(
                        "{} ❌ 服务端已受理 (确认码 {}) 但确认码未落库，下次运行可能重复开票: {}",
                        ctx, code, e
                    );
                } else {
                    warn!("{} ❌ {}", ctx, e);
                }
                RecordOutcome::Failure(e)
            }
        }
    }

    async fn issue(
        &self,
        record: &BillingRecord,
        period: &Period,
        ctx: &RecordCtx,
    ) -> Result<ConfirmationCode, RecordError> {
        let request = self.formatter.format(record, period)?;

        let code = self.invoicing.submit(&request).await?;

        self.store
            .set_confirmation(ctx.record_id, &code)
            .await
            .map_err(|source| RecordError::Persist {
                code: code.clone(),
                source,
            })?;

        Ok(code)
    }
}
