//! 待开票记录加载 - 业务能力层

use std::sync::Arc;
use tracing::info;

use crate::error::{PipelineError, PipelineResult};
use crate::infrastructure::RecordStore;
use crate::models::{BillingRecord, Period};

/// 待开票记录加载
///
/// 必须在序号修正之后调用；返回顺序即提交顺序（序号升序）。
pub struct BatchLoader {
    store: Arc<dyn RecordStore>,
}

impl BatchLoader {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    pub async fn load(&self, period: &Period) -> PipelineResult<Vec<BillingRecord>> {
        let records = self
            .store
            .eligible_batch(period)
            .await
            .map_err(PipelineError::BatchLoad)?;

        let unnumbered: Vec<i64> = records
            .iter()
            .filter(|r| !r.is_numbered())
            .map(|r| r.record_id)
            .collect();
        if !unnumbered.is_empty() {
            return Err(PipelineError::UnnumberedRecords {
                record_ids: unnumbered,
            });
        }

        info!("✓ 期次 {} 找到 {} 条待开票记录", period, records.len());
        Ok(records)
    }
}
