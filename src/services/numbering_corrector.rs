//! 发票序号修正 - 业务能力层

use std::sync::Arc;
use tracing::info;

use crate::error::{PipelineError, PipelineResult};
use crate::infrastructure::{NumberingRule, RecordStore};
use crate::models::Period;

/// 发票序号修正
///
/// 一次批量写入，只匹配序号为 0 的记录，重复执行不会改动已分配的序号。
pub struct NumberingCorrector {
    store: Arc<dyn RecordStore>,
    rule: NumberingRule,
}

impl NumberingCorrector {
    pub fn new(store: Arc<dyn RecordStore>, rule: NumberingRule) -> Self {
        Self { store, rule }
    }

    /// 返回本次修正的记录数
    pub async fn correct(&self, period: &Period) -> PipelineResult<u64> {
        let updated = self
            .store
            .apply_numbering_correction(period, self.rule)
            .await
            .map_err(PipelineError::NumberingUpdate)?;

        if updated > 0 {
            info!("🔢 期次 {} 修正了 {} 条发票序号", period, updated);
        } else {
            info!("✓ 期次 {} 无需修正发票序号", period);
        }

        Ok(updated)
    }
}
