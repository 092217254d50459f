//! 缺失读数检查 - 业务能力层
//!
//! 只读，不产生任何副作用。

use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{PipelineError, PipelineResult};
use crate::infrastructure::RecordStore;
use crate::models::Period;

/// 缺失读数检查
///
/// 只要有一个有效用户缺少本期读数，整批开票就不能开始。
pub struct PreconditionChecker {
    store: Arc<dyn RecordStore>,
}

impl PreconditionChecker {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    pub async fn check(&self, period: &Period) -> PipelineResult<()> {
        let missing = self
            .store
            .missing_readings(period)
            .await
            .map_err(PipelineError::PreconditionQuery)?;

        if missing.is_empty() {
            info!("✓ 期次 {} 所有有效用户均有读数", period);
            return Ok(());
        }

        warn!("⚠️ 期次 {} 有 {} 个用户缺少读数", period, missing.len());
        for account in &missing {
            warn!("   缺少读数: 用户 {}", account);
        }

        Err(PipelineError::MissingReadings {
            period: period.clone(),
            accounts: missing.into_iter().collect(),
        })
    }
}
