//! 开票流水线 - 编排层
//!
//! ## 职责
//!
//! 本模块是整个应用的入口，持有存储和开票服务两个外部资源，
//! 按阶段执行一次完整的批量开票：
//!
//! 1. **查询与检查**：确定期次 → 缺失读数检查 → 序号修正 → 加载待开票记录
//! 2. **开票**：交给 [`SubmissionOrchestrator`] 并发处理
//! 3. **复核**：重新统计仍待开票的记录，失败记录写入清单
//!
//! 任一检查失败都会在提交任何发票之前终止本次运行。

use anyhow::Context;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::clients::{HttpInvoicingClient, InvoicingService};
use crate::config::Config;
use crate::error::{PipelineError, PipelineResult};
use crate::infrastructure::{NumberingRule, RecordStore, SqliteRecordStore};
use crate::models::{BillingRecord, ConfirmationCode, Period};
use crate::orchestrator::batch_processor::{BatchOutcome, SubmissionOrchestrator};
use crate::orchestrator::progress::{
    FailedRecord, ProgressReporter, ProgressSink, Stage, StageStatus,
};
use crate::services::{
    BatchLoader, DocumentArchive, FailureLedger, InvoiceFormatter, NumberingCorrector,
    PreconditionChecker,
};
use crate::utils::logging;
use crate::workflow::InvoiceFlow;

/// 数据库连接池大小
const MAX_DB_CONNECTIONS: u32 = 8;

/// 一次运行的汇总
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub period: Period,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    /// 运行结束后仍待开票的记录数
    pub remaining_pending: usize,
    pub cancelled: bool,
}

impl RunSummary {
    fn from_outcome(period: Period, outcome: &BatchOutcome, remaining_pending: usize) -> Self {
        Self {
            period,
            total: outcome.total(),
            succeeded: outcome.succeeded.len(),
            failed: outcome.failed.len(),
            skipped: outcome.skipped,
            remaining_pending,
            cancelled: outcome.cancelled,
        }
    }

    /// 成功比例，范围 [0, 1]
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        (self.succeeded as f64 / self.total as f64).clamp(0.0, 1.0)
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "期次 {} | 总数 {} | 成功 {} | 失败 {} | 未派发 {} | 仍待开票 {}{}",
            self.period,
            self.total,
            self.succeeded,
            self.failed,
            self.skipped,
            self.remaining_pending,
            if self.cancelled { " | 已取消" } else { "" }
        )
    }
}

/// 应用主结构
pub struct App {
    config: Config,
    store: Arc<dyn RecordStore>,
    checker: PreconditionChecker,
    corrector: NumberingCorrector,
    loader: BatchLoader,
    orchestrator: SubmissionOrchestrator,
    ledger: FailureLedger,
    archive: DocumentArchive,
}

impl App {
    /// 初始化应用：日志文件、数据库连接、开票服务客户端
    pub async fn initialize(config: Config) -> anyhow::Result<Self> {
        logging::init_log_file(&config.output_log_file)?;
        logging::log_startup(&config);

        let store = SqliteRecordStore::connect(&config.database_url, MAX_DB_CONNECTIONS)
            .await
            .with_context(|| format!("无法连接计费数据库 {}", config.database_url))?;
        info!("✓ 已连接计费数据库");

        let client = HttpInvoicingClient::new(&config).context("无法创建开票服务客户端")?;

        Ok(Self::from_parts(config, Arc::new(store), Arc::new(client)))
    }

    /// 用现成的存储和开票服务组装应用
    pub fn from_parts(
        config: Config,
        store: Arc<dyn RecordStore>,
        invoicing: Arc<dyn InvoicingService>,
    ) -> Self {
        let formatter = Arc::new(InvoiceFormatter::new(config.issuer.clone()));
        let flow = Arc::new(InvoiceFlow::new(formatter, invoicing.clone(), store.clone()));

        Self {
            checker: PreconditionChecker::new(store.clone()),
            corrector: NumberingCorrector::new(
                store.clone(),
                NumberingRule::new(config.numbering_offset),
            ),
            loader: BatchLoader::new(store.clone()),
            orchestrator: SubmissionOrchestrator::new(flow, config.max_concurrent_submissions),
            ledger: FailureLedger::new(config.failure_ledger_file.clone()),
            archive: DocumentArchive::new(invoicing, config.documents_folder.clone()),
            store,
            config,
        }
    }

    /// 执行一次批量开票
    ///
    /// # 参数
    /// - `period`: 指定期次；为空时读取当前处理中的期次
    /// - `sink`: 进度接收方
    /// - `cancel`: 取消令牌
    ///
    /// # 返回
    /// 运行汇总；检查阶段失败时返回错误且不提交任何发票
    pub async fn run_emission(
        &self,
        period: Option<Period>,
        sink: Arc<dyn ProgressSink>,
        cancel: CancellationToken,
    ) -> PipelineResult<RunSummary> {
        // ========== 阶段 1：查询与检查 ==========
        sink.on_stage(Stage::Verification, StageStatus::Processing);
        let (period, records) = match self.verify(period).await {
            Ok(loaded) => loaded,
            Err(e) => {
                error!("❌ 检查阶段失败，本次不提交任何发票: {}", e);
                sink.on_stage(Stage::Verification, StageStatus::Failed);
                return Err(e);
            }
        };
        sink.on_stage(Stage::Verification, StageStatus::Completed);

        if records.is_empty() {
            warn!("⚠️ 期次 {} 没有待开票的记录", period);
        }
        logging::log_batch_loaded(
            period.as_str(),
            records.len(),
            self.orchestrator.max_concurrent(),
        );

        // ========== 阶段 2：开票 ==========
        sink.on_stage(Stage::Invoicing, StageStatus::Processing);
        let reporter = Arc::new(ProgressReporter::new(records.len(), sink.clone()));
        let outcome = self
            .orchestrator
            .process_batch(&period, records, &reporter, &cancel)
            .await;
        sink.on_stage(
            Stage::Invoicing,
            if outcome.cancelled {
                StageStatus::Failed
            } else {
                StageStatus::Completed
            },
        );

        self.write_failures(&period, &outcome.failed).await;

        // ========== 阶段 3：复核 ==========
        sink.on_stage(Stage::Review, StageStatus::Processing);
        let remaining = match self.store.eligible_batch(&period).await {
            Ok(remaining) => remaining,
            Err(e) => {
                sink.on_stage(Stage::Review, StageStatus::Failed);
                return Err(PipelineError::BatchLoad(e));
            }
        };
        sink.on_stage(Stage::Review, StageStatus::Completed);

        let summary = RunSummary::from_outcome(period, &outcome, remaining.len());
        logging::print_final_stats(&summary, self.ledger.path());
        let line = format!("{}\n", summary);
        if let Err(e) = logging::append_log(&self.config.output_log_file, &line) {
            warn!("⚠️ 无法写入运行汇总: {}", e);
        }

        Ok(summary)
    }

    /// 确定期次并完成开票前的全部检查，返回待开票记录
    async fn verify(
        &self,
        period: Option<Period>,
    ) -> PipelineResult<(Period, Vec<BillingRecord>)> {
        let period = match period {
            Some(period) => period,
            None => self
                .store
                .active_period()
                .await
                .map_err(PipelineError::PeriodLookup)?
                .ok_or(PipelineError::NoActivePeriod)?,
        };
        info!("\n📅 发行期次: {}", period);

        self.checker.check(&period).await?;
        self.corrector.correct(&period).await?;
        let records = self.loader.load(&period).await?;

        Ok((period, records))
    }

    /// 失败记录写入清单，写入失败只记日志
    async fn write_failures(&self, period: &Period, failed: &[FailedRecord]) {
        for failure in failed {
            if let Err(e) = self.ledger.write(period, &failure.record, &failure.error).await {
                warn!(
                    "⚠️ 无法写入失败清单 {} (记录 {}): {}",
                    self.ledger.path(),
                    failure.record.record_id,
                    e
                );
            }
        }
    }

    /// 下载发票 PDF
    ///
    /// # 返回
    /// 保存后的文件路径
    pub async fn download_document(
        &self,
        account_id: &str,
        code: &ConfirmationCode,
    ) -> anyhow::Result<PathBuf> {
        self.archive.download(account_id, code).await
    }
}
