//! 进度汇报
//!
//! 三个结果列表和计数器被最多 N 个并发任务同时更新，
//! 所有更新都在同一把锁内完成，并在锁内通知 [`ProgressSink`]，
//! 保证展示层看到的进度单调不减。

use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tracing::info;

use crate::error::RecordError;
use crate::models::{BillingRecord, ConfirmationCode};
use crate::workflow::RecordOutcome;

/// 进度快照
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub total: usize,
}

impl ProgressSnapshot {
    /// 成功比例，范围 [0, 1]；总数为 0 时为 0
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        (self.succeeded as f64 / self.total as f64).clamp(0.0, 1.0)
    }
}

/// 处理阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// 查询与检查
    Verification,
    /// 开票
    Invoicing,
    /// 复核
    Review,
}

impl Stage {
    pub fn label(self) -> &'static str {
        match self {
            Stage::Verification => "Consultar y verificar",
            Stage::Invoicing => "Facturación",
            Stage::Review => "Revisión y validación",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StageStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
}

/// 进度接收方（展示层实现）
pub trait ProgressSink: Send + Sync {
    fn on_progress(&self, snapshot: ProgressSnapshot);

    fn on_stage(&self, _stage: Stage, _status: StageStatus) {}
}

/// 丢弃所有进度
pub struct NoopSink;

impl ProgressSink for NoopSink {
    fn on_progress(&self, _snapshot: ProgressSnapshot) {}
}

/// 写日志，每 `every` 条以及最后一条输出一次
pub struct LoggingSink {
    every: usize,
}

impl LoggingSink {
    pub fn new(every: usize) -> Self {
        Self {
            every: every.max(1),
        }
    }
}

impl Default for LoggingSink {
    fn default() -> Self {
        Self::new(50)
    }
}

impl ProgressSink for LoggingSink {
    fn on_progress(&self, s: ProgressSnapshot) {
        if s.processed % self.every == 0 || s.processed == s.total {
            info!(
                "📈 处理发票 {}/{}, 成功 = {}, 失败 = {} ({:.1}%)",
                s.processed,
                s.total,
                s.succeeded,
                s.failed,
                s.fraction() * 100.0
            );
        }
    }

    fn on_stage(&self, stage: Stage, status: StageStatus) {
        info!("🧭 阶段 [{}] → {:?}", stage.label(), status);
    }
}

/// 展示层订阅的最新状态
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ProgressView {
    pub snapshot: ProgressSnapshot,
    pub verification: StageStatus,
    pub invoicing: StageStatus,
    pub review: StageStatus,
}

impl ProgressView {
    pub fn stage(&self, stage: Stage) -> StageStatus {
        match stage {
            Stage::Verification => self.verification,
            Stage::Invoicing => self.invoicing,
            Stage::Review => self.review,
        }
    }
}

/// 通过 `watch` 通道推送最新进度
pub struct WatchSink {
    tx: watch::Sender<ProgressView>,
}

impl WatchSink {
    pub fn channel() -> (Self, watch::Receiver<ProgressView>) {
        let (tx, rx) = watch::channel(ProgressView::default());
        (Self { tx }, rx)
    }
}

impl ProgressSink for WatchSink {
    fn on_progress(&self, snapshot: ProgressSnapshot) {
        self.tx.send_modify(|view| view.snapshot = snapshot);
    }

    fn on_stage(&self, stage: Stage, status: StageStatus) {
        self.tx.send_modify(|view| match stage {
            Stage::Verification => view.verification = status,
            Stage::Invoicing => view.invoicing = status,
            Stage::Review => view.review = status,
        });
    }
}

#[derive(Debug, Clone)]
pub struct SucceededRecord {
    pub record: BillingRecord,
    pub code: ConfirmationCode,
}

#[derive(Debug)]
pub struct FailedRecord {
    pub record: BillingRecord,
    pub error: RecordError,
}

/// 汇总结果
#[derive(Debug, Default)]
pub struct Aggregated {
    pub attempted: Vec<BillingRecord>,
    pub succeeded: Vec<SucceededRecord>,
    pub failed: Vec<FailedRecord>,
}

#[derive(Debug, Default)]
struct Accumulator {
    total: usize,
    results: Aggregated,
}

impl Accumulator {
    fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            processed: self.results.attempted.len(),
            succeeded: self.results.succeeded.len(),
            failed: self.results.failed.len(),
            total: self.total,
        }
    }
}

/// 进度汇报器
///
/// 以 `Arc` 共享给每个开票任务。
pub struct ProgressReporter {
    state: Mutex<Accumulator>,
    sink: Arc<dyn ProgressSink>,
}

impl ProgressReporter {
    pub fn new(total: usize, sink: Arc<dyn ProgressSink>) -> Self {
        Self {
            state: Mutex::new(Accumulator {
                total,
                results: Aggregated::default(),
            }),
            sink,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Accumulator> {
        // 任务 panic 不会留下半更新的状态（每次更新都在一个作用域内完成）
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// 记录一条终态结果并通知接收方
    pub fn record(&self, record: BillingRecord, outcome: RecordOutcome) -> ProgressSnapshot {
        let mut state = self.lock();
        state.results.attempted.push(record.clone());
        match outcome {
            RecordOutcome::Success(code) => {
                state.results.succeeded.push(SucceededRecord { record, code })
            }
            RecordOutcome::Failure(error) => state.results.failed.push(FailedRecord { record, error }),
        }
        let snapshot = state.snapshot();
        self.sink.on_progress(snapshot);
        snapshot
    }

    /// 记录一个异常终止的任务
    ///
    /// 任务可能在结果入账之后才 panic（例如接收方 panic），
    /// 已入账的记录不再重复计入，返回 `false`。
    pub fn record_aborted(&self, record: BillingRecord, reason: String) -> bool {
        {
            let state = self.lock();
            if state
                .results
                .attempted
                .iter()
                .any(|r| r.record_id == record.record_id)
            {
                return false;
            }
        }
        self.record(
            record,
            RecordOutcome::Failure(RecordError::TaskAborted(reason)),
        );
        true
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        self.lock().snapshot()
    }

    /// 取出汇总结果（之后计数归零，总数不变）
    pub fn take_results(&self) -> Aggregated {
        std::mem::take(&mut self.lock().results)
    }
}
