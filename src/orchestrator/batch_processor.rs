//! 批量开票处理器 - 编排层
//!
//! ## 职责
//!
//! 把一批待开票记录分派给并发任务，等待全部结束后汇总结果。
//!
//! ## 核心功能
//!
//! 1. **并发控制**：使用 Semaphore 限制同时在途的开票请求数量
//! 2. **任务派发**：每条记录一个 `tokio::spawn` 任务，记录按值移入任务
//! 3. **汇合屏障**：等待所有 JoinHandle，异常终止的任务也计为失败
//! 4. **协作取消**：取消后不再派发新任务，已派发的任务照常完成
//!
//! 单条记录的处理细节委托给 [`InvoiceFlow`]。

use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::models::{BillingRecord, Period};
use crate::orchestrator::progress::{FailedRecord, ProgressReporter, SucceededRecord};
use crate::workflow::{InvoiceFlow, RecordCtx};

/// 一批记录的处理结果
///
/// 不变量：`attempted.len() == succeeded.len() + failed.len()`
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub attempted: Vec<BillingRecord>,
    pub succeeded: Vec<SucceededRecord>,
    pub failed: Vec<FailedRecord>,
    /// 因取消而未派发的记录数
    pub skipped: usize,
    pub cancelled: bool,
}

impl BatchOutcome {
    pub fn total(&self) -> usize {
        self.attempted.len() + self.skipped
    }
}

/// 批量开票处理器
pub struct SubmissionOrchestrator {
    flow: Arc<InvoiceFlow>,
    max_concurrent: usize,
}

impl SubmissionOrchestrator {
    pub fn new(flow: Arc<InvoiceFlow>, max_concurrent: usize) -> Self {
        Self {
            flow,
            max_concurrent: max_concurrent.max(1),
        }
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// 处理一批记录
    ///
    /// # 参数
    /// - `period`: 发行期次
    /// - `records`: 按序号排好的待开票记录
    /// - `reporter`: 进度汇报器，每条记录结束时更新
    /// - `cancel`: 取消令牌
    ///
    /// # 返回
    /// 汇总结果；单条记录的失败不会中断其他记录
    pub async fn process_batch(
        &self,
        period: &Period,
        records: Vec<BillingRecord>,
        reporter: &Arc<ProgressReporter>,
        cancel: &CancellationToken,
    ) -> BatchOutcome {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let total = records.len();
        let mut handles: Vec<(BillingRecord, JoinHandle<()>)> = Vec::with_capacity(total);
        let mut skipped = 0;

        for (idx, record) in records.into_iter().enumerate() {
            if cancel.is_cancelled() {
                skipped = total - idx;
                break;
            }

            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                permit = semaphore.clone().acquire_owned() => permit.ok(),
            };
            let Some(permit) = permit else {
                skipped = total - idx;
                break;
            };

            let flow = self.flow.clone();
            let reporter_clone = reporter.clone();
            let period_clone = period.clone();
            let key = record.clone();

            let handle = tokio::spawn(async move {
                let _permit = permit;
                let outcome = flow.run(&record, &period_clone).await;
                reporter_clone.record(record, outcome);
            });
            handles.push((key, handle));
        }

        if skipped > 0 {
            warn!(
                "⏹️ 已取消：{} 条记录未派发，保持待开票状态，等待已派发的 {} 个任务结束",
                skipped,
                handles.len()
            );
        }

        // 等待所有已派发的任务完成
        let joined = join_all(
            handles
                .into_iter()
                .map(|(record, handle)| async move { (record, handle.await) }),
        )
        .await;
        for (record, result) in joined {
            if let Err(e) = result {
                error!("{} 任务执行失败: {}", RecordCtx::of(&record), e);
                // 结果已入账后才 panic 的任务不再重复计数
                reporter.record_aborted(record, e.to_string());
            }
        }

        let results = reporter.take_results();
        info!(
            "✓ 批次结束: 派发 {} 条, 成功 {}, 失败 {}, 未派发 {}",
            results.attempted.len(),
            results.succeeded.len(),
            results.failed.len(),
            skipped
        );

        BatchOutcome {
            attempted: results.attempted,
            succeeded: results.succeeded,
            failed: results.failed,
            skipped,
            cancelled: skipped > 0 || cancel.is_cancelled(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::{InvoicingError, InvoicingService};
    use crate::config::IssuerConfig;
    use crate::infrastructure::{InMemoryRecordStore, RecordStore};
    use crate::models::{Charges, ConfirmationCode, InvoiceRequest};
    use crate::orchestrator::progress::{NoopSink, ProgressSink, ProgressSnapshot};
    use crate::services::InvoiceFormatter;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    /// 记录最大并发数的开票服务
    #[derive(Default)]
    struct SlowService {
        in_flight: AtomicUsize,
        max_seen: AtomicUsize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl InvoicingService for SlowService {
        async fn submit(&self, request: &InvoiceRequest) -> Result<ConfirmationCode, InvoicingError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_seen.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(ConfirmationCode::new(format!("CUF-{}", request.cabecera.codigo_cliente)).unwrap())
        }

        async fn fetch_document(&self, _code: &ConfirmationCode) -> Result<Vec<u8>, InvoicingError> {
            Ok(Vec::new())
        }
    }

    fn setup(count: i64) -> (Arc<InMemoryRecordStore>, Period, Vec<BillingRecord>) {
        let store = Arc::new(InMemoryRecordStore::new());
        let period = Period::parse("2024-05").unwrap();
        let mut records = Vec::new();
        for id in 1..=count {
            let record = BillingRecord {
                record_id: id,
                sequence_number: id,
                account_id: id.to_string(),
                charges: Charges {
                    base_total: 10.0,
                    invoiced_total: 10.0,
                    ..Charges::default()
                },
                ..BillingRecord::default()
            };
            store.insert_record(&period, record.clone()).unwrap();
            records.push(record);
        }
        (store, period, records)
    }

    fn orchestrator(
        store: Arc<InMemoryRecordStore>,
        service: Arc<SlowService>,
        max_concurrent: usize,
    ) -> SubmissionOrchestrator {
        let store: Arc<dyn RecordStore> = store;
        let flow = InvoiceFlow::new(
            Arc::new(InvoiceFormatter::new(IssuerConfig::default())),
            service,
            store,
        );
        SubmissionOrchestrator::new(Arc::new(flow), max_concurrent)
    }

    #[tokio::test]
    async fn test_in_flight_never_exceeds_permits() {
        let (store, period, records) = setup(40);
        let service = Arc::new(SlowService::default());
        let orchestrator = orchestrator(store.clone(), service.clone(), 7);
        let reporter = Arc::new(ProgressReporter::new(records.len(), Arc::new(NoopSink)));

        let outcome = orchestrator
            .process_batch(&period, records, &reporter, &CancellationToken::new())
            .await;

        assert_eq!(outcome.succeeded.len(), 40);
        assert!(outcome.failed.is_empty());
        assert!(!outcome.cancelled);
        assert!(service.max_seen.load(Ordering::SeqCst) <= 7);
        assert_eq!(store.confirmed_count(&period).unwrap(), 40);
    }

    #[tokio::test]
    async fn test_cancelled_before_start_dispatches_nothing() {
        let (store, period, records) = setup(5);
        let service = Arc::new(SlowService::default());
        let orchestrator = orchestrator(store.clone(), service.clone(), 2);
        let reporter = Arc::new(ProgressReporter::new(records.len(), Arc::new(NoopSink)));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = orchestrator.process_batch(&period, records, &reporter, &cancel).await;

        assert!(outcome.cancelled);
        assert_eq!(outcome.skipped, 5);
        assert_eq!(outcome.total(), 5);
        assert!(outcome.attempted.is_empty());
        assert_eq!(service.calls.load(Ordering::SeqCst), 0);
        assert_eq!(store.confirmed_count(&period).unwrap(), 0);
    }

    /// 第一次收到进度时 panic
    #[derive(Default)]
    struct PanicOnceSink {
        fired: AtomicBool,
    }

    impl ProgressSink for PanicOnceSink {
        fn on_progress(&self, _snapshot: ProgressSnapshot) {
            if !self.fired.swap(true, Ordering::SeqCst) {
                panic!("progress sink failure");
            }
        }
    }

    #[tokio::test]
    async fn test_sink_panic_after_recording_is_counted_once() {
        let (store, period, records) = setup(6);
        let service = Arc::new(SlowService::default());
        let orchestrator = orchestrator(store.clone(), service, 2);
        let reporter = Arc::new(ProgressReporter::new(
            records.len(),
            Arc::new(PanicOnceSink::default()),
        ));

        let outcome = orchestrator
            .process_batch(&period, records, &reporter, &CancellationToken::new())
            .await;

        assert_eq!(outcome.attempted.len(), 6);
        assert_eq!(outcome.succeeded.len(), 6);
        assert!(outcome.failed.is_empty());
        let ids: HashSet<i64> = outcome.attempted.iter().map(|r| r.record_id).collect();
        assert_eq!(ids.len(), 6);
        assert_eq!(store.confirmed_count(&period).unwrap(), 6);
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let (store, period, _) = setup(0);
        let service = Arc::new(SlowService::default());
        let orchestrator = orchestrator(store, service, 3);
        let reporter = Arc::new(ProgressReporter::new(0, Arc::new(NoopSink)));

        let outcome = orchestrator
            .process_batch(&period, Vec::new(), &reporter, &CancellationToken::new())
            .await;

        assert_eq!(outcome.total(), 0);
        assert_eq!(reporter.snapshot().fraction(), 0.0);
    }
}
