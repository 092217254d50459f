//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 编排层是系统的顶层，负责：
//! - 持有外部资源（记录存储、开票服务）
//! - 按阶段执行一次批量开票
//! - 控制并发与取消
//! - 汇总统计和进度汇报
//!
//! ## 模块层次
//!
//! ```text
//! pipeline::App (检查 → 开票 → 复核)
//!     ↓
//! batch_processor (处理 Vec<BillingRecord>)
//!     ↓
//! workflow::InvoiceFlow (处理单条记录)
//!     ↓
//! services (能力层：检查 / 修正 / 加载 / 生成请求体 / 清单)
//!     ↓
//! infrastructure + clients (存储、开票服务)
//! ```
//!
//! ## 设计原则
//!
//! 1. **单一职责**：pipeline 管阶段，batch_processor 管并发
//! 2. **资源隔离**：只有编排层持有存储和开票服务
//! 3. **向下依赖**：编排层 → workflow → services → infrastructure
//! 4. **无业务逻辑**：只做调度和统计，不做具体业务判断

pub mod batch_processor;
pub mod pipeline;
pub mod progress;

// 重新导出主要类型
pub use batch_processor::{BatchOutcome, SubmissionOrchestrator};
pub use pipeline::{App, RunSummary};
pub use progress::{
    FailedRecord, LoggingSink, NoopSink, ProgressReporter, ProgressSink, ProgressSnapshot,
    ProgressView, Stage, StageStatus, SucceededRecord, WatchSink,
};
