//! # Facturación Masiva
//!
//! 一个用于按期次批量开具水费电子发票的 Rust 应用程序
//!
//! ## 架构设计
//!
//! 本系统采用严格的四层架构：
//!
//! ### ① 基础设施层（Infrastructure / Clients）
//! - `infrastructure/` - 持有数据库连接池，只暴露存储能力
//! - `RecordStore` - 计费记录存储接口（SQLite / 内存两种实现）
//! - `clients/` - 开票服务 HTTP 客户端
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"
//! - `PreconditionChecker` - 缺失读数检查
//! - `NumberingCorrector` - 发票序号修正
//! - `BatchLoader` - 加载待开票记录
//! - `InvoiceFormatter` - 生成开票请求体
//! - `FailureLedger` - 写失败清单
//! - `DocumentArchive` - 下载并保存发票 PDF
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一条记录"的完整处理流程
//! - `RecordCtx` - 上下文封装（用户 + 记录 + 序号）
//! - `InvoiceFlow` - 流程编排（生成请求体 → 提交 → 写确认码）
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/pipeline` - 按阶段执行一次批量开票
//! - `orchestrator/batch_processor` - 并发派发、汇合、取消
//! - `orchestrator/progress` - 进度汇总与汇报
//!
//! ## 模块结构

pub mod clients;
pub mod config;
pub mod error;
pub mod infrastructure;

pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use clients::{HttpInvoicingClient, InvoicingError, InvoicingService};
pub use config::{Config, ConfigError, IssuerConfig};
pub use error::{PipelineError, PipelineResult, RecordError};
pub use infrastructure::{InMemoryRecordStore, RecordStore, SqliteRecordStore, StoreError};
pub use models::{BillingRecord, ConfirmationCode, InvoiceRequest, Period};
pub use orchestrator::{App, RunSummary, SubmissionOrchestrator};
pub use workflow::{InvoiceFlow, RecordCtx, RecordOutcome};
