//! 日志工具模块
//!
//! 提供日志初始化、格式化和输出的辅助函数

use anyhow::{Context, Result};
use std::fs::{self, OpenOptions};
use std::io::Write;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::orchestrator::RunSummary;

/// 初始化 tracing 订阅者
///
/// `RUST_LOG` 优先；未设置时 `verbose` 决定默认级别（debug / info）。
/// 重复调用不会报错。
pub fn init(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// 初始化日志文件
///
/// # 参数
/// - `log_file_path`: 日志文件路径
pub fn init_log_file(log_file_path: &str) -> Result<()> {
    let log_header = format!(
        "{}\n批量开票日志 - {}\n{}\n\n",
        "=".repeat(60),
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
        "=".repeat(60)
    );
    fs::write(log_file_path, log_header)
        .with_context(|| format!("无法写入日志文件 {}", log_file_path))?;
    Ok(())
}

/// 向日志文件追加内容
pub fn append_log(log_file_path: &str, text: &str) -> Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file_path)
        .with_context(|| format!("无法打开日志文件 {}", log_file_path))?;
    file.write_all(text.as_bytes())?;
    Ok(())
}

/// 记录程序启动信息
pub fn log_startup(config: &Config) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - 批量开票模式");
    info!("🏢 开票单位: {} (NIT {})", config.issuer.business_name, config.issuer.nit);
    info!("🌐 开票服务: {}", config.invoicing_api_base_url);
    info!("📊 最大并发数: {}", config.max_concurrent_submissions);
    info!("{}", "=".repeat(60));
}

/// 记录待开票记录加载信息
///
/// # 参数
/// - `period`: 发行期次
/// - `total`: 记录总数
/// - `max_concurrent`: 最大并发数
pub fn log_batch_loaded(period: &str, total: usize, max_concurrent: usize) {
    info!("✓ 期次 {} 找到 {} 条待开票记录", period, total);
    info!("📋 同时在途的请求不超过 {} 个", max_concurrent);
}

/// 打印最终统计信息
///
/// # 参数
/// - `summary`: 本次运行汇总
/// - `ledger_path`: 失败清单路径
pub fn print_final_stats(summary: &RunSummary, ledger_path: &str) {
    info!("\n{}", "=".repeat(60));
    info!("📊 期次 {} 开票完成统计", summary.period);
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    info!("✅ 成功: {}/{}", summary.succeeded, summary.total);
    info!("❌ 失败: {}", summary.failed);
    if summary.cancelled {
        info!("⏹️ 已取消，未派发: {}", summary.skipped);
    }
    info!("⏳ 仍待开票: {}", summary.remaining_pending);
    info!("{}", "=".repeat(60));
    if summary.failed > 0 {
        info!("\n失败记录已写入: {}", ledger_path);
    }
}
