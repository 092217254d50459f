//! 失败清单写入服务 - 业务能力层
//!
//! 只负责"把开票失败的记录追加到清单文件"，不关心流程

use anyhow::Result;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::RecordError;
use crate::models::{BillingRecord, Period};

/// 失败清单写入服务
///
/// 职责：
/// - 将开票失败的记录写入清单，供人工核对
/// - 只处理单条记录
/// - `PERSIST_FAILED` 行带有服务端已返回的确认码，便于对账
pub struct FailureLedger {
    ledger_path: String,
}

impl FailureLedger {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            ledger_path: path.into(),
        }
    }

    pub fn path(&self) -> &str {
        &self.ledger_path
    }

    /// 追加一条失败记录
    pub async fn write(
        &self,
        period: &Period,
        record: &BillingRecord,
        error: &RecordError,
    ) -> Result<()> {
        debug!(
            "写入失败清单: 记录 {} | 用户 {} | {}",
            record.record_id,
            record.account_id,
            error.kind()
        );

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.ledger_path)
            .await?;

        file.write_all(format_entry(period, record, error).as_bytes())
            .await?;
        // tokio 的文件写入在后台线程完成，返回前必须等它落盘
        file.flush().await?;

        Ok(())
    }
}

fn format_entry(period: &Period, record: &BillingRecord, error: &RecordError) -> String {
    format!(
        "{} | 期次 {} | 用户 {} | 记录 {} | 序号 {} | {} | {}\n",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
        period,
        record.account_id,
        record.record_id,
        record.sequence_number,
        error.kind(),
        error
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::StoreError;
    use crate::models::ConfirmationCode;

    #[tokio::test]
    async fn test_appends_entries() {
        let path = std::env::temp_dir().join(format!(
            "fallos_test_{}_{}.txt",
            std::process::id(),
            chrono::Local::now().timestamp_nanos_opt().unwrap_or_default()
        ));
        let ledger = FailureLedger::new(path.to_string_lossy().to_string());
        let period = Period::parse("2024-05").unwrap();
        let record = BillingRecord {
            record_id: 8,
            sequence_number: 3,
            account_id: "1520".to_string(),
            ..BillingRecord::default()
        };
        let error = RecordError::Persist {
            code: ConfirmationCode::new("CUF-8").unwrap(),
            source: StoreError::Database("disk I/O error".to_string()),
        };

        ledger.write(&period, &record, &error).await.unwrap();
        ledger
            .write(&period, &record, &RecordError::TaskAborted("panic".to_string()))
            .await
            .unwrap();

        let content = tokio::fs::read_to_string(&path).await.unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("PERSIST_FAILED"));
        assert!(lines[0].contains("CUF-8"));
        assert!(lines[0].contains("用户 1520"));
        assert!(lines[1].contains("TASK_ABORTED"));

        let _ = tokio::fs::remove_file(&path).await;
    }

    #[tokio::test]
    async fn test_entries_visible_as_soon_as_write_returns() {
        let path = std::env::temp_dir().join(format!(
            "fallos_visible_{}_{}.txt",
            std::process::id(),
            chrono::Local::now().timestamp_nanos_opt().unwrap_or_default()
        ));
        let ledger = FailureLedger::new(path.to_string_lossy().to_string());
        let period = Period::parse("2024-05").unwrap();
        let error = RecordError::TaskAborted("panic".to_string());

        for round in 1..=10 {
            for n in 0..20 {
                let record = BillingRecord {
                    record_id: n,
                    ..BillingRecord::default()
                };
                ledger.write(&period, &record, &error).await.unwrap();
            }
            let content = std::fs::read_to_string(&path).unwrap();
            assert_eq!(content.lines().count(), round * 20, "第 {} 轮", round);
        }

        let _ = tokio::fs::remove_file(&path).await;
    }
}
