//! 发票文件归档 - 业务能力层
//!
//! 按确认码下载 PDF 并保存到本地目录

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::info;

use crate::clients::InvoicingService;
use crate::models::ConfirmationCode;

pub struct DocumentArchive {
    invoicing: Arc<dyn InvoicingService>,
    folder: PathBuf,
}

impl DocumentArchive {
    pub fn new(invoicing: Arc<dyn InvoicingService>, folder: impl Into<PathBuf>) -> Self {
        Self {
            invoicing,
            folder: folder.into(),
        }
    }

    /// 文件名：factura_abonado_<用户>_<确认码>.pdf
    pub fn file_path(&self, account_id: &str, code: &ConfirmationCode) -> PathBuf {
        let safe_code: String = code
            .as_str()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        self.folder
            .join(format!("factura_abonado_{}_{}.pdf", account_id, safe_code))
    }

    /// 下载并保存，返回保存路径
    pub async fn download(&self, account_id: &str, code: &ConfirmationCode) -> Result<PathBuf> {
        let bytes = self
            .invoicing
            .fetch_document(code)
            .await
            .with_context(|| format!("下载发票文件失败 (确认码 {})", code))?;

        ensure_folder(&self.folder).await?;

        let path = self.file_path(account_id, code);
        fs::write(&path, &bytes)
            .await
            .with_context(|| format!("无法写入文件: {}", path.display()))?;

        info!("📄 用户 {} 的发票已保存至 {}", account_id, path.display());
        Ok(path)
    }
}

async fn ensure_folder(folder: &Path) -> Result<()> {
    fs::create_dir_all(folder)
        .await
        .with_context(|| format!("无法创建目录: {}", folder.display()))
}
