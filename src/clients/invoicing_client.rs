//! 电子发票服务客户端
//!
//! 封装所有与开票服务 API 相关的调用逻辑

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::config::Config;
use crate::models::{ConfirmationCode, InvoiceRequest};

const CREATE_ENDPOINT: &str = "api/v1/invoice-utils/third-party-create";
const PDF_ENDPOINT: &str = "api/v1/invoice-utils/pdf";
/// PDF 格式：4 = 标准版式
const PDF_FORMAT: &str = "4";

/// 开票服务错误
#[derive(Debug, Error)]
pub enum InvoicingError {
    #[error("请求失败 ({endpoint}): {source}")]
    Request {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("开票服务返回错误 ({endpoint}) HTTP {status}: {body}")]
    BadStatus {
        endpoint: String,
        status: u16,
        body: String,
    },

    #[error("响应中没有确认码 (cuf): {body}")]
    MissingConfirmation { body: String },

    #[error("响应解析失败 ({endpoint}): {source}")]
    Decode {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
}

/// 开票服务能力
#[async_trait]
pub trait InvoicingService: Send + Sync {
    /// 提交发票，成功时返回确认码
    async fn submit(&self, request: &InvoiceRequest) -> Result<ConfirmationCode, InvoicingError>;

    /// 下载确认码对应的发票文件
    async fn fetch_document(&self, code: &ConfirmationCode) -> Result<Vec<u8>, InvoicingError>;
}

/// 基于 HTTP 的开票服务客户端
pub struct HttpInvoicingClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpInvoicingClient {
    /// 创建新的开票服务客户端
    pub fn new(config: &Config) -> Result<Self, InvoicingError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|source| InvoicingError::Request {
                endpoint: config.invoicing_api_base_url.clone(),
                source,
            })?;

        Ok(Self {
            client,
            base_url: config.invoicing_api_base_url.trim_end_matches('/').to_string(),
            api_key: config.invoicing_api_key.clone(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// 从创建接口的响应中提取确认码
    pub fn extract_confirmation(body: &Value) -> Option<ConfirmationCode> {
        body.get("cuf")
            .and_then(|v| v.as_str())
            .and_then(ConfirmationCode::new)
    }
}

#[async_trait]
impl InvoicingService for HttpInvoicingClient {
    /// 提交发票
    ///
    /// # 返回
    /// 服务只在 HTTP 201 时视为已受理
    async fn submit(&self, request: &InvoiceRequest) -> Result<ConfirmationCode, InvoicingError> {
        let endpoint = self.endpoint(CREATE_ENDPOINT);

        let response = self
            .client
            .post(&endpoint)
            .header("api_key", &self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|source| InvoicingError::Request {
                endpoint: endpoint.clone(),
                source,
            })?;

        let status = response.status();
        if status != StatusCode::CREATED {
            let body = response.text().await.unwrap_or_default();
            if let Ok(payload) = serde_json::to_string(request) {
                debug!("被拒绝的请求体: {}", payload);
            }
            return Err(InvoicingError::BadStatus {
                endpoint,
                status: status.as_u16(),
                body,
            });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|source| InvoicingError::Decode {
                endpoint: endpoint.clone(),
                source,
            })?;

        debug!("开票结果: {}", body);

        Self::extract_confirmation(&body).ok_or_else(|| InvoicingError::MissingConfirmation {
            body: body.to_string(),
        })
    }

    async fn fetch_document(&self, code: &ConfirmationCode) -> Result<Vec<u8>, InvoicingError> {
        let endpoint = self.endpoint(PDF_ENDPOINT);

        let response = self
            .client
            .get(&endpoint)
            .header("api_key", &self.api_key)
            .query(&[("cuf", code.as_str()), ("formato", PDF_FORMAT)])
            .send()
            .await
            .map_err(|source| InvoicingError::Request {
                endpoint: endpoint.clone(),
                source,
            })?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(InvoicingError::BadStatus {
                endpoint,
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|source| InvoicingError::Decode {
                endpoint: endpoint.clone(),
                source,
            })?;

        Ok(bytes.to_vec())
    }
}
