use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("无法读取配置文件 {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("配置文件 {path} 解析失败: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("配置无效: {0}")]
    Invalid(String),
}

/// 开票方信息
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct IssuerConfig {
    pub nit: u64,
    pub business_name: String,
    pub municipality: String,
    pub city: String,
    pub phone: String,
    pub address: String,
    pub activity_code: i64,
    pub product_sin_code: i64,
    pub user: String,
    pub legend: String,
}

impl Default for IssuerConfig {
    fn default() -> Self {
        Self {
            nit: 1023807025,
            business_name: "EMPSAAT".to_string(),
            municipality: "TUPIZA".to_string(),
            city: "Tupiza".to_string(),
            phone: "(2) 6944636".to_string(),
            address: "Calle Bolivar S/N Zona central".to_string(),
            activity_code: 360000,
            product_sin_code: 86330,
            user: "Santiago".to_string(),
            legend: "hola".to_string(),
        }
    }
}

/// 程序配置文件
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// 同时在途的开票请求数量
    pub max_concurrent_submissions: usize,
    /// 计费数据库连接串
    pub database_url: String,
    // --- 开票服务配置 ---
    pub invoicing_api_base_url: String,
    pub invoicing_api_key: String,
    pub request_timeout_secs: u64,
    /// 序号修正偏移量：Num_Factura = Factura - offset
    pub numbering_offset: i64,
    /// PDF 保存目录
    pub documents_folder: String,
    /// 失败记录清单
    pub failure_ledger_file: String,
    /// 输出日志文件
    pub output_log_file: String,
    /// 是否显示详细日志
    pub verbose_logging: bool,
    pub issuer: IssuerConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_concurrent_submissions: 100,
            database_url: "sqlite:facturacion.db".to_string(),
            invoicing_api_base_url: "http://192.168.0.102:3001".to_string(),
            invoicing_api_key: String::new(),
            request_timeout_secs: 30,
            numbering_offset: 1707433,
            documents_folder: "facturas".to_string(),
            failure_ledger_file: "fallos.txt".to_string(),
            output_log_file: "output.txt".to_string(),
            verbose_logging: false,
            issuer: IssuerConfig::default(),
        }
    }
}

impl Config {
    /// 从环境变量读取，未设置的项使用默认值
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// 从 TOML 文件读取，缺失的项使用默认值
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// 加载配置：`CONFIG_FILE`（可选）→ 环境变量覆盖 → 校验
    pub fn load() -> Result<Self, ConfigError> {
        let config = match std::env::var("CONFIG_FILE") {
            Ok(path) => Self::from_file(path)?.with_env_overrides(),
            Err(_) => Self::from_env(),
        };
        config.validate()?;
        Ok(config)
    }

    fn with_env_overrides(self) -> Self {
        Self {
            max_concurrent_submissions: env_parse(
                "MAX_CONCURRENT_SUBMISSIONS",
                self.max_concurrent_submissions,
            ),
            database_url: env_or("DATABASE_URL", self.database_url),
            invoicing_api_base_url: env_or("INVOICING_API_BASE_URL", self.invoicing_api_base_url),
            invoicing_api_key: env_or("INVOICING_API_KEY", self.invoicing_api_key),
            request_timeout_secs: env_parse("REQUEST_TIMEOUT_SECS", self.request_timeout_secs),
            numbering_offset: env_parse("NUMBERING_OFFSET", self.numbering_offset),
            documents_folder: env_or("DOCUMENTS_FOLDER", self.documents_folder),
            failure_ledger_file: env_or("FAILURE_LEDGER_FILE", self.failure_ledger_file),
            output_log_file: env_or("OUTPUT_LOG_FILE", self.output_log_file),
            verbose_logging: env_parse("VERBOSE_LOGGING", self.verbose_logging),
            issuer: self.issuer,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent_submissions == 0 {
            return Err(ConfigError::Invalid(
                "max_concurrent_submissions 必须大于 0".to_string(),
            ));
        }
        if self.invoicing_api_base_url.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "invoicing_api_base_url 不能为空".to_string(),
            ));
        }
        if self.database_url.trim().is_empty() {
            return Err(ConfigError::Invalid("database_url 不能为空".to_string()));
        }
        Ok(())
    }
}

fn env_or(key: &str, default: String) -> String {
    std::env::var(key).unwrap_or(default)
}

/// 无法解析的值按未设置处理
fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
