//! 发票期次（Emisión）
//!
//! 期次令牌既可以是 `YYYY-MM`，也可以是完整的发行日期 `YYYY-MM-DD`。
//! 存储层按令牌字符串做精确比较，所以这里只校验，不做归一化。

use chrono::{Datelike, NaiveDate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;
use thiserror::Error;

/// 期次解析错误
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PeriodError {
    #[error("期次格式无效 (应为 YYYY-MM 或 YYYY-MM-DD): {0}")]
    InvalidFormat(String),
    #[error("期次日期不存在: {0}")]
    InvalidDate(String),
}

fn period_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(\d{4})-(\d{2})(?:-(\d{2}))?$").unwrap_or_else(|e| panic!("期次正则无效: {e}"))
    })
}

/// 发票期次
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Period {
    token: String,
    year: i32,
    month: u32,
}

impl Period {
    /// 解析期次令牌
    pub fn parse(token: &str) -> Result<Self, PeriodError> {
        let token = token.trim();
        let caps = period_pattern()
            .captures(token)
            .ok_or_else(|| PeriodError::InvalidFormat(token.to_string()))?;

        let year: i32 = caps[1]
            .parse()
            .map_err(|_| PeriodError::InvalidFormat(token.to_string()))?;
        let month: u32 = caps[2]
            .parse()
            .map_err(|_| PeriodError::InvalidFormat(token.to_string()))?;
        let day: u32 = match caps.get(3) {
            Some(d) => d
                .as_str()
                .parse()
                .map_err(|_| PeriodError::InvalidFormat(token.to_string()))?,
            None => 1,
        };

        let date = NaiveDate::from_ymd_opt(year, month, day)
            .ok_or_else(|| PeriodError::InvalidDate(token.to_string()))?;

        Ok(Self {
            token: token.to_string(),
            year: date.year(),
            month: date.month(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.token
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    /// 月份（1-12）
    pub fn month(&self) -> u32 {
        self.month
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.token)
    }
}

impl FromStr for Period {
    type Err = PeriodError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Period {
    type Error = PeriodError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Period> for String {
    fn from(period: Period) -> Self {
        period.token
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_month_token() {
        let period = Period::parse("2024-05").unwrap();
        assert_eq!(period.as_str(), "2024-05");
        assert_eq!(period.year(), 2024);
        assert_eq!(period.month(), 5);
    }

    #[test]
    fn test_parse_full_date_token() {
        let period: Period = "2024-05-01".parse().unwrap();
        assert_eq!(period.as_str(), "2024-05-01");
        assert_eq!(period.month(), 5);
    }

    #[test]
    fn test_rejects_bad_tokens() {
        assert!(matches!(
            Period::parse("05-2024"),
            Err(PeriodError::InvalidFormat(_))
        ));
        assert!(matches!(
            Period::parse("2024-13"),
            Err(PeriodError::InvalidDate(_))
        ));
        assert!(matches!(
            Period::parse("2024-02-30"),
            Err(PeriodError::InvalidDate(_))
        ));
    }
}
