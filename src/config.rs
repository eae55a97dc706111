use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::errors::{PipelineError, Result};
use crate::models::record::{RAW_COLUMNS, TEXT_FIELDS};

/// 默认的缺失值标记（比较时忽略大小写）
pub const DEFAULT_NA_TOKENS: [&str; 5] = ["", "na", "n/a", "null", "-"];

/// 原始CSV表头到规范列名的默认映射
pub const DEFAULT_COLUMN_NAMES: [(&str, &str); 10] = [
    ("Trade Date", "trade_date"),
    ("Ticker", "ticker"),
    ("Open Price", "open_price"),
    ("Close Price", "close_price"),
    ("Volume", "volume"),
    ("Sector", "sector"),
    ("Validated", "validated"),
    ("Currency", "currency"),
    ("Exchange", "exchange"),
    ("Notes", "notes"),
];

pub struct Config {
    pub raw_csv_path: PathBuf,
    pub cleaned_path: PathBuf,
    pub daily_avg_path: PathBuf,
    pub ticker_avg_path: PathBuf,
    pub report_path: PathBuf,
    pub column_names: Vec<(String, String)>,
    pub na_tokens: Vec<String>,
    pub text_columns: Vec<String>,
    pub default_ticker_count: usize,
}

impl Config {
    pub fn new() -> Self {
        Self::default().with_data_dir("data")
    }

    /// 所有输入输出路径都放到 `dir` 之下
    pub fn with_data_dir(mut self, dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        let processed = dir.join("processed");
        self.raw_csv_path = dir.join("raw").join("stock_market.csv");
        self.cleaned_path = processed.join("cleaned.arrow");
        self.daily_avg_path = processed.join("agg1.arrow");
        self.ticker_avg_path = processed.join("agg2.arrow");
        self.report_path = processed.join("report.json");
        self
    }

    pub fn with_raw_csv_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.raw_csv_path = path.into();
        self
    }

    pub fn with_column_names(mut self, names: Vec<(String, String)>) -> Self {
        self.column_names = names;
        self
    }

    pub fn with_na_tokens(mut self, tokens: &[&str]) -> Self {
        self.na_tokens = tokens.iter().map(|t| t.to_lowercase()).collect();
        self
    }

    pub fn with_text_columns(mut self, columns: &[&str]) -> Self {
        self.text_columns = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn with_default_ticker_count(mut self, count: usize) -> Self {
        self.default_ticker_count = count;
        self
    }

    /// 原始表头对应的规范列名
    pub fn canonical_name(&self, raw_header: &str) -> Option<&str> {
        self.column_names
            .iter()
            .find(|(raw, _)| raw == raw_header)
            .map(|(_, canonical)| canonical.as_str())
    }

    /// 检查列映射与文本列配置是否自洽
    pub fn validate(&self) -> Result<()> {
        let mapped: HashSet<&str> = self.column_names.iter().map(|(_, c)| c.as_str()).collect();
        let missing: Vec<&str> = RAW_COLUMNS.iter().copied().filter(|c| !mapped.contains(c)).collect();
        if !missing.is_empty() {
            return Err(PipelineError::ConfigError(format!(
                "column map does not cover: {}", missing.join(", ")
            )));
        }
        if let Some(unknown) = mapped.iter().find(|c| !RAW_COLUMNS.contains(*c)) {
            return Err(PipelineError::ConfigError(format!(
                "column map targets unknown column: {}", unknown
            )));
        }
        if let Some(bad) = self.text_columns.iter().find(|c| !TEXT_FIELDS.contains(&c.as_str())) {
            return Err(PipelineError::ConfigError(format!(
                "{} is not a text column", bad
            )));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            raw_csv_path: PathBuf::new(),
            cleaned_path: PathBuf::new(),
            daily_avg_path: PathBuf::new(),
            ticker_avg_path: PathBuf::new(),
            report_path: PathBuf::new(),
            column_names: DEFAULT_COLUMN_NAMES
                .iter()
                .map(|(raw, canonical)| (raw.to_string(), canonical.to_string()))
                .collect(),
            na_tokens: DEFAULT_NA_TOKENS.iter().map(|t| t.to_string()).collect(),
            text_columns: TEXT_FIELDS.iter().map(|c| c.to_string()).collect(),
            default_ticker_count: 3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_dir_reroots_every_path() {
        let config = Config::new().with_data_dir("/tmp/run");
        assert_eq!(config.raw_csv_path, PathBuf::from("/tmp/run/raw/stock_market.csv"));
        assert_eq!(config.cleaned_path, PathBuf::from("/tmp/run/processed/cleaned.arrow"));
        assert_eq!(config.daily_avg_path, PathBuf::from("/tmp/run/processed/agg1.arrow"));
        assert_eq!(config.ticker_avg_path, PathBuf::from("/tmp/run/processed/agg2.arrow"));
    }

    #[test]
    fn defaults_validate() {
        assert!(Config::new().validate().is_ok());
        assert_eq!(Config::new().canonical_name("Close Price"), Some("close_price"));
    }

    #[test]
    fn numeric_text_column_is_rejected() {
        let config = Config::new().with_text_columns(&["ticker", "volume"]);
        assert!(matches!(config.validate(), Err(PipelineError::ConfigError(_))));
    }

    #[test]
    fn incomplete_column_map_is_rejected() {
        let config = Config::new().with_column_names(vec![("Ticker".into(), "ticker".into())]);
        assert!(matches!(config.validate(), Err(PipelineError::ConfigError(_))));
    }
}
