//! 清洗阶段：原始文本表 → 类型明确、去重后的交易表。
//!
//! 步骤顺序固定：重命名（见 `ingest`）→ 去空白与缺失标记 → 文本列小写 →
//! 解析日期 → 丢弃无效日期 → 生成 date_str → 数值转换 → 整行去重。
//! 每一步都是确定性的，对已经清洗过的数据再跑一遍结果不变。

pub mod ingest;

use chrono::NaiveDate;
use log::{debug, info};
use serde::Serialize;
use std::collections::HashSet;

use crate::config::Config;
use crate::errors::Result;
use crate::models::record::{CleanRecord, RawRecord};
use crate::util::{normalize_missing, parse_date_permissive, parse_number};

pub use ingest::{read_raw_csv, read_raw_records};

/// 清洗过程中各步骤的行数统计
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CleanReport {
    pub rows_read: usize,
    pub invalid_dates: usize,
    pub duplicates_removed: usize,
    pub rows_written: usize,
    pub null_open_price: usize,
    pub null_close_price: usize,
    pub null_volume: usize,
}

/// 执行完整的清洗流程
pub fn clean(records: Vec<RawRecord>, config: &Config) -> Result<(Vec<CleanRecord>, CleanReport)> {
    config.validate()?;

    let mut report = CleanReport {
        rows_read: records.len(),
        ..Default::default()
    };
    info!("Cleaning {} raw rows", records.len());

    let records = normalize_missing_tokens(records, &config.na_tokens);
    let records = lowercase_text_columns(records, &config.text_columns);

    let dated = parse_trade_dates(records);
    let before = dated.len();
    let dated = drop_invalid_dates(dated);
    report.invalid_dates = before - dated.len();
    info!("Dropped {} rows with unparsable trade_date, {} remain", report.invalid_dates, dated.len());

    let typed: Vec<CleanRecord> = dated
        .into_iter()
        .map(|(date, record)| coerce_record(date, record))
        .collect();
    let before = typed.len();
    let cleaned = drop_duplicates(typed);
    report.duplicates_removed = before - cleaned.len();
    report.rows_written = cleaned.len();
    info!(
        "Removed {} duplicate rows; cleaned table has {} rows",
        report.duplicates_removed, report.rows_written
    );

    // 空值统计针对最终写出的行
    report.null_open_price = cleaned.iter().filter(|r| r.open_price.is_none()).count();
    report.null_close_price = cleaned.iter().filter(|r| r.close_price.is_none()).count();
    report.null_volume = cleaned.iter().filter(|r| r.volume.is_none()).count();
    debug!(
        "Null numerics in cleaned table: open_price={}, close_price={}, volume={}",
        report.null_open_price, report.null_close_price, report.null_volume
    );

    Ok((cleaned, report))
}

/// 所有列去首尾空白，缺失标记变成空值
pub fn normalize_missing_tokens(mut records: Vec<RawRecord>, na_tokens: &[String]) -> Vec<RawRecord> {
    for record in &mut records {
        for field in record.fields_mut() {
            *field = normalize_missing(field.take(), na_tokens);
        }
    }
    records
}

/// 指定文本列转小写，空值保持不变
pub fn lowercase_text_columns(mut records: Vec<RawRecord>, text_columns: &[String]) -> Vec<RawRecord> {
    for record in &mut records {
        for column in text_columns {
            if let Some(Some(value)) = record.field_mut(column) {
                *value = value.to_lowercase();
            }
        }
    }
    records
}

pub fn parse_trade_dates(records: Vec<RawRecord>) -> Vec<(Option<NaiveDate>, RawRecord)> {
    records
        .into_iter()
        .map(|record| {
            let date = record.trade_date.as_deref().and_then(parse_date_permissive);
            (date, record)
        })
        .collect()
}

pub fn drop_invalid_dates(rows: Vec<(Option<NaiveDate>, RawRecord)>) -> Vec<(NaiveDate, RawRecord)> {
    rows.into_iter()
        .filter_map(|(date, record)| date.map(|d| (d, record)))
        .collect()
}

/// 生成 date_str 并把数值列转为浮点数，无法解析的值变成空值
pub fn coerce_record(trade_date: NaiveDate, record: RawRecord) -> CleanRecord {
    CleanRecord {
        trade_date,
        date_str: trade_date.format("%Y-%m-%d").to_string(),
        ticker: record.ticker,
        open_price: record.open_price.as_deref().and_then(parse_number),
        close_price: record.close_price.as_deref().and_then(parse_number),
        volume: record.volume.as_deref().and_then(parse_number),
        sector: record.sector,
        validated: record.validated,
        currency: record.currency,
        exchange: record.exchange,
        notes: record.notes,
    }
}

/// 整行去重，保留第一次出现的顺序
pub fn drop_duplicates(records: Vec<CleanRecord>) -> Vec<CleanRecord> {
    let mut seen = HashSet::with_capacity(records.len());
    records
        .into_iter()
        .filter(|record| seen.insert(record.key()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_NA_TOKENS;

    fn raw(values: [&str; 10]) -> RawRecord {
        RawRecord::from_strs(values)
    }

    fn run(records: Vec<RawRecord>) -> (Vec<CleanRecord>, CleanReport) {
        clean(records, &Config::new()).unwrap()
    }

    fn scenario() -> Vec<RawRecord> {
        vec![
            raw(["2024-01-02", "AAPL", "150", "152", "1000000", "Tech", "Yes", "USD", "NASDAQ", ""]),
            raw(["2024-01-02", "aapl", "151", "153", "NA", "Tech", "Yes", "USD", "NASDAQ", ""]),
            raw(["  ", "MSFT", "300", "301", "500000", "Tech", "Yes", "USD", "NASDAQ", ""]),
        ]
    }

    #[test]
    fn scenario_keeps_two_rows() {
        let (cleaned, report) = run(scenario());
        assert_eq!(cleaned.len(), 2);
        assert_eq!(report.invalid_dates, 1);
        assert_eq!(report.duplicates_removed, 0);
        assert!(cleaned.iter().all(|r| r.ticker.as_deref() == Some("aapl")));
        assert_eq!(cleaned[1].volume, None);
        assert_eq!(cleaned[0].date_str, "2024-01-02");
        assert_eq!(cleaned[0].notes, None);
    }

    #[test]
    fn sentinels_are_nulled_in_every_column() {
        let (cleaned, _) = run(vec![raw([
            "2024-03-04", " n/a ", "-", "NULL", "na", "", "N/A", "null", " - ", "NA",
        ])]);
        let record = &cleaned[0];
        assert!(record.text_values().iter().all(|v| v.is_none()));
        assert_eq!((record.open_price, record.close_price, record.volume), (None, None, None));
    }

    #[test]
    fn whitespace_only_date_is_dropped_before_parsing() {
        let (cleaned, report) = run(vec![raw(["   ", "x", "1", "1", "1", "", "", "", "", ""])]);
        assert!(cleaned.is_empty());
        assert_eq!(report.invalid_dates, 1);
    }

    #[test]
    fn text_case_leaves_dates_and_numbers_alone() {
        let records = normalize_missing_tokens(
            vec![raw(["Jan 2, 2024", "AAPL", "1E2", "2", "3", "Tech", "YES", "USD", "NYSE", "Split Adj"])],
            &DEFAULT_NA_TOKENS.iter().map(|t| t.to_string()).collect::<Vec<_>>(),
        );
        let text_columns: Vec<String> = crate::models::record::TEXT_FIELDS.iter().map(|c| c.to_string()).collect();
        let records = lowercase_text_columns(records, &text_columns);
        assert_eq!(records[0].trade_date.as_deref(), Some("Jan 2, 2024"));
        assert_eq!(records[0].open_price.as_deref(), Some("1E2"));
        assert_eq!(records[0].notes.as_deref(), Some("split adj"));
        assert_eq!(records[0].exchange.as_deref(), Some("nyse"));
    }

    #[test]
    fn configured_text_columns_only() {
        let config = Config::new().with_text_columns(&["ticker"]);
        let (cleaned, _) = clean(
            vec![raw(["2024-01-02", "AAPL", "1", "2", "3", "Tech", "YES", "USD", "NYSE", "Note"])],
            &config,
        )
        .unwrap();
        assert_eq!(cleaned[0].ticker.as_deref(), Some("aapl"));
        assert_eq!(cleaned[0].sector.as_deref(), Some("Tech"));
    }

    #[test]
    fn unparsable_numbers_keep_the_row() {
        let (cleaned, report) = run(vec![raw(["2024-01-02", "aapl", "abc", "1,5", "12", "", "", "", "", ""])]);
        assert_eq!(cleaned.len(), 1);
        assert_eq!(cleaned[0].open_price, None);
        assert_eq!(cleaned[0].close_price, None);
        assert_eq!(cleaned[0].volume, Some(12.0));
        assert_eq!(report.null_close_price, 1);
    }

    #[test]
    fn duplicates_collapse_to_first_occurrence() {
        let (cleaned, report) = run(vec![
            raw(["2024-01-03", "MSFT", "1", "2", "3", "", "", "", "", ""]),
            raw(["2024-01-02", "AAPL", "1", "2", "3", "", "", "", "", ""]),
            // 清洗后与第一行完全相同
            raw(["01/03/2024", " msft ", "1.0", "2", "3", "NA", "", "", "", ""]),
        ]);
        assert_eq!(report.duplicates_removed, 1);
        assert_eq!(cleaned.len(), 2);
        assert_eq!(cleaned[0].ticker.as_deref(), Some("msft"));
        assert_eq!(cleaned[1].ticker.as_deref(), Some("aapl"));
    }

    #[test]
    fn null_counts_describe_written_rows() {
        let (cleaned, report) = run(vec![
            raw(["2024-01-05", "goog", "1", "2", "n/a", "", "", "", "", ""]),
            raw(["2024-01-05", "GOOG", "1.0", "2", "", "", "", "", "", ""]),
            raw(["2024-01-06", "goog", "1", "", "7", "", "", "", "", ""]),
        ]);
        assert_eq!(report.duplicates_removed, 1);
        assert_eq!(report.rows_written, 2);
        assert_eq!(report.null_volume, 1);
        assert_eq!(report.null_close_price, 1);
        assert_eq!(report.null_open_price, 0);
        assert_eq!(cleaned.iter().filter(|r| r.volume.is_none()).count(), report.null_volume);
    }

    #[test]
    fn cleaning_is_idempotent() {
        let mut records = scenario();
        records.push(raw(["2024/01/05", " GOOG ", "-1.5", "1e3", "n/a", "Comm", "no", "usd", "Nasdaq", "late"]));
        records.push(raw(["20240105", "goog", "-1.5", "1000", "", "comm", "NO", "USD", "nasdaq", "LATE"]));
        let (first, _) = run(records);

        let again: Vec<RawRecord> = first.iter().map(CleanRecord::to_raw).collect();
        let (second, report) = run(again);
        assert_eq!(first, second);
        assert_eq!(report.invalid_dates, 0);
        assert_eq!(report.duplicates_removed, 0);
    }

    #[test]
    fn empty_input_is_not_an_error() {
        let (cleaned, report) = run(Vec::new());
        assert!(cleaned.is_empty());
        assert_eq!(report.rows_written, 0);
    }
}
