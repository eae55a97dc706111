//! 聚合阶段：清洗后的表 → (每日平均收盘价, 每只股票平均成交量)。
//!
//! 两个聚合各自过滤：每日均价需要日期、代码、收盘价都不为空；
//! 平均成交量只需要代码和成交量不为空，与日期是否有效无关。
//! 输出按分组键升序排列。

use chrono::NaiveDate;
use log::info;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::models::aggregate::{AggregateRow, DailyAverage, TickerAverage};
use crate::models::record::CleanRecord;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AggregateReport {
    pub rows_read: usize,
    pub daily_rows_used: usize,
    pub daily_rows_excluded: usize,
    pub daily_groups: usize,
    pub volume_rows_used: usize,
    pub volume_rows_excluded: usize,
    pub ticker_groups: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Aggregates {
    pub daily: Vec<DailyAverage>,
    pub tickers: Vec<TickerAverage>,
    pub report: AggregateReport,
}

#[derive(Debug, Clone, Copy, Default)]
struct Mean {
    sum: f64,
    count: usize,
}

impl Mean {
    fn push(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
    }

    fn value(&self) -> f64 {
        self.sum / self.count as f64
    }
}

pub fn aggregate_clean_records(records: &[CleanRecord]) -> Aggregates {
    let rows: Vec<AggregateRow> = records.iter().map(AggregateRow::from).collect();
    aggregate(&rows)
}

/// 计算两张聚合表
pub fn aggregate(rows: &[AggregateRow]) -> Aggregates {
    info!("Aggregating {} rows", rows.len());

    let (daily, daily_used) = daily_average(rows);
    let (tickers, volume_used) = ticker_average(rows);

    let report = AggregateReport {
        rows_read: rows.len(),
        daily_rows_used: daily_used,
        daily_rows_excluded: rows.len() - daily_used,
        daily_groups: daily.len(),
        volume_rows_used: volume_used,
        volume_rows_excluded: rows.len() - volume_used,
        ticker_groups: tickers.len(),
    };

    info!(
        "Daily average: {} rows used, {} excluded, {} groups",
        report.daily_rows_used, report.daily_rows_excluded, report.daily_groups
    );
    info!(
        "Ticker average: {} rows used, {} excluded, {} groups",
        report.volume_rows_used, report.volume_rows_excluded, report.ticker_groups
    );

    Aggregates { daily, tickers, report }
}

/// 按 (日期, 代码) 分组求收盘价均值，同时返回参与计算的行数
pub fn daily_average(rows: &[AggregateRow]) -> (Vec<DailyAverage>, usize) {
    let mut groups: BTreeMap<(NaiveDate, &str), Mean> = BTreeMap::new();
    let mut used = 0;

    for row in rows {
        if let (Some(date), Some(ticker), Some(close)) = (row.trade_date, row.ticker.as_deref(), row.close_price) {
            groups.entry((date, ticker)).or_default().push(close);
            used += 1;
        }
    }

    let daily = groups
        .into_iter()
        .map(|((trade_date, ticker), mean)| DailyAverage {
            trade_date,
            ticker: ticker.to_string(),
            avg_close: mean.value(),
        })
        .collect();

    (daily, used)
}

/// 按代码分组求成交量均值，同时返回参与计算的行数
pub fn ticker_average(rows: &[AggregateRow]) -> (Vec<TickerAverage>, usize) {
    let mut groups: BTreeMap<&str, Mean> = BTreeMap::new();
    let mut used = 0;

    for row in rows {
        if let (Some(ticker), Some(volume)) = (row.ticker.as_deref(), row.volume) {
            groups.entry(ticker).or_default().push(volume);
            used += 1;
        }
    }

    let tickers = groups
        .into_iter()
        .map(|(ticker, mean)| TickerAverage {
            ticker: ticker.to_string(),
            avg_volume: mean.value(),
        })
        .collect();

    (tickers, used)
}
