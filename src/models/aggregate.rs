use chrono::NaiveDate;
use serde::Serialize;

use super::record::CleanRecord;

pub const AVG_CLOSE: &str = "avg_close";
pub const AVG_VOLUME: &str = "avg_volume";

/// 每日每只股票的平均收盘价
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyAverage {
    pub trade_date: NaiveDate,
    pub ticker: String,
    pub avg_close: f64,
}

/// 每只股票全部日期上的平均成交量
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TickerAverage {
    pub ticker: String,
    pub avg_volume: f64,
}

/// Aggregation input row. Every field may be null when the table did not
/// come out of the cleaner.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregateRow {
    pub trade_date: Option<NaiveDate>,
    pub ticker: Option<String>,
    pub close_price: Option<f64>,
    pub volume: Option<f64>,
}

impl From<&CleanRecord> for AggregateRow {
    fn from(record: &CleanRecord) -> Self {
        Self {
            trade_date: Some(record.trade_date),
            ticker: record.ticker.clone(),
            close_price: record.close_price,
            volume: record.volume,
        }
    }
}
