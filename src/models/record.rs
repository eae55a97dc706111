use chrono::NaiveDate;
use serde::Serialize;

// 规范列名（snake_case）
pub const TRADE_DATE: &str = "trade_date";
pub const TICKER: &str = "ticker";
pub const OPEN_PRICE: &str = "open_price";
pub const CLOSE_PRICE: &str = "close_price";
pub const VOLUME: &str = "volume";
pub const SECTOR: &str = "sector";
pub const VALIDATED: &str = "validated";
pub const CURRENCY: &str = "currency";
pub const EXCHANGE: &str = "exchange";
pub const NOTES: &str = "notes";
pub const DATE_STR: &str = "date_str";

/// 原始表的十个规范列，顺序即字段顺序
pub const RAW_COLUMNS: [&str; 10] = [
    TRADE_DATE, TICKER, OPEN_PRICE, CLOSE_PRICE, VOLUME,
    SECTOR, VALIDATED, CURRENCY, EXCHANGE, NOTES,
];

/// 可以做大小写归一的文本列（不含日期和数值列）
pub const TEXT_FIELDS: [&str; 6] = [TICKER, SECTOR, VALIDATED, CURRENCY, EXCHANGE, NOTES];

/// 原始交易记录，所有字段都是未经处理的文本
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RawRecord {
    pub trade_date: Option<String>,
    pub ticker: Option<String>,
    pub open_price: Option<String>,
    pub close_price: Option<String>,
    pub volume: Option<String>,
    pub sector: Option<String>,
    pub validated: Option<String>,
    pub currency: Option<String>,
    pub exchange: Option<String>,
    pub notes: Option<String>,
}

impl RawRecord {
    /// 按 `RAW_COLUMNS` 的顺序构建
    pub fn from_values(values: [Option<String>; 10]) -> Self {
        let [trade_date, ticker, open_price, close_price, volume, sector, validated, currency, exchange, notes] =
            values;
        Self {
            trade_date,
            ticker,
            open_price,
            close_price,
            volume,
            sector,
            validated,
            currency,
            exchange,
            notes,
        }
    }

    /// Convenience constructor where every cell is present.
    pub fn from_strs(values: [&str; 10]) -> Self {
        Self::from_values(values.map(|v| Some(v.to_string())))
    }


    pub fn fields_mut(&mut self) -> [&mut Option<String>; 10] {
        [
            &mut self.trade_date,
            &mut self.ticker,
            &mut self.open_price,
            &mut self.close_price,
            &mut self.volume,
            &mut self.sector,
            &mut self.validated,
            &mut self.currency,
            &mut self.exchange,
            &mut self.notes,
        ]
    }

    /// 按规范列名取可变字段，未知列名返回 None
    pub fn field_mut(&mut self, column: &str) -> Option<&mut Option<String>> {
        let idx = RAW_COLUMNS.iter().position(|c| *c == column)?;
        self.fields_mut().into_iter().nth(idx)
    }
}

/// 清洗后的交易记录
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CleanRecord {
    pub trade_date: NaiveDate,
    pub ticker: Option<String>,
    pub open_price: Option<f64>,
    pub close_price: Option<f64>,
    pub volume: Option<f64>,
    pub sector: Option<String>,
    pub validated: Option<String>,
    pub currency: Option<String>,
    pub exchange: Option<String>,
    pub notes: Option<String>,
    pub date_str: String,
}

/// 整行去重用的键，浮点数按位比较
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct RecordKey {
    trade_date: NaiveDate,
    text: [Option<String>; 6],
    numbers: [Option<u64>; 3],
    date_str: String,
}

fn float_key(value: Option<f64>) -> Option<u64> {
    // -0.0 与 0.0 视为同一个值
    value.map(|v| if v == 0.0 { 0.0f64.to_bits() } else { v.to_bits() })
}

impl CleanRecord {
    /// 转回原始文本形式，用于对清洗结果再次清洗
    pub fn to_raw(&self) -> RawRecord {
        RawRecord {
            trade_date: Some(self.trade_date.format("%Y-%m-%d").to_string()),
            ticker: self.ticker.clone(),
            open_price: self.open_price.map(|v| v.to_string()),
            close_price: self.close_price.map(|v| v.to_string()),
            volume: self.volume.map(|v| v.to_string()),
            sector: self.sector.clone(),
            validated: self.validated.clone(),
            currency: self.currency.clone(),
            exchange: self.exchange.clone(),
            notes: self.notes.clone(),
        }
    }

    pub(crate) fn key(&self) -> RecordKey {
        RecordKey {
            trade_date: self.trade_date,
            text: [
                self.ticker.clone(),
                self.sector.clone(),
                self.validated.clone(),
                self.currency.clone(),
                self.exchange.clone(),
                self.notes.clone(),
            ],
            numbers: [
                float_key(self.open_price),
                float_key(self.close_price),
                float_key(self.volume),
            ],
            date_str: self.date_str.clone(),
        }
    }

    /// 文本列的值，顺序同 `TEXT_FIELDS`
    pub fn text_values(&self) -> [Option<&str>; 6] {
        [
            self.ticker.as_deref(),
            self.sector.as_deref(),
            self.validated.as_deref(),
            self.currency.as_deref(),
            self.exchange.as_deref(),
            self.notes.as_deref(),
        ]
    }
}
