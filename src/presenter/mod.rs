//! 终端看板：按日期区间和股票代码筛选聚合结果。

use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::fmt;

use crate::data_provider::AggregateProvider;
use crate::errors::{PipelineError, Result};
use crate::models::aggregate::{DailyAverage, TickerAverage};
use crate::util::arrow_utils;

pub const NO_PRICE_DATA: &str = "No data available for the selected filters.";
pub const NO_VOLUME_DATA: &str = "No volume data available for selected ticker(s).";

const BAR_WIDTH: usize = 40;

/// 看板筛选条件。股票列表为空表示不按代码筛选
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DashboardFilter {
    pub date_range: Option<(NaiveDate, NaiveDate)>,
    pub tickers: Vec<String>,
}

impl DashboardFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// 闭区间；起止颠倒时自动交换
    pub fn with_date_range(mut self, start: NaiveDate, end: NaiveDate) -> Self {
        self.date_range = Some(if start <= end { (start, end) } else { (end, start) });
        self
    }

    pub fn with_tickers<S: AsRef<str>>(mut self, tickers: &[S]) -> Self {
        self.tickers = tickers
            .iter()
            .map(|t| t.as_ref().trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();
        self
    }

    /// 默认条件：完整日期区间，排序后的前 `count` 个代码
    pub fn default_for(provider: &AggregateProvider, count: usize) -> Self {
        let tickers: Vec<&str> = provider.available_tickers().into_iter().take(count).collect();
        let filter = Self::new().with_tickers(&tickers);
        match provider.date_bounds() {
            Some((min, max)) => filter.with_date_range(min, max),
            None => filter,
        }
    }

    fn matches_ticker(&self, ticker: &str) -> bool {
        self.tickers.is_empty() || self.tickers.iter().any(|t| t == ticker)
    }

    fn matches_date(&self, date: NaiveDate) -> bool {
        match self.date_range {
            Some((start, end)) => start <= date && date <= end,
            None => true,
        }
    }
}

/// 日均收盘价透视表：行是日期（升序），列是股票代码
#[derive(Debug, Clone, PartialEq)]
pub struct PivotTable {
    pub dates: Vec<NaiveDate>,
    pub tickers: Vec<String>,
    pub cells: Vec<Vec<Option<f64>>>,
}

impl PivotTable {
    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }
}

pub fn filter_daily<'a>(provider: &'a AggregateProvider, filter: &DashboardFilter) -> Vec<&'a DailyAverage> {
    provider
        .daily_averages()
        .iter()
        .filter(|d| filter.matches_date(d.trade_date) && filter.matches_ticker(&d.ticker))
        .collect()
}

pub fn filter_volume<'a>(provider: &'a AggregateProvider, filter: &DashboardFilter) -> Vec<&'a TickerAverage> {
    provider
        .ticker_averages()
        .iter()
        .filter(|t| filter.matches_ticker(&t.ticker))
        .collect()
}

pub fn pivot_close(rows: &[&DailyAverage]) -> PivotTable {
    let mut tickers: Vec<String> = rows.iter().map(|r| r.ticker.clone()).collect();
    tickers.sort_unstable();
    tickers.dedup();

    let mut by_date: BTreeMap<NaiveDate, Vec<Option<f64>>> = BTreeMap::new();
    for row in rows {
        // 上游保证 (日期, 代码) 唯一
        if let Ok(col) = tickers.binary_search(&row.ticker) {
            by_date.entry(row.trade_date).or_insert_with(|| vec![None; tickers.len()])[col] = Some(row.avg_close);
        }
    }

    let (dates, cells) = by_date.into_iter().unzip();
    PivotTable { dates, tickers, cells }
}

pub fn render_pivot(table: &PivotTable) -> String {
    table.to_string()
}

impl fmt::Display for PivotTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return writeln!(f, "{}", NO_PRICE_DATA);
        }

        write!(f, "{:<12}", "trade_date")?;
        for ticker in &self.tickers {
            write!(f, " {:>12}", ticker)?;
        }
        writeln!(f)?;

        for (date, row) in self.dates.iter().zip(&self.cells) {
            write!(f, "{:<12}", date.format("%Y-%m-%d").to_string())?;
            for cell in row {
                match cell {
                    Some(v) => write!(f, " {:>12.2}", v)?,
                    None => write!(f, " {:>12}", "")?,
                }
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

pub fn render_volume(rows: &[&TickerAverage]) -> String {
    VolumeChart(rows).to_string()
}

/// 成交量横向条形图，条长按最大均量缩放
struct VolumeChart<'a>(&'a [&'a TickerAverage]);

impl fmt::Display for VolumeChart<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rows = self.0;
        if rows.is_empty() {
            return writeln!(f, "{}", NO_VOLUME_DATA);
        }

        let max = rows.iter().map(|r| r.avg_volume.abs()).fold(0.0_f64, f64::max);
        let label_width = rows.iter().map(|r| r.ticker.len()).max().unwrap_or(0);

        for row in rows {
            let width = if max > 0.0 && max.is_finite() {
                ((row.avg_volume.abs() / max) * BAR_WIDTH as f64).round() as usize
            } else {
                0
            };
            writeln!(
                f,
                "{:<label$} {:<bar$} {:.2}",
                row.ticker,
                "#".repeat(width),
                row.avg_volume,
                label = label_width,
                bar = BAR_WIDTH
            )?;
        }
        Ok(())
    }
}

/// 渲染完整看板
pub fn render_dashboard(provider: &AggregateProvider, filter: &DashboardFilter) -> String {
    let daily = filter_daily(provider, filter);
    let volume = filter_volume(provider, filter);

    let mut out = String::new();
    out.push_str("Daily Average Closing Price by Ticker\n");
    out.push_str(&render_pivot(&pivot_close(&daily)));
    out.push('\n');
    out.push_str("Average Volume by Ticker\n");
    out.push_str(&render_volume(&volume));
    out
}

/// 以JSON数组导出筛选后的日均价
pub fn daily_view_to_json(rows: &[&DailyAverage]) -> Result<String> {
    let owned: Vec<DailyAverage> = rows.iter().map(|r| (*r).clone()).collect();
    let batch = arrow_utils::daily_averages_to_record_batch(&owned)?;

    let mut writer = arrow_json::ArrayWriter::new(Vec::new());
    writer.write(&batch)?;
    writer.finish()?;

    String::from_utf8(writer.into_inner()).map_err(|e| PipelineError::DataError(e.to_string()))
}
