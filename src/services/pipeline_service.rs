use chrono::Local;
use log::{info, warn};
use serde::Serialize;
use std::fs;

use crate::aggregator::{self, AggregateReport};
use crate::cleaner::{self, CleanReport};
use crate::config::Config;
use crate::errors::Result;
use crate::util::arrow_utils;

/// 一次运行的统计结果，写入 `report_path`
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub generated_at: String,
    pub clean: Option<CleanReport>,
    pub aggregate: Option<AggregateReport>,
}

/// 管道服务，按顺序运行各阶段，阶段之间通过文件交接
pub struct PipelineService {
    config: Config,
}

impl PipelineService {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// 原始CSV → cleaned.arrow
    pub fn run_clean(&self) -> Result<RunReport> {
        let clean = self.clean_stage()?;
        self.finish(RunReport {
            clean: Some(clean),
            ..Default::default()
        })
    }

    /// cleaned.arrow → agg1.arrow + agg2.arrow
    pub fn run_aggregate(&self) -> Result<RunReport> {
        let aggregate = self.aggregate_stage()?;
        self.finish(RunReport {
            aggregate: Some(aggregate),
            ..Default::default()
        })
    }

    /// 依次运行清洗和聚合
    pub fn run_all(&self) -> Result<RunReport> {
        let clean = self.clean_stage()?;
        let aggregate = self.aggregate_stage()?;
        self.finish(RunReport {
            clean: Some(clean),
            aggregate: Some(aggregate),
            ..Default::default()
        })
    }

    fn clean_stage(&self) -> Result<CleanReport> {
        let raw = cleaner::read_raw_csv(&self.config.raw_csv_path, &self.config)?;
        let (cleaned, report) = cleaner::clean(raw, &self.config)?;
        if cleaned.is_empty() {
            warn!("No rows survived cleaning; writing an empty table");
        }

        arrow_utils::save_clean_records(&cleaned, &self.config.cleaned_path)?;
        info!("Saved cleaned data to {}", self.config.cleaned_path.display());
        Ok(report)
    }

    fn aggregate_stage(&self) -> Result<AggregateReport> {
        info!("Loading cleaned table from {}", self.config.cleaned_path.display());
        let rows = arrow_utils::read_aggregate_rows(&self.config.cleaned_path)?;
        let aggs = aggregator::aggregate(&rows);

        arrow_utils::save_daily_averages(&aggs.daily, &self.config.daily_avg_path)?;
        arrow_utils::save_ticker_averages(&aggs.tickers, &self.config.ticker_avg_path)?;
        info!(
            "Saved daily averages to {} and ticker averages to {}",
            self.config.daily_avg_path.display(),
            self.config.ticker_avg_path.display()
        );
        Ok(aggs.report)
    }

    fn finish(&self, mut report: RunReport) -> Result<RunReport> {
        report.generated_at = Local::now().to_rfc3339();

        let path = &self.config.report_path;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, serde_json::to_string_pretty(&report)?)?;
        info!("Wrote run report to {}", path.display());

        Ok(report)
    }
}
