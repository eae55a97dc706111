use chrono::NaiveDate;
use log::{debug, info};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::SystemTime;

use crate::config::Config;
use crate::errors::{PipelineError, Result};
use crate::models::aggregate::{DailyAverage, TickerAverage};
use crate::util::arrow_utils;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileStamp {
    modified: SystemTime,
    len: u64,
    // 写入是"临时文件 + rename"，每次都会换 inode
    inode: u64,
}

impl FileStamp {
    fn of(path: &Path) -> Result<Self> {
        let metadata = fs::metadata(path)?;
        Ok(Self {
            modified: metadata.modified()?,
            len: metadata.len(),
            inode: inode(&metadata),
        })
    }
}

#[cfg(unix)]
fn inode(metadata: &fs::Metadata) -> u64 {
    use std::os::unix::fs::MetadataExt;
    metadata.ino()
}

#[cfg(not(unix))]
fn inode(_metadata: &fs::Metadata) -> u64 {
    0
}

struct CacheEntry<T> {
    stamp: FileStamp,
    data: Arc<Vec<T>>,
}

/// 按文件路径缓存已加载的表，文件修改时间、大小或 inode 变化时重新加载
pub struct FileCache<T> {
    entries: Mutex<HashMap<PathBuf, CacheEntry<T>>>,
}

impl<T> FileCache<T> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn get_or_load<F>(&self, path: &Path, load: F) -> Result<Arc<Vec<T>>>
    where
        F: FnOnce(&Path) -> Result<Vec<T>>,
    {
        let stamp = FileStamp::of(path)?;

        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(entry) = entries.get(path) {
            if entry.stamp == stamp {
                debug!("Cache hit for {}", path.display());
                return Ok(Arc::clone(&entry.data));
            }
            info!("{} changed on disk, reloading", path.display());
        }

        let data = Arc::new(load(path)?);
        entries.insert(
            path.to_path_buf(),
            CacheEntry {
                stamp,
                data: Arc::clone(&data),
            },
        );
        Ok(data)
    }

    pub fn invalidate(&self, path: &Path) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.remove(path);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for FileCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

static DAILY_CACHE: OnceLock<FileCache<DailyAverage>> = OnceLock::new();
static TICKER_CACHE: OnceLock<FileCache<TickerAverage>> = OnceLock::new();

pub fn daily_cache() -> &'static FileCache<DailyAverage> {
    DAILY_CACHE.get_or_init(FileCache::new)
}

pub fn ticker_cache() -> &'static FileCache<TickerAverage> {
    TICKER_CACHE.get_or_init(FileCache::new)
}

/// 聚合数据提供者，供看板筛选使用
pub struct AggregateProvider {
    daily: Arc<Vec<DailyAverage>>,
    tickers: Arc<Vec<TickerAverage>>,
    // 索引用于快速查找
    ticker_index: HashMap<String, usize>,
}

impl AggregateProvider {
    /// 通过进程内缓存加载两张聚合表
    pub fn load(config: &Config) -> Result<Self> {
        for path in [&config.daily_avg_path, &config.ticker_avg_path] {
            if !path.exists() {
                return Err(PipelineError::DataError(format!(
                    "{} not found; run the pipeline first", path.display()
                )));
            }
        }

        let daily = daily_cache().get_or_load(&config.daily_avg_path, arrow_utils::read_daily_averages)?;
        let tickers = ticker_cache().get_or_load(&config.ticker_avg_path, arrow_utils::read_ticker_averages)?;
        info!("Loaded {} daily averages and {} ticker averages", daily.len(), tickers.len());

        Ok(Self::from_shared(daily, tickers))
    }

    /// 使用提供的数据创建实例
    pub fn new_with_data(daily: Vec<DailyAverage>, tickers: Vec<TickerAverage>) -> Self {
        Self::from_shared(Arc::new(daily), Arc::new(tickers))
    }

    fn from_shared(daily: Arc<Vec<DailyAverage>>, tickers: Arc<Vec<TickerAverage>>) -> Self {
        let ticker_index = tickers
            .iter()
            .enumerate()
            .map(|(i, t)| (t.ticker.clone(), i))
            .collect();

        Self {
            daily,
            tickers,
            ticker_index,
        }
    }

    pub fn daily_averages(&self) -> &[DailyAverage] {
        &self.daily
    }

    pub fn ticker_averages(&self) -> &[TickerAverage] {
        &self.tickers
    }

    pub fn get_ticker_average(&self, ticker: &str) -> Option<&TickerAverage> {
        self.ticker_index.get(ticker).map(|&idx| &self.tickers[idx])
    }

    /// 每日均价表中出现过的股票代码，去重并排序
    pub fn available_tickers(&self) -> Vec<&str> {
        let mut tickers: Vec<&str> = self.daily.iter().map(|d| d.ticker.as_str()).collect();
        tickers.sort_unstable();
        tickers.dedup();
        tickers
    }

    /// 最早和最晚的交易日期
    pub fn date_bounds(&self) -> Option<(NaiveDate, NaiveDate)> {
        let min = self.daily.iter().map(|d| d.trade_date).min()?;
        let max = self.daily.iter().map(|d| d.trade_date).max()?;
        Some((min, max))
    }

    pub fn is_empty(&self) -> bool {
        self.daily.is_empty() && self.tickers.is_empty()
    }
}
