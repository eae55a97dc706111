use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};

// 与 pandas datetime64[ns] 可表示的年份范围一致
const MIN_YEAR: i32 = 1677;
const MAX_YEAR: i32 = 2262;

/// 公元元年到 1970-01-01 的天数
pub const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

// 两位年份必须排在四位年份之前，否则 "01/02/24" 会被当成公元24年
const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%Y.%m.%d",
    "%m/%d/%y",
    "%m/%d/%Y",
    "%d/%m/%Y",
    "%m-%d-%Y",
    "%d.%m.%Y",
    "%b %d, %Y",
    "%B %d, %Y",
    "%b %d %Y",
    "%d %b %Y",
    "%d %B %Y",
    "%d-%b-%Y",
];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

/// 去掉首尾空白，缺失值标记（忽略大小写）统一变成 None
pub fn normalize_missing(value: Option<String>, na_tokens: &[String]) -> Option<String> {
    let value = value?;
    let trimmed = value.trim();
    let lowered = trimmed.to_lowercase();
    if na_tokens.iter().any(|t| *t == lowered) {
        return None;
    }
    if trimmed.len() == value.len() {
        Some(value)
    } else {
        Some(trimmed.to_string())
    }
}

/// 宽松的日期解析，无法识别时返回 None
pub fn parse_date_permissive(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    // 超出范围的候选结果继续尝试下一个格式
    let in_range = |d: &NaiveDate| (MIN_YEAR..=MAX_YEAR).contains(&d.year());

    // YYYYMMDD
    if value.len() == 8 && value.bytes().all(|b| b.is_ascii_digit()) {
        let year = value[0..4].parse::<i32>().ok()?;
        let month = value[4..6].parse::<u32>().ok()?;
        let day = value[6..8].parse::<u32>().ok()?;
        return NaiveDate::from_ymd_opt(year, month, day).filter(in_range);
    }

    let dates = DATE_FORMATS
        .iter()
        .filter_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok());
    let datetimes = DATETIME_FORMATS
        .iter()
        .filter_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .map(|dt| dt.date());
    let rfc3339 = DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.naive_local().date());

    dates.chain(datetimes).chain(rfc3339).find(in_range)
}

/// 浮点数解析，NaN 也按缺失处理
pub fn parse_number(value: &str) -> Option<f64> {
    let parsed = value.trim().parse::<f64>().ok()?;
    if parsed.is_nan() {
        None
    } else {
        Some(parsed)
    }
}

pub fn date_to_days(date: NaiveDate) -> i32 {
    date.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE
}

pub fn days_to_date(days: i32) -> Option<NaiveDate> {
    NaiveDate::from_num_days_from_ce_opt(days.checked_add(UNIX_EPOCH_DAYS_FROM_CE)?)
}

// Arrow数据转换工具
pub mod arrow_utils {
    use super::*;
    use crate::errors::{PipelineError, Result};
    use crate::models::aggregate::{AggregateRow, DailyAverage, TickerAverage};
    use crate::models::record::{CleanRecord, CLOSE_PRICE, TICKER, TRADE_DATE, VOLUME};
    use crate::schema::{self, CLEANED_TABLE, DAILY_AVG_TABLE, TICKER_AVG_TABLE};
    use arrow::compute::cast;
    use arrow::datatypes::{DataType, Schema, SchemaRef};
    use arrow_array::builder::{Date32Builder, Float64Builder, StringBuilder};
    use arrow_array::{Array, ArrayRef, Date32Array, Float64Array, RecordBatch, StringArray};
    use arrow_ipc::reader::FileReader;
    use arrow_ipc::writer::FileWriter;
    use log::{debug, info, warn};
    use std::fs::{self, File};
    use std::path::{Path, PathBuf};
    use std::sync::Arc;

    // 将清洗后的记录转换为Arrow记录批次
    pub fn clean_records_to_record_batch(records: &[CleanRecord]) -> Result<RecordBatch> {
        let mut trade_date = Date32Builder::with_capacity(records.len());
        let mut ticker = StringBuilder::new();
        let mut open_price = Float64Builder::with_capacity(records.len());
        let mut close_price = Float64Builder::with_capacity(records.len());
        let mut volume = Float64Builder::with_capacity(records.len());
        let mut sector = StringBuilder::new();
        let mut validated = StringBuilder::new();
        let mut currency = StringBuilder::new();
        let mut exchange = StringBuilder::new();
        let mut notes = StringBuilder::new();
        let mut date_str = StringBuilder::new();

        for record in records {
            trade_date.append_value(date_to_days(record.trade_date));
            ticker.append_option(record.ticker.as_deref());
            open_price.append_option(record.open_price);
            close_price.append_option(record.close_price);
            volume.append_option(record.volume);
            sector.append_option(record.sector.as_deref());
            validated.append_option(record.validated.as_deref());
            currency.append_option(record.currency.as_deref());
            exchange.append_option(record.exchange.as_deref());
            notes.append_option(record.notes.as_deref());
            date_str.append_value(&record.date_str);
        }

        let columns: Vec<ArrayRef> = vec![
            Arc::new(trade_date.finish()) as ArrayRef,
            Arc::new(ticker.finish()) as ArrayRef,
            Arc::new(open_price.finish()) as ArrayRef,
            Arc::new(close_price.finish()) as ArrayRef,
            Arc::new(volume.finish()) as ArrayRef,
            Arc::new(sector.finish()) as ArrayRef,
            Arc::new(validated.finish()) as ArrayRef,
            Arc::new(currency.finish()) as ArrayRef,
            Arc::new(exchange.finish()) as ArrayRef,
            Arc::new(notes.finish()) as ArrayRef,
            Arc::new(date_str.finish()) as ArrayRef,
        ];

        Ok(RecordBatch::try_new(Arc::new(schema::clean_record_schema()), columns)?)
    }

    pub fn daily_averages_to_record_batch(rows: &[DailyAverage]) -> Result<RecordBatch> {
        let trade_date: Date32Array = rows.iter().map(|r| Some(date_to_days(r.trade_date))).collect();
        let ticker: StringArray = rows.iter().map(|r| Some(r.ticker.as_str())).collect();
        let avg_close: Float64Array = rows.iter().map(|r| Some(r.avg_close)).collect();

        Ok(RecordBatch::try_new(
            Arc::new(schema::daily_average_schema()),
            vec![
                Arc::new(trade_date) as ArrayRef,
                Arc::new(ticker) as ArrayRef,
                Arc::new(avg_close) as ArrayRef,
            ],
        )?)
    }

    pub fn ticker_averages_to_record_batch(rows: &[TickerAverage]) -> Result<RecordBatch> {
        let ticker: StringArray = rows.iter().map(|r| Some(r.ticker.as_str())).collect();
        let avg_volume: Float64Array = rows.iter().map(|r| Some(r.avg_volume)).collect();

        Ok(RecordBatch::try_new(
            Arc::new(schema::ticker_average_schema()),
            vec![Arc::new(ticker) as ArrayRef, Arc::new(avg_volume) as ArrayRef],
        )?)
    }

    /// 写入Arrow IPC文件。先写临时文件再整体替换，读者不会看到写了一半的文件
    pub fn write_record_batch(batch: &RecordBatch, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let tmp = tmp_path(path);
        let written = write_ipc_file(batch, &tmp)
            .and_then(|_| fs::rename(&tmp, path).map_err(PipelineError::from));
        if let Err(e) = written {
            // 写入或替换失败时不留下半成品临时文件
            if tmp.exists() {
                if let Err(rm) = fs::remove_file(&tmp) {
                    warn!("Failed to remove {}: {}", tmp.display(), rm);
                }
            }
            return Err(e);
        }

        info!("Saved {} rows to {}", batch.num_rows(), path.display());
        Ok(())
    }

    fn write_ipc_file(batch: &RecordBatch, path: &Path) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = FileWriter::try_new(file, &batch.schema())?;
        writer.write(batch)?;
        writer.finish()?;
        Ok(())
    }

    fn tmp_path(path: &Path) -> PathBuf {
        let mut name = path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        path.with_file_name(name)
    }

    // 从Arrow文件读取全部批次
    pub fn read_record_batches(path: &Path) -> Result<(SchemaRef, Vec<RecordBatch>)> {
        let file = File::open(path)?;
        let reader = FileReader::try_new(file, None)?;
        let schema = reader.schema();

        let mut batches = Vec::new();
        for batch in reader {
            batches.push(batch?);
        }
        debug!("Read {} batches from {}", batches.len(), path.display());

        Ok((schema, batches))
    }

    pub fn save_clean_records(records: &[CleanRecord], path: &Path) -> Result<()> {
        let batch = clean_records_to_record_batch(records)?;
        write_record_batch(&batch, path)
    }

    pub fn save_daily_averages(rows: &[DailyAverage], path: &Path) -> Result<()> {
        let batch = daily_averages_to_record_batch(rows)?;
        write_record_batch(&batch, path)
    }

    pub fn save_ticker_averages(rows: &[TickerAverage], path: &Path) -> Result<()> {
        let batch = ticker_averages_to_record_batch(rows)?;
        write_record_batch(&batch, path)
    }

    // 从Arrow文件读取清洗后的记录，结构必须完全一致
    pub fn read_clean_records(path: &Path) -> Result<Vec<CleanRecord>> {
        let (file_schema, batches) = read_record_batches(path)?;
        schema::check_schema(CLEANED_TABLE, &file_schema, &schema::clean_record_schema())?;

        let mut result = Vec::new();
        for batch in &batches {
            let trade_date = downcast::<Date32Array>(batch, 0, CLEANED_TABLE)?;
            let ticker = downcast::<StringArray>(batch, 1, CLEANED_TABLE)?;
            let open_price = downcast::<Float64Array>(batch, 2, CLEANED_TABLE)?;
            let close_price = downcast::<Float64Array>(batch, 3, CLEANED_TABLE)?;
            let volume = downcast::<Float64Array>(batch, 4, CLEANED_TABLE)?;
            let sector = downcast::<StringArray>(batch, 5, CLEANED_TABLE)?;
            let validated = downcast::<StringArray>(batch, 6, CLEANED_TABLE)?;
            let currency = downcast::<StringArray>(batch, 7, CLEANED_TABLE)?;
            let exchange = downcast::<StringArray>(batch, 8, CLEANED_TABLE)?;
            let notes = downcast::<StringArray>(batch, 9, CLEANED_TABLE)?;
            let date_str = downcast::<StringArray>(batch, 10, CLEANED_TABLE)?;

            for i in 0..batch.num_rows() {
                let date = required_date(trade_date, i, CLEANED_TABLE)?;
                if date_str.is_null(i) {
                    return Err(PipelineError::DataError(format!(
                        "null date_str at row {} of {}", i, path.display()
                    )));
                }
                result.push(CleanRecord {
                    trade_date: date,
                    ticker: opt_string(ticker, i),
                    open_price: opt_f64(open_price, i),
                    close_price: opt_f64(close_price, i),
                    volume: opt_f64(volume, i),
                    sector: opt_string(sector, i),
                    validated: opt_string(validated, i),
                    currency: opt_string(currency, i),
                    exchange: opt_string(exchange, i),
                    notes: opt_string(notes, i),
                    date_str: date_str.value(i).to_string(),
                });
            }
        }

        Ok(result)
    }

    pub fn read_daily_averages(path: &Path) -> Result<Vec<DailyAverage>> {
        let (file_schema, batches) = read_record_batches(path)?;
        schema::check_schema(DAILY_AVG_TABLE, &file_schema, &schema::daily_average_schema())?;

        let mut result = Vec::new();
        for batch in &batches {
            let trade_date = downcast::<Date32Array>(batch, 0, DAILY_AVG_TABLE)?;
            let ticker = downcast::<StringArray>(batch, 1, DAILY_AVG_TABLE)?;
            let avg_close = downcast::<Float64Array>(batch, 2, DAILY_AVG_TABLE)?;

            for i in 0..batch.num_rows() {
                // 聚合表的三列都不允许为空，出现空值说明文件不是本管道写出的
                let (Some(ticker), Some(avg_close)) = (opt_string(ticker, i), opt_f64(avg_close, i)) else {
                    return Err(PipelineError::DataError(format!(
                        "null value at row {} of {}", i, path.display()
                    )));
                };
                result.push(DailyAverage {
                    trade_date: required_date(trade_date, i, DAILY_AVG_TABLE)?,
                    ticker,
                    avg_close,
                });
            }
        }

        Ok(result)
    }

    pub fn read_ticker_averages(path: &Path) -> Result<Vec<TickerAverage>> {
        let (file_schema, batches) = read_record_batches(path)?;
        schema::check_schema(TICKER_AVG_TABLE, &file_schema, &schema::ticker_average_schema())?;

        let mut result = Vec::new();
        for batch in &batches {
            let ticker = downcast::<StringArray>(batch, 0, TICKER_AVG_TABLE)?;
            let avg_volume = downcast::<Float64Array>(batch, 1, TICKER_AVG_TABLE)?;

            for i in 0..batch.num_rows() {
                let (Some(ticker), Some(avg_volume)) = (opt_string(ticker, i), opt_f64(avg_volume, i)) else {
                    return Err(PipelineError::DataError(format!(
                        "null value at row {} of {}", i, path.display()
                    )));
                };
                result.push(TickerAverage { ticker, avg_volume });
            }
        }

        Ok(result)
    }

    /// 读取聚合阶段需要的四列并重新做类型转换。
    ///
    /// 输入不一定来自清洗阶段：日期列可以是 Date32/Date64/Timestamp/字符串，
    /// 数值列可以是任意整数、浮点或字符串类型，无法解析的值变成空值。
    pub fn read_aggregate_rows(path: &Path) -> Result<Vec<AggregateRow>> {
        let (file_schema, batches) = read_record_batches(path)?;
        let indices = schema::require_columns(
            CLEANED_TABLE,
            &file_schema,
            &[TRADE_DATE, TICKER, CLOSE_PRICE, VOLUME],
        )?;

        let mut rows = Vec::new();
        for batch in &batches {
            rows.extend(aggregate_rows_from_batch(batch, &indices)?);
        }
        Ok(rows)
    }

    pub fn aggregate_rows_from_batch(batch: &RecordBatch, indices: &[usize]) -> Result<Vec<AggregateRow>> {
        let dates = coerce_dates(batch.column(indices[0]))?;
        let tickers = coerce_strings(batch.column(indices[1]))?;
        let closes = coerce_floats(batch.column(indices[2]), CLOSE_PRICE)?;
        let volumes = coerce_floats(batch.column(indices[3]), VOLUME)?;

        Ok(dates
            .into_iter()
            .zip(tickers)
            .zip(closes.into_iter().zip(volumes))
            .map(|((trade_date, ticker), (close_price, volume))| AggregateRow {
                trade_date,
                ticker,
                close_price,
                volume,
            })
            .collect())
    }

    fn coerce_dates(array: &ArrayRef) -> Result<Vec<Option<NaiveDate>>> {
        match array.data_type() {
            DataType::Null => Ok(vec![None; array.len()]),
            DataType::Utf8 | DataType::LargeUtf8 | DataType::Utf8View => {
                let strings = cast(array, &DataType::Utf8)?;
                let strings = strings.as_any().downcast_ref::<StringArray>().ok_or_else(|| {
                    PipelineError::ArrowError(arrow::error::ArrowError::CastError(
                        "Failed to downcast trade_date strings".to_string(),
                    ))
                })?;
                Ok(strings.iter().map(|v| v.and_then(parse_date_permissive)).collect())
            }
            DataType::Date32 | DataType::Date64 | DataType::Timestamp(_, _) => {
                let days = cast(array, &DataType::Date32)?;
                let days = days.as_any().downcast_ref::<Date32Array>().ok_or_else(|| {
                    PipelineError::ArrowError(arrow::error::ArrowError::CastError(
                        "Failed to downcast trade_date".to_string(),
                    ))
                })?;
                Ok(days.iter().map(|v| v.and_then(days_to_date)).collect())
            }
            other => Err(PipelineError::schema_mismatch(
                CLEANED_TABLE,
                format!("trade_date cannot be read as a date from {}", other),
            )),
        }
    }

    fn coerce_floats(array: &ArrayRef, column: &str) -> Result<Vec<Option<f64>>> {
        let data_type = array.data_type();
        match data_type {
            DataType::Null => Ok(vec![None; array.len()]),
            DataType::Utf8 | DataType::LargeUtf8 | DataType::Utf8View => {
                let strings = coerce_strings(array)?;
                Ok(strings.iter().map(|v| v.as_deref().and_then(parse_number)).collect())
            }
            t if t.is_numeric() => {
                let floats = cast(array, &DataType::Float64)?;
                let floats = floats.as_any().downcast_ref::<Float64Array>().ok_or_else(|| {
                    PipelineError::ArrowError(arrow::error::ArrowError::CastError(format!(
                        "Failed to downcast {}", column
                    )))
                })?;
                Ok(floats.iter().map(|v| v.filter(|x| !x.is_nan())).collect())
            }
            other => Err(PipelineError::schema_mismatch(
                CLEANED_TABLE,
                format!("{} cannot be read as a number from {}", column, other),
            )),
        }
    }

    fn coerce_strings(array: &ArrayRef) -> Result<Vec<Option<String>>> {
        let strings = cast(array, &DataType::Utf8)?;
        let strings = strings.as_any().downcast_ref::<StringArray>().ok_or_else(|| {
            PipelineError::ArrowError(arrow::error::ArrowError::CastError(
                "Failed to downcast string column".to_string(),
            ))
        })?;
        Ok(strings.iter().map(|v| v.map(str::to_string)).collect())
    }

    fn downcast<'a, T: 'static>(batch: &'a RecordBatch, idx: usize, table: &str) -> Result<&'a T> {
        batch.column(idx).as_any().downcast_ref::<T>().ok_or_else(|| {
            let field = batch.schema_ref().field(idx).name().clone();
            PipelineError::schema_mismatch(table, format!("failed to downcast {} column", field))
        })
    }

    fn required_date(array: &Date32Array, i: usize, table: &str) -> Result<NaiveDate> {
        if array.is_null(i) {
            return Err(PipelineError::DataError(format!("null trade_date at row {} of {}", i, table)));
        }
        days_to_date(array.value(i))
            .ok_or_else(|| PipelineError::DataError(format!("trade_date out of range at row {} of {}", i, table)))
    }

    fn opt_string(array: &StringArray, i: usize) -> Option<String> {
        if array.is_null(i) {
            None
        } else {
            Some(array.value(i).to_string())
        }
    }

    fn opt_f64(array: &Float64Array, i: usize) -> Option<f64> {
        if array.is_null(i) {
            None
        } else {
            Some(array.value(i))
        }
    }

    /// 列名与类型的简短描述，供检查工具打印
    pub fn describe_schema(schema: &Schema) -> Vec<String> {
        schema
            .fields()
            .iter()
            .map(|f| format!("{}: {}", f.name(), f.data_type()))
            .collect()
    }
}
