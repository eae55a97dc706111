use std::fs;
use std::path::Path;
use std::sync::Arc;

use arrow::array::{ArrayRef, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use chrono::NaiveDate;

use stock_pipeline::cleaner;
use stock_pipeline::presenter::{self, DashboardFilter, NO_PRICE_DATA};
use stock_pipeline::util::arrow_utils;
use stock_pipeline::{AggregateProvider, CleanRecord, Config, PipelineError, PipelineService, RawRecord};

const HEADER: &str = "Trade Date,Ticker,Open Price,Close Price,Volume,Sector,Validated,Currency,Exchange,Notes";

const SAMPLE: &str = "\
Trade Date,Ticker,Open Price,Close Price,Volume,Sector,Validated,Currency,Exchange,Notes
2024-01-02,AAPL,150,152,1000000,Technology,Yes,USD,NASDAQ,
2024-01-02,aapl,151,153,NA,Technology,Yes,USD,NASDAQ,
  ,MSFT,300,301,500000,Technology,Yes,USD,NASDAQ,
01/03/2024, MSFT ,302,305,700000,Technology,no,usd,nasdaq,Earnings
2024-01-03,msft,302,305,700000,technology,NO,USD,NASDAQ,earnings
2024-01-04,GOOG,n/a,140.5,-,Communication,null,USD,NASDAQ,Missing volume
not a date,GOOG,1,2,3,Communication,yes,USD,NASDAQ,
";

fn setup(csv: &str) -> (tempfile::TempDir, Config) {
    let dir = tempfile::tempdir().unwrap();
    let config = Config::new().with_data_dir(dir.path());
    write_raw(&config.raw_csv_path, csv);
    (dir, config)
}

fn write_raw(path: &Path, csv: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, csv).unwrap();
}

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
}

#[test]
fn full_run_writes_all_checkpoints() {
    let (_dir, config) = setup(SAMPLE);
    let service = PipelineService::new(config);
    let report = service.run_all().unwrap();
    let config = service.config();

    let clean = report.clean.unwrap();
    assert_eq!(clean.rows_read, 7);
    assert_eq!(clean.invalid_dates, 2);
    assert_eq!(clean.duplicates_removed, 1);
    assert_eq!(clean.rows_written, 4);

    let cleaned = arrow_utils::read_clean_records(&config.cleaned_path).unwrap();
    assert_eq!(cleaned.len(), 4);
    assert!(cleaned.iter().all(|r| !r.date_str.is_empty()));

    let daily = arrow_utils::read_daily_averages(&config.daily_avg_path).unwrap();
    let aapl = daily.iter().find(|d| d.ticker == "aapl" && d.trade_date == day(2)).unwrap();
    assert_eq!(aapl.avg_close, 152.5);
    // goog 缺成交量，但仍出现在日均价中
    assert!(daily.iter().any(|d| d.ticker == "goog" && d.avg_close == 140.5));

    let tickers = arrow_utils::read_ticker_averages(&config.ticker_avg_path).unwrap();
    let names: Vec<&str> = tickers.iter().map(|t| t.ticker.as_str()).collect();
    assert_eq!(names, vec!["aapl", "msft"]);
    assert_eq!(tickers[0].avg_volume, 1_000_000.0);
    assert_eq!(tickers[1].avg_volume, 700_000.0);

    let report_json: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&config.report_path).unwrap()).unwrap();
    assert_eq!(report_json["clean"]["rows_written"], 4);
    assert_eq!(report_json["aggregate"]["daily_groups"], 3);
}

#[test]
fn cleaned_table_has_no_sentinels_and_lowercase_text() {
    let (_dir, config) = setup(SAMPLE);
    let service = PipelineService::new(config);
    service.run_clean().unwrap();

    let cleaned = arrow_utils::read_clean_records(&service.config().cleaned_path).unwrap();
    let tokens = ["", "na", "n/a", "null", "-"];
    for record in &cleaned {
        for value in record.text_values().iter().flatten() {
            assert!(!tokens.contains(&value.trim().to_lowercase().as_str()), "{:?}", value);
            assert_eq!(*value, value.trim().to_lowercase());
        }
    }
}

#[test]
fn cleaning_the_checkpoint_again_changes_nothing() {
    let (_dir, config) = setup(SAMPLE);
    let service = PipelineService::new(config);
    service.run_clean().unwrap();

    let first = arrow_utils::read_clean_records(&service.config().cleaned_path).unwrap();
    let raw: Vec<RawRecord> = first.iter().map(CleanRecord::to_raw).collect();
    let (second, report) = cleaner::clean(raw, service.config()).unwrap();

    assert_eq!(first, second);
    assert_eq!(report.invalid_dates, 0);
    assert_eq!(report.duplicates_removed, 0);
}

#[test]
fn missing_raw_column_is_fatal() {
    let csv = "Trade Date,Ticker,Open Price,Close Price,Sector,Validated,Currency,Exchange,Notes\n\
               2024-01-02,AAPL,1,2,tech,yes,usd,nasdaq,\n";
    let (_dir, config) = setup(csv);
    let err = PipelineService::new(config).run_all().unwrap_err();
    assert!(matches!(err, PipelineError::SchemaMismatch { .. }));
}

#[test]
fn header_only_input_flows_through_as_empty_tables() {
    let (_dir, config) = setup(&format!("{}\n", HEADER));
    let service = PipelineService::new(config);
    let report = service.run_all().unwrap();
    assert_eq!(report.clean.unwrap().rows_written, 0);

    let provider = AggregateProvider::load(service.config()).unwrap();
    assert!(provider.is_empty());
    let filter = DashboardFilter::default_for(&provider, service.config().default_ticker_count);
    assert!(presenter::render_dashboard(&provider, &filter).contains(NO_PRICE_DATA));
}

#[test]
fn aggregator_coerces_foreign_tables() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("foreign.arrow");

    let schema = Schema::new(vec![
        Field::new("ticker", DataType::Utf8, true),
        Field::new("trade_date", DataType::Utf8, true),
        Field::new("close_price", DataType::Utf8, true),
        Field::new("volume", DataType::Int64, true),
        Field::new("extra", DataType::Utf8, true),
    ]);
    let columns: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from(vec![Some("aapl"), Some("aapl"), Some("msft"), None])) as ArrayRef,
        Arc::new(StringArray::from(vec![Some("2024-01-02"), Some("Jan 2, 2024"), Some("garbage"), Some("2024-01-02")])) as ArrayRef,
        Arc::new(StringArray::from(vec![Some("10"), Some("20"), Some("5"), Some("7")])) as ArrayRef,
        Arc::new(Int64Array::from(vec![Some(100), None, Some(300), Some(400)])) as ArrayRef,
        Arc::new(StringArray::from(vec![Some("x"), Some("y"), Some("z"), Some("w")])) as ArrayRef,
    ];
    let batch = RecordBatch::try_new(Arc::new(schema), columns).unwrap();
    arrow_utils::write_record_batch(&batch, &path).unwrap();

    let rows = arrow_utils::read_aggregate_rows(&path).unwrap();
    assert_eq!(rows.len(), 4);
    assert_eq!(rows[1].trade_date, Some(day(2)));
    assert_eq!(rows[2].trade_date, None);
    assert_eq!(rows[0].volume, Some(100.0));

    let aggs = stock_pipeline::aggregator::aggregate(&rows);
    assert_eq!(aggs.daily.len(), 1);
    assert_eq!(aggs.daily[0].avg_close, 15.0);
    // msft 的日期无法解析，但成交量照样参与平均
    assert_eq!(aggs.tickers.len(), 2);
    assert_eq!(aggs.tickers[1].ticker, "msft");
    assert_eq!(aggs.tickers[1].avg_volume, 300.0);
}

#[test]
fn aggregator_rejects_tables_without_required_columns() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("partial.arrow");
    let schema = Schema::new(vec![Field::new("ticker", DataType::Utf8, true)]);
    let batch = RecordBatch::try_new(
        Arc::new(schema),
        vec![Arc::new(StringArray::from(vec!["aapl"])) as ArrayRef],
    )
    .unwrap();
    arrow_utils::write_record_batch(&batch, &path).unwrap();

    let err = arrow_utils::read_aggregate_rows(&path).unwrap_err();
    assert!(matches!(err, PipelineError::SchemaMismatch { .. }));
}

#[test]
fn strict_readers_reject_wrong_schema() {
    let (_dir, config) = setup(SAMPLE);
    let service = PipelineService::new(config);
    service.run_all().unwrap();

    // 用日均价文件冒充清洗结果
    let err = arrow_utils::read_clean_records(&service.config().daily_avg_path).unwrap_err();
    assert!(matches!(err, PipelineError::SchemaMismatch { .. }));
}

#[test]
fn dashboard_sees_rewritten_aggregates() {
    let (_dir, config) = setup(SAMPLE);
    let service = PipelineService::new(config);
    service.run_all().unwrap();

    let provider = AggregateProvider::load(service.config()).unwrap();
    assert_eq!(provider.available_tickers(), vec!["aapl", "goog", "msft"]);

    let mut more = SAMPLE.to_string();
    more.push_str("2024-01-05,TSLA,200,210,900000,Auto,yes,USD,NASDAQ,\n");
    for ticker in ["NVDA", "AMZN", "META", "NFLX", "ORCL", "INTC", "CSCO", "ADBE", "QCOM", "AVGO", "PYPL", "SBUX"] {
        more.push_str(&format!("2024-01-03,{},10,11,1000,Tech,yes,USD,NASDAQ,\n", ticker));
    }
    write_raw(&service.config().raw_csv_path, &more);
    service.run_all().unwrap();

    let provider = AggregateProvider::load(service.config()).unwrap();
    assert_eq!(provider.available_tickers().len(), 16);
    assert!(provider.available_tickers().contains(&"tsla"));
    assert_eq!(provider.date_bounds(), Some((day(2), day(5))));

    let filter = DashboardFilter::new().with_date_range(day(5), day(5)).with_tickers(&["TSLA"]);
    let text = presenter::render_dashboard(&provider, &filter);
    assert!(text.contains("tsla"));
    assert!(text.contains("210.00"));
}
