use stock_pipeline::config::Config;
use stock_pipeline::data_provider::AggregateProvider;
use stock_pipeline::presenter::{self, DashboardFilter};
use stock_pipeline::services::pipeline_service::{PipelineService, RunReport};
use stock_pipeline::PipelineError;

use chrono::NaiveDate;
use clap::{App, Arg, ArgMatches, SubCommand};
use log::info;
use std::error::Error;

fn main() -> Result<(), Box<dyn Error>> {
    // Initialize logger
    env_logger::init();

    let app = App::new("StockPipeline")
        .version("0.1.0")
        .about("Clean raw stock trade records, aggregate them and explore the results")
        .arg(
            Arg::with_name("data-dir")
                .long("data-dir")
                .value_name("DIR")
                .help("Root directory holding raw/ and processed/")
                .takes_value(true)
                .global(true)
                .default_value("data"),
        )
        .subcommand(
            SubCommand::with_name("clean")
                .about("Clean the raw CSV into the cleaned table")
                .arg(
                    Arg::with_name("input")
                        .short('i')
                        .long("input")
                        .value_name("CSV")
                        .help("Raw CSV to read instead of <data-dir>/raw/stock_market.csv")
                        .takes_value(true),
                ),
        )
        .subcommand(SubCommand::with_name("aggregate").about("Build the aggregate tables from the cleaned table"))
        .subcommand(
            SubCommand::with_name("run")
                .about("Run cleaning and aggregation in order")
                .arg(
                    Arg::with_name("input")
                        .short('i')
                        .long("input")
                        .value_name("CSV")
                        .help("Raw CSV to read instead of <data-dir>/raw/stock_market.csv")
                        .takes_value(true),
                ),
        )
        .subcommand(
            SubCommand::with_name("explore")
                .about("Show the aggregate dashboard")
                .arg(
                    Arg::with_name("from")
                        .long("from")
                        .value_name("DATE")
                        .help("First trade date to show (YYYY-MM-DD)")
                        .takes_value(true),
                )
                .arg(
                    Arg::with_name("to")
                        .long("to")
                        .value_name("DATE")
                        .help("Last trade date to show (YYYY-MM-DD)")
                        .takes_value(true),
                )
                .arg(
                    Arg::with_name("ticker")
                        .short('t')
                        .long("ticker")
                        .value_name("TICKER")
                        .help("Ticker(s) to show, defaults to the first few")
                        .takes_value(true)
                        .multiple_occurrences(true)
                        .use_value_delimiter(true),
                )
                .arg(
                    Arg::with_name("all")
                        .short('a')
                        .long("all")
                        .help("Show every ticker")
                        .takes_value(false),
                )
                .arg(
                    Arg::with_name("json")
                        .long("json")
                        .help("Print the filtered daily averages as JSON")
                        .takes_value(false),
                ),
        );

    let matches = app.get_matches();
    let data_dir = matches.value_of("data-dir").unwrap_or("data");
    let config = Config::new().with_data_dir(data_dir);

    match matches.subcommand() {
        Some(("clean", sub)) => {
            let service = PipelineService::new(with_input(config, sub));
            log_report(&service.run_clean()?)?;
        }
        Some(("aggregate", _)) => {
            let service = PipelineService::new(config);
            log_report(&service.run_aggregate()?)?;
        }
        Some(("run", sub)) => {
            let service = PipelineService::new(with_input(config, sub));
            log_report(&service.run_all()?)?;
        }
        Some(("explore", sub)) => explore(&config, sub)?,
        _ => info!("No command specified. Use --help for usage information."),
    }

    Ok(())
}

fn with_input(config: Config, matches: &ArgMatches) -> Config {
    match matches.value_of("input") {
        Some(path) => config.with_raw_csv_path(path),
        None => config,
    }
}

fn log_report(report: &RunReport) -> Result<(), Box<dyn Error>> {
    info!("Run report:\n{}", serde_json::to_string_pretty(report)?);
    Ok(())
}

fn explore(config: &Config, matches: &ArgMatches) -> Result<(), Box<dyn Error>> {
    let provider = AggregateProvider::load(config)?;

    let mut filter = if matches.is_present("all") {
        DashboardFilter::new()
    } else if let Some(tickers) = matches.values_of("ticker") {
        DashboardFilter::new().with_tickers(&tickers.collect::<Vec<_>>())
    } else {
        DashboardFilter::default_for(&provider, config.default_ticker_count)
    };

    let bounds = provider.date_bounds();
    let from = parse_date_arg(matches.value_of("from"))?;
    let to = parse_date_arg(matches.value_of("to"))?;
    if let Some((min, max)) = bounds {
        if from.is_some() || to.is_some() {
            filter = filter.with_date_range(from.unwrap_or(min), to.unwrap_or(max));
        }
    }

    if matches.is_present("json") {
        let rows = presenter::filter_daily(&provider, &filter);
        println!("{}", presenter::daily_view_to_json(&rows)?);
    } else {
        print!("{}", presenter::render_dashboard(&provider, &filter));
    }

    Ok(())
}

// 命令行日期只接受 YYYY-MM-DD，格式错误通过 PipelineError::DateError 报告
fn parse_date_arg(value: Option<&str>) -> stock_pipeline::Result<Option<NaiveDate>> {
    value
        .map(|v| NaiveDate::parse_from_str(v, "%Y-%m-%d").map_err(PipelineError::from))
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn date_args_parse_or_report_date_error() {
        assert_eq!(parse_date_arg(None).unwrap(), None);
        assert_eq!(
            parse_date_arg(Some("2024-01-02")).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 2)
        );
        let err = parse_date_arg(Some("01/02/2024")).unwrap_err();
        assert!(matches!(err, PipelineError::DateError(_)));
    }
}
