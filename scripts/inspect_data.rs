use anyhow::{Context, Result};
use csv::ReaderBuilder;
use std::env;
use std::path::{Path, PathBuf};

use stock_pipeline::config::Config;
use stock_pipeline::util::arrow_utils;

const HEAD_ROWS: usize = 5;

fn main() -> Result<()> {
    // 默认读取 data/raw/stock_market.csv，也可以通过第一个参数指定
    let path = env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| Config::new().raw_csv_path);

    println!("Loading: {}", path.display());
    if path.extension().map_or(false, |ext| ext == "arrow") {
        return inspect_arrow(&path);
    }

    let mut rdr = ReaderBuilder::new()
        .flexible(true)
        .from_path(&path)
        .with_context(|| format!("failed to open {}", path.display()))?;

    let headers = rdr.headers()?.clone();
    let mut head = Vec::new();
    let mut non_missing = vec![0usize; headers.len()];
    let mut rows = 0usize;

    for record in rdr.records() {
        let record = record.with_context(|| format!("bad record after row {}", rows))?;
        for (i, count) in non_missing.iter_mut().enumerate() {
            if record.get(i).map_or(false, |v| !v.trim().is_empty()) {
                *count += 1;
            }
        }
        if head.len() < HEAD_ROWS {
            head.push(record);
        }
        rows += 1;
    }

    println!("\n=== SHAPE ===");
    println!("({}, {})", rows, headers.len());

    println!("\n=== COLUMNS ===");
    println!("{:?}", headers.iter().collect::<Vec<_>>());

    println!("\n=== HEAD ===");
    println!("{}", headers.iter().collect::<Vec<_>>().join(" | "));
    for record in &head {
        println!("{}", record.iter().collect::<Vec<_>>().join(" | "));
    }

    println!("\n=== INFO ===");
    println!("{:<4} {:<20} {}", "#", "Column", "Non-empty Count");
    println!("{:-<45}", "");
    for (i, (name, count)) in headers.iter().zip(&non_missing).enumerate() {
        println!("{:<4} {:<20} {}", i, name, count);
    }

    Ok(())
}

// 检查点文件只打印结构和行数
fn inspect_arrow(path: &Path) -> Result<()> {
    let (schema, batches) = arrow_utils::read_record_batches(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let rows: usize = batches.iter().map(|b| b.num_rows()).sum();

    println!("\n=== SHAPE ===");
    println!("({}, {})", rows, schema.fields().len());

    println!("\n=== SCHEMA ===");
    for line in arrow_utils::describe_schema(&schema) {
        println!("{}", line);
    }

    Ok(())
}
