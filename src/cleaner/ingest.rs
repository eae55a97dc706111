use csv::{ReaderBuilder, StringRecord};
use log::{info, warn};
use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::config::Config;
use crate::errors::{PipelineError, Result};
use crate::models::record::{RawRecord, RAW_COLUMNS};

pub const RAW_TABLE: &str = "raw";

/// 读取原始CSV文件
pub fn read_raw_csv(path: &Path, config: &Config) -> Result<Vec<RawRecord>> {
    info!("Loading raw CSV from {}", path.display());
    let file = File::open(path)?;
    read_raw_records(file, config)
}

pub fn read_raw_records<R: Read>(reader: R, config: &Config) -> Result<Vec<RawRecord>> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let headers = rdr.headers()?.clone();
    let positions = resolve_columns(&headers, config)?;

    let mut records = Vec::new();
    let mut bad_cells = 0usize;
    for record in rdr.byte_records() {
        let record = record?;
        // 短行缺少的单元格按缺失处理，非UTF-8单元格同样置空，整行保留
        let values = positions.map(|p| {
            let cell = record.get(p)?;
            let decoded = std::str::from_utf8(cell).ok().map(str::to_string);
            if decoded.is_none() {
                bad_cells += 1;
            }
            decoded
        });
        records.push(RawRecord::from_values(values));
    }

    if bad_cells > 0 {
        warn!("Treated {} cells with invalid UTF-8 as missing", bad_cells);
    }
    info!("Read {} raw rows with {} columns", records.len(), headers.len());
    Ok(records)
}

/// 把表头重命名为规范列名，返回每个规范列在原始行里的位置。
///
/// 表头可以是可读名称（"Close Price"），也可以已经是规范名称（"close_price"）。
/// 缺少任何一列都是致命错误；多出来的列丢弃并记录警告。
pub fn resolve_columns(headers: &StringRecord, config: &Config) -> Result<[usize; 10]> {
    let mut positions: [Option<usize>; 10] = [None; 10];
    let mut unknown = Vec::new();

    for (idx, header) in headers.iter().enumerate() {
        let canonical = config.canonical_name(header).unwrap_or(header);
        match RAW_COLUMNS.iter().position(|c| *c == canonical) {
            Some(slot) => {
                if positions[slot].is_some() {
                    return Err(PipelineError::schema_mismatch(
                        RAW_TABLE,
                        format!("column {} appears more than once (header {:?})", canonical, header),
                    ));
                }
                positions[slot] = Some(idx);
            }
            None => unknown.push(header.to_string()),
        }
    }

    if !unknown.is_empty() {
        warn!("Ignoring unexpected raw columns: {}", unknown.join(", "));
    }

    let missing: Vec<&str> = RAW_COLUMNS
        .iter()
        .zip(positions.iter())
        .filter(|(_, p)| p.is_none())
        .map(|(name, _)| raw_header_for(config, name))
        .collect();
    if !missing.is_empty() {
        return Err(PipelineError::schema_mismatch(
            RAW_TABLE,
            format!("missing expected columns: {}", missing.join(", ")),
        ));
    }

    Ok(positions.map(|p| p.unwrap_or_default()))
}

fn raw_header_for<'a>(config: &'a Config, canonical: &'a str) -> &'a str {
    config
        .column_names
        .iter()
        .find(|(_, c)| c == canonical)
        .map(|(raw, _)| raw.as_str())
        .unwrap_or(canonical)
}
