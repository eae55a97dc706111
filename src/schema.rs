//! 各阶段之间的表结构约定。
//!
//! 每个检查点文件都有一份有序的 (列名, 类型) 声明，阶段入口先核对结构，
//! 不符合就直接报 `SchemaMismatch`。

use arrow_schema::{DataType, Field, Schema};

use crate::errors::{PipelineError, Result};
use crate::models::aggregate::{AVG_CLOSE, AVG_VOLUME};
use crate::models::record::*;

pub const CLEANED_TABLE: &str = "cleaned";
pub const DAILY_AVG_TABLE: &str = "daily_average";
pub const TICKER_AVG_TABLE: &str = "ticker_average";

pub fn clean_record_schema() -> Schema {
    Schema::new(vec![
        Field::new(TRADE_DATE, DataType::Date32, false),
        Field::new(TICKER, DataType::Utf8, true),
        Field::new(OPEN_PRICE, DataType::Float64, true),
        Field::new(CLOSE_PRICE, DataType::Float64, true),
        Field::new(VOLUME, DataType::Float64, true),
        Field::new(SECTOR, DataType::Utf8, true),
        Field::new(VALIDATED, DataType::Utf8, true),
        Field::new(CURRENCY, DataType::Utf8, true),
        Field::new(EXCHANGE, DataType::Utf8, true),
        Field::new(NOTES, DataType::Utf8, true),
        Field::new(DATE_STR, DataType::Utf8, false),
    ])
}

pub fn daily_average_schema() -> Schema {
    Schema::new(vec![
        Field::new(TRADE_DATE, DataType::Date32, false),
        Field::new(TICKER, DataType::Utf8, false),
        Field::new(AVG_CLOSE, DataType::Float64, false),
    ])
}

pub fn ticker_average_schema() -> Schema {
    Schema::new(vec![
        Field::new(TICKER, DataType::Utf8, false),
        Field::new(AVG_VOLUME, DataType::Float64, false),
    ])
}

/// 按顺序逐列比对列名和类型，可空性不参与比较
pub fn check_schema(table: &str, actual: &Schema, expected: &Schema) -> Result<()> {
    if actual.fields().len() != expected.fields().len() {
        return Err(PipelineError::schema_mismatch(
            table,
            format!(
                "expected {} columns [{}], found {} [{}]",
                expected.fields().len(),
                column_list(expected),
                actual.fields().len(),
                column_list(actual)
            ),
        ));
    }

    for (i, (found, want)) in actual.fields().iter().zip(expected.fields().iter()).enumerate() {
        if found.name() != want.name() || found.data_type() != want.data_type() {
            return Err(PipelineError::schema_mismatch(
                table,
                format!(
                    "column {} should be {} ({}), found {} ({})",
                    i,
                    want.name(),
                    want.data_type(),
                    found.name(),
                    found.data_type()
                ),
            ));
        }
    }

    Ok(())
}

/// 只要求列存在，返回各列的位置
pub fn require_columns(table: &str, actual: &Schema, names: &[&str]) -> Result<Vec<usize>> {
    let mut indices = Vec::with_capacity(names.len());
    let mut missing = Vec::new();
    for name in names {
        match actual.index_of(name) {
            Ok(idx) => indices.push(idx),
            Err(_) => missing.push(*name),
        }
    }
    if !missing.is_empty() {
        return Err(PipelineError::schema_mismatch(
            table,
            format!("missing columns: {}", missing.join(", ")),
        ));
    }
    Ok(indices)
}

fn column_list(schema: &Schema) -> String {
    schema
        .fields()
        .iter()
        .map(|f| f.name().as_str())
        .collect::<Vec<_>>()
        .join(", ")
}
