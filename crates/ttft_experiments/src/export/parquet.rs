use std::sync::Arc;

use arrow::array::{ArrayRef, Float64Array, StringArray, UInt32Array, UInt64Array};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::file::properties::WriterProperties;

use crate::aggregate::{CellReport, CellSummary};

pub(crate) fn export_summary_parquet_impl(
    cells: &[(&CellReport, &CellSummary)],
    file: std::fs::File,
) -> Result<(), Box<dyn std::error::Error>> {
    let batch = build_record_batch(cells)?;
    let props = WriterProperties::builder().build();
    let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props))?;
    writer.write(&batch)?;
    writer.close()?;

    Ok(())
}

fn build_record_batch(
    cells: &[(&CellReport, &CellSummary)],
) -> Result<RecordBatch, arrow::error::ArrowError> {
    let schema = Arc::new(parquet_schema());
    let arrays = build_arrays(cells);

    RecordBatch::try_new(schema, arrays)
}

fn parquet_schema() -> Schema {
    Schema::new(vec![
        Field::new("run_tag", DataType::Utf8, false),
        Field::new("max_inflight", DataType::UInt32, false),
        Field::new("concurrency", DataType::UInt32, false),
        Field::new("total_requests", DataType::UInt64, false),
        Field::new("successful_requests", DataType::UInt64, false),
        Field::new("success_rate", DataType::Float64, false),
        Field::new("mean_ttft_s", DataType::Float64, false),
        Field::new("p50_ttft_s", DataType::Float64, false),
        Field::new("p95_ttft_s", DataType::Float64, false),
        Field::new("p99_ttft_s", DataType::Float64, false),
        Field::new("p95_latency_s", DataType::Float64, false),
        Field::new("throughput_rps", DataType::Float64, false),
        Field::new("gpu_util_pct", DataType::Float64, true),
        Field::new("mem_util_pct", DataType::Float64, true),
        Field::new("tradeoff_score", DataType::Float64, true),
    ])
}

fn float_column(
    cells: &[(&CellReport, &CellSummary)],
    value: impl Fn(&CellReport, &CellSummary) -> f64,
) -> ArrayRef {
    Arc::new(Float64Array::from(
        cells
            .iter()
            .map(|&(cell, summary)| value(cell, summary))
            .collect::<Vec<_>>(),
    ))
}

fn nullable_float_column(
    cells: &[(&CellReport, &CellSummary)],
    value: impl Fn(&CellReport, &CellSummary) -> Option<f64>,
) -> ArrayRef {
    Arc::new(Float64Array::from(
        cells
            .iter()
            .map(|&(cell, summary)| value(cell, summary))
            .collect::<Vec<_>>(),
    ))
}

fn build_arrays(cells: &[(&CellReport, &CellSummary)]) -> Vec<ArrayRef> {
    vec![
        Arc::new(StringArray::from(
            cells
                .iter()
                .map(|(cell, _)| cell.run_tag.to_string())
                .collect::<Vec<_>>(),
        )),
        Arc::new(UInt32Array::from(
            cells
                .iter()
                .map(|(cell, _)| cell.max_inflight)
                .collect::<Vec<_>>(),
        )),
        Arc::new(UInt32Array::from(
            cells
                .iter()
                .map(|(cell, _)| cell.concurrency)
                .collect::<Vec<_>>(),
        )),
        Arc::new(UInt64Array::from(
            cells
                .iter()
                .map(|(_, summary)| summary.total_requests as u64)
                .collect::<Vec<_>>(),
        )),
        Arc::new(UInt64Array::from(
            cells
                .iter()
                .map(|(_, summary)| summary.successful_requests as u64)
                .collect::<Vec<_>>(),
        )),
        float_column(cells, |_, s| s.success_rate),
        float_column(cells, |_, s| s.ttft.mean_s),
        float_column(cells, |_, s| s.ttft.p50_s),
        float_column(cells, |_, s| s.ttft.p95_s),
        float_column(cells, |_, s| s.ttft.p99_s),
        float_column(cells, |_, s| s.latency.p95_s),
        float_column(cells, |_, s| s.throughput_rps),
        nullable_float_column(cells, |_, s| s.gpu.map(|gpu| gpu.sm_util_pct)),
        nullable_float_column(cells, |_, s| s.gpu.map(|gpu| gpu.mem_util_pct)),
        nullable_float_column(cells, |cell, _| cell.tradeoff_score),
    ]
}
