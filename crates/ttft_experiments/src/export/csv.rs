use crate::aggregate::SweepReport;

use super::writer_utils::format_optional;

pub(crate) fn export_summary_csv_impl(
    report: &SweepReport,
    file: std::fs::File,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut wtr = csv::Writer::from_writer(file);

    wtr.write_record([
        "file",
        "run_tag",
        "max_inflight",
        "concurrency",
        "total_requests",
        "successful_requests",
        "failed_requests",
        "success_rate",
        "mean_ttft_s",
        "min_ttft_s",
        "max_ttft_s",
        "p50_ttft_s",
        "p95_ttft_s",
        "p99_ttft_s",
        "mean_latency_s",
        "p50_latency_s",
        "p95_latency_s",
        "p99_latency_s",
        "throughput_rps",
        "duration_s",
        "gpu_util_pct",
        "mem_util_pct",
        "tradeoff_score",
    ])?;

    for (cell, summary) in report.populated() {
        wtr.write_record([
            summary.file.clone(),
            cell.run_tag.to_string(),
            cell.max_inflight.to_string(),
            cell.concurrency.to_string(),
            summary.total_requests.to_string(),
            summary.successful_requests.to_string(),
            summary.failed_requests.to_string(),
            summary.success_rate.to_string(),
            summary.ttft.mean_s.to_string(),
            summary.ttft.min_s.to_string(),
            summary.ttft.max_s.to_string(),
            summary.ttft.p50_s.to_string(),
            summary.ttft.p95_s.to_string(),
            summary.ttft.p99_s.to_string(),
            summary.latency.mean_s.to_string(),
            summary.latency.p50_s.to_string(),
            summary.latency.p95_s.to_string(),
            summary.latency.p99_s.to_string(),
            summary.throughput_rps.to_string(),
            summary.duration_s.to_string(),
            format_optional(summary.gpu.map(|gpu| gpu.sm_util_pct)),
            format_optional(summary.gpu.map(|gpu| gpu.mem_util_pct)),
            format_optional(cell.tradeoff_score),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}
