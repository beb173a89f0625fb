use std::io::Write;

use crate::aggregate::SweepReport;

pub(crate) fn export_report_json_impl(
    report: &SweepReport,
    file: std::fs::File,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut writer = std::io::BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, report)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}
