//! Parsing of `nvidia-smi dmon` captures.
//!
//! dmon prints its column names on a `#`-prefixed line, e.g.
//! `# Time gpu pwr gtemp mtemp sm mem ...`. Captures written by other tools may
//! carry a plain header instead, so the first non-comment line is accepted as
//! a header when no commented one names both columns.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GpuUtilization {
    pub sm_util_pct: f64,
    pub mem_util_pct: f64,
    pub samples: usize,
}

/// Mean SM and memory utilization in a capture; `None` when the file is
/// missing, unreadable or has no usable samples.
pub fn read_gpu_utilization(path: &Path) -> Option<GpuUtilization> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => return None,
        Err(error) => {
            tracing::warn!(path = %path.display(), error = %error, "cannot read GPU log");
            return None;
        }
    };

    let parsed = parse_gpu_log(&contents);
    if parsed.is_none() {
        tracing::debug!(path = %path.display(), "GPU log has no sm/mem samples");
    }
    parsed
}

pub fn parse_gpu_log(contents: &str) -> Option<GpuUtilization> {
    let lines: Vec<&str> = contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();

    let commented_header = lines
        .iter()
        .filter_map(|line| line.strip_prefix('#'))
        .find_map(column_indices);

    let (sm_idx, mem_idx, data_start) = match commented_header {
        Some((sm, mem)) => (sm, mem, 0),
        None => {
            let position = lines.iter().position(|line| !line.starts_with('#'))?;
            let (sm, mem) = column_indices(lines[position])?;
            (sm, mem, position + 1)
        }
    };

    let mut sm_total = 0.0;
    let mut mem_total = 0.0;
    let mut samples = 0usize;
    for line in lines.iter().skip(data_start).filter(|line| !line.starts_with('#')) {
        let parts: Vec<&str> = line.split_whitespace().collect();
        let (Some(sm), Some(mem)) = (parts.get(sm_idx), parts.get(mem_idx)) else {
            continue;
        };
        // dmon prints "-" for counters it cannot read.
        if let (Ok(sm), Ok(mem)) = (sm.parse::<f64>(), mem.parse::<f64>()) {
            sm_total += sm;
            mem_total += mem;
            samples += 1;
        }
    }

    (samples > 0).then(|| GpuUtilization {
        sm_util_pct: sm_total / samples as f64,
        mem_util_pct: mem_total / samples as f64,
        samples,
    })
}

fn column_indices(header: &str) -> Option<(usize, usize)> {
    let columns: Vec<&str> = header.split_whitespace().collect();
    let sm = columns.iter().position(|column| *column == "sm")?;
    let mem = columns.iter().position(|column| *column == "mem")?;
    Some((sm, mem))
}
