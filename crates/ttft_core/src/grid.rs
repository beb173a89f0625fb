use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::contract::{normalize_profile, ConfigError, RunSpec, RunTag, SweepProfile};

/// One point of the sweep grid, with its position in sweep order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridCell {
    pub index: usize,
    pub max_inflight: u32,
    pub concurrency: u32,
}

impl GridCell {
    pub fn tag(&self) -> RunTag {
        RunTag::new(self.max_inflight, self.concurrency)
    }

    pub fn run_spec(&self, profile: &SweepProfile) -> Result<RunSpec, ConfigError> {
        Ok(RunSpec::new(
            self.max_inflight,
            self.concurrency,
            profile.request_budget,
            profile.prompt.clone(),
            profile.max_output_tokens,
        )?
        .with_timeout(profile.run_timeout()))
    }
}

/// Enumerate the full cross product, max-inflight outer and concurrency inner.
pub fn enumerate_grid(profile: &SweepProfile) -> Result<Vec<GridCell>, ConfigError> {
    let profile = normalize_profile(profile.clone())?;

    let cells: Vec<GridCell> = profile
        .max_inflight
        .iter()
        .flat_map(|&max_inflight| {
            profile
                .concurrency
                .iter()
                .map(move |&concurrency| (max_inflight, concurrency))
        })
        .enumerate()
        .map(|(index, (max_inflight, concurrency))| GridCell {
            index,
            max_inflight,
            concurrency,
        })
        .collect();

    validate_cells(profile.total_cells(), &cells)?;
    Ok(cells)
}

pub fn expected_tags(profile: &SweepProfile) -> Result<Vec<RunTag>, ConfigError> {
    Ok(enumerate_grid(profile)?
        .iter()
        .map(GridCell::tag)
        .collect())
}

fn validate_cells(total_cells: usize, cells: &[GridCell]) -> Result<(), ConfigError> {
    if cells.len() != total_cells {
        return Err(ConfigError::InconsistentGrid(format!(
            "expected {total_cells} cells, enumerated {}",
            cells.len()
        )));
    }

    let mut tags = HashSet::with_capacity(cells.len());
    for (position, cell) in cells.iter().enumerate() {
        if cell.index != position {
            return Err(ConfigError::InconsistentGrid(format!(
                "cell {} is out of order at position {position}",
                cell.tag()
            )));
        }
        if !tags.insert(cell.tag()) {
            return Err(ConfigError::InconsistentGrid(format!(
                "run tag {} appears more than once",
                cell.tag()
            )));
        }
    }

    Ok(())
}
