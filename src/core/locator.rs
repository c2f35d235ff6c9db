use chrono::NaiveDateTime;
use std::collections::HashMap;
use tracing::debug;

use crate::core::error::RecordError;
use crate::core::store::{CellView, DatePattern, TabularStore};

/// Finds the pre-provisioned date row for a timestamp by rendering the
/// timestamp through each row's own display pattern and comparing text.
pub struct RowLocator {
    scan_row_limit: usize,
}

impl RowLocator {
    pub fn new(scan_row_limit: usize) -> Self {
        Self { scan_row_limit }
    }

    pub async fn locate(
        &self,
        store: &mut dyn TabularStore,
        sheet_index: usize,
        target: &NaiveDateTime,
    ) -> Result<usize, RecordError> {
        let cells = store
            .read_date_column(sheet_index, self.scan_row_limit)
            .await?;
        debug!(
            "Scanning {} date cell(s) on sheet {}",
            cells.len(),
            sheet_index
        );

        find_row(&cells, target, self.scan_row_limit).ok_or_else(|| RecordError::RowNotFound {
            sheet_index,
            date: target.format("%Y-%m-%d %H:%M").to_string(),
            scanned: cells.len().min(self.scan_row_limit),
        })
    }
}

/// Index of the first cell, within `limit`, whose displayed text equals
/// `target` rendered through that cell's pattern. Cells without a pattern,
/// or whose pattern shows no date or time field, are never date rows.
pub fn find_row(cells: &[CellView], target: &NaiveDateTime, limit: usize) -> Option<usize> {
    let mut rendered: HashMap<&str, Option<String>> = HashMap::new();
    for (row, cell) in cells.iter().take(limit).enumerate() {
        let Some(pattern) = cell.date_pattern() else {
            continue;
        };
        let text = rendered.entry(pattern).or_insert_with(|| {
            let parsed = DatePattern::parse(pattern);
            parsed.has_date_fields().then(|| parsed.render(target))
        });
        if text.as_deref() == Some(cell.text.as_str()) {
            return Some(row);
        }
    }
    None
}
