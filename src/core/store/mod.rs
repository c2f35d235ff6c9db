pub mod date_format;
#[cfg(test)]
pub mod memory;
pub mod oauth;
pub mod sheets;

use async_trait::async_trait;

use crate::core::config::StoreInfo;
use crate::core::error::StoreError;

pub use date_format::DatePattern;
#[cfg(test)]
pub use memory::{MemoryConnector, MemorySheet};
pub use sheets::SheetsConnector;

/// What a reader sees in one cell: its displayed text and, when the cell
/// carries one, its explicit display-format pattern.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CellView {
    pub text: String,
    pub pattern: Option<String>,
}

#[cfg(test)]
impl CellView {
    pub fn formatted(text: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            pattern: Some(pattern.into()),
        }
    }

    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            pattern: None,
        }
    }
}

impl CellView {
    /// The display pattern, if one is set and non-empty.
    pub fn date_pattern(&self) -> Option<&str> {
        self.pattern.as_deref().filter(|p| !p.trim().is_empty())
    }
}

/// A staged cell write, addressed by zero-based row and column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellWrite {
    pub sheet_index: usize,
    pub row: usize,
    pub column: usize,
    pub value: i64,
}

/// One open session against a tabular store. Writes are staged with
/// [`TabularStore::set_cell`] and only reach the store on
/// [`TabularStore::flush`].
#[async_trait]
pub trait TabularStore: Send {
    /// Reads column 0 for rows `0..rows` of the sheet at `sheet_index`.
    /// Fewer cells are returned when the sheet is shorter.
    async fn read_date_column(
        &mut self,
        sheet_index: usize,
        rows: usize,
    ) -> Result<Vec<CellView>, StoreError>;

    fn set_cell(
        &mut self,
        sheet_index: usize,
        row: usize,
        column: usize,
        value: i64,
    ) -> Result<(), StoreError>;

    /// Commits every staged write in a single call.
    async fn flush(&mut self) -> Result<(), StoreError>;

    /// Drops staged writes without sending them.
    fn discard(&mut self);
}

#[async_trait]
pub trait StoreConnector: Send + Sync {
    async fn open(&self, info: &StoreInfo) -> Result<Box<dyn TabularStore>, StoreError>;
}
