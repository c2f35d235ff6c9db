use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use super::{CellView, CellWrite, StoreConnector, TabularStore};
use crate::core::config::StoreInfo;
use crate::core::error::StoreError;

#[derive(Debug, Default, Clone)]
pub struct MemorySheet {
    pub date_cells: Vec<CellView>,
    /// Committed values keyed by (row, column).
    pub values: BTreeMap<(usize, usize), i64>,
}

impl MemorySheet {
    pub fn with_dates(date_cells: Vec<CellView>) -> Self {
        Self {
            date_cells,
            values: BTreeMap::new(),
        }
    }

    pub fn row(&self, row: usize) -> Vec<(usize, i64)> {
        self.values
            .iter()
            .filter(|((r, _), _)| *r == row)
            .map(|((_, c), v)| (*c, *v))
            .collect()
    }
}

/// Shared backing state, inspectable after the session is gone.
#[derive(Debug, Default)]
pub struct MemoryBook {
    pub sheets: Vec<MemorySheet>,
    pub flushes: Vec<Vec<CellWrite>>,
    pub reads: usize,
    pub opens: usize,
    pub fail_open: bool,
    pub fail_flush: bool,
}

#[derive(Clone, Default)]
pub struct MemoryConnector {
    book: Arc<Mutex<MemoryBook>>,
}

impl MemoryConnector {
    pub fn new(sheets: Vec<MemorySheet>) -> Self {
        Self {
            book: Arc::new(Mutex::new(MemoryBook {
                sheets,
                ..MemoryBook::default()
            })),
        }
    }

    pub fn book(&self) -> MutexGuard<'_, MemoryBook> {
        lock(&self.book)
    }
}

fn lock(book: &Mutex<MemoryBook>) -> MutexGuard<'_, MemoryBook> {
    book.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl StoreConnector for MemoryConnector {
    async fn open(&self, info: &StoreInfo) -> Result<Box<dyn TabularStore>, StoreError> {
        let mut book = lock(&self.book);
        book.opens += 1;
        if book.fail_open {
            return Err(StoreError::Connection(format!(
                "memory store {} refused the connection",
                info.file_id
            )));
        }
        Ok(Box::new(MemoryStore {
            book: self.book.clone(),
            staged: Vec::new(),
        }))
    }
}

pub struct MemoryStore {
    book: Arc<Mutex<MemoryBook>>,
    staged: Vec<CellWrite>,
}

#[async_trait]
impl TabularStore for MemoryStore {
    async fn read_date_column(
        &mut self,
        sheet_index: usize,
        rows: usize,
    ) -> Result<Vec<CellView>, StoreError> {
        let mut book = lock(&self.book);
        book.reads += 1;
        let sheet = book
            .sheets
            .get(sheet_index)
            .ok_or(StoreError::SheetNotFound(sheet_index))?;
        Ok(sheet.date_cells.iter().take(rows).cloned().collect())
    }

    fn set_cell(
        &mut self,
        sheet_index: usize,
        row: usize,
        column: usize,
        value: i64,
    ) -> Result<(), StoreError> {
        if lock(&self.book).sheets.get(sheet_index).is_none() {
            return Err(StoreError::SheetNotFound(sheet_index));
        }
        self.staged.push(CellWrite {
            sheet_index,
            row,
            column,
            value,
        });
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), StoreError> {
        let mut book = lock(&self.book);
        if book.fail_flush {
            self.staged.clear();
            return Err(StoreError::Request("memory store rejected the flush".to_string()));
        }
        let writes = std::mem::take(&mut self.staged);
        for w in &writes {
            if let Some(sheet) = book.sheets.get_mut(w.sheet_index) {
                sheet.values.insert((w.row, w.column), w.value);
            }
        }
        book.flushes.push(writes);
        Ok(())
    }

    fn discard(&mut self) {
        self.staged.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writes_only_land_on_flush() {
        let connector = MemoryConnector::new(vec![MemorySheet::default()]);
        let mut store = connector.open(&StoreInfo::new("mem")).await.unwrap();

        store.set_cell(0, 2, 1, 7).unwrap();
        assert!(connector.book().sheets[0].values.is_empty());

        store.flush().await.unwrap();
        assert_eq!(connector.book().sheets[0].row(2), vec![(1, 7)]);
        assert_eq!(connector.book().flushes.len(), 1);
    }

    #[tokio::test]
    async fn absent_sheet_is_reported() {
        let connector = MemoryConnector::new(vec![]);
        let mut store = connector.open(&StoreInfo::new("mem")).await.unwrap();
        assert!(matches!(
            store.read_date_column(1, 10).await,
            Err(StoreError::SheetNotFound(1))
        ));
        assert!(matches!(
            store.set_cell(1, 0, 1, 3),
            Err(StoreError::SheetNotFound(1))
        ));
    }
}
