use tracing::{error, info};

use crate::core::error::RecordError;
use crate::core::store::TabularStore;
use crate::core::survey::RankOutcome;

/// Writes one survey batch into columns `1..=batch.len()` of a row and
/// commits it with a single flush.
pub struct ResultRecorder {
    capacity: usize,
}

impl ResultRecorder {
    pub fn new(capacity: usize) -> Self {
        Self { capacity }
    }

    pub async fn record(
        &self,
        store: &mut dyn TabularStore,
        batch: &[RankOutcome],
        row: usize,
        sheet_index: usize,
    ) -> Result<(), RecordError> {
        if batch.len() > self.capacity {
            error!(
                "Refusing to record {} results on sheet {}: capacity is {} columns",
                batch.len(),
                sheet_index,
                self.capacity
            );
            return Err(RecordError::Capacity {
                len: batch.len(),
                capacity: self.capacity,
            });
        }

        for (i, outcome) in batch.iter().enumerate() {
            if let Err(e) = store.set_cell(sheet_index, row, i + 1, outcome.rank) {
                store.discard();
                return Err(e.into());
            }
        }
        store.flush().await?;

        info!(
            "Recorded {} rank(s) into sheet {} row {}",
            batch.len(),
            sheet_index,
            row + 1
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::StoreInfo;
    use crate::core::error::StoreError;
    use crate::core::store::{CellWrite, MemoryConnector, MemorySheet, StoreConnector};

    fn batch(ranks: &[i64]) -> Vec<RankOutcome> {
        ranks
            .iter()
            .enumerate()
            .map(|(i, r)| RankOutcome {
                keyword: format!("k{}", i),
                rank: *r,
            })
            .collect()
    }

    async fn open(connector: &MemoryConnector) -> Box<dyn TabularStore> {
        connector.open(&StoreInfo::new("mem")).await.unwrap()
    }

    #[tokio::test]
    async fn writes_ranks_into_columns_one_to_k_in_one_flush() {
        let connector = MemoryConnector::new(vec![MemorySheet::default(), MemorySheet::default()]);
        let mut store = open(&connector).await;

        ResultRecorder::new(25)
            .record(store.as_mut(), &batch(&[2, 21, -1]), 4, 1)
            .await
            .unwrap();

        let book = connector.book();
        assert_eq!(book.flushes.len(), 1);
        assert_eq!(
            book.flushes[0],
            vec![
                CellWrite { sheet_index: 1, row: 4, column: 1, value: 2 },
                CellWrite { sheet_index: 1, row: 4, column: 2, value: 21 },
                CellWrite { sheet_index: 1, row: 4, column: 3, value: -1 },
            ]
        );
        assert_eq!(book.sheets[1].values.len(), 3);
        assert!(book.sheets[0].values.is_empty());
    }

    #[tokio::test]
    async fn batch_at_capacity_is_accepted() {
        let connector = MemoryConnector::new(vec![MemorySheet::default()]);
        let mut store = open(&connector).await;
        ResultRecorder::new(3)
            .record(store.as_mut(), &batch(&[1, 2, 3]), 0, 0)
            .await
            .unwrap();
        assert_eq!(connector.book().sheets[0].row(0), vec![(1, 1), (2, 2), (3, 3)]);
    }

    #[tokio::test]
    async fn oversized_batch_is_rejected_without_writes() {
        let connector = MemoryConnector::new(vec![MemorySheet::default()]);
        let mut store = open(&connector).await;

        let err = ResultRecorder::new(2)
            .record(store.as_mut(), &batch(&[1, 2, 3]), 0, 0)
            .await
            .unwrap_err();

        assert!(matches!(err, RecordError::Capacity { len: 3, capacity: 2 }));
        let book = connector.book();
        assert!(book.flushes.is_empty());
        assert!(book.sheets[0].values.is_empty());
    }

    #[tokio::test]
    async fn absent_sheet_discards_staged_writes() {
        let connector = MemoryConnector::new(vec![MemorySheet::default()]);
        let mut store = open(&connector).await;

        let err = ResultRecorder::new(5)
            .record(store.as_mut(), &batch(&[1, 2]), 0, 7)
            .await
            .unwrap_err();
        assert!(matches!(err, RecordError::Store(StoreError::SheetNotFound(7))));

        // A later successful record must not carry anything over.
        ResultRecorder::new(5)
            .record(store.as_mut(), &batch(&[9]), 3, 0)
            .await
            .unwrap();
        let book = connector.book();
        assert_eq!(book.flushes.len(), 1);
        assert_eq!(book.flushes[0].len(), 1);
    }

    #[tokio::test]
    async fn flush_failure_is_reported() {
        let connector = MemoryConnector::new(vec![MemorySheet::default()]);
        connector.book().fail_flush = true;
        let mut store = open(&connector).await;

        let err = ResultRecorder::new(5)
            .record(store.as_mut(), &batch(&[1]), 0, 0)
            .await
            .unwrap_err();
        assert!(matches!(err, RecordError::Store(StoreError::Request(_))));
        assert!(connector.book().sheets[0].values.is_empty());
    }
}
