use std::{collections::VecDeque, time::Duration};

use async_trait::async_trait;
use bson::Document;

use docgate_core::{
    driver::DocumentCursor,
    error::{DocGateError, DocGateResult},
};

/// A cursor over a result set materialized when the query ran.
///
/// When the driver was built with a latency, every [`advance`](DocumentCursor::advance)
/// waits that long first, which stands in for fetching a batch from a slow server.
#[derive(Debug, Default)]
pub struct MemoryCursor {
    pending: VecDeque<Document>,
    current: Option<Document>,
    latency: Option<Duration>,
    closed: bool,
}

impl MemoryCursor {
    pub(crate) fn new(documents: Vec<Document>, latency: Option<Duration>) -> Self {
        Self {
            pending: documents.into(),
            current: None,
            latency,
            closed: false,
        }
    }

    /// Documents not yet returned by [`advance`](DocumentCursor::advance).
    pub fn remaining(&self) -> usize {
        self.pending.len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

#[async_trait]
impl DocumentCursor for MemoryCursor {
    async fn advance(&mut self) -> DocGateResult<bool> {
        if self.closed {
            return Err(DocGateError::driver("cursor is closed"));
        }
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        self.current = self.pending.pop_front();

        Ok(self.current.is_some())
    }

    fn current(&self) -> DocGateResult<Document> {
        self.current
            .clone()
            .ok_or_else(|| DocGateError::driver("cursor is not positioned on a document"))
    }

    async fn close(&mut self) -> DocGateResult<()> {
        self.closed = true;
        self.pending.clear();
        self.current = None;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use bson::doc;

    use super::*;

    #[tokio::test]
    async fn test_cursor_walks_then_closes() {
        let mut cursor = MemoryCursor::new(vec![doc! { "n": 1 }, doc! { "n": 2 }], None);

        assert!(cursor.current().is_err());
        assert!(cursor.advance().await.unwrap());
        assert_eq!(cursor.current().unwrap(), doc! { "n": 1 });
        assert_eq!(cursor.remaining(), 1);

        cursor.close().await.unwrap();
        assert!(cursor.is_closed());
        assert!(cursor.advance().await.is_err());
    }
}
