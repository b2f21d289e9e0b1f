//! Cursor materialization.
//!
//! [`scan_cursor`] drains a [`DocumentCursor`] into a caller-owned `Vec<T>`, reusing
//! the vector's existing elements and capacity before allocating:
//!
//! ```ignore
//! let mut users: Vec<User> = Vec::with_capacity(64);
//! let cursor = driver.find(ns, doc! {}, FindOptions::default()).await?;
//! scan_cursor(cursor, &mut users).await?;
//! ```

use std::time::Duration;

use async_trait::async_trait;
use bson::{Document, de::deserialize_from_document};
use serde::de::DeserializeOwned;
use tokio::time::{Instant, timeout_at};
use tracing::debug;

use crate::{
    driver::DocumentCursor,
    error::{DocGateError, DocGateResult},
};

/// Decodes every remaining document of `cursor` into `dest`.
///
/// Slots that already exist in `dest` are overwritten in place; further documents are
/// pushed. On return `dest` holds exactly the decoded documents, in cursor order. On a
/// decode error `dest` is truncated to the documents decoded before the failure.
///
/// The cursor is always closed. A close failure is reported only when nothing else
/// failed first.
///
/// # Errors
///
/// Returns the first of: a cursor fault, a decode error, or a close error.
pub async fn scan_cursor<C, T>(mut cursor: C, dest: &mut Vec<T>) -> DocGateResult<()>
where
    C: DocumentCursor,
    T: DeserializeOwned,
{
    let drained = drain(&mut cursor, dest).await;
    let closed = cursor.close().await;

    match (drained, closed) {
        (Err(err), Err(close_err)) => {
            debug!(error = %close_err, "cursor close failed after an earlier error");
            Err(err)
        }
        (Err(err), _) => Err(err),
        (Ok(()), closed) => closed,
    }
}

/// A cursor whose `advance` fails with [`DocGateError::Timeout`] once `deadline` passes.
///
/// Used so that an operation running out of time still closes its cursor: the deadline
/// surfaces as a cursor fault instead of dropping the cursor mid-iteration.
pub struct DeadlineCursor<C> {
    inner: C,
    deadline: Instant,
    command: &'static str,
    timeout: Duration,
}

impl<C: DocumentCursor> DeadlineCursor<C> {
    pub fn new(inner: C, deadline: Instant, command: &'static str, timeout: Duration) -> Self {
        Self { inner, deadline, command, timeout }
    }

    pub fn into_inner(self) -> C {
        self.inner
    }
}

#[async_trait]
impl<C: DocumentCursor> DocumentCursor for DeadlineCursor<C> {
    async fn advance(&mut self) -> DocGateResult<bool> {
        match timeout_at(self.deadline, self.inner.advance()).await {
            Ok(advanced) => advanced,
            Err(_) => Err(DocGateError::Timeout {
                command: self.command,
                timeout: self.timeout,
            }),
        }
    }

    fn current(&self) -> DocGateResult<Document> {
        self.inner.current()
    }

    async fn close(&mut self) -> DocGateResult<()> {
        self.inner.close().await
    }
}

async fn drain<C, T>(cursor: &mut C, dest: &mut Vec<T>) -> DocGateResult<()>
where
    C: DocumentCursor,
    T: DeserializeOwned,
{
    let mut i = 0;

    let result = async {
        while cursor.advance().await? {
            let value = deserialize_from_document::<T>(cursor.current()?)?;

            match dest.get_mut(i) {
                Some(slot) => *slot = value,
                None => dest.push(value),
            }
            i += 1;
        }

        Ok(())
    }
    .await;

    dest.truncate(i);

    result
}

#[cfg(test)]
mod tests {
    use std::{
        collections::VecDeque,
        sync::{
            Arc,
            atomic::{AtomicBool, Ordering},
        },
    };

    use bson::doc;
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Row {
        n: i32,
    }

    #[derive(Default)]
    struct FakeCursor {
        pending: VecDeque<Document>,
        current: Option<Document>,
        fail_advance_after: Option<usize>,
        fail_close: bool,
        closed: Arc<AtomicBool>,
        advanced: usize,
    }

    impl FakeCursor {
        fn rows(ns: impl IntoIterator<Item = i32>) -> Self {
            Self {
                pending: ns.into_iter().map(|n| doc! { "n": n }).collect(),
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl DocumentCursor for FakeCursor {
        async fn advance(&mut self) -> DocGateResult<bool> {
            if self.fail_advance_after == Some(self.advanced) {
                return Err(DocGateError::driver("connection reset"));
            }
            self.advanced += 1;
            self.current = self.pending.pop_front();
            Ok(self.current.is_some())
        }

        fn current(&self) -> DocGateResult<Document> {
            self.current
                .clone()
                .ok_or_else(|| DocGateError::driver("cursor exhausted"))
        }

        async fn close(&mut self) -> DocGateResult<()> {
            self.closed.store(true, Ordering::SeqCst);
            if self.fail_close {
                return Err(DocGateError::driver("close failed"));
            }
            Ok(())
        }
    }

    fn ns(rows: &[Row]) -> Vec<i32> {
        rows.iter().map(|row| row.n).collect()
    }

    #[tokio::test]
    async fn fills_empty_destination() {
        let mut dest = Vec::new();
        scan_cursor(FakeCursor::rows(1..=3), &mut dest).await.unwrap();

        assert_eq!(ns(&dest), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn overwrites_existing_elements_and_truncates() {
        let mut dest: Vec<Row> = (10..15).map(|n| Row { n }).collect();
        let storage = dest.as_ptr();

        scan_cursor(FakeCursor::rows([1, 2]), &mut dest).await.unwrap();

        assert_eq!(ns(&dest), vec![1, 2]);
        assert_eq!(dest.as_ptr(), storage);
    }

    #[tokio::test]
    async fn reuses_spare_capacity() {
        let mut dest: Vec<Row> = Vec::with_capacity(8);
        dest.push(Row { n: 99 });
        let storage = dest.as_ptr();

        scan_cursor(FakeCursor::rows(1..=8), &mut dest).await.unwrap();

        assert_eq!(ns(&dest), (1..=8).collect::<Vec<_>>());
        assert_eq!(dest.as_ptr(), storage);
    }

    #[tokio::test]
    async fn exact_capacity_is_filled() {
        let mut dest: Vec<Row> = Vec::with_capacity(3);

        scan_cursor(FakeCursor::rows([7, 8, 9]), &mut dest).await.unwrap();

        assert_eq!(ns(&dest), vec![7, 8, 9]);
    }

    #[tokio::test]
    async fn decode_error_truncates_to_decoded_prefix() {
        let mut cursor = FakeCursor::rows([1, 2]);
        cursor.pending.push_back(doc! { "n": "not a number" });
        cursor.pending.push_back(doc! { "n": 4 });
        let closed = cursor.closed.clone();
        let mut dest: Vec<Row> = (0..6).map(|n| Row { n }).collect();

        let err = scan_cursor(cursor, &mut dest).await.unwrap_err();

        assert!(matches!(err, DocGateError::Serialization(_)));
        assert_eq!(ns(&dest), vec![1, 2]);
        assert!(closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn cursor_fault_wins_over_close_error() {
        let mut cursor = FakeCursor::rows(1..=5);
        cursor.fail_advance_after = Some(2);
        cursor.fail_close = true;
        let mut dest: Vec<Row> = Vec::new();

        let err = scan_cursor(cursor, &mut dest).await.unwrap_err();

        assert!(err.to_string().contains("connection reset"));
        assert_eq!(ns(&dest), vec![1, 2]);
    }

    #[tokio::test]
    async fn close_error_reported_when_nothing_else_failed() {
        let mut cursor = FakeCursor::rows([1]);
        cursor.fail_close = true;
        let mut dest: Vec<Row> = Vec::new();

        let err = scan_cursor(cursor, &mut dest).await.unwrap_err();

        assert!(err.to_string().contains("close failed"));
        assert_eq!(ns(&dest), vec![1]);
    }

    struct StalledCursor {
        closed: Arc<AtomicBool>,
    }

    #[async_trait]
    impl DocumentCursor for StalledCursor {
        async fn advance(&mut self) -> DocGateResult<bool> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(false)
        }

        fn current(&self) -> DocGateResult<Document> {
            Err(DocGateError::driver("no document"))
        }

        async fn close(&mut self) -> DocGateResult<()> {
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_surfaces_as_timeout_and_closes() {
        let closed = Arc::new(AtomicBool::new(false));
        let timeout = Duration::from_secs(1);
        let cursor = DeadlineCursor::new(
            StalledCursor { closed: closed.clone() },
            Instant::now() + timeout,
            "find",
            timeout,
        );
        let mut dest: Vec<Row> = Vec::new();

        let err = scan_cursor(cursor, &mut dest).await.unwrap_err();

        assert!(matches!(err, DocGateError::Timeout { command: "find", .. }));
        assert!(closed.load(Ordering::SeqCst));
    }
}
