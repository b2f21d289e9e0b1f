use async_trait::async_trait;
use bson::Document;
use mongodb::Cursor;

use docgate_core::{
    driver::DocumentCursor,
    error::{DocGateError, DocGateResult},
};

/// A server-side cursor.
///
/// Closing drops the underlying `mongodb::Cursor`, which kills it on the server in the
/// background.
#[derive(Debug)]
pub struct MongoCursor {
    inner: Option<Cursor<Document>>,
}

impl MongoCursor {
    pub(crate) fn new(inner: Cursor<Document>) -> Self {
        Self { inner: Some(inner) }
    }

    fn open(&self) -> DocGateResult<&Cursor<Document>> {
        self.inner
            .as_ref()
            .ok_or_else(|| DocGateError::driver("cursor is closed"))
    }
}

#[async_trait]
impl DocumentCursor for MongoCursor {
    async fn advance(&mut self) -> DocGateResult<bool> {
        let cursor = self
            .inner
            .as_mut()
            .ok_or_else(|| DocGateError::driver("cursor is closed"))?;

        cursor.advance().await.map_err(DocGateError::driver)
    }

    fn current(&self) -> DocGateResult<Document> {
        self.open()?
            .deserialize_current()
            .map_err(DocGateError::driver)
    }

    async fn close(&mut self) -> DocGateResult<()> {
        self.inner.take();
        Ok(())
    }
}
