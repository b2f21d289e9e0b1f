//! Main docgate crate: an instrumented, typed access layer over document-store drivers.
//!
//! This crate is the primary entry point. It re-exports the core types from the
//! sub-crates and gives access to the available drivers.
//!
//! # Features
//!
//! - **Cursor materialization** - Decode result sets into caller-owned, reused vectors
//! - **Mutation guard** - Reject partial updates that would clobber fields the caller never set
//! - **Instrumented operations** - One tracing span, latency observation and error count per call
//! - **Typed facade** - Collection handles bound to a Rust record type
//! - **Transactions** - Run a unit of work inside a session, committed or aborted as a whole
//!
//! # Quick Start
//!
//! ```ignore
//! use docgate::{prelude::*, memory::MemoryDriver};
//! use bson::doc;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Default, Serialize, Deserialize)]
//! pub struct Post {
//!     pub title: String,
//!     pub likes: i64,
//! }
//!
//! #[derive(Debug, Serialize, UpdateFields)]
//! pub struct PostPatch {
//!     #[serde(skip_serializing_if = "Option::is_none")]
//!     pub likes: Option<i64>,
//! }
//!
//! #[tokio::main]
//! async fn main() -> DocGateResult<()> {
//!     let client = ClientBuilder::new(Config::new("memory:27017"))
//!         .connect(MemoryDriver::builder())
//!         .await?;
//!
//!     let posts = client.typed_collection::<Post>("blog", "posts");
//!     posts.insert_one(&Post { title: "hello".into(), likes: 1 }).await?;
//!
//!     // Only `likes` is written; `title` is left alone.
//!     posts
//!         .update_one(
//!             doc! { "title": "hello" },
//!             UpdateDocument::new().set_record(PostPatch { likes: Some(2) }),
//!             false,
//!         )
//!         .await?;
//!
//!     let top = posts.find(doc! {}, &["-likes"], 0, 10, None).await?;
//!     println!("{top:?}");
//!
//!     Ok(())
//! }
//! ```
//!
//! # Unsafe updates
//!
//! A record passed to `$set` must declare every field as an `Option` that is skipped
//! when `None`; otherwise a zero value would overwrite stored data. Violations are
//! reported as [`DocGateError::UnsafeUpdate`](error::DocGateError::UnsafeUpdate)
//! before anything is sent:
//!
//! ```ignore
//! #[derive(Debug, Serialize, UpdateFields)]
//! pub struct BadPatch {
//!     pub likes: i64,
//! }
//!
//! let err = posts
//!     .update_one(doc! {}, UpdateDocument::new().set_record(BadPatch { likes: 0 }), false)
//!     .await
//!     .unwrap_err();
//! assert!(err.is_validation());
//! ```
//!
//! # Transactions
//!
//! ```ignore
//! use futures::FutureExt;
//!
//! client
//!     .do_transaction(|session| {
//!         async move {
//!             let mut posts = SessionCollection::new(session, "blog", "posts");
//!             posts.insert_one(&post).await?;
//!             posts.delete_one(doc! { "title": "draft" }).await?;
//!             Ok(())
//!         }
//!         .boxed()
//!     })
//!     .await?;
//! ```
//!
//! # Drivers
//!
//! - [`memory`] - In-memory driver for development and testing
//! - [`mongodb`] - MongoDB driver (requires the `mongodb` feature)

#[allow(unused_extern_crates)]
extern crate self as docgate;

pub mod prelude;

pub use docgate_core::{
    client, collection, config, cursor, driver, error, guard, labels, metrics, query, session, update,
};

/// Derives the field metadata the mutation guard inspects.
pub use docgate_macros::UpdateFields;

// Re-export BSON types for convenience
pub use bson;

/// In-memory driver implementations.
pub mod memory {
    pub use docgate_memory::{MAX_TRANSACTION_ATTEMPTS, MemoryCursor, MemoryDriver, MemoryDriverBuilder, MemorySession};
}

/// MongoDB driver implementations.
///
/// This module is only available when the `mongodb` feature is enabled.
#[cfg(feature = "mongodb")]
pub mod mongodb {
    pub use docgate_mongodb::{MongoCursor, MongoDriver, MongoDriverBuilder, MongoSession, options::apply_connect_options};
}
