//! An instrumented, typed access layer between application code and a document-store driver.
//!
//! This crate is the core of the docgate project and provides:
//!
//! - **Client** ([`client`]) - The long-lived handle owning the driver, timeout and metric identity
//! - **Collections interface** ([`collection`]) - Instrumented untyped and typed collection handles
//! - **Driver abstraction** ([`driver`]) - Traits for plugging in a document-store driver
//! - **Cursor materialization** ([`cursor`]) - Decoding cursors into caller-owned vectors
//! - **Updates and the mutation guard** ([`update`], [`guard`]) - Partial updates that cannot clobber unset fields
//! - **Sessions** ([`session`]) - Guarded collection access inside sessions and transactions
//! - **Observability** ([`metrics`], [`labels`]) - Latency and error metrics with bounded label values
//! - **Configuration** ([`config`]) - Connection settings with the defaults applied
//! - **Error handling** ([`error`]) - Error types and result types
//!
//! # Example
//!
//! ```ignore
//! use docgate::prelude::*;
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
//!     pub title: Option<String>,
//! }
//!
//! let posts = client.typed_collection::<Post>("blog", "posts");
//! let popular = posts.find(doc! {}, &["-likes"], 0, 10, None).await?;
//! posts.update_id(id, UpdateDocument::new().set_record(PostPatch { title: Some("new".into()) }), false).await?;
//! ```

#[allow(unused_extern_crates)]
extern crate self as docgate_core;

pub mod client;
pub mod collection;
pub mod config;
pub mod cursor;
pub mod driver;
pub mod error;
pub mod guard;
pub mod labels;
pub mod metrics;
pub mod query;
pub mod session;
pub mod update;
