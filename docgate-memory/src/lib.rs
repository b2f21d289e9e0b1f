//! In-memory driver for docgate.
//!
//! This crate provides a thread-safe, in-memory implementation of the `Driver` trait.
//! It keeps documents as BSON behind async-aware read-write locks and evaluates the
//! common subset of the query and update language in process, which makes it the
//! backend of choice for tests and local development.
//!
//! # Features
//!
//! - **Thread-safe access** - Concurrent reads and writes using an async-aware RwLock
//! - **Query evaluation** - Comparison, set and logical operators on dotted paths
//! - **Updates** - `$set`, `$unset`, `$inc`, `$push` and `$setOnInsert`, with upserts
//! - **Sessions and transactions** - Snapshot transactions with write-conflict detection
//! - **Simulated latency** - A fixed delay per operation for exercising timeouts
//!
//! # Quick Start
//!
//! ```ignore
//! use docgate::{prelude::*, memory::MemoryDriver};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Serialize, Deserialize)]
//! pub struct User {
//!     pub name: String,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = ClientBuilder::new(Config::new("memory:27017"))
//!         .connect(MemoryDriver::builder())
//!         .await?;
//!     let users = client.typed_collection::<User>("app", "users");
//!
//!     users.insert_one(&User { name: "Alice".to_string() }).await?;
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as docgate_memory;

pub mod cursor;
pub mod session;
pub mod store;

mod evaluator;
mod state;

pub use cursor::MemoryCursor;
pub use session::MemorySession;
pub use store::{MAX_TRANSACTION_ATTEMPTS, MemoryDriver, MemoryDriverBuilder};
