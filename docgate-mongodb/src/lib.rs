//! MongoDB driver for docgate.
//!
//! This crate implements the `Driver` trait over the official `mongodb` crate, so the
//! instrumented access layer can talk to a replica set or sharded cluster.
//!
//! To use this driver, include the `mongodb` feature in your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! docgate = { version = "x.y.z", features = ["mongodb"] }
//! ```
//!
//! # Features
//!
//! - **Connection settings** - Pool size, timeouts, idle time, credentials and read preference from `Config`
//! - **Full operation set** - Finds, find-and-modify, counts, distinct, aggregation and bulk writes
//! - **Sessions and transactions** - Units of work run inside a `ClientSession`, committed or aborted as a whole
//!
//! # Example
//!
//! ```ignore
//! use docgate::{client::ClientBuilder, config::Config, mongodb::MongoDriver};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = Config::new("10.0.0.5:27017");
//!     config.username = "orders".to_string();
//!     config.password = "secret".to_string();
//!
//!     let client = ClientBuilder::new(config)
//!         .connect(MongoDriver::builder())
//!         .await?;
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as docgate_mongodb;

pub mod cursor;
pub mod options;
pub mod session;
pub mod store;

pub use cursor::MongoCursor;
pub use session::MongoSession;
pub use store::{MongoDriver, MongoDriverBuilder};
