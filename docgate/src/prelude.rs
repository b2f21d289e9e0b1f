//! Convenient re-exports of commonly used types from docgate.
//!
//! ```ignore
//! use docgate::prelude::*;
//! ```
//!
//! This provides access to:
//! - The client, its builder and configuration
//! - Untyped, typed and session collection handles
//! - Update documents and the `UpdateFields` derive
//! - Driver traits and write models
//! - Error types

pub use docgate_core::{
    client::{Client, ClientBuilder},
    collection::{Collection, TypedCollection},
    config::Config,
    driver::{
        BulkWriteResult, DocumentCursor, Driver, DriverBuilder, DriverSession, Namespace,
        ReturnDocument, UpdateResult, WriteModel, session_work,
    },
    error::{DocGateError, DocGateResult},
    labels::shard_suffix,
    metrics::MetricsRegistry,
    query::{Sort, SortDirection, id_filter, parse_sort},
    session::SessionCollection,
    update::{FieldType, OperatorValue, Update, UpdateDocument, UpdateFields, UpdateRecord},
};

pub use docgate_macros::UpdateFields;
