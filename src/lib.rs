//! # people_db - Person records with DataTables server-side processing
//!
//! A small record-serving backend. It stores people (name, birth date, eye
//! colour) in a durable row store and serves them over HTTP, including the
//! paging/filtering/count protocol the DataTables widget uses for
//! server-side processing.
//!
//! ## Architecture Overview
//!
//! ```text
//! HTTP (server) → QueryEngine (query) → PersonStore (person) → Engine (engine)
//!                      ↓
//!               DataTableResponse
//! ```
//!
//! 1. **Server Layer** (`server` module): axum routes, parameter parsing, JSON
//! 2. **Query Layer** (`query` module): paging math, counts, response envelope
//! 3. **Record Layer** (`person` module): the person entity and its store
//! 4. **Engine Layer** (`engine` module): WAL, page files, buffer pool, catalog
//!
//! `seed` fills the store at startup and `config` holds the command line.
//!
//! ## Usage Example
//!
//! ```bash
//! cargo run -- --data ./dbdata --listen 127.0.0.1:8080
//!
//! curl 'http://127.0.0.1:8080/person/eyes/BLUE'
//! curl 'http://127.0.0.1:8080/person/datatable?draw=1&start=0&length=10&search%5Bvalue%5D=yan'
//! ```

/// Command-line configuration
pub mod config;

/// Durable row storage: WAL, page files, buffer pool and catalog
pub mod engine;

/// Error taxonomy
pub mod error;

/// The person entity and its record store
pub mod person;

/// Query engine and DataTables envelope
pub mod query;

/// Startup data
pub mod seed;

/// HTTP routes
pub mod server;

pub use error::{Error, Result};
