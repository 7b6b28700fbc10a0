//! A multiplexed, auto-reconnecting connection to a single CQL (Cassandra)
//! node: one actor task owns the socket and routes replies by stream-id, so
//! many concurrent callers can share one TCP connection without locking.
//!
//! ```rust,no_run
//! use cqlconn::{Connection, ConnectionConfig, QueryParams};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> cqlconn::ConnResult<()> {
//!     let conn = Connection::connect(ConnectionConfig::new("127.0.0.1", 9042));
//!
//!     match conn.query("SELECT * FROM system.local", QueryParams::default(), Duration::from_secs(5)).await? {
//!         cqlconn::QueryOutcome::Rows(rows) => println!("{} rows", rows.len()),
//!         cqlconn::QueryOutcome::Stream(mut rows) => {
//!             while let Some(row) = rows.next().await {
//!                 println!("{row:?}");
//!             }
//!         }
//!         other => println!("unexpected outcome: {other:?}"),
//!     }
//!
//!     conn.stop().await;
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod config;
pub mod connection;
pub mod error;
pub mod event;
pub mod frame;
pub mod paging;
pub mod value;

pub use config::ConnectionConfig;
pub use connection::{Connection, QueryOutcome};
pub use error::{ConnError, ConnResult};
pub use event::{CqlEvent, EventStream};
pub use paging::RowStream;
pub use value::{Consistency, Metadata, Prepared, QueryParams, Row, Rows, Value};
