// ABOUTME: Typed data the codec produces and consumes: consistency levels, query parameters, rows
// ABOUTME: Column-level value serialization is out of scope here; values travel as opaque CQL-encoded bytes

use bytes::Bytes;
use num_enum::{IntoPrimitive, TryFromPrimitive};

/// CQL consistency level, as carried in `QueryParams` and in `[consistency]` on the wire.
#[derive(Copy, Clone, Debug, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u16)]
pub enum Consistency {
    Any = 0x0000,
    One = 0x0001,
    Two = 0x0002,
    Three = 0x0003,
    Quorum = 0x0004,
    All = 0x0005,
    LocalQuorum = 0x0006,
    EachQuorum = 0x0007,
    Serial = 0x0008,
    LocalSerial = 0x0009,
    LocalOne = 0x000A,
}

impl Default for Consistency {
    fn default() -> Self {
        Consistency::One
    }
}

/// A single CQL-encoded value, or `None` for CQL `NULL`.
///
/// Type-level interpretation of the bytes (text, int, uuid, ...) is left to
/// the caller; this crate only shuttles the raw wire representation.
pub type Value = Option<Bytes>;

/// Per-query options: consistency level, paging, and bind values.
#[derive(Clone, Debug)]
pub struct QueryParams {
    pub consistency: Consistency,
    pub skip_metadata: bool,
    pub page_size: i32,
    pub paging_state: Option<Bytes>,
    pub serial_consistency: Option<Consistency>,
    pub timestamp: Option<i64>,
    pub values: Vec<Value>,
}

impl Default for QueryParams {
    fn default() -> Self {
        Self {
            consistency: Consistency::One,
            skip_metadata: false,
            page_size: 100,
            paging_state: None,
            serial_consistency: None,
            timestamp: None,
            values: Vec::new(),
        }
    }
}

impl QueryParams {
    /// Returns a copy of these params with `paging_state` overwritten, used
    /// to build the follow-up request for the next page.
    pub(crate) fn with_paging_state(&self, paging_state: Bytes) -> Self {
        Self {
            paging_state: Some(paging_state),
            ..self.clone()
        }
    }
}

/// One row of column values, in the order the server sent them.
pub type Row = Vec<Value>;

/// Metadata accompanying a `Result.Rows` frame.
#[derive(Clone, Debug, Default)]
pub struct Metadata {
    pub column_count: u32,
    /// Opaque continuation token. Present iff the result set has more pages.
    pub paging_state: Option<Bytes>,
}

/// A decoded `Result.Rows` body.
#[derive(Clone, Debug, Default)]
pub struct Rows {
    pub data: Vec<Row>,
    pub metadata: Metadata,
}

/// A decoded `Result.Prepared` body: an opaque statement id to pass to `execute`.
#[derive(Clone, Debug)]
pub struct Prepared {
    pub id: Bytes,
}
