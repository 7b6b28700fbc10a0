//! Provides a type representing a CQL binary protocol frame, plus the request
//! and response body shapes the codec knows how to produce and consume.
//!
//! The `connection` module only ever touches the wire through
//! [`crate::codec::Codec::encode`] / [`crate::codec::Codec::decode`].

use crate::value::{Prepared, QueryParams, Rows};
use bytes::Bytes;
use num_enum::TryFromPrimitiveError;
use std::collections::HashMap;
use std::string::FromUtf8Error;

/// Correlation token identifying one outstanding request on the wire.
///
/// Reserved values per the data model: `-1` is a server-initiated event,
/// `0` is fire-and-forget, `1` is the implicit `USE <keyspace>`.
pub type StreamId = i16;

pub const EVENT_STREAM: StreamId = -1;
pub const FIRE_AND_FORGET_STREAM: StreamId = 0;
pub const USE_KEYSPACE_STREAM: StreamId = 1;
pub const FIRST_USER_STREAM: StreamId = 2;
pub const LAST_USER_STREAM: StreamId = 32767;

/// Opcodes this client sends or must recognize in a response header.
#[derive(Copy, Clone, Debug, PartialEq, Eq, num_enum::TryFromPrimitive)]
#[repr(u8)]
pub enum Opcode {
    Error = 0x00,
    Startup = 0x01,
    Ready = 0x02,
    Authenticate = 0x03,
    Options = 0x05,
    Supported = 0x06,
    Query = 0x07,
    Result = 0x08,
    Prepare = 0x09,
    Execute = 0x0A,
    Register = 0x0B,
    Event = 0x0C,
}

/// The 9-byte CQL frame header: version, flags, stream, opcode, body length.
#[derive(Copy, Clone, Debug)]
pub struct FrameHeader {
    pub version: u8,
    pub flags: u8,
    pub stream: StreamId,
    pub opcode: Opcode,
    pub length: u32,
}

impl FrameHeader {
    pub const SIZE: usize = 9;
    /// Version byte for a response (high bit set) built by a v4 server.
    pub const RESPONSE_VERSION: u8 = 0x84;
    /// Version byte for a request sent by this client.
    pub const REQUEST_VERSION: u8 = 0x04;
}

/// A request this client can send. Encoded via [`crate::codec::Codec::encode`].
#[derive(Clone, Debug)]
pub enum Request {
    Startup,
    Options,
    Query { cql: String, params: QueryParams },
    Prepare { cql: String },
    Execute { id: Bytes, params: QueryParams },
    Register { event_types: Vec<String> },
}

/// A decoded response body.
#[derive(Clone, Debug)]
pub enum ResponseBody {
    Ready,
    Supported(HashMap<String, Vec<String>>),
    Void,
    Rows(Rows),
    SetKeyspace(String),
    Prepared(Prepared),
    Event { event_type: String, payload: Bytes },
    Error { code: i32, message: String },
    /// A recognized opcode this client does not specialize (e.g. `AUTHENTICATE`).
    Unknown { opcode: Opcode, body: Bytes },
}

/// A fully decoded inbound frame: header plus body.
#[derive(Clone, Debug)]
pub struct Frame {
    pub stream: StreamId,
    pub body: ResponseBody,
}

/// Errors raised while parsing a frame out of the receive buffer.
#[derive(Debug)]
pub enum FrameError {
    /// Not enough bytes are buffered yet to decode a complete frame.
    Incomplete,
    /// The buffered bytes do not represent a valid frame.
    Other(String),
}

impl From<FromUtf8Error> for FrameError {
    fn from(e: FromUtf8Error) -> Self {
        FrameError::Other(format!("invalid utf8: {e}"))
    }
}

impl<T> From<TryFromPrimitiveError<T>> for FrameError
where
    T: num_enum::TryFromPrimitive,
{
    fn from(e: TryFromPrimitiveError<T>) -> Self {
        FrameError::Other(format!("unrecognized enum value: {e}"))
    }
}

impl std::fmt::Display for FrameError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FrameError::Incomplete => write!(f, "incomplete frame"),
            FrameError::Other(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for FrameError {}
