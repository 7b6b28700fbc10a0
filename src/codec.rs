//! The CQL frame codec: boundary detection over a rolling buffer, request
//! encoding, and response decoding.
//!
//! Uses a `BytesMut` read buffer with a check-before-commit decode attempt:
//! parse tentatively, only `buffer.advance(len)` once a full frame is known
//! to be present.

use crate::frame::{Frame, FrameError, FrameHeader, Opcode, Request, ResponseBody, StreamId};
use crate::value::{Consistency, Metadata, Prepared, QueryParams, Row, Rows, Value};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::collections::HashMap;
use std::convert::TryFrom;

const FLAG_VALUES: u8 = 0x01;
const FLAG_SKIP_METADATA: u8 = 0x02;
const FLAG_PAGE_SIZE: u8 = 0x04;
const FLAG_PAGING_STATE: u8 = 0x08;
const FLAG_SERIAL_CONSISTENCY: u8 = 0x10;
const FLAG_TIMESTAMP: u8 = 0x20;

const ROWS_FLAG_HAS_MORE_PAGES: i32 = 0x0002;
const ROWS_FLAG_NO_METADATA: i32 = 0x0004;

/// Stateless encode/decode entry points used by the connection actor.
pub struct Codec;

impl Codec {
    /// Encodes `request` as a complete frame addressed to `stream`.
    pub fn encode(request: &Request, stream: StreamId) -> BytesMut {
        let mut body = BytesMut::new();
        let opcode = match request {
            Request::Startup => {
                let mut options = HashMap::new();
                options.insert("CQL_VERSION".to_string(), "3.0.0".to_string());
                put_string_map(&mut body, &options);
                Opcode::Startup
            }
            Request::Options => Opcode::Options,
            Request::Query { cql, params } => {
                put_long_string(&mut body, cql);
                put_query_params(&mut body, params);
                Opcode::Query
            }
            Request::Prepare { cql } => {
                put_long_string(&mut body, cql);
                Opcode::Prepare
            }
            Request::Execute { id, params } => {
                put_short_bytes(&mut body, id);
                put_query_params(&mut body, params);
                Opcode::Execute
            }
            Request::Register { event_types } => {
                put_string_list(&mut body, event_types);
                Opcode::Register
            }
        };

        let mut out = BytesMut::with_capacity(FrameHeader::SIZE + body.len());
        out.put_u8(FrameHeader::REQUEST_VERSION);
        out.put_u8(0); // flags
        out.put_i16(stream);
        out.put_u8(opcode as u8);
        out.put_u32(body.len() as u32);
        out.extend_from_slice(&body);
        out
    }

    /// Attempts to decode one complete frame from the front of `buf`.
    ///
    /// On success the consumed bytes are removed from `buf` and the frame is
    /// returned. If `buf` does not yet hold a complete frame, `buf` is left
    /// untouched and `Ok(None)` is returned. Malformed input is a decode error.
    pub fn decode(buf: &mut BytesMut) -> Result<Option<Frame>, FrameError> {
        if buf.len() < FrameHeader::SIZE {
            return Ok(None);
        }

        let mut header_bytes = &buf[..FrameHeader::SIZE];
        let version = header_bytes.get_u8();
        let _flags = header_bytes.get_u8();
        let stream = header_bytes.get_i16();
        let opcode_byte = header_bytes.get_u8();
        let length = header_bytes.get_u32();

        if version & 0x80 == 0 {
            return Err(FrameError::Other(format!(
                "expected a response frame, got version byte {version:#x}"
            )));
        }
        let opcode = Opcode::try_from(opcode_byte)?;

        let total_len = FrameHeader::SIZE + length as usize;
        if buf.len() < total_len {
            return Ok(None);
        }

        let mut frame_buf = buf.split_to(total_len);
        frame_buf.advance(FrameHeader::SIZE);
        let mut body = frame_buf;

        let response_body = decode_body(opcode, &mut body)?;

        Ok(Some(Frame {
            stream,
            body: response_body,
        }))
    }
}

fn decode_body(opcode: Opcode, body: &mut BytesMut) -> Result<ResponseBody, FrameError> {
    Ok(match opcode {
        Opcode::Ready => ResponseBody::Ready,
        Opcode::Supported => ResponseBody::Supported(get_string_multimap(body)?),
        Opcode::Event => {
            let event_type = get_string(body)?;
            let payload = body.split_off(0).freeze();
            ResponseBody::Event {
                event_type,
                payload,
            }
        }
        Opcode::Error => {
            let code = body.get_i32();
            let message = get_string(body)?;
            ResponseBody::Error { code, message }
        }
        Opcode::Result => decode_result(body)?,
        other @ (Opcode::Authenticate | Opcode::Startup | Opcode::Options | Opcode::Query
        | Opcode::Prepare | Opcode::Execute | Opcode::Register) => ResponseBody::Unknown {
            opcode: other,
            body: body.split_off(0).freeze(),
        },
    })
}

fn decode_result(body: &mut BytesMut) -> Result<ResponseBody, FrameError> {
    let kind = body.get_i32();
    Ok(match kind {
        0x0001 => ResponseBody::Void,
        0x0002 => ResponseBody::Rows(decode_rows(body)?),
        0x0003 => ResponseBody::SetKeyspace(get_string(body)?),
        0x0004 => ResponseBody::Prepared(decode_prepared(body)?),
        other => {
            return Err(FrameError::Other(format!(
                "unrecognized Result kind {other:#x}"
            )));
        }
    })
}

fn decode_metadata(body: &mut BytesMut) -> Result<Metadata, FrameError> {
    let flags = body.get_i32();
    let column_count = body.get_u32();
    let paging_state = if flags & ROWS_FLAG_HAS_MORE_PAGES != 0 {
        Some(get_bytes(body)?.ok_or_else(|| {
            FrameError::Other("HAS_MORE_PAGES set but paging_state is null".to_string())
        })?)
    } else {
        None
    };
    if flags & ROWS_FLAG_NO_METADATA == 0 {
        // Column specs would follow here; this crate does not interpret
        // column schemas (type-level value serialization is out of scope),
        // so callers must always request NO_METADATA via `skip_metadata`.
        return Err(FrameError::Other(
            "column specs present but unsupported; set skip_metadata".to_string(),
        ));
    }
    Ok(Metadata {
        column_count,
        paging_state,
    })
}

fn decode_rows(body: &mut BytesMut) -> Result<Rows, FrameError> {
    let metadata = decode_metadata(body)?;
    let row_count = body.get_u32();
    let mut data = Vec::with_capacity(row_count as usize);
    for _ in 0..row_count {
        let mut row: Row = Vec::with_capacity(metadata.column_count as usize);
        for _ in 0..metadata.column_count {
            row.push(get_bytes(body)?);
        }
        data.push(row);
    }
    Ok(Rows { data, metadata })
}

fn decode_prepared(body: &mut BytesMut) -> Result<Prepared, FrameError> {
    let id = get_short_bytes(body)?;
    // Bind-marker and result metadata blocks follow; skipped for the same
    // reason column specs are skipped in `decode_metadata`.
    let _params_metadata = decode_metadata(body)?;
    let _result_metadata = decode_metadata(body)?;
    Ok(Prepared { id })
}

fn put_query_params(out: &mut BytesMut, params: &QueryParams) {
    out.put_u16(Into::<u16>::into(params.consistency));

    let mut flags: u8 = 0;
    if !params.values.is_empty() {
        flags |= FLAG_VALUES;
    }
    if params.skip_metadata {
        flags |= FLAG_SKIP_METADATA;
    }
    flags |= FLAG_PAGE_SIZE;
    if params.paging_state.is_some() {
        flags |= FLAG_PAGING_STATE;
    }
    if params.serial_consistency.is_some() {
        flags |= FLAG_SERIAL_CONSISTENCY;
    }
    if params.timestamp.is_some() {
        flags |= FLAG_TIMESTAMP;
    }
    out.put_u8(flags);

    if flags & FLAG_VALUES != 0 {
        out.put_u16(params.values.len() as u16);
        for value in &params.values {
            put_bytes(out, value.as_ref());
        }
    }
    out.put_i32(params.page_size);
    if let Some(paging_state) = &params.paging_state {
        put_bytes(out, Some(paging_state));
    }
    if let Some(serial) = params.serial_consistency {
        out.put_u16(Into::<u16>::into(serial));
    }
    if let Some(ts) = params.timestamp {
        out.put_i64(ts);
    }
}

fn put_string(out: &mut BytesMut, s: &str) {
    out.put_u16(s.len() as u16);
    out.extend_from_slice(s.as_bytes());
}

fn put_long_string(out: &mut BytesMut, s: &str) {
    out.put_u32(s.len() as u32);
    out.extend_from_slice(s.as_bytes());
}

fn put_string_list(out: &mut BytesMut, items: &[String]) {
    out.put_u16(items.len() as u16);
    for item in items {
        put_string(out, item);
    }
}

fn put_string_map(out: &mut BytesMut, map: &HashMap<String, String>) {
    out.put_u16(map.len() as u16);
    for (k, v) in map {
        put_string(out, k);
        put_string(out, v);
    }
}

fn put_bytes(out: &mut BytesMut, value: Option<&Bytes>) {
    match value {
        Some(bytes) => {
            out.put_i32(bytes.len() as i32);
            out.extend_from_slice(bytes);
        }
        None => out.put_i32(-1),
    }
}

fn put_short_bytes(out: &mut BytesMut, bytes: &Bytes) {
    out.put_u16(bytes.len() as u16);
    out.extend_from_slice(bytes);
}

fn get_string(buf: &mut BytesMut) -> Result<String, FrameError> {
    if buf.len() < 2 {
        return Err(FrameError::Other("truncated string length".to_string()));
    }
    let len = buf.get_u16() as usize;
    if buf.len() < len {
        return Err(FrameError::Other("truncated string body".to_string()));
    }
    let raw = buf.split_to(len);
    Ok(String::from_utf8(raw.to_vec())?)
}

fn get_bytes(buf: &mut BytesMut) -> Result<Value, FrameError> {
    if buf.len() < 4 {
        return Err(FrameError::Other("truncated bytes length".to_string()));
    }
    let len = buf.get_i32();
    if len < 0 {
        return Ok(None);
    }
    let len = len as usize;
    if buf.len() < len {
        return Err(FrameError::Other("truncated bytes body".to_string()));
    }
    Ok(Some(buf.split_to(len).freeze()))
}

fn get_short_bytes(buf: &mut BytesMut) -> Result<Bytes, FrameError> {
    if buf.len() < 2 {
        return Err(FrameError::Other("truncated short bytes length".to_string()));
    }
    let len = buf.get_u16() as usize;
    if buf.len() < len {
        return Err(FrameError::Other("truncated short bytes body".to_string()));
    }
    Ok(buf.split_to(len).freeze())
}

fn get_string_multimap(buf: &mut BytesMut) -> Result<HashMap<String, Vec<String>>, FrameError> {
    if buf.len() < 2 {
        return Err(FrameError::Other("truncated multimap length".to_string()));
    }
    let count = buf.get_u16();
    let mut map = HashMap::with_capacity(count as usize);
    for _ in 0..count {
        let key = get_string(buf)?;
        if buf.len() < 2 {
            return Err(FrameError::Other("truncated multimap values".to_string()));
        }
        let n = buf.get_u16();
        let mut values = Vec::with_capacity(n as usize);
        for _ in 0..n {
            values.push(get_string(buf)?);
        }
        map.insert(key, values);
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Consistency;

    fn response_header(opcode: Opcode, stream: StreamId, body: &[u8]) -> BytesMut {
        let mut out = BytesMut::with_capacity(FrameHeader::SIZE + body.len());
        out.put_u8(0x84);
        out.put_u8(0);
        out.put_i16(stream);
        out.put_u8(opcode as u8);
        out.put_u32(body.len() as u32);
        out.extend_from_slice(body);
        out
    }

    #[test]
    fn decode_waits_for_a_full_header() {
        let mut buf = BytesMut::from(&[0x84, 0x00, 0x00][..]);
        assert!(matches!(Codec::decode(&mut buf), Ok(None)));
    }

    #[test]
    fn decode_waits_for_a_full_body() {
        let mut buf = response_header(Opcode::Ready, 3, &[1, 2, 3, 4]);
        buf.truncate(buf.len() - 2);
        assert!(matches!(Codec::decode(&mut buf), Ok(None)));
    }

    #[test]
    fn decode_rejects_a_request_version_byte() {
        let mut buf = BytesMut::new();
        buf.put_u8(FrameHeader::REQUEST_VERSION);
        buf.put_u8(0);
        buf.put_i16(0);
        buf.put_u8(Opcode::Ready as u8);
        buf.put_u32(0);
        assert!(matches!(Codec::decode(&mut buf), Err(FrameError::Other(_))));
    }

    #[test]
    fn decode_byte_at_a_time_finds_the_frame_boundary() {
        let whole = response_header(Opcode::Ready, 7, &[]);
        let mut buf = BytesMut::new();
        let mut decoded = None;
        for byte in whole.iter() {
            buf.extend_from_slice(std::slice::from_ref(byte));
            if let Some(frame) = Codec::decode(&mut buf).unwrap() {
                decoded = Some(frame);
            }
        }
        let frame = decoded.expect("frame should decode once all bytes arrive");
        assert_eq!(frame.stream, 7);
        assert!(matches!(frame.body, ResponseBody::Ready));
    }

    #[test]
    fn decode_leaves_a_trailing_frame_in_the_buffer() {
        let mut buf = response_header(Opcode::Ready, 1, &[]);
        buf.extend_from_slice(&response_header(Opcode::Ready, 2, &[]));
        let first = Codec::decode(&mut buf).unwrap().unwrap();
        assert_eq!(first.stream, 1);
        let second = Codec::decode(&mut buf).unwrap().unwrap();
        assert_eq!(second.stream, 2);
        assert!(buf.is_empty());
    }

    #[test]
    fn decode_error_body() {
        let mut body = BytesMut::new();
        body.put_i32(0x1001);
        put_string(&mut body, "unavailable");
        let mut buf = response_header(Opcode::Error, 5, &body);
        let frame = Codec::decode(&mut buf).unwrap().unwrap();
        match frame.body {
            ResponseBody::Error { code, message } => {
                assert_eq!(code, 0x1001);
                assert_eq!(message, "unavailable");
            }
            other => panic!("expected Error, got {other:?}"),
        }
    }

    #[test]
    fn decode_void_result() {
        let mut body = BytesMut::new();
        body.put_i32(0x0001);
        let mut buf = response_header(Opcode::Result, 2, &body);
        let frame = Codec::decode(&mut buf).unwrap().unwrap();
        assert!(matches!(frame.body, ResponseBody::Void));
    }

    #[test]
    fn decode_rows_requires_no_metadata_flag() {
        let mut body = BytesMut::new();
        body.put_i32(0x0002); // Rows
        body.put_i32(0); // flags: no NO_METADATA bit
        body.put_u32(1);
        let mut buf = response_header(Opcode::Result, 2, &body);
        assert!(Codec::decode(&mut buf).is_err());
    }

    #[test]
    fn decode_rows_with_paging_state() {
        let mut body = BytesMut::new();
        body.put_i32(0x0002); // Rows
        body.put_i32(0x0002 | 0x0004); // HAS_MORE_PAGES | NO_METADATA
        body.put_u32(1);
        put_bytes(&mut body, Some(&Bytes::from_static(b"page-token")));
        body.put_u32(1); // one row
        put_bytes(&mut body, Some(&Bytes::from_static(b"value")));
        let mut buf = response_header(Opcode::Result, 2, &body);
        let frame = Codec::decode(&mut buf).unwrap().unwrap();
        match frame.body {
            ResponseBody::Rows(rows) => {
                assert_eq!(rows.data.len(), 1);
                assert_eq!(rows.metadata.paging_state.as_deref(), Some(&b"page-token"[..]));
            }
            other => panic!("expected Rows, got {other:?}"),
        }
    }

    #[test]
    fn decode_prepared_skips_bind_and_result_metadata() {
        let mut body = BytesMut::new();
        body.put_i32(0x0004); // Prepared
        put_short_bytes(&mut body, &Bytes::from_static(b"stmt-id"));
        body.put_i32(0x0004); // params metadata: NO_METADATA
        body.put_u32(2);
        body.put_i32(0x0004); // result metadata: NO_METADATA
        body.put_u32(0);
        let mut buf = response_header(Opcode::Result, 2, &body);
        let frame = Codec::decode(&mut buf).unwrap().unwrap();
        match frame.body {
            ResponseBody::Prepared(prepared) => assert_eq!(&prepared.id[..], b"stmt-id"),
            other => panic!("expected Prepared, got {other:?}"),
        }
    }

    #[test]
    fn unrecognized_opcode_becomes_unknown() {
        let mut buf = response_header(Opcode::Authenticate, 4, &[1, 2, 3]);
        let frame = Codec::decode(&mut buf).unwrap().unwrap();
        match frame.body {
            ResponseBody::Unknown { opcode, body } => {
                assert_eq!(opcode, Opcode::Authenticate);
                assert_eq!(&body[..], &[1, 2, 3]);
            }
            other => panic!("expected Unknown, got {other:?}"),
        }
    }

    #[test]
    fn encode_query_round_trips_through_a_fake_response() {
        let params = QueryParams {
            consistency: Consistency::Quorum,
            values: vec![Some(Bytes::from_static(b"alice"))],
            ..QueryParams::default()
        };
        let request = Request::Query {
            cql: "SELECT * FROM users WHERE name = ?".to_string(),
            params,
        };
        let encoded = Codec::encode(&request, 9);
        assert_eq!(encoded[0], FrameHeader::REQUEST_VERSION);
        assert_eq!(encoded[4], Opcode::Query as u8);
        let mut stream_bytes = &encoded[2..4];
        assert_eq!(stream_bytes.get_i16(), 9);
    }
}
