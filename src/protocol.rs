//! Gear server status protocol: packet framing and payload schema.
//!
//! The exchange is three request/response steps over one TCP connection,
//! all multi-byte integers little-endian:
//!
//! ```text
//! client -> server   i8  protocol version (1)
//! server -> client   u8  acknowledgment (value unchecked)
//! client -> server   i8  packet type (1), i32 body length (0)
//! server -> client   i8  payload length (0..=127)
//! server -> client   payload: 11 decimal integers separated by ';'
//! ```

use bytes::{BufMut, BytesMut};

/// Wire format revision sent in the handshake.
pub const PROTOCOL_VERSION: i8 = 1;

/// Packet type of a status request.
pub const PACKET_TYPE_STATUS: i8 = 1;

/// Size of an encoded packet header: i8 type + i32 length.
pub const PACKET_HEADER_LEN: usize = 5;

/// Separator between payload fields.
pub const FIELD_SEPARATOR: char = ';';

/// Number of positional fields in a status payload.
pub const FIELD_COUNT: usize = 11;

/// Encode the handshake: a single i8 protocol version.
pub fn encode_handshake(version: i8) -> BytesMut {
    let mut buf = BytesMut::with_capacity(1);
    buf.put_i8(version);
    buf
}

/// Encode a request packet header with the given body length.
pub fn encode_request(packet_type: i8, body_len: i32) -> BytesMut {
    let mut buf = BytesMut::with_capacity(PACKET_HEADER_LEN);
    buf.put_i8(packet_type);
    buf.put_i32_le(body_len);
    buf
}

/// Encode the bodiless status request.
pub fn encode_status_request() -> BytesMut {
    encode_request(PACKET_TYPE_STATUS, 0)
}

/// Interpret the status length byte.
///
/// The length travels as a signed byte, so payloads longer than 127 bytes
/// cannot be announced. A byte with the high bit set yields `None`.
pub fn payload_len(raw: u8) -> Option<usize> {
    usize::try_from(raw as i8).ok()
}

/// One positional field of the status payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusField {
    QueryQueueSize,
    DatabaseConnectionsMax,
    DatabaseConnectionsActive,
    ThreadpoolInputCount,
    ThreadpoolInputRunning,
    ThreadpoolInputQueued,
    ThreadpoolInputTotal,
    ThreadpoolDatabaseCount,
    ThreadpoolDatabaseRunning,
    ThreadpoolDatabaseQueued,
    ThreadpoolDatabaseTotal,
}

impl StatusField {
    /// All fields in payload order.
    pub const ALL: [StatusField; FIELD_COUNT] = [
        StatusField::QueryQueueSize,
        StatusField::DatabaseConnectionsMax,
        StatusField::DatabaseConnectionsActive,
        StatusField::ThreadpoolInputCount,
        StatusField::ThreadpoolInputRunning,
        StatusField::ThreadpoolInputQueued,
        StatusField::ThreadpoolInputTotal,
        StatusField::ThreadpoolDatabaseCount,
        StatusField::ThreadpoolDatabaseRunning,
        StatusField::ThreadpoolDatabaseQueued,
        StatusField::ThreadpoolDatabaseTotal,
    ];

    /// Position of this field in the payload.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Metric name of this field, without namespace.
    pub fn name(self) -> &'static str {
        match self {
            StatusField::QueryQueueSize => "query_queue_size",
            StatusField::DatabaseConnectionsMax => "database_connections_max",
            StatusField::DatabaseConnectionsActive => "database_connections_active",
            StatusField::ThreadpoolInputCount => "threadpool_input_count",
            StatusField::ThreadpoolInputRunning => "threadpool_input_running",
            StatusField::ThreadpoolInputQueued => "threadpool_input_queued",
            StatusField::ThreadpoolInputTotal => "threadpool_input_total",
            StatusField::ThreadpoolDatabaseCount => "threadpool_database_count",
            StatusField::ThreadpoolDatabaseRunning => "threadpool_database_running",
            StatusField::ThreadpoolDatabaseQueued => "threadpool_database_queued",
            StatusField::ThreadpoolDatabaseTotal => "threadpool_database_total",
        }
    }

    /// Help text published with the gauge.
    pub fn help(self) -> &'static str {
        match self {
            StatusField::QueryQueueSize => "How many queries are waiting to be processed.",
            StatusField::DatabaseConnectionsMax => {
                "How many database connections are allowed in total."
            }
            StatusField::DatabaseConnectionsActive => {
                "How many database connections are active at the moment."
            }
            StatusField::ThreadpoolInputCount => "threadpool_input_count.",
            StatusField::ThreadpoolInputRunning => "threadpool_input_running.",
            StatusField::ThreadpoolInputQueued => "threadpool_input_queued.",
            StatusField::ThreadpoolInputTotal => "threadpool_input_total.",
            StatusField::ThreadpoolDatabaseCount => "threadpool_database_count.",
            StatusField::ThreadpoolDatabaseRunning => "threadpool_database_running.",
            StatusField::ThreadpoolDatabaseQueued => "threadpool_database_queued.",
            StatusField::ThreadpoolDatabaseTotal => "threadpool_database_total.",
        }
    }
}

/// Decode a status payload into its positional fields.
///
/// Lenient by contract: a field that does not parse as a base-10 `i64`
/// reads as 0, missing trailing fields stay 0 and extra fields are ignored.
pub fn decode_status(payload: &str) -> [i64; FIELD_COUNT] {
    let mut fields = [0; FIELD_COUNT];
    for (slot, raw) in fields.iter_mut().zip(payload.split(FIELD_SEPARATOR)) {
        *slot = raw.parse().unwrap_or(0);
    }
    fields
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handshake_layout() {
        assert_eq!(&encode_handshake(PROTOCOL_VERSION)[..], &[0x01]);
        assert_eq!(&encode_handshake(-1)[..], &[0xff]);
        assert_eq!(encode_handshake(42).len(), 1);
    }

    #[test]
    fn test_status_request_layout() {
        assert_eq!(&encode_status_request()[..], &[0x01, 0x00, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn test_request_is_little_endian() {
        let buf = encode_request(7, 0x0403_0201);
        assert_eq!(buf.len(), PACKET_HEADER_LEN);
        assert_eq!(&buf[..], &[0x07, 0x01, 0x02, 0x03, 0x04]);

        let buf = encode_request(-2, -1);
        assert_eq!(&buf[..], &[0xfe, 0xff, 0xff, 0xff, 0xff]);
    }

    #[test]
    fn test_payload_len() {
        assert_eq!(payload_len(0), Some(0));
        assert_eq!(payload_len(22), Some(22));
        assert_eq!(payload_len(127), Some(127));
        assert_eq!(payload_len(128), None);
        assert_eq!(payload_len(255), None);
    }

    #[test]
    fn test_field_order() {
        for (position, field) in StatusField::ALL.iter().enumerate() {
            assert_eq!(field.index(), position);
        }
        assert_eq!(StatusField::ALL[0].name(), "query_queue_size");
        assert_eq!(StatusField::ALL[10].name(), "threadpool_database_total");
    }

    #[test]
    fn test_decode_status() {
        let fields = decode_status("3;10;2;0;0;0;0;0;0;0;0");
        assert_eq!(fields, [3, 10, 2, 0, 0, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_decode_non_numeric_field() {
        let fields = decode_status("x;10;2;0;0;0;0;0;0;0;0");
        assert_eq!(fields, [0, 10, 2, 0, 0, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_decode_signed_and_out_of_range() {
        let fields = decode_status("-4;+5;99999999999999999999;;7;8;9;10;11;12;13");
        assert_eq!(fields, [-4, 5, 0, 0, 7, 8, 9, 10, 11, 12, 13]);
    }

    #[test]
    fn test_decode_short_payload() {
        assert_eq!(decode_status("1;2"), [1, 2, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(decode_status(""), [0; FIELD_COUNT]);
    }

    #[test]
    fn test_decode_ignores_extra_fields() {
        let fields = decode_status("1;2;3;4;5;6;7;8;9;10;11;12;13");
        assert_eq!(fields, [1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11]);
    }
}
