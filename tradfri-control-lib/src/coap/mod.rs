//! CoAP message codec for the Trådfri gateway.
//!
//! The gateway speaks plain RFC 7252 request/response over its DTLS session.
//! Only the slice of the protocol the gateway uses is implemented here:
//! confirmable GET/PUT/POST requests addressed by Uri-Path options, and
//! piggybacked acknowledgement responses. There is no observe/subscribe
//! support and no blockwise transfer.

use std::fmt;
use std::str::FromStr;

use bytes::{BufMut, BytesMut};

use crate::error::{Error, Result};

pub mod client;

/// Resource root for devices (`/15001`).
pub const ROOT_DEVICES: &str = "15001";
/// Resource root for groups (`/15004`).
pub const ROOT_GROUPS: &str = "15004";
/// Resource root for blinds (`/15015`).
pub const ROOT_BLINDS: &str = "15015";
/// Resource the gateway serves PSK exchanges on (`/15011/9063`).
pub const ROOT_AUTH: [&str; 2] = ["15011", "9063"];

const COAP_VERSION: u8 = 1;
const PAYLOAD_MARKER: u8 = 0xFF;
const OPTION_URI_PATH: u16 = 11;

/// CoAP message type (RFC 7252 §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Confirmable,
    NonConfirmable,
    Acknowledgement,
    Reset,
}

impl MessageType {
    fn from_bits(bits: u8) -> MessageType {
        match bits & 0b11 {
            0 => MessageType::Confirmable,
            1 => MessageType::NonConfirmable,
            2 => MessageType::Acknowledgement,
            _ => MessageType::Reset,
        }
    }

    fn bits(self) -> u8 {
        match self {
            MessageType::Confirmable => 0,
            MessageType::NonConfirmable => 1,
            MessageType::Acknowledgement => 2,
            MessageType::Reset => 3,
        }
    }
}

/// Request method codes (0.01, 0.02, 0.03).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
}

impl Method {
    pub fn code(self) -> u8 {
        match self {
            Method::Get => 0x01,
            Method::Post => 0x02,
            Method::Put => 0x03,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
        };
        write!(f, "{}", name)
    }
}

/// A structured resource path: an ordered list of Uri-Path segments.
///
/// Paths are kept as segments rather than a raw string so the codec can emit
/// one Uri-Path option per segment and callers can inspect where a request
/// is addressed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourcePath(Vec<String>);

impl ResourcePath {
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ResourcePath(segments.into_iter().map(Into::into).collect())
    }

    /// Path of a single device, `/15001/<id>`.
    pub fn device(device_id: u32) -> Self {
        ResourcePath(vec![ROOT_DEVICES.to_string(), device_id.to_string()])
    }

    /// Path of the device index, `/15001`.
    pub fn device_index() -> Self {
        ResourcePath(vec![ROOT_DEVICES.to_string()])
    }

    /// Path of a single group, `/15004/<id>`.
    pub fn group(group_id: u32) -> Self {
        ResourcePath(vec![ROOT_GROUPS.to_string(), group_id.to_string()])
    }

    /// Path of the group index, `/15004`.
    pub fn group_index() -> Self {
        ResourcePath(vec![ROOT_GROUPS.to_string()])
    }

    /// Blind positioning path, `/15015/<id>`.
    pub fn blind(device_id: u32) -> Self {
        ResourcePath(vec![ROOT_BLINDS.to_string(), device_id.to_string()])
    }

    /// The PSK exchange resource, `/15011/9063`.
    pub fn auth() -> Self {
        ResourcePath(ROOT_AUTH.iter().map(|s| s.to_string()).collect())
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for ResourcePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.0.join("/"))
    }
}

impl FromStr for ResourcePath {
    type Err = Error;

    /// Parses a slash-delimited path; leading slashes and empty segments are
    /// ignored, so `"15001/1"` and `"/15001/1"` are equivalent.
    fn from_str(s: &str) -> Result<Self> {
        let segments: Vec<String> = s
            .split('/')
            .filter(|seg| !seg.is_empty())
            .map(str::to_string)
            .collect();
        if segments.is_empty() {
            return Err(Error::Codec(format!("empty resource path: {:?}", s)));
        }
        Ok(ResourcePath(segments))
    }
}

/// A single CoAP message, request or response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoapMessage {
    pub message_type: MessageType,
    /// Raw code byte: a [`Method`] code for requests, a status code such as
    /// 2.05 (0x45) for responses.
    pub code: u8,
    pub message_id: u16,
    pub token: Vec<u8>,
    pub path: ResourcePath,
    pub payload: Vec<u8>,
}

impl CoapMessage {
    /// Builds a confirmable request. Every request the client sends expects
    /// an acknowledgement, so the confirmable flag is always set.
    pub fn request(method: Method, path: ResourcePath, payload: Vec<u8>, message_id: u16) -> Self {
        CoapMessage {
            message_type: MessageType::Confirmable,
            code: method.code(),
            message_id,
            token: Vec::new(),
            path,
            payload,
        }
    }

    /// Builds a piggybacked acknowledgement carrying a response code. Used by
    /// stub transports standing in for a gateway.
    pub fn response(code: u8, message_id: u16, payload: Vec<u8>) -> Self {
        CoapMessage {
            message_type: MessageType::Acknowledgement,
            code,
            message_id,
            token: Vec::new(),
            path: ResourcePath::new(Vec::<String>::new()),
            payload,
        }
    }

    /// The dotted status-code notation, e.g. `"2.05"` for Content.
    pub fn code_string(&self) -> String {
        format!("{}.{:02}", self.code >> 5, self.code & 0x1F)
    }

    /// Serializes the message into its wire form.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(32 + self.payload.len());
        buf.put_u8(
            (COAP_VERSION << 6) | (self.message_type.bits() << 4) | (self.token.len() as u8),
        );
        buf.put_u8(self.code);
        buf.put_u16(self.message_id);
        buf.put_slice(&self.token);

        let mut previous = 0u16;
        for segment in self.path.segments() {
            put_option(&mut buf, OPTION_URI_PATH - previous, segment.as_bytes());
            previous = OPTION_URI_PATH;
        }

        if !self.payload.is_empty() {
            buf.put_u8(PAYLOAD_MARKER);
            buf.put_slice(&self.payload);
        }
        buf.to_vec()
    }

    /// Parses raw bytes into a message.
    ///
    /// Any malformation (short header, wrong version, truncated token or
    /// option, reserved nibbles, dangling payload marker) is an
    /// [`Error::Codec`]; nothing is defaulted.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < 4 {
            return Err(Error::Codec(format!(
                "message too short: {} bytes",
                data.len()
            )));
        }

        let version = data[0] >> 6;
        if version != COAP_VERSION {
            return Err(Error::Codec(format!("unsupported version {}", version)));
        }
        let message_type = MessageType::from_bits(data[0] >> 4);
        let token_length = (data[0] & 0x0F) as usize;
        if token_length > 8 {
            return Err(Error::Codec(format!(
                "reserved token length {}",
                token_length
            )));
        }
        let code = data[1];
        let message_id = u16::from_be_bytes([data[2], data[3]]);

        let mut pos = 4;
        if data.len() < pos + token_length {
            return Err(Error::Codec("truncated token".to_string()));
        }
        let token = data[pos..pos + token_length].to_vec();
        pos += token_length;

        let mut segments = Vec::new();
        let mut option_number = 0u32;
        let mut payload = Vec::new();

        while pos < data.len() {
            if data[pos] == PAYLOAD_MARKER {
                pos += 1;
                if pos == data.len() {
                    return Err(Error::Codec(
                        "payload marker without payload".to_string(),
                    ));
                }
                payload = data[pos..].to_vec();
                break;
            }

            let byte = data[pos];
            pos += 1;
            let delta = read_option_field(data, &mut pos, byte >> 4, "option delta")?;
            let length = read_option_field(data, &mut pos, byte & 0x0F, "option length")? as usize;

            if data.len() < pos + length {
                return Err(Error::Codec("truncated option value".to_string()));
            }
            option_number += delta;
            let value = &data[pos..pos + length];
            pos += length;

            if option_number == u32::from(OPTION_URI_PATH) {
                let segment = std::str::from_utf8(value)
                    .map_err(|_| Error::Codec("Uri-Path segment is not UTF-8".to_string()))?;
                segments.push(segment.to_string());
            }
            // Other options (Content-Format and friends) carry nothing the
            // client needs and are skipped.
        }

        Ok(CoapMessage {
            message_type,
            code,
            message_id,
            token,
            path: ResourcePath(segments),
            payload,
        })
    }
}

/// Emits one option with the given delta and value, extending the nibbles
/// per RFC 7252 §3.1 where they exceed 12.
fn put_option(buf: &mut BytesMut, delta: u16, value: &[u8]) {
    let (delta_nibble, delta_ext) = split_option_field(delta);
    let (length_nibble, length_ext) = split_option_field(value.len() as u16);
    buf.put_u8((delta_nibble << 4) | length_nibble);
    if let Some(ext) = delta_ext {
        put_option_ext(buf, ext);
    }
    if let Some(ext) = length_ext {
        put_option_ext(buf, ext);
    }
    buf.put_slice(value);
}

fn split_option_field(value: u16) -> (u8, Option<u16>) {
    match value {
        0..=12 => (value as u8, None),
        13..=268 => (13, Some(value)),
        _ => (14, Some(value)),
    }
}

fn put_option_ext(buf: &mut BytesMut, value: u16) {
    if value <= 268 {
        buf.put_u8((value - 13) as u8);
    } else {
        buf.put_u16(value - 269);
    }
}

/// Resolves a 4-bit delta/length field, consuming extension bytes as needed.
fn read_option_field(data: &[u8], pos: &mut usize, nibble: u8, what: &str) -> Result<u32> {
    match nibble {
        0..=12 => Ok(u32::from(nibble)),
        13 => {
            if *pos >= data.len() {
                return Err(Error::Codec(format!("truncated {} extension", what)));
            }
            let value = u32::from(data[*pos]) + 13;
            *pos += 1;
            Ok(value)
        }
        14 => {
            if *pos + 1 >= data.len() {
                return Err(Error::Codec(format!("truncated {} extension", what)));
            }
            let value = u32::from(u16::from_be_bytes([data[*pos], data[*pos + 1]])) + 269;
            *pos += 2;
            Ok(value)
        }
        _ => Err(Error::Codec(format!("reserved {} nibble 15", what))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_a_confirmable_get() {
        let msg = CoapMessage::request(Method::Get, ResourcePath::device(1), Vec::new(), 0x0102);
        let bytes = msg.encode();
        assert_eq!(
            bytes,
            vec![
                0x40, 0x01, 0x01, 0x02, // ver 1, CON, tkl 0, GET, id 0x0102
                0xB5, b'1', b'5', b'0', b'0', b'1', // Uri-Path "15001"
                0x01, b'1', // Uri-Path "1"
            ]
        );
    }

    #[test]
    fn round_trips_a_put_with_payload() {
        let msg = CoapMessage::request(
            Method::Put,
            ResourcePath::device(65537),
            br#"{"3311":[{"5850":1}]}"#.to_vec(),
            40000,
        );
        let decoded = CoapMessage::decode(&msg.encode()).unwrap();
        assert_eq!(decoded, msg);
        assert_eq!(decoded.path.to_string(), "/15001/65537");
    }

    #[test]
    fn round_trips_long_segments() {
        let long = "x".repeat(200);
        let msg = CoapMessage::request(
            Method::Get,
            ResourcePath::new(vec![long.clone(), "y".to_string()]),
            Vec::new(),
            7,
        );
        let decoded = CoapMessage::decode(&msg.encode()).unwrap();
        assert_eq!(decoded.path.segments(), [long, "y".to_string()]);
    }

    #[test]
    fn rejects_short_and_malformed_input() {
        assert!(matches!(
            CoapMessage::decode(&[0x40, 0x01]),
            Err(Error::Codec(_))
        ));
        // version 2
        assert!(matches!(
            CoapMessage::decode(&[0x80, 0x01, 0x00, 0x01]),
            Err(Error::Codec(_))
        ));
        // token length 9 is reserved
        assert!(matches!(
            CoapMessage::decode(&[0x49, 0x01, 0x00, 0x01]),
            Err(Error::Codec(_))
        ));
        // payload marker with nothing behind it
        assert!(matches!(
            CoapMessage::decode(&[0x40, 0x45, 0x00, 0x01, 0xFF]),
            Err(Error::Codec(_))
        ));
        // option value runs past the end
        assert!(matches!(
            CoapMessage::decode(&[0x40, 0x01, 0x00, 0x01, 0xB5, b'1']),
            Err(Error::Codec(_))
        ));
    }

    #[test]
    fn renders_dotted_status_codes() {
        assert_eq!(CoapMessage::response(0x45, 1, Vec::new()).code_string(), "2.05");
        assert_eq!(CoapMessage::response(0x44, 1, Vec::new()).code_string(), "2.04");
        assert_eq!(CoapMessage::response(0x84, 1, Vec::new()).code_string(), "4.04");
    }

    #[test]
    fn parses_raw_paths() {
        let path: ResourcePath = "/15001/1".parse().unwrap();
        assert_eq!(path, ResourcePath::device(1));
        let path: ResourcePath = "15004".parse().unwrap();
        assert_eq!(path, ResourcePath::group_index());
        assert!("".parse::<ResourcePath>().is_err());
    }
}
