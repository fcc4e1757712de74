//! WebSocket wire constants.
//!
//! Close codes (RFC 6455 §7.4, IANA registry) and message opcodes
//! (RFC 6455 §11.8) as enums whose discriminants are the wire values.

use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode as WireCloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

/// Close status codes.
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CloseCode {
    NormalClosure = 1000,
    GoingAway = 1001,
    ProtocolError = 1002,
    UnsupportedData = 1003,
    NoStatusReceived = 1005,
    AbnormalClosure = 1006,
    InvalidFramePayloadData = 1007,
    PolicyViolation = 1008,
    MessageTooBig = 1009,
    MandatoryExtension = 1010,
    InternalServerErr = 1011,
    ServiceRestart = 1012,
    TryAgainLater = 1013,
    BadGateway = 1014,
    TlsHandshake = 1015,
}

impl CloseCode {
    /// The numeric wire value.
    pub fn as_u16(self) -> u16 {
        self as u16
    }
}

impl TryFrom<u16> for CloseCode {
    type Error = u16;

    fn try_from(code: u16) -> Result<Self, u16> {
        Ok(match code {
            1000 => CloseCode::NormalClosure,
            1001 => CloseCode::GoingAway,
            1002 => CloseCode::ProtocolError,
            1003 => CloseCode::UnsupportedData,
            1005 => CloseCode::NoStatusReceived,
            1006 => CloseCode::AbnormalClosure,
            1007 => CloseCode::InvalidFramePayloadData,
            1008 => CloseCode::PolicyViolation,
            1009 => CloseCode::MessageTooBig,
            1010 => CloseCode::MandatoryExtension,
            1011 => CloseCode::InternalServerErr,
            1012 => CloseCode::ServiceRestart,
            1013 => CloseCode::TryAgainLater,
            1014 => CloseCode::BadGateway,
            1015 => CloseCode::TlsHandshake,
            other => return Err(other),
        })
    }
}

impl From<CloseCode> for WireCloseCode {
    fn from(code: CloseCode) -> Self {
        WireCloseCode::from(code.as_u16())
    }
}

impl std::fmt::Display for CloseCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?} ({})", self, self.as_u16())
    }
}

/// Message opcodes.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// UTF-8 text payload.
    Text = 1,
    /// Binary payload.
    Binary = 2,
    /// Close control frame, payload is a code and optional reason.
    Close = 8,
    /// Ping control frame.
    Ping = 9,
    /// Pong control frame.
    Pong = 10,
}

impl MessageType {
    /// Opcode of a decoded message. Raw frames have none.
    pub fn of(message: &Message) -> Option<Self> {
        match message {
            Message::Text(_) => Some(MessageType::Text),
            Message::Binary(_) => Some(MessageType::Binary),
            Message::Close(_) => Some(MessageType::Close),
            Message::Ping(_) => Some(MessageType::Ping),
            Message::Pong(_) => Some(MessageType::Pong),
            Message::Frame(_) => None,
        }
    }

    /// Data messages carry payload for the backend; control messages do not.
    pub fn is_data(self) -> bool {
        matches!(self, MessageType::Text | MessageType::Binary)
    }
}

/// Encode a close frame payload. Code 1005 must not appear on the wire, so it yields an empty payload.
pub fn format_close_message(code: CloseCode, text: &str) -> Vec<u8> {
    if code == CloseCode::NoStatusReceived {
        return Vec::new();
    }
    let mut payload = Vec::with_capacity(2 + text.len());
    payload.extend_from_slice(&code.as_u16().to_be_bytes());
    payload.extend_from_slice(text.as_bytes());
    payload
}

/// A close message carrying `code` and `reason`.
pub fn close_message(code: CloseCode, reason: &str) -> Message {
    Message::Close(Some(CloseFrame {
        code: code.into(),
        reason: reason.to_owned().into(),
    }))
}

/// Close code carried by a received close frame. A frame without payload counts as 1005.
pub fn close_code_of(frame: Option<&CloseFrame>) -> u16 {
    frame.map(|f| u16::from(f.code)).unwrap_or(CloseCode::NoStatusReceived.as_u16())
}

/// True if the close frame carries one of `codes`.
pub fn is_close_code(frame: Option<&CloseFrame>, codes: &[CloseCode]) -> bool {
    let code = close_code_of(frame);
    codes.iter().any(|c| c.as_u16() == code)
}

/// True if the close frame carries a code outside `expected`.
pub fn is_unexpected_close(frame: Option<&CloseFrame>, expected: &[CloseCode]) -> bool {
    !is_close_code(frame, expected)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discriminants_match_registry() {
        assert_eq!(CloseCode::NormalClosure as u16, 1000);
        assert_eq!(CloseCode::NoStatusReceived as u16, 1005);
        assert_eq!(CloseCode::TlsHandshake as u16, 1015);
        assert_eq!(MessageType::Binary as u8, 2);
        assert_eq!(MessageType::Pong as u8, 10);
    }

    #[test]
    fn codes_round_trip_through_u16() {
        for code in 1000..=1015u16 {
            match CloseCode::try_from(code) {
                Ok(c) => assert_eq!(c.as_u16(), code),
                Err(unknown) => assert_eq!(unknown, 1004),
            }
        }
        assert_eq!(CloseCode::try_from(4000), Err(4000));
    }

    #[test]
    fn close_payload_layout() {
        assert_eq!(format_close_message(CloseCode::NormalClosure, "bye"), b"\x03\xe8bye");
        assert!(format_close_message(CloseCode::NoStatusReceived, "ignored").is_empty());
    }

    #[test]
    fn classifies_close_frames() {
        let going_away = CloseFrame {
            code: CloseCode::GoingAway.into(),
            reason: String::new().into(),
        };
        let expected = [CloseCode::NormalClosure, CloseCode::GoingAway];
        assert!(!is_unexpected_close(Some(&going_away), &expected));
        assert!(is_unexpected_close(None, &expected));
        assert!(is_close_code(None, &[CloseCode::NoStatusReceived]));
    }

    #[test]
    fn message_types() {
        assert_eq!(MessageType::of(&Message::binary(vec![1u8])), Some(MessageType::Binary));
        assert_eq!(MessageType::of(&Message::Close(None)), Some(MessageType::Close));
        assert!(MessageType::Text.is_data());
        assert!(!MessageType::Ping.is_data());
    }

    #[test]
    fn close_message_carries_code() {
        match close_message(CloseCode::GoingAway, "shutdown") {
            Message::Close(frame) => assert_eq!(close_code_of(frame.as_ref()), 1001),
            other => panic!("unexpected message {:?}", other),
        }
    }
}
