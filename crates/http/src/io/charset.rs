//! Character coding of head lines.
//!
//! Header text is ISO-8859-1 on the wire unless configured otherwise. The default
//! coding is a raw byte cast in both directions, which never fails on decode.

use bytes::{BufMut, BytesMut};

use crate::protocol::ProtocolError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Charset {
    /// ISO-8859-1, one byte per char
    #[default]
    Latin1,
    /// US-ASCII, bytes above 0x7F are malformed
    Ascii,
    Utf8,
}

/// What to do with bytes or chars the charset cannot represent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CodingErrorAction {
    #[default]
    Report,
    Replace,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CharCodingConfig {
    charset: Charset,
    malformed_input_action: CodingErrorAction,
}

impl CharCodingConfig {
    pub fn new(charset: Charset, malformed_input_action: CodingErrorAction) -> Self {
        Self { charset, malformed_input_action }
    }

    pub fn charset(&self) -> Charset {
        self.charset
    }

    pub fn malformed_input_action(&self) -> CodingErrorAction {
        self.malformed_input_action
    }

    /// Decodes `src` and appends the chars to `dst`.
    pub fn decode(&self, src: &[u8], dst: &mut String) -> Result<(), ProtocolError> {
        match self.charset {
            Charset::Latin1 => {
                dst.extend(src.iter().map(|&b| char::from(b)));
                Ok(())
            }
            Charset::Ascii => {
                dst.reserve(src.len());
                for &b in src {
                    if b.is_ascii() {
                        dst.push(char::from(b));
                    } else {
                        match self.malformed_input_action {
                            CodingErrorAction::Report => {
                                return Err(ProtocolError::malformed_input(format!("non ascii byte 0x{b:02X}")));
                            }
                            CodingErrorAction::Replace => dst.push(char::REPLACEMENT_CHARACTER),
                        }
                    }
                }
                Ok(())
            }
            Charset::Utf8 => match self.malformed_input_action {
                CodingErrorAction::Report => {
                    let text = std::str::from_utf8(src).map_err(ProtocolError::malformed_input)?;
                    dst.push_str(text);
                    Ok(())
                }
                CodingErrorAction::Replace => {
                    dst.push_str(&String::from_utf8_lossy(src));
                    Ok(())
                }
            },
        }
    }

    /// Encodes `src` and appends the bytes to `dst`.
    pub fn encode(&self, src: &str, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        let limit: u32 = match self.charset {
            Charset::Utf8 => {
                dst.put_slice(src.as_bytes());
                return Ok(());
            }
            Charset::Latin1 if src.is_ascii() => {
                dst.put_slice(src.as_bytes());
                return Ok(());
            }
            Charset::Latin1 => 0xFF,
            Charset::Ascii => 0x7F,
        };

        dst.reserve(src.len());
        for c in src.chars() {
            match u8::try_from(u32::from(c)) {
                Ok(b) if u32::from(b) <= limit => dst.put_u8(b),
                _ => match self.malformed_input_action {
                    CodingErrorAction::Report => {
                        return Err(ProtocolError::malformed_input(format!("unmappable char {c:?}")));
                    }
                    CodingErrorAction::Replace => dst.put_u8(b'?'),
                },
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latin1_is_a_raw_cast() {
        let coding = CharCodingConfig::default();
        let mut text = String::new();
        coding.decode(&[b'a', 0xE9, b'b'], &mut text).unwrap();
        assert_eq!(text, "a\u{e9}b");

        let mut bytes = BytesMut::new();
        coding.encode(&text, &mut bytes).unwrap();
        assert_eq!(&bytes[..], &[b'a', 0xE9, b'b']);
    }

    #[test]
    fn ascii_reports_or_replaces() {
        let report = CharCodingConfig::new(Charset::Ascii, CodingErrorAction::Report);
        let mut text = String::new();
        assert!(report.decode(&[0xFF], &mut text).is_err());

        let replace = CharCodingConfig::new(Charset::Ascii, CodingErrorAction::Replace);
        let mut bytes = BytesMut::new();
        replace.encode("caf\u{e9}", &mut bytes).unwrap();
        assert_eq!(&bytes[..], b"caf?");
    }
}
