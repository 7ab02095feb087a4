use bytes::BytesMut;

use crate::io::CharCodingConfig;
use crate::protocol::{HttpError, ProtocolError};

#[inline]
fn exceeds(len: usize, max_line_length: usize) -> bool {
    max_line_length > 0 && len > max_line_length
}

/// Takes one line off the front of `src` and appends it, without terminator, to `dst`.
///
/// Returns `Ok(false)` when no complete line is buffered yet. At end of stream a
/// trailing unterminated line is returned as is. The length limit applies to the
/// still incomplete line too, so a peer cannot make us buffer without bound.
/// A `max_line_length` of zero disables the limit.
pub(crate) fn read_line(
    src: &mut BytesMut,
    dst: &mut String,
    end_of_stream: bool,
    max_line_length: usize,
    coding: &CharCodingConfig,
) -> Result<bool, HttpError> {
    let line = match src.iter().position(|&b| b == b'\n') {
        Some(pos) => src.split_to(pos + 1),
        None => {
            // one extra byte for a pending CR
            if exceeds(src.len(), max_line_length.saturating_add(1)) {
                return Err(ProtocolError::LineTooLong { max_len: max_line_length }.into());
            }
            if !end_of_stream || src.is_empty() {
                return Ok(false);
            }
            src.split_to(src.len())
        }
    };

    let mut end = line.len();
    if end > 0 && line[end - 1] == b'\n' {
        end -= 1;
    }
    if end > 0 && line[end - 1] == b'\r' {
        end -= 1;
    }

    if exceeds(end, max_line_length) {
        return Err(ProtocolError::LineTooLong { max_len: max_line_length }.into());
    }

    coding.decode(&line[..end], dst)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read(src: &mut BytesMut, eos: bool, max: usize) -> Result<Option<String>, HttpError> {
        let mut line = String::new();
        let complete = read_line(src, &mut line, eos, max, &CharCodingConfig::default())?;
        Ok(complete.then_some(line))
    }

    #[test]
    fn crlf_and_bare_lf() {
        let mut src = BytesMut::from(&b"first\r\nsecond\nthird"[..]);
        assert_eq!(read(&mut src, false, 0).unwrap().as_deref(), Some("first"));
        assert_eq!(read(&mut src, false, 0).unwrap().as_deref(), Some("second"));
        assert_eq!(read(&mut src, false, 0).unwrap(), None);
        assert_eq!(read(&mut src, true, 0).unwrap().as_deref(), Some("third"));
        assert_eq!(read(&mut src, true, 0).unwrap(), None);
    }

    #[test]
    fn limit_applies_to_partial_line() {
        let mut src = BytesMut::from(&b"0123456789"[..]);
        let err = read(&mut src, false, 8).unwrap_err();
        assert!(matches!(err.as_protocol(), Some(ProtocolError::LineTooLong { max_len: 8 })));
    }

    #[test]
    fn limit_applies_to_complete_line() {
        let mut src = BytesMut::from(&b"12345678\r\n123456789\r\n"[..]);
        assert_eq!(read(&mut src, false, 8).unwrap().as_deref(), Some("12345678"));
        assert!(read(&mut src, false, 8).is_err());
    }
}
