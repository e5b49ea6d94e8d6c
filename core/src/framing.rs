//! Wire framing for text messages. The reference systems concatenate raw
//! UTF-8 onto the channel with no boundaries; here a message gets an explicit
//! frame (kind byte, big-endian length, body) so it can share a channel with
//! raw file bytes without ambiguity. File bytes stay unframed passthrough.

pub const MESSAGE_FRAME: u8 = 1;
pub const FRAME_HEADER_LEN: usize = 5;

const MAX_MESSAGE_LEN: usize = 64 * 1024;

pub fn encode_message(text: &str) -> Vec<u8> {
    let body = text.as_bytes();
    let mut frame = Vec::with_capacity(FRAME_HEADER_LEN + body.len());
    frame.push(MESSAGE_FRAME);
    frame.extend_from_slice(&(body.len() as u32).to_be_bytes());
    frame.extend_from_slice(body);
    frame
}

/// Decode `data` when it is exactly one well-formed message frame; anything
/// else (including raw file bytes) returns None and passes through untouched.
pub fn decode_message(data: &[u8]) -> Option<String> {
    if data.len() < FRAME_HEADER_LEN || data[0] != MESSAGE_FRAME {
        return None;
    }
    let len = u32::from_be_bytes([data[1], data[2], data[3], data[4]]) as usize;
    if len > MAX_MESSAGE_LEN || data.len() != FRAME_HEADER_LEN + len {
        return None;
    }
    String::from_utf8(data[FRAME_HEADER_LEN..].to_vec()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let frame = encode_message("hello peer");
        assert_eq!(frame[0], MESSAGE_FRAME);
        assert_eq!(decode_message(&frame).as_deref(), Some("hello peer"));
    }

    #[test]
    fn empty_message_roundtrips() {
        let frame = encode_message("");
        assert_eq!(frame.len(), FRAME_HEADER_LEN);
        assert_eq!(decode_message(&frame).as_deref(), Some(""));
    }

    #[test]
    fn rejects_raw_bytes() {
        assert!(decode_message(b"just some file bytes").is_none());
        assert!(decode_message(&[]).is_none());
        assert!(decode_message(&[MESSAGE_FRAME, 0, 0]).is_none());
    }

    #[test]
    fn rejects_length_mismatch() {
        let mut frame = encode_message("abc");
        frame.push(b'x');
        assert!(decode_message(&frame).is_none());
    }

    #[test]
    fn rejects_invalid_utf8() {
        let mut frame = vec![MESSAGE_FRAME];
        frame.extend_from_slice(&2u32.to_be_bytes());
        frame.extend_from_slice(&[0xff, 0xfe]);
        assert!(decode_message(&frame).is_none());
    }
}
