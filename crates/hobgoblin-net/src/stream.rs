//! Length-prefixed chunk reassembly for the TCP session (spec.md §4.3, §9
//! Open Questions: "implementers should standardize on length-prefix").
//! Pure buffer logic, no socket in sight, so it is unit-testable the same
//! way as `reliable.rs`'s window.

/// Accumulates raw bytes read off a TCP stream and yields complete
/// `u32`-length-prefixed chunks as they become available. The first popped
/// chunk on a fresh connector is the handshake passphrase (a raw UTF-8
/// string with the same length-prefix shape `Packet::append_string`
/// produces); every chunk after that is an encoded `RpcBody`.
#[derive(Debug, Default)]
pub struct StreamReassembler {
    buf: Vec<u8>,
}

impl StreamReassembler {
    pub fn new() -> StreamReassembler {
        StreamReassembler { buf: Vec::new() }
    }

    pub fn feed(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Pop one complete length-prefixed chunk, if the buffer holds enough
    /// bytes for it yet.
    pub fn pop_chunk(&mut self) -> Option<Vec<u8>> {
        if self.buf.len() < 4 {
            return None;
        }
        let len = u32::from_be_bytes(self.buf[0..4].try_into().expect("checked above")) as usize;
        if self.buf.len() < 4 + len {
            return None;
        }
        let chunk = self.buf[4..4 + len].to_vec();
        self.buf.drain(0..4 + len);
        Some(chunk)
    }

    pub fn pending_bytes(&self) -> usize {
        self.buf.len()
    }
}

/// Encode a byte payload with its `u32` big-endian length prefix, the wire
/// shape every TCP frame after the handshake uses.
pub fn frame_chunk(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + payload.len());
    out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    out.extend_from_slice(payload);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pop_chunk_returns_none_until_the_full_chunk_has_arrived() {
        let mut r = StreamReassembler::new();
        let framed = frame_chunk(b"hello");
        r.feed(&framed[..4]);
        assert!(r.pop_chunk().is_none());
        r.feed(&framed[4..]);
        assert_eq!(r.pop_chunk(), Some(b"hello".to_vec()));
    }

    #[test]
    fn multiple_chunks_in_one_feed_pop_one_at_a_time() {
        let mut r = StreamReassembler::new();
        let mut bytes = frame_chunk(b"a");
        bytes.extend(frame_chunk(b"bb"));
        r.feed(&bytes);
        assert_eq!(r.pop_chunk(), Some(b"a".to_vec()));
        assert_eq!(r.pop_chunk(), Some(b"bb".to_vec()));
        assert_eq!(r.pop_chunk(), None);
    }

    #[test]
    fn empty_chunk_is_valid() {
        let mut r = StreamReassembler::new();
        r.feed(&frame_chunk(b""));
        assert_eq!(r.pop_chunk(), Some(Vec::new()));
    }

    #[test]
    fn partial_length_prefix_itself_yields_none() {
        let mut r = StreamReassembler::new();
        r.feed(&[0, 0]);
        assert!(r.pop_chunk().is_none());
    }
}
