//! Type-tagged, big-endian, length-prefixed packet codec.
//!
//! Grounded on `t51core::net::buffer`/`net::frame` from the teacher, but
//! generalized: the teacher's `Buffer` is a raw `io::Read`/`io::Write` byte
//! queue feeding a socket, while `Packet` here is the self-describing,
//! validity-latched value type spec.md §3/§4.2 asks for — the thing that
//! sits *inside* a wire frame, not the socket-facing queue itself.

mod value;

pub use value::WireValue;

use std::io;

/// Error returned by the throwing extraction facade (`Packet::extract_or_throw`).
#[derive(Debug, thiserror::Error, Eq, PartialEq, Clone, Copy)]
pub enum PacketError {
    /// The packet's validity flag was already latched, or this extraction
    /// would have read past the end of the buffer.
    #[error("packet extraction failed: not enough data, or a prior extraction already failed")]
    Invalid,
}

/// A growable byte buffer with a read cursor and a latched validity flag.
///
/// Writes never fail. Reads in the default (non-throwing) mode latch the
/// validity flag to `false` on any failed extraction; every subsequent read
/// is then a no-op that returns a zeroed value, matching spec.md §3's
/// Packet invariant. `clear()` is the only way to reset the flag.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Packet {
    buf: Vec<u8>,
    cursor: usize,
    valid: bool,
}

impl Packet {
    /// Construct an empty, valid packet.
    #[inline]
    pub fn new() -> Packet {
        Packet {
            buf: Vec::new(),
            cursor: 0,
            valid: true,
        }
    }

    /// Construct a packet pre-seeded with an encoded byte buffer (cursor at
    /// the start, valid). Used when a frame of bytes arrives off the wire
    /// and needs to be decoded.
    #[inline]
    pub fn from_bytes(buf: Vec<u8>) -> Packet {
        Packet {
            buf,
            cursor: 0,
            valid: true,
        }
    }

    /// Reset the packet to an empty, valid state. The only way to clear a
    /// latched validity flag.
    #[inline]
    pub fn clear(&mut self) {
        self.buf.clear();
        self.cursor = 0;
        self.valid = true;
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Number of bytes not yet consumed by `extract*`.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.cursor
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Full encoded contents (ignores the read cursor). Used to hand the
    /// packet to a transport send buffer.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    #[inline]
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    fn invalidate(&mut self) {
        self.valid = false;
    }

    fn take(&mut self, n: usize) -> Option<&[u8]> {
        if !self.valid {
            return None;
        }
        if self.remaining() < n {
            self.invalidate();
            return None;
        }
        let start = self.cursor;
        self.cursor += n;
        Some(&self.buf[start..self.cursor])
    }

    /// Append any arithmetic `WireValue` in network byte order. Writes never fail.
    #[inline]
    pub fn append<T: WireValue>(&mut self, value: T) {
        value.encode(&mut self.buf);
    }

    /// Non-throwing extraction. Once the validity flag is latched, every
    /// subsequent call is a no-op returning `T::zero()`.
    #[inline]
    pub fn extract<T: WireValue>(&mut self) -> T {
        self.try_extract().unwrap_or_else(|_| T::zero())
    }

    /// Throwing extraction facade for callers that prefer `Result` over the
    /// latched-flag style. Does not itself un-latch a previously failed
    /// packet — use `clear()` for that.
    pub fn try_extract<T: WireValue>(&mut self) -> Result<T, PacketError> {
        if !self.valid {
            return Err(PacketError::Invalid);
        }
        let bytes = self.take(T::SIZE).ok_or(PacketError::Invalid)?;
        Ok(T::decode(bytes))
    }

    /// Append raw bytes with no length prefix.
    #[inline]
    pub fn append_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Extract exactly `n` raw bytes with no length prefix.
    pub fn try_extract_bytes(&mut self, n: usize) -> Result<Vec<u8>, PacketError> {
        if !self.valid {
            return Err(PacketError::Invalid);
        }
        let bytes = self.take(n).ok_or(PacketError::Invalid)?;
        Ok(bytes.to_vec())
    }

    /// A `u32`-length-prefixed, raw-UTF-8-encoded string.
    pub fn append_string(&mut self, s: &str) {
        let bytes = s.as_bytes();
        self.append(bytes.len() as u32);
        self.append_bytes(bytes);
    }

    /// Throwing extraction of a `append_string`-encoded string.
    pub fn try_extract_string(&mut self) -> Result<String, PacketError> {
        if !self.valid {
            return Err(PacketError::Invalid);
        }
        let len = self.try_extract::<u32>()? as usize;
        let bytes = self.try_extract_bytes(len)?;
        String::from_utf8(bytes).map_err(|_| {
            self.invalidate();
            PacketError::Invalid
        })
    }

    /// Non-throwing string extraction; returns `""` once latched.
    pub fn extract_string(&mut self) -> String {
        self.try_extract_string().unwrap_or_default()
    }

    /// An `i32`-byte-length-prefixed nested packet.
    pub fn append_packet(&mut self, nested: &Packet) {
        self.append(nested.buf.len() as i32);
        self.append_bytes(&nested.buf);
    }

    /// Throwing extraction of a nested, `append_packet`-encoded packet.
    pub fn try_extract_packet(&mut self) -> Result<Packet, PacketError> {
        if !self.valid {
            return Err(PacketError::Invalid);
        }
        let len = self.try_extract::<i32>()?;
        if len < 0 {
            self.invalidate();
            return Err(PacketError::Invalid);
        }
        let bytes = self.try_extract_bytes(len as usize)?;
        Ok(Packet::from_bytes(bytes))
    }

    /// Non-throwing nested-packet extraction; returns an empty, already
    /// invalid packet once latched.
    pub fn extract_packet(&mut self) -> Packet {
        match self.try_extract_packet() {
            Ok(p) => p,
            Err(_) => {
                let mut p = Packet::new();
                p.invalidate();
                p
            }
        }
    }
}

impl io::Write for Packet {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.append_bytes(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn roundtrip_every_arithmetic_type() {
        let mut p = Packet::new();
        p.append(-1i8);
        p.append(2u8);
        p.append(-3i16);
        p.append(4u16);
        p.append(-5i32);
        p.append(0xDEAD_BEEFu32);
        p.append(-7i64);
        p.append(8u64);
        p.append(3.5f32);
        p.append(std::f64::consts::PI);
        p.append(true);
        p.append(false);

        assert_eq!(p.extract::<i8>(), -1);
        assert_eq!(p.extract::<u8>(), 2);
        assert_eq!(p.extract::<i16>(), -3);
        assert_eq!(p.extract::<u16>(), 4);
        assert_eq!(p.extract::<i32>(), -5);
        assert_eq!(p.extract::<u32>(), 0xDEAD_BEEF);
        assert_eq!(p.extract::<i64>(), -7);
        assert_eq!(p.extract::<u64>(), 8);
        assert_eq!(p.extract::<f32>(), 3.5);
        assert_eq!(p.extract::<f64>(), std::f64::consts::PI);
        assert_eq!(p.extract::<bool>(), true);
        assert_eq!(p.extract::<bool>(), false);
        assert!(p.is_valid());
        assert_eq!(p.remaining(), 0);
    }

    #[test]
    fn scenario_s5_mixed_sequence_with_unicode_and_nested_packet() {
        let mut inner = Packet::new();
        inner.append(true);

        let mut p = Packet::new();
        p.append(-1i8);
        p.append(0xDEAD_BEEFu32);
        p.append(std::f64::consts::PI);
        p.append_string("čćšđž");
        p.append_packet(&inner);

        assert_eq!(p.extract::<i8>(), -1);
        assert_eq!(p.extract::<u32>(), 0xDEAD_BEEF);
        assert_eq!(p.extract::<f64>(), std::f64::consts::PI);
        assert_eq!(p.extract_string(), "čćšđž");
        let mut extracted_inner = p.extract_packet();
        assert_eq!(extracted_inner.extract::<bool>(), true);
        assert!(p.is_valid());
    }

    #[test]
    fn clear_resets_buffer_and_validity() {
        let mut p = Packet::new();
        p.append(1u32);
        p.clear();
        assert!(p.is_empty());
        assert!(p.is_valid());
        assert_eq!(p.remaining(), 0);
    }

    #[test]
    fn failed_extraction_latches_and_subsequent_reads_are_zeroed_no_ops() {
        let mut p = Packet::new();
        p.append(1u8);

        // Ask for a u32 when only one byte remains: latches invalid.
        assert_eq!(p.extract::<u32>(), 0);
        assert!(!p.is_valid());

        // Further reads are no-ops returning zero, never panicking.
        assert_eq!(p.extract::<u64>(), 0);
        assert_eq!(p.extract_string(), "");
        assert!(!p.is_valid());
    }

    #[test]
    fn extraction_at_exact_zero_remaining_bytes_is_invalid() {
        let mut p = Packet::new();
        assert!(matches!(p.try_extract::<u8>(), Err(PacketError::Invalid)));
        assert!(!p.is_valid());
    }

    #[test]
    fn throwing_facade_does_not_panic_and_reports_err() {
        let mut p = Packet::new();
        assert_eq!(p.try_extract::<i64>(), Err(PacketError::Invalid));
    }

    proptest! {
        #[test]
        fn roundtrip_u32_is_identity(value: u32) {
            let mut p = Packet::new();
            p.append(value);
            prop_assert_eq!(p.extract::<u32>(), value);
        }

        #[test]
        fn roundtrip_i64_is_identity(value: i64) {
            let mut p = Packet::new();
            p.append(value);
            prop_assert_eq!(p.extract::<i64>(), value);
        }

        #[test]
        fn roundtrip_string_is_identity(value in "\\PC*") {
            let mut p = Packet::new();
            p.append_string(&value);
            prop_assert_eq!(p.extract_string(), value);
        }
    }
}
