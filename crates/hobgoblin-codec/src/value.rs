use byteorder::{BigEndian, ByteOrder};

/// An arithmetic type encodable on the packet wire format: fixed-width,
/// big-endian, with floats reinterpret-cast to same-width integers first
/// (spec.md §3/§4.2). 64-bit integers are split manually by `byteorder`
/// rather than depending on a platform `htonll`.
pub trait WireValue: Sized + Copy {
    /// Encoded width in bytes.
    const SIZE: usize;

    /// The value substituted for a no-op read once a packet's validity flag
    /// is latched.
    fn zero() -> Self;

    fn encode(self, out: &mut Vec<u8>);

    /// `bytes.len()` is guaranteed to equal `Self::SIZE`.
    fn decode(bytes: &[u8]) -> Self;
}

macro_rules! impl_wire_int {
    ($t:ty, $size:expr, $write:ident, $read:ident) => {
        impl WireValue for $t {
            const SIZE: usize = $size;

            #[inline]
            fn zero() -> Self {
                0
            }

            #[inline]
            fn encode(self, out: &mut Vec<u8>) {
                let mut buf = [0u8; $size];
                BigEndian::$write(&mut buf, self);
                out.extend_from_slice(&buf);
            }

            #[inline]
            fn decode(bytes: &[u8]) -> Self {
                BigEndian::$read(bytes)
            }
        }
    };
}

impl WireValue for i8 {
    const SIZE: usize = 1;

    #[inline]
    fn zero() -> Self {
        0
    }

    #[inline]
    fn encode(self, out: &mut Vec<u8>) {
        out.push(self as u8);
    }

    #[inline]
    fn decode(bytes: &[u8]) -> Self {
        bytes[0] as i8
    }
}

impl WireValue for u8 {
    const SIZE: usize = 1;

    #[inline]
    fn zero() -> Self {
        0
    }

    #[inline]
    fn encode(self, out: &mut Vec<u8>) {
        out.push(self);
    }

    #[inline]
    fn decode(bytes: &[u8]) -> Self {
        bytes[0]
    }
}

impl_wire_int!(u16, 2, write_u16, read_u16);
impl_wire_int!(i16, 2, write_i16, read_i16);
impl_wire_int!(u32, 4, write_u32, read_u32);
impl_wire_int!(i32, 4, write_i32, read_i32);
impl_wire_int!(u64, 8, write_u64, read_u64);
impl_wire_int!(i64, 8, write_i64, read_i64);

impl WireValue for f32 {
    const SIZE: usize = 4;

    #[inline]
    fn zero() -> Self {
        0.0
    }

    #[inline]
    fn encode(self, out: &mut Vec<u8>) {
        self.to_bits().encode(out);
    }

    #[inline]
    fn decode(bytes: &[u8]) -> Self {
        f32::from_bits(u32::decode(bytes))
    }
}

impl WireValue for f64 {
    const SIZE: usize = 8;

    #[inline]
    fn zero() -> Self {
        0.0
    }

    #[inline]
    fn encode(self, out: &mut Vec<u8>) {
        self.to_bits().encode(out);
    }

    #[inline]
    fn decode(bytes: &[u8]) -> Self {
        f64::from_bits(u64::decode(bytes))
    }
}

impl WireValue for bool {
    const SIZE: usize = 1;

    #[inline]
    fn zero() -> Self {
        false
    }

    #[inline]
    fn encode(self, out: &mut Vec<u8>) {
        out.push(if self { 1 } else { 0 });
    }

    #[inline]
    fn decode(bytes: &[u8]) -> Self {
        bytes[0] != 0
    }
}
