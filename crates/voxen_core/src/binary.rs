//! Big-endian primitives for the binary companion files.

use std::io::{self, Read, Write};

macro_rules! be_codec {
    ($read:ident, $write:ident, $ty:ty) => {
        pub fn $read<R: Read + ?Sized>(r: &mut R) -> io::Result<$ty> {
            let mut buf = [0u8; std::mem::size_of::<$ty>()];
            r.read_exact(&mut buf)?;
            Ok(<$ty>::from_be_bytes(buf))
        }

        pub fn $write<W: Write + ?Sized>(w: &mut W, value: $ty) -> io::Result<()> {
            w.write_all(&value.to_be_bytes())
        }
    };
}

be_codec!(read_i32, write_i32, i32);
be_codec!(read_i64, write_i64, i64);
be_codec!(read_f32, write_f32, f32);
be_codec!(read_f64, write_f64, f64);

/// Shorthand for an `InvalidData` error.
pub fn invalid_data(msg: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_big_endian_layout() {
        let mut out = Vec::new();
        write_i32(&mut out, 1).unwrap();
        write_i64(&mut out, -2).unwrap();
        assert_eq!(&out[..4], &[0, 0, 0, 1]);
        assert_eq!(out.len(), 12);

        let mut r = Cursor::new(out);
        assert_eq!(read_i32(&mut r).unwrap(), 1);
        assert_eq!(read_i64(&mut r).unwrap(), -2);
        assert!(read_f64(&mut r).is_err());
    }
}
