use byteorder::{BigEndian, ByteOrder};

use crate::error::{Error, Result};

/// Fixed-width integer that can cross the wire in big-endian order.
pub trait WireInt: Sized + Copy {
    const WIDTH: usize;

    fn get(buf: &[u8]) -> Self;
    fn put(self, buf: &mut [u8]);
}

impl WireInt for u16 {
    const WIDTH: usize = 2;

    fn get(buf: &[u8]) -> Self {
        BigEndian::read_u16(buf)
    }

    fn put(self, buf: &mut [u8]) {
        BigEndian::write_u16(buf, self);
    }
}

impl WireInt for u32 {
    const WIDTH: usize = 4;

    fn get(buf: &[u8]) -> Self {
        BigEndian::read_u32(buf)
    }

    fn put(self, buf: &mut [u8]) {
        BigEndian::write_u32(buf, self);
    }
}

impl WireInt for u64 {
    const WIDTH: usize = 8;

    fn get(buf: &[u8]) -> Self {
        BigEndian::read_u64(buf)
    }

    fn put(self, buf: &mut [u8]) {
        BigEndian::write_u64(buf, self);
    }
}

/// Reads the next big-endian value and advances `offset` past it.
///
/// The offset is advanced before the access; a post-advance offset beyond
/// the buffer length fails without reading.
pub fn read_next<T: WireInt>(buf: &[u8], offset: &mut usize) -> Result<T> {
    *offset += T::WIDTH;
    if *offset > buf.len() {
        return Err(Error::ParameterIncorrect("serialized field out of bounds"));
    }
    Ok(T::get(&buf[*offset - T::WIDTH..*offset]))
}

/// Reads a big-endian value at a fixed offset without advancing anything.
/// Used for CRC read-back at a known position.
pub fn read_at<T: WireInt>(buf: &[u8], offset: usize) -> Result<T> {
    if offset + T::WIDTH > buf.len() {
        return Err(Error::ParameterIncorrect("serialized field out of bounds"));
    }
    Ok(T::get(&buf[offset..offset + T::WIDTH]))
}

/// Writes the next big-endian value and advances `offset` past it.
pub fn write_next<T: WireInt>(value: T, buf: &mut [u8], offset: &mut usize) -> Result<()> {
    *offset += T::WIDTH;
    if *offset > buf.len() {
        return Err(Error::ParameterIncorrect("serialized field out of bounds"));
    }
    value.put(&mut buf[*offset - T::WIDTH..*offset]);
    Ok(())
}

/// Writes a big-endian value at a fixed offset.
pub fn write_at<T: WireInt>(value: T, buf: &mut [u8], offset: usize) -> Result<()> {
    if offset + T::WIDTH > buf.len() {
        return Err(Error::ParameterIncorrect("serialized field out of bounds"));
    }
    value.put(&mut buf[offset..offset + T::WIDTH]);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_are_big_endian() {
        let mut buf = [0u8; 8];
        let mut offset = 0;
        write_next::<u16>(0x0102, &mut buf, &mut offset).unwrap();
        write_next::<u32>(0x0304_0506, &mut buf, &mut offset).unwrap();
        assert_eq!(offset, 6);
        assert_eq!(&buf[..6], &[0x01, 0x02, 0x03, 0x04, 0x05, 0x06]);

        let mut offset = 0;
        assert_eq!(read_next::<u16>(&buf, &mut offset).unwrap(), 0x0102);
        assert_eq!(read_next::<u32>(&buf, &mut offset).unwrap(), 0x0304_0506);
        assert_eq!(offset, 6);
    }

    #[test]
    fn read_past_end_fails_and_does_not_wrap() {
        let buf = [0u8; 4];
        let mut offset = 2;
        assert!(read_next::<u32>(&buf, &mut offset).is_err());
        // The failed read still advanced the cursor, as serialization code
        // relies on the advance-then-check contract.
        assert_eq!(offset, 6);
    }

    #[test]
    fn keyed_access_checks_bounds() {
        let buf = [0xAB; 8];
        assert_eq!(read_at::<u64>(&buf, 0).unwrap(), 0xABAB_ABAB_ABAB_ABAB);
        assert!(read_at::<u32>(&buf, 5).is_err());

        let mut buf = [0u8; 8];
        write_at::<u32>(0xDEAD_BEEF, &mut buf, 4).unwrap();
        assert_eq!(&buf[4..], &[0xDE, 0xAD, 0xBE, 0xEF]);
        assert!(write_at::<u32>(0, &mut buf, 6).is_err());
    }
}
