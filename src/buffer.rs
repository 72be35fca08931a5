use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{Error, Result};

/// Fixed-size heap buffer for key material.
///
/// The backing storage is overwritten with zeros when the buffer is dropped;
/// `zeroize` guarantees the wipe survives optimization. The type is
/// deliberately not `Clone`, so key material is never duplicated by accident.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SecureBuffer {
    data: Box<[u8]>,
}

impl SecureBuffer {
    /// Allocates a zero-filled buffer of `size` bytes.
    pub fn new(size: usize) -> Self {
        SecureBuffer {
            data: vec![0u8; size].into_boxed_slice(),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Overwrites the whole buffer with zeros.
    pub fn zero(&mut self) {
        self.data.zeroize();
    }

    /// Copies `source` into the front of the buffer. The source must fit.
    pub fn copy_from(&mut self, source: &[u8]) -> Result<()> {
        if source.len() > self.data.len() {
            return Err(Error::OutOfRange {
                offset: 0,
                len: source.len(),
                size: self.data.len(),
            });
        }
        self.data[..source.len()].copy_from_slice(source);
        Ok(())
    }

    /// Borrows `len` bytes starting at `offset`. A bounded view, not ownership.
    pub fn range(&self, offset: usize, len: usize) -> Result<&[u8]> {
        self.check_range(offset, len)?;
        Ok(&self.data[offset..offset + len])
    }

    pub fn range_mut(&mut self, offset: usize, len: usize) -> Result<&mut [u8]> {
        self.check_range(offset, len)?;
        Ok(&mut self.data[offset..offset + len])
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    fn check_range(&self, offset: usize, len: usize) -> Result<()> {
        let end = offset
            .checked_add(len)
            .ok_or(Error::OutOfRange {
                offset,
                len,
                size: self.data.len(),
            })?;
        if end > self.data.len() {
            return Err(Error::OutOfRange {
                offset,
                len,
                size: self.data.len(),
            });
        }
        Ok(())
    }
}

impl AsRef<[u8]> for SecureBuffer {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copy_and_range() {
        let mut buf = SecureBuffer::new(8);
        buf.copy_from(&[1, 2, 3, 4]).unwrap();
        assert_eq!(buf.range(0, 4).unwrap(), &[1, 2, 3, 4]);
        assert_eq!(buf.range(4, 4).unwrap(), &[0, 0, 0, 0]);
        assert_eq!(buf.len(), 8);
    }

    #[test]
    fn oversized_copy_is_rejected() {
        let mut buf = SecureBuffer::new(4);
        assert!(matches!(
            buf.copy_from(&[0u8; 5]),
            Err(Error::OutOfRange { .. })
        ));
    }

    #[test]
    fn invalid_ranges_are_rejected() {
        let mut buf = SecureBuffer::new(16);
        assert!(buf.range(8, 9).is_err());
        assert!(buf.range(17, 0).is_err());
        assert!(buf.range_mut(usize::MAX, 2).is_err());
        assert!(buf.range(0, 16).is_ok());
    }

    #[test]
    fn zero_wipes_contents() {
        let mut buf = SecureBuffer::new(32);
        buf.copy_from(&[0xA5; 32]).unwrap();
        buf.zero();
        assert!(buf.as_slice().iter().all(|&b| b == 0));
    }
}
