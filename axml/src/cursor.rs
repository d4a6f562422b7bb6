//! Sequential integer reader used by every decoder in the crate.

use std::io::{self, Read};

use byteorder::{ReadBytesExt, BE, LE};

use crate::{AxmlError, Result};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Endian {
    Little,
    Big,
}

/// Reads fixed width integers from a byte source, keeping track of how many bytes have been consumed.
/// AXML itself is always little endian, big endian is supported for callers reusing the cursor.
pub struct ByteCursor<R: Read> {
    data: R,
    endian: Endian,
    position: u64,
}

impl<R: Read> ByteCursor<R> {
    pub fn new(data: R, endian: Endian) -> Self {
        Self {
            data,
            endian,
            position: 0,
        }
    }

    /// Creates a little endian cursor, the byte order used by AXML.
    pub fn le(data: R) -> Self {
        Self::new(data, Endian::Little)
    }

    /// The total number of bytes consumed so far.
    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn endian(&self) -> Endian {
        self.endian
    }

    pub fn into_inner(self) -> R {
        self.data
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        let value = self.data.read_u8()?;
        self.position += 1;
        Ok(value)
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        let value = match self.endian {
            Endian::Little => self.data.read_u16::<LE>()?,
            Endian::Big => self.data.read_u16::<BE>()?,
        };
        self.position += 2;
        Ok(value)
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let value = match self.endian {
            Endian::Little => self.data.read_u32::<LE>()?,
            Endian::Big => self.data.read_u32::<BE>()?,
        };
        self.position += 4;
        Ok(value)
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(self.read_u32()? as i32)
    }

    /// Reads an unsigned integer that is `width` bytes wide.
    /// Only widths of 1 to 4 bytes are supported.
    pub fn read_int(&mut self, width: usize) -> Result<u32> {
        if !(1..=4).contains(&width) {
            return Err(AxmlError::InvalidArgument(format!(
                "cannot read an integer {width} bytes wide"
            )));
        }

        let value = match self.endian {
            Endian::Little => self.data.read_uint::<LE>(width)?,
            Endian::Big => self.data.read_uint::<BE>(width)?,
        };
        self.position += width as u64;
        Ok(value as u32)
    }

    /// Reads `count` consecutive 32 bit integers.
    pub fn read_int_array(&mut self, count: usize) -> Result<Vec<u32>> {
        // `count` usually comes straight from the input, so don't trust it for the allocation.
        let mut result = Vec::with_capacity(count.min(4096));
        for _ in 0..count {
            result.push(self.read_u32()?);
        }

        Ok(result)
    }

    /// Reads exactly `len` bytes.
    pub fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>> {
        let mut buffer = Vec::with_capacity(len.min(1 << 20));
        let read = (&mut self.data).take(len as u64).read_to_end(&mut buffer)?;
        if read != len {
            return Err(AxmlError::UnexpectedEndOfInput);
        }

        self.position += len as u64;
        Ok(buffer)
    }

    /// Discards exactly `len` bytes.
    pub fn skip(&mut self, len: u64) -> Result<()> {
        if len == 0 {
            return Ok(());
        }

        let skipped = io::copy(&mut (&mut self.data).take(len), &mut io::sink())?;
        if skipped != len {
            return Err(AxmlError::UnexpectedEndOfInput);
        }

        self.position += len;
        Ok(())
    }

    pub fn skip_u32(&mut self) -> Result<()> {
        self.skip(4)
    }

    /// Reads a 32 bit integer, or returns `None` if the source is exhausted before its first byte.
    /// A source that ends part way through the integer is still an error.
    pub fn try_read_u32(&mut self) -> Result<Option<u32>> {
        let mut first = [0u8; 1];
        loop {
            match self.data.read(&mut first) {
                Ok(0) => return Ok(None),
                Ok(_) => break,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err.into()),
            }
        }

        let mut rest = [0u8; 3];
        self.data.read_exact(&mut rest)?;
        self.position += 4;

        let bytes = [first[0], rest[0], rest[1], rest[2]];
        Ok(Some(match self.endian {
            Endian::Little => u32::from_le_bytes(bytes),
            Endian::Big => u32::from_be_bytes(bytes),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_big_endian() {
        let data = [0x01u8, 0x02, 0x01, 0x02, 0x03, 0x04, 0x05];
        let mut cursor = ByteCursor::new(&data[..], Endian::Big);

        assert_eq!(cursor.read_u16().unwrap(), 0x0102);
        assert_eq!(cursor.read_u32().unwrap(), 0x01020304);
        assert_eq!(cursor.read_u8().unwrap(), 0x05);
        assert_eq!(cursor.position(), 7);
    }

    #[test]
    fn read_int_honours_endianness() {
        let data = [0x0Au8, 0x14, 0x1E, 0x28];

        let mut big = ByteCursor::new(&data[..], Endian::Big);
        assert_eq!(big.read_int(1).unwrap(), 0x0A);
        assert_eq!(big.read_int(3).unwrap(), 0x141E28);

        let mut little = ByteCursor::new(&data[..], Endian::Little);
        assert_eq!(little.read_int(1).unwrap(), 0x0A);
        assert_eq!(little.read_int(3).unwrap(), 0x281E14);
    }

    #[test]
    fn read_int_rejects_bad_widths() {
        let data = [0u8; 8];
        let mut cursor = ByteCursor::le(&data[..]);

        assert!(matches!(cursor.read_int(0), Err(AxmlError::InvalidArgument(_))));
        assert!(matches!(cursor.read_int(5), Err(AxmlError::InvalidArgument(_))));
        assert_eq!(cursor.position(), 0);
    }

    #[test]
    fn short_reads_fail() {
        let data = [0x01u8];
        let mut cursor = ByteCursor::le(&data[..]);
        assert!(matches!(cursor.read_int(2), Err(AxmlError::UnexpectedEndOfInput)));

        let mut cursor = ByteCursor::le(&data[..]);
        assert!(matches!(cursor.read_u32(), Err(AxmlError::UnexpectedEndOfInput)));
    }

    #[test]
    fn skips() {
        let data = [0u8; 12];
        let mut cursor = ByteCursor::le(&data[..]);

        cursor.skip(0).unwrap();
        cursor.skip(8).unwrap();
        cursor.skip_u32().unwrap();
        assert_eq!(cursor.position(), 12);

        assert!(matches!(cursor.skip_u32(), Err(AxmlError::UnexpectedEndOfInput)));
    }

    #[test]
    fn partial_skip_fails() {
        let data = [0u8; 3];
        let mut cursor = ByteCursor::le(&data[..]);
        assert!(matches!(cursor.skip(4), Err(AxmlError::UnexpectedEndOfInput)));
    }

    #[test]
    fn int_array() {
        let data = [1u8, 0, 0, 0, 2, 0, 0, 0];
        let mut cursor = ByteCursor::le(&data[..]);
        assert_eq!(cursor.read_int_array(2).unwrap(), vec![1, 2]);
        assert!(cursor.read_int_array(1).is_err());
    }

    #[test]
    fn try_read_at_end() {
        let data = [4u8, 0, 0, 0, 9];
        let mut cursor = ByteCursor::le(&data[..]);

        assert_eq!(cursor.try_read_u32().unwrap(), Some(4));
        assert!(matches!(cursor.try_read_u32(), Err(AxmlError::UnexpectedEndOfInput)));

        let empty: [u8; 0] = [];
        let mut cursor = ByteCursor::le(&empty[..]);
        assert_eq!(cursor.try_read_u32().unwrap(), None);
    }

    #[test]
    fn read_bytes_exact() {
        let data = [1u8, 2, 3];
        let mut cursor = ByteCursor::le(&data[..]);
        assert_eq!(cursor.read_bytes(2).unwrap(), vec![1, 2]);
        assert!(matches!(cursor.read_bytes(2), Err(AxmlError::UnexpectedEndOfInput)));
    }
}
