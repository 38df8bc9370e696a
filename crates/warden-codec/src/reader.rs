use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("unexpected end of input at offset {0}")]
    UnexpectedEof(usize),

    #[error("trailing bytes after record ({0} left)")]
    TrailingBytes(usize),

    #[error("invalid UTF-8 in string field")]
    InvalidUtf8,

    #[error("unknown tag {tag} for {what}")]
    UnknownTag { what: &'static str, tag: u8 },

    #[error("invalid optional marker {0:#04x}")]
    InvalidOptionMarker(u8),

    #[error("declared length {0} exceeds remaining input")]
    LengthOverrun(u32),
}

/// Cursor over canonical bytes; the mirror of `CanonicalWriter`.
pub struct CanonicalReader<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> CanonicalReader<'a> {
    pub fn new(input: &'a [u8]) -> Self {
        Self { input, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.input.len() - self.pos
    }

    /// Fail unless every input byte was consumed.
    pub fn finish(self) -> Result<(), CodecError> {
        if self.remaining() != 0 {
            return Err(CodecError::TrailingBytes(self.remaining()));
        }
        Ok(())
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        if self.remaining() < n {
            return Err(CodecError::UnexpectedEof(self.pos));
        }
        let slice = &self.input[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn take_u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.take(1)?[0])
    }

    pub fn take_u32_be(&mut self) -> Result<u32, CodecError> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn take_u64_be(&mut self) -> Result<u64, CodecError> {
        let b = self.take(8)?;
        let mut arr = [0u8; 8];
        arr.copy_from_slice(b);
        Ok(u64::from_be_bytes(arr))
    }

    pub fn take_i64_be(&mut self) -> Result<i64, CodecError> {
        let b = self.take(8)?;
        let mut arr = [0u8; 8];
        arr.copy_from_slice(b);
        Ok(i64::from_be_bytes(arr))
    }

    pub fn take_array<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        let b = self.take(N)?;
        let mut arr = [0u8; N];
        arr.copy_from_slice(b);
        Ok(arr)
    }

    pub fn take_string(&mut self) -> Result<String, CodecError> {
        let len = self.take_u32_be()?;
        if self.remaining() < len as usize {
            return Err(CodecError::LengthOverrun(len));
        }
        let bytes = self.take(len as usize)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| CodecError::InvalidUtf8)
    }

    pub fn take_bytes(&mut self) -> Result<Vec<u8>, CodecError> {
        let len = self.take_u32_be()?;
        if self.remaining() < len as usize {
            return Err(CodecError::LengthOverrun(len));
        }
        Ok(self.take(len as usize)?.to_vec())
    }

    pub fn take_opt<T, F>(&mut self, mut read: F) -> Result<Option<T>, CodecError>
    where
        F: FnMut(&mut Self) -> Result<T, CodecError>,
    {
        match self.take_u8()? {
            0x00 => Ok(None),
            0x01 => Ok(Some(read(self)?)),
            other => Err(CodecError::InvalidOptionMarker(other)),
        }
    }
}
