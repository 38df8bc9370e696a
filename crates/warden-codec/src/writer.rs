use unicode_normalization::UnicodeNormalization;

/// Append-only canonical byte writer.
///
/// Framing rules (shared by every record type):
///   - integers fixed-width big-endian
///   - strings `u32_be length ‖ UTF-8 NFC bytes`
///   - optionals `0x00` absent / `0x01 ‖ value`
///   - maps `u32_be n ‖ n key-sorted (key, value) pairs`
///   - hashes and other fixed-width byte runs raw, no length prefix
///
/// Equal values always produce byte-identical output; hashes and signatures
/// are computed over these bytes and nothing else.
#[derive(Default)]
pub struct CanonicalWriter {
    buf: Vec<u8>,
}

impl CanonicalWriter {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    pub fn with_capacity(cap: usize) -> Self {
        Self {
            buf: Vec::with_capacity(cap),
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn put_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn put_u32_be(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn put_u64_be(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn put_i64_be(&mut self, v: i64) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    /// Raw fixed-width bytes (hashes, token ids, signatures).
    pub fn put_raw(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Length-prefixed NFC-normalized UTF-8 string.
    pub fn put_string(&mut self, s: &str) {
        let normalized: String = s.nfc().collect();
        let bytes = normalized.as_bytes();
        self.put_u32_be(bytes.len() as u32);
        self.buf.extend_from_slice(bytes);
    }

    /// Length-prefixed opaque byte run (payloads).
    pub fn put_bytes(&mut self, bytes: &[u8]) {
        self.put_u32_be(bytes.len() as u32);
        self.buf.extend_from_slice(bytes);
    }

    pub fn put_opt<T: ?Sized, F>(&mut self, value: Option<&T>, mut write: F)
    where
        F: FnMut(&mut Self, &T),
    {
        match value {
            None => self.put_u8(0x00),
            Some(v) => {
                self.put_u8(0x01);
                write(self, v);
            }
        }
    }
}
