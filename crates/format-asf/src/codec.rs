//! Big-endian cursors over chunk payloads.
//!
//! Both cursors are infallible. A writer that runs out of room drops the
//! excess and raises [`ByteWriter::overflowed`]; a reader that runs past the
//! end yields zero bytes and raises [`ByteReader::overrun`]. Payload buffers
//! are sized from [`crate::Snapshottable::state_size`], so either flag means a
//! sizing bug on the save side or a short chunk on the restore side.

/// Write cursor over a caller-provided byte region.
pub struct ByteWriter<'a> {
    buf: &'a mut [u8],
    pos: usize,
    overflowed: bool,
}

impl<'a> ByteWriter<'a> {
    #[must_use]
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self {
            buf,
            pos: 0,
            overflowed: false,
        }
    }

    pub fn write_u8(&mut self, value: u8) {
        self.put(&[value]);
    }

    pub fn write_u16(&mut self, value: u16) {
        self.put(&value.to_be_bytes());
    }

    pub fn write_u32(&mut self, value: u32) {
        self.put(&value.to_be_bytes());
    }

    pub fn write_bool(&mut self, value: bool) {
        self.write_u8(u8::from(value));
    }

    /// Copy `text` followed by a single NUL terminator.
    ///
    /// Text is cut at its first interior NUL so the terminator stays unique.
    pub fn write_string(&mut self, text: &str) {
        let bytes = text.as_bytes();
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        self.put(&bytes[..end]);
        self.put(&[0]);
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.put(bytes);
    }

    /// Bytes written so far.
    #[must_use]
    pub fn position(&self) -> usize {
        self.pos
    }

    #[must_use]
    pub fn overflowed(&self) -> bool {
        self.overflowed
    }

    /// The written prefix of the underlying region.
    #[must_use]
    pub fn written(&self) -> &[u8] {
        &self.buf[..self.pos]
    }

    fn put(&mut self, bytes: &[u8]) {
        let room = self.buf.len() - self.pos;
        let n = bytes.len().min(room);
        self.buf[self.pos..self.pos + n].copy_from_slice(&bytes[..n]);
        self.pos += n;
        if n < bytes.len() {
            self.overflowed = true;
        }
    }
}

/// Read cursor over a chunk payload.
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
    overrun: bool,
}

impl<'a> ByteReader<'a> {
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            overrun: false,
        }
    }

    pub fn read_u8(&mut self) -> u8 {
        let [b] = self.take::<1>();
        b
    }

    pub fn read_u16(&mut self) -> u16 {
        u16::from_be_bytes(self.take::<2>())
    }

    pub fn read_u32(&mut self) -> u32 {
        u32::from_be_bytes(self.take::<4>())
    }

    pub fn read_bool(&mut self) -> bool {
        self.read_u8() != 0
    }

    /// Read a NUL-terminated string and advance past the terminator.
    ///
    /// The text is copied out, so it outlives the payload buffer. Invalid
    /// UTF-8 is replaced rather than rejected; a missing terminator consumes
    /// the rest of the payload and flags an overrun.
    pub fn read_string(&mut self) -> String {
        let rest = &self.data[self.pos..];
        match rest.iter().position(|&b| b == 0) {
            Some(end) => {
                self.pos += end + 1;
                String::from_utf8_lossy(&rest[..end]).into_owned()
            }
            None => {
                self.pos = self.data.len();
                self.overrun = true;
                String::from_utf8_lossy(rest).into_owned()
            }
        }
    }

    /// Fill `out` from the payload; bytes past the end read as zero.
    pub fn read_bytes(&mut self, out: &mut [u8]) {
        let n = out.len().min(self.remaining());
        out[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
        out[n..].fill(0);
        self.pos += n;
        if n < out.len() {
            self.overrun = true;
        }
    }

    pub fn skip(&mut self, count: usize) {
        let n = count.min(self.remaining());
        self.pos += n;
        if n < count {
            self.overrun = true;
        }
    }

    /// Bytes consumed so far.
    #[must_use]
    pub fn position(&self) -> usize {
        self.pos
    }

    #[must_use]
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    #[must_use]
    pub fn overrun(&self) -> bool {
        self.overrun
    }

    fn take<const N: usize>(&mut self) -> [u8; N] {
        let mut out = [0u8; N];
        self.read_bytes(&mut out);
        out
    }
}
