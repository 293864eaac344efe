use crate::{
    varint::{decode_varint, encode_varint},
    MspErr,
};

/// Consumed prefix size after which appending compacts the buffer.
const COMPACT_THRESHOLD: usize = 4096;

/// In-memory byte buffer with typed read/write primitives.
///
/// Reads consume from the front by advancing a read offset, writes append to the back.
/// The consumed prefix is dropped lazily when new data is appended, so repeated small
/// reads never shift the whole buffer.
///
/// Reading more than is buffered is a [MspErr::BufferUnderflow] and leaves the cursor
/// where it was, so a stream reader can wait for more bytes and retry.
#[derive(Debug, Default, Clone)]
pub struct ByteCursor {
    data: Vec<u8>,
    pos: usize,
}

macro_rules! number_rw {
    ($($ty:ty: $read_be:ident, $read_le:ident, $write_be:ident, $write_le:ident;)*) => {
        $(
            pub fn $read_be(&mut self) -> Result<$ty, MspErr> {
                Ok(<$ty>::from_be_bytes(self.read_array()?))
            }

            pub fn $read_le(&mut self) -> Result<$ty, MspErr> {
                Ok(<$ty>::from_le_bytes(self.read_array()?))
            }

            pub fn $write_be(&mut self, value: $ty) {
                self.data.extend_from_slice(&value.to_be_bytes());
            }

            pub fn $write_le(&mut self, value: $ty) {
                self.data.extend_from_slice(&value.to_le_bytes());
            }
        )*
    };
}

impl ByteCursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Unread bytes.
    pub fn len(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Unread bytes as a slice.
    pub fn as_slice(&self) -> &[u8] {
        &self.data[self.pos..]
    }

    /// Current read offset. Only valid until the next append, which may compact.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Rewind (or advance) to an offset previously returned by [ByteCursor::position].
    pub fn set_position(&mut self, pos: usize) {
        self.pos = pos.min(self.data.len());
    }

    /// Append received bytes, dropping the consumed prefix first if it got large.
    pub fn extend_from_slice(&mut self, bufs: &[u8]) {
        if self.pos >= COMPACT_THRESHOLD && self.pos * 2 >= self.data.len() {
            self.compact();
        }

        self.data.extend_from_slice(bufs);
    }

    /// Drop every consumed byte.
    pub fn compact(&mut self) {
        self.data.drain(..self.pos);
        self.pos = 0;
    }

    /// Take every unread byte, leaving the cursor empty.
    pub fn take_all(&mut self) -> Vec<u8> {
        let mut data = std::mem::take(&mut self.data);

        data.drain(..self.pos);
        self.pos = 0;

        data
    }

    pub fn clear(&mut self) {
        self.data.clear();
        self.pos = 0;
    }

    fn ensure(&self, needed: usize) -> Result<(), MspErr> {
        match self.len() {
            available if available < needed => Err(MspErr::BufferUnderflow { needed, available }),
            _ => Ok(()),
        }
    }

    /// Look at an unread byte without consuming it.
    pub fn peek(&self, offset: usize) -> Result<u8, MspErr> {
        self.ensure(offset + 1)?;

        Ok(self.data[self.pos + offset])
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], MspErr> {
        self.ensure(N)?;

        let mut bufs = [0u8; N];

        bufs.copy_from_slice(&self.data[self.pos..self.pos + N]);
        self.pos += N;

        Ok(bufs)
    }

    pub fn read_bytes(&mut self, size: usize) -> Result<Vec<u8>, MspErr> {
        self.ensure(size)?;

        let bufs = self.data[self.pos..self.pos + size].to_vec();
        self.pos += size;

        Ok(bufs)
    }

    pub fn skip(&mut self, size: usize) -> Result<(), MspErr> {
        self.ensure(size)?;
        self.pos += size;

        Ok(())
    }

    pub fn read_u8(&mut self) -> Result<u8, MspErr> {
        Ok(self.read_array::<1>()?[0])
    }

    pub fn read_i8(&mut self) -> Result<i8, MspErr> {
        Ok(self.read_u8()? as i8)
    }

    number_rw! {
        u16: read_u16_be, read_u16_le, write_u16_be, write_u16_le;
        i16: read_i16_be, read_i16_le, write_i16_be, write_i16_le;
        u32: read_u32_be, read_u32_le, write_u32_be, write_u32_le;
        i32: read_i32_be, read_i32_le, write_i32_be, write_i32_le;
        u64: read_u64_be, read_u64_le, write_u64_be, write_u64_le;
        i64: read_i64_be, read_i64_le, write_i64_be, write_i64_le;
        f32: read_f32_be, read_f32_le, write_f32_be, write_f32_le;
        f64: read_f64_be, read_f64_le, write_f64_be, write_f64_le;
    }

    pub fn read_varint(&mut self) -> Result<i32, MspErr> {
        let (value, size) = decode_varint(self.as_slice())?;
        self.pos += size;

        Ok(value)
    }

    /// UTF-8 string of a known byte length.
    pub fn read_string(&mut self, size: usize) -> Result<String, MspErr> {
        Ok(String::from_utf8_lossy(&self.read_bytes(size)?).into_owned())
    }

    /// UTF-8 string prefixed with its byte length as a VarInt.
    pub fn read_string_varint(&mut self) -> Result<String, MspErr> {
        let start = self.pos;
        let size = self.read_varint()?;

        if size < 0 {
            self.pos = start;

            return Err(MspErr::MalformedResponse(format!(
                "negative string length: {}",
                size
            )));
        }

        match self.read_string(size as usize) {
            Ok(value) => Ok(value),
            Err(err) => {
                self.pos = start;

                Err(err)
            }
        }
    }

    /// UTF-8 string terminated by `terminator`, which is consumed but not returned.
    pub fn read_string_until(&mut self, terminator: u8) -> Result<String, MspErr> {
        let bufs = self.as_slice();

        match bufs.iter().position(|&b| b == terminator) {
            Some(idx) => {
                let value = String::from_utf8_lossy(&bufs[..idx]).into_owned();
                self.pos += idx + 1;

                Ok(value)
            }
            None => Err(MspErr::BufferUnderflow {
                needed: bufs.len() + 1,
                available: bufs.len(),
            }),
        }
    }

    /// Null-terminated UTF-8 string.
    pub fn read_string_nt(&mut self) -> Result<String, MspErr> {
        self.read_string_until(0x00)
    }

    /// Null-terminated string, one code point per byte.
    ///
    /// Query servers write their strings byte-wise, other tools read them the same way.
    pub fn read_string_nt_latin1(&mut self) -> Result<String, MspErr> {
        let bufs = self.as_slice();

        match bufs.iter().position(|&b| b == 0x00) {
            Some(idx) => {
                let value = latin1_to_string(&bufs[..idx]);
                self.pos += idx + 1;

                Ok(value)
            }
            None => Err(MspErr::BufferUnderflow {
                needed: bufs.len() + 1,
                available: bufs.len(),
            }),
        }
    }

    /// Null-terminated string (one code point per byte) whose terminator is the first
    /// `0x00` immediately followed by one of `suffixes`.
    ///
    /// Any other `0x00` is kept as part of the value. The suffix itself is not consumed.
    pub fn read_string_nt_followed_by(&mut self, suffixes: &[&[u8]]) -> Result<String, MspErr> {
        let bufs = self.as_slice();
        let mut idx = 0;

        loop {
            let Some(&buf) = bufs.get(idx) else {
                return Err(MspErr::BufferUnderflow {
                    needed: idx + 1,
                    available: bufs.len(),
                });
            };

            if buf == 0x00 {
                match match_suffix(&bufs[idx + 1..], suffixes) {
                    Some(true) => break,
                    Some(false) => {}
                    None => {
                        return Err(MspErr::BufferUnderflow {
                            needed: bufs.len() + 1,
                            available: bufs.len(),
                        })
                    }
                }
            }

            idx += 1;
        }

        let value = latin1_to_string(&bufs[..idx]);
        self.pos += idx + 1;

        Ok(value)
    }

    /// `code_units` UTF-16BE code units.
    pub fn read_utf16_be(&mut self, code_units: usize) -> Result<String, MspErr> {
        let bufs = self.read_bytes(code_units * 2)?;

        Ok(utf16_be_to_string(&bufs))
    }

    pub fn write_u8(&mut self, value: u8) {
        self.data.push(value);
    }

    pub fn write_i8(&mut self, value: i8) {
        self.data.push(value as u8);
    }

    pub fn write_bytes(&mut self, bufs: &[u8]) {
        self.data.extend_from_slice(bufs);
    }

    pub fn write_varint(&mut self, value: i32) {
        self.data.append(&mut encode_varint(value));
    }

    /// Raw UTF-8 bytes, no length or terminator.
    pub fn write_string_bytes(&mut self, value: &str) {
        self.data.extend_from_slice(value.as_bytes());
    }

    pub fn write_string_varint(&mut self, value: &str) {
        self.write_varint(value.len() as i32);
        self.write_string_bytes(value);
    }

    pub fn write_string_nt(&mut self, value: &str) {
        self.write_string_bytes(value);
        self.data.push(0x00);
    }

    pub fn write_utf16_be(&mut self, value: &str) {
        for unit in value.encode_utf16() {
            self.data.extend_from_slice(&unit.to_be_bytes());
        }
    }
}

impl From<Vec<u8>> for ByteCursor {
    fn from(data: Vec<u8>) -> Self {
        Self { data, pos: 0 }
    }
}

impl From<&[u8]> for ByteCursor {
    fn from(data: &[u8]) -> Self {
        data.to_vec().into()
    }
}

/// `Some(true)` once a suffix matches, `Some(false)` when none can, `None` when more
/// bytes are needed to decide.
fn match_suffix(upcoming: &[u8], suffixes: &[&[u8]]) -> Option<bool> {
    let mut undecided = false;

    for suffix in suffixes {
        if upcoming.len() >= suffix.len() {
            if upcoming.starts_with(suffix) {
                return Some(true);
            }
        } else if suffix.starts_with(upcoming) {
            undecided = true;
        }
    }

    match undecided {
        true => None,
        false => Some(false),
    }
}

pub fn latin1_to_string(bufs: &[u8]) -> String {
    bufs.iter().map(|&b| b as char).collect()
}

pub fn utf16_be_to_string(bufs: &[u8]) -> String {
    String::from_utf16_lossy(
        bufs.chunks_exact(2)
            .map(|x| u16::from_be_bytes([x[0], x[1]]))
            .collect::<Vec<_>>()
            .as_slice(),
    )
}
