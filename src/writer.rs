use alloc::vec::Vec;
use zerocopy::IntoBytes;

use crate::WORD_SIZE;

/// Result type for `WordWriter` operations.
pub type Result<T> = core::result::Result<T, WriterError>;

/// Capacity used by [`WordWriter::new`], in bytes.
pub const DEFAULT_CAPACITY_BYTES: u64 = 1 << 24;

/// Largest capacity accepted by [`WordWriter::with_capacity`], in bytes. Every offset and length
/// in the encoding has to fit in a single 32-bit word.
pub const MAX_CAPACITY_BYTES: u64 = (1 << 32) - 1;

/// Encodes values into a flat buffer of 32-bit words.
///
/// The writer has a fixed capacity, chosen at construction. The backing storage grows on demand
/// up to that capacity, so a large capacity does not cost anything until it is used. A primitive
/// write that would go past the capacity fails with [`WriterError::BufferExhausted`] and leaves
/// the cursor where it was. A sequence that fails partway keeps whatever it had already written;
/// call `reset` to start over.
///
/// Nothing in the output identifies the type of a value. Callers must read values back with
/// [`WordReader`](crate::WordReader) in the same order and with the same types used here.
pub struct WordWriter {
    /// Bytes written so far. The length is the high-water mark, which can be past the cursor
    /// after a call to `reset`.
    out: Vec<u8>,

    /// The cursor, in words.
    index: usize,

    capacity_words: usize,
}

impl WordWriter {
    /// Creates a writer with a capacity of [`DEFAULT_CAPACITY_BYTES`].
    pub fn new() -> Self {
        log::trace!("new WordWriter, capacity {DEFAULT_CAPACITY_BYTES} bytes");
        Self {
            out: Vec::new(),
            index: 0,
            capacity_words: (DEFAULT_CAPACITY_BYTES / WORD_SIZE as u64) as usize,
        }
    }

    /// Creates a writer that can hold at most `capacity_bytes` bytes.
    ///
    /// A capacity that is not a multiple of 4 is rounded down to whole words. Capacities of
    /// 2^32 bytes or more are rejected with [`WriterError::CapacityTooLarge`].
    pub fn with_capacity(capacity_bytes: u64) -> Result<Self> {
        if capacity_bytes > MAX_CAPACITY_BYTES {
            return Err(WriterError::CapacityTooLarge {
                requested: capacity_bytes,
            });
        }

        let Ok(capacity_words) = usize::try_from(capacity_bytes / WORD_SIZE as u64) else {
            return Err(WriterError::CapacityTooLarge {
                requested: capacity_bytes,
            });
        };

        log::trace!("new WordWriter, capacity {capacity_bytes} bytes");
        Ok(Self {
            out: Vec::new(),
            index: 0,
            capacity_words,
        })
    }

    /// The capacity of this writer, in bytes.
    pub fn capacity_bytes(&self) -> u64 {
        self.capacity_words as u64 * WORD_SIZE as u64
    }

    /// The current cursor position, in words.
    pub fn position(&self) -> usize {
        self.index
    }

    /// Returns the bytes written since construction or the last `reset`.
    ///
    /// The slice covers `[0, position() * 4)`, never the whole capacity.
    pub fn buffer(&self) -> &[u8] {
        &self.out[..self.index * WORD_SIZE]
    }

    /// Extracts the written bytes, discarding anything past the cursor.
    pub fn into_inner(mut self) -> Vec<u8> {
        self.out.truncate(self.index * WORD_SIZE);
        self.out
    }

    /// Rewinds the cursor to the start of the buffer, so that the writer can be reused.
    ///
    /// The old contents are not cleared, but they are never visible through `buffer`.
    pub fn reset(&mut self) {
        log::trace!("WordWriter reset at word {}", self.index);
        self.index = 0;
    }

    /// Claims `words` words at the cursor and advances past them. Returns the first claimed
    /// word. The claimed words may hold stale data from before a `reset`.
    fn claim(&mut self, words: usize) -> Result<usize> {
        let start = self.index;
        let end = match start.checked_add(words) {
            Some(end) if end <= self.capacity_words => end,
            _ => {
                log::debug!(
                    "WordWriter exhausted: need {words} words at word {start}, capacity {} words",
                    self.capacity_words
                );
                return Err(WriterError::BufferExhausted {
                    needed: words,
                    available: self.capacity_words - start,
                });
            }
        };

        let end_bytes = end * WORD_SIZE;
        if self.out.len() < end_bytes {
            self.out.resize(end_bytes, 0);
        }
        self.index = end;
        Ok(start)
    }

    /// Overwrites a word that has already been claimed.
    fn put_word(&mut self, word: usize, value: u32) {
        let at = word * WORD_SIZE;
        self.out[at..at + WORD_SIZE].copy_from_slice(&value.to_ne_bytes());
    }

    /// Writes a length word followed by `bytes`, zero-padded to a word boundary.
    fn write_prefixed(&mut self, len: u32, bytes: &[u8]) -> Result<()> {
        let payload_words = bytes.len().div_ceil(WORD_SIZE);
        let Some(total) = payload_words.checked_add(1) else {
            return Err(WriterError::CannotEncode);
        };

        let at = self.claim(total)?;
        self.put_word(at, len);

        let start = (at + 1) * WORD_SIZE;
        let end = start + payload_words * WORD_SIZE;
        let (data, pad) = self.out[start..end].split_at_mut(bytes.len());
        data.copy_from_slice(bytes);
        pad.fill(0);
        Ok(())
    }

    /// Writes a `u32` as one word.
    pub fn serialize_u32(&mut self, value: u32) -> Result<()> {
        let at = self.claim(1)?;
        self.put_word(at, value);
        Ok(())
    }

    /// Writes a `bool` as one word. True is encoded as 1. False is encoded as 0.
    pub fn serialize_bool(&mut self, value: bool) -> Result<()> {
        self.serialize_u32(value as u32)
    }

    /// Writes an `f32` as one word, using its IEEE-754 binary32 representation.
    pub fn serialize_f32(&mut self, value: f32) -> Result<()> {
        self.serialize_u32(value.to_bits())
    }

    /// Writes a UTF-8 string in length-prefixed form.
    ///
    /// The first word holds the length of the string in bytes. The bytes follow, padded with
    /// zeroes to a whole number of words. An empty string is a single zero word.
    pub fn serialize_str(&mut self, s: &str) -> Result<()> {
        let len = u32::try_from(s.len()).map_err(|_| WriterError::CannotEncode)?;
        self.write_prefixed(len, s.as_bytes())
    }

    /// Writes the number of items, then calls `encode_one` for each item, in order.
    pub fn serialize_array<T, F>(&mut self, items: &[T], mut encode_one: F) -> Result<()>
    where
        F: FnMut(&mut Self, &T) -> Result<()>,
    {
        let count = u32::try_from(items.len()).map_err(|_| WriterError::CannotEncode)?;
        self.serialize_u32(count)?;
        for item in items {
            encode_one(self, item)?;
        }
        Ok(())
    }

    /// Writes a sequence whose length is not known up front.
    ///
    /// A word is reserved for the count, `items` is drained while `encode_one` writes each
    /// item, and the reserved word is then patched with the number of items seen. The output
    /// is identical to [`serialize_array`](Self::serialize_array). Returns the count.
    pub fn serialize_iterable<I, F>(&mut self, items: I, mut encode_one: F) -> Result<u32>
    where
        I: IntoIterator,
        F: FnMut(&mut Self, I::Item) -> Result<()>,
    {
        let slot = self.claim(1)?;
        self.put_word(slot, 0);

        let mut count: u32 = 0;
        for item in items {
            encode_one(self, item)?;
            count = count.checked_add(1).ok_or(WriterError::CannotEncode)?;
        }

        self.put_word(slot, count);
        Ok(count)
    }

    /// Writes a sequence that supports random access when it is read.
    ///
    /// The layout is the count `N`, then an index table of `N` entries, then the items. Each
    /// table entry is two words: the item's start, in words, relative to the first word after
    /// the table, and the item's length in bytes. The table is reserved before the items are
    /// written and each entry is filled in once its item is done.
    ///
    /// See [`WordReader::get_array_elements`](crate::WordReader::get_array_elements).
    pub fn serialize_indexable_array<T, F>(&mut self, items: &[T], mut encode_one: F) -> Result<()>
    where
        F: FnMut(&mut Self, &T) -> Result<()>,
    {
        let count = u32::try_from(items.len()).map_err(|_| WriterError::CannotEncode)?;
        let table_words = items.len().checked_mul(2).ok_or(WriterError::CannotEncode)?;

        self.serialize_u32(count)?;
        let table = self.claim(table_words)?;
        let base = self.index;

        for (i, item) in items.iter().enumerate() {
            let start = self.index;
            encode_one(self, item)?;
            let end = self.index;

            // The cursor only moves backwards if `encode_one` called `reset`.
            let (Some(len_words), Some(rel_start)) =
                (end.checked_sub(start), start.checked_sub(base))
            else {
                return Err(WriterError::CannotEncode);
            };
            let rel_start = u32::try_from(rel_start).map_err(|_| WriterError::CannotEncode)?;
            let len_bytes =
                u32::try_from(len_words * WORD_SIZE).map_err(|_| WriterError::CannotEncode)?;

            self.put_word(table + 2 * i, rel_start);
            self.put_word(table + 2 * i + 1, len_bytes);
        }
        Ok(())
    }

    /// Writes a word count followed by `words`, copied verbatim.
    ///
    /// Nothing about the contents is checked. This is meant for splicing in data that describes
    /// itself, such as a buffer produced by another `WordWriter`.
    pub fn serialize_raw_words(&mut self, words: &[u32]) -> Result<()> {
        let count = u32::try_from(words.len()).map_err(|_| WriterError::CannotEncode)?;
        self.write_prefixed(count, words.as_bytes())
    }

    /// Same as [`serialize_raw_words`](Self::serialize_raw_words), but takes the words as bytes.
    /// The length of `bytes` must be a multiple of 4.
    pub fn serialize_raw_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        if bytes.len() % WORD_SIZE != 0 {
            return Err(WriterError::CannotEncode);
        }
        let count =
            u32::try_from(bytes.len() / WORD_SIZE).map_err(|_| WriterError::CannotEncode)?;
        self.write_prefixed(count, bytes)
    }
}

impl Default for WordWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Error type for `WordWriter`.
#[derive(Clone, Eq, PartialEq, Debug)]
pub enum WriterError {
    /// The requested capacity is 2^32 bytes or more.
    CapacityTooLarge {
        /// The capacity that was requested, in bytes.
        requested: u64,
    },

    /// A write needs more room than the writer has left. Nothing was written.
    BufferExhausted {
        /// Words the write needed.
        needed: usize,
        /// Words left before the capacity is reached.
        available: usize,
    },

    /// A value cannot be encoded, because a length or count does not fit in one word, or
    /// because a raw byte block is not a whole number of words.
    CannotEncode,
}

impl core::error::Error for WriterError {}

impl core::fmt::Display for WriterError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::CapacityTooLarge { requested } => write!(
                f,
                "Capacity of {requested} bytes is too large; the maximum is {MAX_CAPACITY_BYTES}"
            ),
            Self::BufferExhausted { needed, available } => write!(
                f,
                "Buffer exhausted: needed {needed} words, but only {available} are available"
            ),
            Self::CannotEncode => f.write_str("The data cannot be encoded"),
        }
    }
}
