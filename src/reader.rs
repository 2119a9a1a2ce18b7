#[cfg(feature = "std")]
use std::borrow::Cow;

use alloc::vec::Vec;
use core::iter::FusedIterator;
use zerocopy::byteorder::{NativeEndian, U32};
use zerocopy::FromBytes;

use crate::WORD_SIZE;

/// Result type for `WordReader` operations.
pub type Result<T> = core::result::Result<T, ReaderError>;

/// Reads values from a buffer produced by [`WordWriter`](crate::WordWriter).
///
/// The reader borrows its buffer and never copies it. Strings and raw word blocks are returned
/// as slices of that buffer, so they cannot outlive it.
///
/// The buffer carries no type information. Each `deserialize_*` call must match the
/// `serialize_*` call that wrote the value at the cursor; a mismatch is not detected and
/// produces a meaningless value.
///
/// A single reader can be re-pointed at many buffers, or at many windows of one buffer, with
/// [`set_buffer`](Self::set_buffer) and [`set_window`](Self::set_window).
pub struct WordReader<'a> {
    /// The buffer or window being read. Word 0 is the first 4 bytes of this slice.
    data: &'a [u8],

    /// The cursor, in words.
    index: usize,
}

impl<'a> WordReader<'a> {
    /// Creates a reader over all of `data`, with the cursor at the start.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, index: 0 }
    }

    /// Creates a reader over the `byte_len` bytes of `data` that start at `byte_offset`.
    pub fn with_window(data: &'a [u8], byte_offset: usize, byte_len: usize) -> Result<Self> {
        let mut reader = Self::new(&[]);
        reader.set_window(data, byte_offset, byte_len)?;
        Ok(reader)
    }

    /// Points the reader at all of `data` and moves the cursor to the start.
    pub fn set_buffer(&mut self, data: &'a [u8]) {
        log::trace!("WordReader set to {} bytes", data.len());
        self.data = data;
        self.index = 0;
    }

    /// Points the reader at the `byte_len` bytes of `data` that start at `byte_offset`, and moves
    /// the cursor to the start of that window. Reads cannot go past the end of the window.
    ///
    /// Returns `Err(ReaderError::Invalid)` if the window does not fit inside `data`. In that
    /// case the reader is unchanged.
    pub fn set_window(&mut self, data: &'a [u8], byte_offset: usize, byte_len: usize) -> Result<()> {
        let Some(end) = byte_offset.checked_add(byte_len) else {
            return Err(ReaderError::Invalid);
        };
        let Some(window) = data.get(byte_offset..end) else {
            return Err(ReaderError::Invalid);
        };

        log::trace!("WordReader set to window {byte_offset}..{end}");
        self.data = window;
        self.index = 0;
        Ok(())
    }

    /// The current cursor position, in words, relative to the start of the buffer or window.
    pub fn position(&self) -> usize {
        self.index
    }

    /// The bytes after the cursor.
    pub fn remaining(&self) -> &'a [u8] {
        self.index
            .checked_mul(WORD_SIZE)
            .and_then(|start| self.data.get(start..))
            .unwrap_or(&[])
    }

    /// Returns `true` if there is not a whole word left after the cursor.
    pub fn is_empty(&self) -> bool {
        self.remaining().len() < WORD_SIZE
    }

    /// Returns `words` words at the cursor as bytes, and advances past them.
    fn read_words(&mut self, words: usize) -> Result<&'a [u8]> {
        let bytes = self.peek_words(self.index, words)?;
        self.index += words;
        Ok(bytes)
    }

    /// Returns `words` words starting at word `at`, without moving the cursor.
    fn peek_words(&self, at: usize, words: usize) -> Result<&'a [u8]> {
        let (Some(start), Some(len)) = (at.checked_mul(WORD_SIZE), words.checked_mul(WORD_SIZE))
        else {
            return Err(ReaderError::Invalid);
        };
        let Some(end) = start.checked_add(len) else {
            return Err(ReaderError::Invalid);
        };
        self.data.get(start..end).ok_or(ReaderError::NeedsMoreData)
    }

    /// Reads the word at word `at`, without moving the cursor.
    fn peek_u32(&self, at: usize) -> Result<u32> {
        let bytes = self.peek_words(at, 1)?;
        let Ok(word) = <[u8; WORD_SIZE]>::try_from(bytes) else {
            return Err(ReaderError::Invalid);
        };
        Ok(u32::from_ne_bytes(word))
    }

    /// Reads a `u32` from one word.
    pub fn deserialize_u32(&mut self) -> Result<u32> {
        let value = self.peek_u32(self.index)?;
        self.index += 1;
        Ok(value)
    }

    /// Reads a `bool` from one word. Any non-zero word is `true`.
    pub fn deserialize_bool(&mut self) -> Result<bool> {
        Ok(self.deserialize_u32()? != 0)
    }

    /// Reads an `f32` from one word.
    pub fn deserialize_f32(&mut self) -> Result<f32> {
        Ok(f32::from_bits(self.deserialize_u32()?))
    }

    /// Reads a length-prefixed UTF-8 string and returns its bytes, without the padding.
    ///
    /// This does not copy any data, and does not check that the bytes are well-formed UTF-8.
    pub fn deserialize_str_bytes(&mut self) -> Result<&'a [u8]> {
        let Ok(len) = usize::try_from(self.deserialize_u32()?) else {
            return Err(ReaderError::Invalid);
        };
        let padded = self.read_words(len.div_ceil(WORD_SIZE))?;
        Ok(&padded[..len])
    }

    /// Reads a length-prefixed UTF-8 string and returns it as `&str`.
    ///
    /// This does not copy any data. If the bytes are not well-formed UTF-8, this returns
    /// `Err(ReaderError::Invalid)`.
    pub fn deserialize_str(&mut self) -> Result<&'a str> {
        let bytes = self.deserialize_str_bytes()?;
        core::str::from_utf8(bytes).map_err(|_| ReaderError::Invalid)
    }

    /// Reads a length-prefixed UTF-8 string and returns it as a `bstr::BStr`, without checking
    /// that it is well-formed UTF-8.
    #[cfg(feature = "bstr")]
    pub fn deserialize_bstr(&mut self) -> Result<&'a bstr::BStr> {
        Ok(bstr::BStr::new(self.deserialize_str_bytes()?))
    }

    /// Reads a length-prefixed UTF-8 string and copies it into a `String`.
    #[cfg(feature = "std")]
    pub fn deserialize_string(&mut self) -> Result<String> {
        Ok(self.deserialize_str()?.to_owned())
    }

    /// Reads a length-prefixed UTF-8 string. Byte sequences that are not valid UTF-8 are
    /// replaced with the Unicode replacement character.
    #[cfg(feature = "std")]
    pub fn deserialize_string_lossy(&mut self) -> Result<Cow<'a, str>> {
        let bytes = self.deserialize_str_bytes()?;
        Ok(String::from_utf8_lossy(bytes))
    }

    /// Reads a count, then calls `decode_one` that many times and collects the results.
    ///
    /// Reads the output of both [`serialize_array`](crate::WordWriter::serialize_array) and
    /// [`serialize_iterable`](crate::WordWriter::serialize_iterable).
    pub fn deserialize_array<T, F>(&mut self, mut decode_one: F) -> Result<Vec<T>>
    where
        F: FnMut(&mut Self) -> Result<T>,
    {
        let count = self.deserialize_u32()? as usize;

        // The count comes from the buffer. Don't let a bad one drive the allocation.
        let mut items = Vec::with_capacity(count.min(self.remaining().len() / WORD_SIZE));
        for _ in 0..count {
            items.push(decode_one(self)?);
        }
        Ok(items)
    }

    /// Reads a count, then returns an iterator that decodes one element each time it is pulled.
    ///
    /// The iterator borrows this reader and moves its cursor as it goes, so nothing else can
    /// read from the reader until the iterator is dropped. Drain it completely before reading
    /// anything that follows the sequence. After an element fails to decode, the iterator
    /// yields that error and then stops.
    pub fn deserialize_iterable<'r, T, F>(
        &'r mut self,
        decode_one: F,
    ) -> Result<IterableDecoder<'r, 'a, F>>
    where
        F: FnMut(&mut WordReader<'a>) -> Result<T>,
    {
        let remaining = self.deserialize_u32()?;
        Ok(IterableDecoder {
            reader: self,
            remaining,
            decode_one,
        })
    }

    /// Reads a sequence written by
    /// [`serialize_indexable_array`](crate::WordWriter::serialize_indexable_array) from start to
    /// end, skipping over its index table.
    pub fn deserialize_indexable_array<T, F>(&mut self, mut decode_one: F) -> Result<Vec<T>>
    where
        F: FnMut(&mut Self) -> Result<T>,
    {
        let count = self.deserialize_u32()? as usize;
        let table_words = count.checked_mul(2).ok_or(ReaderError::Invalid)?;
        self.read_words(table_words)?;

        let mut items = Vec::with_capacity(count.min(self.remaining().len() / WORD_SIZE));
        for _ in 0..count {
            items.push(decode_one(self)?);
        }
        Ok(items)
    }

    /// Decodes selected elements of a sequence written by
    /// [`serialize_indexable_array`](crate::WordWriter::serialize_indexable_array), using its
    /// index table.
    ///
    /// For each position in `indexes`, the element's window is looked up in the table and
    /// `decode_one` is called with a reader over exactly that window. Elements that are not
    /// requested are never visited. Positions can be in any order and can repeat.
    ///
    /// Afterwards the cursor is just past the end of the whole sequence.
    pub fn get_array_elements<T, F>(&mut self, indexes: &[u32], mut decode_one: F) -> Result<Vec<T>>
    where
        F: FnMut(&mut WordReader<'a>) -> Result<T>,
    {
        let count = self.deserialize_u32()?;
        let table = self.index;
        let table_words = (count as usize).checked_mul(2).ok_or(ReaderError::Invalid)?;
        let base = table.checked_add(table_words).ok_or(ReaderError::Invalid)?;
        self.peek_words(table, table_words)?;

        let mut element = WordReader::new(&[]);
        let mut items = Vec::with_capacity(indexes.len());
        for &index in indexes {
            if index >= count {
                return Err(ReaderError::IndexOutOfRange { index, count });
            }
            let (start, len) = self.element_window(table, base, index as usize)?;
            element.set_window(self.data, start, len)?;
            items.push(decode_one(&mut element)?);
        }

        self.index = match count.checked_sub(1) {
            None => base,
            Some(last) => {
                let (start, len) = self.element_window(table, base, last as usize)?;
                (start + len).div_ceil(WORD_SIZE)
            }
        };
        Ok(items)
    }

    /// Looks up table entry `i` and returns the element's window as `(byte_offset, byte_len)`
    /// within `self.data`.
    fn element_window(&self, table: usize, base: usize, i: usize) -> Result<(usize, usize)> {
        let rel_start = self.peek_u32(table + 2 * i)? as usize;
        let byte_len = self.peek_u32(table + 2 * i + 1)? as usize;

        let start = base
            .checked_add(rel_start)
            .and_then(|word| word.checked_mul(WORD_SIZE))
            .ok_or(ReaderError::Invalid)?;
        match start.checked_add(byte_len) {
            Some(end) if end <= self.data.len() => Ok((start, byte_len)),
            _ => Err(ReaderError::Invalid),
        }
    }

    /// Reads a word count and returns that many words as a slice of the underlying buffer.
    ///
    /// No data is copied. The contents are not interpreted in any way.
    pub fn deserialize_raw_words(&mut self) -> Result<&'a [U32<NativeEndian>]> {
        let bytes = self.deserialize_raw_bytes()?;
        let Ok(words) = <[U32<NativeEndian>]>::ref_from_bytes(bytes) else {
            return Err(ReaderError::Invalid);
        };
        Ok(words)
    }

    /// Same as [`deserialize_raw_words`](Self::deserialize_raw_words), but returns the words as
    /// bytes, ready to be handed to [`WordReader::new`] or [`set_buffer`](Self::set_buffer).
    pub fn deserialize_raw_bytes(&mut self) -> Result<&'a [u8]> {
        let count = self.deserialize_u32()? as usize;
        self.read_words(count)
    }
}

/// Lazily decodes the elements of a sequence. Returned by
/// [`WordReader::deserialize_iterable`].
pub struct IterableDecoder<'r, 'a, F> {
    reader: &'r mut WordReader<'a>,
    remaining: u32,
    decode_one: F,
}

impl<'r, 'a, F> IterableDecoder<'r, 'a, F> {
    /// The reader that this iterator is draining.
    pub fn reader(&self) -> &WordReader<'a> {
        &*self.reader
    }
}

impl<'r, 'a, T, F> Iterator for IterableDecoder<'r, 'a, F>
where
    F: FnMut(&mut WordReader<'a>) -> Result<T>,
{
    type Item = Result<T>;

    fn next(&mut self) -> Option<Result<T>> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;

        let item = (self.decode_one)(&mut *self.reader);
        if item.is_err() {
            self.remaining = 0;
        }
        Some(item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.remaining as usize;
        (n, Some(n))
    }
}

impl<'r, 'a, T, F> ExactSizeIterator for IterableDecoder<'r, 'a, F> where
    F: FnMut(&mut WordReader<'a>) -> Result<T>
{
}

impl<'r, 'a, T, F> FusedIterator for IterableDecoder<'r, 'a, F> where
    F: FnMut(&mut WordReader<'a>) -> Result<T>
{
}

/// Error type for `WordReader`
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum ReaderError {
    /// A `deserialize_*` method reached the end of the buffer or window, but requires more data
    /// to finish reading the value.
    NeedsMoreData,

    /// The data is malformed: a string is not valid UTF-8, or an index table points outside the
    /// buffer, or a requested window does not fit inside its buffer.
    Invalid,

    /// [`WordReader::get_array_elements`] was asked for an element past the end of the sequence.
    IndexOutOfRange {
        /// The requested position.
        index: u32,
        /// The number of elements in the sequence.
        count: u32,
    },
}

impl core::error::Error for ReaderError {}

impl core::fmt::Display for ReaderError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NeedsMoreData => f.write_str("More data is needed to read the value"),
            Self::Invalid => f.write_str("The data is invalid"),
            Self::IndexOutOfRange { index, count } => write!(
                f,
                "Element {index} is out of range for a sequence of {count} elements"
            ),
        }
    }
}
