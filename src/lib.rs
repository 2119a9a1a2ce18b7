//! Schema-less binary encoding into a flat buffer of 32-bit words.
//!
//! [`WordWriter`] appends values to a buffer and [`WordReader`] reads them back. Neither carries
//! a schema or type tags: the caller decides the field order and must decode fields in exactly
//! the order and with exactly the types that were used to encode them. Reading a value with the
//! wrong primitive is not detected; it simply produces a wrong value.
//!
//! # Layout
//!
//! Every value occupies a whole number of 32-bit words, stored in host-native byte order.
//!
//! * `bool`: 1 word, 0 or 1.
//! * `u32`: 1 word.
//! * `f32`: 1 word, IEEE-754 binary32.
//! * string: 1 word holding the UTF-8 byte length, then the bytes, zero-padded to a word
//!   boundary.
//! * array / iterable: 1 count word, then each element as encoded by the caller.
//! * indexable array: 1 count word `N`, then `N` pairs of `(start_word, byte_len)`, then the
//!   elements. `start_word` is relative to the first word after the table.
//! * raw words: 1 word count, then the words verbatim.

#![cfg_attr(not(any(feature = "std", test)), no_std)]
#![forbid(unsafe_code)]
#![forbid(unused_must_use)]
#![warn(missing_docs)]

extern crate alloc;

mod reader;
mod writer;


pub use reader::{IterableDecoder, ReaderError, WordReader};
pub use writer::{WordWriter, WriterError, DEFAULT_CAPACITY_BYTES, MAX_CAPACITY_BYTES};

/// Size in bytes of one word.
pub const WORD_SIZE: usize = 4;
