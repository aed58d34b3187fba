//! Fixed-size part splitting over a forward-only byte stream
//!
//! The single-request and multipart upload protocols are different and cannot
//! be switched once started, so the source reads two parts ahead on
//! construction. That is enough to tell an empty stream, a stream that fits in
//! one part, and a stream that needs a multipart upload apart before any
//! request is sent. After the lookahead is drained, parts are read straight
//! from the stream, one at a time.

use std::collections::VecDeque;
use std::io::{self, Read};

use coldstore_core::PartSize;

use crate::treehash::{sha256, tree_hash, TreeHash};

/// One part of an archive, ready to upload
#[derive(Clone)]
pub struct Part {
    /// Byte offset of the first byte within the archive
    pub offset: u64,
    pub data: Vec<u8>,
    /// Tree hash of `data`
    pub tree_hash: TreeHash,
}

impl Part {
    fn new(offset: u64, data: Vec<u8>) -> Self {
        let tree_hash = tree_hash(&data);
        Self {
            offset,
            data,
            tree_hash,
        }
    }

    pub fn len(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Offset of the last byte (inclusive)
    pub fn last_byte(&self) -> u64 {
        self.offset + self.len().saturating_sub(1)
    }

    /// Linear SHA-256 of the payload
    pub fn content_hash(&self) -> TreeHash {
        sha256(&self.data)
    }
}

impl std::fmt::Debug for Part {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Part")
            .field("offset", &self.offset)
            .field("len", &self.data.len())
            .field("tree_hash", &self.tree_hash)
            .finish()
    }
}

/// Splits a reader into parts of exactly `part_size` bytes (the last may be shorter)
pub struct ChunkedSource<R> {
    reader: R,
    part_size: PartSize,
    lookahead: VecDeque<Part>,
    next_offset: u64,
    exhausted: bool,
}

impl<R: Read> ChunkedSource<R> {
    /// Wrap `reader`, reading up to two parts ahead to classify the stream.
    pub fn new(reader: R, part_size: PartSize) -> io::Result<Self> {
        let mut source = Self {
            reader,
            part_size,
            lookahead: VecDeque::with_capacity(2),
            next_offset: 0,
            exhausted: false,
        };
        for _ in 0..2 {
            match source.read_part()? {
                Some(part) => source.lookahead.push_back(part),
                None => break,
            }
        }
        tracing::debug!(
            buffered = source.lookahead.len(),
            part_size = %part_size,
            "classified input stream"
        );
        Ok(source)
    }

    pub fn part_size(&self) -> PartSize {
        self.part_size
    }

    /// The stream held no bytes at all
    pub fn is_empty(&self) -> bool {
        self.lookahead.is_empty() && self.next_offset == 0
    }

    /// Strictly fewer than two parts exist (includes the empty case)
    pub fn is_single_part(&self) -> bool {
        self.next_offset <= self.part_size.bytes() && self.lookahead.len() < 2
    }

    /// Next part in offset order, or `None` once the stream is finished
    pub fn next_part(&mut self) -> io::Result<Option<Part>> {
        if let Some(part) = self.lookahead.pop_front() {
            return Ok(Some(part));
        }
        self.read_part()
    }

    fn read_part(&mut self) -> io::Result<Option<Part>> {
        if self.exhausted {
            return Ok(None);
        }

        let want = self.part_size.bytes() as usize;
        let mut buf = vec![0u8; want];
        let mut filled = 0;
        while filled < want {
            match self.reader.read(&mut buf[filled..]) {
                Ok(0) => {
                    self.exhausted = true;
                    break;
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }

        if filled == 0 {
            return Ok(None);
        }
        if filled < want {
            buf.truncate(filled);
            buf.shrink_to_fit();
        }

        let part = Part::new(self.next_offset, buf);
        self.next_offset += part.len();
        Ok(Some(part))
    }
}

impl<R: Read> Iterator for ChunkedSource<R> {
    type Item = io::Result<Part>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_part().transpose()
    }
}
