//! A `Block` is a contiguous, key-sorted run of entries plus a local index,
//! laid out exactly as in §4.5:
//!
//! ```text
//! [ entry*: (keyLen u16, key, valLen u16, val) ]  sorted by key
//! [ block-index: (offset u16, len u16)* ]
//! [ Meta: dataOffset, dataLen, indexOffset, indexLen ]  -- 8 bytes LE
//! ```
//!
//! Grounded on `examples/original_source/lsm/block.go`'s `BlockEntry` wire
//! format, with the (there unimplemented) encode/decode/iteration filled in.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{Error, Result};

pub const MAX_ENTRY_LEN: usize = u16::MAX as usize;

#[derive(Clone, Copy, Debug)]
struct Meta {
    data_offset: u16,
    data_len: u16,
    index_offset: u16,
    index_len: u16,
}

const META_LEN: usize = 8;

impl Meta {
    fn encode(&self, out: &mut Vec<u8>) {
        out.write_u16::<LittleEndian>(self.data_offset).unwrap();
        out.write_u16::<LittleEndian>(self.data_len).unwrap();
        out.write_u16::<LittleEndian>(self.index_offset).unwrap();
        out.write_u16::<LittleEndian>(self.index_len).unwrap();
    }

    fn decode(mut buf: &[u8]) -> Result<Self> {
        if buf.len() != META_LEN {
            return Err(Error::Internal("block meta must be 8 bytes".into()));
        }
        Ok(Meta {
            data_offset: buf.read_u16::<LittleEndian>()?,
            data_len: buf.read_u16::<LittleEndian>()?,
            index_offset: buf.read_u16::<LittleEndian>()?,
            index_len: buf.read_u16::<LittleEndian>()?,
        })
    }
}

/// A single `(key, value)` entry, built while assembling a [`Block`].
struct Entry {
    offset: u16,
    len: u16,
}

/// A builder/reader for one on-disk block. `push` appends entries in
/// ascending key order (the caller's responsibility -- the memtable and
/// merge iterators both already hand out sorted keys); `encode` produces the
/// full byte layout including the trailing `Meta`.
pub struct Block {
    data: Vec<u8>,
    entries: Vec<Entry>,
}

impl Block {
    pub fn new() -> Self {
        Block { data: Vec::new(), entries: Vec::new() }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Approximate size used to decide when to roll over to a new block.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn push(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        if key.is_empty() {
            return Err(Error::MalformedKey("block entry key cannot be empty".into()));
        }
        if key.len() > MAX_ENTRY_LEN {
            return Err(Error::EntryTooLarge { len: key.len(), max: MAX_ENTRY_LEN });
        }
        if value.len() > MAX_ENTRY_LEN {
            return Err(Error::EntryTooLarge { len: value.len(), max: MAX_ENTRY_LEN });
        }

        let offset = self.data.len() as u16;
        self.data.write_u16::<LittleEndian>(key.len() as u16).unwrap();
        self.data.extend_from_slice(key);
        self.data.write_u16::<LittleEndian>(value.len() as u16).unwrap();
        self.data.extend_from_slice(value);
        let len = self.data.len() as u16 - offset;
        self.entries.push(Entry { offset, len });
        Ok(())
    }

    fn entry_key_value(&self, e: &Entry) -> (&[u8], &[u8]) {
        let bytes = &self.data[e.offset as usize..(e.offset + e.len) as usize];
        let key_len = u16::from_le_bytes([bytes[0], bytes[1]]) as usize;
        let key = &bytes[2..2 + key_len];
        let val_off = 2 + key_len;
        let val_len = u16::from_le_bytes([bytes[val_off], bytes[val_off + 1]]) as usize;
        let val = &bytes[val_off + 2..val_off + 2 + val_len];
        (key, val)
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (&[u8], &[u8])> + '_ {
        self.entries.iter().map(move |e| self.entry_key_value(e))
    }

    pub fn first_key(&self) -> Option<&[u8]> {
        self.entries.first().map(|e| self.entry_key_value(e).0)
    }

    pub fn last_key(&self) -> Option<&[u8]> {
        self.entries.last().map(|e| self.entry_key_value(e).0)
    }

    /// Binary search over sorted entries for an exact key match.
    pub fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        let idx = self
            .entries
            .binary_search_by(|e| self.entry_key_value(e).0.cmp(key))
            .ok()?;
        Some(self.entry_key_value(&self.entries[idx]).1.to_vec())
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = self.data.clone();
        let index_offset = out.len() as u16;
        for e in &self.entries {
            out.write_u16::<LittleEndian>(e.offset).unwrap();
            out.write_u16::<LittleEndian>(e.len).unwrap();
        }
        let index_len = out.len() as u16 - index_offset;
        let meta = Meta {
            data_offset: 0,
            data_len: index_offset,
            index_offset,
            index_len,
        };
        meta.encode(&mut out);
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < META_LEN {
            return Err(Error::Internal("block too short to contain meta".into()));
        }
        let (body, meta_bytes) = bytes.split_at(bytes.len() - META_LEN);
        let meta = Meta::decode(meta_bytes)?;

        let data = body[meta.data_offset as usize..(meta.data_offset + meta.data_len) as usize]
            .to_vec();
        let index_bytes = &body
            [meta.index_offset as usize..(meta.index_offset + meta.index_len) as usize];

        let mut entries = Vec::with_capacity(index_bytes.len() / 4);
        let mut rest = index_bytes;
        while !rest.is_empty() {
            if rest.len() < 4 {
                return Err(Error::Internal("truncated block index entry".into()));
            }
            let offset = rest.read_u16::<LittleEndian>()?;
            let len = rest.read_u16::<LittleEndian>()?;
            entries.push(Entry { offset, len });
        }

        Ok(Block { data, entries })
    }
}

impl Default for Block {
    fn default() -> Self {
        Self::new()
    }
}
