//! Account payload codec for the journal program's two record types.
//!
//! Layouts (all integers little-endian):
//!
//! ```text
//! JournalEntryCounterState:  disc[8] | count u32
//! JournalEntryState:         disc[8] | owner[32] | title_len u32 | title
//!                                    | message_len u32 | message
//! ```
//!
//! Every decode checks the discriminator before touching any other byte, so a
//! buffer of the wrong record type is a [`CodecError::BadDiscriminator`]
//! rather than a misparse.

use serde::Serialize;
use solana_wire::Pubkey;
use thiserror::Error;

use crate::program::{discriminator, DISCRIMINATOR_LEN};

pub const MAX_TITLE_LEN: usize = 50;
pub const MAX_MESSAGE_LEN: usize = 100;

/// Byte offset of the `owner` field in an entry account.
pub const ENTRY_OWNER_OFFSET: usize = DISCRIMINATOR_LEN;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("discriminator mismatch for {schema}: expected {expected}, found {found}")]
    BadDiscriminator {
        schema: &'static str,
        expected: String,
        found: String,
    },

    #[error("truncated {field}: need {needed} bytes, {available} available")]
    Truncated {
        field: &'static str,
        needed: usize,
        available: usize,
    },

    #[error("{field} is {len} bytes, maximum is {max}")]
    FieldTooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },

    #[error("{field} is not valid UTF-8")]
    InvalidUtf8 { field: &'static str },
}

/// A record type stored in a program account.
pub trait AccountSchema: Sized {
    /// Anchor account name, hashed into the discriminator.
    const NAME: &'static str;

    fn discriminator() -> [u8; DISCRIMINATOR_LEN] {
        discriminator("account", Self::NAME)
    }

    /// Append the fields that follow the discriminator.
    fn encode_fields(&self, out: &mut Vec<u8>) -> Result<(), CodecError>;

    /// Parse the fields that follow the discriminator.
    fn decode_fields(reader: &mut ByteReader<'_>) -> Result<Self, CodecError>;
}

/// Encode a record, discriminator first.
pub fn encode<T: AccountSchema>(record: &T) -> Result<Vec<u8>, CodecError> {
    let mut out = Vec::with_capacity(64);
    out.extend_from_slice(&T::discriminator());
    record.encode_fields(&mut out)?;
    Ok(out)
}

/// Decode a record after validating its discriminator.
///
/// Trailing bytes are ignored: accounts are allocated at their maximum size.
pub fn decode<T: AccountSchema>(raw: &[u8]) -> Result<T, CodecError> {
    let expected = T::discriminator();
    let mut reader = ByteReader::new(raw);

    // A buffer shorter than the tag cannot be this record type.
    let found = raw.get(..DISCRIMINATOR_LEN).unwrap_or(raw);
    if found != expected {
        return Err(CodecError::BadDiscriminator {
            schema: T::NAME,
            expected: hex::encode(expected),
            found: hex::encode(found),
        });
    }
    reader.skip(DISCRIMINATOR_LEN);

    T::decode_fields(&mut reader)
}

/// Shared sequence counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CounterState {
    pub count: u32,
}

impl AccountSchema for CounterState {
    const NAME: &'static str = "JournalEntryCounterState";

    fn encode_fields(&self, out: &mut Vec<u8>) -> Result<(), CodecError> {
        out.extend_from_slice(&self.count.to_le_bytes());
        Ok(())
    }

    fn decode_fields(reader: &mut ByteReader<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            count: reader.u32("count")?,
        })
    }
}

impl CounterState {
    /// Allocated account size.
    pub const SPACE: usize = DISCRIMINATOR_LEN + 4;
}

/// One journal entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JournalEntryState {
    pub owner: Pubkey,
    pub title: String,
    pub message: String,
}

impl AccountSchema for JournalEntryState {
    const NAME: &'static str = "JournalEntryState";

    fn encode_fields(&self, out: &mut Vec<u8>) -> Result<(), CodecError> {
        out.extend_from_slice(self.owner.as_ref());
        put_string(out, "title", &self.title, MAX_TITLE_LEN)?;
        put_string(out, "message", &self.message, MAX_MESSAGE_LEN)
    }

    fn decode_fields(reader: &mut ByteReader<'_>) -> Result<Self, CodecError> {
        let owner = Pubkey::new(reader.array::<32>("owner")?);
        let title = reader.string("title", MAX_TITLE_LEN)?;
        let message = reader.string("message", MAX_MESSAGE_LEN)?;
        Ok(Self {
            owner,
            title,
            message,
        })
    }
}

impl JournalEntryState {
    /// Allocated account size.
    pub const SPACE: usize = DISCRIMINATOR_LEN + 32 + 4 + MAX_TITLE_LEN + 4 + MAX_MESSAGE_LEN;
}

/// Check a string field against its maximum encoded length.
pub fn check_len(field: &'static str, value: &str, max: usize) -> Result<(), CodecError> {
    if value.len() > max {
        return Err(CodecError::FieldTooLong {
            field,
            len: value.len(),
            max,
        });
    }
    Ok(())
}

/// Append a u32-length-prefixed string (Borsh layout).
pub fn put_string(
    out: &mut Vec<u8>,
    field: &'static str,
    value: &str,
    max: usize,
) -> Result<(), CodecError> {
    check_len(field, value, max)?;
    out.extend_from_slice(&(value.len() as u32).to_le_bytes());
    out.extend_from_slice(value.as_bytes());
    Ok(())
}

/// Bounds-checked cursor over an account buffer.
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn skip(&mut self, n: usize) {
        self.pos = (self.pos + n).min(self.data.len());
    }

    pub fn take(&mut self, field: &'static str, n: usize) -> Result<&'a [u8], CodecError> {
        let available = self.data.len() - self.pos;
        if n > available {
            return Err(CodecError::Truncated {
                field,
                needed: n,
                available,
            });
        }
        let out = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    pub fn array<const N: usize>(&mut self, field: &'static str) -> Result<[u8; N], CodecError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(field, N)?);
        Ok(out)
    }

    pub fn u32(&mut self, field: &'static str) -> Result<u32, CodecError> {
        Ok(u32::from_le_bytes(self.array::<4>(field)?))
    }

    /// Read a u32-length-prefixed string of at most `max` bytes.
    pub fn string(&mut self, field: &'static str, max: usize) -> Result<String, CodecError> {
        let len = self.u32(field)? as usize;
        let bytes = self.take(field, len)?;
        let value = String::from_utf8(bytes.to_vec()).map_err(|_| CodecError::InvalidUtf8 { field })?;
        check_len(field, &value, max)?;
        Ok(value)
    }
}
