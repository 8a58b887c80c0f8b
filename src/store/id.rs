use std::{
    fmt,
    str::FromStr,
    sync::atomic::{AtomicU32, Ordering},
};

use lazy_static::lazy_static;
use rand::{rngs::OsRng, Rng, RngCore};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use time::OffsetDateTime;

lazy_static! {
    static ref PROCESS_UNIQUE: [u8; 5] = {
        let mut bytes = [0u8; 5];
        OsRng.fill_bytes(&mut bytes);
        bytes
    };
    static ref COUNTER: AtomicU32 = AtomicU32::new(OsRng.gen_range(0..0x00ff_ffff));
}

/// 12-byte document identifier, rendered as 24 lowercase hex digits.
///
/// Layout: 4 bytes of big-endian unix seconds, 5 bytes fixed per process,
/// 3 bytes of a wrapping counter. Ordering follows creation time at second
/// granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId([u8; 12]);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid object id `{0}`: expected 24 hex digits")]
pub struct ParseObjectIdError(pub String);

impl ObjectId {
    pub fn new() -> Self {
        let secs = OffsetDateTime::now_utc().unix_timestamp() as u32;
        let count = COUNTER.fetch_add(1, Ordering::Relaxed) & 0x00ff_ffff;

        let mut bytes = [0u8; 12];
        bytes[..4].copy_from_slice(&secs.to_be_bytes());
        bytes[4..9].copy_from_slice(&*PROCESS_UNIQUE);
        bytes[9..].copy_from_slice(&count.to_be_bytes()[1..]);
        Self(bytes)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Creation second embedded in the identifier.
    #[cfg(test)]
    pub fn timestamp(&self) -> u32 {
        u32::from_be_bytes([self.0[0], self.0[1], self.0[2], self.0[3]])
    }
}

impl Default for ObjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for ObjectId {
    type Err = ParseObjectIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 24 {
            return Err(ParseObjectIdError(s.to_string()));
        }
        let mut bytes = [0u8; 12];
        hex::decode_to_slice(s, &mut bytes).map_err(|_| ParseObjectIdError(s.to_string()))?;
        Ok(Self(bytes))
    }
}

impl Serialize for ObjectId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ObjectId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}
