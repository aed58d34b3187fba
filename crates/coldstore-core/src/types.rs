use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ColdstoreError;

/// One mebibyte: the sub-block size of every tree hash
pub const MIB: u64 = 1024 * 1024;

/// Largest part the service accepts (4 GiB)
const MAX_PART_MIB: u64 = 4096;

/// Multipart upload part size.
///
/// Always a power-of-two number of MiB between 1 MiB and 4 GiB, so that the
/// local tree hash of each part lines up with the service's 1 MiB sub-blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PartSize(u64);

impl PartSize {
    pub const DEFAULT: PartSize = PartSize(8 * MIB);

    pub fn from_mib(mib: u64) -> Result<Self, ColdstoreError> {
        if mib == 0 || mib > MAX_PART_MIB || !mib.is_power_of_two() {
            return Err(ColdstoreError::InvalidPartSize(mib.saturating_mul(MIB)));
        }
        Ok(PartSize(mib * MIB))
    }

    pub fn from_bytes(bytes: u64) -> Result<Self, ColdstoreError> {
        if bytes % MIB != 0 {
            return Err(ColdstoreError::InvalidPartSize(bytes));
        }
        Self::from_mib(bytes / MIB).map_err(|_| ColdstoreError::InvalidPartSize(bytes))
    }

    pub fn bytes(self) -> u64 {
        self.0
    }

    pub fn mib(self) -> u64 {
        self.0 / MIB
    }
}

impl Default for PartSize {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Display for PartSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} MiB", self.mib())
    }
}

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

string_id!(
    /// Service-assigned identifier of a stored archive
    ArchiveId
);
string_id!(
    /// Identifier of an in-progress multipart upload session
    UploadId
);
string_id!(
    /// Identifier of a retrieval or inventory job
    JobId
);
