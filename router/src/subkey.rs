//! Per-connection subkeys: `"<userId>_<seq>"`.
//!
//! Both halves are plain decimal integers, so the key never contains the `,`
//! or `:` separators used elsewhere in RPC arguments and configuration.

use crate::error::{decode_error, Error};
use serde::{Deserialize, Serialize};
use std::fmt;

const SEPARATOR: char = '_';

/// Opaque identifier of one live connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubKey(String);

impl SubKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SubKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

pub fn encode(user_id: i64, seq: i32) -> SubKey {
    SubKey(format!("{user_id}{SEPARATOR}{seq}"))
}

/// Inverse of [`encode`]. Anything `encode` could not have produced is
/// rejected, including alternative spellings of the same numbers such as
/// `+1_2` or `01_2`.
pub fn decode(subkey: &str) -> Result<(i64, i32), Error> {
    let (user_id, seq) = subkey
        .split_once(SEPARATOR)
        .ok_or_else(|| decode_error(subkey))?;
    let user_id = user_id.parse::<i64>().map_err(|_| decode_error(subkey))?;
    let seq = seq.parse::<i32>().map_err(|_| decode_error(subkey))?;

    if encode(user_id, seq).as_str() != subkey {
        return Err(decode_error(subkey));
    }
    Ok((user_id, seq))
}
