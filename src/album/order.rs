//! Parsing and re-serializing `TRCK`/`TPOS`-style order strings.
//!
//! The archive's canonical form is always `n/m`, but files arriving from the
//! dropbox carry whatever their source encoded: a bare `n`, `n/m`, or the
//! verbose `n of m`. This module resolves any of those forms against a
//! known track count and rewrites them canonically, or rejects the set if it
//! doesn't form a dense `{1..m}` run.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BadOrderError {
    #[error("order string {0:?} is not of the form n, n/m, or n of m")]
    Malformed(String),
    #[error("order numbers {found:?} do not form {{1..{count}}}")]
    NotDense { found: Vec<String>, count: usize },
}

/// Decode one order string into `(n, m)`. A bare `n` (no total given) yields
/// `m = n`; callers that need the list-wide total should use
/// [`verify_and_standardize_str_list`] instead of this directly.
pub fn decode(s: &str) -> Result<(u32, u32), BadOrderError> {
    let s = s.trim();

    if let Some((n, m)) = s.split_once(" of ") {
        let n: u32 = n.trim().parse().map_err(|_| BadOrderError::Malformed(s.to_string()))?;
        let m: u32 = m.trim().parse().map_err(|_| BadOrderError::Malformed(s.to_string()))?;
        return Ok((n, m));
    }

    if let Some((n, m)) = s.split_once('/') {
        let n: u32 = n.trim().parse().map_err(|_| BadOrderError::Malformed(s.to_string()))?;
        let m: u32 = m.trim().parse().map_err(|_| BadOrderError::Malformed(s.to_string()))?;
        return Ok((n, m));
    }

    let n: u32 = s.parse().map_err(|_| BadOrderError::Malformed(s.to_string()))?;
    Ok((n, n))
}

/// Verify that `raw` decodes to exactly `{1/m, 2/m, ..., m/m}` (`m = raw.len()`,
/// any order string's own `m` is ignored beyond decoding) and return the
/// canonical `n/m` strings in the same order as the input.
pub fn verify_and_standardize_str_list(raw: &[impl AsRef<str>]) -> Result<Vec<String>, BadOrderError> {
    let count = raw.len();
    let mut seen = vec![false; count + 1];
    let mut decoded = Vec::with_capacity(count);

    for s in raw {
        let s = s.as_ref();
        let (n, _m) = decode(s)?;
        decoded.push(n);
    }

    for &n in &decoded {
        if n == 0 || n as usize > count || seen[n as usize] {
            return Err(BadOrderError::NotDense {
                found: raw.iter().map(|s| s.as_ref().to_string()).collect(),
                count,
            });
        }
        seen[n as usize] = true;
    }
    if !seen[1..=count].iter().all(|b| *b) {
        return Err(BadOrderError::NotDense {
            found: raw.iter().map(|s| s.as_ref().to_string()).collect(),
            count,
        });
    }

    Ok(decoded.into_iter().map(|n| format!("{}/{}", n, count)).collect())
}
