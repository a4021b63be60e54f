//! A content-hash identifier: a stable, fast, non-cryptographic hash of a
//! normalized byte stream, used to give benchmark files a name that is
//! independent of cosmetic differences (comment lines, run-length
//! whitespace) between two otherwise-identical instances.
//!
//! The isomorphism-invariant degree-sequence hash named alongside this in
//! the engine's own scope description is intentionally not implemented
//! here: it requires a full graph model of the formula (variable
//! incidence/clause-variable incidence graphs) disproportionate to this
//! crate's role as a minimal, real `Extract` collaborator for exercising
//! the engine end to end.

use std::hash::Hasher;
use std::io::Read;

use twox_hash::XxHash64;

use gbd_core::{Extract, ExtractError, FeatureMap, FeatureValue};

/// Seed used for the content hash. Fixed so the same normalized input
/// always produces the same digest across runs and processes.
const SEED: u64 = 0;

/// Strip comment lines (starting with `c`, DIMACS-style) and collapse
/// runs of ASCII whitespace to a single space, so two files differing only
/// in formatting hash identically.
fn normalize(raw: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(raw.len());
    let mut prev_was_space = false;
    for line in raw.split(|&b| b == b'\n') {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        if line.first() == Some(&b'c') {
            continue;
        }
        for &byte in line {
            if byte.is_ascii_whitespace() {
                if !prev_was_space {
                    out.push(b' ');
                    prev_was_space = true;
                }
            } else {
                out.push(byte);
                prev_was_space = false;
            }
        }
        out.push(b'\n');
        prev_was_space = true;
    }
    out
}

/// Compute the content-hash identifier for a byte stream: normalize away
/// comments and whitespace-run differences, then hash with a fast
/// non-cryptographic hash. Returned as a lowercase hex string.
pub fn content_hash(mut input: impl Read) -> Result<String, ExtractError> {
    let mut raw = Vec::new();
    input.read_to_end(&mut raw)?;
    let normalized = normalize(&raw);

    let mut hasher = XxHash64::with_seed(SEED);
    hasher.write(&normalized);
    Ok(format!("{:016x}", hasher.finish()))
}

/// An `Extract` collaborator that reports the content-hash identifier of
/// its input as a single status-valued feature, `"hash"`.
pub struct ContentHash<R> {
    source: Option<R>,
}

impl<R: Read> ContentHash<R> {
    /// Build an identifier that will read `source` on `extract()`.
    pub fn new(source: R) -> Self {
        Self { source: Some(source) }
    }
}

impl<R: Read + Send> Extract for ContentHash<R> {
    fn extract(&mut self) -> Result<FeatureMap, ExtractError> {
        let source = self
            .source
            .take()
            .ok_or_else(|| ExtractError::Malformed("extractor already consumed".to_string()))?;
        let hash = content_hash(source)?;
        let mut out = FeatureMap::new();
        out.insert("hash".to_string(), FeatureValue::Status(hash));
        Ok(out)
    }
}
