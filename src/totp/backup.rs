//! Backup code generation and single-use consumption.
//!
//! Codes are 8-character uppercase alphanumerics, stored only inside an
//! oracle envelope as a serialized JSON list. Consumption removes exactly
//! the matched code; persistence of the reduced list is the caller's job
//! (see the compare-and-swap in the repo layer).

use rand::{RngCore, rngs::OsRng};

use crate::error::AuthError;

pub const BACKUP_CODE_COUNT: usize = 8;
const BACKUP_CODE_LEN: usize = 8;
const BACKUP_CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Result of matching a candidate against the active code list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Consumption {
    pub matched: bool,
    pub remaining: Vec<String>,
}

/// Generate a fresh batch of backup codes.
#[must_use]
pub fn generate() -> Vec<String> {
    let mut rng = OsRng;
    generate_with_rng(&mut rng, BACKUP_CODE_COUNT)
}

/// Generate `count` backup codes from an injected RNG.
#[must_use]
pub fn generate_with_rng<R: RngCore + ?Sized>(rng: &mut R, count: usize) -> Vec<String> {
    (0..count).map(|_| generate_code(rng)).collect()
}

/// Match `candidate` against `codes`, case-insensitively and ignoring
/// surrounding whitespace. On a match the first matching code is removed
/// from `remaining`; a consumed code can never validate again.
#[must_use]
pub fn consume(codes: &[String], candidate: &str) -> Consumption {
    let normalized = normalize(candidate);
    if normalized.is_empty() {
        return Consumption {
            matched: false,
            remaining: codes.to_vec(),
        };
    }

    let Some(index) = codes.iter().position(|code| *code == normalized) else {
        return Consumption {
            matched: false,
            remaining: codes.to_vec(),
        };
    };

    let mut remaining = codes.to_vec();
    remaining.remove(index);
    Consumption {
        matched: true,
        remaining,
    }
}

/// Normalize a candidate for comparison against stored codes.
#[must_use]
pub fn normalize(candidate: &str) -> String {
    candidate.trim().to_ascii_uppercase()
}

/// Serialize a code list for encryption.
///
/// # Errors
/// Returns an error if serialization fails.
pub fn serialize(codes: &[String]) -> Result<String, AuthError> {
    serde_json::to_string(codes)
        .map_err(|err| AuthError::Internal(anyhow::anyhow!("backup code serialization: {err}")))
}

/// Parse a stored code list.
///
/// # Errors
/// Returns an error if the stored payload is not a JSON string array.
pub fn deserialize(raw: &str) -> Result<Vec<String>, AuthError> {
    serde_json::from_str(raw)
        .map_err(|err| AuthError::Internal(anyhow::anyhow!("backup code list is corrupt: {err}")))
}

fn generate_code<R: RngCore + ?Sized>(rng: &mut R) -> String {
    let mut raw = [0u8; BACKUP_CODE_LEN];
    rng.fill_bytes(&mut raw);
    raw.iter()
        .map(|byte| {
            let index = usize::from(*byte) % BACKUP_CODE_ALPHABET.len();
            BACKUP_CODE_ALPHABET[index] as char
        })
        .collect()
}
