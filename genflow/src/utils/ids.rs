//! Identifier helpers for on-disk layouts.

use std::sync::LazyLock;

use regex::Regex;
use sha2::{Digest, Sha256};

static UNSAFE_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9_.\-]").expect("static pattern is valid"));

/// Hex characters of the id digest appended by [`path_component`].
const DIGEST_LEN: usize = 16;

/// Maps an identifier to a single safe path component.
///
/// Characters outside `[A-Za-z0-9_.-]` become `_`; a result made only of
/// dots becomes underscores so it cannot address a parent directory.
/// Distinct ids may map to the same string; use [`path_component`] for
/// anything that must stay unique.
#[must_use]
pub fn sanitize_component(id: &str) -> String {
    let cleaned = UNSAFE_CHARS.replace_all(id.trim(), "_").into_owned();
    if cleaned.is_empty() || cleaned.chars().all(|c| c == '.') {
        "_".repeat(cleaned.len().max(1))
    } else {
        cleaned
    }
}

/// Maps an identifier to a unique, safe path component.
///
/// The sanitized id keeps directories readable; the suffix is the first
/// bytes of the SHA-256 of the raw id, so ids that sanitize alike still
/// land in different places.
#[must_use]
pub fn path_component(id: &str) -> String {
    let digest = hex::encode(Sha256::digest(id.as_bytes()));
    format!("{}-{}", sanitize_component(id), &digest[..DIGEST_LEN])
}
