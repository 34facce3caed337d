//! Assigned names for stored uploads.
//!
//! An upload is persisted as `<epoch millis>-<random in [0, 1e9)>-<sanitized original name>`.
//! Naming is two-stage: the untrusted original name is first reduced to a safe token by
//! [`sanitize_original_name`], then the full name is assembled only from validated components and
//! wrapped in [`AssignedName`], which is the only type the storage layer turns into a path.
//!
//! Uniqueness is probabilistic. No registry of issued names is kept, so two uploads of the same
//! original name within the same millisecond collide with probability of roughly one in 1e9.

use chrono::Utc;
use rand::prelude::RngExt;
use rand::rng;
use std::fmt;

/// Exclusive upper bound of the random component.
const RANDOM_BOUND: u32 = 1_000_000_000;

/// Longest sanitized original name kept in an assigned name.
const MAX_ORIGINAL_LEN: usize = 200;

/// Longest accepted assigned name (common filesystem component limit).
pub const MAX_ASSIGNED_LEN: usize = 255;

/// Fallback used when nothing safe is left of the original name.
const FALLBACK_NAME: &str = "file";

fn is_safe_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_')
}

/// Reduce an untrusted, user-supplied filename to a single safe path component.
///
/// Directory parts (both `/` and `\` separated) are dropped, characters outside
/// `[A-Za-z0-9._-]` become `_`, runs of dots collapse to one dot and leading dots are removed, so
/// the result can never be `..`, hidden, or contain a separator.
pub fn sanitize_original_name(original: &str) -> String {
    let basename = original.rsplit(['/', '\\']).next().unwrap_or_default().trim();

    let mut sanitized = String::with_capacity(basename.len());
    for c in basename.chars() {
        let c = if is_safe_char(c) { c } else { '_' };
        if c == '.' && (sanitized.is_empty() || sanitized.ends_with('.')) {
            continue;
        }
        sanitized.push(c);
        if sanitized.len() == MAX_ORIGINAL_LEN {
            break;
        }
    }

    if sanitized.is_empty() {
        FALLBACK_NAME.to_string()
    } else {
        sanitized
    }
}

/// Derive a fresh assigned name for an upload.
pub fn assign_name(original_name: &str) -> AssignedName {
    let millis = Utc::now().timestamp_millis();
    let salt = rng().random_range(0..RANDOM_BOUND);
    let name = format!("{millis}-{salt}-{}", sanitize_original_name(original_name));
    debug_assert!(AssignedName::is_valid(&name), "assigned name failed validation: {name}");
    AssignedName(name)
}

/// A filesystem-safe name of a stored file.
///
/// Only names that are a single component made of `[A-Za-z0-9._-]`, do not start with a dot and
/// never contain `..` can be constructed, so joining one onto the storage root always yields a
/// direct child of the root.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AssignedName(String);

impl AssignedName {
    /// Validate a caller-supplied name (e.g. from a download URL).
    pub fn parse(candidate: &str) -> Option<Self> {
        Self::is_valid(candidate).then(|| Self(candidate.to_string()))
    }

    fn is_valid(candidate: &str) -> bool {
        !candidate.is_empty()
            && candidate.len() <= MAX_ASSIGNED_LEN
            && !candidate.starts_with('.')
            && !candidate.contains("..")
            && candidate.chars().all(is_safe_char)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for AssignedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
