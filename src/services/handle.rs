//! Twitter handle normalization.
//!
//! The normalized identifier is the uniqueness key for claims, so `@Foo`,
//! `foo` and ` FOO ` all collide. The display form keeps the user's casing.

/// Maximum length of a normalized handle identifier.
pub const MAX_HANDLE_ID_LEN: usize = 32;

/// Maximum length, in characters, of the handle as typed (without `@`).
pub const MAX_HANDLE_LEN: usize = 32;

/// Normalize a raw handle into its identifier form.
///
/// Strips surrounding whitespace and one leading `@`, lowercases, drops
/// everything outside `[a-z0-9_]` and truncates to [`MAX_HANDLE_ID_LEN`].
/// May return an empty string.
#[must_use]
pub fn normalize_handle(raw: &str) -> String {
    let trimmed = raw.trim();
    let trimmed = trimmed.strip_prefix('@').unwrap_or(trimmed);
    trimmed
        .chars()
        .flat_map(char::to_lowercase)
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '_')
        .take(MAX_HANDLE_ID_LEN)
        .collect()
}

/// Trimmed input without its leading `@`.
#[must_use]
pub fn bare_handle(raw: &str) -> &str {
    let trimmed = raw.trim();
    trimmed.strip_prefix('@').unwrap_or(trimmed)
}

/// Display form: trimmed input with a single leading `@`.
#[must_use]
pub fn display_handle(raw: &str) -> String {
    format!("@{}", bare_handle(raw))
}

#[cfg(test)]
#[path = "handle_test.rs"]
mod tests;
