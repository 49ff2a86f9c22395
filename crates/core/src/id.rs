// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Volute Contributors

//! Short, URL-safe ID generation for things like `$new` session expansion.

use uuid::Uuid;

/// Generate a short (8-char) unique id suitable for session names
/// (e.g. `new-3f9a1c02`), connector instance tags, and similar.
pub fn new_id() -> String {
    short_id(&Uuid::new_v4().simple().to_string()).to_string()
}

/// Truncate a string to its first `n` characters.
pub fn short_id(s: &str) -> &str {
    let n = 8.min(s.len());
    &s[..n]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_id_is_eight_chars() {
        assert_eq!(new_id().len(), 8);
    }

    #[test]
    fn new_id_is_unique() {
        assert_ne!(new_id(), new_id());
    }
}
