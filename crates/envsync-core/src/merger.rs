//! Single-key state merging.
//!
//! Computes the next remote configuration from the current one. Only the
//! named key is touched; every other entry passes through unchanged.

use crate::types::{EnvVars, Operation};

/// Returns `current` with `key` set to `value` (Apply) or absent (Remove).
///
/// Removing a key that is not present is a no-op. Never fails.
pub fn merge(current: &EnvVars, operation: Operation, key: &str, value: &str) -> EnvVars {
    let mut next = current.clone();
    merge_in_place(&mut next, operation, key, value);
    next
}

/// In-place variant of [`merge`]. Returns `true` when the map changed.
pub fn merge_in_place(vars: &mut EnvVars, operation: Operation, key: &str, value: &str) -> bool {
    match operation {
        Operation::Apply => {
            let previous = vars.insert(key.to_string(), value.to_string());
            previous.as_deref() != Some(value)
        }
        Operation::Remove => vars.remove(key).is_some(),
    }
}
