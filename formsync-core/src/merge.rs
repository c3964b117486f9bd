//! Folding a submitted draft into the value the server returned.
//!
//! After a successful save the resource cache is updated locally instead of
//! being re-fetched. The server's response is the base: it owns ids,
//! timestamps, counters and anything it normalized. Only the fields the user
//! actually changed, measured against the server value the edit started
//! from, are laid back over it.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// Re-apply the edit `baseline -> submitted` on top of `returned`.
///
/// Objects are walked key by key. A key the edit left alone keeps the
/// server's value; a key the edit removed is removed. Any other changed
/// value (scalars, arrays, type changes) replaces the server's wholesale.
pub fn rebase(returned: &mut Value, baseline: &Value, submitted: &Value) {
    if baseline == submitted {
        return;
    }
    match (returned, baseline, submitted) {
        (Value::Object(returned), Value::Object(baseline), Value::Object(submitted)) => {
            for (key, value) in submitted {
                let before = baseline.get(key).unwrap_or(&Value::Null);
                match returned.get_mut(key) {
                    Some(current) => rebase(current, before, value),
                    None if before != value => {
                        returned.insert(key.clone(), value.clone());
                    }
                    None => {}
                }
            }
            for key in baseline.keys() {
                if !submitted.contains_key(key) {
                    returned.remove(key);
                }
            }
        }
        (returned, _, submitted) => *returned = submitted.clone(),
    }
}

/// The server's `returned` value with the user's edits re-applied.
///
/// `baseline` is the server value the edit started from (the blank value in
/// create mode) and `submitted` the draft that was sent.
///
/// Fails when any of the three cannot round-trip through JSON. A draft still
/// holding a local-only value such as
/// [`ImageValue::Pending`](crate::api::image::ImageValue::Pending) is one
/// such case; callers then keep `returned`, which already reflects what the
/// server stored.
pub fn rebase_edits<T>(returned: &T, baseline: &T, submitted: &T) -> Result<T, serde_json::Error>
where
    T: Serialize + DeserializeOwned,
{
    let mut merged = serde_json::to_value(returned)?;
    rebase(
        &mut merged,
        &serde_json::to_value(baseline)?,
        &serde_json::to_value(submitted)?,
    );
    serde_json::from_value(merged)
}
