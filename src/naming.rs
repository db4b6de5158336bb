use std::sync::atomic::{AtomicI64, Ordering};

use crate::types::MediaKind;

static LAST_STAMP: AtomicI64 = AtomicI64::new(0);

/// Returns an epoch-millisecond stamp that is strictly greater than any
/// stamp previously returned in this process.
///
/// Two items processed within the same millisecond get consecutive stamps
/// instead of the same one.
pub fn next_stamp() -> i64 {
    let now = chrono::Utc::now().timestamp_millis();
    let mut last = LAST_STAMP.load(Ordering::Relaxed);
    loop {
        let candidate = now.max(last + 1);
        match LAST_STAMP.compare_exchange_weak(last, candidate, Ordering::AcqRel, Ordering::Relaxed)
        {
            Ok(_) => return candidate,
            Err(observed) => last = observed,
        }
    }
}

/// Splits `name` into stem and extension at the last dot.
///
/// A leading dot (".profile") is part of the stem, not an extension.
pub fn split_extension(name: &str) -> (&str, Option<&str>) {
    match name.rfind('.') {
        Some(idx) if idx > 0 => (&name[..idx], Some(&name[idx + 1..])),
        _ => (name, None),
    }
}

/// Picks the remote file name for a processed item.
///
/// * batches always get `{prefix}-{stamp}.{ext}`, where the prefix
///   defaults to `image` / `video`
/// * a single item with a prefix gets the same timestamped form
/// * a single item without a prefix keeps its original stem
///
/// `extension` is the extension of the produced file; it replaces the
/// original one (images are re-encoded, videos pass their own through).
pub fn generate_name(
    original_name: &str,
    prefix: Option<&str>,
    is_batch: bool,
    kind: MediaKind,
    extension: Option<&str>,
) -> String {
    let prefix = prefix.map(str::trim).filter(|p| !p.is_empty());
    if !is_batch && prefix.is_none() && extension == Some("") {
        return original_name.to_string();
    }
    let stem = match (is_batch, prefix) {
        (false, None) => split_extension(original_name).0.to_string(),
        (_, prefix) => format!(
            "{}-{}",
            prefix.unwrap_or(kind.default_prefix()),
            next_stamp()
        ),
    };
    match extension.filter(|ext| !ext.is_empty()) {
        Some(ext) => format!("{stem}.{ext}"),
        None => stem,
    }
}
