use std::borrow::Cow;
use std::path::{Component, Path};

use unicode_normalization::{is_nfc, UnicodeNormalization};

use crate::archive::consts::UNDERSCORE_RUN;
use crate::archive::error::*;

/// Normalizes the value to Unicode NFC, only allocating when the value is not already normalized
pub fn normalize_nfc(value: &str) -> Cow<str> {
    if is_nfc(value) {
        value.into()
    } else {
        Cow::Owned(value.nfc().collect())
    }
}

/// Converts a relative path into the `/` separated form used in manifests
pub fn to_manifest_path<P: AsRef<Path>>(path: P) -> Result<String> {
    let path = path.as_ref();
    let mut parts = Vec::new();

    for component in path.components() {
        if let Component::Normal(part) = component {
            let part = part.to_str().ok_or_else(|| Error::InvalidUtf8Path {
                path: path.to_path_buf(),
            })?;
            parts.push(part);
        }
    }

    let joined = parts.join("/");

    if joined.contains('\\') {
        Ok(joined.replace('\\', "/"))
    } else {
        Ok(joined)
    }
}

/// Replaces every trigger character in a file name with `_` and collapses runs of `_`. When
/// `keep_extension` is set, the text after the last `.` is left alone. Returns None if the name
/// needs no changes.
pub fn clean_name(name: &str, triggers: &[char], keep_extension: bool) -> Option<String> {
    let (stem, ext) = match Path::new(name).extension().and_then(|e| e.to_str()) {
        Some(ext) if keep_extension => (&name[..name.len() - ext.len() - 1], Some(ext)),
        _ => (name, None),
    };

    let replaced: String = stem
        .chars()
        .map(|c| if triggers.contains(&c) { '_' } else { c })
        .collect();
    let joined = match ext {
        Some(ext) => format!("{}.{}", replaced, ext),
        None => replaced,
    };
    let cleaned = UNDERSCORE_RUN.replace_all(&joined, "_");

    if cleaned == name {
        None
    } else {
        Some(cleaned.into_owned())
    }
}
