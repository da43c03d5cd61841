//! Filesystem-safe names derived from mappings

use super::MappingRecord;

/// Longest sanitized stem kept in a file name
pub const MAX_SAFE_NAME_LEN: usize = 200;

/// Longest file name, in bytes, common filesystems accept
pub const MAX_FILE_NAME_LEN: usize = 255;

/// `{uuid}.json`
const ID_SUFFIX_LEN: usize = 36 + ".json".len();

/// Deterministic file name for a mapping.
///
/// `{stem}-{id}.json`, where the stem comes from the mapping name or, failing
/// that, from the URL path. A mapping with neither yields `{id}.json`.
#[must_use]
pub fn safe_file_name(record: &MappingRecord) -> String {
    let stem = match record.name.as_deref().filter(|n| !n.trim().is_empty()) {
        Some(name) => safe_name(name),
        None => record
            .request
            .path()
            .map(safe_name_from_path)
            .unwrap_or_default(),
    };

    if stem.is_empty() {
        format!("{}.json", record.id)
    } else {
        format!("{stem}-{}.json", record.id)
    }
}

/// `{prefix}{file}`, with the stem of `file` cut so the result fits in
/// [`MAX_FILE_NAME_LEN`].
///
/// `file` is expected to be a [`safe_file_name`]; its `{id}.json` tail is
/// always kept. Only a prefix that leaves no room for the tail can still
/// produce an over-long name.
#[must_use]
pub fn prefixed_file_name(prefix: &str, file: &str) -> String {
    let joined = format!("{prefix}{file}");
    if joined.len() <= MAX_FILE_NAME_LEN || !file.is_ascii() || file.len() <= ID_SUFFIX_LEN {
        return joined;
    }

    let (stem, id_suffix) = file.split_at(file.len() - ID_SUFFIX_LEN);
    let stem = stem.trim_end_matches('-');
    // one byte for the `-` before the id
    let room = MAX_FILE_NAME_LEN.saturating_sub(prefix.len() + id_suffix.len() + 1);
    let stem = stem[..stem.len().min(room)].trim_end_matches('-');

    if stem.is_empty() {
        format!("{prefix}{id_suffix}")
    } else {
        format!("{prefix}{stem}-{id_suffix}")
    }
}

/// Sanitize an arbitrary string into a file-name stem
#[must_use]
pub fn safe_name(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.trim().chars() {
        match c {
            ' ' | '/' | '\\' => out.push(if c == ' ' { '-' } else { '_' }),
            c if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') => {
                out.push(c.to_ascii_lowercase());
            }
            _ => {}
        }
        if out.len() >= MAX_SAFE_NAME_LEN {
            break;
        }
    }

    // no hidden files, no `..`
    let mut name = out.trim_start_matches('.').to_string();
    while name.contains("..") {
        name = name.replace("..", ".");
    }
    name
}

fn safe_name_from_path(path: &str) -> String {
    let decoded = urlencoding::decode(path).map_or_else(|_| path.into(), |d| d.into_owned());
    safe_name(decoded.trim_start_matches('/'))
}
