//! Dish name to on-disk filename mapping.
//!
//! New images are always written under [`sanitize`]. Older runs used other
//! conventions, so [`resolve`] also checks those before a dish is regenerated.

use std::path::Path;

use crate::fingerprint::fingerprint;

pub const CANONICAL_EXTENSION: &str = "png";
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp"];
pub const MAX_STEM_CHARS: usize = 50;

/// Canonical filename for a dish, e.g. `"Carne Asada & Rice"` -> `carne_asada_rice.png`.
#[must_use]
pub fn sanitize(dish: &str) -> String {
    format!("{}.{CANONICAL_EXTENSION}", sanitize_stem(dish))
}

/// Canonical stem: ASCII letters and digits only, words joined by `_`,
/// at most [`MAX_STEM_CHARS`], lowercase.
#[must_use]
pub fn sanitize_stem(dish: &str) -> String {
    let mut stem = dish
        .split(|c: char| c.is_whitespace() || c == '_' || c == '-')
        .map(|w| w.chars().filter(char::is_ascii_alphanumeric).collect::<String>())
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join("_");
    stem.truncate(MAX_STEM_CHARS);
    let stem = stem.trim_matches('_').to_ascii_lowercase();

    if stem.is_empty() {
        // Names with no ASCII alphanumerics still need distinct files.
        format!("dish_{}", &fingerprint(dish.trim().as_bytes())[..8])
    } else {
        stem
    }
}

/// The earlier case-folding convention: `&` -> `and`, `+` -> `plus`.
fn legacy_folded_stem(dish: &str) -> String {
    let mut s = String::with_capacity(dish.len());
    for c in dish.chars() {
        match c {
            ' ' | '/' | '\\' | '-' => s.push('_'),
            '&' => s.push_str("and"),
            '+' => s.push_str("plus"),
            '(' | ')' | '[' | ']' | '{' | '}' | ':' | ';' | ',' | '.' | '!' | '?' | '"'
            | '\'' => {}
            other => s.push(other),
        }
    }
    while s.contains("__") {
        s = s.replace("__", "_");
    }
    s.trim_matches('_')
        .chars()
        .take(MAX_STEM_CHARS)
        .collect::<String>()
        .to_lowercase()
}

/// Exact legacy names, most specific first.
fn legacy_candidates(dish: &str) -> Vec<String> {
    let raw = dish.trim().replace(' ', "_");
    let mut out = Vec::with_capacity(16);

    out.push(format!("{raw}.{CANONICAL_EXTENSION}"));
    out.extend((0..10).map(|i| format!("{raw}_{i}.{CANONICAL_EXTENSION}")));

    let lower = raw.to_lowercase();
    out.extend(["png", "jpg", "jpeg"].iter().map(|ext| format!("{lower}.{ext}")));

    let folded = legacy_folded_stem(dish);
    if !folded.is_empty() {
        out.push(format!("{folded}.{CANONICAL_EXTENSION}"));
    }

    out.dedup();
    out
}

/// A bare filename that can't walk out of its directory.
#[must_use]
pub fn is_safe_filename(name: &str) -> bool {
    !name.is_empty() && !name.contains(['/', '\\', '\0']) && !name.contains("..")
}

fn has_image_extension(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| IMAGE_EXTENSIONS.iter().any(|x| e.eq_ignore_ascii_case(x)))
}

fn exists(dir: &Path, name: &str) -> bool {
    is_safe_filename(name) && dir.join(name).is_file()
}

/// Finds an image already on disk for `dish`.
///
/// Order: canonical name in every supported extension, then exact legacy
/// names, then a sorted directory scan for a file naming every word of the
/// dish or starting with its underscored form.
#[must_use]
pub fn resolve(dish: &str, dir: &Path) -> Option<String> {
    let stem = sanitize_stem(dish);
    if let Some(name) = IMAGE_EXTENSIONS
        .iter()
        .map(|ext| format!("{stem}.{ext}"))
        .find(|name| exists(dir, name))
    {
        tracing::debug!(%dish, %name, "found canonical image");
        return Some(name);
    }

    if let Some(name) = legacy_candidates(dish).into_iter().find(|n| exists(dir, n)) {
        tracing::info!(%dish, %name, "found image under legacy name");
        return Some(name);
    }

    let found = scan_for_match(dish, dir);
    if let Some(name) = &found {
        tracing::info!(%dish, %name, "found image by partial match");
    }
    found
}

fn scan_for_match(dish: &str, dir: &Path) -> Option<String> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::debug!(dir = %dir.display(), error = %e, "cannot scan output directory");
            return None;
        }
    };

    let mut names: Vec<String> = entries
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_ok_and(|t| t.is_file()))
        .filter_map(|e| e.file_name().into_string().ok())
        .filter(|n| has_image_extension(n))
        .collect();
    names.sort();

    let dish_lower = dish.trim().to_lowercase();
    let words: Vec<&str> = dish_lower.split_whitespace().collect();
    let prefix = dish_lower.replace(' ', "_");

    names.into_iter().find(|name| {
        let lower = name.to_lowercase();
        let all_words = !words.is_empty() && words.iter().all(|w| lower.contains(w));
        let prefixed = !prefix.is_empty() && lower.starts_with(&prefix);
        all_words || prefixed
    })
}

/// Werkzeug-style safe name for a stored upload; `None` if nothing survives.
#[must_use]
pub fn secure_upload_name(name: &str) -> Option<String> {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
        .collect();
    let cleaned = cleaned.trim_matches(['.', '_']).to_string();
    (!cleaned.is_empty() && is_safe_filename(&cleaned)).then_some(cleaned)
}

/// Name an upload is stored under. Falls back to `upload_<hash prefix>`
/// when sanitizing leaves nothing usable, keeping a known image extension so
/// the stored file still advertises its type.
#[must_use]
pub fn stored_upload_name(original: &str, hash: &str) -> String {
    let ext = Path::new(original.trim())
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .filter(|e| IMAGE_EXTENSIONS.contains(&e.as_str()));

    match (secure_upload_name(original), ext) {
        (Some(name), None) => name,
        (Some(name), Some(_)) if Path::new(&name).extension().is_some() => name,
        (_, Some(ext)) => format!("upload_{}.{ext}", &hash[..12]),
        (None, None) => format!("upload_{}", &hash[..12]),
    }
}
