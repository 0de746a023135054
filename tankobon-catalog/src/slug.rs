//! URL-safe slug derivation for series.

/// Maximum slug length; long titles are cut at a hyphen boundary.
const MAX_SLUG_LEN: usize = 64;

/// Derive a URL-safe slug from a display title.
///
/// Lowercases, maps runs of non-alphanumeric characters to single hyphens,
/// and trims leading/trailing hyphens. Returns an empty string when the
/// title contains no usable characters (e.g. titles written entirely in
/// scripts outside ASCII) — callers fall back to [`synthesized_slug`].
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut last_hyphen = true;
    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
            last_hyphen = false;
        } else if !last_hyphen {
            slug.push('-');
            last_hyphen = true;
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    if slug.len() > MAX_SLUG_LEN {
        let cut = slug[..MAX_SLUG_LEN]
            .rfind('-')
            .unwrap_or(MAX_SLUG_LEN);
        slug.truncate(cut);
    }
    slug
}

/// Fallback slug synthesized from an external id when no usable title exists.
pub fn synthesized_slug(external_id: &str) -> String {
    let prefix: String = external_id
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(12)
        .collect::<String>()
        .to_lowercase();
    if prefix.is_empty() {
        "series-unknown".to_string()
    } else {
        format!("series-{prefix}")
    }
}
