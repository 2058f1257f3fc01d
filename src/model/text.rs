//! Text normalization shared by cache keys, match scoring and release counters.

/// Names that stand in for a missing artist.
pub const PLACEHOLDER_ARTISTS: &[&str] = &[
    "",
    "unknown",
    "unknown artist",
    "unknownartist",
    "artist",
    "n/a",
    "na",
    "none",
    "untitled",
    "-",
    "?",
];

/// Lowercase, replace punctuation with spaces, collapse whitespace and drop a
/// leading "the ".
pub fn normalize(s: &str) -> String {
    let lowered: String = s
        .chars()
        .map(|c| {
            if c.is_alphanumeric() {
                c.to_lowercase().next().unwrap_or(c)
            } else {
                ' '
            }
        })
        .collect();
    let collapsed = lowered.split_whitespace().collect::<Vec<_>>().join(" ");
    match collapsed.strip_prefix("the ") {
        Some(rest) if !rest.is_empty() => rest.to_string(),
        _ => collapsed,
    }
}

/// Normalized word tokens.
pub fn tokens(s: &str) -> Vec<String> {
    normalize(s).split(' ').filter(|t| !t.is_empty()).map(str::to_string).collect()
}

/// True for empty or placeholder artist names such as "Unknown Artist".
pub fn is_placeholder_artist(artist: Option<&str>) -> bool {
    match artist {
        None => true,
        Some(a) => {
            let trimmed = a.trim().to_lowercase();
            PLACEHOLDER_ARTISTS.contains(&trimmed.as_str())
        }
    }
}

/// Case-insensitive whole-word (or whole-phrase) containment.
///
/// `"white label"` matches `"A White Label Release"` but `"wl"` does not match
/// `"owl"`.
pub fn contains_phrase(haystack: &str, phrase: &str) -> bool {
    let hay = tokens(haystack);
    let needle = tokens(phrase);
    if needle.is_empty() || needle.len() > hay.len() {
        return false;
    }
    hay.windows(needle.len()).any(|w| w == needle.as_slice())
}

/// Keyword at the head of a catalog token, possibly glued to digits:
/// `"WHITE001"` and `"WL-12"` carry `"white"` and `"wl"`, `"WLD001"` does not
/// carry `"wl"`.
pub fn contains_keyword_prefix(haystack: &str, keyword: &str) -> bool {
    let kw = normalize(keyword);
    if kw.is_empty() {
        return false;
    }
    tokens(haystack)
        .iter()
        .any(|t| t.trim_end_matches(|c: char| c.is_ascii_digit()) == kw)
}

/// Alphabetic prefix of a sequential catalog number: `"WHITE001"` and
/// `"WHITE 001"` give `"white"`; numbers without a trailing digit run give
/// `None`.
pub fn catalog_prefix(catalog_number: &str) -> Option<String> {
    let compact: String = catalog_number
        .chars()
        .filter(|c| c.is_alphanumeric())
        .collect();
    let letters: String = compact.chars().take_while(|c| c.is_alphabetic()).collect();
    let rest = &compact[letters.len()..];
    if letters.is_empty() || rest.is_empty() || !rest.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    Some(letters.to_lowercase())
}
