//! Query text normalization
//!
//! A pure, deterministic cleanup pass applied to raw query text before any
//! retrieval: lowercase, punctuation stripped to spaces, whitespace
//! collapsed, and a fixed typo/synonym table applied token-wise. Unknown
//! tokens pass through unchanged and the function is idempotent, so callers
//! may normalize defensively without changing the result.

/// Fixed typo/synonym corrections applied per token.
///
/// Every target is a fixed point of the table (never itself a key), which is
/// what makes `normalize` idempotent.
const TOKEN_ALIASES: &[(&str, &str)] = &[
    ("tee", "tshirt"),
    ("tees", "tshirt"),
    ("tshirts", "tshirt"),
    ("sneekers", "sneakers"),
    ("sneaker", "sneakers"),
    ("trouser", "trousers"),
    ("pant", "trousers"),
    ("pants", "trousers"),
    ("denim", "jeans"),
    ("denims", "jeans"),
    ("blazzer", "blazer"),
    ("blazers", "blazer"),
    ("jacket", "jackets"),
    ("shoe", "shoes"),
    ("colour", "color"),
    ("colours", "color"),
    ("colors", "color"),
    ("weding", "wedding"),
    ("ocassion", "occasion"),
    ("formals", "formal"),
];

fn alias(token: &str) -> &str {
    TOKEN_ALIASES
        .iter()
        .find(|(from, _)| *from == token)
        .map(|(_, to)| *to)
        .unwrap_or(token)
}

/// Normalize raw query text: lowercase, strip non-alphanumerics to spaces,
/// collapse whitespace, and apply the token alias table. Never fails.
pub fn normalize(text: &str) -> String {
    let lowered = text.to_lowercase();
    let cleaned: String = lowered
        .chars()
        .map(|ch| if ch.is_alphanumeric() { ch } else { ' ' })
        .collect();

    cleaned
        .split_whitespace()
        .map(alias)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Tokenize text through the same normalization pass
pub fn tokenize(text: &str) -> Vec<String> {
    normalize(text)
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

/// Collapse text to its alphanumeric characters only ("Flip Flops" -> "flipflops")
pub fn compact(text: &str) -> String {
    normalize(text).chars().filter(|c| c.is_alphanumeric()).collect()
}
