//! Lenient text comparison for free-form answers.

use unicode_normalization::UnicodeNormalization;

/// Punctuation that survives NFKC and is not ASCII.
const EXTRA_PUNCTUATION: &[char] = &[
    '¿', '¡', '«', '»', '“', '”', '‘', '’', '„', '…', '—', '–', '·', '。', '、', '「', '」', '『',
    '』', '【', '】', '〈', '〉', '《', '》', '・', '〜',
];

fn is_punctuation(c: char) -> bool {
    c.is_ascii_punctuation() || EXTRA_PUNCTUATION.contains(&c)
}

/// NFKC, lower-case, drop punctuation and collapse whitespace.
///
/// `"¿Dónde  ESTÁ?"` and `"dónde está"` normalize to the same string;
/// full-width forms fold to their ASCII equivalents.
pub fn normalize(text: &str) -> String {
    let folded: String = text
        .nfkc()
        .flat_map(char::to_lowercase)
        .filter(|c| !is_punctuation(*c))
        .collect();
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Normalize every token, dropping those that become empty.
pub fn normalize_tokens<S: AsRef<str>>(tokens: &[S]) -> Vec<String> {
    tokens
        .iter()
        .map(|t| normalize(t.as_ref()))
        .filter(|t| !t.is_empty())
        .collect()
}
