//! Text helpers shared by order ids, contract rendering and blob paths.

use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

/// Fold text to printable ASCII: accents are stripped ("Canción" -> "Cancion"),
/// whitespace becomes a plain space and anything else outside ASCII becomes `?`.
pub fn ascii_fold(input: &str) -> String {
    input
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .map(|c| {
            if c.is_ascii() && !c.is_ascii_control() {
                c
            } else if c.is_whitespace() {
                ' '
            } else {
                '?'
            }
        })
        .collect()
}

/// Lowercased, accent-free, trimmed form used to compare user-supplied labels.
pub fn fold_key(input: &str) -> String {
    ascii_fold(input.trim()).to_ascii_lowercase()
}

/// File-name safe slug: lowercase ASCII alphanumerics separated by `-`.
pub fn slug(input: &str) -> String {
    const MAX_LEN: usize = 60;

    let mut out = String::with_capacity(input.len());
    let mut pending_dash = false;
    for c in fold_key(input).chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.push(c);
            if out.len() >= MAX_LEN {
                break;
            }
        } else {
            pending_dash = true;
        }
    }
    if out.is_empty() {
        "item".to_string()
    } else {
        out
    }
}

/// Last `n` characters of `s` (all of it when shorter).
pub fn tail(s: &str, n: usize) -> &str {
    match s.char_indices().rev().nth(n.saturating_sub(1)) {
        Some((idx, _)) if n > 0 => &s[idx..],
        _ if n == 0 => "",
        _ => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_fold_strips_accents() {
        assert_eq!(ascii_fold("Canción Ñandú"), "Cancion Nandu");
        assert_eq!(ascii_fold("Beat ★"), "Beat ?");
    }

    #[test]
    fn fold_key_normalizes_case_and_whitespace() {
        assert_eq!(fold_key("  Básica "), "basica");
        assert_eq!(fold_key("ILIMITADA"), "ilimitada");
    }

    #[test]
    fn slug_collapses_separators() {
        assert_eq!(slug("Noche de Verano (Remix)"), "noche-de-verano-remix");
        assert_eq!(slug("  --Ñu!!  "), "nu");
        assert_eq!(slug("★★★"), "item");
    }

    #[test]
    fn tail_counts_characters() {
        assert_eq!(tail("pi_3Nabcdef12345678", 8), "12345678");
        assert_eq!(tail("short", 8), "short");
        assert_eq!(tail("abc", 0), "");
    }
}
