use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Folds text for matching: lowercase, diacritics stripped, and every
/// character outside `[a-z0-9 ]` dropped.
///
/// The output alphabet is closed under the same transformation, so the
/// function is idempotent.
pub fn normalize_text(input: &str) -> String {
    input
        .to_lowercase()
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == ' ')
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_romanian_diacritics() {
        assert_eq!(normalize_text("Știri Externe"), "stiri externe");
        assert_eq!(normalize_text("Sănătate și fitness"), "sanatate si fitness");
        assert_eq!(normalize_text("ÎNCHISOARE"), "inchisoare");
        assert_eq!(normalize_text("Țară"), "tara");
    }

    #[test]
    fn drops_punctuation_but_keeps_spaces_and_digits() {
        assert_eq!(normalize_text("Sci-Tech, 2025!"), "scitech 2025");
        assert_eq!(normalize_text("a\tb"), "ab");
        assert_eq!(normalize_text(""), "");
    }

    #[test]
    fn is_idempotent() {
        for sample in [
            "Cutremur PUTERNIC în România.",
            "Ångström — naïve café",
            "İstanbul ǅemal",
            "  spaced   out  ",
            "日本語 text",
            "",
        ] {
            let once = normalize_text(sample);
            assert_eq!(normalize_text(&once), once, "sample {sample:?}");
        }
    }
}
