use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Normalizes text for embedding and lexical matching.
///
/// Lowercases, decomposes accented characters to their ASCII base form
/// (dropping combining marks and anything with no ASCII equivalent),
/// removes punctuation, and collapses whitespace runs to single spaces.
///
/// Idempotent: `normalize(normalize(s)) == normalize(s)`.
pub fn normalize(text: &str) -> String {
    let stripped: String = text
        .to_lowercase()
        .nfkd()
        .filter(|c| !is_combining_mark(*c))
        .filter(|c| c.is_ascii())
        .filter(|c| c.is_ascii_alphanumeric() || c.is_ascii_whitespace())
        .collect();

    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowercases_and_strips_punctuation() {
        assert_eq!(normalize("Hello, World!"), "hello world");
    }

    #[test]
    fn decomposes_spanish_diacritics() {
        assert_eq!(
            normalize("¿Qué es el Artículo 5?"),
            "que es el articulo 5"
        );
    }

    #[test]
    fn collapses_whitespace_and_trims() {
        assert_eq!(normalize("  ley   de \n\n presupuesto  "), "ley de presupuesto");
    }

    #[test]
    fn drops_characters_without_ascii_equivalent() {
        assert_eq!(normalize("ley ◆ 5 漢字"), "ley 5");
    }

    #[test]
    fn empty_maps_to_empty() {
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("   \t\n"), "");
    }

    #[test]
    fn is_idempotent() {
        let samples = [
            "¿Qué es el Artículo 5?",
            "TÍTULO II — Régimen Económico",
            "  plain   text  ",
            "números 1, 2 y 3",
        ];
        for s in samples {
            let once = normalize(s);
            assert_eq!(normalize(&once), once);
        }
    }
}
