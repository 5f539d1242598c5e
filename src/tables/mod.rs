//! Static reference data consulted before any remote tier
//!
//! `ReferenceTables` is built once at startup and shared read-only by every
//! resolver through an `Arc`. Nothing here is mutated after construction.

mod hints;
mod synonyms;

pub use hints::{HintTable, TableError};
pub(crate) use hints::canonical_postal_code;
pub use synonyms::{KnownLocalities, SynonymTable};

use crate::normalize::fold;

/// Canonical label of the country the engine classifies against.
pub const TARGET_COUNTRY: &str = "Argentina";

/// Folded stem matched against free-form AI output ("argentina", "argentino", ...).
pub const TARGET_COUNTRY_STEM: &str = "argentin";

/// Canonical label for "no usable nationality".
pub const UNSPECIFIED: &str = "No especificada";

/// Folded values that mean "the user did not specify anything".
const UNSPECIFIED_SENTINELS: &[&str] = &[
    "",
    "-",
    "n/a",
    "s/d",
    "sin dato",
    "sin datos",
    "no definida",
    "no especificada",
    "no especificado",
    "no informada",
    "no informado",
];

/// True when the text folds to one of the "unspecified" sentinels.
pub fn is_unspecified(text: &str) -> bool {
    let folded = fold(text);
    UNSPECIFIED_SENTINELS.contains(&folded.as_str())
}

/// True when a canonical label denotes the target country.
pub fn is_target_country(label: &str) -> bool {
    fold(label) == fold(TARGET_COUNTRY)
}

/// Immutable bundle of lookup tables handed to every resolver.
#[derive(Debug, Clone, Default)]
pub struct ReferenceTables {
    pub synonyms: SynonymTable,
    pub known_localities: KnownLocalities,
    pub hints: HintTable,
}

impl ReferenceTables {
    /// Built-in synonym and locality tables, no postal-code hints.
    pub fn builtin() -> Self {
        Self::default()
    }

    pub fn with_hints(mut self, hints: HintTable) -> Self {
        self.hints = hints;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinels_are_matched_after_folding() {
        assert!(is_unspecified(""));
        assert!(is_unspecified("  "));
        assert!(is_unspecified("No Especificado"));
        assert!(is_unspecified("SIN DATO"));
        assert!(is_unspecified("S/D"));
        assert!(!is_unspecified("Buenos Aires"));
    }

    #[test]
    fn target_country_comparison_ignores_accents() {
        assert!(is_target_country("ARGÉNTINA"));
        assert!(!is_target_country(UNSPECIFIED));
    }
}
