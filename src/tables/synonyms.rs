//! Alias → canonical nationality table and the implicitly-domestic locality set

use std::collections::{HashMap, HashSet};

/// Built-in aliases, keyed by folded form.
const NATIONALITY_ALIASES: &[(&str, &str)] = &[
    ("argentina", "Argentina"),
    ("argentino", "Argentina"),
    ("arg", "Argentina"),
    ("argenitno", "Argentina"),
    ("arentina", "Argentina"),
    ("atgentina", "Argentina"),
    ("atgentine", "Argentina"),
    ("argentinage", "Argentina"),
    ("argentinian", "Argentina"),
    ("argentine", "Argentina"),
    ("buenos aires", "Argentina"),
    ("caba", "Argentina"),
    ("puana", "Argentina"),
    ("no definida", "No especificada"),
    ("no especificada", "No especificada"),
    ("sin dato", "No especificada"),
    ("n/a", "No especificada"),
    ("extraterrestre", "No especificada"),
];

/// Local place names that users write in the nationality field.
const DOMESTIC_LOCALITIES: &[&str] = &[
    "avellaneda",
    "lujan",
    "laprida",
    "moron",
    "rosario",
    "general rodriguez",
    "san isidro",
    "quilmes",
];

/// Exact-match alias table. Keys must already be folded.
///
/// No partial or fuzzy matching: a miss here sends the value down the
/// cascade instead of guessing.
#[derive(Debug, Clone)]
pub struct SynonymTable {
    entries: HashMap<String, String>,
}

impl SynonymTable {
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            entries: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn lookup(&self, folded_key: &str) -> Option<&str> {
        self.entries.get(folded_key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for SynonymTable {
    fn default() -> Self {
        Self::from_pairs(NATIONALITY_ALIASES.iter().copied())
    }
}

/// Folded locality names treated as implying the target nationality.
#[derive(Debug, Clone)]
pub struct KnownLocalities {
    names: HashSet<String>,
}

impl KnownLocalities {
    pub fn from_names<S: Into<String>>(names: impl IntoIterator<Item = S>) -> Self {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn contains(&self, folded_key: &str) -> bool {
        self.names.contains(folded_key)
    }
}

impl Default for KnownLocalities {
    fn default() -> Self {
        Self::from_names(DOMESTIC_LOCALITIES.iter().copied())
    }
}
