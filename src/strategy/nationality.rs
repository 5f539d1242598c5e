//! Nationality cascade: cache → synonyms → garbage guard → known locality → AI

use super::ResolveError;
use crate::ai::AiResolver;
use crate::cache::{CachedValue, ResolutionCache};
use crate::normalize::{fold, is_alphabetic_words};
use crate::tables::{is_target_country, ReferenceTables, TARGET_COUNTRY, UNSPECIFIED};
use crate::types::{Confidence, NationalityResult, ResolutionKey};
use std::sync::Arc;
use tracing::{debug, warn};

/// Shortest folded value worth classifying.
const MIN_KEY_CHARS: usize = 3;

/// The tier that produced a nationality result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Cache,
    Synonym,
    GarbageGuard,
    KnownLocality,
    Ai,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cache => "cache",
            Self::Synonym => "synonym",
            Self::GarbageGuard => "garbage_guard",
            Self::KnownLocality => "known_locality",
            Self::Ai => "ai",
        }
    }
}

/// Classifies declared nationalities.
pub struct NationalityResolver {
    tables: Arc<ReferenceTables>,
    cache: Arc<dyn ResolutionCache>,
    ai: Arc<AiResolver>,
}

impl NationalityResolver {
    pub fn new(
        tables: Arc<ReferenceTables>,
        cache: Arc<dyn ResolutionCache>,
        ai: Arc<AiResolver>,
    ) -> Self {
        Self { tables, cache, ai }
    }

    /// Cache key: the folded nationality, joined with the folded birthplace
    /// when one is given (the AI tier may answer differently with it).
    pub fn key(declared: &str, birthplace: Option<&str>) -> ResolutionKey {
        match birthplace.filter(|b| !fold(b).is_empty()) {
            Some(place) => ResolutionKey::composite([declared, place]),
            None => ResolutionKey::single(declared),
        }
    }

    /// Resolve a declared nationality, optionally helped by a birthplace.
    pub async fn resolve(
        &self,
        declared: &str,
        birthplace: Option<&str>,
    ) -> Result<NationalityResult, ResolveError> {
        self.resolve_with_tier(declared, birthplace)
            .await
            .map(|(result, _)| result)
    }

    /// Like `resolve`, also reporting which tier answered.
    pub async fn resolve_with_tier(
        &self,
        declared: &str,
        birthplace: Option<&str>,
    ) -> Result<(NationalityResult, Tier), ResolveError> {
        let key = Self::key(declared, birthplace);

        match self.cache.get_nationality(&key) {
            Ok(Some(cached)) => {
                debug!(%key, "nationality cache hit");
                return Ok((cached, Tier::Cache));
            }
            Ok(None) => {}
            Err(e) => warn!(%key, error = %e, "nationality cache read failed; resolving anyway"),
        }

        let (result, tier) = self.classify(declared, birthplace).await?;
        debug!(%key, tier = tier.as_str(), normalized = %result.normalized_name, "nationality resolved");

        if let Err(e) = self
            .cache
            .put(&key, &CachedValue::Nationality(result.clone()))
        {
            warn!(%key, error = %e, "nationality cache write failed");
        }
        Ok((result, tier))
    }

    /// Tiers 2–5. Tiers 2–4 are deterministic and never leave the process.
    async fn classify(
        &self,
        declared: &str,
        birthplace: Option<&str>,
    ) -> Result<(NationalityResult, Tier), ResolveError> {
        let folded = fold(declared);

        if let Some(label) = self.tables.synonyms.lookup(&folded) {
            let confidence = if label == UNSPECIFIED {
                Confidence::Low
            } else {
                Confidence::High
            };
            let result = NationalityResult::new(is_target_country(label), label, confidence);
            return Ok((result, Tier::Synonym));
        }

        // A blank nationality next to a usable birthplace still goes to the model.
        let birthplace_only =
            folded.is_empty() && birthplace.map(fold).is_some_and(|b| is_usable(&b));
        if !birthplace_only && !is_usable(&folded) {
            let result = NationalityResult::new(false, UNSPECIFIED, Confidence::Low);
            return Ok((result, Tier::GarbageGuard));
        }

        if self.tables.known_localities.contains(&folded) {
            let result = NationalityResult::new(true, TARGET_COUNTRY, Confidence::Medium);
            return Ok((result, Tier::KnownLocality));
        }

        let result = self.ai.resolve(declared, birthplace).await?;
        Ok((result, Tier::Ai))
    }
}

fn is_usable(folded: &str) -> bool {
    folded.chars().count() >= MIN_KEY_CHARS && is_alphabetic_words(folded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::{AiError, MockCompletionClient};
    use crate::cache::{OpenCache, SqliteCache};
    use crate::retry::{RecordingSleeper, RetryPolicy};
    use std::time::Duration;

    struct Fixture {
        resolver: NationalityResolver,
        ai: Arc<MockCompletionClient>,
        cache: Arc<SqliteCache>,
    }

    fn fixture(ai: MockCompletionClient) -> Fixture {
        let ai = Arc::new(ai);
        let cache = Arc::new(SqliteCache::open_in_memory().unwrap());
        let ai_resolver = AiResolver::new(ai.clone())
            .with_retry(RetryPolicy::new(3, Duration::from_secs(2)))
            .with_sleeper(Arc::new(RecordingSleeper::new()));
        let resolver = NationalityResolver::new(
            Arc::new(ReferenceTables::builtin()),
            cache.clone(),
            Arc::new(ai_resolver),
        );
        Fixture { resolver, ai, cache }
    }

    #[tokio::test]
    async fn synonym_hit_is_high_confidence() {
        let f = fixture(MockCompletionClient::new());
        let (result, tier) = f.resolver.resolve_with_tier("ATGENTINA", None).await.unwrap();
        assert_eq!(tier, Tier::Synonym);
        assert_eq!(result, NationalityResult::new(true, "Argentina", Confidence::High));
        assert_eq!(f.ai.call_count(), 0);
    }

    #[tokio::test]
    async fn unspecified_synonym_is_low_confidence() {
        let f = fixture(MockCompletionClient::new());
        let result = f.resolver.resolve("Extraterrestre", None).await.unwrap();
        assert_eq!(result, NationalityResult::new(false, UNSPECIFIED, Confidence::Low));
    }

    #[tokio::test]
    async fn garbage_guard_never_calls_ai() {
        let f = fixture(MockCompletionClient::replying("argentina"));
        for garbage in ["", "ab", "x1", "arg3ntina", "???", "12345", "per."] {
            let (result, tier) = f.resolver.resolve_with_tier(garbage, None).await.unwrap();
            assert_eq!(tier, Tier::GarbageGuard, "input {:?}", garbage);
            assert!(!result.is_target_country);
            assert_eq!(result.confidence, Confidence::Low);
        }
        assert_eq!(f.ai.call_count(), 0);
    }

    #[tokio::test]
    async fn known_locality_is_medium_positive() {
        let f = fixture(MockCompletionClient::new());
        let (result, tier) = f.resolver.resolve_with_tier("Morón", None).await.unwrap();
        assert_eq!(tier, Tier::KnownLocality);
        assert_eq!(result, NationalityResult::new(true, "Argentina", Confidence::Medium));

        let (_, tier) = f
            .resolver
            .resolve_with_tier("General Rodríguez", None)
            .await
            .unwrap();
        assert_eq!(tier, Tier::KnownLocality);
    }

    #[tokio::test]
    async fn unknown_value_goes_to_ai() {
        let f = fixture(MockCompletionClient::replying(
            r#"{"es_argentino": false, "nacionalidad_normalizada": "Francia", "confianza": "alta"}"#,
        ));
        let (result, tier) = f.resolver.resolve_with_tier("francesa", None).await.unwrap();
        assert_eq!(tier, Tier::Ai);
        assert_eq!(result.normalized_name, "Francia");
        assert_eq!(f.ai.call_count(), 1);
    }

    #[tokio::test]
    async fn second_resolution_is_served_from_cache() {
        let f = fixture(MockCompletionClient::replying(
            r#"{"es_argentino": false, "nacionalidad_normalizada": "Brasil", "confianza": "media"}"#,
        ));
        let first = f.resolver.resolve("brasil", None).await.unwrap();
        let (second, tier) = f.resolver.resolve_with_tier("BRASIL ", None).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(tier, Tier::Cache);
        assert_eq!(f.ai.call_count(), 1);
        assert_eq!(f.cache.len().unwrap(), 1);
    }

    #[tokio::test]
    async fn deterministic_tiers_are_cached_too() {
        let f = fixture(MockCompletionClient::new());
        f.resolver.resolve("argentino", None).await.unwrap();
        f.resolver.resolve("x", None).await.unwrap();
        assert_eq!(f.cache.len().unwrap(), 2);
    }

    #[tokio::test]
    async fn birthplace_reaches_prompt_and_key() {
        let f = fixture(MockCompletionClient::replying("argentina"));
        let result = f
            .resolver
            .resolve("boliviana", Some("Rosario"))
            .await
            .unwrap();
        assert!(result.is_target_country);

        let prompts = f.ai.prompts();
        assert!(prompts[0].contains("Lugar de nacimiento: \"Rosario\""));

        let key = NationalityResolver::key("boliviana", Some("Rosario"));
        assert_eq!(key.as_str(), "boliviana|rosario");
        assert!(f.cache.get_nationality(&key).unwrap().is_some());
        assert!(f
            .cache
            .get_nationality(&ResolutionKey::single("boliviana"))
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn exhausted_ai_is_a_row_error_and_not_cached() {
        let f = fixture(MockCompletionClient::new().with_error(AiError::Timeout("t".into())));
        let err = f.resolver.resolve("klingon", None).await.unwrap_err();
        assert!(matches!(err, ResolveError::Ai(_)));
        assert_eq!(f.cache.len().unwrap(), 0);
    }

    #[tokio::test]
    async fn blank_nationality_with_birthplace_asks_the_model() {
        let f = fixture(MockCompletionClient::replying(
            r#"{"es_argentino": false, "nacionalidad_normalizada": "Paraguay", "confianza": "media"}"#,
        ));
        let (result, tier) = f
            .resolver
            .resolve_with_tier("  ", Some("Asunción"))
            .await
            .unwrap();
        assert_eq!(tier, Tier::Ai);
        assert_eq!(result.normalized_name, "Paraguay");

        let prompt = &f.ai.prompts()[0];
        assert!(prompt.contains("Lugar de nacimiento: \"Asunción\""));
        assert!(!prompt.contains("Nacionalidad: "));
        assert!(!prompt.contains("prioriza"));
    }

    #[tokio::test]
    async fn blank_nationality_with_garbage_birthplace_is_guarded() {
        let f = fixture(MockCompletionClient::replying("argentina"));
        for place in ["", "x", "123"] {
            let (_, tier) = f.resolver.resolve_with_tier("", Some(place)).await.unwrap();
            assert_eq!(tier, Tier::GarbageGuard, "birthplace {:?}", place);
        }
        assert_eq!(f.ai.call_count(), 0);
    }
}
