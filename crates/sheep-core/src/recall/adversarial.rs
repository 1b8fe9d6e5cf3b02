//! Adversarial-Question Filter
//!
//! Detects name-swapped questions: "What are Melanie's adoption plans?"
//! when every adoption fact is about Caroline. Built from an entity →
//! keyword → count index over active facts; entirely deterministic, no
//! model involvement. A detected swap short-circuits recall with the
//! literal refusal string.

use std::collections::HashMap;

use crate::memory::Fact;
use crate::text;

/// The literal answer returned for detected name swaps
pub const NO_INFORMATION: &str = "No information available.";

/// An entity counts as a person once this many facts mention it
pub const PERSON_FACT_THRESHOLD: usize = 20;

/// Another entity owning this multiple of the named entity's keyword
/// co-occurrences flags the question
const CO_OCCURRENCE_RATIO: usize = 3;

#[derive(Debug, Default)]
struct EntityEntry {
    display: String,
    fact_count: usize,
    keyword_counts: HashMap<String, usize>,
}

/// Entity → keyword → co-occurrence counts over active facts
#[derive(Debug, Default)]
pub struct EntityIndex {
    entities: HashMap<String, EntityEntry>,
}

impl EntityIndex {
    /// Build the index from the active belief set
    pub fn build(facts: &[Fact]) -> Self {
        let mut entities: HashMap<String, EntityEntry> = HashMap::new();
        for fact in facts {
            if !fact.is_active {
                continue;
            }
            let key = fact.subject.trim().to_lowercase();
            if key.is_empty() {
                continue;
            }
            let entry = entities.entry(key).or_default();
            if entry.display.is_empty() {
                entry.display = fact.subject.trim().to_string();
            }
            entry.fact_count += 1;
            let blob = format!("{} {}", fact.predicate.replace('_', " "), fact.object);
            for token in text::content_tokens(&blob, 3) {
                *entry.keyword_counts.entry(token).or_insert(0) += 1;
            }
        }
        Self { entities }
    }

    /// Number of indexed entities
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    fn person_entities(&self) -> impl Iterator<Item = (&String, &EntityEntry)> {
        self.entities
            .iter()
            .filter(|(_, e)| e.fact_count >= PERSON_FACT_THRESHOLD)
    }

    fn keyword_total(&self, entity_key: &str, keywords: &[String]) -> usize {
        let Some(entry) = self.entities.get(entity_key) else {
            return 0;
        };
        keywords
            .iter()
            .map(|k| entry.keyword_counts.get(k).copied().unwrap_or(0))
            .sum()
    }

    /// Whether the question names one person but asks about another
    /// person's material.
    ///
    /// Triggers when, for the question's distinctive keywords, some other
    /// person's co-occurrence count is non-zero while the named person's
    /// is zero, or at least three times the named person's.
    pub fn is_adversarial(&self, query: &str) -> bool {
        // Possessives ("Melanie's") normalize to the bare name
        let tokens: Vec<String> = text::tokenize(query)
            .into_iter()
            .map(|t| t.strip_suffix("'s").map(str::to_string).unwrap_or(t))
            .collect();

        let named: Vec<&String> = self
            .person_entities()
            .filter(|(key, _)| tokens.iter().any(|t| t == *key))
            .map(|(key, _)| key)
            .collect();
        let Some(named_key) = named.first() else {
            return false;
        };

        // Distinctive keywords: content tokens that are not entity names
        let keywords: Vec<String> = tokens
            .iter()
            .filter(|t| t.len() >= 3 && !text::is_stopword(t))
            .filter(|t| !self.entities.contains_key(*t))
            .cloned()
            .collect();
        if keywords.is_empty() {
            return false;
        }

        let named_count = self.keyword_total(named_key, &keywords);
        for (other_key, _) in self.person_entities() {
            if other_key == *named_key {
                continue;
            }
            let other_count = self.keyword_total(other_key, &keywords);
            if (named_count == 0 && other_count > 0)
                || (named_count > 0 && other_count >= CO_OCCURRENCE_RATIO * named_count)
            {
                tracing::debug!(
                    named = %named_key,
                    other = %other_key,
                    named_count,
                    other_count,
                    "adversarial question detected"
                );
                return true;
            }
        }
        false
    }
}
