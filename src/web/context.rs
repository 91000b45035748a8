//! Cross-crawler entity context coordination.
//!
//! Tracks entities discovered per investigation and cross-references new
//! content against the known entity strings so crawlers can bias follow-up
//! fetches. New discoveries are broadcast on `context.update`.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde_json::json;

use crate::bus::{topics, MessageBus};
use crate::investigation::InvestigationId;

/// A known entity within an investigation's context.
#[derive(Debug, Clone)]
pub struct ContextEntity {
    /// Original surface form.
    pub text: String,
    pub entity_type: String,
    pub first_seen: DateTime<Utc>,
    pub mention_count: u64,
}

/// Per-investigation entity context shared across the crawler cohort.
pub struct ContextCoordinator {
    bus: MessageBus,
    // Keyed by normalized (lowercase) entity string.
    entities: Mutex<HashMap<InvestigationId, HashMap<String, ContextEntity>>>,
}

impl ContextCoordinator {
    pub fn new(bus: MessageBus) -> Self {
        Self {
            bus,
            entities: Mutex::new(HashMap::new()),
        }
    }

    /// Record entities discovered in an investigation. Returns the subset
    /// that was previously unknown; discoveries are broadcast on
    /// `context.update`.
    pub fn note_entities(
        &self,
        investigation_id: InvestigationId,
        entities: &[(String, String)],
    ) -> Vec<String> {
        let mut new_entities = Vec::new();
        {
            let mut map = self.entities.lock().expect("context lock poisoned");
            let known = map.entry(investigation_id).or_default();
            for (text, entity_type) in entities {
                let key = text.trim().to_lowercase();
                if key.is_empty() {
                    continue;
                }
                match known.get_mut(&key) {
                    Some(entry) => entry.mention_count += 1,
                    None => {
                        known.insert(
                            key,
                            ContextEntity {
                                text: text.trim().to_string(),
                                entity_type: entity_type.clone(),
                                first_seen: Utc::now(),
                                mention_count: 1,
                            },
                        );
                        new_entities.push(text.trim().to_string());
                    }
                }
            }
        }

        if !new_entities.is_empty() {
            self.bus.publish(
                topics::CONTEXT_UPDATE,
                json!({
                    "investigation_id": investigation_id.to_string(),
                    "new_entities": new_entities,
                }),
            );
        }
        new_entities
    }

    /// Cross-reference content against known entity strings. Returns the
    /// surface forms of entities the content mentions.
    pub fn cross_reference(&self, investigation_id: InvestigationId, content: &str) -> Vec<String> {
        let haystack = content.to_lowercase();
        let map = self.entities.lock().expect("context lock poisoned");
        map.get(&investigation_id)
            .map(|known| {
                known
                    .iter()
                    .filter(|(key, _)| haystack.contains(key.as_str()))
                    .map(|(_, entity)| entity.text.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// All known entity surface forms for an investigation.
    pub fn known_entities(&self, investigation_id: InvestigationId) -> Vec<String> {
        let map = self.entities.lock().expect("context lock poisoned");
        map.get(&investigation_id)
            .map(|known| known.values().map(|e| e.text.clone()).collect())
            .unwrap_or_default()
    }

    pub fn entity_count(&self, investigation_id: InvestigationId) -> usize {
        let map = self.entities.lock().expect("context lock poisoned");
        map.get(&investigation_id).map(HashMap::len).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn person(name: &str) -> (String, String) {
        (name.to_string(), "PERSON".to_string())
    }

    #[tokio::test]
    async fn discoveries_are_broadcast_once() {
        let bus = MessageBus::new();
        let updates = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&updates);
        bus.subscribe_fn(topics::CONTEXT_UPDATE, move |_msg| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });

        let coordinator = ContextCoordinator::new(bus.clone());
        let inv = InvestigationId::new();

        let first = coordinator.note_entities(inv, &[person("Aleksandar Vucic")]);
        assert_eq!(first, vec!["Aleksandar Vucic"]);
        // Re-noting the same entity is not a discovery.
        let second = coordinator.note_entities(inv, &[person("aleksandar vucic")]);
        assert!(second.is_empty());

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(updates.load(Ordering::SeqCst), 1);
        bus.teardown();
    }

    #[tokio::test]
    async fn cross_reference_matches_known_strings() {
        let coordinator = ContextCoordinator::new(MessageBus::new());
        let inv = InvestigationId::new();
        coordinator.note_entities(
            inv,
            &[person("Putin"), ("Beijing".to_string(), "LOCATION".to_string())],
        );

        let hits = coordinator.cross_reference(inv, "PUTIN arrived in Beijing on Tuesday");
        assert_eq!(hits.len(), 2);
        assert!(coordinator
            .cross_reference(inv, "unrelated content")
            .is_empty());
        // Context is investigation-scoped.
        assert!(coordinator
            .cross_reference(InvestigationId::new(), "Putin in Beijing")
            .is_empty());
    }
}
