//! `event.processor` - windowed event pattern matcher
//!
//! Maintains per-pattern sliding windows of received events and dispatches
//! to a bound handler when a pattern fires. Broker adapters feed it by
//! parsing messages into events.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use weft_core::{Application, LifecycleError, Module};

use crate::plugin::ModuleFactoryRegistry;

pub(crate) fn register(registry: &mut ModuleFactoryRegistry) {
    registry.register("event.processor", |config| {
        Ok(Arc::new(EventProcessorModule {
            name: config.name.clone(),
            processor: Arc::new(EventProcessor::default()),
        }))
    });
}

// =============================================================================
// Events & Patterns
// =============================================================================

/// One ingested event
#[derive(Debug, Clone)]
pub struct Event {
    pub event_type: String,
    pub source_id: Option<String>,
    pub correlation_id: Option<String>,
    pub data: Value,
    pub at: DateTime<Utc>,
}

/// Callback bound to a pattern
#[async_trait]
pub trait EventPatternHandler: Send + Sync {
    /// Called with the window contents when the pattern fires
    async fn on_match(&self, pattern: &str, events: &[Event]) -> Result<(), String>;
}

/// Declarative pattern: which events, over which window, firing when
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternConfig {
    /// Pattern id, referenced by handler bindings
    pub id: String,

    /// Event types the window collects
    pub event_types: Vec<String>,

    /// Sliding window length, e.g. `"30s"`
    pub window_time: String,

    /// `count` or `sequence`
    #[serde(default = "default_condition")]
    pub condition: String,

    /// Minimum occurrences before a `count` pattern fires
    #[serde(default = "default_min_occurs")]
    pub min_occurs: usize,

    /// Optional upper bound; windows past it do not fire
    #[serde(default)]
    pub max_occurs: Option<usize>,

    /// For `sequence`: event types must arrive in declared order
    #[serde(default)]
    pub order_matters: bool,
}

fn default_condition() -> String {
    "count".to_string()
}

const fn default_min_occurs() -> usize {
    1
}

struct PatternState {
    config: PatternConfig,
    window_time: Duration,
    window: VecDeque<Event>,
    handler: Option<Arc<dyn EventPatternHandler>>,
}

// =============================================================================
// Processor
// =============================================================================

/// Sliding-window pattern matcher, registered under the module's name
#[derive(Default)]
pub struct EventProcessor {
    patterns: Mutex<Vec<PatternState>>,
}

impl EventProcessor {
    /// Add a pattern
    pub fn add_pattern(&self, config: PatternConfig) -> Result<(), String> {
        let window_time = weft_config::parse_duration(&config.window_time)
            .map_err(|err| err.to_string())?;
        let mut patterns = self.patterns.lock().unwrap_or_else(|e| e.into_inner());
        patterns.push(PatternState {
            config,
            window_time,
            window: VecDeque::new(),
            handler: None,
        });
        Ok(())
    }

    /// Bind a handler to a pattern id
    pub fn bind_handler(
        &self,
        pattern_id: &str,
        handler: Arc<dyn EventPatternHandler>,
    ) -> Result<(), String> {
        let mut patterns = self.patterns.lock().unwrap_or_else(|e| e.into_inner());
        let pattern = patterns
            .iter_mut()
            .find(|p| p.config.id == pattern_id)
            .ok_or_else(|| format!("unknown pattern '{pattern_id}'"))?;
        pattern.handler = Some(handler);
        Ok(())
    }

    /// Feed one event through every pattern window
    pub async fn ingest(&self, event: Event) {
        // Collect fired dispatches under the lock, run them after.
        let mut fired: Vec<(String, Vec<Event>, Arc<dyn EventPatternHandler>)> = Vec::new();

        {
            let mut patterns = self.patterns.lock().unwrap_or_else(|e| e.into_inner());
            for pattern in patterns.iter_mut() {
                if !pattern.config.event_types.contains(&event.event_type) {
                    continue;
                }
                pattern.window.push_back(event.clone());
                prune_window(pattern, Utc::now());

                if pattern_fires(pattern) {
                    let events: Vec<Event> = pattern.window.drain(..).collect();
                    if let Some(handler) = pattern.handler.clone() {
                        fired.push((pattern.config.id.clone(), events, handler));
                    }
                }
            }
        }

        for (pattern_id, events, handler) in fired {
            if let Err(err) = handler.on_match(&pattern_id, &events).await {
                tracing::warn!(pattern = %pattern_id, error = %err, "event pattern handler failed");
            }
        }
    }

    /// Number of registered patterns
    #[must_use]
    pub fn pattern_count(&self) -> usize {
        let patterns = self.patterns.lock().unwrap_or_else(|e| e.into_inner());
        patterns.len()
    }
}

fn prune_window(pattern: &mut PatternState, now: DateTime<Utc>) {
    let Ok(window) = chrono::Duration::from_std(pattern.window_time) else {
        return;
    };
    let horizon = now - window;
    while pattern
        .window
        .front()
        .is_some_and(|event| event.at < horizon)
    {
        pattern.window.pop_front();
    }
}

fn pattern_fires(pattern: &PatternState) -> bool {
    let config = &pattern.config;
    match config.condition.as_str() {
        "sequence" => sequence_present(pattern),
        // "count" and anything unrecognized degrade to counting.
        _ => {
            let len = pattern.window.len();
            len >= config.min_occurs && config.max_occurs.is_none_or(|max| len <= max)
        }
    }
}

/// For sequences: every declared type present; in declared order when
/// `order_matters`.
fn sequence_present(pattern: &PatternState) -> bool {
    let config = &pattern.config;
    if config.order_matters {
        let mut expected = config.event_types.iter();
        let mut next = expected.next();
        for event in &pattern.window {
            if let Some(expecting) = next {
                if &event.event_type == expecting {
                    next = expected.next();
                }
            }
        }
        next.is_none()
    } else {
        config
            .event_types
            .iter()
            .all(|kind| pattern.window.iter().any(|e| &e.event_type == kind))
    }
}

// =============================================================================
// Module
// =============================================================================

/// Module registering one event processor
pub struct EventProcessorModule {
    name: String,
    processor: Arc<EventProcessor>,
}

#[async_trait]
impl Module for EventProcessorModule {
    fn name(&self) -> &str {
        &self.name
    }

    async fn init(&self, app: &Application) -> Result<(), LifecycleError> {
        app.registry()
            .register(&self.name, self.processor.clone())
            .map_err(LifecycleError::Registry)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingHandler {
        matches: Arc<AtomicU32>,
        last_batch: Arc<Mutex<usize>>,
    }

    #[async_trait]
    impl EventPatternHandler for CountingHandler {
        async fn on_match(&self, _pattern: &str, events: &[Event]) -> Result<(), String> {
            self.matches.fetch_add(1, Ordering::SeqCst);
            *self.last_batch.lock().unwrap() = events.len();
            Ok(())
        }
    }

    fn event(kind: &str) -> Event {
        Event {
            event_type: kind.to_string(),
            source_id: None,
            correlation_id: None,
            data: Value::Null,
            at: Utc::now(),
        }
    }

    fn counting_processor(config: PatternConfig) -> (EventProcessor, Arc<AtomicU32>) {
        let processor = EventProcessor::default();
        let id = config.id.clone();
        processor.add_pattern(config).unwrap();
        let matches = Arc::new(AtomicU32::new(0));
        processor
            .bind_handler(
                &id,
                Arc::new(CountingHandler {
                    matches: matches.clone(),
                    last_batch: Arc::new(Mutex::new(0)),
                }),
            )
            .unwrap();
        (processor, matches)
    }

    #[tokio::test]
    async fn test_count_pattern_fires_at_min_occurs() {
        let (processor, matches) = counting_processor(PatternConfig {
            id: "burst".to_string(),
            event_types: vec!["login_failed".to_string()],
            window_time: "60s".to_string(),
            condition: "count".to_string(),
            min_occurs: 3,
            max_occurs: None,
            order_matters: false,
        });

        for _ in 0..2 {
            processor.ingest(event("login_failed")).await;
        }
        assert_eq!(matches.load(Ordering::SeqCst), 0);

        processor.ingest(event("login_failed")).await;
        assert_eq!(matches.load(Ordering::SeqCst), 1);

        // The window was consumed; the next event starts fresh.
        processor.ingest(event("login_failed")).await;
        assert_eq!(matches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_sequence_pattern_respects_order() {
        let (processor, matches) = counting_processor(PatternConfig {
            id: "checkout".to_string(),
            event_types: vec!["cart".to_string(), "pay".to_string()],
            window_time: "60s".to_string(),
            condition: "sequence".to_string(),
            min_occurs: 1,
            max_occurs: None,
            order_matters: true,
        });

        processor.ingest(event("pay")).await;
        processor.ingest(event("cart")).await;
        assert_eq!(matches.load(Ordering::SeqCst), 0);

        processor.ingest(event("pay")).await;
        assert_eq!(matches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unrelated_events_ignored() {
        let (processor, matches) = counting_processor(PatternConfig {
            id: "burst".to_string(),
            event_types: vec!["login_failed".to_string()],
            window_time: "60s".to_string(),
            condition: "count".to_string(),
            min_occurs: 1,
            max_occurs: None,
            order_matters: false,
        });

        processor.ingest(event("heartbeat")).await;
        assert_eq!(matches.load(Ordering::SeqCst), 0);
    }
}
