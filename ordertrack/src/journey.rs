//! The user-journey ring buffer.
//!
//! A bounded record of the most recent event summaries, attached to error
//! reports to give them behavioral context. ERROR events themselves are
//! never recorded here; an error report embeds the journey, and recording it
//! would bloat every subsequent report recursively.

use crate::event::EventPayload;
use std::collections::VecDeque;

/// Maximum number of journey entries retained.
pub const JOURNEY_CAPACITY: usize = 20;

/// Maximum number of payload-JSON characters kept per entry.
const SUMMARY_DATA_CHARS: usize = 50;

/// Bounded ring buffer of recent event summaries.
#[derive(Debug, Default)]
pub struct Journey {
    entries: VecDeque<String>,
}

impl Journey {
    /// An empty journey.
    pub fn new() -> Self {
        Self {
            entries: VecDeque::with_capacity(JOURNEY_CAPACITY),
        }
    }

    /// Records a summary of `payload`, evicting the oldest entry at capacity.
    ///
    /// ERROR payloads are ignored.
    pub fn record(&mut self, payload: &EventPayload) {
        if payload.is_error() {
            return;
        }
        if self.entries.len() == JOURNEY_CAPACITY {
            self.entries.pop_front();
        }
        self.entries.push_back(summarize(payload));
    }

    /// The retained entries, oldest first.
    pub fn entries(&self) -> Vec<String> {
        self.entries.iter().cloned().collect()
    }

    /// Number of retained entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing has been recorded yet.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// `"{TYPE}:{first 50 chars of JSON(data)}"`, truncated on a char boundary.
fn summarize(payload: &EventPayload) -> String {
    let data = payload.data_json();
    let truncated: String = data.chars().take(SUMMARY_DATA_CHARS).collect();
    format!("{}:{truncated}", payload.kind_name())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::ErrorSeverity;
    use proptest::prelude::*;

    fn page_view(route: &str) -> EventPayload {
        EventPayload::PageView {
            route: route.to_string(),
            title: None,
        }
    }

    #[test]
    fn entries_carry_type_prefix_and_data() {
        let mut journey = Journey::new();
        journey.record(&page_view("/menu"));

        let entries = journey.entries();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].starts_with("PAGE_VIEW:"));
        assert!(entries[0].contains("/menu"));
    }

    #[test]
    fn long_payloads_are_truncated_to_fifty_chars() {
        let mut journey = Journey::new();
        journey.record(&page_view(&"x".repeat(200)));

        let entry = &journey.entries()[0];
        let data_part = entry.strip_prefix("PAGE_VIEW:").unwrap();
        assert_eq!(data_part.chars().count(), 50);
    }

    #[test]
    fn truncation_is_char_boundary_safe() {
        let mut journey = Journey::new();
        journey.record(&page_view(&"é".repeat(100)));
        // Surviving without a panic is the point; also check the length.
        let entry = &journey.entries()[0];
        assert!(entry.strip_prefix("PAGE_VIEW:").unwrap().chars().count() <= 50);
    }

    #[test]
    fn error_payloads_are_excluded() {
        let mut journey = Journey::new();
        journey.record(&EventPayload::Error {
            message: "boom".to_string(),
            stack: None,
            severity: ErrorSeverity::High,
            journey: vec![],
            state_snapshot: serde_json::Value::Null,
        });
        assert!(journey.is_empty());
    }

    proptest! {
        #[test]
        fn journey_never_exceeds_capacity(routes in prop::collection::vec("[a-z/]{1,30}", 0..60)) {
            let mut journey = Journey::new();
            for route in &routes {
                journey.record(&page_view(route));
            }
            prop_assert!(journey.len() <= JOURNEY_CAPACITY);
            prop_assert_eq!(journey.len(), routes.len().min(JOURNEY_CAPACITY));
        }

        #[test]
        fn oldest_entries_are_evicted_first(n in 21usize..50) {
            let mut journey = Journey::new();
            for i in 0..n {
                journey.record(&page_view(&format!("/route-{i}")));
            }
            let entries = journey.entries();
            // The first retained entry is the (n - 20)th recorded one.
            let oldest_retained = format!("/route-{}", n - JOURNEY_CAPACITY);
            let newest = format!("/route-{}", n - 1);
            prop_assert!(entries[0].contains(&oldest_retained));
            prop_assert!(entries[JOURNEY_CAPACITY - 1].contains(&newest));
        }
    }
}
