//! Behavioral tracking and navigation prediction
//!
//! The tracker records bounded recent history; prediction is a pure function
//! over an immutable snapshot so it is unit-testable without the scheduler
//! and can never block foreground work.

use crate::preloader::Priority;
use std::collections::{HashMap, VecDeque};

/// Bounded record of recent user behavior. Lists silently drop their oldest
/// entries past the caps; there is no unbounded growth here.
#[derive(Debug)]
pub struct BehaviorTracker {
    page_views: VecDeque<String>,
    time_spent_ms: HashMap<String, u64>,
    interactions: VecDeque<String>,
    max_page_views: usize,
    max_interactions: usize,
}

impl BehaviorTracker {
    /// Create a tracker with the given history caps
    pub fn new(max_page_views: usize, max_interactions: usize) -> Self {
        Self {
            page_views: VecDeque::with_capacity(max_page_views),
            time_spent_ms: HashMap::new(),
            interactions: VecDeque::with_capacity(max_interactions),
            max_page_views,
            max_interactions,
        }
    }

    /// Record a page view, dropping the oldest past the cap
    pub fn record_page_view(&mut self, page: &str) {
        if self.page_views.len() >= self.max_page_views {
            self.page_views.pop_front();
        }
        self.page_views.push_back(page.to_string());
    }

    /// Accumulate dwell time on a page
    pub fn record_time_spent(&mut self, page: &str, ms: u64) {
        *self.time_spent_ms.entry(page.to_string()).or_default() += ms;
    }

    /// Record a named interaction, dropping the oldest past the cap
    pub fn record_interaction(&mut self, name: &str) {
        if self.interactions.len() >= self.max_interactions {
            self.interactions.pop_front();
        }
        self.interactions.push_back(name.to_string());
    }

    /// Immutable copy of the current history for prediction
    pub fn snapshot(&self) -> BehaviorSnapshot {
        BehaviorSnapshot {
            page_views: self.page_views.iter().cloned().collect(),
            time_spent_ms: self.time_spent_ms.clone(),
            interactions: self.interactions.iter().cloned().collect(),
        }
    }
}

/// Frozen view of recent behavior
#[derive(Debug, Clone)]
pub struct BehaviorSnapshot {
    /// Recent page views, oldest first
    pub page_views: Vec<String>,
    /// Accumulated dwell time per page
    pub time_spent_ms: HashMap<String, u64>,
    /// Recent interactions, oldest first
    pub interactions: Vec<String>,
}

/// Rank pages worth preloading from view frequency within the recent window.
///
/// Pages seen strictly more than `high_threshold` times rank high priority;
/// strictly more than `medium_threshold`, medium. Results are ordered most
/// frequent first. Heuristic and advisory only.
pub fn predict_routes(
    snapshot: &BehaviorSnapshot,
    medium_threshold: usize,
    high_threshold: usize,
) -> Vec<(String, Priority)> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for page in &snapshot.page_views {
        *counts.entry(page.as_str()).or_default() += 1;
    }

    let mut ranked: Vec<(String, Priority, usize)> = counts
        .into_iter()
        .filter_map(|(page, count)| {
            if count > high_threshold {
                Some((page.to_string(), Priority::High, count))
            } else if count > medium_threshold {
                Some((page.to_string(), Priority::Medium, count))
            } else {
                None
            }
        })
        .collect();

    ranked.sort_by(|a, b| b.2.cmp(&a.2).then_with(|| a.0.cmp(&b.0)));
    ranked
        .into_iter()
        .map(|(page, priority, _)| (page, priority))
        .collect()
}
