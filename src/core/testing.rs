//! Test doubles shared by the surveyor and cycle tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::Instant;

use crate::core::error::ProbeError;
use crate::core::search::SearchProvider;

/// Answers from a fixed table; unknown keywords return no results.
#[derive(Default)]
pub struct FakeProvider {
    results: HashMap<String, Vec<String>>,
    failing: Vec<String>,
    panicking: Vec<String>,
    latency: Duration,
    calls: Mutex<Vec<(String, Instant)>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, keyword: &str, urls: &[&str]) -> Self {
        self.results.insert(
            keyword.to_string(),
            urls.iter().map(|u| u.to_string()).collect(),
        );
        self
    }

    pub fn failing(mut self, keyword: &str) -> Self {
        self.failing.push(keyword.to_string());
        self
    }

    pub fn panicking(mut self, keyword: &str) -> Self {
        self.panicking.push(keyword.to_string());
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(k, _)| k.clone())
            .collect()
    }

    pub fn call_times(&self) -> Vec<Instant> {
        self.calls.lock().unwrap().iter().map(|(_, t)| *t).collect()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SearchProvider for FakeProvider {
    async fn search(&self, keyword: &str, limit: u32) -> Result<Vec<String>, ProbeError> {
        self.calls
            .lock()
            .unwrap()
            .push((keyword.to_string(), Instant::now()));
        if self.panicking.iter().any(|k| k == keyword) {
            panic!("provider blew up on '{}'", keyword);
        }
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.failing.iter().any(|k| k == keyword) {
            return Err(ProbeError::Exit {
                status: "exit status: 1".to_string(),
                stderr: "simulated failure".to_string(),
            });
        }
        Ok(self
            .results
            .get(keyword)
            .map(|urls| urls.iter().take(limit as usize).cloned().collect())
            .unwrap_or_default())
    }
}
