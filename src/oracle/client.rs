// src/oracle/client.rs
//! Retry/backoff wrapper and token-budget batching around oracle calls.

use std::time::Duration;

use metrics::counter;
use tracing::warn;

use crate::ingest::types::Item;
use crate::oracle::{Oracle, OracleError, OracleRequest};

/// Cheap token estimate: roughly one token per three bytes of text. Only
/// used for batch packing, so precision does not matter.
pub fn estimate_tokens(text: &str) -> usize {
    text.len() / 3
}

/// Pack items into ordered batches so no batch exceeds `max_tokens` by the
/// estimate. Order is preserved; no item is split or dropped, and an item
/// larger than the budget gets a batch of its own.
pub fn batch_by_token_budget(items: &[Item], max_tokens: usize) -> Vec<Vec<Item>> {
    let mut batches = Vec::new();
    let mut current: Vec<Item> = Vec::new();
    let mut current_tokens = 0usize;

    for item in items {
        let tokens = estimate_tokens(&item.title) + estimate_tokens(&item.text);
        if current_tokens + tokens > max_tokens && !current.is_empty() {
            batches.push(std::mem::take(&mut current));
            current_tokens = 0;
        }
        current_tokens += tokens;
        current.push(item.clone());
    }
    if !current.is_empty() {
        batches.push(current);
    }
    batches
}

/// Bounded-retry oracle client. Rate-limited failures wait `5×(attempt+1)`
/// seconds, generic failures `2×(attempt+1)`; exhausting retries surfaces
/// the last error to the caller.
pub struct OracleClient<O: Oracle> {
    inner: O,
    max_retries: u32,
}

impl<O: Oracle> OracleClient<O> {
    pub fn new(inner: O, max_retries: u32) -> Self {
        Self {
            inner,
            max_retries: max_retries.max(1),
        }
    }

    pub fn provider_name(&self) -> &str {
        self.inner.name()
    }

    pub async fn call(
        &self,
        prompt: &str,
        max_tokens: u32,
        timeout: Duration,
    ) -> Result<String, OracleError> {
        let request = OracleRequest::new(prompt, max_tokens);
        self.call_request(&request, timeout).await
    }

    pub async fn call_request(
        &self,
        request: &OracleRequest,
        timeout: Duration,
    ) -> Result<String, OracleError> {
        let mut last_err = OracleError::Api("no attempts made".into());
        for attempt in 0..self.max_retries {
            let result = match tokio::time::timeout(timeout, self.inner.complete(request)).await {
                Ok(r) => r,
                Err(_) => Err(OracleError::Timeout(timeout)),
            };
            let err = match result {
                Ok(text) => return Ok(text),
                Err(e) => e,
            };

            let last_attempt = attempt + 1 >= self.max_retries;
            let wait = match &err {
                OracleError::RateLimited => Duration::from_secs(5 * u64::from(attempt + 1)),
                _ => Duration::from_secs(2 * u64::from(attempt + 1)),
            };
            warn!(
                provider = self.inner.name(),
                attempt = attempt + 1,
                max = self.max_retries,
                error = %err,
                "oracle call failed"
            );
            counter!("oracle_retries_total").increment(1);
            last_err = err;
            if last_attempt {
                break;
            }
            tokio::time::sleep(wait).await;
        }
        Err(last_err)
    }
}
