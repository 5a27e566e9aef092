//! Rate limiting for IPC clients

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::ClientId;

/// Token-bucket rate limiter keyed by client
#[derive(Debug)]
pub struct RateLimiter {
    max_tokens: u32,
    refill_interval: Duration,
    clients: HashMap<ClientId, ClientBucket>,
}

#[derive(Debug)]
struct ClientBucket {
    tokens: u32,
    last_refill: Instant,
}

impl RateLimiter {
    /// `max_requests` requests are allowed per `interval`, per client.
    pub fn new(max_requests: u32, interval: Duration) -> Self {
        Self {
            max_tokens: max_requests,
            refill_interval: interval,
            clients: HashMap::new(),
        }
    }

    /// Returns `true` if the request is allowed, `false` if rate limited.
    pub fn check(&mut self, client_id: &ClientId) -> bool {
        let now = Instant::now();

        let bucket = self.clients.entry(client_id.clone()).or_insert(ClientBucket {
            tokens: self.max_tokens,
            last_refill: now,
        });

        if now.duration_since(bucket.last_refill) >= self.refill_interval {
            bucket.tokens = self.max_tokens;
            bucket.last_refill = now;
        }

        if bucket.tokens > 0 {
            bucket.tokens -= 1;
            true
        } else {
            false
        }
    }

    /// Drop a disconnected client's bucket.
    pub fn remove_client(&mut self, client_id: &ClientId) {
        self.clients.remove(client_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_within_limit_then_denies() {
        let mut limiter = RateLimiter::new(5, Duration::from_secs(1));
        let client = ClientId::new();

        for _ in 0..5 {
            assert!(limiter.check(&client));
        }
        assert!(!limiter.check(&client));
    }

    #[test]
    fn buckets_are_per_client() {
        let mut limiter = RateLimiter::new(2, Duration::from_secs(1));
        let client1 = ClientId::new();
        let client2 = ClientId::new();

        assert!(limiter.check(&client1));
        assert!(limiter.check(&client1));
        assert!(!limiter.check(&client1));

        assert!(limiter.check(&client2));
        assert!(limiter.check(&client2));
    }
}
