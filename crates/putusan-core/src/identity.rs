//! Rotating client identities.
//!
//! The pool is sampled with replacement for every attempt. With more than
//! one identity in the pool the same identity is never handed out twice in
//! a row, so consecutive requests do not look alike.

use std::sync::Mutex;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::AppError;
use crate::models::IdentityRecord;

/// Desktop browser user agents presented to the target site.
pub const DEFAULT_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/92.0.4515.107 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:89.0) Gecko/20100101 Firefox/89.0",
];

struct PoolState {
    rng: StdRng,
    last: Option<usize>,
}

/// Fixed pool of identities, sampled per attempt.
pub struct IdentityPool {
    identities: Vec<IdentityRecord>,
    avoid_repeats: bool,
    state: Mutex<PoolState>,
}

impl IdentityPool {
    pub fn new(identities: Vec<IdentityRecord>) -> Result<Self, AppError> {
        if identities.is_empty() {
            return Err(AppError::ConfigError(
                "identity pool must contain at least one identity".into(),
            ));
        }
        if let Some(bad) = identities.iter().find(|i| i.user_agent.trim().is_empty()) {
            return Err(AppError::ConfigError(format!(
                "identity has an empty user agent: {bad:?}"
            )));
        }
        Ok(Self {
            identities,
            avoid_repeats: true,
            state: Mutex::new(PoolState {
                rng: StdRng::from_entropy(),
                last: None,
            }),
        })
    }

    /// Pool built from plain user-agent strings, each with the default
    /// browser-like headers.
    pub fn from_user_agents<S: AsRef<str>>(agents: &[S]) -> Result<Self, AppError> {
        Self::new(
            agents
                .iter()
                .map(|ua| with_browser_headers(IdentityRecord::new(ua.as_ref())))
                .collect(),
        )
    }

    /// Allow the same identity to be drawn twice in a row.
    pub fn allow_repeats(mut self) -> Self {
        self.avoid_repeats = false;
        self
    }

    /// Make sampling deterministic (tests, reproducible runs).
    pub fn with_seed(self, seed: u64) -> Self {
        {
            let mut state = self.lock_state();
            state.rng = StdRng::seed_from_u64(seed);
        }
        self
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }

    /// Draw an identity for the next attempt.
    pub fn draw(&self) -> IdentityRecord {
        let mut state = self.lock_state();
        let n = self.identities.len();
        let index = match state.last {
            Some(last) if self.avoid_repeats && n > 1 => {
                // Sample among the other n - 1 entries.
                let pick = state.rng.gen_range(0..n - 1);
                if pick >= last { pick + 1 } else { pick }
            }
            _ => state.rng.gen_range(0..n),
        };
        state.last = Some(index);
        self.identities[index].clone()
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("Identity pool recovered from poisoned mutex");
            poisoned.into_inner()
        })
    }
}

impl Default for IdentityPool {
    fn default() -> Self {
        let identities = DEFAULT_USER_AGENTS
            .iter()
            .map(|ua| with_browser_headers(IdentityRecord::new(*ua)))
            .collect();
        Self {
            identities,
            avoid_repeats: true,
            state: Mutex::new(PoolState {
                rng: StdRng::from_entropy(),
                last: None,
            }),
        }
    }
}

fn with_browser_headers(identity: IdentityRecord) -> IdentityRecord {
    identity
        .with_header(
            "Accept",
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
        )
        .with_header("Accept-Language", "id-ID,id;q=0.9,en;q=0.8")
        .with_header("Upgrade-Insecure-Requests", "1")
}
