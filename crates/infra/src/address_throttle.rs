//! Per-address login throttle.
//!
//! Counts refused logins by client address inside a sliding window,
//! independently of which email was tried. An address that has used up its
//! window is refused with [`RateLimited`] before credentials are looked at.
//! Admission reserves a slot, so concurrent attempts from one address cannot
//! overshoot the limit.

use std::collections::{HashMap, VecDeque};
use std::net::IpAddr;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};

use shepherd_auth::RateLimited;

/// Addresses tracked before idle ones are dropped to make room.
pub const DEFAULT_MAX_ADDRESSES: usize = 100_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressThrottlePolicy {
    pub max_failures: u32,
    pub window: Duration,
}

impl Default for AddressThrottlePolicy {
    fn default() -> Self {
        Self {
            max_failures: 10,
            window: Duration::minutes(15),
        }
    }
}

#[derive(Debug, Default)]
struct AddressWindow {
    failures: VecDeque<DateTime<Utc>>,
    in_flight: u32,
}

impl AddressWindow {
    fn expire(&mut self, now: DateTime<Utc>, window: Duration) {
        while self.failures.front().is_some_and(|at| *at + window <= now) {
            self.failures.pop_front();
        }
    }

    fn is_idle(&self) -> bool {
        self.failures.is_empty() && self.in_flight == 0
    }
}

#[derive(Debug)]
pub struct InMemoryAddressThrottle {
    policy: AddressThrottlePolicy,
    addresses: Mutex<HashMap<IpAddr, AddressWindow>>,
    max_addresses: usize,
}

impl InMemoryAddressThrottle {
    pub fn new(policy: AddressThrottlePolicy) -> Self {
        Self::with_max_addresses(policy, DEFAULT_MAX_ADDRESSES)
    }

    pub fn with_max_addresses(policy: AddressThrottlePolicy, max_addresses: usize) -> Self {
        Self {
            policy,
            addresses: Mutex::new(HashMap::new()),
            max_addresses: max_addresses.max(1),
        }
    }

    pub fn policy(&self) -> AddressThrottlePolicy {
        self.policy
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<IpAddr, AddressWindow>> {
        self.addresses.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Reserve an attempt for `address`, or refuse it when failures plus
    /// attempts still in flight already reach the limit.
    pub fn admit(&self, address: IpAddr, now: DateTime<Utc>) -> Result<AddressPermit<'_>, RateLimited> {
        let mut map = self.lock();
        if !map.contains_key(&address) && map.len() >= self.max_addresses {
            self.evict_idle(&mut map, now);
        }
        let entry = map.entry(address).or_default();
        entry.expire(now, self.policy.window);

        let used = entry.failures.len() as u64 + u64::from(entry.in_flight);
        if used >= u64::from(self.policy.max_failures) {
            let retry_after_secs = entry
                .failures
                .front()
                .map(|oldest| (*oldest + self.policy.window - now).num_seconds())
                .unwrap_or(1)
                .max(1) as u64;
            tracing::warn!(
                target: "security",
                ip = %address,
                failures = entry.failures.len(),
                retry_after_secs,
                "login refused: address throttled"
            );
            return Err(RateLimited { retry_after_secs });
        }

        entry.in_flight += 1;
        Ok(AddressPermit {
            throttle: self,
            address,
            settled: false,
        })
    }

    /// Refused logins from `address` still inside the window.
    pub fn failures(&self, address: IpAddr, now: DateTime<Utc>) -> usize {
        let mut map = self.lock();
        map.get_mut(&address)
            .map(|entry| {
                entry.expire(now, self.policy.window);
                entry.failures.len()
            })
            .unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop addresses whose failures have all left the window. Returns how
    /// many were removed.
    pub fn prune(&self, now: DateTime<Utc>) -> usize {
        let mut map = self.lock();
        let before = map.len();
        let window = self.policy.window;
        map.retain(|_, entry| {
            entry.expire(now, window);
            !entry.is_idle()
        });
        before - map.len()
    }

    fn evict_idle(&self, map: &mut HashMap<IpAddr, AddressWindow>, now: DateTime<Utc>) {
        let window = self.policy.window;
        map.retain(|_, entry| {
            entry.expire(now, window);
            !entry.is_idle()
        });
        if map.len() >= self.max_addresses {
            tracing::warn!(
                target: "security",
                tracked = map.len(),
                "address throttle full of active addresses"
            );
        }
    }

    fn settle(&self, address: IpAddr, failed_at: Option<DateTime<Utc>>) {
        let mut map = self.lock();
        let Some(entry) = map.get_mut(&address) else {
            return;
        };
        entry.in_flight = entry.in_flight.saturating_sub(1);
        if let Some(at) = failed_at {
            entry.failures.push_back(at);
        }
        if entry.is_idle() {
            map.remove(&address);
        }
    }
}

/// A reserved attempt. Dropping it without settling releases the slot
/// without counting a failure.
#[derive(Debug)]
pub struct AddressPermit<'a> {
    throttle: &'a InMemoryAddressThrottle,
    address: IpAddr,
    settled: bool,
}

impl AddressPermit<'_> {
    pub fn succeeded(mut self) {
        self.settled = true;
        self.throttle.settle(self.address, None);
    }

    pub fn failed(mut self, now: DateTime<Utc>) {
        self.settled = true;
        self.throttle.settle(self.address, Some(now));
    }
}

impl Drop for AddressPermit<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.throttle.settle(self.address, None);
        }
    }
}
