//! Per-IP admission control.
//!
//! Every room membership holds one slot for its client's IP. The counters
//! are shared by all room actors, so each access is a short critical
//! section on a plain mutex.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};

/// Limits applied when admitting a client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdmissionConfig {
    /// How many room memberships one IP may hold at once.
    pub max_per_ip: usize,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self { max_per_ip: 4 }
    }
}

/// Process-wide IP → membership counters.
#[derive(Debug, Default)]
pub struct Admission {
    config: AdmissionConfig,
    counts: Mutex<HashMap<IpAddr, usize>>,
}

impl Admission {
    pub fn new(config: AdmissionConfig) -> Self {
        Self {
            config,
            counts: Mutex::new(HashMap::new()),
        }
    }

    /// Takes a slot for `ip` if it has fewer than the cap.
    ///
    /// On refusal the counter is left unchanged.
    pub fn try_reserve(&self, ip: IpAddr) -> bool {
        let mut counts = self.counts.lock().unwrap_or_else(PoisonError::into_inner);
        let count = counts.entry(ip).or_insert(0);
        if *count >= self.config.max_per_ip {
            tracing::debug!(%ip, count = *count, "admission refused");
            return false;
        }
        *count += 1;
        true
    }

    /// Gives back one slot for `ip`. Never goes below zero.
    pub fn release(&self, ip: IpAddr) {
        let mut counts = self.counts.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(count) = counts.get_mut(&ip) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                counts.remove(&ip);
            }
        }
    }

    /// Slots currently held by `ip`.
    pub fn count(&self, ip: IpAddr) -> usize {
        self.counts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&ip)
            .copied()
            .unwrap_or(0)
    }

    /// Like [`try_reserve`](Self::try_reserve), but returns a guard that
    /// releases the slot when dropped.
    pub fn reserve(self: &Arc<Self>, ip: IpAddr) -> Option<IpSlot> {
        self.try_reserve(ip).then(|| IpSlot {
            admission: Arc::clone(self),
            ip,
        })
    }
}

/// One held admission slot. Dropping it releases the slot.
#[derive(Debug)]
pub struct IpSlot {
    admission: Arc<Admission>,
    ip: IpAddr,
}

impl IpSlot {
    pub fn ip(&self) -> IpAddr {
        self.ip
    }
}

impl Drop for IpSlot {
    fn drop(&mut self) {
        self.admission.release(self.ip);
    }
}
