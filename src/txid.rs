//! Transaction ids and their issuers.
//!
//! A [`TxId`] is an `(epoch, xid)` pair compared as a single `u64`
//! `(epoch << 32) | xid`. `epoch` is wall-clock seconds at issuance, `xid` a
//! sequence counter that is allowed to wrap; when it does, ordering falls
//! back to `epoch`, which is why `epoch` is bumped on every `issue()` rather
//! than only at process start.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct TxId {
    epoch: u32,
    xid: u32,
}

impl TxId {
    pub const MIN: TxId = TxId { epoch: 0, xid: 0 };
    pub const MAX: TxId = TxId { epoch: u32::MAX, xid: u32::MAX };

    pub fn new(epoch: u32, xid: u32) -> Self {
        TxId { epoch, xid }
    }

    pub fn as_u64(self) -> u64 {
        ((self.epoch as u64) << 32) | self.xid as u64
    }

    pub fn from_u64(n: u64) -> Self {
        TxId { epoch: (n >> 32) as u32, xid: n as u32 }
    }

    /// `a.less(b)` holds when `a.as_u64() <= b.as_u64()`.
    ///
    /// This is deliberately "less-or-equal", not a strict order: it lets the
    /// same id compare visible to itself, which is exactly what transactions
    /// need when checking whether their own writes (tagged with their own
    /// `tx_id`) are visible to their own subsequent reads.
    pub fn less(self, other: TxId) -> bool {
        self.as_u64() <= other.as_u64()
    }

    fn next(self) -> TxId {
        TxId { epoch: now_epoch(), xid: self.xid.wrapping_add(1) }
    }
}

fn now_epoch() -> u32 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs() as u32).unwrap_or(0)
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.as_u64())
    }
}

impl std::str::FromStr for TxId {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let n = u64::from_str_radix(s, 16)
            .map_err(|e| crate::error::Error::MalformedKey(format!("bad txid {s:?}: {e}")))?;
        Ok(TxId::from_u64(n))
    }
}

/// One operation that hands out ids: `issue() -> TxId`.
pub trait Issuer: Send + Sync {
    fn issue(&self) -> TxId;
}

/// Serializes issuance behind a mutex; each issue stamps the current wall
/// clock into `epoch` and increments `xid`.
#[derive(Default)]
pub struct MutexIssuer {
    latest: Mutex<TxId>,
}

impl MutexIssuer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Issuer for MutexIssuer {
    fn issue(&self) -> TxId {
        let mut latest = self.latest.lock();
        let id = latest.next();
        *latest = id;
        id
    }
}

/// Lock-free issuer: `xid` is a plain atomic counter, `epoch` is sampled at
/// issue time rather than stored.
#[derive(Default)]
pub struct AtomicIssuer {
    xid: AtomicU32,
}

impl AtomicIssuer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Issuer for AtomicIssuer {
    fn issue(&self) -> TxId {
        let xid = self.xid.fetch_add(1, Ordering::SeqCst).wrapping_add(1);
        TxId { epoch: now_epoch(), xid }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn min_max_order() {
        assert!(TxId::MIN.less(TxId::MAX));
        assert!(!TxId::MAX.less(TxId::MIN));
    }

    #[test]
    fn less_is_reflexive() {
        let id = TxId::new(10, 5);
        assert!(id.less(id));
    }

    #[test]
    fn string_round_trip() {
        for n in [0u64, 1, 0x12345678_87654321, u64::MAX] {
            let id = TxId::from_u64(n);
            let s = id.to_string();
            assert_eq!(s.len(), 16);
            let back = TxId::from_str(&s).unwrap();
            assert_eq!(back, id);
        }
    }

    #[test]
    fn uint64_split() {
        let id = TxId::from_u64(0x12345678_87654321);
        assert_eq!(id.epoch, 0x12345678);
        assert_eq!(id.xid, 0x87654321);
        assert_eq!(id.as_u64(), 0x12345678_87654321);
    }

    #[test]
    fn mutex_issuer_never_goes_backwards() {
        let issuer = MutexIssuer::new();
        let mut prev = issuer.issue();
        for _ in 0..100 {
            let next = issuer.issue();
            assert!(prev.less(next));
            prev = next;
        }
    }

    #[test]
    fn concurrent_issuance_is_pairwise_distinct() {
        let issuer = Arc::new(AtomicIssuer::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let issuer = issuer.clone();
            handles.push(thread::spawn(move || {
                (0..200).map(|_| issuer.issue()).collect::<Vec<_>>()
            }));
        }

        let mut all = Vec::new();
        for h in handles {
            all.extend(h.join().unwrap());
        }

        let mut seen = std::collections::HashSet::new();
        for id in &all {
            assert!(seen.insert(id.as_u64()), "duplicate id issued: {id}");
        }
        assert_eq!(seen.len(), 8 * 200);
    }
}
