use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use lazy_static::lazy_static;

use crate::api::CommentId;

lazy_static! {
    static ref PROCESS_IDS: ClientIdGenerator = ClientIdGenerator::new();
}

/// Hands out identifiers for optimistic entries.
///
/// Ids are the current time in milliseconds, bumped when needed so that they
/// are strictly increasing: two submissions in the same millisecond still get
/// distinct ids.
#[derive(Debug, Default)]
pub struct ClientIdGenerator {
    last: AtomicU64,
}

impl ClientIdGenerator {
    pub fn new() -> ClientIdGenerator {
        ClientIdGenerator {
            last: AtomicU64::new(0),
        }
    }

    /// The generator shared by the whole process
    pub fn global() -> &'static ClientIdGenerator {
        &*PROCESS_IDS
    }

    pub fn next(&self) -> CommentId {
        let now = u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0);
        let mut last = self.last.load(Ordering::Relaxed);
        loop {
            let candidate = std::cmp::max(now, last + 1);
            match self
                .last
                .compare_exchange_weak(last, candidate, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(_) => return CommentId(candidate),
                Err(actual) => last = actual,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn strictly_increasing() {
        let ids = ClientIdGenerator::new();
        let mut prev = ids.next();
        for _ in 0..10_000 {
            let id = ids.next();
            assert!(id > prev, "{id:?} came after {prev:?}");
            prev = id;
        }
    }

    #[test]
    fn time_based() {
        let before = Utc::now().timestamp_millis() as u64;
        let id = ClientIdGenerator::new().next();
        assert!(id.0 >= before);
    }

    #[test]
    fn unique_across_threads() {
        let handles = (0..4)
            .map(|_| {
                std::thread::spawn(|| {
                    (0..1000)
                        .map(|_| ClientIdGenerator::global().next())
                        .collect::<Vec<_>>()
                })
            })
            .collect::<Vec<_>>();
        let mut seen = HashSet::new();
        for h in handles {
            for id in h.join().unwrap() {
                assert!(seen.insert(id), "duplicate client id {id:?}");
            }
        }
    }
}
