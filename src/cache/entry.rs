//! Cache Entry Module
//!
//! Defines individual cache entries, either permanent or carrying an absolute
//! expiration deadline.

use std::time::{Duration, Instant};

// == Expiration ==
/// When an entry should expire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiration {
    /// Relative to the moment the entry is written
    After(Duration),
    /// Fixed point in time
    At(Instant),
}

impl Expiration {
    /// Resolves the expiration to an absolute deadline.
    ///
    /// Returns `None` when a relative TTL is so large that the deadline is not
    /// representable; such an entry is treated as never expiring.
    pub fn deadline_from(self, now: Instant) -> Option<Instant> {
        match self {
            Expiration::After(ttl) => now.checked_add(ttl),
            Expiration::At(deadline) => Some(deadline),
        }
    }
}

impl From<Duration> for Expiration {
    fn from(ttl: Duration) -> Self {
        Expiration::After(ttl)
    }
}

impl From<Instant> for Expiration {
    fn from(deadline: Instant) -> Self {
        Expiration::At(deadline)
    }
}

// == Entry ==
/// A single cache entry.
///
/// The deadline of an expiring entry is fixed at creation. Giving a key a new
/// TTL means replacing its entry, never editing the deadline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry<K, V> {
    /// Entry that lives until removed
    Plain { key: K, value: V },
    /// Entry evicted once `deadline` is reached
    Expiring { key: K, value: V, deadline: Instant },
}

impl<K, V> Entry<K, V> {
    // == Constructor ==
    /// Creates the entry variant matching `expiration`.
    pub fn new(key: K, value: V, expiration: Option<Expiration>) -> Self {
        match expiration.and_then(|exp| exp.deadline_from(Instant::now())) {
            Some(deadline) => Entry::Expiring {
                key,
                value,
                deadline,
            },
            None => Entry::Plain { key, value },
        }
    }

    pub fn key(&self) -> &K {
        match self {
            Entry::Plain { key, .. } | Entry::Expiring { key, .. } => key,
        }
    }

    pub fn value(&self) -> &V {
        match self {
            Entry::Plain { value, .. } | Entry::Expiring { value, .. } => value,
        }
    }

    pub fn value_mut(&mut self) -> &mut V {
        match self {
            Entry::Plain { value, .. } | Entry::Expiring { value, .. } => value,
        }
    }

    /// Consumes the entry, returning its key and value.
    pub fn into_parts(self) -> (K, V) {
        match self {
            Entry::Plain { key, value } | Entry::Expiring { key, value, .. } => (key, value),
        }
    }

    /// Absolute deadline, `None` for plain entries.
    pub fn deadline(&self) -> Option<Instant> {
        match self {
            Entry::Plain { .. } => None,
            Entry::Expiring { deadline, .. } => Some(*deadline),
        }
    }

    // == Is Expired ==
    /// Checks whether the entry has expired at `now`.
    ///
    /// An entry is expired once `now` is greater than or equal to its deadline.
    pub fn is_expired_at(&self, now: Instant) -> bool {
        self.deadline().is_some_and(|deadline| now >= deadline)
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Instant::now())
    }

    // == Time To Live ==
    /// Returns the remaining lifetime, or None if the entry never expires.
    ///
    /// # Returns
    /// - `Some(Duration::ZERO)` if the deadline has passed
    /// - `Some(remaining)` if the deadline is still ahead
    /// - `None` for plain entries
    pub fn ttl_remaining(&self) -> Option<Duration> {
        self.deadline()
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn test_entry_creation_no_ttl() {
        let entry = Entry::new("a", 1, None);

        assert!(matches!(entry, Entry::Plain { .. }));
        assert_eq!(entry.key(), &"a");
        assert_eq!(entry.value(), &1);
        assert!(entry.deadline().is_none());
        assert!(!entry.is_expired());
    }

    #[test]
    fn test_entry_creation_with_ttl() {
        let entry = Entry::new("a", 1, Some(Duration::from_secs(60).into()));

        assert!(matches!(entry, Entry::Expiring { .. }));
        assert!(entry.deadline().is_some());
        assert!(!entry.is_expired());
    }

    #[test]
    fn test_entry_absolute_deadline() {
        let deadline = Instant::now() + Duration::from_secs(5);
        let entry = Entry::new("a", 1, Some(Expiration::At(deadline)));

        assert_eq!(entry.deadline(), Some(deadline));
    }

    #[test]
    fn test_entry_unrepresentable_ttl_is_plain() {
        let entry = Entry::new("a", 1, Some(Expiration::After(Duration::MAX)));
        assert!(matches!(entry, Entry::Plain { .. }));
    }

    #[test]
    fn test_entry_expiration() {
        let entry = Entry::new("a", 1, Some(Duration::from_millis(50).into()));

        assert!(!entry.is_expired());

        sleep(Duration::from_millis(80));

        assert!(entry.is_expired());
        assert_eq!(entry.ttl_remaining(), Some(Duration::ZERO));
    }

    #[test]
    fn test_ttl_remaining() {
        let entry = Entry::new("a", 1, Some(Duration::from_secs(10).into()));

        let remaining = entry.ttl_remaining().unwrap();
        assert!(remaining <= Duration::from_secs(10));
        assert!(remaining >= Duration::from_secs(9));

        let plain = Entry::new("b", 2, None);
        assert!(plain.ttl_remaining().is_none());
    }

    #[test]
    fn test_expiration_boundary_condition() {
        let now = Instant::now();
        let entry = Entry::Expiring {
            key: "a",
            value: 1,
            deadline: now + Duration::from_millis(1),
        };

        // Expired exactly at the deadline
        assert!(!entry.is_expired_at(now));
        assert!(entry.is_expired_at(now + Duration::from_millis(1)));
    }

    #[test]
    fn test_value_mut_keeps_deadline() {
        let mut entry = Entry::new("a", 1, Some(Duration::from_secs(10).into()));
        let deadline = entry.deadline();

        *entry.value_mut() = 2;

        assert_eq!(entry.value(), &2);
        assert_eq!(entry.deadline(), deadline);
        assert_eq!(entry.into_parts(), ("a", 2));
    }
}
