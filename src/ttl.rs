use std::time::Duration;

use serde::{Deserialize, Deserializer};

/// How long a cached value stays fresh
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Ttl {
    /// The value never expires, whatever its age
    #[default]
    Forever,
    /// The value expires once its age exceeds the duration
    After(Duration),
}

impl Ttl {
    /// Shorthand for `Ttl::After(Duration::from_millis(ms))`
    pub fn from_millis(ms: u64) -> Self {
        Ttl::After(Duration::from_millis(ms))
    }

    /// Shorthand for `Ttl::After(Duration::from_secs(secs))`
    pub fn from_secs(secs: u64) -> Self {
        Ttl::After(Duration::from_secs(secs))
    }

    /// Checks whether a value of the given age has outlived this TTL
    pub fn is_expired(&self, age: Duration) -> bool {
        match self {
            Ttl::Forever => false,
            Ttl::After(ttl) => age > *ttl,
        }
    }

    /// Returns the duration, or `None` for `Forever`
    pub fn as_duration(&self) -> Option<Duration> {
        match self {
            Ttl::Forever => None,
            Ttl::After(ttl) => Some(*ttl),
        }
    }
}

impl From<Duration> for Ttl {
    fn from(ttl: Duration) -> Self {
        Ttl::After(ttl)
    }
}

// Accepts `null`, `"forever"` or a number of milliseconds.
impl<'de> Deserialize<'de> for Ttl {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Millis(u64),
            Named(String),
        }

        match Option::<Repr>::deserialize(deserializer)? {
            None => Ok(Ttl::Forever),
            Some(Repr::Millis(ms)) => Ok(Ttl::from_millis(ms)),
            Some(Repr::Named(name)) if name.eq_ignore_ascii_case("forever") => Ok(Ttl::Forever),
            Some(Repr::Named(name)) => Err(serde::de::Error::custom(format!(
                "invalid ttl `{name}`, expected \"forever\" or milliseconds"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forever_never_expires() {
        assert!(!Ttl::Forever.is_expired(Duration::MAX));
        assert!(!Ttl::Forever.is_expired(Duration::ZERO));
    }

    #[test]
    fn test_after_expires_strictly_past_ttl() {
        let ttl = Ttl::from_millis(50);
        assert!(!ttl.is_expired(Duration::from_millis(49)));
        assert!(!ttl.is_expired(Duration::from_millis(50)));
        assert!(ttl.is_expired(Duration::from_millis(51)));
    }

    #[test]
    fn test_zero_duration_is_not_forever() {
        let ttl = Ttl::After(Duration::ZERO);
        assert!(ttl.is_expired(Duration::from_nanos(1)));
        assert_ne!(ttl, Ttl::Forever);
    }

    #[test]
    fn test_deserialize() {
        let ttl: Ttl = serde_json::from_str("250").unwrap();
        assert_eq!(ttl, Ttl::from_millis(250));

        let ttl: Ttl = serde_json::from_str("\"forever\"").unwrap();
        assert_eq!(ttl, Ttl::Forever);

        let ttl: Ttl = serde_json::from_str("null").unwrap();
        assert_eq!(ttl, Ttl::Forever);

        assert!(serde_json::from_str::<Ttl>("\"soon\"").is_err());
    }
}
