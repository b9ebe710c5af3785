use humantime::format_duration;
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::time::Duration;

/// Duration read from human readable text such as `5s` or `1m 30s`.
/// Bare integers are taken as seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BenchDuration {
    duration: Duration,
}

impl BenchDuration {
    pub fn new(duration: Duration) -> Self {
        Self { duration }
    }

    pub fn from_secs(secs: u64) -> Self {
        Self::new(Duration::from_secs(secs))
    }

    pub fn get_duration(&self) -> Duration {
        self.duration
    }
}

impl FromStr for BenchDuration {
    type Err = humantime::DurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(secs) = s.parse::<u64>() {
            return Ok(Self::from_secs(secs));
        }
        Ok(Self::new(humantime::parse_duration(s)?))
    }
}

impl Display for BenchDuration {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", format_duration(self.duration))
    }
}

impl Serialize for BenchDuration {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for BenchDuration {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct BenchDurationVisitor;

        impl Visitor<'_> for BenchDurationVisitor {
            type Value = BenchDuration;

            fn expecting(&self, formatter: &mut Formatter) -> std::fmt::Result {
                formatter.write_str("a duration such as \"5s\" or a number of seconds")
            }

            fn visit_str<E: de::Error>(self, value: &str) -> Result<BenchDuration, E> {
                BenchDuration::from_str(value).map_err(E::custom)
            }

            fn visit_u64<E: de::Error>(self, value: u64) -> Result<BenchDuration, E> {
                Ok(BenchDuration::from_secs(value))
            }

            fn visit_i64<E: de::Error>(self, value: i64) -> Result<BenchDuration, E> {
                u64::try_from(value)
                    .map(BenchDuration::from_secs)
                    .map_err(|_| E::custom(format!("negative duration: {value}")))
            }
        }

        deserializer.deserialize_any(BenchDurationVisitor)
    }
}
