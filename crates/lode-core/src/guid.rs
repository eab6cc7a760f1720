use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Stable 64-bit identity for an asset or entity.
///
/// GUIDs are fully random, so two machines can mint ids independently without
/// a central authority. The zero value is reserved as the explicit "invalid"
/// guid and is representable in the string form.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Guid(u64);

impl Guid {
    /// The reserved invalid guid.
    pub const INVALID: Self = Self(0);

    /// Creates a new random guid.
    pub fn generate() -> Self {
        let wide = uuid::Uuid::new_v4().as_u128();
        let folded = ((wide >> 64) ^ wide) as u64;
        // The reserved value must never come out of the generator.
        Self(if folded == 0 { 1 } else { folded })
    }

    /// Initialize from an existing, serialized, source.
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw 64-bit value.
    pub const fn as_raw(self) -> u64 {
        self.0
    }

    /// Returns `true` unless this is the reserved invalid guid.
    pub const fn is_valid(self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl fmt::Debug for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Guid({:016x})", self.0)
    }
}

/// Error returned when parsing a [`Guid`] from its string form.
#[derive(thiserror::Error, Debug)]
#[error("invalid guid string '{0}'")]
pub struct ParseGuidError(String);

impl FromStr for Guid {
    type Err = ParseGuidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 16 {
            return Err(ParseGuidError(s.into()));
        }
        u64::from_str_radix(s, 16)
            .map(Self)
            .map_err(|_err| ParseGuidError(s.into()))
    }
}

impl Serialize for Guid {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.to_string())
        } else {
            serializer.serialize_u64(self.0)
        }
    }
}

impl<'de> Deserialize<'de> for Guid {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        if deserializer.is_human_readable() {
            let text = String::deserialize(deserializer)?;
            text.parse().map_err(serde::de::Error::custom)
        } else {
            Ok(Self(u64::deserialize(deserializer)?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_round_trip() {
        let guid = Guid::generate();
        let text = guid.to_string();
        assert_eq!(text.len(), 16);
        assert_eq!(text.parse::<Guid>().unwrap(), guid);
    }

    #[test]
    fn invalid_is_representable() {
        assert_eq!(Guid::INVALID.to_string(), "0000000000000000");
        assert_eq!(
            "0000000000000000".parse::<Guid>().unwrap(),
            Guid::INVALID
        );
        assert!(!Guid::INVALID.is_valid());
    }

    #[test]
    fn generated_guids_are_valid_and_distinct() {
        let a = Guid::generate();
        let b = Guid::generate();
        assert!(a.is_valid());
        assert_ne!(a, b);
    }

    #[test]
    fn json_form_is_the_string_form() {
        let guid = Guid::from_raw(0xdead_beef);
        let json = serde_json::to_string(&guid).unwrap();
        assert_eq!(json, "\"00000000deadbeef\"");
        let back: Guid = serde_json::from_str(&json).unwrap();
        assert_eq!(back, guid);
    }
}
