//! Request/response correlation identifiers

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// JSON-RPC identifier: a string or an integer on the wire.
///
/// An empty string carries no value of its own and renders as the
/// integer `0`, both on the wire and in its display form.
///
/// Notifications carry no identifier at all, which is modelled as
/// `Option<Id>::None` rather than as a variant here, so `Id::Int(0)` and
/// "no id" never collapse into each other.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Id {
    Int(i64),
    Str(String),
}

impl Id {
    /// Key used for the pending-call map. Strings are used verbatim,
    /// integers in decimal.
    pub fn key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Id::Str(val) if !val.is_empty() => f.write_str(val),
            Id::Str(_) => f.write_str("0"),
            Id::Int(val) => write!(f, "{}", val),
        }
    }
}

impl From<i64> for Id {
    fn from(val: i64) -> Self {
        Id::Int(val)
    }
}

impl From<&str> for Id {
    fn from(val: &str) -> Self {
        Id::Str(val.to_string())
    }
}

impl From<String> for Id {
    fn from(val: String) -> Self {
        Id::Str(val)
    }
}

impl Serialize for Id {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Id::Str(val) if !val.is_empty() => serializer.serialize_str(val),
            Id::Str(_) => serializer.serialize_i64(0),
            Id::Int(val) => serializer.serialize_i64(*val),
        }
    }
}

impl<'de> Deserialize<'de> for Id {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(IdVisitor)
    }
}

struct IdVisitor;

impl<'de> Visitor<'de> for IdVisitor {
    type Value = Id;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a string or integer id")
    }

    fn visit_i64<E: de::Error>(self, val: i64) -> Result<Id, E> {
        Ok(Id::Int(val))
    }

    fn visit_u64<E: de::Error>(self, val: u64) -> Result<Id, E> {
        i64::try_from(val)
            .map(Id::Int)
            .map_err(|_| E::custom(format!("Invalid Id value: {}", val)))
    }

    fn visit_f64<E: de::Error>(self, val: f64) -> Result<Id, E> {
        Err(E::custom(format!("Invalid Id value: {}", val)))
    }

    fn visit_str<E: de::Error>(self, val: &str) -> Result<Id, E> {
        Ok(Id::Str(val.to_string()))
    }

    fn visit_string<E: de::Error>(self, val: String) -> Result<Id, E> {
        Ok(Id::Str(val))
    }

    fn visit_bool<E: de::Error>(self, val: bool) -> Result<Id, E> {
        Err(E::custom(format!("Invalid Id value: {}", val)))
    }

    fn visit_seq<A: de::SeqAccess<'de>>(self, _seq: A) -> Result<Id, A::Error> {
        Err(de::Error::custom("Invalid Id value: arrays not allowed"))
    }

    fn visit_map<A: de::MapAccess<'de>>(self, _map: A) -> Result<Id, A::Error> {
        Err(de::Error::custom("Invalid Id value: objects not allowed"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int_id_round_trip() {
        let id = Id::Int(123409398493);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "123409398493");

        let parsed: Id = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, id);
        assert_eq!(parsed.key(), "123409398493");
    }

    #[test]
    fn test_negative_int_id() {
        let parsed: Id = serde_json::from_str("-7").unwrap();
        assert_eq!(parsed, Id::Int(-7));
    }

    #[test]
    fn test_string_id_round_trip() {
        let id = Id::from("akak");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"akak\"");

        let parsed: Id = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, id);
        assert_eq!(parsed.key(), "akak");
    }

    #[test]
    fn test_rejects_structured_and_malformed_ids() {
        assert!(serde_json::from_str::<Id>(r#"{"method":"empty"}"#).is_err());
        assert!(serde_json::from_str::<Id>("[1,2,3]").is_err());
        assert!(serde_json::from_str::<Id>("193.392").is_err());
        assert!(serde_json::from_str::<Id>("true").is_err());
        assert!(serde_json::from_str::<Id>("\"akak").is_err());
        assert!(serde_json::from_str::<Id>("12ab").is_err());
    }

    #[test]
    fn test_empty_string_renders_as_zero() {
        let id: Id = serde_json::from_str("\"\"").unwrap();
        assert_eq!(id, Id::Str(String::new()));
        assert_eq!(serde_json::to_string(&id).unwrap(), "0");
        assert_eq!(id.key(), "0");
    }

    #[test]
    fn test_zero_is_not_absent() {
        let zero: Option<Id> = serde_json::from_str("0").unwrap();
        assert_eq!(zero, Some(Id::Int(0)));

        let absent: Option<Id> = serde_json::from_str("null").unwrap();
        assert_eq!(absent, None);
    }
}
