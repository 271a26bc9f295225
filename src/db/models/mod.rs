//! Row types shared by every store backend.

pub mod todo;
pub mod user_device;

pub use self::todo::*;
pub use self::user_device::*;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer};

/// Accept an identifier encoded either as a JSON string or as a JSON integer.
///
/// PostgREST serializes `bigint`/`int` keys as numbers and `uuid`/`text` keys
/// as strings; the pipeline only ever treats ids as opaque strings.
pub(crate) fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    struct IdVisitor;

    impl<'de> serde::de::Visitor<'de> for IdVisitor {
        type Value = String;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("a string or integer identifier")
        }

        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E> {
            Ok(v.to_string())
        }

        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E> {
            Ok(v.to_string())
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E> {
            Ok(v.to_string())
        }

        fn visit_string<E>(self, v: String) -> Result<Self::Value, E> {
            Ok(v)
        }
    }

    deserializer.deserialize_any(IdVisitor)
}

/// Treat JSON `null` as an empty string.
pub(crate) fn deserialize_nullable_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Accept RFC 3339 timestamps and offset-less `timestamp` values (read as
/// UTC). Anything else becomes `None` instead of failing the whole row.
pub(crate) fn deserialize_lenient_time<'de, D>(
    deserializer: D,
) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = match Option::<serde_json::Value>::deserialize(deserializer)? {
        Some(serde_json::Value::String(raw)) => raw,
        _ => return Ok(None),
    };

    if let Ok(parsed) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(Some(parsed.with_timezone(&Utc)));
    }

    Ok(["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(&raw, fmt).ok())
        .map(|naive| naive.and_utc()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Wrapper {
        #[serde(deserialize_with = "deserialize_id")]
        id: String,
    }

    #[test]
    fn accepts_numeric_and_string_ids() {
        let numeric: Wrapper = serde_json::from_str(r#"{"id": 42}"#).unwrap();
        assert_eq!(numeric.id, "42");

        let text: Wrapper =
            serde_json::from_str(r#"{"id": "9b2f6c1e-0d3a-4a8e-9f44-1f2a3b4c5d6e"}"#).unwrap();
        assert_eq!(text.id, "9b2f6c1e-0d3a-4a8e-9f44-1f2a3b4c5d6e");
    }

    #[test]
    fn rejects_other_shapes() {
        assert!(serde_json::from_str::<Wrapper>(r#"{"id": true}"#).is_err());
        assert!(serde_json::from_str::<Wrapper>(r#"{"id": null}"#).is_err());
    }

    #[derive(Deserialize)]
    struct Row {
        #[serde(default, deserialize_with = "deserialize_nullable_string")]
        title: String,
        #[serde(default, deserialize_with = "deserialize_lenient_time")]
        start_time: Option<DateTime<Utc>>,
    }

    #[test]
    fn null_title_reads_as_empty() {
        let row: Row = serde_json::from_str(r#"{"title": null}"#).unwrap();
        assert_eq!(row.title, "");
        assert!(row.start_time.is_none());
    }

    #[test]
    fn start_time_without_offset_is_read_as_utc() {
        let row: Row =
            serde_json::from_str(r#"{"title": "x", "start_time": "2024-05-01T09:00:00"}"#).unwrap();
        assert_eq!(
            row.start_time.unwrap().to_rfc3339(),
            "2024-05-01T09:00:00+00:00"
        );

        let row: Row =
            serde_json::from_str(r#"{"title": "x", "start_time": "2024-05-01T09:00:00+02:00"}"#)
                .unwrap();
        assert_eq!(
            row.start_time.unwrap().to_rfc3339(),
            "2024-05-01T07:00:00+00:00"
        );
    }

    #[test]
    fn unreadable_start_time_is_dropped() {
        let row: Row =
            serde_json::from_str(r#"{"title": "x", "start_time": "tomorrow"}"#).unwrap();
        assert!(row.start_time.is_none());
        let row: Row = serde_json::from_str(r#"{"title": "x", "start_time": 17}"#).unwrap();
        assert!(row.start_time.is_none());
    }
}
