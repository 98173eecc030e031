use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// A single client-to-container assignment, or an unassigned warm-pool
/// container when `client_id` is the sentinel `__pool__`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerRecord {
    pub client_id: String,
    pub container_id: String,
    pub container_name: String,
    pub port: u16,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<String>,
}

/// Mirrors the wire shape of [`ContainerRecord`] but with both timestamps
/// optional, so one record with a missing or hand-edited timestamp field
/// doesn't fail `serde_json::from_str::<Vec<ContainerRecord>>` for the
/// entire file.
#[derive(Deserialize)]
struct RawContainerRecord {
    client_id: String,
    container_id: String,
    container_name: String,
    port: u16,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    last_accessed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    width: Option<String>,
    #[serde(default)]
    height: Option<String>,
}

impl<'de> Deserialize<'de> for ContainerRecord {
    /// Applies the fallback chain `last_accessed_at -> created_at -> epoch`
    /// (and the mirror for `created_at`) so a record missing one or both
    /// timestamps still loads, with `last_accessed_at >= created_at`
    /// preserved. The epoch sorts before every real timestamp, matching the
    /// intent of the legacy fallback to "whatever sorts first".
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = RawContainerRecord::deserialize(deserializer)?;

        let epoch = DateTime::<Utc>::from_timestamp(0, 0).expect("epoch is a valid timestamp");
        let created_at = raw.created_at.or(raw.last_accessed_at).unwrap_or(epoch);
        let last_accessed_at = raw.last_accessed_at.or(raw.created_at).unwrap_or(epoch);

        Ok(ContainerRecord {
            client_id: raw.client_id,
            container_id: raw.container_id,
            container_name: raw.container_name,
            port: raw.port,
            created_at,
            last_accessed_at,
            width: raw.width,
            height: raw.height,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_last_accessed_at_falls_back_to_created_at() {
        let record: ContainerRecord = serde_json::from_str(
            r#"{"client_id":"alice","container_id":"c1","container_name":"vnc_alice",
                "port":5000,"created_at":"2024-01-01T00:00:00Z"}"#,
        )
        .unwrap();

        assert_eq!(record.last_accessed_at, record.created_at);
    }

    #[test]
    fn missing_created_at_falls_back_to_last_accessed_at() {
        let record: ContainerRecord = serde_json::from_str(
            r#"{"client_id":"alice","container_id":"c1","container_name":"vnc_alice",
                "port":5000,"last_accessed_at":"2024-01-01T00:00:00Z"}"#,
        )
        .unwrap();

        assert_eq!(record.created_at, record.last_accessed_at);
    }

    #[test]
    fn missing_both_timestamps_falls_back_to_epoch_and_stays_monotone() {
        let record: ContainerRecord = serde_json::from_str(
            r#"{"client_id":"alice","container_id":"c1","container_name":"vnc_alice","port":5000}"#,
        )
        .unwrap();

        assert_eq!(record.created_at, DateTime::<Utc>::from_timestamp(0, 0).unwrap());
        assert_eq!(record.last_accessed_at, record.created_at);
    }

    #[test]
    fn a_record_with_both_timestamps_present_is_unaffected() {
        let record: ContainerRecord = serde_json::from_str(
            r#"{"client_id":"alice","container_id":"c1","container_name":"vnc_alice","port":5000,
                "created_at":"2024-01-01T00:00:00Z","last_accessed_at":"2024-06-01T00:00:00Z"}"#,
        )
        .unwrap();

        assert!(record.last_accessed_at > record.created_at);
    }

    #[test]
    fn one_bad_record_no_longer_fails_the_whole_file() {
        let records: Vec<ContainerRecord> = serde_json::from_str(
            r#"[
                {"client_id":"alice","container_id":"c1","container_name":"vnc_alice","port":5000},
                {"client_id":"bob","container_id":"c2","container_name":"vnc_bob","port":5001,
                 "created_at":"2024-01-01T00:00:00Z","last_accessed_at":"2024-01-02T00:00:00Z"}
            ]"#,
        )
        .unwrap();

        assert_eq!(records.len(), 2);
    }
}
