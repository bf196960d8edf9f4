use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// History entries
// ---------------------------------------------------------------------------

/// One encrypted shell-history record as stored in a device mailbox.
///
/// The relay never looks inside `enc_data`/`nonce`. `device_id` names the
/// mailbox that owns this copy; on submission it names the source device and
/// the server rewrites it once per registered device.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EncHistoryEntry {
    #[serde(with = "base64_bytes", default)]
    pub enc_data: Vec<u8>,
    #[serde(with = "base64_bytes", default)]
    pub nonce: Vec<u8>,
    pub device_id: String,
    pub user_id: String,
    pub end_time: DateTime<Utc>,
    pub entry_id: String,
    #[serde(default)]
    pub read_count: i64,
}

// ---------------------------------------------------------------------------
// Dump requests
// ---------------------------------------------------------------------------

/// "Some peer, please send `requesting_device_id` a full copy of your history."
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DumpRequest {
    pub user_id: String,
    pub requesting_device_id: String,
    pub request_time: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Deletion requests
// ---------------------------------------------------------------------------

/// Identity of a historical command, independent of which mailbox holds it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct MessageIdentifier {
    pub device_id: String,
    pub end_time: DateTime<Utc>,
    #[serde(default)]
    pub entry_id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageIdentifiers {
    #[serde(default)]
    pub ids: Vec<MessageIdentifier>,
}

/// A request to delete entries on every device of a user.
///
/// Submitted once by a client, then stored as one row per device with
/// `destination_device_id` set to that device.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeletionRequest {
    pub user_id: String,
    #[serde(default)]
    pub destination_device_id: String,
    pub send_time: DateTime<Utc>,
    #[serde(default)]
    pub messages: MessageIdentifiers,
    #[serde(default)]
    pub read_count: i64,
}

/// Serialize `Vec<u8>` as standard base64, accepting `null` as empty.
mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded: Option<String> = Option::deserialize(deserializer)?;
        match encoded {
            Some(s) => STANDARD.decode(s).map_err(serde::de::Error::custom),
            None => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_payload_is_base64_on_the_wire() {
        let entry = EncHistoryEntry {
            enc_data: b"ciphertext".to_vec(),
            nonce: vec![1, 2, 3],
            device_id: "dev-a".into(),
            user_id: "user".into(),
            end_time: "2026-01-02T03:04:05Z".parse().unwrap(),
            entry_id: "e1".into(),
            read_count: 0,
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["enc_data"], "Y2lwaGVydGV4dA==");
        assert_eq!(json["nonce"], "AQID");
    }

    #[test]
    fn entry_read_count_defaults_to_zero() {
        let entry: EncHistoryEntry = serde_json::from_str(
            r#"{"enc_data":null,"nonce":"AQID","device_id":"d","user_id":"u",
                "end_time":"2026-01-02T03:04:05Z","entry_id":"e"}"#,
        )
        .unwrap();
        assert_eq!(entry.read_count, 0);
        assert!(entry.enc_data.is_empty());
    }

    #[test]
    fn deletion_request_wraps_ids() {
        let request: DeletionRequest = serde_json::from_str(
            r#"{"user_id":"u","send_time":"2026-01-02T03:04:05Z",
                "messages":{"ids":[{"device_id":"d","end_time":"2026-01-01T00:00:00Z","entry_id":"e"}]}}"#,
        )
        .unwrap();
        assert_eq!(request.destination_device_id, "");
        assert_eq!(request.messages.ids.len(), 1);
        assert_eq!(request.messages.ids[0].device_id, "d");
    }
}
