use sha2::{Digest, Sha256};

/// Checksummed envelope for values written to the local field store.
///
/// Each stored key holds a JSON object `{ "data": ..., "checksum": ... }`.
/// `data` is the serialized value and `checksum` its hex SHA-256. A mismatch on
/// read means the file was truncated or edited by hand; the value is then
/// treated as absent.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct StoredEntry {
    /// The serialized value (JSON string).
    pub data: String,
    /// SHA-256 checksum of the data (hex encoded).
    pub checksum: String,
}

impl StoredEntry {
    /// Creates a new entry with computed checksum.
    pub fn new(data: String) -> Self {
        let checksum = Self::compute_checksum(&data);
        Self { data, checksum }
    }

    fn compute_checksum(data: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(data.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Returns true if the checksum matches.
    pub fn is_valid(&self) -> bool {
        let computed = Self::compute_checksum(&self.data);
        computed == self.checksum
    }

    /// Serializes the envelope for writing to disk.
    pub fn serialize(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parses and checks an envelope read from disk.
    ///
    /// Returns `Some(data)` if intact, `None` if corrupted or not an envelope.
    pub fn deserialize_and_validate(serialized: &str) -> Option<String> {
        let entry: StoredEntry = match serde_json::from_str(serialized) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("Stored entry is not a valid envelope: {}", e);
                return None;
            }
        };

        if entry.is_valid() {
            Some(entry.data)
        } else {
            tracing::warn!(
                "Stored entry failed validation: checksum mismatch. Expected: {}, Data length: {}",
                entry.checksum,
                entry.data.len()
            );
            None
        }
    }
}
