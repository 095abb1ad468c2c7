//! Key namespacing and value encoding for the remote tier.

use crate::cache::CacheValue;
use crate::error::{CacheError, CacheResult};
use serde::de::DeserializeOwned;
use serde::Serialize;

const TAG_TOMBSTONE: u8 = 0x00;
const TAG_PRESENT: u8 = 0x01;

const KEY_SEPARATOR: &str = "::";
/// Marks lock keys. Cache names and cache key prefixes may not contain it.
const LOCK_SIGIL: char = '#';
const LOCK_NAMESPACE: &str = "#lock";

/// Builds remote keys from cache names and cache keys.
///
/// # Examples
///
/// ```
/// use tiercache_core::KeyCodec;
///
/// let codec = KeyCodec::new("app:");
/// assert_eq!(codec.encode("orders", "order:42"), "app:orders::order:42");
/// assert_eq!(codec.decode("orders", "app:orders::order:42"), Some("order:42"));
/// assert_eq!(codec.lock_key("orders", "order:42"), "app:#lock::orders::order:42");
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct KeyCodec {
    prefix: String,
}

impl KeyCodec {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn encode(&self, cache: &str, key: &str) -> String {
        format!("{}{}{}{}", self.prefix, cache, KEY_SEPARATOR, key)
    }

    /// Prefix shared by every key of one cache, used for bulk operations.
    pub fn cache_prefix(&self, cache: &str) -> String {
        format!("{}{}{}", self.prefix, cache, KEY_SEPARATOR)
    }

    pub fn decode<'a>(&self, cache: &str, remote_key: &'a str) -> Option<&'a str> {
        remote_key
            .strip_prefix(self.prefix.as_str())?
            .strip_prefix(cache)?
            .strip_prefix(KEY_SEPARATOR)
    }

    pub fn lock_key(&self, cache: &str, key: &str) -> String {
        format!(
            "{}{}{}{}{}{}",
            self.prefix, LOCK_NAMESPACE, KEY_SEPARATOR, cache, KEY_SEPARATOR, key
        )
    }
}

/// Rejects cache names whose remote keys could fall under another cache's
/// prefix or under the lock namespace.
///
/// A name must be non-empty, must not contain `::` or end with `:`, and
/// neither the name nor `key_prefix` may contain `#`.
pub fn validate_cache_name(name: &str, key_prefix: &str) -> CacheResult<()> {
    if name.is_empty() {
        return Err(CacheError::configuration(name, "cache name must not be empty"));
    }
    if name.contains(KEY_SEPARATOR) || name.ends_with(':') {
        return Err(CacheError::configuration(
            name,
            "cache name must not contain '::' or end with ':'",
        ));
    }
    if name.contains(LOCK_SIGIL) || key_prefix.contains(LOCK_SIGIL) {
        return Err(CacheError::configuration(
            name,
            format!("'{}' is reserved for lock keys", LOCK_SIGIL),
        ));
    }
    Ok(())
}

/// Converts cache values to the representation stored remotely, and back.
///
/// Decoding must fail loudly on unknown input: a corrupt payload is a
/// `Serialization` error and is never read as a tombstone.
pub trait ValueSerializer: Send + Sync {
    fn encode(&self, key: &str, value: &CacheValue) -> CacheResult<Vec<u8>>;

    fn decode(&self, key: &str, raw: &[u8]) -> CacheResult<CacheValue>;
}

/// Binary-safe envelope: one tag byte followed by the payload.
#[derive(Clone, Copy, Debug, Default)]
pub struct BinarySerializer;

impl ValueSerializer for BinarySerializer {
    fn encode(&self, _key: &str, value: &CacheValue) -> CacheResult<Vec<u8>> {
        Ok(match value {
            CacheValue::Tombstone => vec![TAG_TOMBSTONE],
            CacheValue::Present(bytes) => {
                let mut out = Vec::with_capacity(bytes.len() + 1);
                out.push(TAG_PRESENT);
                out.extend_from_slice(bytes);
                out
            }
        })
    }

    fn decode(&self, key: &str, raw: &[u8]) -> CacheResult<CacheValue> {
        match raw.split_first() {
            Some((&TAG_TOMBSTONE, [])) => Ok(CacheValue::Tombstone),
            Some((&TAG_PRESENT, payload)) => Ok(CacheValue::Present(payload.to_vec())),
            Some((tag, _)) => Err(CacheError::serialization(
                key,
                format!("unknown envelope tag {:#04x}", tag),
            )),
            None => Err(CacheError::serialization(key, "empty payload")),
        }
    }
}

/// Text-safe envelope for stores that only accept UTF-8: the binary
/// envelope rendered as lowercase hex.
#[derive(Clone, Copy, Debug, Default)]
pub struct TextSerializer;

impl ValueSerializer for TextSerializer {
    fn encode(&self, key: &str, value: &CacheValue) -> CacheResult<Vec<u8>> {
        let binary = BinarySerializer.encode(key, value)?;
        Ok(hex::encode(binary).into_bytes())
    }

    fn decode(&self, key: &str, raw: &[u8]) -> CacheResult<CacheValue> {
        let binary = hex::decode(raw).map_err(|e| CacheError::serialization(key, e))?;
        BinarySerializer.decode(key, &binary)
    }
}

/// Serializes a typed value with serde_json.
pub fn encode_json<T: Serialize + ?Sized>(key: &str, value: &T) -> CacheResult<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| CacheError::serialization(key, e))
}

/// Deserializes a typed value with serde_json.
pub fn decode_json<T: DeserializeOwned>(key: &str, bytes: &[u8]) -> CacheResult<T> {
    serde_json::from_slice(bytes).map_err(|e| CacheError::serialization(key, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tombstone_survives_both_envelopes() {
        for serializer in [&BinarySerializer as &dyn ValueSerializer, &TextSerializer] {
            let raw = serializer.encode("k", &CacheValue::Tombstone).unwrap();
            assert_eq!(serializer.decode("k", &raw).unwrap(), CacheValue::Tombstone);
        }
    }

    #[test]
    fn test_empty_present_value_is_not_a_tombstone() {
        let raw = BinarySerializer
            .encode("k", &CacheValue::Present(Vec::new()))
            .unwrap();
        assert_eq!(raw, vec![TAG_PRESENT]);
        assert_eq!(
            BinarySerializer.decode("k", &raw).unwrap(),
            CacheValue::Present(Vec::new())
        );
    }

    #[test]
    fn test_corrupt_payload_is_serialization_error() {
        let err = BinarySerializer.decode("k", &[0x7f, 1, 2]).unwrap_err();
        assert!(matches!(err, CacheError::Serialization { .. }));

        assert!(BinarySerializer.decode("k", &[]).is_err());
        assert!(BinarySerializer.decode("k", &[TAG_TOMBSTONE, 9]).is_err());
        assert!(TextSerializer.decode("k", b"not-hex").is_err());
    }

    #[test]
    fn test_text_envelope_is_ascii() {
        let raw = TextSerializer
            .encode("k", &CacheValue::Present(vec![0xff, 0x00, 0x10]))
            .unwrap();
        assert_eq!(raw, b"01ff0010".to_vec());
    }

    #[test]
    fn test_decode_rejects_foreign_cache() {
        let codec = KeyCodec::new("");
        assert_eq!(codec.decode("orders", "users::1"), None);
    }

    #[test]
    fn test_cache_prefixes_never_cover_lock_keys() {
        let codec = KeyCodec::new("app:");
        let lock_key = codec.lock_key("orders", "order:42");
        for cache in ["lock", "orders", "app", ""] {
            assert!(!lock_key.starts_with(&codec.cache_prefix(cache)), "{}", cache);
        }
    }

    #[test]
    fn test_cache_name_validation() {
        assert!(validate_cache_name("orders", "").is_ok());
        assert!(validate_cache_name("lock", "app:").is_ok());
        assert!(validate_cache_name("order:items", "").is_ok());

        for name in ["", "a:", "a::b", "#lock", "or#ders"] {
            let err = validate_cache_name(name, "").unwrap_err();
            assert!(matches!(err, CacheError::Configuration { .. }), "{}", name);
        }
        assert!(validate_cache_name("orders", "app#").is_err());
    }

    #[test]
    fn test_json_type_mismatch() {
        let bytes = encode_json("k", "not a number").unwrap();
        let err = decode_json::<u32>("k", &bytes).unwrap_err();
        assert!(matches!(err, CacheError::Serialization { .. }));
    }
}
