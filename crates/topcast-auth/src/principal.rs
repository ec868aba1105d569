// Deterministic, one-way mapping from an API key to a principal id.
//
// The API key is the only persistent unique identifier a caller has, and
// it must never be stored outside the credential source. Hashing gives a
// stable id with three properties: the same key always maps to the same
// principal, distinct keys map to distinct principals, and the key cannot
// be recovered from the id.
use sha2::{Digest, Sha256};
use topcast_common::ids::PrincipalId;

/// Derive the principal id for an API key: uppercase hex of the
/// SHA-256 digest of the key's UTF-8 bytes.
///
/// ```
/// use topcast_auth::derive_principal_id;
///
/// let id = derive_principal_id("my-key");
/// assert_eq!(id, derive_principal_id("my-key"));
/// assert_eq!(id.as_str().len(), 64);
/// ```
pub fn derive_principal_id(api_key: &str) -> PrincipalId {
    let digest = Sha256::digest(api_key.as_bytes());
    PrincipalId::new(hex::encode_upper(digest))
}
