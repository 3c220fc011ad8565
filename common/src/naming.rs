use sha2::{Digest, Sha256};

use crate::core::DatasetIdentity;

/// Length of a derived segment name, in characters.
pub const SEGMENT_NAME_LEN: usize = 64;

/// Derive the shared memory segment name for a dataset identity.
///
/// Lowercase hex SHA-256 of the identity string: fixed length, legal as
/// an OS shared memory object name on every platform of interest, and
/// identical for every process that agrees on the identity.
pub fn segment_name(identity: &DatasetIdentity) -> String {
    let digest = Sha256::digest(identity.as_str().as_bytes());
    hex::encode(digest)
}

#[cfg(test)]
mod tests {
    use crate::core::DatasetIdentity;

    use super::{segment_name, SEGMENT_NAME_LEN};

    #[test]
    pub fn test_same_identity_same_name() {
        let a = segment_name(&DatasetIdentity::new("/data/drone/04"));
        let b = segment_name(&DatasetIdentity::new("/data/drone/04"));
        assert_eq!(a, b);
    }

    #[test]
    pub fn test_distinct_identities_distinct_names() {
        let a = segment_name(&DatasetIdentity::new("/data/drone/04"));
        let b = segment_name(&DatasetIdentity::new("/data/drone/05"));
        assert_ne!(a, b);
    }

    #[test]
    pub fn test_name_is_fixed_length_lowercase_hex() {
        let name = segment_name(&DatasetIdentity::new("anything"));
        assert_eq!(name.len(), SEGMENT_NAME_LEN);
        assert!(name.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }
}
