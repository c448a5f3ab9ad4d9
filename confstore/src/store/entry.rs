use serde_derive::{Deserialize, Serialize};

use super::Version;

/// A single operation on one configuration key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MutationOp {
    /// Upsert the key with the given value.
    Set(Vec<u8>),
    /// Remove the key.
    Clear,
}

/// One configuration mutation. Keys and values are opaque bytes; the
/// optional `class` tag partitions the key space for filtered reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mutation {
    pub key: Vec<u8>,
    pub class: Option<Vec<u8>>,
    pub op: MutationOp,
}

impl Mutation {
    pub fn set(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Mutation {
            key: key.into(),
            class: None,
            op: MutationOp::Set(value.into()),
        }
    }

    pub fn clear(key: impl Into<Vec<u8>>) -> Self {
        Mutation {
            key: key.into(),
            class: None,
            op: MutationOp::Clear,
        }
    }

    pub fn in_class(mut self, class: impl Into<Vec<u8>>) -> Self {
        self.class = Some(class.into());
        self
    }

    pub fn matches(&self, filter: &ClassFilter) -> bool {
        filter.matches(self.class.as_deref())
    }
}

/// A mutation together with the log version that committed it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionedMutation {
    pub version: Version,
    pub mutation: Mutation,
}

/// A value as held in the base snapshot. The class tag of the mutation that
/// last set the key is kept so filtered reads still work once the mutation
/// itself has been compacted away.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredValue {
    pub value: Vec<u8>,
    pub class: Option<Vec<u8>>,
}

/// An opaque config-class tag restricting a read to one class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassFilter(Vec<u8>);

impl ClassFilter {
    pub fn new(tag: impl Into<Vec<u8>>) -> Self {
        ClassFilter(tag.into())
    }

    pub fn tag(&self) -> &[u8] {
        &self.0
    }

    pub fn matches(&self, class: Option<&[u8]>) -> bool {
        class == Some(self.0.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_matches_tagged_mutations_only() {
        let filter = ClassFilter::new(b"storage".to_vec());

        let tagged = Mutation::set(b"knob".to_vec(), b"1".to_vec()).in_class(b"storage".to_vec());
        let other = Mutation::set(b"knob".to_vec(), b"1".to_vec()).in_class(b"proxy".to_vec());
        let untagged = Mutation::set(b"knob".to_vec(), b"1".to_vec());

        assert!(tagged.matches(&filter));
        assert!(!other.matches(&filter));
        assert!(!untagged.matches(&filter));
    }

    #[test]
    fn test_clear_carries_class() {
        let m = Mutation::clear(b"knob".to_vec()).in_class(b"storage".to_vec());
        assert_eq!(m.op, MutationOp::Clear);
        assert_eq!(m.class.as_deref(), Some(b"storage".as_slice()));
    }
}
