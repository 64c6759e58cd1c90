use anyhow::{Result, anyhow};
use tracing::trace;

use crate::pipeline::key_aggregator::DestinationIndex;
use crate::storage::Storage;
use crate::storage::e_tag_verify::verify_e_tag;
use crate::types::error::MigrationError;
use crate::types::{MigrationDecision, ObjectDescriptor, SkipReason, UpdateReason};

/// Decides what to do with one source object given what the destination holds.
///
/// Identity requires equal sizes and equal e_tags. A missing e_tag on either side cannot
/// confirm identity. Multipart e_tags depend on the part size used by the uploader, so two
/// copies of the same content may still compare as different.
pub fn decide(
    source: &ObjectDescriptor,
    destination: Option<&ObjectDescriptor>,
) -> MigrationDecision {
    let Some(destination) = destination else {
        return MigrationDecision::Copy;
    };

    if source.size != destination.size {
        return MigrationDecision::Update(UpdateReason::SizeMismatch);
    }

    match verify_e_tag(source.e_tag.as_deref(), destination.e_tag.as_deref()) {
        Some(true) => MigrationDecision::Skip(SkipReason::AlreadyIdentical),
        _ => MigrationDecision::Update(UpdateReason::ChecksumMismatch),
    }
}

/// Looks up the destination descriptor for `key`. A failed HEAD becomes
/// `MigrationError::ComparisonFailed`.
pub async fn resolve_destination(
    index: &DestinationIndex,
    target: &Storage,
    key: &str,
) -> Result<Option<ObjectDescriptor>> {
    match index {
        DestinationIndex::KeyMap(key_map) => Ok(key_map.get(key).cloned()),
        DestinationIndex::HeadEachObject => {
            let result = target.head_object(key).await.map_err(|e| {
                anyhow!(MigrationError::ComparisonFailed {
                    key: key.to_string(),
                    message: format!("{e:#}"),
                })
            })?;

            trace!(key = key, exists = result.is_some(), "head_object() completed.");
            Ok(result)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use aws_sdk_s3::primitives::DateTime;

    use crate::storage::memory::MemoryStorage;

    use super::*;

    fn descriptor(key: &str, size: u64, e_tag: Option<&str>) -> ObjectDescriptor {
        ObjectDescriptor::new(key, size, e_tag, DateTime::from_secs(0))
    }

    #[test]
    fn decide_copy_when_absent() {
        init_dummy_tracing_subscriber();

        let source = descriptor("a", 10, Some("e1"));
        assert_eq!(decide(&source, None), MigrationDecision::Copy);
    }

    #[test]
    fn decide_skip_when_identical() {
        init_dummy_tracing_subscriber();

        let source = descriptor("a", 10, Some("\"e1\""));
        let destination = descriptor("a", 10, Some("e1"));
        assert_eq!(
            decide(&source, Some(&destination)),
            MigrationDecision::Skip(SkipReason::AlreadyIdentical)
        );
    }

    #[test]
    fn decide_update_size_mismatch() {
        init_dummy_tracing_subscriber();

        let source = descriptor("a", 10, Some("e1"));
        let destination = descriptor("a", 11, Some("e1"));
        assert_eq!(
            decide(&source, Some(&destination)),
            MigrationDecision::Update(UpdateReason::SizeMismatch)
        );
    }

    #[test]
    fn decide_update_checksum_mismatch() {
        init_dummy_tracing_subscriber();

        let source = descriptor("a", 10, Some("e1"));
        let destination = descriptor("a", 10, Some("e2"));
        assert_eq!(
            decide(&source, Some(&destination)),
            MigrationDecision::Update(UpdateReason::ChecksumMismatch)
        );
    }

    #[test]
    fn decide_update_when_e_tag_missing() {
        init_dummy_tracing_subscriber();

        let with_e_tag = descriptor("a", 10, Some("e1"));
        let without_e_tag = descriptor("a", 10, None);
        assert_eq!(
            decide(&with_e_tag, Some(&without_e_tag)),
            MigrationDecision::Update(UpdateReason::ChecksumMismatch)
        );
        assert_eq!(
            decide(&without_e_tag, Some(&with_e_tag)),
            MigrationDecision::Update(UpdateReason::ChecksumMismatch)
        );
        assert_eq!(
            decide(&without_e_tag, Some(&without_e_tag)),
            MigrationDecision::Update(UpdateReason::ChecksumMismatch)
        );
    }

    #[test]
    fn decide_multipart_e_tags_compare_as_strings() {
        init_dummy_tracing_subscriber();

        let source = descriptor("a", 10, Some("\"abc-2\""));
        let same_part_size = descriptor("a", 10, Some("abc-2"));
        let other_part_size = descriptor("a", 10, Some("def-3"));

        assert!(decide(&source, Some(&same_part_size)).is_skip());
        assert!(!decide(&source, Some(&other_part_size)).is_skip());
    }

    #[tokio::test]
    async fn resolve_destination_from_key_map() {
        init_dummy_tracing_subscriber();

        let target = MemoryStorage::new("target-bucket");
        let mut key_map = HashMap::new();
        key_map.insert("a".to_string(), descriptor("a", 1, Some("e1")));
        let index = DestinationIndex::KeyMap(key_map);

        let storage = target.boxed();
        assert!(
            resolve_destination(&index, &storage, "a")
                .await
                .unwrap()
                .is_some()
        );
        assert!(
            resolve_destination(&index, &storage, "b")
                .await
                .unwrap()
                .is_none()
        );
        assert_eq!(target.calls().head_object, 0);
    }

    #[tokio::test]
    async fn resolve_destination_by_head_object() {
        init_dummy_tracing_subscriber();

        let target = MemoryStorage::new("target-bucket");
        target.insert("a", b"data");

        let storage = target.boxed();
        let index = DestinationIndex::HeadEachObject;
        let destination = resolve_destination(&index, &storage, "a")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(destination.size, 4);
        assert!(
            resolve_destination(&index, &storage, "b")
                .await
                .unwrap()
                .is_none()
        );
        assert_eq!(target.calls().head_object, 2);
    }

    #[tokio::test]
    async fn resolve_destination_failure() {
        init_dummy_tracing_subscriber();

        let target = MemoryStorage::new("target-bucket");
        target.fail_head_object(true);

        let e = resolve_destination(&DestinationIndex::HeadEachObject, &target.boxed(), "a")
            .await
            .unwrap_err();
        assert!(matches!(
            e.downcast_ref::<MigrationError>(),
            Some(MigrationError::ComparisonFailed { key, .. }) if key == "a"
        ));
    }

    fn init_dummy_tracing_subscriber() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("dummy=trace")
            .try_init();
    }
}
