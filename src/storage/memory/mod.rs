//! An in-process object store.
//!
//! Used by the engine tests and by library users who want to drive a migration without
//! network access. Faults can be injected per bucket or per key to exercise retry and
//! error paths.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::io;
use std::sync::{Arc, Mutex};

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use aws_sdk_s3::primitives::{ByteStream, DateTime};
use tracing::trace;

use crate::storage::e_tag_verify::ETagHasher;
use crate::storage::{ListPage, ObjectBody, Storage, StorageTrait, read_exact_size};
use crate::types::ObjectDescriptor;
use crate::types::error::MigrationError;

#[derive(Debug, Clone, PartialEq)]
pub struct StoredObject {
    pub data: Vec<u8>,
    pub e_tag: Option<String>,
    pub last_modified: DateTime,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CallCounts {
    pub head_bucket: u64,
    pub list_objects_page: u64,
    pub head_object: u64,
    pub get_object: u64,
    pub put_object: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketState {
    Available,
    NotFound,
    Unreachable,
}

#[derive(Debug)]
struct MemoryState {
    objects: BTreeMap<String, StoredObject>,
    bucket_state: BucketState,
    fail_list: bool,
    fail_head_object: bool,
    // remaining failures per key, `None` fails forever
    put_failures: HashMap<String, Option<u32>>,
    truncated_gets: HashSet<String>,
    calls: CallCounts,
}

#[derive(Debug, Clone)]
pub struct MemoryStorage {
    bucket: String,
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStorage {
    pub fn new(bucket: &str) -> Self {
        Self {
            bucket: bucket.to_string(),
            state: Arc::new(Mutex::new(MemoryState {
                objects: BTreeMap::new(),
                bucket_state: BucketState::Available,
                fail_list: false,
                fail_head_object: false,
                put_failures: HashMap::new(),
                truncated_gets: HashSet::new(),
                calls: CallCounts::default(),
            })),
        }
    }

    pub fn boxed(&self) -> Storage {
        Box::new(self.clone())
    }

    /// Stores `data` with the MD5 e_tag an S3-compatible store would report.
    pub fn insert(&self, key: &str, data: &[u8]) {
        let mut hasher = ETagHasher::new();
        hasher.update(data);
        self.insert_with_e_tag(key, data, Some(&hasher.finalize(false)));
    }

    pub fn insert_with_e_tag(&self, key: &str, data: &[u8], e_tag: Option<&str>) {
        self.state.lock().unwrap().objects.insert(
            key.to_string(),
            StoredObject {
                data: data.to_vec(),
                e_tag: e_tag.map(|e_tag| e_tag.to_string()),
                last_modified: DateTime::from_secs(0),
            },
        );
    }

    pub fn object(&self, key: &str) -> Option<StoredObject> {
        self.state.lock().unwrap().objects.get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        self.state.lock().unwrap().objects.keys().cloned().collect()
    }

    pub fn calls(&self) -> CallCounts {
        self.state.lock().unwrap().calls
    }

    pub fn set_bucket_state(&self, bucket_state: BucketState) {
        self.state.lock().unwrap().bucket_state = bucket_state;
    }

    pub fn fail_list(&self, fail: bool) {
        self.state.lock().unwrap().fail_list = fail;
    }

    pub fn fail_head_object(&self, fail: bool) {
        self.state.lock().unwrap().fail_head_object = fail;
    }

    /// The next `times` uploads of `key` fail with a connection reset. `None` fails forever.
    pub fn fail_put(&self, key: &str, times: Option<u32>) {
        self.state
            .lock()
            .unwrap()
            .put_failures
            .insert(key.to_string(), times);
    }

    /// Downloads of `key` end one byte early.
    pub fn truncate_get(&self, key: &str) {
        self.state
            .lock()
            .unwrap()
            .truncated_gets
            .insert(key.to_string());
    }

    fn take_put_failure(&self, key: &str) -> bool {
        let mut state = self.state.lock().unwrap();
        match state.put_failures.get_mut(key) {
            None => false,
            Some(None) => true,
            Some(Some(0)) => false,
            Some(Some(remaining)) => {
                *remaining -= 1;
                true
            }
        }
    }

    fn descriptor(key: &str, object: &StoredObject) -> ObjectDescriptor {
        ObjectDescriptor::new(
            key,
            object.data.len() as u64,
            object.e_tag.as_deref(),
            object.last_modified,
        )
    }
}

#[async_trait]
impl StorageTrait for MemoryStorage {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn head_bucket(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.head_bucket += 1;

        match state.bucket_state {
            BucketState::Available => Ok(()),
            BucketState::NotFound => Err(anyhow!(MigrationError::BucketNotFound {
                bucket: self.bucket.clone(),
            })),
            BucketState::Unreachable => Err(anyhow!(MigrationError::BucketUnreachable {
                bucket: self.bucket.clone(),
                message: "connection refused".to_string(),
            })),
        }
    }

    async fn list_objects_page(
        &self,
        prefix: &str,
        continuation_token: Option<String>,
        max_keys: i32,
    ) -> Result<ListPage> {
        let mut state = self.state.lock().unwrap();
        state.calls.list_objects_page += 1;

        if state.fail_list {
            return Err(anyhow!(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "list_objects_page() failed.",
            )));
        }

        // The continuation token is the last key returned by the previous page.
        let objects: Vec<ObjectDescriptor> = state
            .objects
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .filter(|(key, _)| {
                continuation_token
                    .as_ref()
                    .is_none_or(|token| key.as_str() > token.as_str())
            })
            .take(max_keys.max(1) as usize + 1)
            .map(|(key, object)| Self::descriptor(key, object))
            .collect();

        let page_size = max_keys.max(1) as usize;
        let truncated = page_size < objects.len();
        let objects: Vec<ObjectDescriptor> = objects.into_iter().take(page_size).collect();
        let next_continuation_token = if truncated {
            objects.last().map(|object| object.key.clone())
        } else {
            None
        };

        trace!(
            bucket = self.bucket,
            count = objects.len(),
            truncated = truncated,
            "list_objects_page() completed."
        );

        Ok(ListPage {
            objects,
            next_continuation_token,
        })
    }

    async fn head_object(&self, key: &str) -> Result<Option<ObjectDescriptor>> {
        let mut state = self.state.lock().unwrap();
        state.calls.head_object += 1;

        if state.fail_head_object {
            return Err(anyhow!(io::Error::new(
                io::ErrorKind::TimedOut,
                "head_object() timed out.",
            )));
        }

        Ok(state
            .objects
            .get(key)
            .map(|object| Self::descriptor(key, object)))
    }

    async fn get_object(&self, key: &str) -> Result<ObjectBody> {
        let mut state = self.state.lock().unwrap();
        state.calls.get_object += 1;

        let object = state.objects.get(key).ok_or_else(|| {
            anyhow!(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no such key: {key}"),
            ))
        })?;

        let content_length = object.data.len() as u64;
        let mut data = object.data.clone();
        if state.truncated_gets.contains(key) {
            data.pop();
        }

        Ok(ObjectBody::new(ByteStream::from(data), content_length))
    }

    async fn put_object(&self, key: &str, body: ObjectBody, size: u64) -> Result<()> {
        self.state.lock().unwrap().calls.put_object += 1;

        let mut reader = body.body.into_async_read();
        let data = read_exact_size(&mut reader, size).await?;

        if self.take_put_failure(key) {
            return Err(anyhow!(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "put_object() connection reset.",
            )));
        }

        self.insert(key, &data);

        Ok(())
    }
}
