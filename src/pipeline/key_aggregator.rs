use std::collections::HashMap;

use anyhow::Result;
use tracing::{debug, warn};

use crate::pipeline::lister::ObjectLister;
use crate::storage::Storage;
use crate::types::ObjectDescriptor;
use crate::types::token::PipelineCancellationToken;

/// Destination state used by the comparator. Either a key map built from one listing of the
/// target, or per-object HEAD requests when no listing is available.
#[derive(Debug, Clone)]
pub enum DestinationIndex {
    KeyMap(HashMap<String, ObjectDescriptor>),
    HeadEachObject,
}

impl DestinationIndex {
    pub fn from_objects(objects: Vec<ObjectDescriptor>) -> Self {
        let mut key_map = HashMap::with_capacity(objects.len());
        for object in objects {
            let key = object.key.clone();
            if key_map.insert(key.clone(), object).is_some() {
                warn!(key = key, "duplicated key in the target listing.");
            }
        }

        DestinationIndex::KeyMap(key_map)
    }

    pub fn key_count(&self) -> Option<usize> {
        match self {
            DestinationIndex::KeyMap(key_map) => Some(key_map.len()),
            DestinationIndex::HeadEachObject => None,
        }
    }
}

pub struct KeyAggregator {
    target: Storage,
    prefix: String,
    max_keys: i32,
    cancellation_token: PipelineCancellationToken,
}

impl KeyAggregator {
    pub fn new(
        target: Storage,
        prefix: &str,
        max_keys: i32,
        cancellation_token: PipelineCancellationToken,
    ) -> Self {
        Self {
            target,
            prefix: prefix.to_string(),
            max_keys,
            cancellation_token,
        }
    }

    /// Never fails. A failed target listing falls back to per-object HEAD.
    pub async fn aggregate(&self) -> DestinationIndex {
        match self.list_target().await {
            Ok(objects) => {
                let index = DestinationIndex::from_objects(objects);
                debug!(
                    bucket = self.target.bucket(),
                    count = index.key_count(),
                    "target key map has been built."
                );
                index
            }
            Err(e) => {
                warn!(
                    bucket = self.target.bucket(),
                    error = format!("{e:#}"),
                    "failed to list target objects. fall back to head_object() for each object."
                );
                DestinationIndex::HeadEachObject
            }
        }
    }

    async fn list_target(&self) -> Result<Vec<ObjectDescriptor>> {
        ObjectLister::new(
            dyn_clone::clone_box(&*self.target),
            &self.prefix,
            self.max_keys,
            self.cancellation_token.clone(),
        )
        .list_all()
        .await
    }
}
