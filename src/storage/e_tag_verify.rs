/// Accumulates per-part MD5 digests to compute the e_tag an S3-compatible store
/// reports for a single-part or multipart upload.
#[derive(Debug, Default)]
pub struct ETagHasher {
    concatenated_md5_hash: Vec<u8>,
    parts_count: i64,
}

impl ETagHasher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one uploaded part and returns its raw MD5 digest.
    pub fn update(&mut self, part: &[u8]) -> [u8; 16] {
        let digest = md5::compute(part);
        self.concatenated_md5_hash.extend_from_slice(digest.as_slice());
        self.parts_count += 1;
        digest.0
    }

    /// Single-part uploads pass `multipart == false` so the plain MD5 is returned.
    pub fn finalize(&self, multipart: bool) -> String {
        if multipart {
            generate_e_tag_hash(&self.concatenated_md5_hash, self.parts_count)
        } else {
            generate_e_tag_hash(&self.concatenated_md5_hash, 0)
        }
    }
}

pub fn generate_e_tag_hash(concatenated_md5_hash: &[u8], parts_count: i64) -> String {
    if parts_count == 0 {
        concatenated_md5_hash
            .iter()
            .map(|byte| format!("{byte:02x}"))
            .collect()
    } else {
        format!("{:x}-{}", md5::compute(concatenated_md5_hash), parts_count)
    }
}

pub fn is_multipart_upload_e_tag(e_tag: &str) -> bool {
    e_tag.contains('-')
}

/// `None` when either side has no e_tag to compare.
pub fn verify_e_tag(expected: Option<&str>, actual: Option<&str>) -> Option<bool> {
    let (expected, actual) = (expected?, actual?);
    Some(expected.replace('"', "") == actual.replace('"', ""))
}
