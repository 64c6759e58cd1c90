use std::str::FromStr;

use byte_unit::Byte;

const UNDER_MIN_CHUNK: &str = "must be greater than or equal to 5MiB";
const OVER_MAX_CHUNK: &str = "must be smaller than or equal to 5GiB";

// Part size limits of S3 multipart upload.
const MIN_CHUNK: u128 = 5 * 1024 * 1024;
const MAX_CHUNK: u128 = 5 * 1024 * 1024 * 1024;

const UNDER_MIN_BANDWIDTH: &str = "must be greater than or equal to 1MiB";
const OVER_MAX_BANDWIDTH: &str = "must be smaller than or equal to 100GiB";

const MIN_BANDWIDTH: u128 = 1024 * 1024;
const MAX_BANDWIDTH: u128 = 100 * 1024 * 1024 * 1024;

pub fn check_human_bytes(value: &str) -> Result<String, String> {
    parse_human_bytes(value).map(|_| value.to_string())
}

pub fn parse_human_bytes(value: &str) -> Result<u64, String> {
    parse_in_range(
        value,
        (MIN_CHUNK, UNDER_MIN_CHUNK),
        (MAX_CHUNK, OVER_MAX_CHUNK),
    )
}

pub fn check_human_bandwidth(value: &str) -> Result<String, String> {
    parse_human_bandwidth(value).map(|_| value.to_string())
}

pub fn parse_human_bandwidth(value: &str) -> Result<u64, String> {
    parse_in_range(
        value,
        (MIN_BANDWIDTH, UNDER_MIN_BANDWIDTH),
        (MAX_BANDWIDTH, OVER_MAX_BANDWIDTH),
    )
}

fn parse_in_range(value: &str, min: (u128, &str), max: (u128, &str)) -> Result<u64, String> {
    let bytes = Byte::from_str(value).map_err(|e| e.to_string())?.as_u128();

    if bytes < min.0 {
        return Err(min.1.to_string());
    }
    if bytes > max.0 {
        return Err(max.1.to_string());
    }

    u64::try_from(bytes).map_err(|e| e.to_string())
}
