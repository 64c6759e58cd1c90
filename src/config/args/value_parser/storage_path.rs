use percent_encoding::percent_decode_str;
use url::Url;

use crate::types::StoragePath;

const INVALID_SCHEME: &str = "scheme must be s3:// .";
const INVALID_PATH: &str = "path must be a valid s3:// URL.";
const NO_BUCKET_NAME_SPECIFIED: &str = "bucket name must be specified.";
const NO_PATH_SPECIFIED: &str = "path must be specified.";

pub fn check_storage_path(path: &str) -> Result<String, String> {
    if path.is_empty() {
        return Err(NO_PATH_SPECIFIED.to_string());
    }

    let parsed = Url::parse(path).map_err(|_| INVALID_PATH.to_string())?;
    if parsed.scheme() != "s3" {
        return Err(INVALID_SCHEME.to_string());
    }
    if parsed.host_str().is_none_or(|host| host.is_empty()) {
        return Err(NO_BUCKET_NAME_SPECIFIED.to_string());
    }

    Ok(path.to_string())
}

pub fn parse_storage_path(path: &str) -> Result<StoragePath, String> {
    check_storage_path(path)?;

    let parsed = Url::parse(path).map_err(|_| INVALID_PATH.to_string())?;
    let bucket = parsed
        .host_str()
        .ok_or_else(|| NO_BUCKET_NAME_SPECIFIED.to_string())?
        .to_string();

    let mut prefix = parsed.path().to_string();

    // remove first '/'
    if !prefix.is_empty() {
        prefix.remove(0);
    }

    let prefix = percent_decode_str(&prefix)
        .decode_utf8()
        .map_err(|e| e.to_string())?
        .to_string();

    Ok(StoragePath { bucket, prefix })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_valid_url() {
        init_dummy_tracing_subscriber();

        check_storage_path("s3://my-bucket").unwrap();
        check_storage_path("s3://my-bucket/").unwrap();
        check_storage_path("s3://my-bucket/xyz.dat").unwrap();
        check_storage_path("s3://my-bucket/xyz/").unwrap();
        check_storage_path("s3://my-bucket//xyz").unwrap();
        check_storage_path("s3://my-bucket/x+y/y+z").unwrap();
        check_storage_path("s3://my-bucket/hello/こんばんは/☃").unwrap();
    }

    #[test]
    fn invalid_scheme() {
        init_dummy_tracing_subscriber();

        assert_eq!(
            check_storage_path("https://my-bucket/dir").unwrap_err(),
            INVALID_SCHEME
        );
        assert_eq!(check_storage_path("/tmp/dir").unwrap_err(), INVALID_PATH);
        assert_eq!(check_storage_path("").unwrap_err(), NO_PATH_SPECIFIED);
    }

    #[test]
    fn no_bucket_name() {
        init_dummy_tracing_subscriber();

        assert_eq!(
            check_storage_path("s3://").unwrap_err(),
            NO_BUCKET_NAME_SPECIFIED
        );
    }

    #[test]
    fn parse_s3_url_with_no_key() {
        init_dummy_tracing_subscriber();

        let storage_path = parse_storage_path("s3://source-bucket").unwrap();
        assert_eq!(
            storage_path,
            StoragePath {
                bucket: "source-bucket".to_string(),
                prefix: "".to_string()
            }
        );

        let storage_path = parse_storage_path("s3://source-bucket/").unwrap();
        assert_eq!(storage_path.prefix, "");
    }

    #[test]
    fn parse_s3_url_with_prefix() {
        init_dummy_tracing_subscriber();

        let storage_path = parse_storage_path("s3://source-bucket/dir1/dir2/").unwrap();
        assert_eq!(storage_path.bucket, "source-bucket");
        assert_eq!(storage_path.prefix, "dir1/dir2/");

        let storage_path = parse_storage_path("s3://source-bucket/dir1/data").unwrap();
        assert_eq!(storage_path.prefix, "dir1/data");

        let storage_path = parse_storage_path("s3://source-bucket//dir1").unwrap();
        assert_eq!(storage_path.prefix, "/dir1");
    }

    #[test]
    fn parse_s3_url_with_utf8_key() {
        init_dummy_tracing_subscriber();

        let storage_path = parse_storage_path("s3://source-bucket/こんにちは/☃").unwrap();
        assert_eq!(storage_path.prefix, "こんにちは/☃");
    }

    fn init_dummy_tracing_subscriber() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("dummy=trace")
            .try_init();
    }
}
