use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::operation::put_object::PutObjectError;
use snafu::{Backtrace, Snafu};
use std::io;

#[derive(Snafu, Debug)]
#[snafu(visibility = "pub")]
pub enum Error {
    #[snafu(display("Io error: {}: {}", description, source))]
    Io {
        source: io::Error,
        description: String,
        backtrace: Backtrace,
    },
    #[snafu(display("Listing directory: {}", source))]
    WalkDir { source: walkdir::Error },
    #[snafu(display("Request timed out"))]
    Timeout {
        source: tokio::time::error::Elapsed,
    },
    #[snafu(display("Upload cancelled"))]
    Cancelled,
    AnyError {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    // Local files
    #[snafu(display(
        "File name '{}' has no numeric suffix (expected '<name>_<number>.<ext>' or '<number>.<ext>')",
        file_name
    ))]
    MalformedFileName { file_name: String },
    #[snafu(display("Task id '{}' occurs more than once in {}", task_id, dir))]
    DuplicateTaskId { task_id: String, dir: String },

    #[snafu(display("Upload manifest {}: {}", path, source))]
    Manifest {
        path: String,
        source: serde_json::Error,
    },
    #[snafu(display(
        "No upload manifest in {}; run `upload` first or pass --assume-uploaded",
        dir
    ))]
    MissingManifest { dir: String },

    // Object storage
    #[snafu(display("S3 'put object' error on key '{}': {}", key, source))]
    PutObject {
        source: SdkError<PutObjectError>,
        key: String,
        backtrace: Backtrace,
    },

    // Table service
    #[snafu(display("{}: request failed: {}", operation, source))]
    Request {
        operation: &'static str,
        source: reqwest::Error,
    },
    #[snafu(display("{}: HTTP {}: {}", operation, status, body))]
    HttpStatus {
        operation: &'static str,
        status: u16,
        body: String,
    },
    #[snafu(display("{}: invalid response body: {}", operation, source))]
    Decode {
        operation: &'static str,
        source: serde_json::Error,
    },
    #[snafu(display("{} failed, code: {}, msg: {}", operation, code, msg))]
    Api {
        operation: &'static str,
        code: i64,
        msg: String,
    },
    #[snafu(display("{} reported success without response data", operation))]
    MissingData { operation: &'static str },
    #[snafu(display("Refusing to create table '{}' for an empty batch", table_name))]
    EmptyBatch { table_name: String },
    #[snafu(display("Batch {} (table '{}'): {}", seq, table_name, source))]
    Batch {
        seq: usize,
        table_name: String,
        #[snafu(source(from(Error, Box::new)))]
        source: Box<Error>,
    },

    // Records
    #[snafu(display("Encoding input payload of task '{}': {}", task_id, source))]
    EncodePayload {
        task_id: String,
        source: serde_json::Error,
    },

    // Configuration
    #[snafu(display("Loading configuration: {}", source))]
    Config { source: config::ConfigError },
    #[snafu(display("Invalid configuration: {}", message))]
    InvalidConfig { message: String },
}

impl<T> From<SdkError<T>> for Error
where
    T: std::error::Error + Send + Sync + 'static,
{
    fn from(err: SdkError<T>) -> Self {
        Self::AnyError {
            source: Box::new(err),
        }
    }
}
