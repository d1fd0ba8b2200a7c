//! # Label catalog
//! Publish images for crowd-sourced labeling and keep their bookkeeping in Bitable tables.
//!
//! - Upload a directory of images to S3 with [`Uploader::upload_files`]; every image gets a
//! public URL derived from the [`PublishConvention`].
//! - Register the uploaded images with [`CatalogWriter::process`], which creates one table per
//! batch of records and fills it with a single batch insert. Only images the [`UploadManifest`]
//! lists as uploaded are registered.

use crate::timeout::*;
use futures::{
    future::{Future, TryFutureExt},
    prelude::*,
    stream,
};
use futures_retry::{FutureRetry, RetryPolicy};
use futures_stopwatch::try_stopwatch;
use snafu::futures::TryFutureExt as S;
use snafu::ResultExt;
use std::{marker::Unpin, path::PathBuf, sync::Arc, time::Duration};
use tokio::sync::Mutex;

pub mod assets;
pub mod bitable;
mod catalog;
mod config;
pub mod err;
pub mod manifest;
pub mod naming;
pub mod record;
pub mod schema;
pub mod timeout;
mod upload;

pub use catalog::*;
pub use self::config::*;
pub use err::Error;
pub use manifest::UploadManifest;
pub use naming::{PublishConvention, PublishedUrl};
pub use upload::*;

#[cfg(test)]
mod mock;

/// Result of a single storage request.
#[derive(Debug, Clone, Copy)]
pub struct RequestReport {
    /// The number of this request in a series of multiple requests (0 if not applicable)
    pub seq: usize,
    /// Size of request in bytes
    pub size: u64,
    /// The total time including all retries
    pub total_time: Duration,
    /// The time of the successful request
    pub success_time: Duration,
    /// Number of attempts. A value of `1` means no retries - success on first attempt.
    pub attempts: usize,
    /// Estimated sec/byte that was used to set the timeout of this request.
    pub est: f64,
}

/// Run a request of `size` bytes under a timeout, retrying it up to `n_retries` times, and time
/// it.
///
/// `request_factory` is called once per attempt. The timeout of each attempt comes from
/// `timeout`, which sees the attempt number so it can back off.
pub(crate) async fn timed_request<F, G, T>(
    request_factory: F,
    size: u64,
    n_retries: usize,
    retry_delay: Duration,
    timeout: Arc<Mutex<T>>,
) -> Result<RequestReport, Error>
where
    F: Fn() -> G + Unpin + Clone + Send + Sync + 'static,
    G: Future<Output = Result<(), Error>> + Send,
    T: Timeout,
{
    let mut attempts1 = 0;
    let mut attempts2 = 0;
    try_stopwatch(
        // Time the request across all retries
        FutureRetry::new(
            move || {
                let request_factory = request_factory.clone();
                let timeout = timeout.clone();
                attempts1 += 1;
                let attempt = attempts1;
                async move {
                    let (est, timeout_value) = {
                        let t = timeout.lock().await;
                        (t.get_estimate(), t.get_timeout(size, attempt))
                    };
                    try_stopwatch(
                        tokio::time::timeout(timeout_value, request_factory())
                            .with_context(|| err::Timeout {})
                            .map(|result| result.and_then(|x| x)), // flatten the Result<Result<(), err>, timeout err>
                    )
                    .map_ok(move |((), success_time)| (success_time, est))
                    .await
                }
            },
            move |e| {
                attempts2 += 1;
                if attempts2 > n_retries {
                    RetryPolicy::ForwardError(e)
                } else {
                    RetryPolicy::WaitRetry(retry_delay)
                }
            },
        ),
    )
    .await
    .map(move |(((success_time, est), attempts), total_time)| RequestReport {
        seq: 0,
        size,
        total_time,
        success_time,
        attempts,
        est,
    })
    .map_err(|(err, _attempts)| err)
}
