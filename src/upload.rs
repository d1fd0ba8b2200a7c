use super::*;
use crate::assets::enumerate_assets;
use crate::naming::{PublishConvention, PublishedUrl};
use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use bytes::Bytes;
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// The single storage operation the uploader needs.
///
/// Implementors are moved into the retried request closure, which must be `Unpin`.
#[async_trait]
pub trait ObjectStore: Clone + Send + Sync + Unpin + 'static {
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        content_type: &str,
    ) -> Result<(), Error>;
}

#[async_trait]
impl ObjectStore for aws_sdk_s3::Client {
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        content_type: &str,
    ) -> Result<(), Error> {
        let len = body.len();
        aws_sdk_s3::Client::put_object(self)
            .bucket(bucket)
            .key(key)
            .content_type(content_type)
            .content_length(len as i64)
            .body(ByteStream::from(body))
            .send()
            .await
            .context(err::PutObject { key })
            .map(drop)
    }
}

#[derive(Clone, Debug)]
pub enum UploadSource {
    File {
        path: PathBuf,
        destination_name: String,
    },
    Data {
        data: Bytes,
        destination_name: String,
    },
}
impl UploadSource {
    pub fn file(path: PathBuf, destination_name: String) -> Self {
        Self::File {
            path,
            destination_name,
        }
    }
    pub fn data<D: Into<Bytes>>(data: D, destination_name: String) -> Self {
        Self::Data {
            data: data.into(),
            destination_name,
        }
    }
    pub async fn load(&self) -> Result<Bytes, Error> {
        match self {
            Self::File { path, .. } => tokio::fs::read(path)
                .await
                .map(Bytes::from)
                .with_context(|| err::Io {
                    description: path.display().to_string(),
                }),
            Self::Data { data, .. } => Ok(data.clone()),
        }
    }
    /// Name of the local file, or the destination name for in-memory data.
    pub fn file_name(&self) -> String {
        match self {
            Self::File {
                path,
                destination_name,
            } => path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| destination_name.clone()),
            Self::Data {
                destination_name, ..
            } => destination_name.clone(),
        }
    }
    pub fn destination_name(&self) -> &str {
        match self {
            Self::File {
                destination_name, ..
            } => destination_name,
            Self::Data {
                destination_name, ..
            } => destination_name,
        }
    }
}

/// Outcome of one upload of [`Uploader::upload_files`].
#[derive(Debug)]
pub struct UploadOutcome {
    pub source: UploadSource,
    pub result: Result<PublishedUrl, Error>,
}

/// Upload sources for every asset in `dir`, in ascending numeric order, named after the
/// convention.
pub fn files_in_dir(dir: &Path, convention: &PublishConvention) -> Result<Vec<UploadSource>, Error> {
    Ok(enumerate_assets(dir)?
        .into_iter()
        .map(|asset| {
            let name = convention.destination_name(&asset.file_name);
            UploadSource::file(asset.path, name)
        })
        .collect())
}

#[derive(Clone)]
pub struct Uploader<S> {
    store: S,
    convention: PublishConvention,
    config: UploadConfig,
    timeout: Arc<Mutex<TimeoutState>>,
    cancel: CancellationToken,
}

impl<S: ObjectStore> Uploader<S> {
    pub fn new(store: S, convention: PublishConvention, config: UploadConfig) -> Self {
        Self {
            timeout: Arc::new(Mutex::new(TimeoutState::new(config.timing.clone()))),
            store,
            convention,
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Uploads that have not finished when `cancel` fires resolve to [`Error::Cancelled`].
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn convention(&self) -> &PublishConvention {
        &self.convention
    }

    /// Upload `content` as `destination_name` and return its public URL.
    ///
    /// The URL is derived from the naming convention and not read back from the store.
    pub async fn upload(&self, content: Bytes, destination_name: &str) -> Result<PublishedUrl, Error> {
        self.upload_with_report(content, destination_name)
            .await
            .map(|(_, url)| url)
    }

    async fn upload_with_report(
        &self,
        content: Bytes,
        destination_name: &str,
    ) -> Result<(RequestReport, PublishedUrl), Error> {
        let key = self.convention.object_key(destination_name);
        let size = content.len() as u64;
        let (store, bucket, content_type) = (
            self.store.clone(),
            self.convention.bucket.clone(),
            self.config.content_type.clone(),
        );
        let request = timed_request(
            {
                let key = key.clone();
                move || {
                    let (store, bucket, key, content_type, content) = (
                        store.clone(),
                        bucket.clone(),
                        key.clone(),
                        content_type.clone(),
                        content.clone(),
                    );
                    async move { store.put_object(&bucket, &key, content, &content_type).await }
                }
            },
            size,
            self.config.n_retries,
            Duration::from_millis(self.config.retry_delay_ms),
            self.timeout.clone(),
        );
        let report = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(Error::Cancelled),
            report = request => report?,
        };
        self.timeout.lock().await.update(&report);
        debug!(key = %key, bytes = size, attempts = report.attempts, "uploaded");
        Ok((report, self.convention.public_url(destination_name)))
    }

    async fn upload_source(&self, source: &UploadSource) -> Result<(RequestReport, PublishedUrl), Error> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let content = source.load().await?;
        self.upload_with_report(content, source.destination_name())
            .await
    }

    /// Upload many sources, at most `parallelism` at a time.
    ///
    /// A failed upload does not stop the others: every source gets an [`UploadOutcome`], and the
    /// outcomes are returned in the order of `sources` once all uploads have finished.
    ///
    /// `progress` is called after each successful upload with its [`RequestReport`]; `seq` counts
    /// successful uploads (0, 1, 2, ...) in completion order. Failures are logged and only show up
    /// in the returned outcomes.
    pub async fn upload_files<I, P, F>(&self, sources: I, progress: P) -> Vec<UploadOutcome>
    where
        I: IntoIterator<Item = UploadSource>,
        P: Fn(RequestReport) -> F + Clone,
        F: Future<Output = ()>,
    {
        let jobs = sources.into_iter().enumerate().map(|(index, source)| {
            let uploader = self.clone();
            async move {
                let result = uploader.upload_source(&source).await;
                (index, source, result)
            }
        });

        let mut succeeded = 0;
        let mut outcomes: Vec<(usize, UploadOutcome)> = stream::iter(jobs)
            .buffer_unordered(self.config.parallelism.max(1))
            .then(move |(index, source, result)| {
                let progress = progress.clone();
                let result = result.map(|(mut report, url)| {
                    report.seq = succeeded;
                    succeeded += 1;
                    (report, url)
                });
                async move {
                    let result = match result {
                        Ok((report, url)) => {
                            progress(report).await;
                            Ok(url)
                        }
                        Err(e) => {
                            warn!(name = source.destination_name(), error = %e, "upload failed");
                            Err(e)
                        }
                    };
                    (index, UploadOutcome { source, result })
                }
            })
            .collect()
            .await;
        outcomes.sort_by_key(|(index, _)| *index);
        outcomes.into_iter().map(|(_, outcome)| outcome).collect()
    }
}
