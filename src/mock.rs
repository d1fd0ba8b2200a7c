//! In-memory stand-ins for S3 and Bitable.
use crate::bitable::{
    ApiResponse, CreatedRecord, CreatedRecords, CreatedTable, TableService, TableSpec,
};
use crate::record::RecordFields;
use crate::*;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashSet;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Mutex as StdMutex,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PutCall {
    pub bucket: String,
    pub key: String,
    pub len: usize,
    pub content_type: String,
}

/// Object store that records every put, optionally after a delay, and fails keys it is told to.
#[derive(Clone, Default)]
pub struct StoreMock {
    pub puts: Arc<StdMutex<Vec<PutCall>>>,
    failing_keys: Arc<HashSet<String>>,
    /// Number of failures before a put succeeds, shared by all keys
    fail_first: Arc<AtomicUsize>,
    delay: Duration,
    in_flight: Arc<AtomicUsize>,
    pub max_in_flight: Arc<AtomicUsize>,
}

impl StoreMock {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
    pub fn failing<I: IntoIterator<Item = String>>(mut self, keys: I) -> Self {
        self.failing_keys = Arc::new(keys.into_iter().collect());
        self
    }
    pub fn fail_first(self, n: usize) -> Self {
        self.fail_first.store(n, Ordering::SeqCst);
        self
    }
    pub fn keys(&self) -> Vec<String> {
        self.puts
            .lock()
            .unwrap()
            .iter()
            .map(|put| put.key.clone())
            .collect()
    }
}

fn injected(msg: &str) -> Error {
    Error::AnyError {
        source: msg.to_string().into(),
    }
}

#[async_trait]
impl ObjectStore for StoreMock {
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        content_type: &str,
    ) -> Result<(), Error> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.failing_keys.contains(key) {
            return Err(injected("NoSuchBucket"));
        }
        let remaining = self.fail_first.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_first.store(remaining - 1, Ordering::SeqCst);
            return Err(injected("connection reset"));
        }
        self.puts.lock().unwrap().push(PutCall {
            bucket: bucket.to_string(),
            key: key.to_string(),
            len: body.len(),
            content_type: content_type.to_string(),
        });
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub struct InsertCall {
    pub table_id: String,
    pub records: Vec<RecordFields>,
}

/// Table service that hands out sequential table ids and records what it was asked to do.
#[derive(Default)]
pub struct TablesMock {
    pub created: StdMutex<Vec<TableSpec>>,
    pub inserts: StdMutex<Vec<InsertCall>>,
    /// 1-based index of the create call answered with an error code
    pub fail_create_at: Option<usize>,
    /// 1-based index of the insert call answered with an error code
    pub fail_insert_at: Option<usize>,
    /// Answer create calls with `code: 0` but no data
    pub create_without_data: bool,
}

impl TablesMock {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn table_names(&self) -> Vec<String> {
        self.created
            .lock()
            .unwrap()
            .iter()
            .map(|table| table.name.clone())
            .collect()
    }
    pub fn insert_sizes(&self) -> Vec<usize> {
        self.inserts
            .lock()
            .unwrap()
            .iter()
            .map(|insert| insert.records.len())
            .collect()
    }
}

#[async_trait]
impl TableService for TablesMock {
    async fn create_table(
        &self,
        _app_token: &str,
        table: &TableSpec,
    ) -> Result<ApiResponse<CreatedTable>, Error> {
        let mut created = self.created.lock().unwrap();
        created.push(table.clone());
        let n = created.len();
        if self.fail_create_at == Some(n) {
            return Ok(ApiResponse::failure(1254013, "TableNameDuplicated"));
        }
        if self.create_without_data {
            return Ok(ApiResponse {
                code: 0,
                msg: "success".into(),
                data: None,
            });
        }
        Ok(ApiResponse::ok(CreatedTable {
            table_id: format!("tbl{:04}", n),
            default_view_id: format!("vew{:04}", n),
            field_id_list: Vec::new(),
        }))
    }

    async fn batch_create_records(
        &self,
        _app_token: &str,
        table_id: &str,
        records: &[RecordFields],
    ) -> Result<ApiResponse<CreatedRecords>, Error> {
        let mut inserts = self.inserts.lock().unwrap();
        inserts.push(InsertCall {
            table_id: table_id.to_string(),
            records: records.to_vec(),
        });
        if self.fail_insert_at == Some(inserts.len()) {
            return Ok(ApiResponse::failure(1254104, "RecordAddOnceExceedLimit"));
        }
        Ok(ApiResponse::ok(CreatedRecords {
            records: (0..records.len())
                .map(|i| CreatedRecord {
                    record_id: format!("rec{}", i),
                })
                .collect(),
        }))
    }
}
