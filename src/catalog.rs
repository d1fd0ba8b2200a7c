use crate::assets;
use crate::bitable::{CreatedTable, TableService, BATCH_CREATE_RECORDS, CREATE_TABLE};
use crate::manifest::UploadManifest;
use crate::naming::PublishConvention;
use crate::record::CatalogRecord;
use crate::schema::catalog_table;
use crate::{err, CatalogConfig, Error, UploadOutcome};
use snafu::{ensure, ResultExt};
use std::path::Path;
use tracing::{error, info, warn};

/// Name of the table holding batch number `seq` (starting at 1).
pub fn batch_table_name(prefix: &str, seq: usize, width: usize) -> String {
    format!("{}{:0width$}", prefix, seq, width = width)
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BatchReport {
    pub seq: usize,
    pub table_name: String,
    pub table: CreatedTable,
    pub records: usize,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProcessReport {
    pub batches: Vec<BatchReport>,
    /// Files left out because they were not uploaded
    pub skipped: Vec<String>,
}

impl ProcessReport {
    pub fn records(&self) -> usize {
        self.batches.iter().map(|b| b.records).sum()
    }
}

/// Registers uploaded images as records in freshly created tables, one table per batch.
pub struct CatalogWriter<T> {
    service: T,
    app_token: String,
    convention: PublishConvention,
    config: CatalogConfig,
}

impl<T: TableService> CatalogWriter<T> {
    pub fn new(
        service: T,
        app_token: String,
        convention: PublishConvention,
        config: CatalogConfig,
    ) -> Self {
        Self {
            service,
            app_token,
            convention,
            config,
        }
    }

    pub fn service(&self) -> &T {
        &self.service
    }

    /// Create an empty catalog table called `name`.
    pub async fn create_table(&self, name: &str) -> Result<CreatedTable, Error> {
        let spec = catalog_table(name, &self.config.default_view_name);
        let response = self.service.create_table(&self.app_token, &spec).await?;
        if !response.success() {
            error!(
                table = name,
                code = response.code,
                msg = %response.msg,
                "{} failed",
                CREATE_TABLE
            );
        }
        let table = response.into_result(CREATE_TABLE)?;
        info!(
            table = name,
            table_id = %table.table_id,
            view_id = %table.default_view_id,
            "created table"
        );
        Ok(table)
    }

    /// Create table `table_name` and insert all `records` into it with one request.
    pub async fn write_batch(
        &self,
        records: &[CatalogRecord],
        table_name: &str,
    ) -> Result<CreatedTable, Error> {
        ensure!(
            !records.is_empty(),
            err::EmptyBatch {
                table_name: table_name.to_string()
            }
        );
        let fields = records
            .iter()
            .map(CatalogRecord::fields)
            .collect::<Result<Vec<_>, _>>()?;

        let table = self.create_table(table_name).await?;
        let response = self
            .service
            .batch_create_records(&self.app_token, &table.table_id, &fields)
            .await?;
        if !response.success() {
            error!(
                table = table_name,
                code = response.code,
                msg = %response.msg,
                "{} failed",
                BATCH_CREATE_RECORDS
            );
        }
        let created = response.into_result(BATCH_CREATE_RECORDS)?;
        info!(
            table = table_name,
            records = records.len(),
            created = created.records.len(),
            "inserted records"
        );
        Ok(table)
    }

    /// Records for the assets in `dir`, in ascending numeric order.
    ///
    /// The directory is listed and checked up front; records are built as the iterator is
    /// consumed, with the image URL the uploader published the file under.
    pub fn enumerate_assets(
        &self,
        dir: &Path,
    ) -> Result<impl Iterator<Item = CatalogRecord> + '_, Error> {
        let assets = assets::enumerate_assets(dir)?;
        Ok(assets.into_iter().map(move |asset| {
            let url = self.convention.url_for_file(&asset.file_name);
            CatalogRecord::new(asset.task_id, &url)
        }))
    }

    /// Catalog every uploaded asset in `dir`, `batch_size` records per table.
    ///
    /// When `dir` holds an [`UploadManifest`], only the files it lists as uploaded are cataloged,
    /// under the URL it lists; the others end up in [`ProcessReport::skipped`]. Without a
    /// manifest every file is taken to be uploaded under the naming convention.
    ///
    /// Batches are written one after the other; the first failing batch stops the run. A
    /// directory with nothing to catalog creates no table.
    pub async fn process(&self, dir: &Path) -> Result<ProcessReport, Error> {
        let manifest = UploadManifest::read(dir).await?;
        if manifest.is_none() {
            warn!(dir = %dir.display(), "no upload manifest, assuming every file was uploaded");
        }
        self.process_assets(dir, manifest.as_ref()).await
    }

    /// Catalog the assets in `dir` that `manifest` lists as uploaded, or all of them when there
    /// is no manifest.
    pub async fn process_assets(
        &self,
        dir: &Path,
        manifest: Option<&UploadManifest>,
    ) -> Result<ProcessReport, Error> {
        let mut records = Vec::new();
        let mut skipped = Vec::new();
        for asset in assets::enumerate_assets(dir)? {
            let url = match manifest {
                Some(manifest) => match manifest.url_for(&asset.file_name) {
                    Some(url) => url.clone(),
                    None => {
                        warn!(file = %asset.file_name, "not uploaded, leaving it out of the catalog");
                        skipped.push(asset.file_name);
                        continue;
                    }
                },
                None => self.convention.url_for_file(&asset.file_name),
            };
            records.push(CatalogRecord::new(asset.task_id, &url));
        }
        self.write_batches(records, skipped).await
    }

    /// Catalog the successful uploads among `outcomes`, in their order. Failed uploads are left
    /// out and listed in [`ProcessReport::skipped`].
    pub async fn process_outcomes(
        &self,
        outcomes: &[UploadOutcome],
    ) -> Result<ProcessReport, Error> {
        let mut records = Vec::new();
        let mut skipped = Vec::new();
        for outcome in outcomes {
            let file_name = outcome.source.file_name();
            match &outcome.result {
                Ok(url) => {
                    let task_id = assets::task_id(&file_name).to_string();
                    records.push(CatalogRecord::new(task_id, url));
                }
                Err(e) => {
                    warn!(file = %file_name, error = %e, "upload failed, leaving it out of the catalog");
                    skipped.push(file_name);
                }
            }
        }
        self.write_batches(records, skipped).await
    }

    async fn write_batches(
        &self,
        records: Vec<CatalogRecord>,
        skipped: Vec<String>,
    ) -> Result<ProcessReport, Error> {
        let batch_size = self.config.batch_size.max(1);
        let mut report = ProcessReport {
            batches: Vec::new(),
            skipped,
        };
        for (i, batch) in records.chunks(batch_size).enumerate() {
            let seq = i + 1;
            let table_name =
                batch_table_name(&self.config.table_prefix, seq, self.config.sequence_width);
            let table = match self.write_batch(batch, &table_name).await {
                Ok(table) => table,
                Err(e) => {
                    error!(
                        table = %table_name,
                        written = report.batches.len(),
                        "batch failed, stopping"
                    );
                    return Err(e).context(err::Batch { seq, table_name });
                }
            };
            report.batches.push(BatchReport {
                seq,
                table_name,
                table,
                records: batch.len(),
            });
        }
        info!(
            tables = report.batches.len(),
            records = report.records(),
            skipped = report.skipped.len(),
            "catalog complete"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn table_names() {
        assert_eq!(batch_table_name("v1-table-", 1, 3), "v1-table-001");
        assert_eq!(batch_table_name("v1-table-", 12, 3), "v1-table-012");
        assert_eq!(batch_table_name("v1-table-", 1234, 3), "v1-table-1234");
        assert_eq!(batch_table_name("t", 7, 0), "t7");
    }
}
