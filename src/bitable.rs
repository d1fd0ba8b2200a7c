//! Client of the Lark (Feishu) Bitable open API: table creation and record batch creation.
use crate::config::LarkConfig;
use crate::record::RecordFields;
use crate::{err, Error};
use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::RequestBuilder;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use snafu::{OptionExt, ResultExt};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, warn};

pub const CREATE_TABLE: &str = "bitable.v1.app_table.create";
pub const BATCH_CREATE_RECORDS: &str = "bitable.v1.app_table_record.batch_create";
const TENANT_ACCESS_TOKEN: &str = "auth.v3.tenant_access_token.internal";

/// Tokens are refreshed this long before they expire.
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(300);

/// Response header carrying the server-side id of a request.
const LOG_ID_HEADER: &str = "x-tt-logid";

#[derive(Clone, Debug, Serialize)]
pub struct TableSpec {
    pub name: String,
    pub default_view_name: String,
    pub fields: Vec<FieldSpec>,
}

#[derive(Clone, Debug, Serialize)]
pub struct FieldSpec {
    pub field_name: String,
    #[serde(rename = "type")]
    pub field_type: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ui_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub property: Option<FieldProperty>,
}

#[derive(Clone, Debug, Serialize)]
pub struct FieldProperty {
    pub options: Vec<SelectOption>,
}

#[derive(Clone, Debug, Serialize)]
pub struct SelectOption {
    pub name: String,
    pub color: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct CreatedTable {
    pub table_id: String,
    pub default_view_id: String,
    #[serde(default)]
    pub field_id_list: Vec<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct CreatedRecords {
    #[serde(default)]
    pub records: Vec<CreatedRecord>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct CreatedRecord {
    #[serde(default)]
    pub record_id: String,
}

/// Envelope of every Bitable response. `code == 0` means success.
#[derive(Clone, Debug, Deserialize)]
pub struct ApiResponse<T> {
    pub code: i64,
    #[serde(default)]
    pub msg: String,
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            code: 0,
            msg: "success".to_string(),
            data: Some(data),
        }
    }

    pub fn failure<M: Into<String>>(code: i64, msg: M) -> Self {
        Self {
            code,
            msg: msg.into(),
            data: None,
        }
    }

    pub fn success(&self) -> bool {
        self.code == 0
    }

    /// The payload of a successful response. A failed response, or a successful one without
    /// payload, is an error.
    pub fn into_result(self, operation: &'static str) -> Result<T, Error> {
        if !self.success() {
            return Err(Error::Api {
                operation,
                code: self.code,
                msg: self.msg,
            });
        }
        self.data.context(err::MissingData { operation })
    }
}

/// The table operations the catalog writer relies on. Transport failures are `Err`; a
/// response the service did deliver, successful or not, is `Ok`.
#[async_trait]
pub trait TableService: Send + Sync {
    async fn create_table(
        &self,
        app_token: &str,
        table: &TableSpec,
    ) -> Result<ApiResponse<CreatedTable>, Error>;

    async fn batch_create_records(
        &self,
        app_token: &str,
        table_id: &str,
        records: &[RecordFields],
    ) -> Result<ApiResponse<CreatedRecords>, Error>;
}

#[derive(Serialize)]
struct CreateTableBody<'a> {
    table: &'a TableSpec,
}

#[derive(Serialize)]
struct BatchCreateBody<'a> {
    records: Vec<RecordBody<'a>>,
}

#[derive(Serialize)]
struct RecordBody<'a> {
    fields: &'a RecordFields,
}

#[derive(Deserialize)]
struct TenantTokenResponse {
    code: i64,
    #[serde(default)]
    msg: String,
    #[serde(default)]
    tenant_access_token: String,
    /// Seconds until expiry
    #[serde(default)]
    expire: u64,
}

struct CachedToken {
    token: String,
    refresh_at: Instant,
}

/// `TableService` over HTTPS, authenticating as an internal app with a tenant access token.
pub struct LarkClient {
    client: reqwest::Client,
    base_url: String,
    app_id: String,
    app_secret: String,
    token: Mutex<Option<CachedToken>>,
}

impl LarkClient {
    pub fn new(config: &LarkConfig) -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_s))
            .build()
            .context(err::Request {
                operation: "build http client",
            })?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            app_id: config.app_id.clone(),
            app_secret: config.app_secret.clone(),
            token: Mutex::new(None),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/open-apis/{}", self.base_url, path)
    }

    async fn tenant_access_token(&self) -> Result<String, Error> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.refresh_at {
                return Ok(token.token.clone());
            }
        }

        let response: TenantTokenResponse = decode(
            TENANT_ACCESS_TOKEN,
            self.client
                .post(self.url("auth/v3/tenant_access_token/internal"))
                .json(&serde_json::json!({
                    "app_id": self.app_id,
                    "app_secret": self.app_secret,
                })),
        )
        .await?;
        if response.code != 0 {
            return Err(Error::Api {
                operation: TENANT_ACCESS_TOKEN,
                code: response.code,
                msg: response.msg,
            });
        }
        debug!(expire = response.expire, "obtained tenant access token");
        let lifetime = Duration::from_secs(response.expire);
        *cached = Some(CachedToken {
            token: response.tenant_access_token.clone(),
            refresh_at: Instant::now() + lifetime.checked_sub(TOKEN_EXPIRY_MARGIN).unwrap_or_default(),
        });
        Ok(response.tenant_access_token)
    }
}

/// Send `request` and decode the JSON body. Bitable reports most failures with a JSON body and
/// a 4xx status, so the body is decoded regardless of the status; a body that is not JSON is
/// reported with its status.
async fn decode<T: DeserializeOwned>(
    operation: &'static str,
    request: RequestBuilder,
) -> Result<T, Error> {
    let response = request.send().await.context(err::Request { operation })?;
    let status = response.status();
    let log_id = log_id(response.headers()).unwrap_or_default().to_string();
    let body = response.bytes().await.context(err::Request { operation })?;
    if let Some((code, msg)) = api_failure(&body) {
        warn!(operation, code, msg = %msg, log_id = %log_id, "request failed");
    } else if !status.is_success() {
        warn!(operation, status = status.as_u16(), log_id = %log_id, "request failed");
    } else {
        debug!(operation, log_id = %log_id, "request succeeded");
    }
    match serde_json::from_slice(&body) {
        Ok(parsed) => Ok(parsed),
        Err(source) if status.is_success() => Err(Error::Decode { operation, source }),
        Err(_) => Err(Error::HttpStatus {
            operation,
            status: status.as_u16(),
            body: String::from_utf8_lossy(&body).into_owned(),
        }),
    }
}

fn log_id(headers: &HeaderMap) -> Option<&str> {
    headers.get(LOG_ID_HEADER).and_then(|value| value.to_str().ok())
}

/// `code` and `msg` of a JSON response envelope with a non-zero code.
fn api_failure(body: &[u8]) -> Option<(i64, String)> {
    #[derive(Deserialize)]
    struct Envelope {
        #[serde(default)]
        code: i64,
        #[serde(default)]
        msg: String,
    }
    serde_json::from_slice::<Envelope>(body)
        .ok()
        .filter(|envelope| envelope.code != 0)
        .map(|envelope| (envelope.code, envelope.msg))
}

#[async_trait]
impl TableService for LarkClient {
    async fn create_table(
        &self,
        app_token: &str,
        table: &TableSpec,
    ) -> Result<ApiResponse<CreatedTable>, Error> {
        let token = self.tenant_access_token().await?;
        decode(
            CREATE_TABLE,
            self.client
                .post(self.url(&format!("bitable/v1/apps/{}/tables", app_token)))
                .bearer_auth(token)
                .json(&CreateTableBody { table }),
        )
        .await
    }

    async fn batch_create_records(
        &self,
        app_token: &str,
        table_id: &str,
        records: &[RecordFields],
    ) -> Result<ApiResponse<CreatedRecords>, Error> {
        let token = self.tenant_access_token().await?;
        let body = BatchCreateBody {
            records: records.iter().map(|fields| RecordBody { fields }).collect(),
        };
        decode(
            BATCH_CREATE_RECORDS,
            self.client
                .post(self.url(&format!(
                    "bitable/v1/apps/{}/tables/{}/records/batch_create",
                    app_token, table_id
                )))
                .bearer_auth(token)
                .json(&body),
        )
        .await
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[test]
    fn failure_is_an_error() {
        let response: ApiResponse<CreatedTable> = serde_json::from_value(json!({
            "code": 1254002,
            "msg": "Fail",
        }))
        .unwrap();
        match response.into_result(CREATE_TABLE) {
            Err(Error::Api { code, msg, .. }) => {
                assert_eq!(code, 1254002);
                assert_eq!(msg, "Fail");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn success_without_data_is_an_error() {
        let response: ApiResponse<CreatedTable> =
            serde_json::from_value(json!({"code": 0, "msg": "success"})).unwrap();
        assert!(matches!(
            response.into_result(CREATE_TABLE),
            Err(Error::MissingData { .. })
        ));
    }

    #[test]
    fn created_table_decodes() {
        let response: ApiResponse<CreatedTable> = serde_json::from_value(json!({
            "code": 0,
            "msg": "success",
            "data": {
                "table_id": "tblDBTWrGdUYY6AP",
                "default_view_id": "vewq4Hf5jV",
                "field_id_list": ["fldWTo8xeH"]
            }
        }))
        .unwrap();
        let table = response.into_result(CREATE_TABLE).unwrap();
        assert_eq!(table.table_id, "tblDBTWrGdUYY6AP");
        assert_eq!(table.default_view_id, "vewq4Hf5jV");
    }

    #[test]
    fn batch_body_wraps_fields() {
        let mut fields = RecordFields::new();
        fields.insert("Task ID".into(), "Task_000001".into());
        let records = vec![fields];
        let body = BatchCreateBody {
            records: records.iter().map(|fields| RecordBody { fields }).collect(),
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            json!({"records": [{"fields": {"Task ID": "Task_000001"}}]})
        );
    }

    #[test]
    fn urls() {
        let client = LarkClient::new(&LarkConfig {
            base_url: "https://open.feishu.cn/".into(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(
            client.url("bitable/v1/apps/app/tables"),
            "https://open.feishu.cn/open-apis/bitable/v1/apps/app/tables"
        );
    }

    #[test]
    fn log_id_is_read_from_headers() {
        let mut headers = HeaderMap::new();
        assert_eq!(log_id(&headers), None);
        headers.insert(
            LOG_ID_HEADER,
            reqwest::header::HeaderValue::from_static("20240101120000ABCDEF"),
        );
        assert_eq!(log_id(&headers), Some("20240101120000ABCDEF"));
    }

    #[test]
    fn api_failure_from_envelope() {
        assert_eq!(
            api_failure(br#"{"code":1254002,"msg":"Fail","data":{}}"#),
            Some((1254002, "Fail".to_string()))
        );
        assert_eq!(api_failure(br#"{"code":0,"msg":"success"}"#), None);
        assert_eq!(api_failure(b"<html>bad gateway</html>"), None);
    }
}
