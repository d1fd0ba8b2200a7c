//! Rows written to the catalog tables.
use crate::naming::PublishedUrl;
use crate::schema::columns;
use crate::{err, Error};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use snafu::ResultExt;

/// Fields of one record in a batch-create request, keyed by column name.
pub type RecordFields = Map<String, Value>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageCategory {
    #[serde(rename = "answer-only")]
    AnswerOnly,
    #[serde(rename = "question-and-answer")]
    QuestionAndAnswer,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterStatus {
    #[serde(rename = "filtered")]
    Filtered,
    #[serde(rename = "not-filtered")]
    NotFiltered,
}

/// Annotators move a record through `NotStarted -> InProgress -> Done` in the table UI.
/// Records are only ever written here as `NotStarted`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LabelingStatus {
    #[serde(rename = "in-progress")]
    InProgress,
    #[serde(rename = "done")]
    Done,
    #[serde(rename = "not-started")]
    NotStarted,
}

impl ImageCategory {
    pub const ALL: [ImageCategory; 2] = [ImageCategory::AnswerOnly, ImageCategory::QuestionAndAnswer];
    pub fn label(self) -> &'static str {
        match self {
            ImageCategory::AnswerOnly => "answer-only",
            ImageCategory::QuestionAndAnswer => "question-and-answer",
        }
    }
}

impl FilterStatus {
    pub const ALL: [FilterStatus; 2] = [FilterStatus::Filtered, FilterStatus::NotFiltered];
    pub fn label(self) -> &'static str {
        match self {
            FilterStatus::Filtered => "filtered",
            FilterStatus::NotFiltered => "not-filtered",
        }
    }
}

impl LabelingStatus {
    pub const ALL: [LabelingStatus; 3] = [
        LabelingStatus::InProgress,
        LabelingStatus::Done,
        LabelingStatus::NotStarted,
    ];
    pub fn label(self) -> &'static str {
        match self {
            LabelingStatus::InProgress => "in-progress",
            LabelingStatus::Done => "done",
            LabelingStatus::NotStarted => "not-started",
        }
    }
}

/// A point placed by an annotator on the image.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LabelPoint {
    pub id: u64,
    pub x: f64,
    pub y: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// What the labeling front-end loads for a task.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InputPayload {
    pub task_id: String,
    pub image_url: String,
    #[serde(default)]
    pub label_info: Vec<LabelPoint>,
}

impl InputPayload {
    /// JSON with four-space indentation, non-ASCII characters left unescaped.
    pub fn to_json(&self) -> Result<String, Error> {
        let mut out = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut ser = serde_json::Serializer::with_formatter(&mut out, formatter);
        self.serialize(&mut ser).context(err::EncodePayload {
            task_id: self.task_id.clone(),
        })?;
        // serde_json only writes valid UTF-8
        Ok(String::from_utf8_lossy(&out).into_owned())
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct CatalogRecord {
    pub task_id: String,
    pub image_category: Option<ImageCategory>,
    pub filter_status: FilterStatus,
    pub labeling_status: LabelingStatus,
    pub input: InputPayload,
    pub output: String,
}

impl CatalogRecord {
    /// Fresh record for an uploaded image: uncategorized, not filtered, not started.
    pub fn new(task_id: String, image_url: &PublishedUrl) -> Self {
        Self {
            input: InputPayload {
                task_id: task_id.clone(),
                image_url: image_url.to_string(),
                label_info: Vec::new(),
            },
            task_id,
            image_category: None,
            filter_status: FilterStatus::NotFiltered,
            labeling_status: LabelingStatus::NotStarted,
            output: String::new(),
        }
    }

    /// Field map of the batch-create request. The modifier and update time columns are
    /// maintained by the table service and never written.
    pub fn fields(&self) -> Result<RecordFields, Error> {
        let mut fields = Map::new();
        fields.insert(columns::TASK_ID.into(), self.task_id.clone().into());
        fields.insert(
            columns::IMAGE_CATEGORY.into(),
            self.image_category.map_or("", ImageCategory::label).into(),
        );
        fields.insert(
            columns::FILTER_STATUS.into(),
            self.filter_status.label().into(),
        );
        fields.insert(
            columns::LABELING_STATUS.into(),
            self.labeling_status.label().into(),
        );
        fields.insert(columns::INPUT_JSON.into(), self.input.to_json()?.into());
        fields.insert(columns::OUTPUT_JSON.into(), self.output.clone().into());
        Ok(fields)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::naming::PublishConvention;

    fn record() -> CatalogRecord {
        let url = PublishConvention::new("algo-public", "feishu").url_for_file("Task_000001.jpg");
        CatalogRecord::new("Task_000001".into(), &url)
    }

    #[test]
    fn input_payload_round_trip() {
        let record = record();
        let json = record.input.to_json().unwrap();
        let parsed = InputPayload::from_json(&json).unwrap();
        assert_eq!(parsed.task_id, "Task_000001");
        assert_eq!(
            parsed.image_url,
            "https://algo-public.s3.cn-north-1.amazonaws.com.cn/feishu/Task_000001.jpg"
        );
        assert!(parsed.label_info.is_empty());
        assert!(json.contains("\n    \"task_id\""));
    }

    #[test]
    fn non_ascii_is_not_escaped() {
        let payload = InputPayload {
            task_id: "电路图_1".into(),
            image_url: "https://example.com/电路图_1.jpg".into(),
            label_info: vec![],
        };
        assert!(payload.to_json().unwrap().contains("电路图_1"));
    }

    #[test]
    fn fresh_record_fields() {
        let fields = record().fields().unwrap();
        assert_eq!(fields.len(), 6);
        assert_eq!(fields[columns::TASK_ID], "Task_000001");
        assert_eq!(fields[columns::IMAGE_CATEGORY], "");
        assert_eq!(fields[columns::FILTER_STATUS], "not-filtered");
        assert_eq!(fields[columns::LABELING_STATUS], "not-started");
        assert_eq!(fields[columns::OUTPUT_JSON], "");
        assert!(!fields.contains_key(columns::MODIFIER));
    }

    #[test]
    fn labels_match_serde_names() {
        for status in LabelingStatus::ALL.iter() {
            assert_eq!(
                serde_json::to_value(status).unwrap(),
                Value::from(status.label())
            );
        }
        for category in ImageCategory::ALL.iter() {
            assert_eq!(
                serde_json::to_value(category).unwrap(),
                Value::from(category.label())
            );
        }
        for status in FilterStatus::ALL.iter() {
            assert_eq!(
                serde_json::to_value(status).unwrap(),
                Value::from(status.label())
            );
        }
    }

    #[test]
    fn label_points_decode() {
        let parsed = InputPayload::from_json(
            r#"{"task_id": "t", "image_url": "u", "label_info": [{"id": 1, "x": 0.5, "y": 2.0, "label": "R1"}, {"id": 2, "x": 1.0, "y": 1.0}]}"#,
        )
        .unwrap();
        assert_eq!(parsed.label_info.len(), 2);
        assert_eq!(parsed.label_info[0].label.as_deref(), Some("R1"));
        assert_eq!(parsed.label_info[1].label, None);
    }
}
