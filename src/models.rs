//! Records we store and return.
//!
//! These serialize using `camelCase` field names, which is what our REST
//! clients expect.

use chrono::{DateTime, Utc};
use reqwest::Url;
use schemars::JsonSchema;
use uuid::Uuid;

use crate::{
    prelude::*,
    validation::{Validate, ValidationErrors},
};

/// Maximum length of a resource title, in characters.
pub const MAX_TITLE_LEN: usize = 255;

/// A request to create a resource from an uploaded PDF.
#[derive(Clone, Debug, Deserialize, JsonSchema, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CreateResourceRequest {
    /// The S3 URL of the uploaded PDF.
    pub file_url: String,

    /// A title for the resource.
    pub title: String,
}

impl Validate for CreateResourceRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::default();
        if self.file_url.is_empty() {
            errors.add("fileUrl", "File URL is required.");
        } else {
            errors.check(
                Url::parse(&self.file_url).is_err(),
                "fileUrl",
                "File URL must be a valid URI.",
            );
        }
        let title = self.title.trim();
        if title.is_empty() {
            errors.add("title", "Title is required.");
        } else {
            errors.check(
                title.chars().count() > MAX_TITLE_LEN,
                "title",
                format!("Title cannot exceed {MAX_TITLE_LEN} characters."),
            );
        }
        errors.into_result()
    }
}

/// A PDF which has been uploaded and OCRed.
#[derive(Clone, Debug, Deserialize, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    /// Unique ID.
    pub id: Uuid,

    /// Title, with surrounding whitespace removed.
    pub title: String,

    /// Where the source PDF lives.
    pub file_url: String,

    /// The owner of this resource.
    pub user_id: String,

    /// The extracted text.
    pub content: ResourceContent,

    /// When this record was created.
    pub created_at: DateTime<Utc>,

    /// When this record was last modified.
    pub updated_at: DateTime<Utc>,
}

impl Resource {
    /// Create a new resource from the pages of text extracted from `file_url`.
    pub fn new(user_id: &str, request: &CreateResourceRequest, pages: Vec<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            title: request.title.trim().to_owned(),
            file_url: request.file_url.trim().to_owned(),
            user_id: user_id.to_owned(),
            content: ResourceContent {
                total_pages: pages.len(),
                pages,
                extracted_at: now,
            },
            created_at: now,
            updated_at: now,
        }
    }

    /// A summary of this resource, without the page text.
    pub fn summary(&self) -> ResourceSummary {
        ResourceSummary {
            id: self.id,
            title: self.title.clone(),
            file_url: self.file_url.clone(),
            user_id: self.user_id.clone(),
            content: ResourceSummaryContent {
                total_pages: self.content.total_pages,
                extracted_at: self.content.extracted_at,
            },
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    /// All the page text, separated by blank lines.
    pub fn full_text(&self) -> String {
        self.content.pages.join("\n\n")
    }
}

/// The OCRed content of a [`Resource`].
#[derive(Clone, Debug, Deserialize, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceContent {
    /// Text for each page, in page order.
    pub pages: Vec<String>,

    /// Number of pages.
    pub total_pages: usize,

    /// When the text was extracted.
    pub extracted_at: DateTime<Utc>,
}

/// A [`Resource`] without its page text, for listings.
#[derive(Clone, Debug, Deserialize, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSummary {
    pub id: Uuid,
    pub title: String,
    pub file_url: String,
    pub user_id: String,
    pub content: ResourceSummaryContent,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Summary of a [`ResourceContent`].
#[derive(Clone, Debug, Deserialize, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSummaryContent {
    pub total_pages: usize,
    pub extracted_at: DateTime<Utc>,
}

/// A multiple-choice question.
#[derive(Clone, Debug, Deserialize, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Mcq {
    /// The question.
    pub question: String,

    /// The possible answers. At least two.
    pub options: Vec<String>,

    /// The correct answer.
    pub answer: String,
}

impl Mcq {
    /// Check this question, recording problems under `prefix`.
    fn validate_into(&self, prefix: &str, errors: &mut ValidationErrors) {
        errors.check(
            self.question.trim().is_empty(),
            format!("{prefix}.question"),
            "Question is required",
        );
        errors.check(
            self.options.len() < 2,
            format!("{prefix}.options"),
            "At least two options required",
        );
        errors.check(
            self.answer.trim().is_empty(),
            format!("{prefix}.answer"),
            "Answer is required",
        );
    }

    /// Remove surrounding whitespace.
    fn trimmed(self) -> Self {
        Self {
            question: self.question.trim().to_owned(),
            options: self.options,
            answer: self.answer.trim().to_owned(),
        }
    }
}

/// Check a list of questions, recording problems under `field`.
pub(crate) fn validate_mcqs(field: &str, mcqs: &[Mcq], errors: &mut ValidationErrors) {
    errors.check(mcqs.is_empty(), field, "At least one MCQ required");
    for (idx, mcq) in mcqs.iter().enumerate() {
        mcq.validate_into(&format!("{field}[{idx}]"), errors);
    }
}

/// A quiz generated from a resource.
#[derive(Clone, Debug, Deserialize, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Quiz {
    pub id: Uuid,
    pub user_id: String,
    pub resource_id: Uuid,
    pub mcqs: Vec<Mcq>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Quiz {
    /// Create a quiz for `resource`, trimming each question and answer.
    pub fn new(resource: &Resource, mcqs: Vec<Mcq>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id: resource.user_id.clone(),
            resource_id: resource.id,
            mcqs: mcqs.into_iter().map(Mcq::trimmed).collect(),
            created_at: now,
            updated_at: now,
        }
    }
}

impl Validate for Quiz {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::default();
        errors.check(self.user_id.is_empty(), "userId", "User ID is required");
        validate_mcqs("mcqs", &self.mcqs, &mut errors);
        errors.into_result()
    }
}

/// Study notes generated from a resource.
#[derive(Clone, Debug, Deserialize, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: Uuid,
    pub user_id: String,
    pub resource_id: Uuid,
    pub modules: Vec<NoteModule>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Note {
    /// Create notes for `resource`.
    pub fn new(resource: &Resource, modules: Vec<NoteModule>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id: resource.user_id.clone(),
            resource_id: resource.id,
            modules,
            created_at: now,
            updated_at: now,
        }
    }
}

impl Validate for Note {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::default();
        errors.check(self.user_id.is_empty(), "userId", "User ID is required");
        validate_note_modules("modules", &self.modules, &mut errors);
        errors.into_result()
    }
}

/// A top-level section of a [`Note`].
#[derive(Clone, Debug, Deserialize, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NoteModule {
    /// Section title.
    pub title: String,

    /// A short summary of the section.
    pub overview: String,

    /// Subsections.
    pub submodules: Vec<NoteSubmodule>,
}

/// A subsection of a [`NoteModule`].
#[derive(Clone, Debug, Deserialize, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NoteSubmodule {
    /// Subsection title.
    pub subtitle: String,

    /// Key points, one sentence each.
    pub points: Vec<String>,

    /// Images illustrating this subsection. Usually empty.
    pub image_urls: Vec<String>,
}

/// Check a list of note modules, recording problems under `field`.
pub(crate) fn validate_note_modules(
    field: &str,
    modules: &[NoteModule],
    errors: &mut ValidationErrors,
) {
    errors.check(modules.is_empty(), field, "At least one module required");
    for (idx, module) in modules.iter().enumerate() {
        let prefix = format!("{field}[{idx}]");
        errors.check(
            module.title.trim().is_empty(),
            format!("{prefix}.title"),
            "Title is required",
        );
        errors.check(
            module.overview.trim().is_empty(),
            format!("{prefix}.overview"),
            "Overview is required",
        );
        for (sub_idx, submodule) in module.submodules.iter().enumerate() {
            let sub_prefix = format!("{prefix}.submodules[{sub_idx}]");
            errors.check(
                submodule.subtitle.trim().is_empty(),
                format!("{sub_prefix}.subtitle"),
                "Subtitle is required",
            );
            for (point_idx, point) in submodule.points.iter().enumerate() {
                errors.check(
                    point.trim().is_empty(),
                    format!("{sub_prefix}.points[{point_idx}]"),
                    "Points must not be empty",
                );
            }
        }
    }
}
