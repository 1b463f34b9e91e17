//! Study query parameters, study records and operation results

use std::collections::BTreeMap;

use dicom_core::Tag;
use dicom_dictionary_std::tags;
use dimse::{Dataset, QueryLevel, Value};
use serde::{Deserialize, Serialize};

use crate::format::{format_dicom_date, format_dicom_time, format_dicom_patient_name};

/// Study-level search criteria. Unset or blank criteria match everything.
///
/// Values use DICOM matching syntax: `*`/`?` wildcards, `YYYYMMDD-YYYYMMDD`
/// date ranges, `\`-separated value lists.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudyQueryParams {
    pub patient_name: Option<String>,
    pub patient_id: Option<String>,
    pub accession_number: Option<String>,
    pub study_date: Option<String>,
    pub modality: Option<String>,
    pub study_description: Option<String>,
    #[serde(rename = "studyInstanceUID", alias = "studyInstanceUid")]
    pub study_instance_uid: Option<String>,
    /// Stop after this many matches
    pub max_results: Option<usize>,
}

/// Attributes requested as return keys on every study query
const RETURN_KEYS: &[Tag] = &[
    tags::STUDY_TIME,
    tags::INSTITUTION_NAME,
    tags::REFERRING_PHYSICIAN_NAME,
    tags::PATIENT_BIRTH_DATE,
    tags::PATIENT_SEX,
    tags::NUMBER_OF_STUDY_RELATED_SERIES,
    tags::NUMBER_OF_STUDY_RELATED_INSTANCES,
];

/// Response attributes that describe the query rather than the study
const QUERY_ONLY_KEYS: &[Tag] = &[
    tags::QUERY_RETRIEVE_LEVEL,
    tags::SPECIFIC_CHARACTER_SET,
];

/// Attributes mapped onto [`DicomStudy`] fields
const STUDY_KEYS: &[Tag] = &[
    tags::STUDY_INSTANCE_UID,
    tags::STUDY_DATE,
    tags::STUDY_TIME,
    tags::ACCESSION_NUMBER,
    tags::MODALITIES_IN_STUDY,
    tags::PATIENT_NAME,
    tags::PATIENT_ID,
    tags::PATIENT_BIRTH_DATE,
    tags::PATIENT_SEX,
    tags::STUDY_DESCRIPTION,
    tags::INSTITUTION_NAME,
    tags::REFERRING_PHYSICIAN_NAME,
    tags::NUMBER_OF_STUDY_RELATED_SERIES,
    tags::NUMBER_OF_STUDY_RELATED_INSTANCES,
];

impl StudyQueryParams {
    /// Study Root identifier: criteria as matching keys, everything else
    /// as empty return keys.
    pub fn to_identifier(&self) -> Dataset {
        let mut identifier = Dataset::new();
        identifier.put_text(tags::QUERY_RETRIEVE_LEVEL, &QueryLevel::Study.to_string());

        let criteria = [
            (tags::STUDY_DATE, &self.study_date),
            (tags::ACCESSION_NUMBER, &self.accession_number),
            (tags::MODALITIES_IN_STUDY, &self.modality),
            (tags::STUDY_INSTANCE_UID, &self.study_instance_uid),
            (tags::PATIENT_NAME, &self.patient_name),
            (tags::PATIENT_ID, &self.patient_id),
            (tags::STUDY_DESCRIPTION, &self.study_description),
        ];
        for (tag, value) in criteria {
            identifier.put_text(tag, value.as_deref().map(str::trim).unwrap_or_default());
        }
        for &tag in RETURN_KEYS {
            identifier.put_empty(tag);
        }
        identifier
    }
}

/// One study as reported by the PACS, values as received
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DicomStudy {
    #[serde(rename = "studyInstanceUID")]
    pub study_instance_uid: String,
    pub study_date: String,
    pub study_time: Option<String>,
    pub accession_number: String,
    /// Modalities in study, `\`-separated when there are several
    pub modalities: String,
    pub patient_name: String,
    pub patient_id: String,
    pub patient_birth_date: Option<String>,
    pub patient_sex: Option<String>,
    pub study_description: String,
    pub institution_name: Option<String>,
    pub referring_physician_name: Option<String>,
    pub number_of_series: Option<u32>,
    pub number_of_study_related_instances: Option<u32>,
    /// Attributes without a field of their own, keyed `GGGGEEEE`
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extensions: BTreeMap<String, String>,
}

impl DicomStudy {
    /// Map a C-FIND response identifier. Missing or empty attributes become
    /// empty strings or `None`; nothing here fails.
    pub fn from_dataset(dataset: &Dataset) -> Self {
        let text = |tag: Tag| dataset.text(tag).map(|s| s.trim().to_string());
        let required = |tag: Tag| text(tag).unwrap_or_default();
        let optional = |tag: Tag| text(tag).filter(|s| !s.is_empty());
        let count = |tag: Tag| text(tag).and_then(|s| s.parse::<u32>().ok());

        let extensions = dataset
            .iter()
            .filter(|e| !STUDY_KEYS.contains(&e.tag) && !QUERY_ONLY_KEYS.contains(&e.tag))
            .filter_map(|e| {
                let value = extension_text(&e.value)?;
                Some((format!("{:04X}{:04X}", e.tag.group(), e.tag.element()), value))
            })
            .collect();

        Self {
            study_instance_uid: required(tags::STUDY_INSTANCE_UID),
            study_date: required(tags::STUDY_DATE),
            study_time: optional(tags::STUDY_TIME),
            accession_number: required(tags::ACCESSION_NUMBER),
            modalities: required(tags::MODALITIES_IN_STUDY),
            patient_name: required(tags::PATIENT_NAME),
            patient_id: required(tags::PATIENT_ID),
            patient_birth_date: optional(tags::PATIENT_BIRTH_DATE),
            patient_sex: optional(tags::PATIENT_SEX),
            study_description: required(tags::STUDY_DESCRIPTION),
            institution_name: optional(tags::INSTITUTION_NAME),
            referring_physician_name: optional(tags::REFERRING_PHYSICIAN_NAME),
            number_of_series: count(tags::NUMBER_OF_STUDY_RELATED_SERIES),
            number_of_study_related_instances: count(tags::NUMBER_OF_STUDY_RELATED_INSTANCES),
            extensions,
        }
    }

    /// Presentation form with formatted names, dates and times
    pub fn to_view(&self) -> StudyView {
        StudyView {
            id: self.study_instance_uid.clone(),
            study_instance_uid: self.study_instance_uid.clone(),
            patient_name: format_dicom_patient_name(&self.patient_name),
            patient_name_raw: self.patient_name.clone(),
            patient_id: self.patient_id.clone(),
            patient_birth_date: self.patient_birth_date.as_deref().map(format_dicom_date),
            patient_sex: self.patient_sex.clone(),
            study_date: format_dicom_date(&self.study_date),
            study_date_raw: self.study_date.clone(),
            study_time: self.study_time.as_deref().map(format_dicom_time),
            study_time_raw: self.study_time.clone(),
            modalities: self.modalities.clone(),
            study_description: self.study_description.clone(),
            accession_number: self.accession_number.clone(),
            number_of_series: self.number_of_series.unwrap_or(0),
            number_of_instances: self.number_of_study_related_instances.unwrap_or(0),
            institution_name: self.institution_name.clone(),
            referring_physician_name: self.referring_physician_name.as_deref().map(format_dicom_patient_name),
        }
    }
}

/// Textual rendering of an unmapped attribute. Binary values are kept only
/// when they are printable text, which is how unknown attributes arrive
/// under Implicit VR.
fn extension_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::Bytes(bytes) => {
            let text = std::str::from_utf8(bytes).ok()?;
            let text = text.trim_end_matches('\0');
            if text.chars().any(|c| c.is_control()) {
                return None;
            }
            text.to_string()
        }
        other => other.to_text()?,
    };
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

/// A study formatted for display
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudyView {
    pub id: String,
    #[serde(rename = "studyInstanceUID")]
    pub study_instance_uid: String,
    pub patient_name: String,
    pub patient_name_raw: String,
    pub patient_id: String,
    pub patient_birth_date: Option<String>,
    pub patient_sex: Option<String>,
    pub study_date: String,
    pub study_date_raw: String,
    pub study_time: Option<String>,
    pub study_time_raw: Option<String>,
    pub modalities: String,
    pub study_description: String,
    pub accession_number: String,
    pub number_of_series: u32,
    pub number_of_instances: u32,
    pub institution_name: Option<String>,
    pub referring_physician_name: Option<String>,
}

/// Outcome of a study query. Matches received before a failure are kept.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    pub success: bool,
    pub studies: Vec<DicomStudy>,
    pub total_results: usize,
    /// Whether matching was cut short by a cancel request
    #[serde(default)]
    pub cancelled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl QueryResult {
    pub fn completed(studies: Vec<DicomStudy>, cancelled: bool) -> Self {
        Self {
            success: true,
            total_results: studies.len(),
            studies,
            cancelled,
            error: None,
        }
    }

    pub fn failed(studies: Vec<DicomStudy>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            total_results: studies.len(),
            studies,
            cancelled: false,
            error: Some(error.into()),
        }
    }

    pub fn views(&self) -> Vec<StudyView> {
        self.studies.iter().map(DicomStudy::to_view).collect()
    }
}

/// Outcome of storing a report
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Present only when the PACS accepted the instance
    #[serde(rename = "sopInstanceUID", skip_serializing_if = "Option::is_none")]
    pub sop_instance_uid: Option<String>,
    /// C-STORE response status, when a response was received
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl StoreResult {
    pub fn stored(sop_instance_uid: impl Into<String>) -> Self {
        Self {
            success: true,
            error: None,
            sop_instance_uid: Some(sop_instance_uid.into()),
            status: Some(0x0000),
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            sop_instance_uid: None,
            status: None,
        }
    }
}

/// Result of a verification, with the settings it was made with
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStatus {
    pub success: bool,
    pub host: String,
    pub port: u16,
    pub local_ae_title: String,
    pub remote_ae_title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
