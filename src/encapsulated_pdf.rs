//! Encapsulated PDF instances for radiology reports

use chrono::Local;
use dicom_core::VR;
use dicom_dictionary_std::tags;
use dimse::dictionary::{ENCAPSULATED_DOCUMENT_LENGTH, MIME_TYPE_OF_ENCAPSULATED_DOCUMENT};
use dimse::types::ENCAPSULATED_PDF_STORAGE;
use dimse::{generate_uid, Dataset, DimseError};
use serde::{Deserialize, Serialize};

pub const PDF_MIME_TYPE: &str = "application/pdf";
const DEFAULT_DOCUMENT_TITLE: &str = "Radiology Report";

/// Study and patient context of a report, plus optional overrides for the
/// generated identifiers and report timestamp.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportMetadata {
    #[serde(rename = "studyInstanceUID", alias = "studyInstanceUid")]
    pub study_instance_uid: String,
    pub patient_name: String,
    pub patient_id: String,
    pub study_date: String,
    pub accession_number: String,
    pub study_description: Option<String>,
    pub patient_birth_date: Option<String>,
    pub patient_sex: Option<String>,
    pub institution_name: Option<String>,
    /// Generated when absent
    #[serde(rename = "seriesInstanceUID", alias = "seriesInstanceUid")]
    pub series_instance_uid: Option<String>,
    /// Generated when absent
    #[serde(rename = "sopInstanceUID", alias = "sopInstanceUid")]
    pub sop_instance_uid: Option<String>,
    /// `YYYYMMDD`, defaults to today
    pub report_date: Option<String>,
    /// `HHMMSS`, defaults to now
    pub report_time: Option<String>,
    pub document_title: Option<String>,
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Build an Encapsulated PDF Storage instance wrapping `pdf`.
///
/// Type 2 attributes without a value are present and empty.
pub fn build_encapsulated_pdf(
    pdf: &[u8],
    metadata: &ReportMetadata,
    sop_instance_uid: &str,
) -> Result<Dataset, DimseError> {
    if pdf.is_empty() {
        return Err(DimseError::malformed("PDF document is empty"));
    }
    let document_length = u32::try_from(pdf.len())
        .map_err(|_| DimseError::malformed("PDF document exceeds 4 GiB"))?;

    let now = Local::now();
    let content_date = non_blank(&metadata.report_date)
        .map(str::to_string)
        .unwrap_or_else(|| now.format("%Y%m%d").to_string());
    let content_time = non_blank(&metadata.report_time)
        .map(str::to_string)
        .unwrap_or_else(|| now.format("%H%M%S").to_string());
    let series_instance_uid = non_blank(&metadata.series_instance_uid)
        .map(str::to_string)
        .unwrap_or_else(generate_uid);

    let mut ds = Dataset::new();
    ds.put_text(tags::SPECIFIC_CHARACTER_SET, "ISO_IR 192");
    ds.put_text(tags::SOP_CLASS_UID, ENCAPSULATED_PDF_STORAGE);
    ds.put_text(tags::SOP_INSTANCE_UID, sop_instance_uid);

    // Patient
    ds.put_text(tags::PATIENT_NAME, &metadata.patient_name);
    ds.put_text(tags::PATIENT_ID, &metadata.patient_id);
    ds.put_text(tags::PATIENT_BIRTH_DATE, non_blank(&metadata.patient_birth_date).unwrap_or_default());
    ds.put_text(tags::PATIENT_SEX, non_blank(&metadata.patient_sex).unwrap_or_default());

    // General study
    ds.put_text(tags::STUDY_INSTANCE_UID, &metadata.study_instance_uid);
    ds.put_text(tags::STUDY_DATE, &metadata.study_date);
    ds.put_empty(tags::STUDY_TIME);
    ds.put_empty(tags::REFERRING_PHYSICIAN_NAME);
    ds.put_empty(tags::STUDY_ID);
    ds.put_text(tags::ACCESSION_NUMBER, &metadata.accession_number);
    if let Some(description) = non_blank(&metadata.study_description) {
        ds.put_text(tags::STUDY_DESCRIPTION, description);
    }

    // Encapsulated document series and equipment
    ds.put_text(tags::MODALITY, "DOC");
    ds.put_text(tags::SERIES_INSTANCE_UID, &series_instance_uid);
    ds.put_text(tags::SERIES_NUMBER, "1");
    ds.put_text(tags::CONVERSION_TYPE, "WSD");
    ds.put_empty(tags::MANUFACTURER);
    if let Some(institution) = non_blank(&metadata.institution_name) {
        ds.put_text(tags::INSTITUTION_NAME, institution);
    }

    // Encapsulated document
    ds.put_text(tags::INSTANCE_NUMBER, "1");
    ds.put_text(tags::CONTENT_DATE, &content_date);
    ds.put_text(tags::CONTENT_TIME, &content_time);
    ds.put_text(tags::ACQUISITION_DATE_TIME, &format!("{}{}", content_date, content_time));
    ds.put_text(tags::BURNED_IN_ANNOTATION, "YES");
    ds.put_text(
        tags::DOCUMENT_TITLE,
        non_blank(&metadata.document_title).unwrap_or(DEFAULT_DOCUMENT_TITLE),
    );
    ds.put_sequence(tags::CONCEPT_NAME_CODE_SEQUENCE, Vec::new());
    ds.put_text(MIME_TYPE_OF_ENCAPSULATED_DOCUMENT, PDF_MIME_TYPE);
    ds.put_u32(ENCAPSULATED_DOCUMENT_LENGTH, document_length);
    ds.put_bytes(tags::ENCAPSULATED_DOCUMENT, VR::OB, pdf.to_vec());

    Ok(ds)
}
