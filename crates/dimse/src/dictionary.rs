//! Minimal attribute dictionary
//!
//! Implicit VR transfer syntaxes do not carry the value representation on
//! the wire, so the decoder infers it from this table. Only the attributes
//! this client builds or reads are listed; anything else decodes as `UN`.

use dicom_core::{Tag, VR};
use dicom_dictionary_std::tags;

/// MIME Type of Encapsulated Document
pub const MIME_TYPE_OF_ENCAPSULATED_DOCUMENT: Tag = Tag(0x0042, 0x0012);
/// Encapsulated Document Length
pub const ENCAPSULATED_DOCUMENT_LENGTH: Tag = Tag(0x0042, 0x0015);
/// Offending Element (command group)
pub const OFFENDING_ELEMENT: Tag = Tag(0x0000, 0x0901);
/// Error ID (command group)
pub const ERROR_ID: Tag = Tag(0x0000, 0x0903);
/// Retrieve AE Title
pub const RETRIEVE_AE_TITLE: Tag = Tag(0x0008, 0x0054);
/// Instance Availability
pub const INSTANCE_AVAILABILITY: Tag = Tag(0x0008, 0x0056);

#[derive(Debug, Clone, Copy)]
pub struct DictionaryEntry {
    pub tag: Tag,
    pub vr: VR,
    pub keyword: &'static str,
}

const fn entry(tag: Tag, vr: VR, keyword: &'static str) -> DictionaryEntry {
    DictionaryEntry { tag, vr, keyword }
}

// Sorted by tag
static ENTRIES: &[DictionaryEntry] = &[
    entry(tags::COMMAND_GROUP_LENGTH, VR::UL, "CommandGroupLength"),
    entry(tags::AFFECTED_SOP_CLASS_UID, VR::UI, "AffectedSOPClassUID"),
    entry(tags::REQUESTED_SOP_CLASS_UID, VR::UI, "RequestedSOPClassUID"),
    entry(tags::COMMAND_FIELD, VR::US, "CommandField"),
    entry(tags::MESSAGE_ID, VR::US, "MessageID"),
    entry(tags::MESSAGE_ID_BEING_RESPONDED_TO, VR::US, "MessageIDBeingRespondedTo"),
    entry(tags::PRIORITY, VR::US, "Priority"),
    entry(tags::COMMAND_DATA_SET_TYPE, VR::US, "CommandDataSetType"),
    entry(tags::STATUS, VR::US, "Status"),
    entry(OFFENDING_ELEMENT, VR::AT, "OffendingElement"),
    entry(tags::ERROR_COMMENT, VR::LO, "ErrorComment"),
    entry(ERROR_ID, VR::US, "ErrorID"),
    entry(tags::AFFECTED_SOP_INSTANCE_UID, VR::UI, "AffectedSOPInstanceUID"),
    entry(tags::SPECIFIC_CHARACTER_SET, VR::CS, "SpecificCharacterSet"),
    entry(tags::SOP_CLASS_UID, VR::UI, "SOPClassUID"),
    entry(tags::SOP_INSTANCE_UID, VR::UI, "SOPInstanceUID"),
    entry(tags::STUDY_DATE, VR::DA, "StudyDate"),
    entry(tags::CONTENT_DATE, VR::DA, "ContentDate"),
    entry(tags::ACQUISITION_DATE_TIME, VR::DT, "AcquisitionDateTime"),
    entry(tags::STUDY_TIME, VR::TM, "StudyTime"),
    entry(tags::CONTENT_TIME, VR::TM, "ContentTime"),
    entry(tags::ACCESSION_NUMBER, VR::SH, "AccessionNumber"),
    entry(tags::QUERY_RETRIEVE_LEVEL, VR::CS, "QueryRetrieveLevel"),
    entry(RETRIEVE_AE_TITLE, VR::AE, "RetrieveAETitle"),
    entry(INSTANCE_AVAILABILITY, VR::CS, "InstanceAvailability"),
    entry(tags::MODALITY, VR::CS, "Modality"),
    entry(tags::MODALITIES_IN_STUDY, VR::CS, "ModalitiesInStudy"),
    entry(tags::CONVERSION_TYPE, VR::CS, "ConversionType"),
    entry(tags::MANUFACTURER, VR::LO, "Manufacturer"),
    entry(tags::INSTITUTION_NAME, VR::LO, "InstitutionName"),
    entry(tags::REFERRING_PHYSICIAN_NAME, VR::PN, "ReferringPhysicianName"),
    entry(tags::CODE_VALUE, VR::SH, "CodeValue"),
    entry(tags::CODING_SCHEME_DESIGNATOR, VR::SH, "CodingSchemeDesignator"),
    entry(tags::CODE_MEANING, VR::LO, "CodeMeaning"),
    entry(tags::STUDY_DESCRIPTION, VR::LO, "StudyDescription"),
    entry(tags::PATIENT_NAME, VR::PN, "PatientName"),
    entry(tags::PATIENT_ID, VR::LO, "PatientID"),
    entry(tags::PATIENT_BIRTH_DATE, VR::DA, "PatientBirthDate"),
    entry(tags::PATIENT_SEX, VR::CS, "PatientSex"),
    entry(tags::STUDY_INSTANCE_UID, VR::UI, "StudyInstanceUID"),
    entry(tags::SERIES_INSTANCE_UID, VR::UI, "SeriesInstanceUID"),
    entry(tags::STUDY_ID, VR::SH, "StudyID"),
    entry(tags::SERIES_NUMBER, VR::IS, "SeriesNumber"),
    entry(tags::INSTANCE_NUMBER, VR::IS, "InstanceNumber"),
    entry(tags::NUMBER_OF_STUDY_RELATED_SERIES, VR::IS, "NumberOfStudyRelatedSeries"),
    entry(tags::NUMBER_OF_STUDY_RELATED_INSTANCES, VR::IS, "NumberOfStudyRelatedInstances"),
    entry(tags::BURNED_IN_ANNOTATION, VR::CS, "BurnedInAnnotation"),
    entry(tags::CONCEPT_NAME_CODE_SEQUENCE, VR::SQ, "ConceptNameCodeSequence"),
    entry(tags::DOCUMENT_TITLE, VR::ST, "DocumentTitle"),
    entry(tags::ENCAPSULATED_DOCUMENT, VR::OB, "EncapsulatedDocument"),
    entry(MIME_TYPE_OF_ENCAPSULATED_DOCUMENT, VR::LO, "MIMETypeOfEncapsulatedDocument"),
    entry(ENCAPSULATED_DOCUMENT_LENGTH, VR::UL, "EncapsulatedDocumentLength"),
];

/// Look up a dictionary entry by tag
pub fn lookup(tag: Tag) -> Option<&'static DictionaryEntry> {
    ENTRIES
        .binary_search_by(|e| e.tag.cmp(&tag))
        .ok()
        .map(|index| &ENTRIES[index])
}

/// Value representation to assume for `tag` when none is on the wire.
///
/// Group length elements are always `UL`; unknown tags fall back to `UN`.
pub fn vr_of(tag: Tag) -> VR {
    match lookup(tag) {
        Some(entry) => entry.vr,
        None if tag.element() == 0x0000 => VR::UL,
        None => VR::UN,
    }
}

pub fn keyword_of(tag: Tag) -> Option<&'static str> {
    lookup(tag).map(|e| e.keyword)
}
