//! DIMSE command sets
//!
//! Commands travel in their own PDVs and are always encoded in Implicit VR
//! Little Endian, prefixed by Command Group Length.

use dicom_core::Tag;
use dicom_dictionary_std::tags;

use crate::dataset::Dataset;
use crate::dictionary;
use crate::error::{DimseError, Result};
use crate::transfer_syntax::TransferSyntax;
use crate::types::{DimseStatus, Priority};

pub const C_STORE_RQ: u16 = 0x0001;
pub const C_STORE_RSP: u16 = 0x8001;
pub const C_FIND_RQ: u16 = 0x0020;
pub const C_FIND_RSP: u16 = 0x8020;
pub const C_ECHO_RQ: u16 = 0x0030;
pub const C_ECHO_RSP: u16 = 0x8030;
pub const C_CANCEL_RQ: u16 = 0x0FFF;

/// CommandDataSetType value meaning no data set follows
pub const NO_DATA_SET: u16 = 0x0101;
/// CommandDataSetType value we send when a data set follows
pub const DATA_SET_PRESENT: u16 = 0x0000;

pub fn command_name(field: u16) -> &'static str {
    match field {
        C_STORE_RQ => "C-STORE-RQ",
        C_STORE_RSP => "C-STORE-RSP",
        C_FIND_RQ => "C-FIND-RQ",
        C_FIND_RSP => "C-FIND-RSP",
        C_ECHO_RQ => "C-ECHO-RQ",
        C_ECHO_RSP => "C-ECHO-RSP",
        C_CANCEL_RQ => "C-CANCEL-RQ",
        _ => "unknown command",
    }
}

fn base(sop_class_uid: &str, field: u16, message_id: u16, has_data: bool) -> Dataset {
    let mut command = Dataset::new();
    command.put_text(tags::AFFECTED_SOP_CLASS_UID, sop_class_uid);
    command.put_u16(tags::COMMAND_FIELD, field);
    command.put_u16(tags::MESSAGE_ID, message_id);
    command.put_u16(
        tags::COMMAND_DATA_SET_TYPE,
        if has_data { DATA_SET_PRESENT } else { NO_DATA_SET },
    );
    command
}

pub fn echo_rq(sop_class_uid: &str, message_id: u16) -> Dataset {
    base(sop_class_uid, C_ECHO_RQ, message_id, false)
}

pub fn find_rq(sop_class_uid: &str, message_id: u16, priority: Priority) -> Dataset {
    let mut command = base(sop_class_uid, C_FIND_RQ, message_id, true);
    command.put_u16(tags::PRIORITY, priority.code());
    command
}

pub fn store_rq(
    sop_class_uid: &str,
    sop_instance_uid: &str,
    message_id: u16,
    priority: Priority,
) -> Dataset {
    let mut command = base(sop_class_uid, C_STORE_RQ, message_id, true);
    command.put_u16(tags::PRIORITY, priority.code());
    command.put_text(tags::AFFECTED_SOP_INSTANCE_UID, sop_instance_uid);
    command
}

/// C-CANCEL-RQ for the request with `message_id`
pub fn cancel_rq(message_id: u16) -> Dataset {
    let mut command = Dataset::new();
    command.put_u16(tags::COMMAND_FIELD, C_CANCEL_RQ);
    command.put_u16(tags::MESSAGE_ID_BEING_RESPONDED_TO, message_id);
    command.put_u16(tags::COMMAND_DATA_SET_TYPE, NO_DATA_SET);
    command
}

/// Encode a command set, computing Command Group Length
pub fn encode_command(command: &Dataset) -> Result<Vec<u8>> {
    let mut body = command.clone();
    body.remove(tags::COMMAND_GROUP_LENGTH);
    if body.iter().any(|e| e.tag.group() != 0x0000) {
        return Err(DimseError::protocol("command sets may only contain group 0000"));
    }

    let encoded = body.encode(TransferSyntax::ImplicitVrLittleEndian)?;
    let length = u32::try_from(encoded.len())
        .map_err(|_| DimseError::protocol("command set too large"))?;

    let mut out = Vec::with_capacity(encoded.len() + 12);
    out.extend_from_slice(&0x0000u16.to_le_bytes());
    out.extend_from_slice(&0x0000u16.to_le_bytes());
    out.extend_from_slice(&4u32.to_le_bytes());
    out.extend_from_slice(&length.to_le_bytes());
    out.extend_from_slice(&encoded);
    Ok(out)
}

pub fn decode_command(bytes: &[u8]) -> Result<Dataset> {
    Dataset::decode(bytes, TransferSyntax::ImplicitVrLittleEndian)
}

/// Fields of a response command the engine acts on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResponse {
    pub command_field: u16,
    pub message_id_being_responded_to: u16,
    pub status: DimseStatus,
    pub has_data_set: bool,
    pub error_comment: Option<String>,
    pub affected_sop_instance_uid: Option<String>,
}

impl CommandResponse {
    pub fn from_dataset(command: &Dataset) -> Result<Self> {
        let required = |tag: Tag| {
            command.u16(tag).ok_or_else(|| {
                DimseError::protocol(format!(
                    "response command lacks {}",
                    dictionary::keyword_of(tag).unwrap_or("a required field")
                ))
            })
        };

        let command_field = required(tags::COMMAND_FIELD)?;
        let message_id_being_responded_to = required(tags::MESSAGE_ID_BEING_RESPONDED_TO)?;
        let status = DimseStatus::from_code(required(tags::STATUS)?);
        let has_data_set = command
            .u16(tags::COMMAND_DATA_SET_TYPE)
            .map_or(false, |t| t != NO_DATA_SET);

        Ok(Self {
            command_field,
            message_id_being_responded_to,
            status,
            has_data_set,
            error_comment: command.string(tags::ERROR_COMMENT).map(str::to_string),
            affected_sop_instance_uid: command
                .string(tags::AFFECTED_SOP_INSTANCE_UID)
                .map(str::to_string),
        })
    }
}

/// Build a response command set. Used by test peers.
pub fn response(
    sop_class_uid: &str,
    field: u16,
    message_id_being_responded_to: u16,
    status: u16,
    has_data: bool,
) -> Dataset {
    let mut command = Dataset::new();
    command.put_text(tags::AFFECTED_SOP_CLASS_UID, sop_class_uid);
    command.put_u16(tags::COMMAND_FIELD, field);
    command.put_u16(tags::MESSAGE_ID_BEING_RESPONDED_TO, message_id_being_responded_to);
    command.put_u16(
        tags::COMMAND_DATA_SET_TYPE,
        if has_data { DATA_SET_PRESENT } else { NO_DATA_SET },
    );
    command.put_u16(tags::STATUS, status);
    command
}
