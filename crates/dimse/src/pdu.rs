//! DICOM upper layer protocol data units
//!
//! Binary layout of the seven PDU types exchanged over an association, and a
//! [`PduCodec`] that frames them on a byte stream for use with
//! `tokio_util::codec::Framed`. All multi-byte fields are big endian.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::{DimseError, Result};

/// DICOM application context name, the only one defined by the standard
pub const APPLICATION_CONTEXT_NAME: &str = "1.2.840.10008.3.1.1.1";

/// Upper layer protocol version carried in association requests
pub const PROTOCOL_VERSION: u16 = 0x0001;

/// Maximum PDU length we advertise unless configured otherwise
pub const DEFAULT_MAX_PDU_LENGTH: u32 = 16_384;

/// Bytes of PDU header preceding the body (type, reserved, length)
pub const PDU_HEADER_LENGTH: usize = 6;

/// Bytes of PDV item overhead inside a P-DATA-TF (length, context id, control)
pub const PDV_HEADER_LENGTH: usize = 6;

/// Ceiling for non-data PDUs, which never approach this size in practice
const MAX_CONTROL_PDU_LENGTH: u32 = 1 << 20;

const AE_TITLE_LENGTH: usize = 16;

mod pdu_type {
    pub const ASSOCIATE_RQ: u8 = 0x01;
    pub const ASSOCIATE_AC: u8 = 0x02;
    pub const ASSOCIATE_RJ: u8 = 0x03;
    pub const P_DATA_TF: u8 = 0x04;
    pub const RELEASE_RQ: u8 = 0x05;
    pub const RELEASE_RP: u8 = 0x06;
    pub const ABORT: u8 = 0x07;
}

mod item_type {
    pub const APPLICATION_CONTEXT: u8 = 0x10;
    pub const PRESENTATION_CONTEXT_RQ: u8 = 0x20;
    pub const PRESENTATION_CONTEXT_AC: u8 = 0x21;
    pub const ABSTRACT_SYNTAX: u8 = 0x30;
    pub const TRANSFER_SYNTAX: u8 = 0x40;
    pub const USER_INFORMATION: u8 = 0x50;
    pub const MAX_LENGTH: u8 = 0x51;
    pub const IMPLEMENTATION_CLASS_UID: u8 = 0x52;
    pub const IMPLEMENTATION_VERSION_NAME: u8 = 0x55;
    pub const USER_IDENTITY_RQ: u8 = 0x58;
    pub const USER_IDENTITY_AC: u8 = 0x59;
}

/// Presentation context proposed by the requestor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresentationContextProposed {
    pub id: u8,
    pub abstract_syntax: String,
    pub transfer_syntaxes: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentationContextResultReason {
    Acceptance,
    UserRejection,
    NoReason,
    AbstractSyntaxNotSupported,
    TransferSyntaxesNotSupported,
}

impl PresentationContextResultReason {
    fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0 => Self::Acceptance,
            1 => Self::UserRejection,
            2 => Self::NoReason,
            3 => Self::AbstractSyntaxNotSupported,
            4 => Self::TransferSyntaxesNotSupported,
            _ => return None,
        })
    }

    fn to_u8(self) -> u8 {
        match self {
            Self::Acceptance => 0,
            Self::UserRejection => 1,
            Self::NoReason => 2,
            Self::AbstractSyntaxNotSupported => 3,
            Self::TransferSyntaxesNotSupported => 4,
        }
    }
}

/// Acceptor's answer for one proposed presentation context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresentationContextResult {
    pub id: u8,
    pub reason: PresentationContextResultReason,
    pub transfer_syntax: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserIdentityType {
    Username,
    UsernamePassword,
    Kerberos,
    Saml,
    Jwt,
}

impl UserIdentityType {
    fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            1 => Self::Username,
            2 => Self::UsernamePassword,
            3 => Self::Kerberos,
            4 => Self::Saml,
            5 => Self::Jwt,
            _ => return None,
        })
    }

    fn to_u8(self) -> u8 {
        match self {
            Self::Username => 1,
            Self::UsernamePassword => 2,
            Self::Kerberos => 3,
            Self::Saml => 4,
            Self::Jwt => 5,
        }
    }
}

/// User identity negotiation sub-item of an association request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserIdentity {
    pub identity_type: UserIdentityType,
    pub positive_response_requested: bool,
    pub primary_field: Vec<u8>,
    pub secondary_field: Vec<u8>,
}

impl UserIdentity {
    /// Username and passcode identity
    pub fn username_password(username: &str, password: &str) -> Self {
        Self {
            identity_type: UserIdentityType::UsernamePassword,
            positive_response_requested: false,
            primary_field: username.as_bytes().to_vec(),
            secondary_field: password.as_bytes().to_vec(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserVariableItem {
    MaxLength(u32),
    ImplementationClassUid(String),
    ImplementationVersionName(String),
    UserIdentity(UserIdentity),
    /// Server response to a user identity request
    UserIdentityResponse(Vec<u8>),
    Unknown(u8, Vec<u8>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssociationRq {
    pub protocol_version: u16,
    pub calling_ae_title: String,
    pub called_ae_title: String,
    pub application_context_name: String,
    pub presentation_contexts: Vec<PresentationContextProposed>,
    pub user_variables: Vec<UserVariableItem>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssociationAc {
    pub protocol_version: u16,
    pub calling_ae_title: String,
    pub called_ae_title: String,
    pub application_context_name: String,
    pub presentation_contexts: Vec<PresentationContextResult>,
    pub user_variables: Vec<UserVariableItem>,
}

impl AssociationAc {
    /// Maximum PDU length the acceptor is willing to receive (0 = unlimited)
    pub fn max_pdu_length(&self) -> Option<u32> {
        self.user_variables.iter().find_map(|v| match v {
            UserVariableItem::MaxLength(len) => Some(*len),
            _ => None,
        })
    }
}

/// A-ASSOCIATE-RJ fields, kept as raw codes for diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssociationRj {
    /// 1 = permanent, 2 = transient
    pub result: u8,
    /// 1 = service user, 2 = provider (ACSE), 3 = provider (presentation)
    pub source: u8,
    pub reason: u8,
}

impl AssociationRj {
    pub fn describe(&self) -> String {
        let result = match self.result {
            1 => "permanent",
            2 => "transient",
            _ => "unknown result",
        };
        let reason = match (self.source, self.reason) {
            (1, 1) => "no reason given",
            (1, 2) => "application context name not supported",
            (1, 3) => "calling AE title not recognized",
            (1, 7) => "called AE title not recognized",
            (2, 1) => "no reason given",
            (2, 2) => "protocol version not supported",
            (3, 1) => "temporary congestion",
            (3, 2) => "local limit exceeded",
            _ => "unspecified reason",
        };
        format!(
            "{} rejection by {}: {} (result {}, source {}, reason {})",
            result,
            abort_source_name(self.source),
            reason,
            self.result,
            self.source,
            self.reason
        )
    }
}

/// Message control header bit: this fragment carries a command
pub const PDV_COMMAND: u8 = 0x01;
/// Message control header bit: last fragment of the message
pub const PDV_LAST: u8 = 0x02;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PDataValueType {
    Command,
    Data,
}

/// One presentation data value item inside a P-DATA-TF
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PDataValue {
    pub presentation_context_id: u8,
    pub value_type: PDataValueType,
    pub is_last: bool,
    pub data: Vec<u8>,
}

impl PDataValue {
    fn control_header(&self) -> u8 {
        let mut header = 0;
        if self.value_type == PDataValueType::Command {
            header |= PDV_COMMAND;
        }
        if self.is_last {
            header |= PDV_LAST;
        }
        header
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pdu {
    AssociationRq(AssociationRq),
    AssociationAc(AssociationAc),
    AssociationRj(AssociationRj),
    PData { data: Vec<PDataValue> },
    ReleaseRq,
    ReleaseRp,
    Abort { source: u8, reason: u8 },
}

impl Pdu {
    pub fn short_name(&self) -> &'static str {
        match self {
            Pdu::AssociationRq(_) => "A-ASSOCIATE-RQ",
            Pdu::AssociationAc(_) => "A-ASSOCIATE-AC",
            Pdu::AssociationRj(_) => "A-ASSOCIATE-RJ",
            Pdu::PData { .. } => "P-DATA-TF",
            Pdu::ReleaseRq => "A-RELEASE-RQ",
            Pdu::ReleaseRp => "A-RELEASE-RP",
            Pdu::Abort { .. } => "A-ABORT",
        }
    }
}

/// Name of the party that issued an A-ABORT or A-ASSOCIATE-RJ
pub fn abort_source_name(source: u8) -> &'static str {
    match source {
        0 | 1 => "service user",
        2 => "service provider",
        3 => "service provider (presentation)",
        _ => "unknown source",
    }
}

/// Frames upper layer PDUs on a byte stream.
///
/// `max_pdu_length` bounds incoming P-DATA-TF bodies (0 disables the check);
/// a peer exceeding it is treated as a protocol violation.
#[derive(Debug, Clone)]
pub struct PduCodec {
    max_pdu_length: u32,
}

impl PduCodec {
    pub fn new(max_pdu_length: u32) -> Self {
        Self { max_pdu_length }
    }

    pub fn max_pdu_length(&self) -> u32 {
        self.max_pdu_length
    }
}

impl Default for PduCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PDU_LENGTH)
    }
}

impl Decoder for PduCodec {
    type Item = Pdu;
    type Error = DimseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Pdu>> {
        if src.len() < PDU_HEADER_LENGTH {
            src.reserve(PDU_HEADER_LENGTH);
            return Ok(None);
        }

        let pdu_type = src[0];
        let length = u32::from_be_bytes([src[2], src[3], src[4], src[5]]);

        let limit = if pdu_type == pdu_type::P_DATA_TF && self.max_pdu_length != 0 {
            self.max_pdu_length
        } else {
            MAX_CONTROL_PDU_LENGTH.max(self.max_pdu_length)
        };
        if length > limit {
            return Err(DimseError::protocol(format!(
                "incoming PDU type {:#04x} has length {} exceeding the limit of {}",
                pdu_type, length, limit
            )));
        }

        let total = PDU_HEADER_LENGTH + length as usize;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        let frame = src.split_to(total);
        decode_body(pdu_type, &frame[PDU_HEADER_LENGTH..]).map(Some)
    }
}

impl Encoder<Pdu> for PduCodec {
    type Error = DimseError;

    fn encode(&mut self, pdu: Pdu, dst: &mut BytesMut) -> Result<()> {
        write_pdu(&pdu, dst)
    }
}

/// Serialize a PDU, header included
pub fn write_pdu(pdu: &Pdu, dst: &mut BytesMut) -> Result<()> {
    let mut body = BytesMut::new();
    let pdu_type = match pdu {
        Pdu::AssociationRq(rq) => {
            write_association_header(
                &mut body,
                rq.protocol_version,
                &rq.called_ae_title,
                &rq.calling_ae_title,
            );
            write_item(&mut body, item_type::APPLICATION_CONTEXT, rq.application_context_name.as_bytes())?;
            for pc in &rq.presentation_contexts {
                let mut item = BytesMut::new();
                item.put_u8(pc.id);
                item.put_bytes(0, 3);
                write_item(&mut item, item_type::ABSTRACT_SYNTAX, pc.abstract_syntax.as_bytes())?;
                for ts in &pc.transfer_syntaxes {
                    write_item(&mut item, item_type::TRANSFER_SYNTAX, ts.as_bytes())?;
                }
                write_item(&mut body, item_type::PRESENTATION_CONTEXT_RQ, &item)?;
            }
            write_user_information(&mut body, &rq.user_variables)?;
            pdu_type::ASSOCIATE_RQ
        }
        Pdu::AssociationAc(ac) => {
            write_association_header(
                &mut body,
                ac.protocol_version,
                &ac.called_ae_title,
                &ac.calling_ae_title,
            );
            write_item(&mut body, item_type::APPLICATION_CONTEXT, ac.application_context_name.as_bytes())?;
            for pc in &ac.presentation_contexts {
                let mut item = BytesMut::new();
                item.put_u8(pc.id);
                item.put_u8(0);
                item.put_u8(pc.reason.to_u8());
                item.put_u8(0);
                write_item(&mut item, item_type::TRANSFER_SYNTAX, pc.transfer_syntax.as_bytes())?;
                write_item(&mut body, item_type::PRESENTATION_CONTEXT_AC, &item)?;
            }
            write_user_information(&mut body, &ac.user_variables)?;
            pdu_type::ASSOCIATE_AC
        }
        Pdu::AssociationRj(rj) => {
            body.put_u8(0);
            body.put_u8(rj.result);
            body.put_u8(rj.source);
            body.put_u8(rj.reason);
            pdu_type::ASSOCIATE_RJ
        }
        Pdu::PData { data } => {
            for pdv in data {
                let length = u32::try_from(pdv.data.len() + 2)
                    .map_err(|_| DimseError::protocol("PDV fragment too large"))?;
                body.put_u32(length);
                body.put_u8(pdv.presentation_context_id);
                body.put_u8(pdv.control_header());
                body.put_slice(&pdv.data);
            }
            pdu_type::P_DATA_TF
        }
        Pdu::ReleaseRq => {
            body.put_bytes(0, 4);
            pdu_type::RELEASE_RQ
        }
        Pdu::ReleaseRp => {
            body.put_bytes(0, 4);
            pdu_type::RELEASE_RP
        }
        Pdu::Abort { source, reason } => {
            body.put_u8(0);
            body.put_u8(0);
            body.put_u8(*source);
            body.put_u8(*reason);
            pdu_type::ABORT
        }
    };

    let length =
        u32::try_from(body.len()).map_err(|_| DimseError::protocol("PDU body too large"))?;
    dst.reserve(PDU_HEADER_LENGTH + body.len());
    dst.put_u8(pdu_type);
    dst.put_u8(0);
    dst.put_u32(length);
    dst.put_slice(&body);
    Ok(())
}

/// Pad or truncate an AE title to its fixed 16-byte field
fn ae_title_field(title: &str) -> [u8; AE_TITLE_LENGTH] {
    let mut field = [b' '; AE_TITLE_LENGTH];
    for (slot, byte) in field.iter_mut().zip(title.bytes()) {
        *slot = byte;
    }
    field
}

fn write_association_header(body: &mut BytesMut, version: u16, called: &str, calling: &str) {
    body.put_u16(version);
    body.put_u16(0);
    body.put_slice(&ae_title_field(called));
    body.put_slice(&ae_title_field(calling));
    body.put_bytes(0, 32);
}

fn write_item(dst: &mut BytesMut, item_type: u8, value: &[u8]) -> Result<()> {
    let length = u16::try_from(value.len()).map_err(|_| {
        DimseError::protocol(format!("item {:#04x} too large ({} bytes)", item_type, value.len()))
    })?;
    dst.put_u8(item_type);
    dst.put_u8(0);
    dst.put_u16(length);
    dst.put_slice(value);
    Ok(())
}

fn write_field(dst: &mut BytesMut, value: &[u8]) -> Result<()> {
    let length = u16::try_from(value.len())
        .map_err(|_| DimseError::protocol("user identity field too large"))?;
    dst.put_u16(length);
    dst.put_slice(value);
    Ok(())
}

fn write_user_information(body: &mut BytesMut, variables: &[UserVariableItem]) -> Result<()> {
    let mut item = BytesMut::new();
    for variable in variables {
        match variable {
            UserVariableItem::MaxLength(len) => {
                write_item(&mut item, item_type::MAX_LENGTH, &len.to_be_bytes())?
            }
            UserVariableItem::ImplementationClassUid(uid) => {
                write_item(&mut item, item_type::IMPLEMENTATION_CLASS_UID, uid.as_bytes())?
            }
            UserVariableItem::ImplementationVersionName(name) => {
                write_item(&mut item, item_type::IMPLEMENTATION_VERSION_NAME, name.as_bytes())?
            }
            UserVariableItem::UserIdentity(identity) => {
                let mut value = BytesMut::new();
                value.put_u8(identity.identity_type.to_u8());
                value.put_u8(u8::from(identity.positive_response_requested));
                write_field(&mut value, &identity.primary_field)?;
                write_field(&mut value, &identity.secondary_field)?;
                write_item(&mut item, item_type::USER_IDENTITY_RQ, &value)?
            }
            UserVariableItem::UserIdentityResponse(response) => {
                let mut value = BytesMut::new();
                write_field(&mut value, response)?;
                write_item(&mut item, item_type::USER_IDENTITY_AC, &value)?
            }
            UserVariableItem::Unknown(kind, data) => write_item(&mut item, *kind, data)?,
        }
    }
    write_item(body, item_type::USER_INFORMATION, &item)
}

fn ensure(buf: &[u8], needed: usize, what: &str) -> Result<()> {
    if buf.remaining() < needed {
        return Err(DimseError::protocol(format!(
            "truncated {}: needed {} bytes, {} available",
            what,
            needed,
            buf.remaining()
        )));
    }
    Ok(())
}

fn text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .trim_matches(|c: char| c == ' ' || c == '\0')
        .to_string()
}

/// Split a buffer into (type, value) items with 16-bit lengths
fn read_items<'a>(mut buf: &'a [u8], what: &str) -> Result<Vec<(u8, &'a [u8])>> {
    let mut items = Vec::new();
    while buf.has_remaining() {
        ensure(buf, 4, what)?;
        let kind = buf.get_u8();
        buf.advance(1);
        let length = buf.get_u16() as usize;
        ensure(buf, length, what)?;
        let (value, rest) = buf.split_at(length);
        items.push((kind, value));
        buf = rest;
    }
    Ok(items)
}

fn decode_body(pdu_type: u8, mut body: &[u8]) -> Result<Pdu> {
    match pdu_type {
        pdu_type::ASSOCIATE_RQ | pdu_type::ASSOCIATE_AC => {
            ensure(body, 68, "association header")?;
            let protocol_version = body.get_u16();
            body.advance(2);
            let called_ae_title = text(&body[..AE_TITLE_LENGTH]);
            body.advance(AE_TITLE_LENGTH);
            let calling_ae_title = text(&body[..AE_TITLE_LENGTH]);
            body.advance(AE_TITLE_LENGTH);
            body.advance(32);

            let mut application_context_name = String::new();
            let mut proposed = Vec::new();
            let mut results = Vec::new();
            let mut user_variables = Vec::new();

            for (kind, value) in read_items(body, "association item")? {
                match kind {
                    item_type::APPLICATION_CONTEXT => application_context_name = text(value),
                    item_type::PRESENTATION_CONTEXT_RQ => proposed.push(decode_proposed(value)?),
                    item_type::PRESENTATION_CONTEXT_AC => results.push(decode_result(value)?),
                    item_type::USER_INFORMATION => user_variables = decode_user_information(value)?,
                    // unrecognized items are skipped
                    _ => {}
                }
            }

            if pdu_type == pdu_type::ASSOCIATE_RQ {
                Ok(Pdu::AssociationRq(AssociationRq {
                    protocol_version,
                    calling_ae_title,
                    called_ae_title,
                    application_context_name,
                    presentation_contexts: proposed,
                    user_variables,
                }))
            } else {
                Ok(Pdu::AssociationAc(AssociationAc {
                    protocol_version,
                    calling_ae_title,
                    called_ae_title,
                    application_context_name,
                    presentation_contexts: results,
                    user_variables,
                }))
            }
        }
        pdu_type::ASSOCIATE_RJ => {
            ensure(body, 4, "A-ASSOCIATE-RJ")?;
            Ok(Pdu::AssociationRj(AssociationRj {
                result: body[1],
                source: body[2],
                reason: body[3],
            }))
        }
        pdu_type::P_DATA_TF => {
            let mut data = Vec::new();
            while body.has_remaining() {
                ensure(body, 4, "PDV item")?;
                let length = body.get_u32() as usize;
                if length < 2 {
                    return Err(DimseError::protocol(format!("PDV item length {} too short", length)));
                }
                ensure(body, length, "PDV item")?;
                let presentation_context_id = body.get_u8();
                let header = body.get_u8();
                let value = body[..length - 2].to_vec();
                body.advance(length - 2);
                data.push(PDataValue {
                    presentation_context_id,
                    value_type: if header & PDV_COMMAND != 0 {
                        PDataValueType::Command
                    } else {
                        PDataValueType::Data
                    },
                    is_last: header & PDV_LAST != 0,
                    data: value,
                });
            }
            Ok(Pdu::PData { data })
        }
        pdu_type::RELEASE_RQ => Ok(Pdu::ReleaseRq),
        pdu_type::RELEASE_RP => Ok(Pdu::ReleaseRp),
        pdu_type::ABORT => {
            ensure(body, 4, "A-ABORT")?;
            Ok(Pdu::Abort {
                source: body[2],
                reason: body[3],
            })
        }
        other => Err(DimseError::protocol(format!("unknown PDU type {:#04x}", other))),
    }
}

fn decode_proposed(mut value: &[u8]) -> Result<PresentationContextProposed> {
    ensure(value, 4, "presentation context")?;
    let id = value.get_u8();
    value.advance(3);

    let mut abstract_syntax = String::new();
    let mut transfer_syntaxes = Vec::new();
    for (kind, sub) in read_items(value, "presentation context sub-item")? {
        match kind {
            item_type::ABSTRACT_SYNTAX => abstract_syntax = text(sub),
            item_type::TRANSFER_SYNTAX => transfer_syntaxes.push(text(sub)),
            _ => {}
        }
    }
    Ok(PresentationContextProposed {
        id,
        abstract_syntax,
        transfer_syntaxes,
    })
}

fn decode_result(mut value: &[u8]) -> Result<PresentationContextResult> {
    ensure(value, 4, "presentation context result")?;
    let id = value.get_u8();
    value.advance(1);
    let raw_reason = value.get_u8();
    value.advance(1);
    let reason = PresentationContextResultReason::from_u8(raw_reason).ok_or_else(|| {
        DimseError::protocol(format!("invalid presentation context result {}", raw_reason))
    })?;

    let transfer_syntax = read_items(value, "presentation context sub-item")?
        .into_iter()
        .find(|(kind, _)| *kind == item_type::TRANSFER_SYNTAX)
        .map(|(_, sub)| text(sub))
        .unwrap_or_default();

    Ok(PresentationContextResult {
        id,
        reason,
        transfer_syntax,
    })
}

fn read_field<'a>(buf: &mut &'a [u8]) -> Result<&'a [u8]> {
    ensure(buf, 2, "user identity field")?;
    let length = buf.get_u16() as usize;
    ensure(buf, length, "user identity field")?;
    let all: &'a [u8] = buf;
    let (field, rest) = all.split_at(length);
    *buf = rest;
    Ok(field)
}

fn decode_user_information(value: &[u8]) -> Result<Vec<UserVariableItem>> {
    let mut variables = Vec::new();
    for (kind, mut sub) in read_items(value, "user information sub-item")? {
        let variable = match kind {
            item_type::MAX_LENGTH => {
                ensure(sub, 4, "maximum length")?;
                UserVariableItem::MaxLength(sub.get_u32())
            }
            item_type::IMPLEMENTATION_CLASS_UID => {
                UserVariableItem::ImplementationClassUid(text(sub))
            }
            item_type::IMPLEMENTATION_VERSION_NAME => {
                UserVariableItem::ImplementationVersionName(text(sub))
            }
            item_type::USER_IDENTITY_RQ => {
                ensure(sub, 2, "user identity")?;
                let raw_type = sub.get_u8();
                let positive_response_requested = sub.get_u8() != 0;
                let identity_type = UserIdentityType::from_u8(raw_type).ok_or_else(|| {
                    DimseError::protocol(format!("invalid user identity type {}", raw_type))
                })?;
                let primary_field = read_field(&mut sub)?.to_vec();
                let secondary_field = if sub.has_remaining() {
                    read_field(&mut sub)?.to_vec()
                } else {
                    Vec::new()
                };
                UserVariableItem::UserIdentity(UserIdentity {
                    identity_type,
                    positive_response_requested,
                    primary_field,
                    secondary_field,
                })
            }
            item_type::USER_IDENTITY_AC => {
                UserVariableItem::UserIdentityResponse(read_field(&mut sub)?.to_vec())
            }
            other => UserVariableItem::Unknown(other, sub.to_vec()),
        };
        variables.push(variable);
    }
    Ok(variables)
}
