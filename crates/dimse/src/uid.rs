//! DICOM UID generation

use uuid::Uuid;

/// Maximum length of a DICOM UID
pub const MAX_UID_LENGTH: usize = 64;

/// Implementation Class UID sent in association requests
pub const IMPLEMENTATION_CLASS_UID: &str = "2.25.329800735698586629295641978511506172918";

/// Implementation Version Name sent in association requests
pub const IMPLEMENTATION_VERSION_NAME: &str = "RADLINK_010";

/// Generate a globally unique UID under the `2.25` root.
///
/// The suffix is the decimal form of a random (version 4) UUID, which keeps
/// the result at most 44 characters long.
pub fn generate_uid() -> String {
    format!("2.25.{}", Uuid::new_v4().as_u128())
}

/// Check UID syntax: dot-separated numeric components, no leading zeros,
/// at most 64 characters.
pub fn is_valid_uid(uid: &str) -> bool {
    if uid.is_empty() || uid.len() > MAX_UID_LENGTH {
        return false;
    }
    uid.split('.').all(|component| {
        !component.is_empty()
            && component.bytes().all(|b| b.is_ascii_digit())
            && (component == "0" || !component.starts_with('0'))
    })
}
