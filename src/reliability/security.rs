//! Upload filename sanitization.
//!
//! Client-supplied filenames become part of an on-disk path, so they are
//! reduced to their final component and checked before anything is written.

use std::fmt;

use tracing::warn;

use crate::constants::MAX_FILENAME_LEN;

/// Reasons an upload filename is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilenameError {
    /// Name is empty after stripping directories.
    Empty,
    /// Name contains a null byte.
    NullByte,
    /// Name is `.` or `..`.
    SpecialDirectory,
    /// Name contains control characters.
    ControlCharacter,
    /// Name exceeds [`MAX_FILENAME_LEN`] bytes.
    TooLong,
}

impl fmt::Display for FilenameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "Filename is empty"),
            Self::NullByte => write!(f, "Filename contains null bytes"),
            Self::SpecialDirectory => write!(f, "Filename cannot be '.' or '..'"),
            Self::ControlCharacter => write!(f, "Filename contains control characters"),
            Self::TooLong => write!(f, "Filename exceeds {MAX_FILENAME_LEN} bytes"),
        }
    }
}

impl std::error::Error for FilenameError {}

/// Reduce a client-supplied filename to a safe final path component.
///
/// Browsers on some platforms send the full client path, so everything up
/// to the last `/` or `\` is dropped. The remainder must be a plain,
/// non-empty filename.
///
/// # Examples
///
/// ```
/// use seedshare::reliability::sanitize_upload_name;
///
/// assert_eq!(sanitize_upload_name("report.pdf").unwrap(), "report.pdf");
/// assert_eq!(sanitize_upload_name("C:\\Users\\me\\notes.txt").unwrap(), "notes.txt");
/// assert_eq!(sanitize_upload_name("../../etc/passwd").unwrap(), "passwd");
/// assert!(sanitize_upload_name("..").is_err());
/// assert!(sanitize_upload_name("dir/").is_err());
/// ```
pub fn sanitize_upload_name(raw: &str) -> Result<String, FilenameError> {
    let name = raw.rsplit(['/', '\\']).next().unwrap_or_default().trim();

    if name.is_empty() {
        return Err(FilenameError::Empty);
    }

    if name.contains('\0') {
        warn!(
            target: "audit",
            security_event = "upload_name_rejected",
            reason = "null_byte",
            "Blocked upload filename with null byte"
        );
        return Err(FilenameError::NullByte);
    }

    if name == "." || name == ".." {
        warn!(
            target: "audit",
            security_event = "upload_name_rejected",
            reason = "special_directory",
            "Blocked special directory as upload filename"
        );
        return Err(FilenameError::SpecialDirectory);
    }

    if name.chars().any(char::is_control) {
        warn!(
            target: "audit",
            security_event = "upload_name_rejected",
            reason = "control_character",
            "Blocked upload filename with control characters"
        );
        return Err(FilenameError::ControlCharacter);
    }

    if name.len() > MAX_FILENAME_LEN {
        return Err(FilenameError::TooLong);
    }

    Ok(name.to_string())
}
