//! Request validation and sanitization.
//!
//! Every send, reply and draft request passes through [`validate`] before the engine
//! touches storage. Validation is all-or-nothing: the first violation rejects the
//! whole request and nothing is written.

use std::collections::HashSet;
use std::path::Path;

use crate::model::File;

/// Longest accepted topic, in characters, before escaping.
pub const MAX_TOPIC_LEN: usize = 255;
/// Longest accepted body text, in characters, before escaping.
pub const MAX_TEXT_LEN: usize = 10_000;
/// Most attachments a single message may carry.
pub const MAX_FILES: usize = 20;
/// Largest accepted attachment, in bytes.
pub const MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;
/// Longest accepted folder name, in characters.
pub const MAX_FOLDER_NAME_LEN: usize = 50;

/// MIME types accepted for attachments.
pub const ALLOWED_MIME_TYPES: &[&str] = &[
    "application/msword",
    "application/pdf",
    "application/vnd.ms-excel",
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "application/zip",
    "image/gif",
    "image/jpeg",
    "image/png",
    "image/webp",
    "text/csv",
    "text/plain",
];

// Markup, quoting and comment sequences that must never reach headers or queries.
const FORBIDDEN_PATTERNS: &[&str] = &[
    "<", ">", "\"", "'", ";", "`", "\\", "--", "/*", "*/", "\0", "\r", "\n",
];

/// Which kind of request is being validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// A new conversation.
    Send,
    /// A reply into an existing conversation.
    Reply,
    /// A draft save; receivers may be absent.
    Draft,
}

/// Raw content of a send, reply or draft request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Compose {
    /// Subject line.
    pub topic: String,
    /// Body text.
    pub text: String,
    /// Receiver addresses.
    pub receivers: Vec<String>,
    /// Attachment metadata.
    pub files: Vec<File>,
}

impl Compose {
    /// Creates a request body without attachments.
    #[must_use]
    pub fn new(
        topic: impl Into<String>,
        text: impl Into<String>,
        receivers: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            topic: topic.into(),
            text: text.into(),
            receivers: receivers.into_iter().map(Into::into).collect(),
            files: Vec::new(),
        }
    }

    /// Adds attachments.
    #[must_use]
    pub fn with_files(mut self, files: Vec<File>) -> Self {
        self.files = files;
        self
    }
}

/// Content that passed validation, escaped and ready to persist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sanitized {
    /// Escaped subject line.
    pub topic: String,
    /// Escaped body text.
    pub text: String,
    /// Trimmed receiver addresses, placeholders removed.
    pub receivers: Vec<String>,
    /// Checked attachments.
    pub files: Vec<File>,
}

/// Reason a request was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Topic exceeds [`MAX_TOPIC_LEN`].
    TopicTooLong,
    /// Text exceeds [`MAX_TEXT_LEN`].
    TextTooLong,
    /// Send or reply without receivers.
    NoReceivers,
    /// Receiver is not a mail address.
    InvalidReceiver(String),
    /// Receiver appears twice (case-insensitive).
    DuplicateReceiver(String),
    /// A field contains a forbidden character sequence.
    ForbiddenCharacters(&'static str),
    /// More than [`MAX_FILES`] attachments.
    TooManyFiles,
    /// Attachment larger than [`MAX_FILE_SIZE`].
    FileTooLarge(String),
    /// Attachment MIME type not in [`ALLOWED_MIME_TYPES`].
    DisallowedMimeType(String),
    /// Attachment name is empty, has directory parts or traversal sequences.
    InvalidFileName(String),
    /// Attachment has no storage locator.
    MissingLocator(String),
    /// Reply without a usable root message id.
    MissingRootMessage,
    /// Folder name is blank.
    EmptyFolderName,
    /// Folder name exceeds [`MAX_FOLDER_NAME_LEN`].
    FolderNameTooLong,
    /// Profile email is not a mail address.
    InvalidEmail(String),
    /// Profile display name is blank.
    EmptyDisplayName,
}

impl ValidationError {
    /// Get the field name this error relates to.
    #[must_use]
    pub const fn field(&self) -> &'static str {
        match self {
            Self::TopicTooLong => "topic",
            Self::TextTooLong => "text",
            Self::NoReceivers | Self::InvalidReceiver(_) | Self::DuplicateReceiver(_) => {
                "receivers"
            }
            Self::ForbiddenCharacters(field) => field,
            Self::TooManyFiles
            | Self::FileTooLarge(_)
            | Self::DisallowedMimeType(_)
            | Self::InvalidFileName(_)
            | Self::MissingLocator(_) => "files",
            Self::MissingRootMessage => "root_message_id",
            Self::EmptyFolderName | Self::FolderNameTooLong => "name",
            Self::InvalidEmail(_) => "email",
            Self::EmptyDisplayName => "display_name",
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TopicTooLong => write!(f, "Topic must be at most {MAX_TOPIC_LEN} characters"),
            Self::TextTooLong => write!(f, "Text must be at most {MAX_TEXT_LEN} characters"),
            Self::NoReceivers => write!(f, "At least one receiver is required"),
            Self::InvalidReceiver(addr) => write!(f, "Invalid receiver address: {addr}"),
            Self::DuplicateReceiver(addr) => write!(f, "Duplicate receiver: {addr}"),
            Self::ForbiddenCharacters(field) => {
                write!(f, "Field {field} contains forbidden characters")
            }
            Self::TooManyFiles => write!(f, "At most {MAX_FILES} files can be attached"),
            Self::FileTooLarge(name) => {
                write!(f, "File {name} exceeds {MAX_FILE_SIZE} bytes")
            }
            Self::DisallowedMimeType(mime) => write!(f, "File type {mime} is not allowed"),
            Self::InvalidFileName(name) => write!(f, "Invalid file name: {name}"),
            Self::MissingLocator(name) => write!(f, "File {name} has no storage locator"),
            Self::MissingRootMessage => write!(f, "A valid root message id is required"),
            Self::EmptyFolderName => write!(f, "Folder name is required"),
            Self::FolderNameTooLong => {
                write!(f, "Folder name must be at most {MAX_FOLDER_NAME_LEN} characters")
            }
            Self::InvalidEmail(addr) => write!(f, "Invalid email address: {addr}"),
            Self::EmptyDisplayName => write!(f, "Display name is required"),
        }
    }
}

impl std::error::Error for ValidationError {}

/// Validate and sanitize a send, reply or draft request.
///
/// # Errors
///
/// Returns the first [`ValidationError`] found.
pub fn validate(kind: RequestKind, compose: &Compose) -> Result<Sanitized, ValidationError> {
    if compose.topic.chars().count() > MAX_TOPIC_LEN {
        return Err(ValidationError::TopicTooLong);
    }
    if compose.text.chars().count() > MAX_TEXT_LEN {
        return Err(ValidationError::TextTooLong);
    }

    let receivers = validate_receivers(kind, &compose.receivers)?;
    validate_files(&compose.files)?;

    Ok(Sanitized {
        topic: escape(&compose.topic),
        text: escape(&compose.text),
        receivers,
        files: compose.files.clone(),
    })
}

/// Check a receiver list and return the trimmed, non-blank addresses.
///
/// Drafts may carry no receivers or one blank placeholder.
///
/// # Errors
///
/// Returns an error for an empty list (send/reply), a malformed or forbidden
/// address, or a case-insensitive duplicate.
pub fn validate_receivers(
    kind: RequestKind,
    receivers: &[String],
) -> Result<Vec<String>, ValidationError> {
    let mut seen = HashSet::new();
    let mut accepted = Vec::with_capacity(receivers.len());

    for raw in receivers {
        let addr = raw.trim();
        if !seen.insert(addr.to_lowercase()) {
            return Err(ValidationError::DuplicateReceiver(addr.to_string()));
        }
        if addr.is_empty() && kind == RequestKind::Draft {
            continue;
        }
        if has_forbidden(addr) {
            return Err(ValidationError::ForbiddenCharacters("receivers"));
        }
        if !is_valid_address(addr) {
            return Err(ValidationError::InvalidReceiver(addr.to_string()));
        }
        accepted.push(addr.to_string());
    }

    if accepted.is_empty() && kind != RequestKind::Draft {
        return Err(ValidationError::NoReceivers);
    }
    Ok(accepted)
}

fn validate_files(files: &[File]) -> Result<(), ValidationError> {
    if files.len() > MAX_FILES {
        return Err(ValidationError::TooManyFiles);
    }

    for file in files {
        if file.size > MAX_FILE_SIZE {
            return Err(ValidationError::FileTooLarge(file.name.clone()));
        }
        if !ALLOWED_MIME_TYPES.contains(&file.mime_type.to_lowercase().as_str()) {
            return Err(ValidationError::DisallowedMimeType(file.mime_type.clone()));
        }
        if !is_base_name(&file.name) {
            return Err(ValidationError::InvalidFileName(file.name.clone()));
        }
        if has_forbidden(&file.name) {
            return Err(ValidationError::ForbiddenCharacters("files.name"));
        }
        if file.locator.trim().is_empty() {
            return Err(ValidationError::MissingLocator(file.name.clone()));
        }
        if file.locator.contains("..") || has_forbidden(&file.locator) {
            return Err(ValidationError::ForbiddenCharacters("files.locator"));
        }
    }
    Ok(())
}

/// Check a folder name and return it trimmed.
///
/// Reserved names and duplicates are conflicts, not validation failures, and are
/// checked by the folder manager.
///
/// # Errors
///
/// Returns an error for blank, overlong or forbidden names.
pub fn validate_folder_name(name: &str) -> Result<String, ValidationError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ValidationError::EmptyFolderName);
    }
    if name.chars().count() > MAX_FOLDER_NAME_LEN {
        return Err(ValidationError::FolderNameTooLong);
    }
    if has_forbidden(name) {
        return Err(ValidationError::ForbiddenCharacters("name"));
    }
    Ok(name.to_string())
}

/// Check a profile's email and display name, returning both trimmed.
///
/// # Errors
///
/// Returns an error for a malformed address or a blank or forbidden name.
pub fn validate_identity(
    email: &str,
    display_name: &str,
) -> Result<(String, String), ValidationError> {
    let email = email.trim();
    if has_forbidden(email) || !is_valid_address(email) {
        return Err(ValidationError::InvalidEmail(email.to_string()));
    }

    let display_name = display_name.trim();
    if display_name.is_empty() {
        return Err(ValidationError::EmptyDisplayName);
    }
    if has_forbidden(display_name) {
        return Err(ValidationError::ForbiddenCharacters("display_name"));
    }
    Ok((email.to_string(), display_name.to_string()))
}

/// HTML-escape user content before it is stored or echoed.
#[must_use]
pub fn escape(input: &str) -> String {
    html_escape::encode_safe(input).into_owned()
}

fn has_forbidden(value: &str) -> bool {
    FORBIDDEN_PATTERNS.iter().any(|p| value.contains(p))
}

fn is_base_name(name: &str) -> bool {
    if name.trim().is_empty() || name.contains("..") || name.contains('/') {
        return false;
    }
    Path::new(name)
        .file_name()
        .is_some_and(|base| base.to_str() == Some(name))
}

/// Basic mail address validation.
fn is_valid_address(addr: &str) -> bool {
    if addr.chars().any(char::is_whitespace) {
        return false;
    }

    let Some((local, domain)) = addr.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }

    // Domain must contain at least one dot and no empty labels
    if !domain.contains('.') || domain.split('.').any(str::is_empty) {
        return false;
    }
    domain
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.')
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn file(name: &str) -> File {
        File {
            name: name.to_string(),
            mime_type: "application/pdf".to_string(),
            size: 1024,
            locator: format!("attachments/{name}"),
        }
    }

    #[test]
    fn test_valid_send_is_escaped() {
        let compose = Compose::new("Hi & bye", "<b>hello</b>", ["a@x.com"]);
        let clean = validate(RequestKind::Send, &compose).unwrap();
        assert_eq!(clean.topic, "Hi &amp; bye");
        assert!(!clean.text.contains('<'));
        assert_eq!(clean.receivers, vec!["a@x.com".to_string()]);
    }

    #[test]
    fn test_topic_bounds() {
        let ok = Compose::new("t".repeat(255), "", ["a@x.com"]);
        assert!(validate(RequestKind::Send, &ok).is_ok());

        let long = Compose::new("t".repeat(256), "", ["a@x.com"]);
        assert_eq!(
            validate(RequestKind::Send, &long).unwrap_err(),
            ValidationError::TopicTooLong
        );
    }

    #[test]
    fn test_text_limit_counts_raw_characters() {
        // 10,000 ampersands expand on escape but are within the raw limit
        let compose = Compose::new("", "&".repeat(MAX_TEXT_LEN), ["a@x.com"]);
        assert!(validate(RequestKind::Send, &compose).is_ok());

        let compose = Compose::new("", "x".repeat(MAX_TEXT_LEN + 1), ["a@x.com"]);
        assert_eq!(
            validate(RequestKind::Send, &compose).unwrap_err(),
            ValidationError::TextTooLong
        );
    }

    #[test]
    fn test_receivers_required_for_send_and_reply() {
        let compose = Compose::new("t", "x", Vec::<String>::new());
        assert_eq!(
            validate(RequestKind::Send, &compose).unwrap_err(),
            ValidationError::NoReceivers
        );
        assert_eq!(
            validate(RequestKind::Reply, &compose).unwrap_err(),
            ValidationError::NoReceivers
        );
        assert!(validate(RequestKind::Draft, &compose).is_ok());
    }

    #[test]
    fn test_duplicate_receivers_case_insensitive() {
        let compose = Compose::new("t", "x", ["a@x.com", "A@X.com"]);
        assert!(matches!(
            validate(RequestKind::Send, &compose).unwrap_err(),
            ValidationError::DuplicateReceiver(_)
        ));
    }

    #[test]
    fn test_invalid_and_forbidden_receivers() {
        for bad in ["user", "@x.com", "a@x", "a@@x.com", "a b@x.com", "a@x..com"] {
            let compose = Compose::new("t", "x", [bad]);
            assert!(
                matches!(
                    validate(RequestKind::Send, &compose).unwrap_err(),
                    ValidationError::InvalidReceiver(_)
                ),
                "{bad} should be rejected"
            );
        }

        let compose = Compose::new("t", "x", ["a'--@x.com"]);
        assert_eq!(
            validate(RequestKind::Send, &compose).unwrap_err(),
            ValidationError::ForbiddenCharacters("receivers")
        );
    }

    #[test]
    fn test_draft_placeholder_receiver() {
        let one = Compose::new("t", "x", [""]);
        let clean = validate(RequestKind::Draft, &one).unwrap();
        assert!(clean.receivers.is_empty());

        let two = Compose::new("t", "x", ["", " "]);
        assert!(matches!(
            validate(RequestKind::Draft, &two).unwrap_err(),
            ValidationError::DuplicateReceiver(_)
        ));

        let bad = Compose::new("t", "x", ["not-an-address"]);
        assert!(validate(RequestKind::Draft, &bad).is_err());
    }

    #[test]
    fn test_file_name_traversal_rejected() {
        for name in ["../etc/passwd", "dir/report.pdf", "..", "", "a\\b.pdf"] {
            let compose = Compose::new("t", "x", ["a@x.com"]).with_files(vec![file(name)]);
            assert!(
                validate(RequestKind::Send, &compose).is_err(),
                "{name:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_file_limits() {
        let many = (0..=MAX_FILES).map(|i| file(&format!("f{i}.pdf"))).collect();
        let compose = Compose::new("t", "x", ["a@x.com"]).with_files(many);
        assert_eq!(
            validate(RequestKind::Send, &compose).unwrap_err(),
            ValidationError::TooManyFiles
        );

        let mut big = file("big.pdf");
        big.size = MAX_FILE_SIZE + 1;
        let compose = Compose::new("t", "x", ["a@x.com"]).with_files(vec![big]);
        assert!(matches!(
            validate(RequestKind::Send, &compose).unwrap_err(),
            ValidationError::FileTooLarge(_)
        ));

        let mut exe = file("run.exe");
        exe.mime_type = "application/x-msdownload".to_string();
        let compose = Compose::new("t", "x", ["a@x.com"]).with_files(vec![exe]);
        assert!(matches!(
            validate(RequestKind::Send, &compose).unwrap_err(),
            ValidationError::DisallowedMimeType(_)
        ));

        let mut edge = file("empty.txt");
        edge.mime_type = "text/plain".to_string();
        edge.size = 0;
        let compose = Compose::new("t", "x", ["a@x.com"]).with_files(vec![edge]);
        assert!(validate(RequestKind::Send, &compose).is_ok());
    }

    #[test]
    fn test_locator_rechecked() {
        let mut f = file("a.pdf");
        f.locator = "attachments/../../secret".to_string();
        let compose = Compose::new("t", "x", ["a@x.com"]).with_files(vec![f]);
        assert_eq!(
            validate(RequestKind::Send, &compose).unwrap_err(),
            ValidationError::ForbiddenCharacters("files.locator")
        );
    }

    #[test]
    fn test_identity() {
        assert_eq!(
            validate_identity(" Alice@Example.com ", " Alice ").unwrap(),
            ("Alice@Example.com".to_string(), "Alice".to_string())
        );
        assert_eq!(
            validate_identity("alice", "Alice").unwrap_err().field(),
            "email"
        );
        assert_eq!(
            validate_identity("alice@example.com", "  ").unwrap_err(),
            ValidationError::EmptyDisplayName
        );
        assert_eq!(
            validate_identity("alice@example.com", "<b>Alice</b>")
                .unwrap_err()
                .field(),
            "display_name"
        );
    }

    #[test]
    fn test_folder_name() {
        assert_eq!(validate_folder_name("  Work ").unwrap(), "Work");
        assert_eq!(
            validate_folder_name("   ").unwrap_err(),
            ValidationError::EmptyFolderName
        );
        assert_eq!(
            validate_folder_name(&"n".repeat(51)).unwrap_err(),
            ValidationError::FolderNameTooLong
        );
        assert!(validate_folder_name("x; DROP TABLE folders").is_err());
    }

    #[test]
    fn test_error_fields() {
        assert_eq!(ValidationError::TopicTooLong.field(), "topic");
        assert_eq!(ValidationError::NoReceivers.field(), "receivers");
        assert_eq!(ValidationError::TooManyFiles.field(), "files");
        assert_eq!(ValidationError::ForbiddenCharacters("name").field(), "name");
    }

    proptest! {
        #[test]
        fn prop_overlong_topic_rejected(extra in 1usize..64, c in "[a-zA-Z0-9 ]") {
            let topic = c.repeat(MAX_TOPIC_LEN + extra);
            let compose = Compose::new(topic, "x", ["a@x.com"]);
            prop_assert_eq!(
                validate(RequestKind::Send, &compose).unwrap_err(),
                ValidationError::TopicTooLong
            );
        }

        #[test]
        fn prop_in_bounds_topic_accepted(topic in "[a-zA-Z0-9 ,.!?]{0,255}") {
            let compose = Compose::new(topic, "x", ["a@x.com"]);
            prop_assert!(validate(RequestKind::Send, &compose).is_ok());
        }
    }
}
