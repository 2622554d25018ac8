//! Local checks run before a submission touches the network.

use image::ImageFormat;
use validator::Validate;

use crate::error::DiagnosisError;

/// Upload size limit matching the pipeline's request body cap.
pub const DEFAULT_MAX_IMAGE_BYTES: usize = 16 * 1024 * 1024;

/// Image formats the pipeline accepts.
const ALLOWED_FORMATS: [ImageFormat; 4] = [
    ImageFormat::Png,
    ImageFormat::Jpeg,
    ImageFormat::Gif,
    ImageFormat::Bmp,
];

/// File extensions the pipeline accepts, matched case-insensitively.
pub const ALLOWED_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "gif", "bmp"];

pub const MISSING_INPUT_MESSAGE: &str = "Please upload an image and describe the condition";
pub const MISSING_EMAIL_MESSAGE: &str = "Please enter your email address";
pub const INVALID_EMAIL_MESSAGE: &str = "Please enter a valid email address";
pub const EMPTY_FILE_MESSAGE: &str = "No file selected";
pub const INVALID_FILE_TYPE_MESSAGE: &str = "Invalid file type";

/// An image picked by the user, not yet checked.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageUpload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl ImageUpload {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes,
        }
    }
}

/// Raw form input handed to the coordinator.
#[derive(Debug, Clone, Default)]
pub struct DiagnosisInput {
    pub image: Option<ImageUpload>,
    pub condition: String,
    pub wants_email: bool,
    pub email: String,
}

/// Input that passed every local check.
#[derive(Debug, Clone)]
pub struct ValidatedInput {
    pub image: ValidatedImage,
    /// Condition text as entered (the trimmed form is known non-empty).
    pub condition: String,
    /// Trimmed address, present only when the user opted in.
    pub email: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ValidatedImage {
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub mime_type: &'static str,
}

#[derive(Debug, Validate)]
struct ContactEmail {
    #[validate(email)]
    address: String,
}

impl DiagnosisInput {
    /// Run every pre-network check.
    ///
    /// Fails with [`DiagnosisError::Validation`] carrying the message to
    /// show the user.
    pub fn validate(self, max_image_bytes: usize) -> Result<ValidatedInput, DiagnosisError> {
        let image = match self.image {
            Some(image) if !self.condition.trim().is_empty() => image,
            _ => return Err(invalid(MISSING_INPUT_MESSAGE)),
        };

        let email = if self.wants_email {
            let address = self.email.trim();
            if address.is_empty() {
                return Err(invalid(MISSING_EMAIL_MESSAGE));
            }
            let contact = ContactEmail {
                address: address.to_string(),
            };
            if contact.validate().is_err() {
                return Err(invalid(INVALID_EMAIL_MESSAGE));
            }
            Some(contact.address)
        } else {
            None
        };

        let image = validate_image(image, max_image_bytes)?;

        Ok(ValidatedInput {
            image,
            condition: self.condition,
            email,
        })
    }
}

fn validate_image(
    image: ImageUpload,
    max_image_bytes: usize,
) -> Result<ValidatedImage, DiagnosisError> {
    if image.file_name.trim().is_empty() || image.bytes.is_empty() {
        return Err(invalid(EMPTY_FILE_MESSAGE));
    }

    let extension_allowed = std::path::Path::new(&image.file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            ALLOWED_EXTENSIONS
                .iter()
                .any(|allowed| ext.eq_ignore_ascii_case(allowed))
        });
    if !extension_allowed {
        return Err(invalid(INVALID_FILE_TYPE_MESSAGE));
    }

    if image.bytes.len() > max_image_bytes {
        return Err(DiagnosisError::Validation(format!(
            "Image exceeds the {} MB upload limit",
            max_image_bytes / (1024 * 1024)
        )));
    }

    let format = image::guess_format(&image.bytes)
        .ok()
        .filter(|format| ALLOWED_FORMATS.contains(format))
        .ok_or_else(|| invalid(INVALID_FILE_TYPE_MESSAGE))?;

    Ok(ValidatedImage {
        file_name: image.file_name,
        bytes: image.bytes,
        mime_type: format.to_mime_type(),
    })
}

fn invalid(message: &str) -> DiagnosisError {
    DiagnosisError::Validation(message.to_string())
}
