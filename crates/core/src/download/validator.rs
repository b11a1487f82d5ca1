//! Payload validation for downloaded artifacts.

use thiserror::Error;

use crate::config::DownloadConfig;

/// Leading bytes of every PDF document.
const PDF_SIGNATURE: &[u8] = b"%PDF-";

/// A payload that downloaded fine but is not an acceptable artifact.
///
/// Distinct from fetch failures: validation is a property of the completed
/// download, not of the transport, and is not retried within the attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("payload of {size} bytes is below the minimum of {min}")]
    TooSmall { size: u64, min: u64 },

    #[error("payload of {size} bytes exceeds the maximum of {max}")]
    TooLarge { size: u64, max: u64 },

    #[error("payload does not start with the PDF signature")]
    BadSignature,
}

/// Size-bounds and structural-signature checks for downloaded bytes.
#[derive(Debug, Clone)]
pub struct ArtifactValidator {
    min_size: u64,
    max_size: u64,
    check_signature: bool,
}

impl ArtifactValidator {
    pub fn new(min_size: u64, max_size: u64, check_signature: bool) -> Self {
        Self {
            min_size,
            max_size,
            check_signature,
        }
    }

    pub fn from_config(config: &DownloadConfig) -> Self {
        Self::new(
            config.min_file_size_bytes,
            config.max_file_size_bytes,
            config.validate_pdf_format,
        )
    }

    pub fn validate(&self, bytes: &[u8]) -> Result<(), ValidationError> {
        let size = bytes.len() as u64;

        if size < self.min_size {
            return Err(ValidationError::TooSmall {
                size,
                min: self.min_size,
            });
        }

        if size > self.max_size {
            return Err(ValidationError::TooLarge {
                size,
                max: self.max_size,
            });
        }

        if self.check_signature && !bytes.starts_with(PDF_SIGNATURE) {
            return Err(ValidationError::BadSignature);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::pdf_bytes;

    #[test]
    fn test_accepts_valid_pdf() {
        let validator = ArtifactValidator::new(1024, 10_000, true);
        assert!(validator.validate(&pdf_bytes(2048)).is_ok());
    }

    #[test]
    fn test_rejects_undersized_payload() {
        let validator = ArtifactValidator::new(1024, 10_000, true);
        let err = validator.validate(&pdf_bytes(500)).unwrap_err();
        assert_eq!(
            err,
            ValidationError::TooSmall {
                size: 500,
                min: 1024
            }
        );
    }

    #[test]
    fn test_rejects_oversized_payload() {
        let validator = ArtifactValidator::new(0, 100, true);
        let err = validator.validate(&pdf_bytes(200)).unwrap_err();
        assert_eq!(
            err,
            ValidationError::TooLarge {
                size: 200,
                max: 100
            }
        );
    }

    #[test]
    fn test_rejects_wrong_signature() {
        let validator = ArtifactValidator::new(0, 10_000, true);
        let html = b"<html><body>Not Found</body></html>".repeat(40);
        assert_eq!(
            validator.validate(&html).unwrap_err(),
            ValidationError::BadSignature
        );
    }

    #[test]
    fn test_signature_check_can_be_disabled() {
        let validator = ArtifactValidator::new(0, 10_000, false);
        let html = b"<html></html>".repeat(10);
        assert!(validator.validate(&html).is_ok());
    }

    #[test]
    fn test_size_checked_before_signature() {
        // An undersized non-PDF reports the size problem, not the signature.
        let validator = ArtifactValidator::new(1024, 10_000, true);
        let err = validator.validate(b"nope").unwrap_err();
        assert!(matches!(err, ValidationError::TooSmall { .. }));
    }
}
