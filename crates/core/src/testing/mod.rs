//! Test doubles and fixtures shared by unit and integration tests.

mod mock_fetcher;

pub use mock_fetcher::MockFetcher;

use chrono::NaiveDate;

use crate::claim::{Claim, FileRef};

/// A payload that passes signature validation, padded to the requested size.
pub fn pdf_bytes(len: usize) -> Vec<u8> {
    let mut bytes = b"%PDF-1.4\n".to_vec();
    if bytes.len() > len {
        bytes.truncate(len);
    } else {
        bytes.resize(len, b'0');
    }
    bytes
}

/// A file reference with a fixed create date.
pub fn test_file_ref(file_id: &str, claim_id: &str) -> FileRef {
    FileRef {
        file_id: file_id.to_string(),
        claim_id: claim_id.to_string(),
        claim_no: format!("NO-{}", claim_id),
        remote_name: format!("{}.pdf", file_id),
        create_date: NaiveDate::from_ymd_opt(2024, 3, 15).unwrap(),
    }
}

/// A claim owning the given files, reported on the create date.
pub fn test_claim(claim_id: &str, file_ids: &[&str]) -> Claim {
    Claim {
        claim_id: claim_id.to_string(),
        claim_no: format!("NO-{}", claim_id),
        report_date: NaiveDate::from_ymd_opt(2024, 3, 15).unwrap(),
        files: file_ids
            .iter()
            .map(|id| test_file_ref(id, claim_id))
            .collect(),
    }
}
