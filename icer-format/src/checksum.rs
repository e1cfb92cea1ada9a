//! CRC32C checksum utilities for side-file payloads

/// Compute CRC32C for data
pub fn compute_crc32c(data: &[u8]) -> u32 {
    crc32c::crc32c(data)
}

/// Verify CRC32C for the payload stored under `name`
pub fn verify_crc32c(name: &str, data: &[u8], expected: u32) -> Result<(), crate::error::IceError> {
    let actual = compute_crc32c(data);
    if actual == expected {
        Ok(())
    } else {
        Err(crate::error::IceError::ChecksumMismatch {
            name: name.to_string(),
            expected,
            actual,
        })
    }
}
