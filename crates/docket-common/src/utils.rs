//! Docket Utils - Utility Functions
//!
//! Checksums for log frame integrity and human-readable size handling.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

// =============================================================================
// Checksum Functions
// =============================================================================

/// Compute CRC32 checksum for data integrity verification.
#[inline]
pub fn crc32(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}

/// Verify data against expected CRC32 checksum.
#[inline]
pub fn verify_crc32(data: &[u8], expected: u32) -> bool {
    crc32(data) == expected
}

// =============================================================================
// Size Formatting
// =============================================================================

const SIZE_UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB", "PB"];

/// Format a byte size as a human-readable string.
pub fn format_size(bytes: u64) -> String {
    if bytes == 0 {
        return "0 B".to_string();
    }

    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < SIZE_UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, SIZE_UNITS[unit_index])
    } else {
        format!("{:.2} {}", size, SIZE_UNITS[unit_index])
    }
}

/// Parse a human-readable size string to bytes.
pub fn parse_size(s: &str) -> Option<u64> {
    let s = s.trim().to_uppercase();

    let (num_str, unit) = if let Some(n) = s.strip_suffix("PB") {
        (n, 1024_u64.pow(5))
    } else if let Some(n) = s.strip_suffix("TB") {
        (n, 1024_u64.pow(4))
    } else if let Some(n) = s.strip_suffix("GB") {
        (n, 1024_u64.pow(3))
    } else if let Some(n) = s.strip_suffix("MB") {
        (n, 1024_u64.pow(2))
    } else if let Some(n) = s.strip_suffix("KB") {
        (n, 1024_u64)
    } else if let Some(n) = s.strip_suffix('B') {
        (n, 1_u64)
    } else {
        (s.as_str(), 1_u64)
    };

    num_str
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|n| *n >= 0.0)
        .map(|n| (n * unit as f64) as u64)
}

// =============================================================================
// Tests
// =============================================================================
