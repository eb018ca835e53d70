//! Shared constants for the integration tests

// ============================================================================
// Test User Credentials
// ============================================================================

/// Default admin created when the library is first opened
pub const ADMIN_USER: &str = "admin";

/// Password the default admin is bootstrapped with
pub const ADMIN_PASS: &str = "adminpass123";

/// Password given to regular test users
pub const TEST_PASS: &str = "testpass123";

// ============================================================================
// Test Content
// ============================================================================

/// Content stored for songs created without a real audio file
pub const TEST_SONG_CONTENT: &[u8] = b"ID3\x04\x00test-song";
