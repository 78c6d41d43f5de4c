//! Shared constants for end-to-end tests

// ============================================================================
// Test Users
// ============================================================================

/// The signed-in user every test engine acts as
pub const TEST_USER: &str = "user-1";

/// Another user, used as an actor and a fan-out target
pub const OTHER_USER: &str = "user-2";

/// A third user
pub const THIRD_USER: &str = "user-3";

// ============================================================================
// Timing
// ============================================================================

/// Upper bound for waiting on a published snapshot. Generous so paused-time
/// tests can auto-advance through the whole retry schedule.
pub const WAIT_TIMEOUT_SECS: u64 = 120;
