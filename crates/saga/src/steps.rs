//! Saga and step names used in error labels, logs and metrics.

/// Saga label for account registration.
pub const REGISTRATION: &str = "Registration";

/// Saga label for account deletion.
pub const DELETION: &str = "Deletion";

/// Step name: profile service call.
pub const STEP_PROFILE: &str = "profile";

/// Step name: identity service call.
pub const STEP_IDENTITY: &str = "identity";

/// Step name: order service call.
pub const STEP_ORDER: &str = "order";
