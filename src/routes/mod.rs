/// Router Module Index
///
/// Routes are grouped by access level. Authentication and guards are attached
/// as route layers, so a handler is only reachable through the checks of its
/// group.

/// Routes reachable without a session user.
pub mod public;

/// Routes behind `require_session_user`. Profile and CRM routes additionally
/// carry the `[active]` guard.
pub mod authenticated;

/// The administrative users API, guarded by `[active, superuser]`.
pub mod admin;
