pub mod access;
pub mod attendance_recorder;
pub mod notifier;
pub mod reports;
pub mod session_issuer;
pub mod token_validator;

#[cfg(test)]
pub mod fixtures;

pub use attendance_recorder::{AttendanceRecorder, MarkAttendance, MarkTarget};
pub use notifier::{
    AttendanceEvent, AttendanceEventKind, AttendanceNotifier, BroadcastNotifier, NoopNotifier,
};
pub use reports::ReportService;
pub use session_issuer::SessionIssuer;
pub use token_validator::TokenValidator;
