pub mod attendance;
pub mod class;
pub mod course;
pub mod session;
pub mod user;

pub use attendance::{
    AttendanceMethod, AttendanceRecord, AttendanceStatus, ClassReport, FinalizeSummary,
    GeoLocation, ManualMarkRequest, OverrideRequest, ScanRequest,
};
pub use class::{Class, NewClassRequest};
pub use course::{Course, Enrollment, NewCourseRequest, NewEnrollmentRequest};
pub use session::{ClassSession, IssueSessionRequest, IssuedSession, SessionInfo, SessionMetadata};
pub use user::{NewUserRequest, Role, User};
