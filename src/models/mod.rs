pub mod alert;
pub mod geofence;

pub use alert::{Notice, NoticeKind, Severity, ViolationAlert};
pub use geofence::{Geofence, GeofenceRecord, GeofenceRejection, GeofenceSnapshot, UNNAMED_FENCE};
