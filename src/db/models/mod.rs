pub mod geofence;

pub use geofence::{GeofenceRow, NewGeofence};
