pub mod geofences;
