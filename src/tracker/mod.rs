pub mod controller;

pub use controller::{LiveData, TabInfo, TrackerController, FOCUS_MODE_KEY, SETTINGS_KEY};
