pub mod action;
pub mod capture;
pub mod csv_loader;
pub mod gesture_classifier;
pub mod pipeline;
pub mod session;
pub mod transport;
pub mod types;
