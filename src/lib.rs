pub mod config;
pub mod exercise;
pub mod landmark;
pub mod posture;
pub mod protocol;
pub mod recording;
pub mod session;
