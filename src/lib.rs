pub mod app;
pub mod core;
pub mod notifications;
pub mod pipeline;

include!(concat!(env!("OUT_DIR"), "/version.rs"));
