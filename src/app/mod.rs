//! Application module

pub mod cli;
pub mod handler;
pub mod input;
pub mod startup;
