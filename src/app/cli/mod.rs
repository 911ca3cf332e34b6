//! CLI module containing argument parsing and configuration resolution

pub mod args;
pub mod config;

#[cfg(test)]
mod tests;
