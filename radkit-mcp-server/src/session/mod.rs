//! Session lifecycle management for the remote service connection

mod manager;

#[cfg(test)]
mod tests;

pub use manager::{SessionManager, SessionState};
