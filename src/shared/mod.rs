//! Messaging between the scanner and whatever presents its results

pub mod messages;

pub use messages::SessionEvent;
