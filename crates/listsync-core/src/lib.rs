pub mod config;
pub mod logging;

// Write path: retry, attachments, compound item creation.
pub mod attachments;
pub mod control;
pub mod retry;
pub mod transport;
pub mod writer;

#[cfg(test)]
pub(crate) mod testing;
