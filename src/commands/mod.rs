pub mod migrate;
pub mod serve;

// Re-export command functions for convenience
pub use migrate::migrate;
pub use serve::serve;
