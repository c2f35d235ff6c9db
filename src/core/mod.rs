pub mod config;
pub mod cycle;
pub mod error;
pub mod lifecycle;
pub mod locator;
pub mod recorder;
pub mod search;
pub mod store;
pub mod survey;
pub mod terminal;
#[cfg(test)]
pub mod testing;
