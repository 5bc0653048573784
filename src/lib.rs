#[cfg(feature = "cli")]
pub mod cli;
pub mod engine;
pub mod model;
pub mod output;
pub mod probe;
pub mod util;

pub use engine::TlsDataCollector;
