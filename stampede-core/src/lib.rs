mod config;
mod constants;
mod metrics;
mod report;
mod sample;
mod threshold;

pub use config::*;
pub use constants::*;
pub use metrics::*;
pub use report::*;
pub use sample::*;
pub use threshold::*;
