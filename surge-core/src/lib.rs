mod constants;
mod error;
mod report;
mod scenario;
mod stats;

pub use constants::*;
pub use error::*;
pub use report::*;
pub use scenario::*;
pub use stats::*;
