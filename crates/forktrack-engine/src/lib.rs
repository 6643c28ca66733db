pub mod delta;
pub mod resolver;
pub mod scanner;
pub mod tracker;

pub use delta::{RangeDelta, compute_delta};
pub use resolver::TitleResolver;
pub use scanner::{FileScope, scan};
pub use tracker::Tracker;
