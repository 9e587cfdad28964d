pub mod subscriber;
pub mod topic;

pub use subscriber::*;
pub use topic::*;
