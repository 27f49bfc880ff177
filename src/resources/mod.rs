mod addon;
mod cluster_version;
mod monitoring;

pub use addon::*;
pub use cluster_version::*;
pub use monitoring::*;
