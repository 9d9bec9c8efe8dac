pub mod preprocessing;
pub mod refinement;

pub use preprocessing::*;
pub use refinement::*;
