pub mod author;
pub mod paper;

pub use author::*;
pub use paper::*;
