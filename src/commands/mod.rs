pub mod batch;
pub mod index;
pub mod merge;
pub mod outline;
mod pipeline;
pub mod status;
