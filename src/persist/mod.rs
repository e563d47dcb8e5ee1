pub mod conversion;
pub mod pipeline;
