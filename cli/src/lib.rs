pub mod frame_cmd;
mod render;

pub use frame_cmd::FrameCli;
pub use frame_cmd::OutputFormat;
