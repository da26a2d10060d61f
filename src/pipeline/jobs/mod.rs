//! Built-in pipeline job implementations.

pub mod copy_port;
pub mod get_frame;

pub use copy_port::{CopyPortConfig, CopyPortJob};
pub use get_frame::{GetFrameConfig, GetFrameJob};
