pub mod commands;

pub use commands::{DataBuffer, Response, ResponseType, SdCommand};
