pub mod encoder;
pub mod faststart;
pub mod ffmpeg;
pub mod mux;
