pub mod effect;
pub mod image;
pub mod renderer;
pub mod scheduler;
pub mod shape;
pub mod surface;
pub mod text;
pub mod video;
