pub mod mixer;
pub mod source;
