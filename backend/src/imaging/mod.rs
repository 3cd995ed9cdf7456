pub mod annotate;
pub mod codec;
pub mod crop;
pub mod font;
