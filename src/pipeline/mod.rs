pub mod summarizer;
pub mod render;
