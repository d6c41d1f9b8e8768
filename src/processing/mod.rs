pub mod decode;
pub mod enhance;
pub mod layout;
pub mod pipeline;

pub use pipeline::{RenderSettings, render};
