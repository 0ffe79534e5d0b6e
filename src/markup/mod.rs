//! Markup front end shared by the flow and print engines.

pub mod parse;
pub mod template;

pub use parse::{parse, Block, ParseOptions};
pub use template::TemplateRenderer;
