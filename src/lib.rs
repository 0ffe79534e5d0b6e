pub mod address;
pub mod assets;
pub mod engine;
pub mod error;
pub mod harness;
pub mod markup;
pub mod model;
pub mod pdf;
pub mod profiler;
pub mod qr;
pub mod report;
pub mod schema;
pub mod store;

pub use engine::{EngineContext, EngineKind, RenderingEngine};
pub use error::{Error, Result};
