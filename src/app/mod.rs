pub mod context;
pub mod error;
pub mod observer;

pub use context::AppContext;
pub use error::{Result, SluiceError};
