pub mod config;
pub mod config_loader;
pub mod error;
pub mod layer;
pub mod metadata;
pub mod state_machine;
pub mod traits;

pub use error::*;
pub use layer::*;
pub use metadata::*;
pub use state_machine::*;
pub use traits::*;
