pub mod consts;
pub mod error;
pub mod frame;
pub mod io;
pub mod align;
pub mod stack;
pub mod devices;
pub mod acquisition;

pub use acquisition::{AcquisitionConfig, AcquisitionOrchestrator};
pub use error::{AstroliveError, Result};
