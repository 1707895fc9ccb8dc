//! Tokio implementation of the process boundary of `gitrun-core`.
mod error;
pub use error::{ExecError, ExecResult};

mod util;
pub use util::exit_code;

pub mod proc;
pub use proc::{SpawnOptions, TokioSpawner};

pub mod utils;
pub use utils::limits::RlimitConfig;

pub mod prelude {
    pub use crate::error::{ExecError, ExecResult};
    pub use crate::proc::{SpawnOptions, TokioSpawner};
    pub use crate::utils::limits::RlimitConfig;
}
