//! Process-wide `tracing` setup. The filter starts from `RUST_LOG` (or `info`)
//! and is replaced by the configured one once settings are loaded.

mod logger;
pub use logger::*;

pub use tracing::{debug, error, info, trace, warn};
