//! Convenience re-exports.
//!
//! ```
//! use boiler_common::prelude::*;
//! ```

pub use crate::clock::{Clock, FakeClock, RealClock};
pub use crate::config::{load_yaml, load_yaml_opt, save_yaml_atomic, state_is_fresh, state_temp_matches};
pub use crate::consts::*;
pub use crate::error::{ConfigError, PersistError};
