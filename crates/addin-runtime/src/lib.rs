//! Add-in runtime: authentication session wired to license gating.
//!
//! ```rust,ignore
//! let paths = Paths::new()?;
//! let config = Config::load(&paths)?;
//! let diagnostics = init_observability(&config, &paths);
//! let storage = open_local_storage(&paths)?;
//! let runtime = AddinRuntime::new(&config, host_bindings, diagnostics)?;
//! let snapshot = runtime.start().await?;
//! ```

mod diagnostics;
mod error;
mod runtime;
mod storage;
mod token_source;

pub use diagnostics::init_observability;
pub use error::{RuntimeError, RuntimeResult};
pub use runtime::{AddinRuntime, HostBindings, RuntimeSnapshot};
pub use storage::open_local_storage;
pub use token_source::SessionTokenSource;
