//! mobdbg-core: shared building blocks for the MobDebug engine.
//!
//! Path resolution between local files and the debuggee's chunk names,
//! windowed pagination for variable views, and log-file helpers.

pub mod logging;
pub mod pagination;
pub mod paths;

pub use pagination::{range, PageRange};
pub use paths::{PathMapping, PathResolver};
