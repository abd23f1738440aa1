mod commands;
mod host;
mod paths;

pub use commands::{FALLBACK_PATH, PrependPath, path_with_prefix};
pub use host::Host;
pub use paths::{AppPaths, AppPathsError};
