//! System-wide constants and defaults.

/// Binary name for the CLI.
pub const BIN_NAME: &str = "flotilla";

/// Default service configuration file.
pub const DEFAULT_CONFIG_FILE: &str = "flotilla.yml";

/// Environment variable overriding the project name.
pub const PROJECT_NAME_ENV: &str = "FLOTILLA_PROJECT_NAME";

/// Project name used when none can be derived.
pub const DEFAULT_PROJECT_NAME: &str = "default";

/// Separates the namespace, service name and number in container names.
pub const NAME_SEPARATOR: char = '_';

/// Separates a reference target from its alias or mode.
pub const REFERENCE_SEPARATOR: char = ':';

/// Marker segment in the names of one-off containers.
pub const ONE_OFF_MARKER: &str = "run";

/// Configuration key holding link references.
pub const LINKS_KEY: &str = "links";

/// Configuration key holding volumes-from references.
pub const VOLUMES_FROM_KEY: &str = "volumes_from";

/// Upper bound on link nesting when expanding a service's link closure.
pub const MAX_LINK_DEPTH: usize = 256;

/// Default grace period before a stopped container is killed.
pub const DEFAULT_STOP_TIMEOUT_SECS: u64 = 10;
