// Pipeline constants (no magic values)

/// Suffix appended to a notebook's stem for its archived, executed copy
pub const EXECUTED_SUFFIX: &str = "__executed";

/// Suffix appended to a unit's stem for its figure capture log
pub const CAPTURE_LOG_SUFFIX: &str = "__capture.jsonl";

/// Image format written by the capture hook (must be a tracked image extension)
pub const FIGURE_FORMAT: &str = "jpg";

/// Resolution of captured figures
pub const FIGURE_DPI: u32 = 150;

/// Prefix and zero-padded width of sequential figure names (`figure_001`)
pub const SEQUENTIAL_PREFIX: &str = "figure";
pub const SEQUENTIAL_WIDTH: usize = 3;

/// Non-interactive plotting backend forced in every unit
pub const PLOT_BACKEND: &str = "Agg";

/// Environment variable the plotting library reads its backend from
pub const PLOT_BACKEND_ENV: &str = "MPLBACKEND";

/// Kernel used for notebooks unless configured otherwise
pub const DEFAULT_KERNEL: &str = "python3";
