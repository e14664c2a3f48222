//! Configuration values for the reconciliation engine.
//!
//! Built once by the daemon at startup and shared read-only with the
//! reconciliation loop. Nothing in here reads process-global state; the
//! environment is passed in explicitly where it is consulted.

use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde::Deserialize;

use crate::error::{RegisterError, RegisterResult};

/// Prefix of environment variables that become extra node labels.
pub const LABEL_ENV_PREFIX: &str = "NODE_REGISTER_";

/// Default time between reconciliation ticks.
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(60);

/// Default age after which a non-ready entry is reaped.
pub const DEFAULT_REAP_THRESHOLD: Duration = Duration::from_secs(60 * 60);

/// Shortest sync interval accepted at startup.
pub const MIN_SYNC_INTERVAL: Duration = Duration::from_secs(10);

static SELECTOR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([[:alnum:]]*)=([[:alnum:]]*)$").expect("static selector pattern")
});

// ── Tag selector ──────────────────────────────────────────────────

/// The single `name=value` pair a member's metadata must carry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagSelector {
    pub name: String,
    pub value: String,
}

impl TagSelector {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

impl FromStr for TagSelector {
    type Err = RegisterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let caps = SELECTOR_RE.captures(s.trim()).ok_or_else(|| {
            RegisterError::Config(format!(
                "invalid metadata selector '{s}', should be tag=value format"
            ))
        })?;
        Ok(Self::new(&caps[1], &caps[2]))
    }
}

impl std::fmt::Display for TagSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}={}", self.name, self.value)
    }
}

// ── Reconciliation settings ───────────────────────────────────────

/// Which members a tick works on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncMode {
    /// Reconcile every member the membership service reports.
    Fleet,
    /// Reconcile only the member this process runs on.
    Standalone { address: String },
}

/// Everything the reconciliation loop needs to know about its job.
#[derive(Debug, Clone)]
pub struct ReconcileConfig {
    pub selector: TagSelector,
    pub mode: SyncMode,
    /// Labels merged into every member's metadata before registration.
    /// They win over member-provided values on key collision.
    pub extra_labels: HashMap<String, String>,
    /// Register members under their reverse-resolved hostname.
    pub resolve_names: bool,
    pub interval: Duration,
    /// Reap non-ready entries older than this; `None` disables the reaper.
    pub reap_after: Option<Duration>,
}

impl ReconcileConfig {
    /// Fleet-mode settings with defaults for everything but the selector.
    pub fn new(selector: TagSelector) -> Self {
        Self {
            selector,
            mode: SyncMode::Fleet,
            extra_labels: HashMap::new(),
            resolve_names: false,
            interval: DEFAULT_SYNC_INTERVAL,
            reap_after: None,
        }
    }

    pub fn with_mode(mut self, mode: SyncMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_extra_labels(mut self, labels: HashMap<String, String>) -> Self {
        self.extra_labels = labels;
        self
    }

    pub fn with_resolve_names(mut self, resolve: bool) -> Self {
        self.resolve_names = resolve;
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_reaper(mut self, threshold: Duration) -> Self {
        self.reap_after = Some(threshold);
        self
    }
}

// ── Extra labels ──────────────────────────────────────────────────

/// On-disk label file: a single `[labels]` table.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LabelsFile {
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

impl LabelsFile {
    pub fn from_file(path: &Path) -> RegisterResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            RegisterError::Config(format!("unable to read labels file {}: {e}", path.display()))
        })?;
        toml::from_str(&content).map_err(|e| {
            RegisterError::Config(format!("invalid labels file {}: {e}", path.display()))
        })
    }
}

/// Collect `NODE_REGISTER_<NAME>=<value>` variables as labels keyed by
/// the lower-cased `<NAME>`.
pub fn labels_from_env<I>(vars: I) -> HashMap<String, String>
where
    I: IntoIterator<Item = (String, String)>,
{
    vars.into_iter()
        .filter_map(|(key, value)| {
            key.strip_prefix(LABEL_ENV_PREFIX)
                .map(|name| (name.to_lowercase(), value))
        })
        .collect()
}

// ── Durations ─────────────────────────────────────────────────────

/// Parse a duration string made of one or more `<number><unit>` parts,
/// like "500ms", "30s", "1h30m" or "1m30s500ms". Units are `ms`, `s`,
/// `m` and `h`. A bare number is taken as seconds.
pub fn parse_duration(s: &str) -> RegisterResult<Duration> {
    let s = s.trim();
    let invalid = || RegisterError::Config(format!("invalid duration '{s}'"));

    if s.is_empty() {
        return Err(invalid());
    }
    if s.bytes().all(|b| b.is_ascii_digit()) {
        let secs = s.parse::<u64>().map_err(|_| invalid())?;
        return Ok(Duration::from_secs(secs));
    }

    let mut total = Duration::ZERO;
    let mut rest = s;
    while !rest.is_empty() {
        let digits = rest
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(rest.len());
        if digits == 0 {
            return Err(invalid());
        }
        let count = rest[..digits].parse::<u32>().map_err(|_| invalid())?;
        rest = &rest[digits..];

        let unit_len = rest.find(|c: char| c.is_ascii_digit()).unwrap_or(rest.len());
        let unit = match &rest[..unit_len] {
            "ms" => Duration::from_millis(1),
            "s" => Duration::from_secs(1),
            "m" => Duration::from_secs(60),
            "h" => Duration::from_secs(60 * 60),
            _ => return Err(invalid()),
        };
        rest = &rest[unit_len..];

        total = unit
            .checked_mul(count)
            .and_then(|part| total.checked_add(part))
            .ok_or_else(invalid)?;
    }
    Ok(total)
}
