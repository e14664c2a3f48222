//! nodereg-health — health gate for member registration.
//!
//! A member is only registered once its kubelet answers on the
//! well-known health endpoint. The probe is a single HTTP GET with a
//! bounded timeout; any failure is reported as "unhealthy" and the
//! caller simply tries again next tick.
//!
//! ```text
//! HttpProber (port, path, timeout)
//!   └── http_probe(host, port, path, timeout) → ProbeResult
//!         ├── 2xx / 3xx          → Healthy
//!         ├── any other status   → Unhealthy
//!         └── connect / timeout  → Failed
//! ```

pub mod checker;

pub use checker::{DEFAULT_HEALTH_PATH, HealthProbe, HttpProber, ProbeResult, http_probe};
