use serde::Serialize;

/// Which path made the primary tool resolvable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "via", rename_all = "snake_case")]
pub enum InstallPath {
    AlreadyInstalled,
    Runner,
    Remediation { step: String },
}

/// Unforgeable proof that the primary tool answered the canonical probe.
///
/// Construction is double-locked:
/// 1. `Seal` is a private type, so no struct literal outside this file.
/// 2. `new()` is `pub(super)`, so only `readiness/` can mint one.
///
/// Completion outcomes require this value, so nothing but a successful
/// re-probe can produce `Complete`. No `Clone`, `Copy` or `Default`.
#[derive(Debug, Serialize)]
pub struct ToolReady {
    version: String,
    #[serde(flatten)]
    via: InstallPath,
    #[serde(skip)]
    _seal: Seal,
}

#[derive(Debug)]
struct Seal;

impl ToolReady {
    pub(super) fn new(version: String, via: InstallPath) -> Self {
        Self {
            version,
            via,
            _seal: Seal,
        }
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn via(&self) -> &InstallPath {
        &self.via
    }
}
