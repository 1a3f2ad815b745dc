//! Tunable knobs for the selector (spec §6's fixed constants plus the
//! role-pass budgets a real worker would load from config).

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::caps::TransportResource;

/// Maximum number of lanes an endpoint configuration can carry.
pub const MAX_LANES: usize = 16;
/// Maximum number of distinct remote MDs represented in `rma_bw_md_map`.
pub const MAX_OP_MDS: usize = 4;
/// Sentinel meaning "no lane" in the bit-stable output arrays.
pub const LANE_NONE: usize = MAX_LANES;

/// Selection tunables, analogous to the worker-wide transport config a
/// real deployment loads once at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireupConfig {
    /// Relative epsilon for score-equality comparisons (spec §4.1).
    pub score_epsilon: f64,
    /// Upper bound on RMA-BW lanes added by the multi-lane loop.
    pub max_rndv_lanes: usize,
    /// Upper bound on AM-BW lanes (including the seed AM lane).
    pub max_eager_lanes: usize,
    /// Upper bound on RMA lanes.
    pub max_rma_lanes: usize,
    /// Upper bound on AMO lanes.
    pub max_amo_lanes: usize,
}

impl Default for WireupConfig {
    fn default() -> Self {
        Self {
            score_epsilon: 1e-6,
            max_rndv_lanes: 4,
            max_eager_lanes: 2,
            max_rma_lanes: 2,
            max_amo_lanes: 1,
        }
    }
}

impl WireupConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading wireup config {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("parsing wireup config {}", path.display()))
    }

    /// Policy hook resolving the open question in spec §9: rather than
    /// hard-coding a transport-name substring exclusion for
    /// `rma_bw_md_map`, expose a predicate the caller can override.
    /// The default excludes nothing.
    pub fn rndv_md_excluded(&self, _resource: &TransportResource) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = WireupConfig::default();
        assert!(cfg.max_eager_lanes >= 1);
        assert!(cfg.score_epsilon > 0.0);
    }
}
