//! AMO pass (spec §4.4.2): atomic-memory-operation lanes.

use log::debug;

use crate::bitmap::Bitmap64;
use crate::caps::EpFeatures;
use crate::config::WireupConfig;
use crate::context::{EpCreateParams, ReachableFn, WorkerContext};
use crate::criteria::{Criteria, Masks};
use crate::lanes::{LaneTable, LaneUsage};
use crate::score::score_amo;

use super::{run_multi_lane, Diversity};

fn gated(params: &EpCreateParams) -> bool {
    !params.is_mem_type_copy
        && (params.features.contains(EpFeatures::AMO32) || params.features.contains(EpFeatures::AMO64))
        && !params.requested_atomics.is_empty()
}

/// Run the AMO pass. Returns `true` if at least one lane was placed.
pub fn run(
    ctx: &WorkerContext,
    remotes: &[crate::caps::RemoteEntry],
    reachable: &ReachableFn,
    params: &EpCreateParams,
    config: &WireupConfig,
    table: &mut LaneTable,
) -> bool {
    if !gated(params) {
        debug!("AMO pass: not requested, skipping");
        return false;
    }

    let atomic = params.requested_atomics.as_caps();
    let criteria = Criteria {
        title: "AMO".to_string(),
        local_iface: Default::default(),
        remote_iface: Default::default(),
        local_md: Default::default(),
        remote_md: Default::default(),
        local_atomic: atomic,
        remote_atomic: atomic,
        tl_rsc_flags: Default::default(),
        score_fn: score_amo,
    };

    let num_devices = ctx.num_devices();
    let num_remote_mds = remotes.iter().map(|r| r.md_index + 1).max().unwrap_or(0);
    // Restricted to non-peer-to-peer resources (plus explicit atomic
    // overrides) so the remote side can connect back on the same
    // transport — spec §4.4.2.
    let masks = Masks {
        allowed_tls: ctx.atomic_allowed_tls(),
        allowed_local_devices: Bitmap64::full(num_devices),
        allowed_remote_devices: Bitmap64::full(num_devices),
        allowed_remote_mds: Bitmap64::full(num_remote_mds),
    };

    let (lanes, _) = run_multi_lane(
        ctx.resources,
        remotes,
        reachable,
        params.estimated_endpoints,
        config.score_epsilon,
        masks,
        config.max_amo_lanes,
        false,
        &|_, _| false,
        Diversity::RemoteMd,
        LaneUsage::AMO,
        &criteria,
        &|_| true,
        table,
    );

    if lanes.is_empty() {
        debug!("AMO pass: no lane placed");
    }
    !lanes.is_empty()
}
