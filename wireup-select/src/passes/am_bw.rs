//! AM-BW pass (spec §4.4.7): extra AM lanes dedicated to bcopy-sized
//! eager-message bandwidth, seeded from the already-selected AM lane.

use log::debug;

use crate::bitmap::Bitmap64;
use crate::caps::{EpFeatures, IfaceFlags};
use crate::config::WireupConfig;
use crate::context::{EpCreateParams, ReachableFn, WorkerContext};
use crate::criteria::{Criteria, Masks};
use crate::lanes::{LaneTable, LaneUsage};
use crate::score::score_am_bw;

use super::{am::AmSelection, needs_signaled_proxy, run_multi_lane, Diversity};

fn gated(params: &EpCreateParams, config: &WireupConfig) -> bool {
    params.features.contains(EpFeatures::TAG) && !params.is_mem_type_copy && config.max_eager_lanes >= 2
}

/// Run the AM-BW pass. Returns the lane indices added (possibly empty).
pub fn run(
    ctx: &WorkerContext,
    remotes: &[crate::caps::RemoteEntry],
    reachable: &ReachableFn,
    params: &EpCreateParams,
    config: &WireupConfig,
    table: &mut LaneTable,
    am: &AmSelection,
) -> Vec<usize> {
    if !gated(params, config) {
        debug!("AM-BW pass: not requested, skipping");
        return Vec::new();
    }

    let am_local = ctx
        .resources
        .iter()
        .find(|r| r.resource_index == am.local_resource)
        .expect("AM selection references a real resource");

    if am_local.device_type.terminates_diversity_loop() {
        debug!("AM-BW pass: AM lane is self/shm, already locally optimal, adding no lanes");
        return Vec::new();
    }

    let am_remote = remotes
        .iter()
        .find(|r| r.entry_index == am.remote_entry)
        .expect("AM selection references a real remote entry");

    let criteria = Criteria {
        title: "AM-BW".to_string(),
        local_iface: IfaceFlags::AM_BCOPY,
        remote_iface: IfaceFlags::AM_BCOPY | IfaceFlags::CB_SYNC,
        local_md: Default::default(),
        remote_md: Default::default(),
        local_atomic: Default::default(),
        remote_atomic: Default::default(),
        tl_rsc_flags: Default::default(),
        score_fn: score_am_bw,
    };

    let num_devices = ctx.num_devices();
    let num_remote_mds = remotes.iter().map(|r| r.md_index + 1).max().unwrap_or(0);
    let mut masks = Masks {
        allowed_tls: Bitmap64::full(ctx.resources.len()),
        allowed_local_devices: Bitmap64::full(num_devices),
        allowed_remote_devices: Bitmap64::full(num_devices),
        allowed_remote_mds: Bitmap64::full(num_remote_mds),
    };
    // Seed diversity from the AM lane: its MD is taken, its device pair
    // already covered (spec §4.4.7).
    masks.allowed_remote_mds.clear(am_remote.md_index);
    masks.allowed_local_devices.clear(am_local.device_index);
    masks.allowed_remote_devices.clear(am_remote.device_index);

    let (lanes, _) = run_multi_lane(
        ctx.resources,
        remotes,
        reachable,
        params.estimated_endpoints,
        config.score_epsilon,
        masks,
        config.max_eager_lanes - 1,
        true,
        &needs_signaled_proxy,
        Diversity::Device,
        LaneUsage::AM_BW,
        &criteria,
        &|_| true,
        table,
    );

    if lanes.is_empty() {
        debug!("AM-BW pass: no additional lane placed");
    }
    lanes
}
