//! RMA-BW pass (spec §4.4.4): zero-copy bandwidth lanes for rendezvous
//! payloads (or cross-memory-type staging).

use log::debug;

use crate::bitmap::Bitmap64;
use crate::caps::{EpFeatures, IfaceFlags, MdFlags};
use crate::config::WireupConfig;
use crate::context::{EpCreateParams, ReachableFn, WorkerContext};
use crate::criteria::{Criteria, Masks};
use crate::lanes::{LaneTable, LaneUsage};
use crate::score::score_rma_bw;

use super::{run_multi_lane, Diversity};

fn gated(params: &EpCreateParams) -> bool {
    params.is_mem_type_copy || params.features.contains(EpFeatures::TAG)
}

/// Run the RMA-BW pass. Returns `true` if at least one lane was placed.
pub fn run(
    ctx: &WorkerContext,
    remotes: &[crate::caps::RemoteEntry],
    reachable: &ReachableFn,
    params: &EpCreateParams,
    config: &WireupConfig,
    table: &mut LaneTable,
) -> bool {
    if !gated(params) {
        debug!("RMA-BW pass: not requested, skipping");
        return false;
    }

    let md_flags = if params.features.contains(EpFeatures::TAG) {
        MdFlags::REG
    } else {
        MdFlags::empty()
    };

    let criteria = Criteria {
        title: "RMA-BW".to_string(),
        local_iface: IfaceFlags::GET_ZCOPY | IfaceFlags::PUT_ZCOPY | IfaceFlags::PENDING,
        remote_iface: IfaceFlags::GET_ZCOPY | IfaceFlags::PUT_ZCOPY,
        local_md: md_flags,
        remote_md: md_flags,
        local_atomic: Default::default(),
        remote_atomic: Default::default(),
        tl_rsc_flags: Default::default(),
        score_fn: score_rma_bw,
    };

    let num_devices = ctx.num_devices();
    let num_remote_mds = remotes.iter().map(|r| r.md_index + 1).max().unwrap_or(0);
    let mut placed_any = false;
    let mut remaining_budget = config.max_rndv_lanes;

    for (mem_type, mem_type_tls) in &ctx.mem_type_access_tls {
        if remaining_budget == 0 {
            break;
        }
        let masks = Masks {
            allowed_tls: *mem_type_tls,
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
            remaining_budget,
            false,
            &|_, _| false,
            Diversity::Device,
            LaneUsage::RMA_BW,
            &criteria,
            &|_| true,
            table,
        );

        if !lanes.is_empty() {
            debug!(
                "RMA-BW pass: {} lane(s) for memory type {:?}",
                lanes.len(),
                mem_type
            );
            placed_any = true;
            remaining_budget -= lanes.len();
        }
    }

    if !placed_any {
        debug!("RMA-BW pass: no lane placed");
    }
    placed_any
}
