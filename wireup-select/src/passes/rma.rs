//! RMA pass (spec §4.4.1): PUT/GET lanes for the protocol layer's direct
//! remote-memory-access path.

use log::debug;

use crate::bitmap::Bitmap64;
use crate::caps::{EpFeatures, IfaceFlags, MdFlags};
use crate::config::WireupConfig;
use crate::context::{EpCreateParams, ReachableFn, WorkerContext};
use crate::criteria::{Criteria, Masks};
use crate::lanes::{LaneTable, LaneUsage};
use crate::score::{is_better, score_rma};

use super::{run_multi_lane, Diversity};

fn gated(params: &EpCreateParams) -> bool {
    params.features.contains(EpFeatures::RMA) || params.is_mem_type_copy
}

fn criteria_for(params: &EpCreateParams, remote_md: MdFlags) -> Criteria {
    let (remote_iface, local_extra) = if params.is_mem_type_copy {
        (IfaceFlags::PUT_SHORT, IfaceFlags::empty())
    } else {
        (
            IfaceFlags::PUT_SHORT | IfaceFlags::PUT_BCOPY | IfaceFlags::GET_BCOPY,
            IfaceFlags::empty(),
        )
    };
    Criteria {
        title: "RMA".to_string(),
        local_iface: remote_iface | IfaceFlags::PENDING | local_extra,
        remote_iface,
        local_md: MdFlags::empty(),
        remote_md,
        local_atomic: Default::default(),
        remote_atomic: Default::default(),
        tl_rsc_flags: Default::default(),
        score_fn: score_rma,
    }
}

/// Run the RMA pass. Returns `true` if at least one lane was placed.
pub fn run(
    ctx: &WorkerContext,
    remotes: &[crate::caps::RemoteEntry],
    reachable: &ReachableFn,
    params: &EpCreateParams,
    config: &WireupConfig,
    table: &mut LaneTable,
) -> bool {
    if !gated(params) {
        debug!("RMA pass: not requested, skipping");
        return false;
    }

    let num_devices = ctx.num_devices();
    let num_remote_mds = remotes.iter().map(|r| r.md_index + 1).max().unwrap_or(0);
    let masks = Masks {
        allowed_tls: Bitmap64::full(ctx.resources.len()),
        allowed_local_devices: Bitmap64::full(num_devices),
        allowed_remote_devices: Bitmap64::full(num_devices),
        allowed_remote_mds: Bitmap64::full(num_remote_mds),
    };

    // Phase 1: REG-backed remote memory.
    let reg_criteria = criteria_for(params, MdFlags::REG);
    let (reg_lanes, masks_after_reg) = run_multi_lane(
        ctx.resources,
        remotes,
        reachable,
        params.estimated_endpoints,
        config.score_epsilon,
        masks,
        config.max_rma_lanes,
        false,
        &|_, _| false,
        Diversity::RemoteMd,
        LaneUsage::RMA,
        &reg_criteria,
        &|_| true,
        table,
    );

    let reg_score = reg_lanes
        .last()
        .and_then(|&idx| table.lanes()[idx].score_rma);

    let mut placed = !reg_lanes.is_empty();

    // Phase 2: peer-allocated memory, admitted only if it strictly beats
    // the registered-memory score (spec §4.4.5).
    if config.max_rma_lanes > reg_lanes.len() {
        let alloc_criteria = criteria_for(params, MdFlags::ALLOC);
        let eps = config.score_epsilon;
        let accept: Box<dyn Fn(f64) -> bool> = match reg_score {
            Some(reg) => Box::new(move |score: f64| is_better(score, reg, eps)),
            None => Box::new(|_| true),
        };
        let (alloc_lanes, _) = run_multi_lane(
            ctx.resources,
            remotes,
            reachable,
            params.estimated_endpoints,
            eps,
            masks_after_reg,
            config.max_rma_lanes - reg_lanes.len(),
            false,
            &|_, _| false,
            Diversity::RemoteMd,
            LaneUsage::RMA,
            &alloc_criteria,
            accept.as_ref(),
            table,
        );
        placed |= !alloc_lanes.is_empty();
    }

    if !placed {
        debug!("RMA pass: no lane placed");
    }
    placed
}
