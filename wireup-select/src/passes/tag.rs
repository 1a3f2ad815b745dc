//! TAG pass (spec §4.4.6): a single hardware-tag-matching lane, used only
//! when it actually beats software tag matching over the AM lane.

use log::debug;

use crate::bitmap::Bitmap64;
use crate::caps::{EpFeatures, ErrorMode, IfaceFlags};
use crate::config::WireupConfig;
use crate::context::{EpCreateParams, ReachableFn, WorkerContext};
use crate::criteria::{evaluate, Criteria, Masks};
use crate::lanes::{LaneTable, LaneUsage};
use crate::score::{score_am, scores_equal};

use super::{am::AmSelection, needs_signaled_proxy};

fn gated(params: &EpCreateParams) -> bool {
    params.features.contains(EpFeatures::TAG) && params.err_mode == ErrorMode::None
}

/// Run the TAG pass. Returns the lane index if a hardware tag-matching
/// lane was placed.
pub fn run(
    ctx: &WorkerContext,
    remotes: &[crate::caps::RemoteEntry],
    reachable: &ReachableFn,
    params: &EpCreateParams,
    config: &WireupConfig,
    table: &mut LaneTable,
    am: Option<&AmSelection>,
) -> Option<usize> {
    if !gated(params) {
        debug!("TAG pass: not requested or peer-error mode disables hardware tag matching");
        return None;
    }

    let required = IfaceFlags::TAG_EAGER_BCOPY
        | IfaceFlags::TAG_RNDV_ZCOPY
        | IfaceFlags::GET_ZCOPY
        | IfaceFlags::PENDING;

    let criteria = Criteria {
        title: "TAG".to_string(),
        local_iface: required,
        remote_iface: required,
        local_md: Default::default(),
        remote_md: Default::default(),
        local_atomic: Default::default(),
        remote_atomic: Default::default(),
        tl_rsc_flags: Default::default(),
        score_fn: score_am,
    };

    let num_devices = ctx.num_devices();
    let num_remote_mds = remotes.iter().map(|r| r.md_index + 1).max().unwrap_or(0);
    let masks = Masks {
        allowed_tls: Bitmap64::full(ctx.resources.len()),
        allowed_local_devices: Bitmap64::full(num_devices),
        allowed_remote_devices: Bitmap64::full(num_devices),
        allowed_remote_mds: Bitmap64::full(num_remote_mds),
    };

    let info = evaluate(
        &criteria,
        ctx.resources,
        remotes,
        &masks,
        reachable,
        params.estimated_endpoints,
        config.score_epsilon,
        false,
    )
    .ok()?;

    if let Some(am) = am {
        let beats_am = info.score >= am.score || scores_equal(info.score, am.score, config.score_epsilon);
        if !beats_am {
            debug!(
                "TAG pass: score {:.3e} does not beat AM lane's {:.3e}, leaving tags to AM",
                info.score, am.score
            );
            return None;
        }
    }

    let local = ctx
        .resources
        .iter()
        .find(|r| r.resource_index == info.local_resource)
        .expect("TAG select_info references a real resource");
    let remote = remotes
        .iter()
        .find(|r| r.entry_index == info.remote_entry)
        .expect("TAG select_info references a real remote entry");

    let is_proxy = needs_signaled_proxy(local, remote);
    let lane_idx = table.append(&info, remote.md_index, LaneUsage::TAG, is_proxy);

    debug!(
        "TAG pass: selected local {} / remote {} (score {:.3e})",
        info.local_resource, info.remote_entry, info.score
    );

    Some(lane_idx)
}
