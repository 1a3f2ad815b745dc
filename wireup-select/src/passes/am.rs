//! AM pass (spec §4.4.3): the single Active Message lane. Runs whenever
//! AM is "needed" for any of several independent reasons; failure here is
//! fatal because nothing downstream can emulate AM.

use log::debug;

use crate::bitmap::Bitmap64;
use crate::caps::{EpFeatures, IfaceFlags};
use crate::config::WireupConfig;
use crate::context::{EpCreateParams, ReachableFn, WorkerContext};
use crate::criteria::{evaluate, Criteria, Masks};
use crate::error::SelectError;
use crate::lanes::{LaneTable, LaneUsage};
use crate::score::score_am;

use super::needs_signaled_proxy;

/// The AM lane's identity and score, threaded into later passes (TAG's
/// score-dominance test, AM-BW's seed).
#[derive(Debug, Clone, Copy)]
pub struct AmSelection {
    pub lane_idx: usize,
    pub local_resource: usize,
    pub remote_entry: usize,
    pub score: f64,
}

/// `true` if any lane already in the table uses a peer-to-peer transport
/// (spec §4.4.3 reason (d): AM is required to wire up such transports).
fn any_lane_is_peer_to_peer(table: &LaneTable, resources: &[crate::caps::TransportResource]) -> bool {
    table.lanes().iter().any(|lane| {
        resources
            .iter()
            .find(|r| r.resource_index == lane.local_resource)
            .map(|r| r.is_peer_to_peer())
            .unwrap_or(false)
    })
}

fn needed(params: &EpCreateParams, table: &LaneTable, resources: &[crate::caps::TransportResource], emulation_required: bool) -> bool {
    params.wireup_via_am
        || params.is_sockaddr
        || (!params.is_mem_type_copy
            && params
                .features
                .intersects(EpFeatures::TAG | EpFeatures::STREAM | EpFeatures::AM))
        || any_lane_is_peer_to_peer(table, resources)
        || emulation_required
}

/// Run the AM pass. `emulation_required` is set by the caller when an
/// earlier RMA/AMO pass failed and AM-emulation is permitted for the
/// endpoint's error-handling mode.
pub fn run(
    ctx: &WorkerContext,
    remotes: &[crate::caps::RemoteEntry],
    reachable: &ReachableFn,
    params: &EpCreateParams,
    config: &WireupConfig,
    table: &mut LaneTable,
    emulation_required: bool,
) -> Result<Option<AmSelection>, SelectError> {
    if !needed(params, table, ctx.resources, emulation_required) {
        debug!("AM pass: not needed, skipping");
        return Ok(None);
    }

    let mut local_iface = IfaceFlags::AM_BCOPY;
    if params.features.contains(EpFeatures::TAG) && params.features.contains(EpFeatures::WAKEUP) {
        local_iface |= IfaceFlags::EVENT_RECV;
    }

    let criteria = Criteria {
        title: "AM".to_string(),
        local_iface,
        remote_iface: IfaceFlags::AM_BCOPY | IfaceFlags::CB_SYNC,
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
        true,
    )?;

    let local = ctx
        .resources
        .iter()
        .find(|r| r.resource_index == info.local_resource)
        .expect("AM select_info references a real resource");
    let remote = remotes
        .iter()
        .find(|r| r.entry_index == info.remote_entry)
        .expect("AM select_info references a real remote entry");

    let is_proxy = needs_signaled_proxy(local, remote);
    let lane_idx = table.append(&info, remote.md_index, LaneUsage::AM, is_proxy);

    debug!(
        "AM pass: selected local {} / remote {} (score {:.3e}, proxy={is_proxy})",
        info.local_resource, info.remote_entry, info.score
    );

    Ok(Some(AmSelection {
        lane_idx,
        local_resource: info.local_resource,
        remote_entry: info.remote_entry,
        score: info.score,
    }))
}
