//! The finalizer (spec §4.5): turns the accumulated lane table into the
//! bit-stable endpoint configuration key.

use log::{info, warn};

use crate::bitmap::Bitmap64;
use crate::caps::{IfaceFlags, MdFlags, RemoteEntry, TransportResource};
use crate::config::{WireupConfig, LANE_NONE, MAX_LANES, MAX_OP_MDS};
use crate::lanes::{LaneTable, LaneUsage};
use crate::passes::am::AmSelection;

/// A single finalized lane: the ambient data the endpoint layer needs to
/// actually open it (spec §3's "lane descriptor" minus the scratch-only
/// scoring fields).
#[derive(Debug, Clone)]
pub struct LaneInfo {
    pub local_resource: usize,
    pub remote_entry: usize,
    pub proxy_lane: Option<usize>,
    pub remote_md: usize,
}

/// The selector's output: an endpoint configuration key (spec §3/§6).
#[derive(Debug, Clone)]
pub struct EpConfigKey {
    pub lanes: Vec<LaneInfo>,
    pub am_lane: Option<usize>,
    pub tag_lane: Option<usize>,
    /// Slot 0 is always `am_lane` when AM exists; remaining slots are
    /// sorted by decreasing AM-BW score, `LANE_NONE` trailing (spec I4).
    pub am_bw_lanes: [usize; MAX_LANES],
    pub rma_lanes: [usize; MAX_LANES],
    pub rma_bw_lanes: [usize; MAX_LANES],
    pub amo_lanes: [usize; MAX_LANES],
    pub wireup_lane: Option<usize>,
    /// Remote MDs (among `rma_bw_lanes`) whose remote key must be packed
    /// into the wireup message, bounded by `MAX_OP_MDS` (spec I6).
    pub rma_bw_md_map: Bitmap64,
    /// Set when RMA/AMO selection failed but AM-emulation is permitted
    /// for this endpoint's error-handling mode (spec §7).
    pub create_am_lane: bool,
}

impl EpConfigKey {
    pub fn lane_count(&self) -> usize {
        self.lanes.len()
    }
}

fn sorted_role_array(
    table: &LaneTable,
    usage: LaneUsage,
    score_of: impl Fn(&crate::lanes::LaneDescriptor) -> Option<f64>,
) -> [usize; MAX_LANES] {
    let mut members: Vec<(usize, f64)> = table
        .lanes()
        .iter()
        .enumerate()
        .filter(|(_, l)| l.usage.contains(usage))
        .map(|(idx, l)| (idx, score_of(l).unwrap_or(0.0)))
        .collect();
    // Stable sort: ties keep ascending-lane-index order (spec P5).
    members.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    let mut out = [LANE_NONE; MAX_LANES];
    for (slot, (idx, _)) in members.into_iter().take(MAX_LANES).enumerate() {
        out[slot] = idx;
    }
    out
}

fn build_am_bw_lanes(table: &LaneTable, am_lane: Option<usize>) -> [usize; MAX_LANES] {
    let mut out = [LANE_NONE; MAX_LANES];
    let Some(am_idx) = am_lane else {
        return sorted_role_array(table, LaneUsage::AM_BW, |l| l.score_am_bw);
    };

    out[0] = am_idx;
    let mut rest: Vec<(usize, f64)> = table
        .lanes()
        .iter()
        .enumerate()
        .filter(|(idx, l)| *idx != am_idx && l.usage.contains(LaneUsage::AM_BW))
        .map(|(idx, l)| (idx, l.score_am_bw.unwrap_or(0.0)))
        .collect();
    rest.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    for (slot, (idx, _)) in rest.into_iter().take(MAX_LANES - 1).enumerate() {
        out[slot + 1] = idx;
    }
    out
}

fn is_aux_capable(local: &TransportResource, remote: &RemoteEntry) -> bool {
    let need_local = IfaceFlags::CONNECT_TO_IFACE | IfaceFlags::AM_BCOPY | IfaceFlags::PENDING;
    let need_remote = IfaceFlags::CONNECT_TO_IFACE | IfaceFlags::AM_BCOPY | IfaceFlags::CB_ASYNC;
    local.iface_flags.contains(need_local) && remote.iface_flags.contains(need_remote)
}

fn elect_wireup_lane(
    table: &LaneTable,
    resources: &[TransportResource],
    remotes: &[RemoteEntry],
) -> Option<usize> {
    let resource_of = |idx: usize| resources.iter().find(|r| r.resource_index == idx);
    let remote_of = |idx: usize| remotes.iter().find(|r| r.entry_index == idx);

    for (idx, lane) in table.lanes().iter().enumerate() {
        if let (Some(local), Some(remote)) =
            (resource_of(lane.local_resource), remote_of(lane.remote_entry))
        {
            if is_aux_capable(local, remote) {
                return Some(idx);
            }
        }
    }

    // Fall back to any lane on a peer-to-peer transport.
    for (idx, lane) in table.lanes().iter().enumerate() {
        if let Some(local) = resource_of(lane.local_resource) {
            if local.is_peer_to_peer() {
                return Some(idx);
            }
        }
    }

    // Self-loopback needs no out-of-band bootstrap at all — the endpoint
    // talks to itself — so a lone self lane is its own wireup lane rather
    // than leaving the key without one.
    for (idx, lane) in table.lanes().iter().enumerate() {
        if let Some(local) = resource_of(lane.local_resource) {
            if local.device_type == crate::caps::DeviceType::SelfLoopback {
                return Some(idx);
            }
        }
    }

    None
}

fn build_rma_bw_md_map(
    table: &LaneTable,
    rma_bw_lanes: &[usize; MAX_LANES],
    resources: &[TransportResource],
    remotes: &[RemoteEntry],
    config: &WireupConfig,
) -> Bitmap64 {
    let mut map = Bitmap64::EMPTY;
    let mut count = 0usize;

    for &idx in rma_bw_lanes {
        if idx == LANE_NONE || count >= MAX_OP_MDS {
            break;
        }
        let lane = &table.lanes()[idx];
        let Some(local) = resources.iter().find(|r| r.resource_index == lane.local_resource) else {
            continue;
        };
        if config.rndv_md_excluded(local) {
            continue;
        }
        let needs_rkey = remotes
            .iter()
            .find(|r| r.md_index == lane.remote_md)
            .map(|r| r.md_flags.contains(MdFlags::NEEDS_RKEY))
            .unwrap_or(false);
        if needs_rkey && !map.contains(lane.remote_md) {
            map.set(lane.remote_md);
            count += 1;
        }
    }

    map
}

/// Build the endpoint configuration key from the accumulated lane table.
pub fn finalize(
    table: &LaneTable,
    resources: &[TransportResource],
    remotes: &[RemoteEntry],
    am: Option<&AmSelection>,
    tag_lane: Option<usize>,
    create_am_lane: bool,
    config: &WireupConfig,
) -> EpConfigKey {
    let lanes = table
        .lanes()
        .iter()
        .map(|l| LaneInfo {
            local_resource: l.local_resource,
            remote_entry: l.remote_entry,
            proxy_lane: l.proxy_lane,
            remote_md: l.remote_md,
        })
        .collect();

    let am_lane = am.map(|a| a.lane_idx);

    let rma_lanes = sorted_role_array(table, LaneUsage::RMA, |l| l.score_rma);
    let rma_bw_lanes = sorted_role_array(table, LaneUsage::RMA_BW, |l| l.score_rma_bw);
    let amo_lanes = sorted_role_array(table, LaneUsage::AMO, |l| l.score_amo);
    let am_bw_lanes = build_am_bw_lanes(table, am_lane);

    let wireup_lane = elect_wireup_lane(table, resources, remotes);
    if wireup_lane.is_none() && am_lane.is_none() {
        warn!("finalize: no wireup lane and no AM lane; bootstrap will fail");
    }

    let rma_bw_md_map = build_rma_bw_md_map(table, &rma_bw_lanes, resources, remotes, config);

    info!(
        "finalize: {} lane(s), am_lane={:?}, tag_lane={:?}, wireup_lane={:?}",
        table.len(),
        am_lane,
        tag_lane,
        wireup_lane
    );

    EpConfigKey {
        lanes,
        am_lane,
        tag_lane,
        am_bw_lanes,
        rma_lanes,
        rma_bw_lanes,
        amo_lanes,
        wireup_lane,
        rma_bw_md_map,
        create_am_lane,
    }
}
