//! The six role passes (spec §4.4) and the multi-lane loop they share.

pub mod am;
pub mod am_bw;
pub mod amo;
pub mod rma;
pub mod rma_bw;
pub mod tag;

use std::collections::HashSet;

use log::debug;

use crate::caps::{RemoteEntry, TransportResource};
use crate::context::ReachableFn;
use crate::criteria::{evaluate, Criteria, Masks};
use crate::lanes::{LaneTable, LaneUsage};

/// How a multi-lane loop diversifies across successive iterations.
pub enum Diversity {
    /// Mask off the remote MD just used, plus every local resource
    /// sharing the chosen local MD (spec §4.4.5, RMA/AMO family).
    RemoteMd,
    /// Mask off the local and remote device just used (spec §4.4.5,
    /// RMA-BW/AM-BW family).
    Device,
}

fn apply_diversity(
    diversity: &Diversity,
    masks: &mut Masks,
    chosen_local: &TransportResource,
    chosen_remote: &RemoteEntry,
    all_resources: &[TransportResource],
) {
    match diversity {
        Diversity::RemoteMd => {
            masks.allowed_remote_mds.clear(chosen_remote.md_index);
            for r in all_resources {
                if r.md_index == chosen_local.md_index {
                    masks.allowed_tls.clear(r.resource_index);
                }
            }
        }
        Diversity::Device => {
            masks.allowed_local_devices.clear(chosen_local.device_index);
            masks.allowed_remote_devices.clear(chosen_remote.device_index);
        }
    }
}

/// Shared multi-lane loop driving the criteria evaluator to exhaustion
/// for roles that may claim several parallel lanes (spec §4.4.5).
///
/// `accept` lets a caller reject an otherwise-winning candidate without
/// stopping the loop's bookkeeping (used by RMA's two-phase REG/ALLOC
/// variant, which keeps looking as long as a strictly-better `ALLOC`
/// candidate might still appear — though in practice a single rejection
/// already means no further candidate can beat `reg_score` and the loop
/// should stop; see `rma.rs`).
#[allow(clippy::too_many_arguments)]
pub fn run_multi_lane(
    resources: &[TransportResource],
    remotes: &[RemoteEntry],
    reachable: &ReachableFn,
    estimated_endpoints: u32,
    eps: f64,
    mut masks: Masks,
    max_lanes: usize,
    allow_proxy: bool,
    proxy_test: &dyn Fn(&TransportResource, &RemoteEntry) -> bool,
    diversity: Diversity,
    usage: LaneUsage,
    criteria: &Criteria,
    accept: &dyn Fn(f64) -> bool,
    table: &mut LaneTable,
) -> (Vec<usize>, Masks) {
    const MAX_OP_MDS: usize = crate::config::MAX_OP_MDS;

    let mut added = Vec::new();
    let mut remote_mds_used: HashSet<usize> = HashSet::new();

    while added.len() < max_lanes && remote_mds_used.len() < MAX_OP_MDS {
        let info = match evaluate(criteria, resources, remotes, &masks, reachable, estimated_endpoints, eps, false) {
            Ok(info) => info,
            Err(_) => break,
        };

        if !accept(info.score) {
            debug!("multi-lane '{}': candidate score {:.3e} rejected by accept()", criteria.title, info.score);
            break;
        }

        let local = resources
            .iter()
            .find(|r| r.resource_index == info.local_resource)
            .expect("select_info local_resource must reference a real resource");
        let remote = remotes
            .iter()
            .find(|r| r.entry_index == info.remote_entry)
            .expect("select_info remote_entry must reference a real remote entry");

        let is_proxy = allow_proxy && proxy_test(local, remote);
        let lane_idx = table.append(&info, remote.md_index, usage, is_proxy);
        added.push(lane_idx);
        remote_mds_used.insert(remote.md_index);

        let stop_after_this = local.device_type.terminates_diversity_loop();
        apply_diversity(&diversity, &mut masks, local, remote, resources);

        if stop_after_this {
            debug!(
                "multi-lane '{}': stopping after self/shm resource {}",
                criteria.title, local.resource_index
            );
            break;
        }
    }

    (added, masks)
}

/// Proxy test shared by AM, TAG and AM-BW (spec §4.4.3): the chosen local
/// resource is not peer-to-peer, yet the remote interface only wakes on
/// signaled receive events.
pub fn needs_signaled_proxy(local: &TransportResource, remote: &RemoteEntry) -> bool {
    use crate::caps::IfaceFlags;
    !local.is_peer_to_peer()
        && remote.iface_flags.contains(IfaceFlags::EVENT_RECV_SIG)
        && !remote.iface_flags.contains(IfaceFlags::EVENT_RECV)
}
