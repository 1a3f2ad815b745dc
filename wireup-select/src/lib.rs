//! Wireup lane selector for a UCX-style communication framework.
//!
//! Sits between the high-level tagged-messaging / active-message / RMA /
//! atomics protocol API and the low-level transport abstraction. Given a
//! worker's available local transports and a remote worker's advertised
//! transports, [`select_wireup_lanes`] decides which concrete transport
//! "lanes" a newly opened endpoint will use for each class of operation.
//!
//! This crate does not open connections, pack/unpack addresses, or
//! instantiate endpoints — those are the caller's job. It only turns
//! capability bitmasks and performance numbers into a small, ordered set
//! of lane assignments.
//!
//! ## Quick start
//!
//! ```no_run
//! use wireup_select::{select_wireup_lanes, EpCreateParams, WireupConfig, WorkerContext};
//!
//! # fn example(resources: &[wireup_select::TransportResource], remotes: &[wireup_select::RemoteEntry]) {
//! let ctx = WorkerContext::new(resources);
//! let params = EpCreateParams::default();
//! let config = WireupConfig::default();
//! let reachable = |_: &wireup_select::TransportResource, _: &wireup_select::RemoteEntry| true;
//!
//! match select_wireup_lanes(&ctx, remotes, &reachable, &params, &config) {
//!     Ok(key) => println!("selected {} lane(s)", key.lane_count()),
//!     Err(e) => eprintln!("wireup selection failed: {e}"),
//! }
//! # }
//! ```

mod aux;
mod bitmap;
mod caps;
mod config;
mod context;
mod criteria;
mod error;
mod finalize;
mod lanes;
mod passes;
mod score;

pub use aux::{select_auxiliary, select_sockaddr_transport, SockaddrTransport};
pub use bitmap::Bitmap64;
pub use caps::{
    AtomicCaps, AtomicOpFlags, AtomicRequirement, CapRecord, DeviceType, EpFeatures, ErrorMode,
    IfaceFlags, MdFlags, MemTypeId, RemoteEntry, TlRscFlags, TransportResource,
};
pub use config::{WireupConfig, LANE_NONE, MAX_LANES, MAX_OP_MDS};
pub use context::{EpCreateParams, ReachableFn, WorkerContext};
pub use error::{SelectError, SelectResult};
pub use finalize::{EpConfigKey, LaneInfo};

use log::{debug, info};

/// Run the full six-pass wireup lane selection (spec §2/§4.4) and emit the
/// endpoint configuration key.
///
/// Returns [`SelectError::Unreachable`] when the remote address list is
/// empty, when the mandatory AM pass fails, or when the final lane count
/// is zero; returns [`SelectError::InvalidParam`] when the declared
/// features are inconsistent with what any transport can satisfy.
pub fn select_wireup_lanes(
    ctx: &WorkerContext,
    remotes: &[RemoteEntry],
    reachable: &ReachableFn,
    params: &EpCreateParams,
    config: &WireupConfig,
) -> SelectResult<EpConfigKey> {
    if remotes.is_empty() {
        return Err(SelectError::Unreachable {
            pass: "address-list".to_string(),
            reason: "remote worker advertised no transports".to_string(),
        });
    }
    if params.features.contains(EpFeatures::TAG)
        && !ctx.resources.iter().any(|r| {
            r.iface_flags
                .intersects(IfaceFlags::TAG_EAGER_BCOPY | IfaceFlags::AM_BCOPY)
        })
    {
        // Hardware tag matching (`tag::run`, spec §4.4.6) is one option, but
        // a resource missing it can still carry tags in software over the AM
        // lane (spec §8 scenarios 2/5 request TAG with no TAG_EAGER_BCOPY
        // anywhere). Only reject up front when neither path could ever work.
        return Err(SelectError::InvalidParam(
            "TAG feature requested but no local transport can carry tags in hardware or software"
                .to_string(),
        ));
    }

    let mut table = lanes::LaneTable::new();

    debug!("select_wireup_lanes: starting ({} remote entries)", remotes.len());

    let rma_requested = params.features.contains(EpFeatures::RMA) || params.is_mem_type_copy;
    let amo_requested = !params.is_mem_type_copy
        && (params.features.contains(EpFeatures::AMO32) || params.features.contains(EpFeatures::AMO64))
        && !params.requested_atomics.is_empty();

    let rma_placed = passes::rma::run(ctx, remotes, reachable, params, config, &mut table);
    let amo_placed = passes::amo::run(ctx, remotes, reachable, params, config, &mut table);

    let rma_failed = rma_requested && !rma_placed;
    let amo_failed = amo_requested && !amo_placed;
    let mut create_am_lane = false;
    let mut emulation_required = false;

    if rma_failed || amo_failed {
        if params.err_mode == ErrorMode::Peer {
            // Peer-error-handling mode disables AM-emulation: it has no
            // keep-alive, so a silent RMA/AMO downgrade would hide a
            // connectivity problem the caller specifically asked to be
            // told about (spec §7, scenario 5).
            return Err(SelectError::Unreachable {
                pass: "RMA/AMO".to_string(),
                reason: "no lane placed and AM-emulation is disabled under peer error-handling"
                    .to_string(),
            });
        }
        debug!("RMA/AMO selection failed; falling back to AM-emulation");
        create_am_lane = true;
        emulation_required = true;
    }

    let am = passes::am::run(ctx, remotes, reachable, params, config, &mut table, emulation_required)?;

    passes::rma_bw::run(ctx, remotes, reachable, params, config, &mut table);

    let tag_lane = passes::tag::run(ctx, remotes, reachable, params, config, &mut table, am.as_ref());

    if let Some(am) = &am {
        passes::am_bw::run(ctx, remotes, reachable, params, config, &mut table, am);
    }

    if table.is_empty() {
        return Err(SelectError::Unreachable {
            pass: "wireup".to_string(),
            reason: "no transport satisfied any requested role".to_string(),
        });
    }

    let key = finalize::finalize(
        &table,
        ctx.resources,
        remotes,
        am.as_ref(),
        tag_lane,
        create_am_lane,
        config,
    );

    info!(
        "select_wireup_lanes: done, {} lane(s) selected",
        key.lane_count()
    );

    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cap(latency: f64, bw: f64, overhead: f64) -> CapRecord {
        CapRecord {
            latency_overhead: latency,
            latency_growth: 0.0,
            bandwidth: bw,
            overhead,
            reg_overhead: 1e-6,
            reg_growth: 1e-12,
            max_bcopy_size: 8192.0,
            priority: 0,
        }
    }

    fn loopback_resource() -> TransportResource {
        TransportResource {
            resource_index: 0,
            md_index: 0,
            device_index: 0,
            device_type: DeviceType::SelfLoopback,
            tl_name: "self".into(),
            rsc_flags: TlRscFlags::empty(),
            md_flags: MdFlags::REG,
            iface_flags: IfaceFlags::AM_SHORT
                | IfaceFlags::AM_BCOPY
                | IfaceFlags::TAG_EAGER_BCOPY
                | IfaceFlags::TAG_RNDV_ZCOPY
                | IfaceFlags::GET_ZCOPY
                | IfaceFlags::PENDING
                | IfaceFlags::CB_SYNC,
            atomic: AtomicCaps::default(),
            caps: cap(1e-8, 50e9, 1e-8),
        }
    }

    fn loopback_remote() -> RemoteEntry {
        RemoteEntry {
            entry_index: 0,
            md_index: 0,
            device_index: 0,
            md_flags: MdFlags::REG,
            tl_name_checksum: 0,
            iface_flags: IfaceFlags::AM_SHORT
                | IfaceFlags::AM_BCOPY
                | IfaceFlags::TAG_EAGER_BCOPY
                | IfaceFlags::TAG_RNDV_ZCOPY
                | IfaceFlags::GET_ZCOPY
                | IfaceFlags::PENDING
                | IfaceFlags::CB_SYNC,
            atomic: AtomicCaps::default(),
            caps: cap(1e-8, 50e9, 1e-8),
        }
    }

    #[test]
    fn empty_remote_list_is_unreachable() {
        let resources = vec![loopback_resource()];
        let ctx = WorkerContext::new(&resources);
        let params = EpCreateParams {
            features: EpFeatures::TAG,
            ..Default::default()
        };
        let config = WireupConfig::default();
        let err = select_wireup_lanes(&ctx, &[], &|_, _| true, &params, &config).unwrap_err();
        assert!(matches!(err, SelectError::Unreachable { .. }));
    }

    #[test]
    fn loopback_tag_scenario() {
        let resources = vec![loopback_resource()];
        let remotes = vec![loopback_remote()];
        let ctx = WorkerContext::new(&resources);
        let params = EpCreateParams {
            features: EpFeatures::TAG,
            ..Default::default()
        };
        let config = WireupConfig::default();
        let key = select_wireup_lanes(&ctx, &remotes, &|_, _| true, &params, &config).unwrap();

        assert_eq!(key.lane_count(), 1);
        assert_eq!(key.am_lane, Some(0));
        assert_eq!(key.tag_lane, Some(0));
        assert_eq!(key.am_bw_lanes[0], 0);
        assert_eq!(key.am_bw_lanes[1], LANE_NONE);
        assert_eq!(key.rma_lanes[0], LANE_NONE);
        assert_eq!(key.amo_lanes[0], LANE_NONE);
        assert_eq!(key.wireup_lane, Some(0));
    }

    #[test]
    fn tag_without_any_tag_or_am_capable_transport_is_invalid_param() {
        let mut r = loopback_resource();
        r.iface_flags.remove(IfaceFlags::TAG_EAGER_BCOPY);
        r.iface_flags.remove(IfaceFlags::AM_BCOPY);
        let resources = vec![r];
        let remotes = vec![loopback_remote()];
        let ctx = WorkerContext::new(&resources);
        let params = EpCreateParams {
            features: EpFeatures::TAG,
            ..Default::default()
        };
        let config = WireupConfig::default();
        let err = select_wireup_lanes(&ctx, &remotes, &|_, _| true, &params, &config).unwrap_err();
        assert!(matches!(err, SelectError::InvalidParam(_)));
    }

    #[test]
    fn tag_without_hardware_tag_matching_falls_back_to_software_over_am() {
        // No TAG_EAGER_BCOPY anywhere, but AM is available: TAG must not be
        // rejected up front — the TAG pass just declines and tags ride the
        // AM lane instead (spec §8 scenarios 2/5).
        let mut r = loopback_resource();
        r.iface_flags.remove(IfaceFlags::TAG_EAGER_BCOPY);
        r.iface_flags.remove(IfaceFlags::TAG_RNDV_ZCOPY);
        let resources = vec![r];
        let mut remote = loopback_remote();
        remote.iface_flags.remove(IfaceFlags::TAG_EAGER_BCOPY);
        remote.iface_flags.remove(IfaceFlags::TAG_RNDV_ZCOPY);
        let remotes = vec![remote];
        let ctx = WorkerContext::new(&resources);
        let params = EpCreateParams {
            features: EpFeatures::TAG,
            ..Default::default()
        };
        let config = WireupConfig::default();
        let key = select_wireup_lanes(&ctx, &remotes, &|_, _| true, &params, &config).unwrap();

        assert!(key.am_lane.is_some());
        assert_eq!(key.tag_lane, None);
    }

    #[test]
    fn rma_emulation_fallback_sets_create_am_lane() {
        // Local only advertises AM, no PUT/GET: RMA pass fails, AM lane
        // still gets created and `create_am_lane` is set (spec §8 scenario 3).
        let mut r = loopback_resource();
        r.device_type = DeviceType::Network;
        r.iface_flags = IfaceFlags::AM_BCOPY | IfaceFlags::CB_SYNC | IfaceFlags::CONNECT_TO_EP;
        let mut remote = loopback_remote();
        remote.iface_flags = IfaceFlags::AM_BCOPY | IfaceFlags::CB_SYNC;

        let resources = vec![r];
        let remotes = vec![remote];
        let ctx = WorkerContext::new(&resources);
        let params = EpCreateParams {
            features: EpFeatures::RMA,
            err_mode: ErrorMode::None,
            ..Default::default()
        };
        let config = WireupConfig::default();
        let key = select_wireup_lanes(&ctx, &remotes, &|_, _| true, &params, &config).unwrap();

        assert!(key.create_am_lane);
        assert!(key.am_lane.is_some());
        assert_eq!(key.rma_lanes[0], LANE_NONE);
    }

    #[test]
    fn peer_error_mode_does_not_emulate_rma() {
        let mut r = loopback_resource();
        r.device_type = DeviceType::Network;
        r.iface_flags = IfaceFlags::AM_BCOPY | IfaceFlags::CB_SYNC | IfaceFlags::CONNECT_TO_EP;
        let mut remote = loopback_remote();
        remote.iface_flags = IfaceFlags::AM_BCOPY | IfaceFlags::CB_SYNC;

        let resources = vec![r];
        let remotes = vec![remote];
        let ctx = WorkerContext::new(&resources);
        let params = EpCreateParams {
            features: EpFeatures::RMA,
            err_mode: ErrorMode::Peer,
            ..Default::default()
        };
        let config = WireupConfig::default();
        let err = select_wireup_lanes(&ctx, &remotes, &|_, _| true, &params, &config).unwrap_err();
        assert!(matches!(err, SelectError::Unreachable { .. }));
    }

    #[test]
    fn atomic_op_flags_smoke() {
        // Sanity: make sure the re-exported flag types compose as bitflags.
        let f = AtomicOpFlags::ADD | AtomicOpFlags::CSWAP;
        assert!(f.contains(AtomicOpFlags::ADD));
        assert!(!f.contains(AtomicOpFlags::SWAP));
    }
}
