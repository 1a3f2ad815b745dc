//! End-to-end fixtures for the six concrete wireup scenarios, exercised
//! through the public API only.

use wireup_select::{
    select_auxiliary, select_sockaddr_transport, select_wireup_lanes, AtomicCaps, CapRecord,
    DeviceType, EpCreateParams, EpFeatures, ErrorMode, IfaceFlags, MdFlags, MemTypeId,
    RemoteEntry, SelectError, SockaddrTransport, TlRscFlags, TransportResource, WireupConfig,
    WorkerContext,
};

fn cap(latency: f64, bandwidth: f64, overhead: f64) -> CapRecord {
    CapRecord {
        latency_overhead: latency,
        latency_growth: 0.0,
        bandwidth,
        overhead,
        reg_overhead: 1e-6,
        reg_growth: 1e-12,
        max_bcopy_size: 8192.0,
        priority: 0,
    }
}

fn resource(
    index: usize,
    device: usize,
    device_type: DeviceType,
    iface: IfaceFlags,
    md: MdFlags,
) -> TransportResource {
    TransportResource {
        resource_index: index,
        md_index: index,
        device_index: device,
        device_type,
        tl_name: format!("tl{index}"),
        rsc_flags: TlRscFlags::empty(),
        md_flags: md,
        iface_flags: iface,
        atomic: AtomicCaps::default(),
        caps: cap(1e-7, 10e9, 1e-7),
    }
}

fn remote(index: usize, device: usize, iface: IfaceFlags, md: MdFlags) -> RemoteEntry {
    RemoteEntry {
        entry_index: index,
        md_index: index,
        device_index: device,
        md_flags: md,
        tl_name_checksum: 0,
        iface_flags: iface,
        atomic: AtomicCaps::default(),
        caps: cap(1e-7, 10e9, 1e-7),
    }
}

#[test]
fn scenario_loopback_tag() {
    let local_iface = IfaceFlags::AM_SHORT
        | IfaceFlags::AM_BCOPY
        | IfaceFlags::TAG_EAGER_BCOPY
        | IfaceFlags::TAG_RNDV_ZCOPY
        | IfaceFlags::GET_ZCOPY
        | IfaceFlags::PENDING
        | IfaceFlags::CB_SYNC;

    let resources = vec![resource(0, 0, DeviceType::SelfLoopback, local_iface, MdFlags::REG)];
    let remotes = vec![remote(0, 0, local_iface, MdFlags::REG)];

    let ctx = WorkerContext::new(&resources);
    let params = EpCreateParams {
        features: EpFeatures::TAG,
        err_mode: ErrorMode::None,
        ..Default::default()
    };
    let config = WireupConfig::default();

    let key = select_wireup_lanes(&ctx, &remotes, &|_, _| true, &params, &config).unwrap();

    assert_eq!(key.lane_count(), 1);
    assert_eq!(key.am_lane, Some(0));
    assert_eq!(key.tag_lane, Some(0));
    assert_eq!(key.am_bw_lanes[0], 0);
    assert!(key.am_bw_lanes[1..].iter().all(|&l| l == wireup_select::LANE_NONE));
    assert_eq!(key.rma_lanes[0], wireup_select::LANE_NONE);
    assert_eq!(key.amo_lanes[0], wireup_select::LANE_NONE);
    assert_eq!(key.wireup_lane, Some(0));
}

#[test]
fn scenario_two_rail_rdma() {
    // Two network rails, identical capabilities, different devices/MDs.
    // Peer-to-peer (CONNECT_TO_EP) so AM-BW's proxy test stays negative.
    let iface = IfaceFlags::AM_BCOPY
        | IfaceFlags::CB_SYNC
        | IfaceFlags::GET_ZCOPY
        | IfaceFlags::PUT_ZCOPY
        | IfaceFlags::PENDING
        | IfaceFlags::CONNECT_TO_EP;

    let resources = vec![
        resource(0, 0, DeviceType::Network, iface, MdFlags::REG),
        resource(1, 1, DeviceType::Network, iface, MdFlags::REG),
    ];
    let remotes = vec![
        remote(0, 0, iface, MdFlags::REG),
        remote(1, 1, iface, MdFlags::REG),
    ];

    let ctx = WorkerContext::new(&resources);
    let params = EpCreateParams {
        features: EpFeatures::TAG,
        err_mode: ErrorMode::None,
        ..Default::default()
    };
    let config = WireupConfig {
        max_rndv_lanes: 4,
        max_eager_lanes: 2,
        ..Default::default()
    };

    let key = select_wireup_lanes(&ctx, &remotes, &|_, _| true, &params, &config).unwrap();

    assert_eq!(key.lane_count(), 2);
    let am_lane = key.am_lane.expect("AM lane selected");
    assert_eq!(key.am_bw_lanes[0], am_lane);
    let other = key.am_bw_lanes[1];
    assert_ne!(other, wireup_select::LANE_NONE);
    assert_ne!(other, am_lane);

    let rma_bw_present: Vec<usize> = key
        .rma_bw_lanes
        .iter()
        .copied()
        .filter(|&l| l != wireup_select::LANE_NONE)
        .collect();
    assert_eq!(rma_bw_present.len(), 2);
}

#[test]
fn scenario_am_emulation_fallback() {
    // AM-bcopy only, no PUT/GET: RMA pass fails, AM-emulation engages.
    let local_iface = IfaceFlags::AM_BCOPY | IfaceFlags::CB_SYNC | IfaceFlags::CONNECT_TO_EP;
    let remote_iface = IfaceFlags::AM_BCOPY | IfaceFlags::CB_SYNC;

    let resources = vec![resource(0, 0, DeviceType::Network, local_iface, MdFlags::REG)];
    let remotes = vec![remote(0, 0, remote_iface, MdFlags::REG)];

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
    assert_eq!(key.rma_lanes[0], wireup_select::LANE_NONE);
}

#[test]
fn scenario_proxy_lane() {
    // Remote only wakes on signaled receive; local is not peer-to-peer.
    let local_iface =
        IfaceFlags::AM_BCOPY | IfaceFlags::CB_SYNC | IfaceFlags::CONNECT_TO_IFACE | IfaceFlags::PENDING;
    let remote_iface = IfaceFlags::AM_BCOPY | IfaceFlags::CB_SYNC | IfaceFlags::EVENT_RECV_SIG;

    let resources = vec![resource(0, 0, DeviceType::Network, local_iface, MdFlags::REG)];
    let remotes = vec![remote(0, 0, remote_iface, MdFlags::REG)];

    let ctx = WorkerContext::new(&resources);
    let params = EpCreateParams {
        features: EpFeatures::AM,
        err_mode: ErrorMode::None,
        ..Default::default()
    };
    let config = WireupConfig::default();

    let key = select_wireup_lanes(&ctx, &remotes, &|_, _| true, &params, &config).unwrap();

    assert_eq!(key.lane_count(), 1);
    assert_eq!(key.am_lane, Some(0));
    assert_eq!(key.lanes[0].proxy_lane, Some(0));
}

#[test]
fn scenario_peer_error_mode() {
    let local_iface = IfaceFlags::AM_BCOPY | IfaceFlags::CB_SYNC | IfaceFlags::CONNECT_TO_EP;
    let remote_iface = IfaceFlags::AM_BCOPY | IfaceFlags::CB_SYNC;

    let resources = vec![resource(0, 0, DeviceType::Network, local_iface, MdFlags::REG)];
    let remotes = vec![remote(0, 0, remote_iface, MdFlags::REG)];

    let ctx = WorkerContext::new(&resources);
    let params = EpCreateParams {
        // RMA is requested alongside TAG so the RMA pass actually runs and
        // fails (this fixture advertises no PUT/GET) — peer error-handling
        // mode must then refuse to paper over that with AM-emulation.
        features: EpFeatures::TAG | EpFeatures::RMA,
        err_mode: ErrorMode::Peer,
        ..Default::default()
    };
    let config = WireupConfig::default();

    let err = select_wireup_lanes(&ctx, &remotes, &|_, _| true, &params, &config).unwrap_err();
    assert!(matches!(err, SelectError::Unreachable { .. }));
}

#[test]
fn scenario_sockaddr_client() {
    let unreachable = |_: &std::net::SocketAddr| false;
    let reachable = |_: &std::net::SocketAddr| true;
    let candidates = vec![
        SockaddrTransport {
            resource_index: 0,
            name: "rdmacm",
            reachable: &unreachable,
        },
        SockaddrTransport {
            resource_index: 1,
            name: "tcp",
            reachable: &reachable,
        },
    ];
    let addr: std::net::SocketAddr = "10.0.0.2:9999".parse().unwrap();
    let chosen = select_sockaddr_transport(&candidates, &addr).unwrap();
    assert_eq!(chosen, 1);
}

#[test]
fn auxiliary_selection_picks_aux_only_resource() {
    let local_iface = IfaceFlags::CONNECT_TO_IFACE | IfaceFlags::AM_BCOPY | IfaceFlags::PENDING;
    let remote_iface = IfaceFlags::CONNECT_TO_IFACE | IfaceFlags::AM_BCOPY | IfaceFlags::CB_ASYNC;

    let mut aux = resource(0, 0, DeviceType::Network, local_iface, MdFlags::REG);
    aux.rsc_flags = TlRscFlags::AUX_ONLY;

    let resources = vec![aux];
    let remotes = vec![remote(0, 0, remote_iface, MdFlags::REG)];
    let config = WireupConfig::default();

    let info = select_auxiliary(&resources, &remotes, &|_, _| true, 1, &config).unwrap();
    assert_eq!(info.local_resource, 0);
    assert_eq!(info.remote_entry, 0);
}

#[test]
fn zero_remote_entries_is_unreachable() {
    let resources = vec![resource(
        0,
        0,
        DeviceType::SelfLoopback,
        IfaceFlags::AM_BCOPY | IfaceFlags::CB_SYNC,
        MdFlags::REG,
    )];
    let ctx = WorkerContext::new(&resources);
    let params = EpCreateParams {
        features: EpFeatures::AM,
        ..Default::default()
    };
    let config = WireupConfig::default();

    let err = select_wireup_lanes(&ctx, &[], &|_, _| true, &params, &config).unwrap_err();
    assert!(matches!(err, SelectError::Unreachable { .. }));

    let mem_id = MemTypeId::HOST;
    assert_eq!(mem_id, MemTypeId::HOST);
}
