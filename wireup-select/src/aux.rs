//! Auxiliary-transport and sockaddr-transport selection (spec §4.6, §4.7):
//! two single-shot variants of the criteria evaluator used outside the
//! main lane-selection pass.

use crate::bitmap::Bitmap64;
use crate::caps::{IfaceFlags, RemoteEntry, TlRscFlags, TransportResource};
use crate::config::WireupConfig;
use crate::context::ReachableFn;
use crate::criteria::{evaluate, Criteria, Masks, SelectInfo};
use crate::error::SelectError;
use crate::score::score_aux;

/// Select the bootstrap transport used to exchange wireup (address
/// -exchange) messages, before the main lane-selection pass runs. Failure
/// is fatal for endpoint creation.
pub fn select_auxiliary(
    resources: &[TransportResource],
    remotes: &[RemoteEntry],
    reachable: &ReachableFn,
    estimated_endpoints: u32,
    config: &WireupConfig,
) -> Result<SelectInfo, SelectError> {
    let criteria = Criteria {
        title: "auxiliary".to_string(),
        local_iface: IfaceFlags::CONNECT_TO_IFACE | IfaceFlags::AM_BCOPY | IfaceFlags::PENDING,
        remote_iface: IfaceFlags::CONNECT_TO_IFACE | IfaceFlags::AM_BCOPY | IfaceFlags::CB_ASYNC,
        local_md: Default::default(),
        remote_md: Default::default(),
        local_atomic: Default::default(),
        remote_atomic: Default::default(),
        tl_rsc_flags: TlRscFlags::AUX_ONLY,
        score_fn: score_aux,
    };

    let num_devices = resources.iter().map(|r| r.device_index + 1).max().unwrap_or(0);
    let num_remote_mds = remotes.iter().map(|r| r.md_index + 1).max().unwrap_or(0);
    let masks = Masks {
        allowed_tls: Bitmap64::full(resources.len()),
        allowed_local_devices: Bitmap64::full(num_devices),
        allowed_remote_devices: Bitmap64::full(num_devices),
        allowed_remote_mds: Bitmap64::full(num_remote_mds),
    };

    evaluate(
        &criteria,
        resources,
        remotes,
        &masks,
        reachable,
        estimated_endpoints,
        config.score_epsilon,
        true,
    )
}

/// A sockaddr-capable local transport, in the context's priority order.
pub struct SockaddrTransport<'a> {
    pub resource_index: usize,
    pub name: &'a str,
    /// `true` if this transport can reach the given remote socket address.
    pub reachable: &'a dyn Fn(&std::net::SocketAddr) -> bool,
}

/// Select the client-side sockaddr transport (spec §4.7): iterate the
/// context's ordered sockaddr-capable transport list and return the first
/// one that reports the remote address reachable. Never scans the remote
/// address list — the remote here is a socket address, not a UCX address.
pub fn select_sockaddr_transport(
    candidates: &[SockaddrTransport<'_>],
    remote_addr: &std::net::SocketAddr,
) -> Result<usize, SelectError> {
    for candidate in candidates {
        if (candidate.reachable)(remote_addr) {
            return Ok(candidate.resource_index);
        }
    }
    Err(SelectError::Unreachable {
        pass: "sockaddr".to_string(),
        reason: format!(
            "no sockaddr-capable transport could reach {remote_addr} ({} candidates tried)",
            candidates.len()
        ),
    })
}
