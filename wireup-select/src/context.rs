//! Inputs to a selection call: the worker-side resources and the
//! per-endpoint creation parameters (spec §6's external interface).

use crate::bitmap::Bitmap64;
use crate::caps::{AtomicRequirement, EpFeatures, ErrorMode, MemTypeId, TransportResource};

/// A reachability predicate: `(local_resource, remote_entry) -> bool`.
/// Supplied by the transport layer; typically checks transport-name
/// checksum plus local-device-can-address-remote-device.
pub type ReachableFn<'a> = dyn Fn(&TransportResource, &crate::caps::RemoteEntry) -> bool + 'a;

/// The worker-side view the selector consumes: the local resource list
/// plus the context-level policy inputs that aren't per-resource.
pub struct WorkerContext<'a> {
    pub resources: &'a [TransportResource],
    /// Per-memory-type allowed-transport bitmaps (spec §4.4.4: the RMA-BW
    /// pass runs once per memory type the context advertises access
    /// transports for).
    pub mem_type_access_tls: Vec<(MemTypeId, Bitmap64)>,
    /// Resources allowed to serve atomics even when peer-to-peer (spec
    /// §4.4.2's "explicitly designated as atomic-capable").
    pub atomic_capable_tls: Bitmap64,
}

impl<'a> WorkerContext<'a> {
    pub fn new(resources: &'a [TransportResource]) -> Self {
        let mut host_mask = Bitmap64::EMPTY;
        for r in resources {
            host_mask.set(r.resource_index);
        }
        Self {
            resources,
            mem_type_access_tls: vec![(MemTypeId::HOST, host_mask)],
            atomic_capable_tls: Bitmap64::EMPTY,
        }
    }

    pub fn num_devices(&self) -> usize {
        self.resources
            .iter()
            .map(|r| r.device_index + 1)
            .max()
            .unwrap_or(0)
    }

    /// Non-peer-to-peer resources, plus any explicitly atomic-capable
    /// override (spec §4.4.2).
    pub fn atomic_allowed_tls(&self) -> Bitmap64 {
        let mut mask = Bitmap64::EMPTY;
        for r in self.resources {
            if !r.is_peer_to_peer() || r.is_atomic_capable_override() {
                mask.set(r.resource_index);
            }
        }
        mask.union(&self.atomic_capable_tls)
    }
}

/// Endpoint-creation parameters (spec §6).
#[derive(Debug, Clone)]
pub struct EpCreateParams {
    pub features: EpFeatures,
    pub err_mode: ErrorMode,
    pub is_sockaddr: bool,
    /// The endpoint exists only to stage cross-memory-type copies.
    pub is_mem_type_copy: bool,
    /// The creator requested wireup bootstrap over the AM lane itself
    /// rather than a separate auxiliary transport.
    pub wireup_via_am: bool,
    pub requested_atomics: AtomicRequirement,
    /// Estimate of how many endpoints this worker will end up with;
    /// feeds the latency-growth term (spec §4.1).
    pub estimated_endpoints: u32,
}

impl Default for EpCreateParams {
    fn default() -> Self {
        Self {
            features: EpFeatures::empty(),
            err_mode: ErrorMode::None,
            is_sockaddr: false,
            is_mem_type_copy: false,
            wireup_via_am: false,
            requested_atomics: AtomicRequirement::default(),
            estimated_endpoints: 1,
        }
    }
}
