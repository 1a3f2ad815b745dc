//! Capability flag universe and the local/remote data model (spec §3).

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Interface-capability flags. Fixed, enumerated universe — spec §3.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub struct IfaceFlags: u32 {
        const AM_SHORT          = 1 << 0;
        const AM_BCOPY          = 1 << 1;
        const AM_ZCOPY          = 1 << 2;
        const PUT_SHORT         = 1 << 3;
        const PUT_BCOPY         = 1 << 4;
        const PUT_ZCOPY         = 1 << 5;
        const GET_SHORT         = 1 << 6;
        const GET_BCOPY         = 1 << 7;
        const GET_ZCOPY         = 1 << 8;
        const TAG_EAGER_SHORT   = 1 << 9;
        const TAG_EAGER_BCOPY   = 1 << 10;
        const TAG_EAGER_ZCOPY   = 1 << 11;
        const TAG_RNDV_ZCOPY    = 1 << 12;
        const CONNECT_TO_IFACE  = 1 << 13;
        const CONNECT_TO_EP     = 1 << 14;
        const PENDING           = 1 << 15;
        /// AM receive callback is invoked synchronously from progress.
        const CB_SYNC           = 1 << 16;
        /// AM receive callback may be invoked asynchronously (e.g. from a
        /// separate completion thread).
        const CB_ASYNC          = 1 << 17;
        const EVENT_SEND_COMP   = 1 << 18;
        /// The interface wakes on unsignaled receives.
        const EVENT_RECV        = 1 << 19;
        /// The interface only wakes on explicitly signaled receives.
        const EVENT_RECV_SIG    = 1 << 20;
        const RELIABLE          = 1 << 21;
        const ERR_HANDLING      = 1 << 22;
    }
}

bitflags! {
    /// Memory-domain flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub struct MdFlags: u32 {
        /// The MD supports registering caller-supplied memory.
        const REG   = 1 << 0;
        /// The MD can allocate memory of its own that is reachable remotely.
        const ALLOC = 1 << 1;
        /// Remote access to memory on this MD requires packing a remote key.
        const NEEDS_RKEY = 1 << 2;
    }
}

bitflags! {
    /// Per-op atomic flags, shared by the four (width x fetching) sets.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
    pub struct AtomicOpFlags: u32 {
        const ADD   = 1 << 0;
        const AND   = 1 << 1;
        const OR    = 1 << 2;
        const XOR   = 1 << 3;
        const SWAP  = 1 << 4;
        const CSWAP = 1 << 5;
    }
}

bitflags! {
    /// Resource-class filter bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
    pub struct TlRscFlags: u32 {
        /// Resource exists only to carry wireup/auxiliary traffic.
        const AUX_ONLY = 1 << 0;
        /// Resource is explicitly designated as able to serve atomics even
        /// though it is peer-to-peer (spec §4.4.2).
        const ATOMIC_CAPABLE = 1 << 1;
    }
}

/// Atomic capability set, partitioned by width and by fetching/non-fetching.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct AtomicCaps {
    pub op32: AtomicOpFlags,
    pub fop32: AtomicOpFlags,
    pub op64: AtomicOpFlags,
    pub fop64: AtomicOpFlags,
}

impl AtomicCaps {
    pub fn contains(&self, required: &AtomicCaps) -> bool {
        self.op32.contains(required.op32)
            && self.fop32.contains(required.fop32)
            && self.op64.contains(required.op64)
            && self.fop64.contains(required.fop64)
    }
}

/// Device type, coarse enough to drive topology-aware scoring decisions
/// (self/shm transports terminate the multi-lane diversity loop early).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceType {
    SelfLoopback,
    SharedMemory,
    Network,
}

impl DeviceType {
    /// §4.4.5: "the chosen resource is self or shared memory — another
    /// transport cannot plausibly beat it for this endpoint pair".
    pub fn terminates_diversity_loop(&self) -> bool {
        matches!(self, Self::SelfLoopback | Self::SharedMemory)
    }
}

/// Scalar performance characteristics, scoring inputs (spec §3, §4.1).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CapRecord {
    /// Fixed per-message latency contribution of this side.
    pub latency_overhead: f64,
    /// Additional latency incurred per connected peer (congestion /
    /// fan-out penalty), scaled by `estimated_endpoints` at scoring time.
    pub latency_growth: f64,
    /// Advertised bandwidth in bytes/second.
    pub bandwidth: f64,
    /// Fixed per-operation CPU overhead (seconds).
    pub overhead: f64,
    /// Memory-registration fixed overhead (only meaningful on the local
    /// side — the side that pays to register/allocate).
    pub reg_overhead: f64,
    /// Memory-registration overhead that grows with buffer size.
    pub reg_growth: f64,
    /// Largest bcopy-style message the resource can move in one shot.
    pub max_bcopy_size: f64,
    /// Resource priority; used only to break near-equal scores.
    pub priority: i32,
}

/// A local transport resource, as exposed by the (external) transport layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportResource {
    pub resource_index: usize,
    pub md_index: usize,
    pub device_index: usize,
    pub device_type: DeviceType,
    pub tl_name: String,
    pub rsc_flags: TlRscFlags,
    pub md_flags: MdFlags,
    pub iface_flags: IfaceFlags,
    pub atomic: AtomicCaps,
    pub caps: CapRecord,
}

impl TransportResource {
    /// A transport is peer-to-peer when reaching it requires exchanging
    /// endpoint addresses rather than being reachable from the interface
    /// address alone (glossary: "Peer-to-peer transport").
    pub fn is_peer_to_peer(&self) -> bool {
        self.iface_flags.contains(IfaceFlags::CONNECT_TO_EP)
            && !self.iface_flags.contains(IfaceFlags::CONNECT_TO_IFACE)
    }

    pub fn is_aux_only(&self) -> bool {
        self.rsc_flags.contains(TlRscFlags::AUX_ONLY)
    }

    pub fn is_atomic_capable_override(&self) -> bool {
        self.rsc_flags.contains(TlRscFlags::ATOMIC_CAPABLE)
    }
}

/// A remote address-list entry, as delivered by the (external) address
/// unpacker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteEntry {
    pub entry_index: usize,
    pub md_index: usize,
    pub device_index: usize,
    pub md_flags: MdFlags,
    /// Transport-name checksum; used only for diagnostics and by the
    /// (external) reachability predicate, never interpreted here.
    pub tl_name_checksum: u64,
    pub iface_flags: IfaceFlags,
    pub atomic: AtomicCaps,
    pub caps: CapRecord,
}

/// Endpoint-creation feature mask.
bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
    pub struct EpFeatures: u32 {
        const TAG    = 1 << 0;
        const STREAM = 1 << 1;
        const AM     = 1 << 2;
        const RMA    = 1 << 3;
        const AMO32  = 1 << 4;
        const AMO64  = 1 << 5;
        const WAKEUP = 1 << 6;
    }
}

/// Peer-failure handling mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorMode {
    None,
    Peer,
}

/// An identifier for a memory type the context knows how to reach
/// (host, CUDA, ROCm, ...); opaque here, supplied by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MemTypeId(pub u8);

impl MemTypeId {
    pub const HOST: Self = Self(0);
}

/// Requested atomic operation set, derived upstream from the user's
/// feature request (op/fop per width).
#[derive(Debug, Clone, Copy, Default)]
pub struct AtomicRequirement {
    pub op32: AtomicOpFlags,
    pub fop32: AtomicOpFlags,
    pub op64: AtomicOpFlags,
    pub fop64: AtomicOpFlags,
}

impl AtomicRequirement {
    pub fn is_empty(&self) -> bool {
        self.op32.is_empty() && self.fop32.is_empty() && self.op64.is_empty() && self.fop64.is_empty()
    }

    pub fn as_caps(&self) -> AtomicCaps {
        AtomicCaps {
            op32: self.op32,
            fop32: self.fop32,
            op64: self.op64,
            fop64: self.fop64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_caps() -> CapRecord {
        CapRecord {
            latency_overhead: 1e-6,
            latency_growth: 1e-9,
            bandwidth: 10e9,
            overhead: 1e-7,
            reg_overhead: 1e-6,
            reg_growth: 1e-12,
            max_bcopy_size: 8192.0,
            priority: 0,
        }
    }

    #[test]
    fn peer_to_peer_detection() {
        let mut r = TransportResource {
            resource_index: 0,
            md_index: 0,
            device_index: 0,
            device_type: DeviceType::Network,
            tl_name: "rc".into(),
            rsc_flags: TlRscFlags::empty(),
            md_flags: MdFlags::REG,
            iface_flags: IfaceFlags::CONNECT_TO_EP,
            atomic: AtomicCaps::default(),
            caps: sample_caps(),
        };
        assert!(r.is_peer_to_peer());
        r.iface_flags |= IfaceFlags::CONNECT_TO_IFACE;
        assert!(!r.is_peer_to_peer());
    }

    #[test]
    fn atomic_caps_containment() {
        let have = AtomicCaps {
            op32: AtomicOpFlags::ADD | AtomicOpFlags::CSWAP,
            ..Default::default()
        };
        let need = AtomicCaps {
            op32: AtomicOpFlags::ADD,
            ..Default::default()
        };
        assert!(have.contains(&need));
        let need_more = AtomicCaps {
            op32: AtomicOpFlags::ADD | AtomicOpFlags::SWAP,
            ..Default::default()
        };
        assert!(!have.contains(&need_more));
    }
}
