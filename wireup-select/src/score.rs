//! Scoring functions (spec §4.1). All return "higher is better" and are
//! strictly positive for well-formed inputs.

use crate::caps::{CapRecord, RemoteEntry, TransportResource};

const RMA_MSG_SIZE: f64 = 4096.0;
const BULK_RMA_SIZE: f64 = 262_144.0;

/// `link_latency = max(local.latency_overhead, remote.latency_overhead)
///   + local.latency_growth * estimated_endpoints`
///
/// The growth term penalizes transports whose latency degrades with
/// fan-out, so congested or large jobs prefer low-fanout transports.
pub fn link_latency(local: &CapRecord, remote: &CapRecord, estimated_endpoints: u32) -> f64 {
    local.latency_overhead.max(remote.latency_overhead)
        + local.latency_growth * estimated_endpoints as f64
}

/// Best for tiny messages: AM, AMO fallback of AM, and the auxiliary
/// (wireup-bootstrap) transport.
pub fn small_message_latency_score(
    local: &CapRecord,
    remote: &CapRecord,
    estimated_endpoints: u32,
) -> f64 {
    let lat = link_latency(local, remote, estimated_endpoints);
    1e-3 / (lat + local.overhead + remote.overhead)
}

/// Best end-to-end latency for a representative 4 KiB RMA operation.
pub fn rma_score(local: &CapRecord, remote: &CapRecord, estimated_endpoints: u32) -> f64 {
    let lat = link_latency(local, remote, estimated_endpoints);
    let min_bw = local.bandwidth.min(remote.bandwidth);
    1e-3 / (lat + local.overhead + RMA_MSG_SIZE / min_bw)
}

/// Best atomic latency.
pub fn amo_score(local: &CapRecord, remote: &CapRecord, estimated_endpoints: u32) -> f64 {
    let lat = link_latency(local, remote, estimated_endpoints);
    1e-3 / (lat + local.overhead)
}

/// Best bandwidth for a 256 KiB bulk RMA transfer, accounting for the
/// local side's registration cost.
pub fn bulk_rma_bw_score(local: &CapRecord, remote: &CapRecord, estimated_endpoints: u32) -> f64 {
    let lat = link_latency(local, remote, estimated_endpoints);
    let min_bw = local.bandwidth.min(remote.bandwidth);
    1.0 / (BULK_RMA_SIZE / min_bw
        + lat
        + local.overhead
        + local.reg_overhead
        + BULK_RMA_SIZE * local.reg_growth)
}

/// Best AM bandwidth for bcopy-sized eager messages.
pub fn am_bw_score(local: &CapRecord, remote: &CapRecord, estimated_endpoints: u32) -> f64 {
    let lat = link_latency(local, remote, estimated_endpoints);
    let min_bw = local.bandwidth.min(remote.bandwidth);
    let max_bcopy = local.max_bcopy_size.min(remote.max_bcopy_size);
    let overheads = local.overhead + remote.overhead;
    (max_bcopy / (max_bcopy / min_bw + overheads + lat)) * 1e-5
}

/// Used for the bootstrap (wireup-message) transport; identical formula to
/// [`small_message_latency_score`].
pub fn aux_score(local: &CapRecord, remote: &CapRecord, estimated_endpoints: u32) -> f64 {
    small_message_latency_score(local, remote, estimated_endpoints)
}

/// A scoring function over a candidate `(local, remote)` pair.
pub type ScoreFn = fn(&TransportResource, &RemoteEntry, u32) -> f64;

pub fn score_rma(local: &TransportResource, remote: &RemoteEntry, n: u32) -> f64 {
    rma_score(&local.caps, &remote.caps, n)
}

pub fn score_amo(local: &TransportResource, remote: &RemoteEntry, n: u32) -> f64 {
    amo_score(&local.caps, &remote.caps, n)
}

pub fn score_am(local: &TransportResource, remote: &RemoteEntry, n: u32) -> f64 {
    small_message_latency_score(&local.caps, &remote.caps, n)
}

pub fn score_rma_bw(local: &TransportResource, remote: &RemoteEntry, n: u32) -> f64 {
    bulk_rma_bw_score(&local.caps, &remote.caps, n)
}

pub fn score_am_bw(local: &TransportResource, remote: &RemoteEntry, n: u32) -> f64 {
    am_bw_score(&local.caps, &remote.caps, n)
}

pub fn score_aux(local: &TransportResource, remote: &RemoteEntry, n: u32) -> f64 {
    aux_score(&local.caps, &remote.caps, n)
}

/// Relative-epsilon score comparison: two scores are equal when
/// `|a - b| < eps * max(|a|, |b|, 1)`.
pub fn scores_equal(a: f64, b: f64, eps: f64) -> bool {
    (a - b).abs() < eps * a.abs().max(b.abs()).max(1.0)
}

/// `true` when `candidate` is a strict, epsilon-aware improvement over
/// `current_best`.
pub fn is_better(candidate: f64, current_best: f64, eps: f64) -> bool {
    !scores_equal(candidate, current_best, eps) && candidate > current_best
}
