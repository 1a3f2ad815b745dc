//! The criteria evaluator (spec §4.2): the single place that turns a
//! `Criteria` record plus allow-masks into a best `(local, remote)` pair.

use std::ops::{BitAnd, Not};

use log::debug;

use crate::bitmap::Bitmap64;
use crate::caps::{AtomicCaps, IfaceFlags, MdFlags, RemoteEntry, TlRscFlags, TransportResource};
use crate::error::SelectError;
use crate::score::{is_better, scores_equal, ScoreFn};

/// Allow-masks narrowing which local/remote resources a pass may consider.
#[derive(Debug, Clone, Copy)]
pub struct Masks {
    pub allowed_tls: Bitmap64,
    pub allowed_local_devices: Bitmap64,
    pub allowed_remote_devices: Bitmap64,
    pub allowed_remote_mds: Bitmap64,
}

impl Masks {
    pub fn unrestricted(num_resources: usize, num_devices: usize, num_remote_mds: usize) -> Self {
        Self {
            allowed_tls: Bitmap64::full(num_resources),
            allowed_local_devices: Bitmap64::full(num_devices),
            allowed_remote_devices: Bitmap64::full(num_devices),
            allowed_remote_mds: Bitmap64::full(num_remote_mds),
        }
    }
}

/// A single multi-criteria selection request: "best pair satisfying these
/// flag requirements, scored this way".
#[derive(Clone)]
pub struct Criteria {
    pub title: String,
    pub local_iface: IfaceFlags,
    pub remote_iface: IfaceFlags,
    pub local_md: MdFlags,
    pub remote_md: MdFlags,
    pub local_atomic: AtomicCaps,
    pub remote_atomic: AtomicCaps,
    /// Resource-class filter: e.g. `AUX_ONLY` to opt aux-only resources in.
    pub tl_rsc_flags: TlRscFlags,
    pub score_fn: ScoreFn,
}

/// The winning pair from a criteria evaluation.
#[derive(Debug, Clone, Copy)]
pub struct SelectInfo {
    pub local_resource: usize,
    pub remote_entry: usize,
    pub score: f64,
}

/// Fixed-capacity diagnostic accumulator (spec §9 design note): avoids
/// unbounded allocation on the selection hot path while still giving
/// operators something actionable.
#[derive(Default)]
pub struct ReasonLog {
    entries: Vec<String>,
    capacity: usize,
}

impl ReasonLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, reason: impl Into<String>) {
        if self.entries.len() < self.capacity {
            self.entries.push(reason.into());
        } else if self.entries.last().map(String::as_str) != Some("...") {
            self.entries.push("...".to_string());
        }
    }

    pub fn into_string(self) -> String {
        if self.entries.is_empty() {
            "no candidates considered".to_string()
        } else {
            self.entries.join("; ")
        }
    }
}

fn first_missing_flag_name<F>(have: F, need: F) -> Option<&'static str>
where
    F: bitflags::Flags + Copy + BitAnd<Output = F> + Not<Output = F>,
{
    let missing = need & !have;
    missing.iter_names().next().map(|(name, _)| name)
}

fn missing_atomic_reason(have: &AtomicCaps, need: &AtomicCaps) -> Option<String> {
    if let Some(n) = first_missing_flag_name(have.op32, need.op32) {
        return Some(format!("atomic op32 {n}"));
    }
    if let Some(n) = first_missing_flag_name(have.fop32, need.fop32) {
        return Some(format!("atomic fop32 {n}"));
    }
    if let Some(n) = first_missing_flag_name(have.op64, need.op64) {
        return Some(format!("atomic op64 {n}"));
    }
    if let Some(n) = first_missing_flag_name(have.fop64, need.fop64) {
        return Some(format!("atomic fop64 {n}"));
    }
    None
}

/// Evaluate `criteria` over `resources` / `remotes`, returning the best
/// reachable pair or `SelectError::Unreachable`.
#[allow(clippy::too_many_arguments)]
pub fn evaluate(
    criteria: &Criteria,
    resources: &[TransportResource],
    remotes: &[RemoteEntry],
    masks: &Masks,
    reachable: &dyn Fn(&TransportResource, &RemoteEntry) -> bool,
    estimated_endpoints: u32,
    eps: f64,
    show_error: bool,
) -> Result<SelectInfo, SelectError> {
    let mut reasons = ReasonLog::new(8);

    // Phase 1: remote filter.
    let mut remote_candidates = Vec::with_capacity(remotes.len());
    for r in remotes {
        if !masks.allowed_remote_devices.contains(r.device_index) {
            reasons.push(format!("remote[{}]: device not allowed", r.entry_index));
            continue;
        }
        if !masks.allowed_remote_mds.contains(r.md_index) {
            reasons.push(format!("remote[{}]: md not allowed", r.entry_index));
            continue;
        }
        if let Some(name) = first_missing_flag_name(r.md_flags, criteria.remote_md) {
            reasons.push(format!("remote[{}]: missing md flag {name}", r.entry_index));
            continue;
        }
        if let Some(name) = first_missing_flag_name(r.iface_flags, criteria.remote_iface) {
            reasons.push(format!(
                "remote[{}]: missing iface flag {name}",
                r.entry_index
            ));
            continue;
        }
        if let Some(reason) = missing_atomic_reason(&r.atomic, &criteria.remote_atomic) {
            reasons.push(format!("remote[{}]: missing {reason}", r.entry_index));
            continue;
        }
        remote_candidates.push(r);
    }

    if remote_candidates.is_empty() {
        let reason = reasons.into_string();
        debug!("criteria '{}': no remote candidates ({})", criteria.title, reason);
        return Err(SelectError::Unreachable {
            pass: criteria.title.clone(),
            reason,
        });
    }

    // Phase 2: local scan.
    let mut best: Option<SelectInfo> = None;
    let mut best_priority = i32::MIN;

    for local in resources {
        if !masks.allowed_tls.contains(local.resource_index) {
            continue;
        }
        if !masks.allowed_local_devices.contains(local.device_index) {
            continue;
        }
        if local.is_aux_only() && !criteria.tl_rsc_flags.contains(TlRscFlags::AUX_ONLY) {
            reasons.push(format!("local[{}]: aux-only, not opted in", local.resource_index));
            continue;
        }
        if let Some(name) = first_missing_flag_name(local.md_flags, criteria.local_md) {
            reasons.push(format!(
                "local[{}]: missing md flag {name}",
                local.resource_index
            ));
            continue;
        }
        if let Some(name) = first_missing_flag_name(local.iface_flags, criteria.local_iface) {
            reasons.push(format!(
                "local[{}]: missing iface flag {name}",
                local.resource_index
            ));
            continue;
        }
        if let Some(reason) = missing_atomic_reason(&local.atomic, &criteria.local_atomic) {
            reasons.push(format!("local[{}]: missing {reason}", local.resource_index));
            continue;
        }

        let mut reached_any = false;
        for remote in &remote_candidates {
            if !reachable(local, remote) {
                continue;
            }
            reached_any = true;
            let score = (criteria.score_fn)(local, remote, estimated_endpoints);
            let priority = local.caps.priority + remote.caps.priority;

            let candidate = SelectInfo {
                local_resource: local.resource_index,
                remote_entry: remote.entry_index,
                score,
            };

            match best {
                None => {
                    best = Some(candidate);
                    best_priority = priority;
                }
                Some(current) => {
                    if is_better(score, current.score, eps) {
                        best = Some(candidate);
                        best_priority = priority;
                    } else if scores_equal(score, current.score, eps) && priority > best_priority {
                        // Tie: higher combined priority wins; otherwise the
                        // first candidate found (ascending local index,
                        // then ascending remote index) is kept.
                        best = Some(candidate);
                        best_priority = priority;
                    }
                }
            }
        }

        if !reached_any {
            reasons.push(format!("local[{}]: no reachable remote", local.resource_index));
        }
    }

    match best {
        Some(info) => Ok(info),
        None => {
            let reason = reasons.into_string();
            if show_error {
                debug!("criteria '{}': unreachable ({})", criteria.title, reason);
            }
            Err(SelectError::Unreachable {
                pass: criteria.title.clone(),
                reason,
            })
        }
    }
}
