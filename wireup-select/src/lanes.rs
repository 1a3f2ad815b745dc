//! The lane table (spec §4.3): an append-only accumulator of lane
//! descriptors with a merge rule and proxy linking.

use bitflags::bitflags;
use log::debug;

use crate::criteria::SelectInfo;

bitflags! {
    /// Which role(s) a lane serves. A lane always has at least one bit set
    /// (spec invariant P1/I5).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct LaneUsage: u32 {
        const AM      = 1 << 0;
        const TAG     = 1 << 1;
        const RMA     = 1 << 2;
        const RMA_BW  = 1 << 3;
        const AMO     = 1 << 4;
        const AM_BW   = 1 << 5;
    }
}

/// A single lane: one `(local_resource, remote_entry)` pair and the roles
/// it has been pressed into service for.
#[derive(Debug, Clone)]
pub struct LaneDescriptor {
    pub local_resource: usize,
    pub remote_entry: usize,
    /// `None` when this lane is not a proxy. `Some(self_index)` for a
    /// self-proxy, `Some(other_index)` when it shims in front of a real
    /// lane carrying the same pair (spec I2/P7).
    pub proxy_lane: Option<usize>,
    pub remote_md: usize,
    pub usage: LaneUsage,
    pub score_am_bw: Option<f64>,
    pub score_rma: Option<f64>,
    pub score_rma_bw: Option<f64>,
    pub score_amo: Option<f64>,
}

impl LaneDescriptor {
    fn new(select_info: &SelectInfo, remote_md: usize) -> Self {
        Self {
            local_resource: select_info.local_resource,
            remote_entry: select_info.remote_entry,
            proxy_lane: None,
            remote_md,
            usage: LaneUsage::empty(),
            score_am_bw: None,
            score_rma: None,
            score_rma_bw: None,
            score_amo: None,
        }
    }

    fn apply_scores(&mut self, usage: LaneUsage, score: f64) {
        if usage.contains(LaneUsage::AM_BW) {
            self.score_am_bw = Some(score);
        }
        if usage.contains(LaneUsage::RMA) {
            self.score_rma = Some(score);
        }
        if usage.contains(LaneUsage::RMA_BW) {
            self.score_rma_bw = Some(score);
        }
        if usage.contains(LaneUsage::AMO) {
            self.score_amo = Some(score);
        }
    }
}

/// Append-only lane table, bounded by `MAX_LANES` at the call site.
#[derive(Debug, Default)]
pub struct LaneTable {
    lanes: Vec<LaneDescriptor>,
}

impl LaneTable {
    pub fn new() -> Self {
        Self { lanes: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.lanes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lanes.is_empty()
    }

    pub fn lanes(&self) -> &[LaneDescriptor] {
        &self.lanes
    }

    fn find_by_pair(&self, local_resource: usize, remote_entry: usize) -> Option<usize> {
        self.lanes
            .iter()
            .position(|l| l.local_resource == local_resource && l.remote_entry == remote_entry)
    }

    /// Add a lane for `select_info` carrying `usage`, merging with an
    /// existing lane on the same `(local, remote)` pair per spec §4.3.
    /// Returns the index of the (possibly pre-existing) lane.
    pub fn append(
        &mut self,
        select_info: &SelectInfo,
        remote_md: usize,
        usage: LaneUsage,
        is_proxy: bool,
    ) -> usize {
        if let Some(existing_idx) = self.find_by_pair(select_info.local_resource, select_info.remote_entry)
        {
            let existing_is_proxy = self.lanes[existing_idx].proxy_lane.is_some();

            debug_assert!(
                !self.lanes[existing_idx].usage.intersects(usage),
                "lane {existing_idx} already carries role(s) being re-added: {:?} & {:?}",
                self.lanes[existing_idx].usage,
                usage
            );

            if is_proxy && !existing_is_proxy {
                // New proxy shim pointing at the existing real lane.
                let mut new_lane = LaneDescriptor::new(select_info, remote_md);
                new_lane.usage = usage;
                new_lane.apply_scores(usage, select_info.score);
                new_lane.proxy_lane = Some(existing_idx);
                self.lanes.push(new_lane);
                let new_idx = self.lanes.len() - 1;
                debug!("lane {new_idx}: proxy shim in front of lane {existing_idx}");
                return new_idx;
            }

            if !is_proxy && existing_is_proxy {
                // The real lane is arriving after its proxy shim: repoint
                // the existing self-proxy at the lane we are about to push.
                let new_idx = self.lanes.len();
                let mut new_lane = LaneDescriptor::new(select_info, remote_md);
                new_lane.usage = usage;
                new_lane.apply_scores(usage, select_info.score);
                self.lanes[existing_idx].proxy_lane = Some(new_idx);
                self.lanes.push(new_lane);
                debug!("lane {existing_idx}: proxy repointed at new real lane {new_idx}");
                return new_idx;
            }

            // Same proxy-ness: fold the new usage into the existing lane.
            self.lanes[existing_idx].usage |= usage;
            self.lanes[existing_idx].apply_scores(usage, select_info.score);
            debug!(
                "lane {existing_idx}: merged usage {:?}, score {:.3e}",
                usage, select_info.score
            );
            existing_idx
        } else {
            let mut lane = LaneDescriptor::new(select_info, remote_md);
            lane.usage = usage;
            lane.apply_scores(usage, select_info.score);
            self.lanes.push(lane);
            let idx = self.lanes.len() - 1;
            if is_proxy {
                self.lanes[idx].proxy_lane = Some(idx);
                debug!("lane {idx}: self-proxy, usage {:?}", usage);
            } else {
                debug!("lane {idx}: new lane, usage {:?}", usage);
            }
            idx
        }
    }
}
