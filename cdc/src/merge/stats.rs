use std::ops::AddAssign;

/// Counters of the structural changes made by merges.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub versions_opened: u64,
    pub versions_closed: u64,
    /// Changes placed before the latest applied change of their key.
    pub late_corrections: u64,
    /// Changes to excluded columns only, written into an existing version.
    pub in_place_corrections: u64,
    pub deletes: u64,
    /// Changes older than the latest applied change of a latest-state key.
    pub stale_ignored: u64,
    /// Changes that left the chain untouched.
    pub noops: u64,
}

impl AddAssign for MergeStats {
    fn add_assign(&mut self, other: MergeStats) {
        self.versions_opened += other.versions_opened;
        self.versions_closed += other.versions_closed;
        self.late_corrections += other.late_corrections;
        self.in_place_corrections += other.in_place_corrections;
        self.deletes += other.deletes;
        self.stale_ignored += other.stale_ignored;
        self.noops += other.noops;
    }
}
