/// Number of records one partition may emit: `ceil(global_limit / partition_count)`.
///
/// Each partition enforces its share on its own, so a run can emit up to
/// `partition_count * quota` records in total rather than exactly `global_limit`.
pub fn per_partition_quota(global_limit: usize, partition_count: usize) -> usize {
    global_limit.div_ceil(partition_count.max(1))
}

/// Counts emitted records for one partition and reports when its quota is used up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultLimiter {
    quota: Option<usize>,
    emitted: usize,
}

impl ResultLimiter {
    pub fn unlimited() -> Self {
        Self {
            quota: None,
            emitted: 0,
        }
    }

    pub fn for_partition(global_limit: Option<usize>, partition_count: usize) -> Self {
        Self {
            quota: global_limit.map(|limit| per_partition_quota(limit, partition_count)),
            emitted: 0,
        }
    }

    pub fn quota(&self) -> Option<usize> {
        self.quota
    }

    pub fn emitted(&self) -> usize {
        self.emitted
    }

    pub fn record_emitted(&mut self) {
        self.emitted += 1;
    }

    pub fn is_exhausted(&self) -> bool {
        self.quota.is_some_and(|quota| self.emitted >= quota)
    }
}
