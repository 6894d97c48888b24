use std::collections::HashSet;

/// Read-only view of today's server state, derived from two standing
/// queries: records with a check-in and no check-out ("on the clock") and
/// records closed today. The batch cache merges with a snapshot but never
/// mutates one.
#[derive(Debug, Clone, Default)]
pub struct DirectorySnapshot {
    pub pending: HashSet<String>,
    pub completed_today: HashSet<String>,
}

impl DirectorySnapshot {
    pub fn new(
        pending: impl IntoIterator<Item = String>,
        completed_today: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            pending: pending.into_iter().collect(),
            completed_today: completed_today.into_iter().collect(),
        }
    }
}
