//! Offline-first staging area for batch clocking. An operator toggles
//! check-in/check-out intentions for many users; the cache is merged with
//! the live server snapshot to drive button enablement, then drained into a
//! single atomic commit. The cache is the only holder of pending intent:
//! it is mutated by [`BatchCache::toggle`] and the post-commit clear, and by
//! nothing else.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use utoipa::ToSchema;

use crate::clock::ClockError;
use crate::clock::kv::KvStore;
use crate::clock::snapshot::DirectorySnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, ToSchema)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum ActionKind {
    CheckIn,
    CheckOut,
}

/// A staged punch: the instant the operator pressed the button, plus the
/// display name carried along for the sync summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StagedPunch {
    #[schema(value_type = String, format = "date-time")]
    pub timestamp: DateTime<Utc>,
    pub label: String,
}

/// Unsynced intentions for one user. An entry with neither field set is
/// never kept in the cache map.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CachedAction {
    pub check_in: Option<StagedPunch>,
    pub check_out: Option<StagedPunch>,
}

impl CachedAction {
    fn is_empty(&self) -> bool {
        self.check_in.is_none() && self.check_out.is_none()
    }
}

/// Combined server + local truth for one user, driving control enablement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EffectiveState {
    pub effective_checked_in: bool,
    pub effective_checked_out: bool,
    pub logical_check_out: bool,
    pub check_in_enabled: bool,
    pub check_out_enabled: bool,
    /// The cache disagrees with server truth for this user.
    pub pending_sync: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Toggled {
    Staged,
    Unstaged { cascaded: bool },
}

/// One merge-write of the commit plan, keyed by `(user_email, date)`.
/// `clear_check_out` is set when a check-in is staged alone, so a fresh
/// check-in never inherits a stale check-out from an earlier cache.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordWrite {
    pub user_email: String,
    pub date: String,
    pub check_in: Option<DateTime<Utc>>,
    pub check_out: Option<DateTime<Utc>>,
    pub clear_check_out: bool,
    pub recorder_uid: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchCache {
    entries: BTreeMap<String, CachedAction>,
}

impl BatchCache {
    fn kv_key(operator: &str) -> String {
        format!("batch-actions:{operator}")
    }

    /// Load the operator's staged actions from the key-value scope. A
    /// missing key is an empty cache.
    pub fn load(kv: &dyn KvStore, operator: &str) -> anyhow::Result<Self> {
        match kv.get(&Self::kv_key(operator))? {
            Some(value) => Ok(serde_json::from_value(value)?),
            None => Ok(Self::default()),
        }
    }

    /// Write the cache back; an empty cache removes the key entirely.
    pub fn persist(&self, kv: &dyn KvStore, operator: &str) -> anyhow::Result<()> {
        let key = Self::kv_key(operator);
        if self.entries.is_empty() {
            kv.remove(&key)
        } else {
            kv.set(&key, &serde_json::to_value(self)?)
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, email: &str) -> Option<&CachedAction> {
        self.entries.get(email)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Stage or un-stage one action. Staging obeys the effective-state
    /// rules; un-staging always succeeds, and removing a staged check-in
    /// also removes the staged check-out (a check-out cannot be staged
    /// without a check-in context).
    pub fn toggle(
        &mut self,
        email: &str,
        kind: ActionKind,
        now: DateTime<Utc>,
        label: &str,
        snapshot: &DirectorySnapshot,
    ) -> Result<Toggled, ClockError> {
        if let Some(entry) = self.entries.get_mut(email) {
            let staged = match kind {
                ActionKind::CheckIn => entry.check_in.is_some(),
                ActionKind::CheckOut => entry.check_out.is_some(),
            };
            if staged {
                let cascaded = match kind {
                    ActionKind::CheckIn => {
                        entry.check_in = None;
                        entry.check_out.take().is_some()
                    }
                    ActionKind::CheckOut => {
                        entry.check_out = None;
                        false
                    }
                };
                if entry.is_empty() {
                    self.entries.remove(email);
                }
                return Ok(Toggled::Unstaged { cascaded });
            }
        }

        let state = self.effective_state(email, snapshot);
        match kind {
            ActionKind::CheckIn => {
                if state.effective_checked_in {
                    return Err(ClockError::AlreadyCheckedIn);
                }
            }
            ActionKind::CheckOut => {
                if !state.effective_checked_in {
                    return Err(ClockError::NotCheckedIn);
                }
                if state.logical_check_out {
                    return Err(ClockError::AlreadyComplete);
                }
            }
        }

        let punch = StagedPunch {
            timestamp: now,
            label: label.to_string(),
        };
        let entry = self.entries.entry(email.to_string()).or_default();
        match kind {
            ActionKind::CheckIn => entry.check_in = Some(punch),
            ActionKind::CheckOut => entry.check_out = Some(punch),
        }
        Ok(Toggled::Staged)
    }

    pub fn effective_state(&self, email: &str, snapshot: &DirectorySnapshot) -> EffectiveState {
        let entry = self.entries.get(email);
        let cached_in = entry.is_some_and(|e| e.check_in.is_some());
        let cached_out = entry.is_some_and(|e| e.check_out.is_some());
        let server_pending = snapshot.pending.contains(email);
        let server_completed = snapshot.completed_today.contains(email);

        let effective_checked_in = cached_in || server_pending || server_completed;
        let effective_checked_out = cached_out || server_completed;
        let logical_check_out = effective_checked_in && effective_checked_out;

        EffectiveState {
            effective_checked_in,
            effective_checked_out,
            logical_check_out,
            check_in_enabled: !effective_checked_in,
            check_out_enabled: effective_checked_in && !logical_check_out,
            pending_sync: (cached_in && !(server_pending || server_completed))
                || (cached_out && !server_completed),
        }
    }

    /// Turn the staged entries into per-user merge-writes for `date`. The
    /// caller submits the whole plan in one transaction: all or nothing.
    pub fn commit_plan(&self, date: &str, recorder_uid: &str) -> Vec<RecordWrite> {
        self.entries
            .iter()
            .map(|(email, action)| RecordWrite {
                user_email: email.clone(),
                date: date.to_string(),
                check_in: action.check_in.as_ref().map(|p| p.timestamp),
                check_out: action.check_out.as_ref().map(|p| p.timestamp),
                clear_check_out: action.check_in.is_some() && action.check_out.is_none(),
                recorder_uid: recorder_uid.to_string(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 8, minute, 0).unwrap()
    }

    fn snapshot(pending: &[&str], completed: &[&str]) -> DirectorySnapshot {
        DirectorySnapshot::new(
            pending.iter().map(|s| s.to_string()),
            completed.iter().map(|s| s.to_string()),
        )
    }

    #[test]
    fn staging_a_check_in_on_a_fresh_user() {
        let mut cache = BatchCache::default();
        let snap = snapshot(&[], &[]);

        let result = cache.toggle("bob@x", ActionKind::CheckIn, t(0), "Bob", &snap);
        assert_eq!(result, Ok(Toggled::Staged));

        let state = cache.effective_state("bob@x", &snap);
        assert!(state.effective_checked_in);
        assert!(!state.effective_checked_out);
        assert!(state.pending_sync);
        assert!(!state.check_in_enabled);
        assert!(state.check_out_enabled);
    }

    #[test]
    fn toggle_is_an_undo_not_a_one_way_set() {
        let mut cache = BatchCache::default();
        let snap = snapshot(&[], &[]);

        cache
            .toggle("bob@x", ActionKind::CheckIn, t(0), "Bob", &snap)
            .unwrap();
        let result = cache.toggle("bob@x", ActionKind::CheckIn, t(1), "Bob", &snap);
        assert_eq!(result, Ok(Toggled::Unstaged { cascaded: false }));
        assert!(cache.is_empty());
    }

    #[test]
    fn unstaging_check_in_cascades_to_check_out() {
        let mut cache = BatchCache::default();
        let snap = snapshot(&[], &[]);

        cache
            .toggle("bob@x", ActionKind::CheckIn, t(0), "Bob", &snap)
            .unwrap();
        cache
            .toggle("bob@x", ActionKind::CheckOut, t(5), "Bob", &snap)
            .unwrap();

        let result = cache.toggle("bob@x", ActionKind::CheckIn, t(6), "Bob", &snap);
        assert_eq!(result, Ok(Toggled::Unstaged { cascaded: true }));
        // Both intentions cleared, and no empty placeholder entry remains.
        assert_eq!(cache.len(), 0);
        assert!(cache.get("bob@x").is_none());
    }

    #[test]
    fn cannot_stage_check_out_without_check_in_context() {
        let mut cache = BatchCache::default();
        let snap = snapshot(&[], &[]);

        let result = cache.toggle("bob@x", ActionKind::CheckOut, t(0), "Bob", &snap);
        assert_eq!(result, Err(ClockError::NotCheckedIn));
        assert!(cache.is_empty());
    }

    #[test]
    fn cannot_stage_check_in_when_server_shows_pending() {
        let mut cache = BatchCache::default();
        let snap = snapshot(&["ann@x"], &[]);

        let result = cache.toggle("ann@x", ActionKind::CheckIn, t(0), "Ann", &snap);
        assert_eq!(result, Err(ClockError::AlreadyCheckedIn));
    }

    #[test]
    fn cannot_stage_check_out_for_a_completed_day() {
        let mut cache = BatchCache::default();
        let snap = snapshot(&[], &["ann@x"]);

        let result = cache.toggle("ann@x", ActionKind::CheckOut, t(0), "Ann", &snap);
        assert_eq!(result, Err(ClockError::AlreadyComplete));
    }

    #[test]
    fn staged_check_out_over_server_pending_user() {
        let mut cache = BatchCache::default();
        let snap = snapshot(&["ann@x"], &[]);

        cache
            .toggle("ann@x", ActionKind::CheckOut, t(0), "Ann", &snap)
            .unwrap();

        let state = cache.effective_state("ann@x", &snap);
        assert!(state.effective_checked_in);
        assert!(state.effective_checked_out);
        assert!(state.logical_check_out);
        assert!(!state.check_in_enabled);
        assert!(!state.check_out_enabled);
        assert!(state.pending_sync);
    }

    #[test]
    fn server_only_state_is_not_pending_sync() {
        let cache = BatchCache::default();

        let pending = cache.effective_state("ann@x", &snapshot(&["ann@x"], &[]));
        assert!(pending.effective_checked_in);
        assert!(!pending.pending_sync);
        assert!(pending.check_out_enabled);

        let completed = cache.effective_state("ann@x", &snapshot(&[], &["ann@x"]));
        assert!(completed.logical_check_out);
        assert!(!completed.pending_sync);
        assert!(!completed.check_in_enabled);
        assert!(!completed.check_out_enabled);
    }

    #[test]
    fn lone_check_in_write_clears_stale_check_out() {
        let mut cache = BatchCache::default();
        let snap = snapshot(&[], &[]);
        cache
            .toggle("bob@x", ActionKind::CheckIn, t(0), "Bob", &snap)
            .unwrap();

        let plan = cache.commit_plan("2026-03-02", "gatekeeper");
        assert_eq!(plan.len(), 1);
        let write = &plan[0];
        assert_eq!(write.user_email, "bob@x");
        assert_eq!(write.check_in, Some(t(0)));
        assert_eq!(write.check_out, None);
        assert!(write.clear_check_out);
        assert_eq!(write.recorder_uid, "gatekeeper");
    }

    #[test]
    fn paired_punches_do_not_clear_check_out() {
        let mut cache = BatchCache::default();
        let snap = snapshot(&[], &[]);
        cache
            .toggle("bob@x", ActionKind::CheckIn, t(0), "Bob", &snap)
            .unwrap();
        cache
            .toggle("bob@x", ActionKind::CheckOut, t(30), "Bob", &snap)
            .unwrap();

        let plan = cache.commit_plan("2026-03-02", "gatekeeper");
        let write = &plan[0];
        assert_eq!(write.check_in, Some(t(0)));
        assert_eq!(write.check_out, Some(t(30)));
        assert!(!write.clear_check_out);
    }

    #[test]
    fn check_out_only_write_touches_only_check_out() {
        let mut cache = BatchCache::default();
        let snap = snapshot(&["ann@x"], &[]);
        cache
            .toggle("ann@x", ActionKind::CheckOut, t(45), "Ann", &snap)
            .unwrap();

        let plan = cache.commit_plan("2026-03-02", "gatekeeper");
        let write = &plan[0];
        assert_eq!(write.check_in, None);
        assert_eq!(write.check_out, Some(t(45)));
        assert!(!write.clear_check_out);
    }

    #[test]
    fn plan_covers_every_staged_user() {
        let mut cache = BatchCache::default();
        let snap = snapshot(&["carol@x"], &[]);
        cache
            .toggle("bob@x", ActionKind::CheckIn, t(0), "Bob", &snap)
            .unwrap();
        cache
            .toggle("carol@x", ActionKind::CheckOut, t(1), "Carol", &snap)
            .unwrap();

        let plan = cache.commit_plan("2026-03-02", "gatekeeper");
        assert_eq!(plan.len(), 2);
        // Failure of the batch leaves the cache intact for retry; nothing
        // in planning consumes the entries.
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn cache_round_trips_through_json() {
        let mut cache = BatchCache::default();
        let snap = snapshot(&[], &[]);
        cache
            .toggle("bob@x", ActionKind::CheckIn, t(0), "Bob", &snap)
            .unwrap();

        let value = serde_json::to_value(&cache).unwrap();
        // Serialized shape is the bare map keyed by email.
        assert!(value.get("bob@x").is_some());
        let restored: BatchCache = serde_json::from_value(value).unwrap();
        assert_eq!(restored.get("bob@x"), cache.get("bob@x"));
    }
}
