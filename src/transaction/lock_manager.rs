// Record-level lock manager implementing strict two-phase locking with
// wound-wait deadlock prevention: an older transaction (lower id) forcibly
// aborts any younger conflict-holder instead of ever waiting behind it.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use log::debug;
use parking_lot::{Condvar, Mutex};

use crate::common::rid::Rid;
use crate::common::types::TxnId;
use crate::transaction::transaction::{IsolationLevel, Transaction, TransactionState};
use crate::transaction::transaction_manager::TransactionRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Shared,
    Exclusive,
}

struct LockRequest {
    txn_id: TxnId,
    mode: LockMode,
    granted: bool,
}

impl LockRequest {
    fn new(txn_id: TxnId, mode: LockMode) -> Self {
        Self {
            txn_id,
            mode,
            granted: false,
        }
    }
}

/// Per-rid request queue. Arrival order is grant order, except where
/// wound-wait removes younger entries. At most one transaction may be
/// upgrading at a time; a pending upgrader blocks all later grants.
struct LockRequestQueue {
    requests: VecDeque<LockRequest>,
    upgrading: Option<TxnId>,
    cv: Arc<Condvar>,
}

impl Default for LockRequestQueue {
    fn default() -> Self {
        Self {
            requests: VecDeque::new(),
            upgrading: None,
            cv: Arc::new(Condvar::new()),
        }
    }
}

type LockTable = HashMap<Rid, LockRequestQueue>;

/// All queues live under a single mutex; waiters block on their queue's
/// condvar, releasing the table while suspended. Coarse but correct; per
/// queue locking is a possible refinement.
pub struct LockManager {
    registry: Arc<TransactionRegistry>,
    table: Mutex<LockTable>,
}

impl LockManager {
    pub fn new(registry: Arc<TransactionRegistry>) -> Self {
        Self {
            registry,
            table: Mutex::new(HashMap::new()),
        }
    }

    /// Acquire a shared lock. Blocks until granted; returns false (with the
    /// transaction aborted) on a 2PL violation, a read under
    /// ReadUncommitted, or a wound.
    pub fn lock_shared(&self, txn: &Arc<Transaction>, rid: Rid) -> bool {
        let mut table = self.table.lock();

        if txn.state() != TransactionState::Growing {
            txn.set_state(TransactionState::Aborted);
            return false;
        }
        if txn.isolation_level() == IsolationLevel::ReadUncommitted {
            txn.set_state(TransactionState::Aborted);
            return false;
        }
        if txn.is_shared_locked(rid) || txn.is_exclusive_locked(rid) {
            return true;
        }

        let txn_id = txn.id();
        table
            .entry(rid)
            .or_default()
            .requests
            .push_back(LockRequest::new(txn_id, LockMode::Shared));

        loop {
            let queue = table
                .get_mut(&rid)
                .expect("lock queue exists while request pending");

            if self.wound_younger(queue, rid, txn_id, LockMode::Shared) {
                queue.cv.notify_all();
            }

            let mut granted = false;
            if queue.upgrading.is_none() {
                for request in queue.requests.iter_mut() {
                    if request.txn_id == txn_id {
                        request.granted = true;
                        granted = true;
                        break;
                    }
                    if request.mode != LockMode::Shared {
                        break;
                    }
                }
            }
            if granted {
                break;
            }

            let cv = Arc::clone(&queue.cv);
            cv.wait(&mut table);
            if txn.state() == TransactionState::Aborted {
                return false;
            }
        }

        txn.add_shared_lock(rid);
        true
    }

    /// Acquire an exclusive lock. Blocks until this request reaches the
    /// queue head with no pending upgrader.
    pub fn lock_exclusive(&self, txn: &Arc<Transaction>, rid: Rid) -> bool {
        let mut table = self.table.lock();

        if txn.state() != TransactionState::Growing {
            txn.set_state(TransactionState::Aborted);
            return false;
        }
        if txn.is_exclusive_locked(rid) {
            return true;
        }

        let txn_id = txn.id();
        table
            .entry(rid)
            .or_default()
            .requests
            .push_back(LockRequest::new(txn_id, LockMode::Exclusive));

        loop {
            let queue = table
                .get_mut(&rid)
                .expect("lock queue exists while request pending");

            if self.wound_younger(queue, rid, txn_id, LockMode::Exclusive) {
                queue.cv.notify_all();
            }

            let mut granted = false;
            if queue.upgrading.is_none() {
                if let Some(front) = queue.requests.front_mut() {
                    if front.txn_id == txn_id {
                        front.granted = true;
                        granted = true;
                    }
                }
            }
            if granted {
                break;
            }

            let cv = Arc::clone(&queue.cv);
            cv.wait(&mut table);
            if txn.state() == TransactionState::Aborted {
                return false;
            }
        }

        txn.add_exclusive_lock(rid);
        true
    }

    /// Upgrade a held shared lock to exclusive. Aborts the caller when
    /// another transaction is already upgrading on this rid; otherwise
    /// blocks until the caller is the sole granted holder at the head.
    pub fn lock_upgrade(&self, txn: &Arc<Transaction>, rid: Rid) -> bool {
        let mut table = self.table.lock();

        if txn.state() != TransactionState::Growing {
            txn.set_state(TransactionState::Aborted);
            return false;
        }
        if txn.is_exclusive_locked(rid) {
            return true;
        }

        let txn_id = txn.id();
        {
            let queue = table.entry(rid).or_default();
            if queue.upgrading.is_some() {
                txn.set_state(TransactionState::Aborted);
                return false;
            }
            queue.upgrading = Some(txn_id);
        }

        loop {
            let queue = table
                .get_mut(&rid)
                .expect("lock queue exists while request pending");

            if self.wound_granted_younger(queue, rid, txn_id) {
                queue.cv.notify_all();
            }

            let mut granted = false;
            if queue.requests.front().map(|r| r.txn_id) == Some(txn_id) {
                let grant_count = queue.requests.iter().filter(|r| r.granted).count();
                if grant_count == 1 {
                    if let Some(front) = queue.requests.front_mut() {
                        front.mode = LockMode::Exclusive;
                    }
                    queue.upgrading = None;
                    granted = true;
                }
            }
            if granted {
                break;
            }

            let cv = Arc::clone(&queue.cv);
            cv.wait(&mut table);
            if txn.state() == TransactionState::Aborted {
                if let Some(queue) = table.get_mut(&rid) {
                    if queue.upgrading == Some(txn_id) {
                        queue.upgrading = None;
                    }
                }
                return false;
            }
        }

        txn.remove_shared_lock(rid);
        txn.add_exclusive_lock(rid);
        true
    }

    /// Release a held lock. Transitions the transaction into the shrinking
    /// phase according to its isolation level, and wakes blocked followers.
    pub fn unlock(&self, txn: &Arc<Transaction>, rid: Rid) -> bool {
        let mut table = self.table.lock();
        let queue = table.entry(rid).or_default();

        let mut found = false;
        if let Some(pos) = queue.requests.iter().position(|r| r.txn_id == txn.id()) {
            let request = &queue.requests[pos];
            if request.granted {
                found = true;
                let to_shrinking = match txn.isolation_level() {
                    IsolationLevel::RepeatableRead => true,
                    // Shared locks may be dropped without leaving the
                    // growing phase under these levels
                    IsolationLevel::ReadCommitted | IsolationLevel::ReadUncommitted => {
                        request.mode == LockMode::Exclusive
                    }
                };
                if to_shrinking && txn.state() == TransactionState::Growing {
                    txn.set_state(TransactionState::Shrinking);
                }
            }
            queue.requests.remove(pos);
        }

        if !found {
            return false;
        }

        txn.remove_shared_lock(rid);
        txn.remove_exclusive_lock(rid);
        queue.cv.notify_all();
        true
    }

    /// Drop every lock the transaction still holds, without 2PL state
    /// transitions. Used by commit and abort.
    pub fn release_all(&self, txn: &Arc<Transaction>) {
        let txn_id = txn.id();
        let rids = txn.held_rids();

        let mut table = self.table.lock();
        for rid in rids {
            if let Some(queue) = table.get_mut(&rid) {
                queue.requests.retain(|r| r.txn_id != txn_id);
                if queue.upgrading == Some(txn_id) {
                    queue.upgrading = None;
                }
                queue.cv.notify_all();
            }
        }
        txn.clear_lock_sets();
    }

    /// Forcibly evict a younger conflicting transaction from the queue: its
    /// entry and any upgrade reservation are removed, its lock sets for this
    /// rid are cleared, and its state becomes Aborted. The wounded
    /// transaction observes the abort on its next condvar wakeup.
    fn wound(&self, queue: &mut LockRequestQueue, rid: Rid, victim_id: TxnId) {
        debug!("wounding txn {} on rid {}", victim_id, rid);

        if queue.upgrading == Some(victim_id) {
            queue.upgrading = None;
        }
        if let Some(pos) = queue.requests.iter().position(|r| r.txn_id == victim_id) {
            queue.requests.remove(pos);
        }

        if let Some(victim) = self.registry.get(victim_id) {
            victim.remove_shared_lock(rid);
            victim.remove_exclusive_lock(rid);
            victim.set_state(TransactionState::Aborted);
        }
    }

    /// Wound pass for shared/exclusive acquisition: any younger transaction
    /// queued ahead of us that our request conflicts with is evicted, as is
    /// any younger pending upgrader. Rescans from the start after each
    /// wound. Returns whether anything was wounded.
    fn wound_younger(
        &self,
        queue: &mut LockRequestQueue,
        rid: Rid,
        txn_id: TxnId,
        mode: LockMode,
    ) -> bool {
        let mut wounded = false;
        loop {
            if let Some(upgrader) = queue.upgrading {
                if upgrader > txn_id {
                    self.wound(queue, rid, upgrader);
                    wounded = true;
                    continue;
                }
            }

            let mut victim = None;
            for request in &queue.requests {
                if request.txn_id == txn_id {
                    break;
                }
                if request.txn_id > txn_id
                    && (mode == LockMode::Exclusive || request.mode == LockMode::Exclusive)
                {
                    victim = Some(request.txn_id);
                    break;
                }
            }

            match victim {
                Some(victim_id) => {
                    self.wound(queue, rid, victim_id);
                    wounded = true;
                }
                None => break,
            }
        }
        wounded
    }

    /// Wound pass for upgrades: every younger transaction with a granted
    /// lock anywhere in the queue is evicted.
    fn wound_granted_younger(
        &self,
        queue: &mut LockRequestQueue,
        rid: Rid,
        txn_id: TxnId,
    ) -> bool {
        let mut wounded = false;
        loop {
            let victim = queue
                .requests
                .iter()
                .find(|r| r.txn_id > txn_id && r.granted)
                .map(|r| r.txn_id);

            match victim {
                Some(victim_id) => {
                    self.wound(queue, rid, victim_id);
                    wounded = true;
                }
                None => break,
            }
        }
        wounded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::transaction_manager::TransactionRegistry;

    fn setup() -> (Arc<TransactionRegistry>, LockManager) {
        let registry = Arc::new(TransactionRegistry::new());
        let lock_manager = LockManager::new(Arc::clone(&registry));
        (registry, lock_manager)
    }

    fn register(registry: &Arc<TransactionRegistry>, id: TxnId, level: IsolationLevel) -> Arc<Transaction> {
        let txn = Arc::new(Transaction::new(id, level));
        registry.insert(Arc::clone(&txn));
        txn
    }

    #[test]
    fn test_shared_locks_are_compatible() {
        let (registry, lm) = setup();
        let t1 = register(&registry, 1, IsolationLevel::RepeatableRead);
        let t2 = register(&registry, 2, IsolationLevel::RepeatableRead);
        let rid = Rid::new(1, 0);

        assert!(lm.lock_shared(&t1, rid));
        assert!(lm.lock_shared(&t2, rid));
        assert!(t1.is_shared_locked(rid));
        assert!(t2.is_shared_locked(rid));

        assert!(lm.unlock(&t1, rid));
        assert!(lm.unlock(&t2, rid));
    }

    #[test]
    fn test_shared_under_read_uncommitted_aborts() {
        let (registry, lm) = setup();
        let txn = register(&registry, 1, IsolationLevel::ReadUncommitted);
        let rid = Rid::new(1, 0);

        assert!(!lm.lock_shared(&txn, rid));
        assert_eq!(txn.state(), TransactionState::Aborted);
    }

    #[test]
    fn test_acquire_after_shrinking_aborts() {
        let (registry, lm) = setup();
        let txn = register(&registry, 1, IsolationLevel::RepeatableRead);
        let a = Rid::new(1, 0);
        let b = Rid::new(1, 1);

        assert!(lm.lock_shared(&txn, a));
        assert!(lm.unlock(&txn, a));
        assert_eq!(txn.state(), TransactionState::Shrinking);

        assert!(!lm.lock_shared(&txn, b));
        assert_eq!(txn.state(), TransactionState::Aborted);
    }

    #[test]
    fn test_read_committed_keeps_growing_on_shared_release() {
        let (registry, lm) = setup();
        let txn = register(&registry, 1, IsolationLevel::ReadCommitted);
        let a = Rid::new(1, 0);
        let b = Rid::new(1, 1);

        assert!(lm.lock_shared(&txn, a));
        assert!(lm.unlock(&txn, a));
        assert_eq!(txn.state(), TransactionState::Growing);

        assert!(lm.lock_exclusive(&txn, b));
        assert!(lm.unlock(&txn, b));
        assert_eq!(txn.state(), TransactionState::Shrinking);
    }

    #[test]
    fn test_reentrant_lock_returns_true() {
        let (registry, lm) = setup();
        let txn = register(&registry, 1, IsolationLevel::RepeatableRead);
        let rid = Rid::new(1, 0);

        assert!(lm.lock_exclusive(&txn, rid));
        assert!(lm.lock_exclusive(&txn, rid));
        assert_eq!(txn.exclusive_lock_count(), 1);
    }

    #[test]
    fn test_upgrade_single_holder() {
        let (registry, lm) = setup();
        let txn = register(&registry, 1, IsolationLevel::RepeatableRead);
        let rid = Rid::new(1, 0);

        assert!(lm.lock_shared(&txn, rid));
        assert!(lm.lock_upgrade(&txn, rid));
        assert!(!txn.is_shared_locked(rid));
        assert!(txn.is_exclusive_locked(rid));
    }

    #[test]
    fn test_unlock_without_lock_returns_false() {
        let (registry, lm) = setup();
        let txn = register(&registry, 1, IsolationLevel::RepeatableRead);
        assert!(!lm.unlock(&txn, Rid::new(9, 9)));
    }

    #[test]
    fn test_older_wounds_younger_holder() {
        let (registry, lm) = setup();
        let t1 = register(&registry, 1, IsolationLevel::RepeatableRead);
        let t5 = register(&registry, 5, IsolationLevel::RepeatableRead);
        let rid = Rid::new(1, 0);

        assert!(lm.lock_exclusive(&t5, rid));

        // The older transaction preempts without blocking
        assert!(lm.lock_exclusive(&t1, rid));
        assert_eq!(t5.state(), TransactionState::Aborted);
        assert!(!t5.is_exclusive_locked(rid));
        assert!(t1.is_exclusive_locked(rid));
    }

    #[test]
    fn test_upgrade_wounds_younger_shared_holder() {
        let (registry, lm) = setup();
        let t2 = register(&registry, 2, IsolationLevel::RepeatableRead);
        let t3 = register(&registry, 3, IsolationLevel::RepeatableRead);
        let rid = Rid::new(1, 0);

        assert!(lm.lock_shared(&t2, rid));
        assert!(lm.lock_shared(&t3, rid));

        // t2 starts an upgrade; it wounds the younger shared holder t3 and
        // completes immediately
        assert!(lm.lock_upgrade(&t2, rid));
        assert_eq!(t3.state(), TransactionState::Aborted);
        assert!(t2.is_exclusive_locked(rid));
    }
}
