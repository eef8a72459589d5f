//! Transaction coordination.
//!
//! Wraps the external datastore transaction and runs registered
//! synchronization hooks on commit and rollback. The state machine per
//! transaction is `NotActive -> Active -> (Committing | RollingBack) ->
//! NotActive`. Hooks are registered once at manager construction and fire
//! strictly in registration order; the cache-clearing hook runs on every
//! completion path, even when an earlier hook or the external transaction
//! fails, so no boundary can leave stale cache entries behind.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use tracing::{debug, info, warn};

use crate::error::{Result, TesseraError};
use crate::session::DatastoreTransaction;

/// The state of the coordinated transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxState {
    /// No transaction is open.
    NotActive,
    /// A transaction is open and accepts operations.
    Active,
    /// Commit is in progress (hooks running, external commit pending).
    Committing,
    /// Rollback is in progress.
    RollingBack,
}

/// A hook run at transaction completion.
///
/// `before_completion` runs on the commit path only, before the external
/// commit; an error aborts the commit and triggers rollback instead.
/// `after_completion` runs on both paths once the external transaction has
/// finished, with `success` reporting the outcome.
pub trait Synchronization {
    /// Called before the external commit. Errors abort the commit.
    fn before_completion(&self) -> Result<()> {
        Ok(())
    }

    /// Called after the external transaction completed either way.
    fn after_completion(&self, success: bool);
}

struct TxInner {
    datastore: Rc<dyn DatastoreTransaction>,
    state: Cell<TxState>,
    synchronizations: RefCell<Vec<Box<dyn Synchronization>>>,
}

/// Handle on the coordinated transaction of one manager.
///
/// Cheap to clone; all clones share state. Begin, commit and rollback are
/// explicit — there is no ambient transaction scope.
#[derive(Clone)]
pub struct Transaction {
    inner: Rc<TxInner>,
}

impl Transaction {
    pub(crate) fn new(datastore: Rc<dyn DatastoreTransaction>) -> Self {
        Self {
            inner: Rc::new(TxInner {
                datastore,
                state: Cell::new(TxState::NotActive),
                synchronizations: RefCell::new(Vec::new()),
            }),
        }
    }

    pub(crate) fn register_synchronization(&self, synchronization: Box<dyn Synchronization>) {
        self.inner
            .synchronizations
            .borrow_mut()
            .push(synchronization);
    }

    /// The current coordinator state.
    pub fn state(&self) -> TxState {
        self.inner.state.get()
    }

    /// Whether a transaction is currently active.
    pub fn is_active(&self) -> bool {
        self.inner.state.get() == TxState::Active
    }

    /// Opens a transaction. Fails with [`TesseraError::TransactionActive`]
    /// if one is already open.
    pub fn begin(&self) -> Result<()> {
        if self.inner.state.get() != TxState::NotActive {
            return Err(TesseraError::TransactionActive);
        }
        self.inner.datastore.begin()?;
        self.inner.state.set(TxState::Active);
        debug!("transaction started");
        Ok(())
    }

    /// Commits the transaction.
    ///
    /// Runs `before_completion` hooks in registration order; a hook error
    /// (e.g. outstanding constraint violations) rolls the external
    /// transaction back, fires `after_completion(false)`, and surfaces the
    /// hook error — the caller never observes a half-committed state. An
    /// external commit error is propagated after `after_completion(false)`
    /// has run.
    pub fn commit(&self) -> Result<()> {
        self.ensure_active()?;
        self.inner.state.set(TxState::Committing);

        for synchronization in self.inner.synchronizations.borrow().iter() {
            if let Err(violation) = synchronization.before_completion() {
                warn!(error = %violation, "commit aborted, rolling back");
                self.inner.state.set(TxState::RollingBack);
                if let Err(rollback_error) = self.inner.datastore.rollback() {
                    warn!(error = %rollback_error, "rollback after aborted commit failed");
                }
                self.complete(false);
                return Err(violation);
            }
        }

        let result = self.inner.datastore.commit();
        self.complete(result.is_ok());
        match result {
            Ok(()) => {
                info!("transaction committed");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    /// Rolls the transaction back, discarding all staged record-level
    /// state. Any external error is propagated after the hooks have run.
    pub fn rollback(&self) -> Result<()> {
        self.ensure_active()?;
        self.inner.state.set(TxState::RollingBack);
        let result = self.inner.datastore.rollback();
        self.complete(false);
        warn!("transaction rolled back");
        result
    }

    fn complete(&self, success: bool) {
        for synchronization in self.inner.synchronizations.borrow().iter() {
            synchronization.after_completion(success);
        }
        self.inner.state.set(TxState::NotActive);
    }

    pub(crate) fn ensure_active(&self) -> Result<()> {
        if self.inner.state.get() != TxState::Active {
            return Err(TesseraError::TransactionNotActive);
        }
        Ok(())
    }
}
