//! Backend traits.
//!
//! The engine never talks to a driver directly. It opens transactions through
//! a [`Connection`] and issues [`request`](crate::request) values against a
//! [`Transaction`].

use crate::error::Result;
use crate::request::{DeleteRequest, InsertRequest, SchemaOperation, SelectRequest, UpdateRequest};
use crate::row::Row;

/// Forward-only stream of result rows.
///
/// The cursor owns whatever it reads from; a backend may fetch eagerly and
/// hand out a buffered iterator.
pub type RowCursor = Box<dyn Iterator<Item = Result<Row>>>;

/// One open database transaction.
pub trait Transaction {
    fn select(&mut self, request: &SelectRequest) -> Result<RowCursor>;

    /// Insert a row and return the generated identity, if any.
    fn insert(&mut self, request: &InsertRequest) -> Result<Option<i64>>;

    /// Update matching rows and return how many changed.
    fn update(&mut self, request: &UpdateRequest) -> Result<u64>;

    /// Delete matching rows and return how many were removed.
    fn delete(&mut self, request: &DeleteRequest) -> Result<u64>;

    fn execute_schema(&mut self, operation: &SchemaOperation) -> Result<()>;

    fn commit(&mut self) -> Result<()>;

    fn rollback(&mut self) -> Result<()>;

    /// False once committed or rolled back.
    fn is_active(&self) -> bool;
}

/// A source of transactions.
pub trait Connection {
    fn begin(&self) -> Result<Box<dyn Transaction>>;
}

impl<C: Connection + ?Sized> Connection for &C {
    fn begin(&self) -> Result<Box<dyn Transaction>> {
        (**self).begin()
    }
}

impl<C: Connection + ?Sized> Connection for std::sync::Arc<C> {
    fn begin(&self) -> Result<Box<dyn Transaction>> {
        (**self).begin()
    }
}

/// A locally owned transaction that rolls back when dropped while still
/// active.
pub struct TransactionScope {
    tx: Box<dyn Transaction>,
}

impl TransactionScope {
    pub fn begin<C: Connection + ?Sized>(connection: &C) -> Result<Self> {
        let tx = connection.begin()?;
        tracing::debug!("Opened local transaction");
        Ok(Self { tx })
    }

    pub fn transaction(&mut self) -> &mut dyn Transaction {
        self.tx.as_mut()
    }

    pub fn commit(mut self) -> Result<()> {
        tracing::debug!("Committing local transaction");
        self.tx.commit()
    }

    pub fn rollback(mut self) -> Result<()> {
        tracing::debug!("Rolling back local transaction");
        self.tx.rollback()
    }
}

impl Drop for TransactionScope {
    fn drop(&mut self) {
        if self.tx.is_active() {
            match self.tx.rollback() {
                Ok(()) => tracing::debug!("Rolled back abandoned local transaction"),
                Err(err) => tracing::warn!(error = %err, "Rollback of local transaction failed"),
            }
        }
    }
}

impl std::fmt::Debug for TransactionScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionScope")
            .field("active", &self.tx.is_active())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Default)]
    struct Log {
        events: Vec<&'static str>,
    }

    struct FakeTx {
        log: Rc<RefCell<Log>>,
        active: bool,
    }

    impl Transaction for FakeTx {
        fn select(&mut self, _: &SelectRequest) -> Result<RowCursor> {
            Ok(Box::new(std::iter::empty()))
        }
        fn insert(&mut self, _: &InsertRequest) -> Result<Option<i64>> {
            Ok(Some(1))
        }
        fn update(&mut self, _: &UpdateRequest) -> Result<u64> {
            Ok(0)
        }
        fn delete(&mut self, _: &DeleteRequest) -> Result<u64> {
            Ok(0)
        }
        fn execute_schema(&mut self, _: &SchemaOperation) -> Result<()> {
            Ok(())
        }
        fn commit(&mut self) -> Result<()> {
            self.active = false;
            self.log.borrow_mut().events.push("commit");
            Ok(())
        }
        fn rollback(&mut self) -> Result<()> {
            self.active = false;
            self.log.borrow_mut().events.push("rollback");
            Ok(())
        }
        fn is_active(&self) -> bool {
            self.active
        }
    }

    struct FakeConnection {
        log: Rc<RefCell<Log>>,
    }

    impl Connection for FakeConnection {
        fn begin(&self) -> Result<Box<dyn Transaction>> {
            Ok(Box::new(FakeTx {
                log: Rc::clone(&self.log),
                active: true,
            }))
        }
    }

    #[test]
    fn test_scope_rolls_back_on_drop() {
        let log = Rc::new(RefCell::new(Log::default()));
        let connection = FakeConnection { log: Rc::clone(&log) };
        {
            let mut scope = TransactionScope::begin(&connection).unwrap();
            assert!(scope.transaction().is_active());
        }
        assert_eq!(log.borrow().events, vec!["rollback"]);
    }

    #[test]
    fn test_committed_scope_does_not_roll_back() {
        let log = Rc::new(RefCell::new(Log::default()));
        let connection = FakeConnection { log: Rc::clone(&log) };
        let scope = TransactionScope::begin(&connection).unwrap();
        scope.commit().unwrap();
        assert_eq!(log.borrow().events, vec!["commit"]);
    }
}
