//! A column: a tuple-id-keyed log of typed values with header metadata.
//! Record id `1` holds the `ColumnHeader`; record ids from `2` hold
//! serialized values, one value per 4 KiB page.

use crate::config::Config;
use crate::error::{DbError, Result};
use crate::storage::{BufferPool, DirectDiskManager, DiskManager, PageId, WalDiskManager};
use crate::value::{Value, ValueType};
use parking_lot::{Mutex, RwLock};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{instrument, warn};

const COLUMN_IDENTIFIER: &[u8; 7] = b"COTTONC";
const HEADER_VERSION: u16 = 1;
const HEADER_TID: PageId = 1;

/// Flag byte stored ahead of every record's payload.
const FLAG_ABSENT: u8 = 0;
const FLAG_PRESENT: u8 = 1;
const FLAG_NULL: u8 = 2;

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// On-disk metadata for a column file.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnHeader {
    pub value_type: ValueType,
    pub nullable: bool,
    pub element_count: u64,
    pub created_millis: i64,
    pub modified_millis: i64,
}

impl ColumnHeader {
    fn new(value_type: ValueType, nullable: bool) -> Self {
        let now = now_millis();
        Self {
            value_type,
            nullable,
            element_count: 0,
            created_millis: now,
            modified_millis: now,
        }
    }

    fn write_to(&self, buf: &mut [u8]) {
        let mut off = 0;
        buf[off..off + 7].copy_from_slice(COLUMN_IDENTIFIER);
        off += 7;
        buf[off..off + 2].copy_from_slice(&HEADER_VERSION.to_le_bytes());
        off += 2;
        let name = self.value_type.base_name();
        let name_bytes = name.as_bytes();
        buf[off..off + 2].copy_from_slice(&(name_bytes.len() as u16).to_le_bytes());
        off += 2;
        buf[off..off + name_bytes.len()].copy_from_slice(name_bytes);
        off += name_bytes.len();
        buf[off..off + 4].copy_from_slice(&(self.value_type.logical_size() as i32).to_le_bytes());
        off += 4;
        buf[off] = self.nullable as u8;
        off += 1;
        buf[off..off + 8].copy_from_slice(&self.element_count.to_le_bytes());
        off += 8;
        buf[off..off + 8].copy_from_slice(&self.created_millis.to_le_bytes());
        off += 8;
        buf[off..off + 8].copy_from_slice(&self.modified_millis.to_le_bytes());
    }

    fn read_from(buf: &[u8]) -> Result<Self> {
        let bad = || DbError::Corruption("truncated column header".to_string());
        let mut off = 0;
        let identifier = buf.get(off..off + 7).ok_or_else(bad)?;
        if identifier != COLUMN_IDENTIFIER {
            return Err(DbError::InvalidFile("missing COTTONC identifier".into()));
        }
        off += 7;
        let version = u16::from_le_bytes(buf.get(off..off + 2).ok_or_else(bad)?.try_into().unwrap());
        if version != HEADER_VERSION {
            return Err(DbError::InvalidFile(format!("unsupported column header version {version}")));
        }
        off += 2;
        let name_len = u16::from_le_bytes(buf.get(off..off + 2).ok_or_else(bad)?.try_into().unwrap()) as usize;
        off += 2;
        let name = std::str::from_utf8(buf.get(off..off + name_len).ok_or_else(bad)?)
            .map_err(|e| DbError::Corruption(e.to_string()))?
            .to_string();
        off += name_len;
        let logical_size = i32::from_le_bytes(buf.get(off..off + 4).ok_or_else(bad)?.try_into().unwrap());
        off += 4;
        let nullable = *buf.get(off).ok_or_else(bad)? != 0;
        off += 1;
        let element_count = u64::from_le_bytes(buf.get(off..off + 8).ok_or_else(bad)?.try_into().unwrap());
        off += 8;
        let created_millis = i64::from_le_bytes(buf.get(off..off + 8).ok_or_else(bad)?.try_into().unwrap());
        off += 8;
        let modified_millis = i64::from_le_bytes(buf.get(off..off + 8).ok_or_else(bad)?.try_into().unwrap());

        if (element_count as i64) < 0 {
            return Err(DbError::Corruption("negative element count".into()));
        }
        Ok(Self {
            value_type: ValueType::from_parts(&name, logical_size)?,
            nullable,
            element_count,
            created_millis,
            modified_millis,
        })
    }
}

/// Which `DiskManager` backs a column's file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageVariant {
    Direct,
    WriteAheadLogged,
}

/// A named, typed column of values sharing a tuple-id space with its sibling
/// columns inside an entity.
pub struct Column {
    name: String,
    path: PathBuf,
    disk: Arc<dyn DiskManager>,
    header: RwLock<ColumnHeader>,
    /// Held in read mode for the entire life of any open transaction;
    /// `close` takes the write side.
    global_lock: RwLock<()>,
    /// Held in read mode by a transaction while it is non-mutating;
    /// try-upgraded to write mode on the transaction's first mutation.
    tx_lock: RwLock<()>,
    page_pool_capacity: usize,
}

impl Column {
    pub fn create(dir: &Path, name: &str, value_type: ValueType, nullable: bool, config: &Config, variant: StorageVariant) -> Result<Self> {
        let path = dir.join(format!("col_{name}.db"));
        let disk: Arc<dyn DiskManager> = match variant {
            StorageVariant::Direct => Arc::new(DirectDiskManager::open(
                &path,
                *b"COLM",
                config.page_size(),
                config.lock_timeout(),
            )?),
            StorageVariant::WriteAheadLogged => Arc::new(WalDiskManager::open(
                &path,
                *b"COLM",
                config.page_size(),
                config.lock_timeout(),
            )?),
        };

        let header = ColumnHeader::new(value_type, nullable);
        let pool = Arc::new(BufferPool::new(Arc::clone(&disk), 8));
        let mut handle = pool.new_page()?;
        if handle.id() != HEADER_TID {
            return Err(DbError::Corruption(
                "column header did not land on tuple id 1".into(),
            ));
        }
        header.write_to(handle.data_mut());
        drop(handle);
        pool.flush_all()?;
        disk.commit()?;

        Ok(Self {
            name: name.to_string(),
            path,
            disk,
            header: RwLock::new(header),
            global_lock: RwLock::new(()),
            tx_lock: RwLock::new(()),
            page_pool_capacity: 64,
        })
    }

    pub fn open(dir: &Path, name: &str, config: &Config, variant: StorageVariant) -> Result<Self> {
        let path = dir.join(format!("col_{name}.db"));
        let disk: Arc<dyn DiskManager> = match variant {
            StorageVariant::Direct => Arc::new(DirectDiskManager::open(
                &path,
                *b"COLM",
                config.page_size(),
                config.lock_timeout(),
            )?),
            StorageVariant::WriteAheadLogged => Arc::new(WalDiskManager::open(
                &path,
                *b"COLM",
                config.page_size(),
                config.lock_timeout(),
            )?),
        };

        let pool = Arc::new(BufferPool::new(Arc::clone(&disk), 8));
        let handle = pool.get(HEADER_TID)?;
        let header = ColumnHeader::read_from(handle.data())?;
        drop(handle);

        Ok(Self {
            name: name.to_string(),
            path,
            disk,
            header: RwLock::new(header),
            global_lock: RwLock::new(()),
            tx_lock: RwLock::new(()),
            page_pool_capacity: 64,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn value_type(&self) -> ValueType {
        self.header.read().value_type
    }

    pub fn nullable(&self) -> bool {
        self.header.read().nullable
    }

    pub fn count(&self) -> u64 {
        self.header.read().element_count
    }

    #[instrument(skip(self), fields(column = %self.name))]
    pub fn close(&self) -> Result<()> {
        self.disk.close()
    }

    /// Open a transaction against this column.
    pub fn begin(self: &Arc<Self>, read_only: bool) -> ColumnTx {
        ColumnTx::new(Arc::clone(self), read_only)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TxState {
    Clean,
    Dirty,
    Error,
    Closed,
}

/// Tracks whether a `ColumnTx` currently holds `Column::tx_lock` in read or
/// write mode. Read mode for non-mutating operations; try-upgraded to write
/// mode on the transaction's first mutation (§4.3).
enum TxLockGuard {
    Read(parking_lot::RwLockReadGuard<'static, ()>),
    Write(parking_lot::RwLockWriteGuard<'static, ()>),
}

/// A column transaction. State machine: `Clean -> Dirty -> Clean` (commit or
/// rollback), or `Clean/Dirty -> Error` on a storage failure during a
/// mutation. `Closed` is terminal.
pub struct ColumnTx {
    // Declared first so they are dropped first: struct fields drop in
    // declaration order, and both guards borrow from `column` below, so
    // neither must outlive it.
    _global_guard: parking_lot::RwLockReadGuard<'static, ()>,
    tx_guard: Mutex<Option<TxLockGuard>>,
    column: Arc<Column>,
    read_only: bool,
    state: AtomicU8,
    /// Private page view for this transaction's mutations; never shared.
    pool: RwLock<Option<Arc<BufferPool>>>,
    header: RwLock<ColumnHeader>,
}

// SAFETY: `_global_guard`/`tx_guard` borrow `column.global_lock` and
// `column.tx_lock`, which this struct also owns via the `column: Arc<Column>`
// field. Field order matters here: both guard fields are declared before
// `column` so they drop first.
unsafe fn extend_read<'a>(
    guard: parking_lot::RwLockReadGuard<'a, ()>,
) -> parking_lot::RwLockReadGuard<'static, ()> {
    std::mem::transmute(guard)
}

unsafe fn extend_write<'a>(
    guard: parking_lot::RwLockWriteGuard<'a, ()>,
) -> parking_lot::RwLockWriteGuard<'static, ()> {
    std::mem::transmute(guard)
}

impl ColumnTx {
    fn new(column: Arc<Column>, read_only: bool) -> Self {
        let guard = unsafe { extend_read(column.global_lock.read()) };
        let tx_guard = unsafe { extend_read(column.tx_lock.read()) };
        let header = column.header.read().clone();
        Self {
            column,
            read_only,
            state: AtomicU8::new(TxState::Clean as u8),
            pool: RwLock::new(None),
            header: RwLock::new(header),
            _global_guard: guard,
            tx_guard: Mutex::new(Some(TxLockGuard::Read(tx_guard))),
        }
    }

    fn state(&self) -> TxState {
        match self.state.load(Ordering::Acquire) {
            0 => TxState::Clean,
            1 => TxState::Dirty,
            2 => TxState::Error,
            _ => TxState::Closed,
        }
    }

    fn set_state(&self, s: TxState) {
        self.state.store(s as u8, Ordering::Release);
    }

    fn check_open(&self) -> Result<()> {
        match self.state() {
            TxState::Closed => Err(DbError::ClosedTx),
            TxState::Error => Err(DbError::TxInError),
            _ => Ok(()),
        }
    }

    /// Lazily create (or return) this transaction's private page pool.
    fn pool(&self) -> Arc<BufferPool> {
        let mut guard = self.pool.write();
        if guard.is_none() {
            *guard = Some(Arc::new(BufferPool::new(
                Arc::clone(&self.column.disk) as Arc<dyn DiskManager>,
                self.column.page_pool_capacity,
            )));
        }
        guard.as_ref().unwrap().clone()
    }

    fn ensure_writable(&self) -> Result<()> {
        self.check_open()?;
        if self.read_only {
            return Err(DbError::ReadOnly);
        }
        if self.state() == TxState::Clean {
            self.upgrade_tx_lock()?;
            self.set_state(TxState::Dirty);
        }
        Ok(())
    }

    /// Try-upgrades `tx_guard` from read to write mode. `parking_lot`'s
    /// `RwLock` has no atomic upgrade, so the read side is released first;
    /// a failed `try_write` never blocks (no waiting, so two columns can't
    /// deadlock against each other), and the read side is reacquired so the
    /// transaction stays usable for reads.
    fn upgrade_tx_lock(&self) -> Result<()> {
        let mut slot = self.tx_guard.lock();
        if matches!(slot.as_ref(), Some(TxLockGuard::Write(_))) {
            return Ok(());
        }
        *slot = None;
        match self.column.tx_lock.try_write() {
            Some(w) => {
                *slot = Some(TxLockGuard::Write(unsafe { extend_write(w) }));
                Ok(())
            }
            None => {
                if let Some(r) = self.column.tx_lock.try_read() {
                    *slot = Some(TxLockGuard::Read(unsafe { extend_read(r) }));
                }
                Err(DbError::WriteLockDenied(self.column.name.clone()))
            }
        }
    }

    /// Releases the tx-write lock back down to read mode, per §4.3 ("the
    /// tx-write lock is released on commit, rollback, or close").
    fn downgrade_tx_lock(&self) {
        let mut slot = self.tx_guard.lock();
        if !matches!(slot.as_ref(), Some(TxLockGuard::Write(_))) {
            return;
        }
        *slot = None;
        *slot = Some(TxLockGuard::Read(unsafe { extend_read(self.column.tx_lock.read()) }));
    }

    fn mark_error<T>(&self, err: DbError) -> Result<T> {
        self.set_state(TxState::Error);
        Err(err)
    }

    pub fn is_valid_tid(tid: u64) -> bool {
        tid >= 2
    }

    pub fn count(&self) -> Result<u64> {
        self.check_open()?;
        Ok(self.header.read().element_count)
    }

    pub fn max_tuple_id(&self) -> Result<PageId> {
        self.check_open()?;
        Ok(self.column.disk.page_count())
    }

    pub fn read(&self, tid: PageId) -> Result<Option<Value>> {
        self.check_open()?;
        if !Self::is_valid_tid(tid) {
            return Err(DbError::InvalidTupleId(tid));
        }
        let header = self.header.read().clone();
        let handle = match self.pool().get(tid) {
            Ok(h) => h,
            Err(DbError::PageIdOutOfBounds(_)) => return Err(DbError::InvalidTupleId(tid)),
            Err(e) => return Err(e),
        };
        decode_record(handle.data(), &header)
    }

    pub fn insert(&self, value: Option<Value>) -> Result<PageId> {
        self.ensure_writable()?;
        self.validate(&value)?;
        let pool = self.pool();
        let mut handle = match pool.new_page() {
            Ok(h) => h,
            Err(e) => return self.mark_error(e),
        };
        encode_record(handle.data_mut(), &value);
        let tid = handle.id();
        drop(handle);

        let mut header = self.header.write();
        header.element_count += 1;
        header.modified_millis = now_millis();
        Ok(tid)
    }

    pub fn insert_all(&self, values: Vec<Option<Value>>) -> Result<Vec<PageId>> {
        values.into_iter().map(|v| self.insert(v)).collect()
    }

    pub fn update(&self, tid: PageId, value: Option<Value>) -> Result<()> {
        self.ensure_writable()?;
        if !Self::is_valid_tid(tid) {
            return Err(DbError::InvalidTupleId(tid));
        }
        self.validate(&value)?;
        let mut handle = match self.pool().get(tid) {
            Ok(h) => h,
            Err(DbError::PageIdOutOfBounds(_)) => return Err(DbError::InvalidTupleId(tid)),
            Err(e) => return self.mark_error(e),
        };
        encode_record(handle.data_mut(), &value);
        self.header.write().modified_millis = now_millis();
        Ok(())
    }

    pub fn compare_and_update(&self, tid: PageId, expected: Option<Value>, value: Option<Value>) -> Result<bool> {
        self.ensure_writable()?;
        let current = self.read(tid)?;
        if current != expected {
            return Ok(false);
        }
        self.update(tid, value)?;
        Ok(true)
    }

    pub fn delete(&self, tid: PageId) -> Result<()> {
        self.ensure_writable()?;
        if !Self::is_valid_tid(tid) {
            return Err(DbError::InvalidTupleId(tid));
        }
        let was_present = self.read(tid)?.is_some() || self.is_present_null(tid)?;
        let mut handle = match self.pool().get(tid) {
            Ok(h) => h,
            Err(e) => return self.mark_error(e),
        };
        handle.data_mut()[0] = FLAG_ABSENT;
        drop(handle);
        if let Err(e) = self.column.disk.free(tid) {
            return self.mark_error(e);
        }
        if was_present {
            let mut header = self.header.write();
            header.element_count = header.element_count.saturating_sub(1);
            header.modified_millis = now_millis();
        }
        Ok(())
    }

    fn is_present_null(&self, tid: PageId) -> Result<bool> {
        let handle = self.pool().get(tid)?;
        Ok(handle.data()[0] == FLAG_NULL)
    }

    pub fn delete_all(&self, tids: &[PageId]) -> Result<()> {
        for &tid in tids {
            self.delete(tid)?;
        }
        Ok(())
    }

    /// Iterate tuple ids in ascending order, skipping the header record and
    /// deleted slots.
    pub fn for_each(&self, mut action: impl FnMut(PageId, Value) -> Result<()>) -> Result<()> {
        self.for_each_range(2, self.column.disk.page_count(), &mut action)
    }

    pub fn for_each_range(
        &self,
        from: PageId,
        to: PageId,
        action: &mut impl FnMut(PageId, Value) -> Result<()>,
    ) -> Result<()> {
        self.check_open()?;
        let header = self.header.read().clone();
        let max = self.column.disk.page_count();
        let to = to.min(max);
        for tid in from.max(2)..=to {
            let handle = self.pool().get(tid)?;
            if let Some(value) = decode_record(handle.data(), &header)? {
                action(tid, value)?;
            }
        }
        Ok(())
    }

    pub fn map<T>(&self, mut action: impl FnMut(PageId, Value) -> Result<T>) -> Result<Vec<T>> {
        let mut out = Vec::new();
        self.for_each(|tid, v| {
            out.push(action(tid, v)?);
            Ok(())
        })?;
        Ok(out)
    }

    fn validate(&self, value: &Option<Value>) -> Result<()> {
        let header = self.header.read();
        match value {
            None => {
                if !header.nullable {
                    return Err(DbError::NullNotAllowed(self.column.name.clone()));
                }
            }
            Some(v) => {
                let declared = header.value_type;
                let found = v.value_type();
                if declared.base_name() != found.base_name() {
                    return Err(DbError::TypeMismatch {
                        expected: declared.name(),
                        found: found.name(),
                    });
                }
                if declared.is_vector() && declared.logical_size() != found.logical_size() {
                    return Err(DbError::VectorSizeMismatch {
                        expected: declared.logical_size(),
                        found: found.logical_size(),
                    });
                }
            }
        }
        Ok(())
    }

    pub fn commit(&self) -> Result<()> {
        self.check_open()?;
        if self.state() != TxState::Dirty {
            self.set_state(TxState::Clean);
            return Ok(());
        }
        let pool = self.pool.read().clone();
        if let Some(pool) = pool {
            pool.flush_all()?;
        }
        self.column.disk.commit()?;
        *self.column.header.write() = self.header.read().clone();
        self.set_state(TxState::Clean);
        self.downgrade_tx_lock();
        Ok(())
    }

    pub fn rollback(&self) -> Result<()> {
        match self.state() {
            TxState::Closed => return Err(DbError::ClosedTx),
            _ => {}
        }
        *self.pool.write() = None;
        self.column.disk.rollback()?;
        *self.header.write() = self.column.header.read().clone();
        self.set_state(TxState::Clean);
        self.downgrade_tx_lock();
        Ok(())
    }

    pub fn close(&self) -> Result<()> {
        if self.state() == TxState::Closed {
            return Ok(());
        }
        if matches!(self.state(), TxState::Dirty | TxState::Error) {
            if let Err(e) = self.rollback() {
                warn!(error = %e, "rollback on close failed");
            }
        }
        self.downgrade_tx_lock();
        self.set_state(TxState::Closed);
        Ok(())
    }
}

impl Drop for ColumnTx {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

fn encode_record(page: &mut [u8], value: &Option<Value>) {
    match value {
        None => {
            page[0] = FLAG_NULL;
        }
        Some(v) => {
            page[0] = FLAG_PRESENT;
            let bytes = v.serialize();
            page[1..1 + bytes.len()].copy_from_slice(&bytes);
        }
    }
}

fn decode_record(page: &[u8], header: &ColumnHeader) -> Result<Option<Value>> {
    match page[0] {
        FLAG_ABSENT => Ok(None),
        FLAG_NULL => Ok(None),
        FLAG_PRESENT => Ok(Some(Value::deserialize(header.value_type, &page[1..])?)),
        other => Err(DbError::Corruption(format!("unknown record flag {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn new_int_column(dir: &Path) -> Arc<Column> {
        let config = Config::default();
        Arc::new(
            Column::create(dir, "c", ValueType::Int, false, &config, StorageVariant::WriteAheadLogged)
                .unwrap(),
        )
    }

    #[test]
    fn empty_column_count_is_zero() {
        let dir = tempdir().unwrap();
        let column = new_int_column(dir.path());
        let tx = column.begin(false);
        assert_eq!(tx.count().unwrap(), 0);
        let tid = tx.insert(Some(Value::Int(10))).unwrap();
        assert_eq!(tx.count().unwrap(), 1);
        assert_eq!(tx.read(tid).unwrap(), Some(Value::Int(10)));
        tx.commit().unwrap();
    }

    #[test]
    fn delete_then_iterate_skips_deleted_tid() {
        let dir = tempdir().unwrap();
        let column = new_int_column(dir.path());
        let tx = column.begin(false);
        let tids: Vec<_> = [1, 2, 3, 4, 5]
            .into_iter()
            .map(|v| tx.insert(Some(Value::Int(v))).unwrap())
            .collect();
        assert_eq!(tids, vec![2, 3, 4, 5, 6]);
        tx.delete(tids[2]).unwrap();

        let mut seen = Vec::new();
        tx.for_each(|tid, v| {
            seen.push((tid, v));
            Ok(())
        })
        .unwrap();

        assert_eq!(
            seen,
            vec![
                (2, Value::Int(1)),
                (3, Value::Int(2)),
                (5, Value::Int(4)),
                (6, Value::Int(5)),
            ]
        );
        assert_eq!(tx.count().unwrap(), 4);
        tx.commit().unwrap();
    }

    #[test]
    fn monotonic_tids_across_inserts() {
        let dir = tempdir().unwrap();
        let column = new_int_column(dir.path());
        let tx = column.begin(false);
        let a = tx.insert(Some(Value::Int(1))).unwrap();
        let b = tx.insert(Some(Value::Int(2))).unwrap();
        assert!(b > a);
        assert!(a >= 2);
    }

    #[test]
    fn closed_tx_rejects_operations() {
        let dir = tempdir().unwrap();
        let column = new_int_column(dir.path());
        let tx = column.begin(false);
        tx.insert(Some(Value::Int(1))).unwrap();
        tx.commit().unwrap();
        tx.close().unwrap();
        assert!(matches!(tx.read(2), Err(DbError::ClosedTx)));
    }

    #[test]
    fn null_rejected_on_non_nullable_column() {
        let dir = tempdir().unwrap();
        let column = new_int_column(dir.path());
        let tx = column.begin(false);
        assert!(matches!(tx.insert(None), Err(DbError::NullNotAllowed(_))));
    }

    #[test]
    fn read_only_tx_rejects_mutation() {
        let dir = tempdir().unwrap();
        let column = new_int_column(dir.path());
        let tx = column.begin(true);
        assert!(matches!(tx.insert(Some(Value::Int(1))), Err(DbError::ReadOnly)));
    }

    #[test]
    fn second_writer_denied_tx_lock_until_first_commits() {
        let dir = tempdir().unwrap();
        let column = new_int_column(dir.path());
        let first = column.begin(false);
        first.insert(Some(Value::Int(1))).unwrap();

        let second = column.begin(false);
        assert!(matches!(second.insert(Some(Value::Int(2))), Err(DbError::WriteLockDenied(_))));
        // The failed upgrade didn't cost the second tx its ability to read.
        assert_eq!(second.count().unwrap(), 1);

        first.commit().unwrap();
        second.insert(Some(Value::Int(2))).unwrap();
        second.commit().unwrap();
        assert_eq!(column.count(), 2);
    }
}
