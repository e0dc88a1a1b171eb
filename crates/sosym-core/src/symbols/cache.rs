//! # Module Symbol Cache
//!
//! Maps module identities to loaded symbol tables and hands out opaque
//! [`SymbolHandle`]s for them.
//!
//! ## Concurrency
//!
//! - Each identity owns a [`OnceCell`]; the first caller runs the resolver and
//!   every concurrent caller for the same identity blocks on the cell and
//!   observes the same result. "Not found" is cached the same way.
//! - The identity table lock is only held long enough to fetch the cell, so
//!   resolutions of different modules run in parallel.
//! - Every loaded table sits behind its own `RwLock`. Queries hold the read
//!   side as their lease; disposal takes the write side, so it waits for
//!   in-flight queries and every later query sees the table gone.
//!
//! - Lock order is `slots` before `handles`. A handle is registered, and
//!   unregistered, in one step with its identity's slot, so a load never
//!   observes a handle that is being disposed. A resolution whose slot was
//!   cleared by [`ModuleSymbolCache::dispose_all`] while it ran is discarded.
//!
//! Handle values come from a monotonically increasing counter and are never
//! reused, so a stale handle can always be told apart from a live one.

use std::collections::HashMap;
use std::fmt;
use std::mem;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use once_cell::sync::OnceCell;
use tracing::debug;

use super::resolver::{LoadRequest, ResolveSymbols};
use super::table::SymbolTable;
use crate::error::{SymbolError, SymbolResult};
use crate::types::{ModuleIdentity, SymbolOrigin};

/// Opaque token for a loaded symbol table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymbolHandle(u64);

impl SymbolHandle
{
    pub const fn as_u64(self) -> u64
    {
        self.0
    }

    /// Rebuild a handle from a value previously returned by [`as_u64`].
    ///
    /// Hosts that pass handles across an FFI boundary use this; an unknown
    /// value simply fails every query with [`SymbolError::InvalidHandle`].
    ///
    /// [`as_u64`]: SymbolHandle::as_u64
    pub const fn from_raw(value: u64) -> Self
    {
        Self(value)
    }
}

impl fmt::Display for SymbolHandle
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "#{}", self.0)
    }
}

struct LoadedSymbols
{
    identity: ModuleIdentity,
    origin: SymbolOrigin,
    /// `None` once disposed.
    table: RwLock<Option<SymbolTable>>,
}

type ResolutionCell = Arc<OnceCell<Option<SymbolHandle>>>;

/// Cache of loaded symbol tables keyed by [`ModuleIdentity`].
pub struct ModuleSymbolCache
{
    resolver: Arc<dyn ResolveSymbols>,
    slots: Mutex<HashMap<ModuleIdentity, ResolutionCell>>,
    handles: RwLock<HashMap<SymbolHandle, Arc<LoadedSymbols>>>,
    next_handle: AtomicU64,
}

impl ModuleSymbolCache
{
    pub fn new(resolver: Arc<dyn ResolveSymbols>) -> Self
    {
        Self {
            resolver,
            slots: Mutex::new(HashMap::new()),
            handles: RwLock::new(HashMap::new()),
            next_handle: AtomicU64::new(1),
        }
    }

    /// Handle for the request's module, resolving symbols on first use.
    ///
    /// Returns `None` when no symbols are available; that outcome is cached
    /// until [`forget_missing`](Self::forget_missing) or
    /// [`dispose_all`](Self::dispose_all).
    pub fn load_or_get(&self, request: &LoadRequest) -> Option<SymbolHandle>
    {
        let cell = lock(&self.slots).entry(request.identity().clone()).or_default().clone();
        *cell.get_or_init(|| self.resolve(request, &cell))
    }

    /// Like [`load_or_get`](Self::load_or_get), disposing the handle when the
    /// returned guard drops.
    pub fn load_scoped(&self, request: &LoadRequest) -> Option<ScopedSymbolHandle<'_>>
    {
        self.load_or_get(request)
            .map(|handle| ScopedSymbolHandle { cache: self, handle })
    }

    fn resolve(&self, request: &LoadRequest, cell: &ResolutionCell) -> Option<SymbolHandle>
    {
        let resolved = self.resolver.resolve(request)?;

        let slots = lock(&self.slots);
        let current = slots
            .get(request.identity())
            .is_some_and(|slot| Arc::ptr_eq(slot, cell));
        if !current {
            debug!(module = %request.identity(), "discarding symbols resolved across dispose_all");
            return None;
        }
        let handle = SymbolHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        let loaded = LoadedSymbols {
            identity: request.identity().clone(),
            origin: resolved.origin,
            table: RwLock::new(Some(resolved.table)),
        };
        write(&self.handles).insert(handle, Arc::new(loaded));
        drop(slots);
        debug!(%handle, module = %request.identity(), "registered symbol handle");
        Some(handle)
    }

    /// Release a handle. Unknown and already disposed handles are ignored.
    ///
    /// Blocks until queries currently leasing the table finish.
    pub fn dispose(&self, handle: SymbolHandle)
    {
        let loaded = {
            let mut slots = lock(&self.slots);
            let Some(loaded) = write(&self.handles).remove(&handle) else {
                return;
            };
            let owns_slot = slots
                .get(&loaded.identity)
                .is_some_and(|cell| cell.get() == Some(&Some(handle)));
            if owns_slot {
                slots.remove(&loaded.identity);
            }
            loaded
        };

        // Waits for outstanding leases; new loads already resolve afresh.
        write(&loaded.table).take();
        debug!(%handle, module = %loaded.identity, "disposed symbol handle");
    }

    /// Release every handle and forget cached "not found" results.
    pub fn dispose_all(&self)
    {
        let drained: Vec<_> = {
            let mut slots = lock(&self.slots);
            slots.clear();
            write(&self.handles).drain().collect()
        };
        for (_, loaded) in &drained {
            write(&loaded.table).take();
        }
        if !drained.is_empty() {
            debug!(count = drained.len(), "disposed all symbol handles");
        }
    }

    /// Forget cached "not found" results so the next load retries them.
    ///
    /// Live handles are untouched.
    pub fn forget_missing(&self)
    {
        lock(&self.slots).retain(|_, cell| !matches!(cell.get(), Some(None)));
    }

    fn loaded(&self, handle: SymbolHandle) -> SymbolResult<Arc<LoadedSymbols>>
    {
        read(&self.handles)
            .get(&handle)
            .cloned()
            .ok_or(SymbolError::InvalidHandle(handle.0))
    }

    /// Run `f` against the handle's table while holding a read lease on it.
    ///
    /// ## Errors
    ///
    /// [`SymbolError::InvalidHandle`] if the handle is unknown or disposed.
    pub fn lease<R>(&self, handle: SymbolHandle, f: impl FnOnce(&SymbolTable) -> R) -> SymbolResult<R>
    {
        let loaded = self.loaded(handle)?;
        let table = read(&loaded.table);
        table.as_ref().map(f).ok_or(SymbolError::InvalidHandle(handle.0))
    }

    /// Where the handle's symbols were loaded from.
    pub fn origin(&self, handle: SymbolHandle) -> SymbolResult<SymbolOrigin>
    {
        self.loaded(handle).map(|loaded| loaded.origin.clone())
    }

    /// Module the handle was loaded for.
    pub fn identity(&self, handle: SymbolHandle) -> SymbolResult<ModuleIdentity>
    {
        self.loaded(handle).map(|loaded| loaded.identity.clone())
    }

    /// Number of live handles.
    pub fn len(&self) -> usize
    {
        read(&self.handles).len()
    }

    pub fn is_empty(&self) -> bool
    {
        self.len() == 0
    }
}

impl fmt::Debug for ModuleSymbolCache
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.debug_struct("ModuleSymbolCache")
            .field("live_handles", &self.len())
            .finish_non_exhaustive()
    }
}

/// Symbol handle that is disposed when dropped.
#[derive(Debug)]
pub struct ScopedSymbolHandle<'a>
{
    cache: &'a ModuleSymbolCache,
    handle: SymbolHandle,
}

impl ScopedSymbolHandle<'_>
{
    pub fn handle(&self) -> SymbolHandle
    {
        self.handle
    }

    /// Keep the handle alive past the guard; the caller disposes it.
    pub fn leak(self) -> SymbolHandle
    {
        let handle = self.handle;
        mem::forget(self);
        handle
    }
}

impl Drop for ScopedSymbolHandle<'_>
{
    fn drop(&mut self)
    {
        self.cache.dispose(self.handle);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T>
{
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T>
{
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T>
{
    lock.write().unwrap_or_else(PoisonError::into_inner)
}
