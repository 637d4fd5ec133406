use crate::error::{ForkTreeError, ForkTreeResult};
use crate::logging::debug;
use raw_sync::locks::{LockGuard, LockImpl, LockInit, Mutex};
use shared_memory::{Shmem, ShmemConf};

/// Layout of the segment: `[ mutex | padding to 8 | u64 counter ]`.
const COUNTER_SIZE: usize = std::mem::size_of::<u64>();

fn align8(len: usize) -> usize {
    (len + 7) & !7
}

/// Handle to the shared counter segment.
///
/// The segment is anonymous: it is never attached by name, only inherited by
/// processes forked after [`SharedCounter::allocate`]. Children see live
/// updates made by their siblings, never copies. The counter is only reachable
/// through a [`CounterGuard`], i.e. while the process-shared mutex is held.
pub struct SharedCounter {
    // declared before `shm` so the lock handle drops before the mapping
    lock: Option<Box<dyn LockImpl>>,
    shm: Option<Shmem>,
}

impl SharedCounter {
    /// Create a segment holding one mutex and one counter set to `initial`.
    ///
    /// Must run before any fork; descendants reuse the inherited mapping and
    /// never initialize the mutex again.
    pub fn allocate(initial: u64) -> ForkTreeResult<Self> {
        let lock_region = align8(Mutex::size_of(None));
        let shm = ShmemConf::new()
            .size(lock_region + COUNTER_SIZE)
            .create()
            .map_err(|err| ForkTreeError::allocation("shm create", err))?;

        let lock = initialize_lock(&shm)?;
        let counter = Self {
            lock: Some(lock),
            shm: Some(shm),
        };

        let mut guard = counter.acquire()?;
        guard.set(initial);
        guard.release()?;

        debug(format!(
            "allocated shared counter segment ({} bytes, initial={})",
            lock_region + COUNTER_SIZE,
            initial
        ));
        Ok(counter)
    }

    /// Block until this process holds the mutex.
    pub fn acquire(&self) -> ForkTreeResult<CounterGuard<'_>> {
        let lock = self
            .lock
            .as_deref()
            .ok_or_else(|| ForkTreeError::sync("acquire", "shared segment already released"))?;
        let inner = lock
            .lock()
            .map_err(|err| ForkTreeError::sync("acquire", err.to_string()))?;
        Ok(CounterGuard { inner, lock })
    }

    /// Unmap and unlink the segment.
    ///
    /// Only the root calls this, once every descendant has been reaped.
    pub fn release(&mut self) -> ForkTreeResult<()> {
        let mut shm = self.shm.take().ok_or(ForkTreeError::Detach {
            operation: "release",
            message: "shared segment already released".to_string(),
        })?;
        self.lock = None;
        let os_id = shm.get_os_id().to_string();
        shm.set_owner(true);
        drop(shm);
        debug(format!("released shared counter segment {}", os_id));
        Ok(())
    }

    pub fn is_released(&self) -> bool {
        self.shm.is_none()
    }
}

impl std::fmt::Debug for SharedCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedCounter")
            .field("os_id", &self.shm.as_ref().map(|shm| shm.get_os_id().to_string()))
            .field("released", &self.is_released())
            .finish()
    }
}

/// Configure the process-shared mutex at the head of the segment.
///
/// raw_sync initializes the pthread mutex with `PTHREAD_PROCESS_SHARED`, so
/// the lock works across the address spaces created by fork.
fn initialize_lock(shm: &Shmem) -> ForkTreeResult<Box<dyn LockImpl>> {
    let ptr = shm.as_ptr();
    let lock_region = align8(Mutex::size_of(Some(ptr)));

    if shm.len() < lock_region + COUNTER_SIZE {
        return Err(ForkTreeError::Allocation {
            operation: "shm layout",
            message: format!(
                "segment of {} bytes cannot hold a {} byte mutex and the counter",
                shm.len(),
                lock_region
            ),
            source: None,
        });
    }

    // SAFETY: the segment was just created by this process and is at least
    // `lock_region + COUNTER_SIZE` bytes long (checked above), so both the
    // mutex storage at `ptr` and the counter at `ptr + lock_region` are in
    // bounds. Nothing else can observe the memory before this returns.
    let data_ptr = unsafe { ptr.add(lock_region) };
    let (lock, _) = unsafe { Mutex::new(ptr, data_ptr) }
        .map_err(|err| ForkTreeError::sync("initialize", err.to_string()))?;
    Ok(lock)
}

/// Exclusive access to the counter; the mutex is held for the guard's lifetime.
///
/// Dropping the guard releases the lock. Call [`CounterGuard::release`] to
/// surface an unlock failure as an error instead.
pub struct CounterGuard<'a> {
    inner: LockGuard<'a>,
    lock: &'a dyn LockImpl,
}

impl CounterGuard<'_> {
    fn slot(&self) -> *mut u64 {
        *self.inner as *mut u64
    }

    pub fn get(&self) -> u64 {
        // SAFETY: the data pointer targets the 8-byte aligned counter slot of
        // a live mapping, and holding the mutex gives exclusive access.
        unsafe { std::ptr::read_volatile(self.slot()) }
    }

    pub fn set(&mut self, value: u64) {
        // SAFETY: see `get`.
        unsafe { std::ptr::write_volatile(self.slot(), value) }
    }

    /// Add one and return the new value.
    pub fn increment(&mut self) -> u64 {
        let next = self.get().saturating_add(1);
        self.set(next);
        next
    }

    pub fn release(self) -> ForkTreeResult<()> {
        let CounterGuard { inner, lock } = self;
        std::mem::forget(inner);
        lock.release()
            .map_err(|err| ForkTreeError::sync("release", err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_sets_initial_value() {
        let counter = SharedCounter::allocate(1).unwrap();
        let guard = counter.acquire().unwrap();
        assert_eq!(guard.get(), 1);
        guard.release().unwrap();
    }

    #[test]
    fn increments_are_visible_to_next_holder() {
        let counter = SharedCounter::allocate(0).unwrap();
        for expected in 1..=5 {
            let mut guard = counter.acquire().unwrap();
            assert_eq!(guard.increment(), expected);
            guard.release().unwrap();
        }
        assert_eq!(counter.acquire().unwrap().get(), 5);
    }

    #[test]
    fn dropping_guard_releases_lock() {
        let counter = SharedCounter::allocate(3).unwrap();
        {
            let mut guard = counter.acquire().unwrap();
            guard.set(9);
        }
        // would block forever if the drop above had not unlocked
        let guard = counter.acquire().unwrap();
        assert_eq!(guard.get(), 9);
    }

    #[test]
    fn second_release_is_a_detach_error() {
        let mut counter = SharedCounter::allocate(1).unwrap();
        counter.release().unwrap();
        assert!(counter.is_released());

        let err = counter.release().unwrap_err();
        assert!(matches!(err, ForkTreeError::Detach { .. }));
    }

    #[test]
    fn acquire_after_release_fails() {
        let mut counter = SharedCounter::allocate(1).unwrap();
        counter.release().unwrap();
        assert!(matches!(
            counter.acquire(),
            Err(ForkTreeError::SyncPrimitive { .. })
        ));
    }
}
