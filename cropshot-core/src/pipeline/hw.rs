//! Reference-counted hardware handles.
//!
//! [`HwDeviceRef`] and [`HwFramesRef`] stand for one reference on a device
//! context and on a frame pool. `Clone` takes a reference and `Drop` gives it
//! back; the underlying object is freed when its last reference goes. Every
//! acquire, release and free is counted in a shared [`RefLedger`] so a job
//! can be checked for leaks and double releases after the fact.

use super::types::PixelFormat;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Counters and event log for hardware references.
#[derive(Debug, Default)]
pub struct RefLedger {
    acquired: AtomicUsize,
    released: AtomicUsize,
    freed: AtomicUsize,
    next_id: AtomicUsize,
    events: Mutex<Vec<String>>,
}

impl RefLedger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn next_id(&self) -> usize {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn acquire(&self, what: &str) {
        self.acquired.fetch_add(1, Ordering::SeqCst);
        log::trace!("acquire {}", what);
    }

    fn release(&self, what: &str) {
        self.released.fetch_add(1, Ordering::SeqCst);
        log::trace!("release {}", what);
    }

    fn free(&self, what: &str) {
        self.freed.fetch_add(1, Ordering::SeqCst);
        self.record(format!("free {what}"));
    }

    /// Appends an event to the log.
    pub fn record(&self, event: impl Into<String>) {
        let event = event.into();
        log::trace!("{}", event);
        self.events
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(event);
    }

    pub fn events(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    pub fn acquired(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    /// Objects (devices and pools) whose last reference was released.
    pub fn freed(&self) -> usize {
        self.freed.load(Ordering::SeqCst)
    }

    /// References taken but not yet given back.
    pub fn outstanding(&self) -> isize {
        self.acquired() as isize - self.released() as isize
    }
}

struct DeviceInner {
    id: usize,
    device_index: String,
    ledger: Arc<RefLedger>,
}

impl Drop for DeviceInner {
    fn drop(&mut self) {
        self.ledger.free(&format!("device#{}", self.id));
    }
}

/// One reference on a hardware device context.
pub struct HwDeviceRef {
    inner: Arc<DeviceInner>,
}

impl HwDeviceRef {
    /// Creates a device context and returns its first reference.
    pub fn create(device_index: &str, ledger: &Arc<RefLedger>) -> Self {
        let id = ledger.next_id();
        ledger.acquire(&format!("device#{id}"));
        Self {
            inner: Arc::new(DeviceInner {
                id,
                device_index: device_index.to_string(),
                ledger: Arc::clone(ledger),
            }),
        }
    }

    pub fn device_index(&self) -> &str {
        &self.inner.device_index
    }

    pub fn id(&self) -> usize {
        self.inner.id
    }
}

impl Clone for HwDeviceRef {
    fn clone(&self) -> Self {
        self.inner
            .ledger
            .acquire(&format!("device#{}", self.inner.id));
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Drop for HwDeviceRef {
    fn drop(&mut self) {
        self.inner
            .ledger
            .release(&format!("device#{}", self.inner.id));
    }
}

impl fmt::Debug for HwDeviceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HwDeviceRef(device#{} cuda:{})", self.inner.id, self.inner.device_index)
    }
}

struct FramesInner {
    id: usize,
    // Keeps the device alive for as long as the pool exists.
    device: HwDeviceRef,
    format: PixelFormat,
    sw_format: PixelFormat,
    width: u32,
    height: u32,
    pool_size: usize,
    ledger: Arc<RefLedger>,
}

impl Drop for FramesInner {
    fn drop(&mut self) {
        self.ledger.free(&format!("frames#{}", self.id));
    }
}

/// One reference on a pool of GPU-resident frame buffers.
pub struct HwFramesRef {
    inner: Arc<FramesInner>,
}

impl HwFramesRef {
    /// Allocates a CUDA/NV12 pool on `device`.
    pub fn alloc(device: &HwDeviceRef, width: u32, height: u32, pool_size: usize) -> Self {
        let ledger = Arc::clone(&device.inner.ledger);
        let id = ledger.next_id();
        ledger.acquire(&format!("frames#{id}"));
        Self {
            inner: Arc::new(FramesInner {
                id,
                device: device.clone(),
                format: PixelFormat::Cuda,
                sw_format: PixelFormat::Nv12,
                width,
                height,
                pool_size,
                ledger,
            }),
        }
    }

    pub fn id(&self) -> usize {
        self.inner.id
    }

    pub fn device(&self) -> &HwDeviceRef {
        &self.inner.device
    }

    pub fn format(&self) -> PixelFormat {
        self.inner.format
    }

    pub fn sw_format(&self) -> PixelFormat {
        self.inner.sw_format
    }

    pub fn width(&self) -> u32 {
        self.inner.width
    }

    pub fn height(&self) -> u32 {
        self.inner.height
    }

    pub fn pool_size(&self) -> usize {
        self.inner.pool_size
    }

    /// True when both references point at the same pool.
    pub fn same_pool(&self, other: &HwFramesRef) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Clone for HwFramesRef {
    fn clone(&self) -> Self {
        self.inner
            .ledger
            .acquire(&format!("frames#{}", self.inner.id));
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Drop for HwFramesRef {
    fn drop(&mut self) {
        self.inner
            .ledger
            .release(&format!("frames#{}", self.inner.id));
    }
}

impl fmt::Debug for HwFramesRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "HwFramesRef(frames#{} {}x{} pool {})",
            self.inner.id, self.inner.width, self.inner.height, self.inner.pool_size
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_and_drops_balance() {
        let ledger = RefLedger::new();
        {
            let device = HwDeviceRef::create("0", &ledger);
            let pool = HwFramesRef::alloc(&device, 1920, 1080, 20);
            let copies: Vec<HwFramesRef> = (0..5).map(|_| pool.clone()).collect();
            assert!(copies.iter().all(|c| c.same_pool(&pool)));
            assert_eq!(ledger.outstanding(), 1 + 1 + 1 + 5);
        }
        assert_eq!(ledger.outstanding(), 0);
        assert_eq!(ledger.freed(), 2);
    }

    #[test]
    fn pool_keeps_device_alive() {
        let ledger = RefLedger::new();
        let device = HwDeviceRef::create("0", &ledger);
        let pool = HwFramesRef::alloc(&device, 640, 360, 4);
        drop(device);
        assert_eq!(ledger.freed(), 0);
        assert_eq!(pool.device().device_index(), "0");
        drop(pool);
        let events = ledger.events();
        assert_eq!(events, vec!["free frames#2", "free device#1"]);
    }
}
