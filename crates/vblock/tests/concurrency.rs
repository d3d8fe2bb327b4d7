//! Concurrent attach, enumeration and teardown.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use test_support::{MockHost, RecordingBackend};
use vblock::irp::pnp;
use vblock::{
    Device, DeviceError, DiskSpec, Driver, DriverConfig, DriverHandle, HostOps, Irp, IrpParams,
    IrpResult, MediaKind, PhysicalDesc, PhysicalHandle, RelationType, Status,
};

const THREADS: usize = 8;
const PER_THREAD: usize = 16;

fn attached() -> (Arc<MockHost>, Arc<Driver>) {
    let host = MockHost::new();
    let driver = Driver::new(host.ops(), DriverConfig::default());
    driver.add_device(Some(host.enumerated_pdo())).unwrap();
    (host, Arc::new(driver))
}

fn new_disk(driver: &Driver) -> Arc<vblock::Disk> {
    driver
        .create_disk(
            DiskSpec::new(MediaKind::HardDisk, 64),
            Box::new(RecordingBackend::new()),
        )
        .unwrap()
}

#[test]
fn test_concurrent_add_child_keeps_every_device() {
    let (host, driver) = attached();
    let barrier = Arc::new(Barrier::new(THREADS));

    let workers: Vec<_> = (0..THREADS)
        .map(|_| {
            let driver = Arc::clone(&driver);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for _ in 0..PER_THREAD {
                    let disk = new_disk(&driver);
                    driver.add_child(disk).unwrap();
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    let bus = driver.bus().unwrap();
    assert_eq!(bus.child_count(), THREADS * PER_THREAD);
    assert_eq!(bus.children().len(), THREADS * PER_THREAD);
    assert_eq!(driver.registry().len(), THREADS * PER_THREAD);

    let numbers: HashSet<_> = driver
        .registry()
        .snapshot()
        .iter()
        .map(|d| d.number().unwrap())
        .collect();
    assert_eq!(numbers.len(), THREADS * PER_THREAD);
    assert_eq!(host.invalidations().len(), THREADS * PER_THREAD);
}

#[test]
fn test_enumeration_during_attach_sees_consistent_lists() {
    let (_host, driver) = attached();
    let bus = driver.bus().unwrap();

    let writer = {
        let driver = Arc::clone(&driver);
        thread::spawn(move || {
            for _ in 0..THREADS * PER_THREAD {
                driver.add_child(new_disk(&driver)).unwrap();
            }
        })
    };

    let mut last = 0;
    while last < THREADS * PER_THREAD {
        let mut irp = Irp::pnp(pnp::QUERY_DEVICE_RELATIONS)
            .with_params(IrpParams::QueryRelations(RelationType::Bus));
        driver.dispatch(&*bus, &mut irp);
        let IrpResult::Relations(handles) = irp.result else {
            panic!("expected relations");
        };
        // The list only grows while the writer runs.
        assert!(handles.len() >= last);
        assert_eq!(handles.len(), irp.information);
        last = handles.len();
    }
    writer.join().unwrap();

    let handles = bus.child_handles();
    let unique: HashSet<_> = handles.iter().collect();
    assert_eq!(unique.len(), handles.len());
}

#[test]
fn test_racing_teardown_runs_once() {
    let (host, driver) = attached();

    for _ in 0..PER_THREAD {
        let backend = RecordingBackend::new();
        let log = backend.log();
        let disk = driver
            .create_disk(DiskSpec::new(MediaKind::HardDisk, 64), Box::new(backend))
            .unwrap();
        driver.add_child(disk.clone()).unwrap();
        let handle = disk.node().self_handle().unwrap();

        let barrier = Arc::new(Barrier::new(THREADS));
        let workers: Vec<_> = (0..THREADS)
            .map(|_| {
                let driver = Arc::clone(&driver);
                let disk = Arc::clone(&disk);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    driver.teardown_disk(&disk)
                })
            })
            .collect();
        let results: Vec<_> = workers
            .into_iter()
            .map(|worker| worker.join().unwrap())
            .collect();

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(
            results
                .iter()
                .filter(|r| r.is_err())
                .all(|r| *r == Err(DeviceError::AlreadyTornDown))
        );
        assert_eq!(log.closes(), 1);
        assert_eq!(host.deleted().iter().filter(|&&h| h == handle).count(), 1);
    }

    assert!(driver.registry().is_empty());
    assert_eq!(driver.bus().unwrap().child_count(), 0);
}

#[test]
fn test_concurrent_register_and_teardown() {
    let (_host, driver) = attached();
    let barrier = Arc::new(Barrier::new(THREADS));

    let workers: Vec<_> = (0..THREADS)
        .map(|_| {
            let driver = Arc::clone(&driver);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for _ in 0..PER_THREAD {
                    let disk = new_disk(&driver);
                    driver.add_child(disk.clone()).unwrap();
                    driver.teardown_disk(&disk).unwrap();
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    assert!(driver.registry().is_empty());
    assert_eq!(driver.bus().unwrap().child_count(), 0);
}

/// Holds `create_device` open until released, so a second attach can run
/// while the first one is still in progress.
struct GatedHost {
    inner: Arc<MockHost>,
    gate_armed: AtomicBool,
    entered: AtomicBool,
    released: AtomicBool,
}

impl GatedHost {
    fn new(inner: Arc<MockHost>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            gate_armed: AtomicBool::new(false),
            entered: AtomicBool::new(false),
            released: AtomicBool::new(false),
        })
    }

    fn wait_entered(&self) {
        while !self.entered.load(Ordering::SeqCst) {
            thread::yield_now();
        }
    }
}

impl HostOps for GatedHost {
    fn create_device(
        &self,
        driver: DriverHandle,
        desc: &PhysicalDesc<'_>,
    ) -> Result<PhysicalHandle, DeviceError> {
        if self.gate_armed.load(Ordering::SeqCst) {
            self.entered.store(true, Ordering::SeqCst);
            while !self.released.load(Ordering::SeqCst) {
                thread::yield_now();
            }
        }
        self.inner.create_device(driver, desc)
    }

    fn delete_device(&self, handle: PhysicalHandle) {
        self.inner.delete_device(handle);
    }

    fn attach_to_stack(&self, fdo: PhysicalHandle, pdo: PhysicalHandle) -> Option<PhysicalHandle> {
        self.inner.attach_to_stack(fdo, pdo)
    }

    fn invalidate_relations(&self, pdo: PhysicalHandle, relation: RelationType) {
        self.inner.invalidate_relations(pdo, relation);
    }

    fn call_lower(&self, lower: PhysicalHandle, irp: &mut Irp) -> Status {
        self.inner.call_lower(lower, irp)
    }
}

#[test]
fn test_same_device_attached_concurrently_once() {
    let mock = MockHost::new();
    let host = GatedHost::new(Arc::clone(&mock));
    let host_ops: Arc<dyn HostOps> = host.clone();
    let driver = Arc::new(Driver::new(host_ops, DriverConfig::default()));
    driver.add_device(Some(mock.enumerated_pdo())).unwrap();
    let bus = driver.bus().unwrap();

    let disk = new_disk(&driver);
    host.gate_armed.store(true, Ordering::SeqCst);

    let first = {
        let driver = Arc::clone(&driver);
        let disk = Arc::clone(&disk);
        thread::spawn(move || driver.add_child(disk))
    };
    host.wait_entered();

    // The first attach is parked inside create_device.
    assert_eq!(
        driver.add_child(disk.clone()),
        Err(DeviceError::InvalidParameter)
    );

    host.released.store(true, Ordering::SeqCst);
    assert_eq!(first.join().unwrap(), Ok(()));

    assert_eq!(bus.child_count(), 1);
    assert_eq!(bus.children().len(), 1);
    // Bus object plus one disk object; nothing replaced or deleted.
    assert_eq!(mock.created().len(), 2);
    assert!(mock.deleted().is_empty());
    assert_eq!(mock.invalidations().len(), 1);
}
