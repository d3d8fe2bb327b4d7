//! Integration tests for bus creation, child attachment and bus PnP handling.

use std::sync::Arc;

use test_support::{MockHost, RecordingBackend};
use vblock::irp::{MajorFunction, pnp};
use vblock::{
    AttachPolicy, Device, DeviceError, DeviceFlags, DeviceState, Disk, DiskSpec, Driver,
    DriverConfig, HostDeviceType, Irp, IrpParams, IrpResult, MediaKind, PhysicalHandle,
    RelationType, Status,
};

fn driver(host: &Arc<MockHost>) -> Driver {
    Driver::new(host.ops(), DriverConfig::default())
}

fn attached(host: &Arc<MockHost>, config: DriverConfig) -> (Driver, PhysicalHandle) {
    let driver = Driver::new(host.ops(), config);
    let pdo = host.enumerated_pdo();
    driver.add_device(Some(pdo)).unwrap();
    (driver, pdo)
}

fn new_disk(driver: &Driver) -> Arc<Disk> {
    driver
        .create_disk(
            DiskSpec::new(MediaKind::HardDisk, 4096),
            Box::new(RecordingBackend::new()),
        )
        .unwrap()
}

#[test]
fn test_add_device_is_idempotent() {
    let host = MockHost::new();
    let driver = driver(&host);
    assert!(driver.bus().is_none());

    let first = driver.add_device(None).unwrap();
    let second = driver.add_device(None).unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(host.created().len(), 1);

    let created = &host.created()[0];
    assert_eq!(created.device_type, HostDeviceType::Controller);
    assert_eq!(created.name.as_deref(), Some("WinVBlock"));
    assert!(!first.node().flags().contains(DeviceFlags::INITIALIZING));
    assert!(first.node().flags().contains(DeviceFlags::DIRECT_IO));
}

#[test]
fn test_add_device_attach_failure_leaves_no_bus() {
    let host = MockHost::new();
    host.set_fail_attach(true);
    let driver = driver(&host);

    let pdo = host.enumerated_pdo();
    assert_eq!(driver.add_device(Some(pdo)).err(), Some(DeviceError::NoSuchDevice));
    assert!(driver.bus().is_none());
    assert_eq!(host.live_count(), 0);
}

#[test]
fn test_add_device_create_failure() {
    let host = MockHost::new();
    host.set_fail_create(true);
    let driver = driver(&host);
    assert_eq!(
        driver.add_device(None).err(),
        Some(DeviceError::InsufficientResources)
    );
    assert!(driver.bus().is_none());
}

#[test]
fn test_add_child_without_bus() {
    let host = MockHost::new();
    let driver = driver(&host);
    let disk = new_disk(&driver);

    assert_eq!(driver.add_child(disk.clone()), Err(DeviceError::NoBus));
    assert!(host.created().is_empty());
    assert!(disk.node().parent().is_none());
}

#[test]
fn test_add_child_appends_in_order() {
    let host = MockHost::new();
    let (driver, pdo) = attached(&host, DriverConfig::default());
    let bus = driver.bus().unwrap();

    let disks: Vec<_> = (0..3).map(|_| new_disk(&driver)).collect();
    for (i, disk) in disks.iter().enumerate() {
        driver.add_child(disk.clone()).unwrap();
        assert_eq!(bus.child_count(), i + 1);
    }

    let children = bus.children();
    assert_eq!(children.len(), 3);
    for (child, disk) in children.iter().zip(&disks) {
        assert!(vblock::same_device(child.as_ref(), &**disk));
    }

    let handles: Vec<_> = disks
        .iter()
        .map(|d| d.node().self_handle().unwrap())
        .collect();
    assert_eq!(bus.child_handles(), handles);

    // Each attach asks the host to re-enumerate the bus.
    let invalidations = host.invalidations();
    assert_eq!(invalidations.len(), 3);
    assert!(invalidations.iter().all(|&(p, r)| p == pdo && r == RelationType::Bus));
}

#[test]
fn test_add_child_sets_parent_and_clears_initializing() {
    let host = MockHost::new();
    let (driver, _) = attached(&host, DriverConfig::default());
    let disk = new_disk(&driver);
    driver.add_child(disk.clone()).unwrap();

    let parent = disk.node().parent().unwrap();
    assert!(parent.as_bus().is_some());
    assert!(!disk.node().flags().contains(DeviceFlags::INITIALIZING));
    assert_eq!(disk.node().state(), DeviceState::NotStarted);
}

#[test]
fn test_add_child_create_failure_keeps_list() {
    let host = MockHost::new();
    let (driver, _) = attached(&host, DriverConfig::default());
    let bus = driver.bus().unwrap();
    let disk = new_disk(&driver);

    host.set_fail_create(true);
    assert_eq!(
        driver.add_child(disk.clone()),
        Err(DeviceError::InsufficientResources)
    );
    assert_eq!(bus.child_count(), 0);
    assert!(host.invalidations().is_empty());
}

#[test]
fn test_add_child_twice_is_rejected() {
    let host = MockHost::new();
    let (driver, _) = attached(&host, DriverConfig::default());
    let bus = driver.bus().unwrap();
    let disk = new_disk(&driver);

    driver.add_child(disk.clone()).unwrap();
    assert_eq!(
        driver.add_child(disk.clone()),
        Err(DeviceError::InvalidParameter)
    );
    assert_eq!(bus.child_count(), 1);
}

#[test]
fn test_lenient_init_failure_still_attaches() {
    let host = MockHost::new();
    let (driver, _) = attached(&host, DriverConfig::default());
    let bus = driver.bus().unwrap();

    let backend = RecordingBackend::new().failing_init(DeviceError::Io);
    let log = backend.log();
    let disk = driver
        .create_disk(DiskSpec::new(MediaKind::HardDisk, 64), Box::new(backend))
        .unwrap();

    assert_eq!(driver.add_child(disk.clone()), Ok(()));
    assert_eq!(log.inits(), 1);
    assert_eq!(bus.child_count(), 1);
}

#[test]
fn test_strict_init_failure_rolls_back() {
    let host = MockHost::new();
    let config = DriverConfig {
        attach_policy: AttachPolicy::Strict,
        ..DriverConfig::default()
    };
    let (driver, _) = attached(&host, config);
    let bus = driver.bus().unwrap();

    let backend = RecordingBackend::new().failing_init(DeviceError::Io);
    let disk = driver
        .create_disk(DiskSpec::new(MediaKind::HardDisk, 64), Box::new(backend))
        .unwrap();
    let before = host.deleted().len();

    assert_eq!(driver.add_child(disk.clone()), Err(DeviceError::InitFailed));
    assert_eq!(bus.child_count(), 0);
    assert!(disk.node().parent().is_none());
    assert!(disk.node().self_handle().is_none());
    assert_eq!(host.deleted().len(), before + 1);
}

#[test]
fn test_query_bus_relations_lists_children() {
    let host = MockHost::new();
    let (driver, _) = attached(&host, DriverConfig::default());
    let bus = driver.bus().unwrap();
    let a = new_disk(&driver);
    let b = new_disk(&driver);
    driver.add_child(a.clone()).unwrap();
    driver.add_child(b.clone()).unwrap();

    let mut irp = Irp::pnp(pnp::QUERY_DEVICE_RELATIONS)
        .with_params(IrpParams::QueryRelations(RelationType::Bus));
    let outcome = driver.dispatch(&*bus, &mut irp);

    assert!(outcome.completion);
    assert_eq!(
        irp.result,
        IrpResult::Relations(vec![
            a.node().self_handle().unwrap(),
            b.node().self_handle().unwrap(),
        ])
    );
    assert_eq!(irp.information, 2);
    // The bus is a function device: the request goes down the stack.
    assert_eq!(host.forwarded().len(), 1);
}

#[test]
fn test_bus_start_forwards_and_sets_started() {
    let host = MockHost::new();
    let (driver, _) = attached(&host, DriverConfig::default());
    let bus = driver.bus().unwrap();

    let mut irp = Irp::pnp(pnp::START_DEVICE);
    let outcome = driver.dispatch(&*bus, &mut irp);
    assert_eq!(outcome.status, Status::Success);
    assert_eq!(bus.node().state(), DeviceState::Started);

    let forwarded = host.forwarded();
    assert_eq!(forwarded.len(), 1);
    assert_eq!(forwarded[0].1, MajorFunction::Pnp);
    assert_eq!(Some(forwarded[0].0), bus.lower_device());
}

#[test]
fn test_bus_start_failure_keeps_state() {
    let host = MockHost::new();
    let (driver, _) = attached(&host, DriverConfig::default());
    let bus = driver.bus().unwrap();
    host.set_lower_status(Status::Unsuccessful);

    let mut irp = Irp::pnp(pnp::START_DEVICE);
    let outcome = driver.dispatch(&*bus, &mut irp);
    assert_eq!(outcome.status, Status::Unsuccessful);
    assert_eq!(bus.node().state(), DeviceState::NotStarted);
}

#[test]
fn test_bus_stop_transitions() {
    let host = MockHost::new();
    let (driver, _) = attached(&host, DriverConfig::default());
    let bus = driver.bus().unwrap();

    driver.dispatch(&*bus, &mut Irp::pnp(pnp::START_DEVICE));
    driver.dispatch(&*bus, &mut Irp::pnp(pnp::QUERY_STOP_DEVICE));
    assert_eq!(bus.node().state(), DeviceState::StopPending);

    driver.dispatch(&*bus, &mut Irp::pnp(pnp::CANCEL_STOP_DEVICE));
    assert_eq!(bus.node().state(), DeviceState::Started);

    driver.dispatch(&*bus, &mut Irp::pnp(pnp::STOP_DEVICE));
    assert_eq!(bus.node().state(), DeviceState::Stopped);
}

#[test]
fn test_bus_unknown_pnp_is_left_to_caller() {
    let host = MockHost::new();
    let (driver, _) = attached(&host, DriverConfig::default());
    let bus = driver.bus().unwrap();

    let mut irp = Irp::pnp(pnp::QUERY_CAPABILITIES);
    let outcome = driver.dispatch(&*bus, &mut irp);
    assert!(!outcome.completion);
    assert!(!irp.is_completed());
    assert!(host.forwarded().is_empty());
}

#[test]
fn test_bus_device_control_is_invalid() {
    let host = MockHost::new();
    let (driver, _) = attached(&host, DriverConfig::default());
    let bus = driver.bus().unwrap();

    let mut irp = Irp::new(MajorFunction::DeviceControl, 0)
        .with_params(IrpParams::DeviceControl { code: 0x1234 });
    let outcome = driver.dispatch(&*bus, &mut irp);
    assert_eq!(outcome.status, Status::InvalidDeviceRequest);
    assert!(irp.is_completed());
}

#[test]
fn test_bus_remove_drains_children_and_stops() {
    let host = MockHost::new();
    let (driver, _) = attached(&host, DriverConfig::default());
    let bus = driver.bus().unwrap();

    let backend = RecordingBackend::new();
    let log = backend.log();
    let disk = driver
        .create_disk(DiskSpec::new(MediaKind::HardDisk, 64), Box::new(backend))
        .unwrap();
    driver.add_child(disk.clone()).unwrap();
    let disk_handle = disk.node().self_handle().unwrap();

    let mut irp = Irp::pnp(pnp::REMOVE_DEVICE);
    let outcome = driver.dispatch(&*bus, &mut irp);
    assert!(outcome.completion);

    assert_eq!(bus.child_count(), 0);
    assert_eq!(bus.node().state(), DeviceState::Deleted);
    assert!(driver.bus().is_none());
    assert_eq!(log.closes(), 1);
    assert_eq!(disk.node().state(), DeviceState::Deleted);
    assert!(host.deleted().contains(&disk_handle));
    assert_eq!(host.live_count(), 0);

    // Removed from the bus, but still known to the registry until torn down.
    assert!(driver.registry().contains(&disk));
    driver.teardown_disk(&disk).unwrap();
    assert_eq!(log.closes(), 1);
    assert!(driver.registry().is_empty());
}

#[test]
fn test_driver_stop_clears_bus() {
    let host = MockHost::new();
    let (driver, _) = attached(&host, DriverConfig::default());
    driver.stop();
    assert!(driver.bus().is_none());
    let disk = new_disk(&driver);
    assert_eq!(driver.add_child(disk), Err(DeviceError::NoBus));
}

#[test]
fn test_torn_down_disk_cannot_be_reattached() {
    let host = MockHost::new();
    let (driver, _) = attached(&host, DriverConfig::default());
    let bus = driver.bus().unwrap();
    let disk = new_disk(&driver);

    driver.add_child(disk.clone()).unwrap();
    driver.teardown_disk(&disk).unwrap();
    let created = host.created().len();

    assert_eq!(
        driver.add_child(disk.clone()),
        Err(DeviceError::AlreadyTornDown)
    );
    assert_eq!(bus.child_count(), 0);
    assert!(disk.node().self_handle().is_none());
    assert!(disk.node().parent().is_none());
    assert_eq!(host.created().len(), created);
    assert_eq!(host.live_count(), 1);
}

#[test]
fn test_failed_attach_can_be_retried() {
    let host = MockHost::new();
    let (driver, _) = attached(&host, DriverConfig::default());
    let bus = driver.bus().unwrap();
    let disk = new_disk(&driver);

    host.set_fail_create(true);
    assert!(driver.add_child(disk.clone()).is_err());
    assert!(!disk.node().is_attached());

    host.set_fail_create(false);
    assert_eq!(driver.add_child(disk.clone()), Ok(()));
    assert!(disk.node().is_attached());
    assert_eq!(bus.child_count(), 1);
}
