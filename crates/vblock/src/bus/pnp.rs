//! 总线请求处理
//!
//! 总线是功能设备：能处理的请求处理后交给下层设备，未识别的 PnP
//! 请求返回未完成，由调用者继续向下转发。

use crate::device::{Device, DeviceState, same_device};
use crate::driver::Driver;
use crate::host::RelationType;
use crate::irp::{Dispatched, Irp, IrpParams, IrpResult, Status, pnp};

use super::Bus;

fn not_a_bus(irp: &mut Irp) -> Dispatched {
    log::error!("bus handler invoked on a non-bus device");
    irp.complete(Status::InvalidDeviceRequest);
    Dispatched::done(Status::InvalidDeviceRequest)
}

/// 交给下层设备；没有下层设备时以当前状态完成
fn forward(driver: &Driver, bus: &Bus, irp: &mut Irp) -> Dispatched {
    match bus.lower_device() {
        Some(lower) => Dispatched::done(driver.host().call_lower(lower, irp)),
        None => {
            let status = irp.io_status;
            irp.complete(status);
            Dispatched::done(status)
        }
    }
}

pub(super) fn sys_ctl(driver: &Driver, dev: &dyn Device, irp: &mut Irp) -> Dispatched {
    let Some(bus) = dev.as_bus() else {
        return not_a_bus(irp);
    };
    forward(driver, bus, irp)
}

pub(super) fn power(driver: &Driver, dev: &dyn Device, irp: &mut Irp) -> Dispatched {
    let Some(bus) = dev.as_bus() else {
        return not_a_bus(irp);
    };
    forward(driver, bus, irp)
}

pub(super) fn dev_ctl(_driver: &Driver, _dev: &dyn Device, irp: &mut Irp) -> Dispatched {
    irp.complete(Status::InvalidDeviceRequest);
    Dispatched::done(Status::InvalidDeviceRequest)
}

pub(super) fn simple(driver: &Driver, dev: &dyn Device, irp: &mut Irp) -> Dispatched {
    let Some(bus) = dev.as_bus() else {
        return not_a_bus(irp);
    };
    let node = bus.node();

    match irp.minor() {
        pnp::QUERY_STOP_DEVICE => node.set_state(DeviceState::StopPending),
        pnp::CANCEL_STOP_DEVICE => {
            if node.state() == DeviceState::StopPending {
                node.restore_state();
            }
        }
        pnp::STOP_DEVICE => node.set_state(DeviceState::Stopped),
        pnp::QUERY_REMOVE_DEVICE => node.set_state(DeviceState::RemovePending),
        pnp::CANCEL_REMOVE_DEVICE => {
            if node.state() == DeviceState::RemovePending {
                node.restore_state();
            }
        }
        pnp::SURPRISE_REMOVAL => node.set_state(DeviceState::SurpriseRemovePending),
        _ => return Dispatched::pass(irp.io_status),
    }

    irp.io_status = Status::Success;
    forward(driver, bus, irp)
}

pub(super) fn start_dev(driver: &Driver, dev: &dyn Device, irp: &mut Irp) -> Dispatched {
    let Some(bus) = dev.as_bus() else {
        return not_a_bus(irp);
    };

    let status = match bus.lower_device() {
        Some(lower) => driver.host().call_lower(lower, irp),
        None => Status::Success,
    };
    if status.is_success() {
        bus.node().set_state(DeviceState::Started);
    }
    if !irp.is_completed() {
        irp.complete(status);
    }
    Dispatched::done(status)
}

pub(super) fn remove_dev(driver: &Driver, dev: &dyn Device, irp: &mut Irp) -> Dispatched {
    let Some(bus) = dev.as_bus() else {
        return not_a_bus(irp);
    };

    for child in bus.drain_children() {
        child.close();
        child.node().set_state(DeviceState::Deleted);
        child.node().clear_parent();
        child.node().release_physical();
        child.node().release_attach();
    }
    bus.node().set_state(DeviceState::Deleted);

    irp.io_status = Status::Success;
    let outcome = forward(driver, bus, irp);

    if driver
        .bus()
        .is_some_and(|current| same_device(&*current, bus))
    {
        driver.stop();
    }
    bus.node().release_physical();
    outcome
}

pub(super) fn query_dev_relations(
    driver: &Driver,
    dev: &dyn Device,
    irp: &mut Irp,
) -> Dispatched {
    let Some(bus) = dev.as_bus() else {
        return not_a_bus(irp);
    };

    if let IrpParams::QueryRelations(RelationType::Bus) = irp.params {
        let handles = bus.child_handles();
        irp.information = handles.len();
        irp.result = IrpResult::Relations(handles);
        irp.io_status = Status::Success;
    }
    forward(driver, bus, irp)
}
