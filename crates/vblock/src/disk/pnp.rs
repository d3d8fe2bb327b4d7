//! 磁盘 PnP 请求处理
//!
//! 磁盘是总线枚举出的物理设备，自己完成所有 PnP 请求，不再向下转发。

use alloc::format;
use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;

use crate::device::{Device, DeviceState};
use crate::driver::Driver;
use crate::host::RelationType;
use crate::irp::{
    BusInformation, DeviceCapabilities, Dispatched, IdType, Irp, IrpParams, IrpResult,
    LegacyBusType, Status, TextType, pnp,
};

use super::{Disk, not_a_disk};

fn finish(irp: &mut Irp, status: Status) -> Dispatched {
    irp.complete(status);
    Dispatched::done(status)
}

pub(super) fn simple(_driver: &Driver, dev: &dyn Device, irp: &mut Irp) -> Dispatched {
    let Some(disk) = dev.as_disk() else {
        return not_a_disk(irp);
    };
    let node = disk.node();

    let status = match irp.minor() {
        pnp::START_DEVICE => {
            node.set_state(DeviceState::Started);
            Status::Success
        }
        pnp::QUERY_STOP_DEVICE => {
            node.set_state(DeviceState::StopPending);
            Status::Success
        }
        pnp::CANCEL_STOP_DEVICE => {
            if node.state() == DeviceState::StopPending {
                node.restore_state();
            }
            Status::Success
        }
        pnp::STOP_DEVICE => {
            node.set_state(DeviceState::Stopped);
            Status::Success
        }
        pnp::QUERY_REMOVE_DEVICE => {
            node.set_state(DeviceState::RemovePending);
            Status::Success
        }
        pnp::CANCEL_REMOVE_DEVICE => {
            if node.state() == DeviceState::RemovePending {
                node.restore_state();
            }
            Status::Success
        }
        pnp::REMOVE_DEVICE => {
            node.set_state(DeviceState::NotStarted);
            if disk.is_unmounting() {
                log::info!("disk {:?}: unmount on remove", disk.number());
                disk.close();
                node.set_state(DeviceState::Deleted);
            }
            Status::Success
        }
        pnp::SURPRISE_REMOVAL => {
            node.set_state(DeviceState::SurpriseRemovePending);
            Status::Success
        }
        pnp::QUERY_CAPABILITIES
        | pnp::QUERY_BUS_INFORMATION
        | pnp::QUERY_DEVICE_RELATIONS
        | pnp::QUERY_DEVICE_TEXT
        | pnp::QUERY_ID => return Dispatched::pass(irp.io_status),
        _ => irp.io_status,
    };
    finish(irp, status)
}

pub(super) fn query_capabilities(_driver: &Driver, dev: &dyn Device, irp: &mut Irp) -> Dispatched {
    let Some(disk) = dev.as_disk() else {
        return not_a_disk(irp);
    };
    let number = disk.number().unwrap_or(0);
    irp.result = IrpResult::Capabilities(DeviceCapabilities {
        removable: disk.removable(),
        eject_supported: disk.removable(),
        unique_id: false,
        raw_device_ok: false,
        address: number,
        ui_number: number,
    });
    finish(irp, Status::Success)
}

pub(super) fn query_bus_info(_driver: &Driver, dev: &dyn Device, irp: &mut Irp) -> Dispatched {
    if dev.as_disk().is_none() {
        return not_a_disk(irp);
    }
    irp.result = IrpResult::BusInformation(BusInformation {
        legacy_bus_type: LegacyBusType::PnpBus,
        bus_number: 0,
    });
    finish(irp, Status::Success)
}

pub(super) fn query_dev_relations(
    _driver: &Driver,
    dev: &dyn Device,
    irp: &mut Irp,
) -> Dispatched {
    let Some(disk) = dev.as_disk() else {
        return not_a_disk(irp);
    };
    if !matches!(irp.params, IrpParams::QueryRelations(RelationType::TargetDevice)) {
        let status = irp.io_status;
        return finish(irp, status);
    }
    let Some(handle) = disk.node().self_handle() else {
        return finish(irp, Status::NoSuchDevice);
    };
    irp.result = IrpResult::Relations(vec![handle]);
    irp.information = 1;
    finish(irp, Status::Success)
}

fn device_id(driver: &Driver, disk: &Disk) -> String {
    format!("{}\\{}", driver.config().bus_name, disk.media().compat_id())
}

pub(super) fn query_dev_text(driver: &Driver, dev: &dyn Device, irp: &mut Irp) -> Dispatched {
    let Some(disk) = dev.as_disk() else {
        return not_a_disk(irp);
    };
    let bus_name = &driver.config().bus_name;
    let text = match irp.params {
        IrpParams::QueryText(TextType::Description) => {
            format!("{} {}", bus_name, disk.media().description())
        }
        IrpParams::QueryText(TextType::LocationInformation) => format!(
            "{} {} {}",
            bus_name,
            disk.media().description(),
            disk.number().unwrap_or(0)
        ),
        _ => {
            let status = irp.io_status;
            return finish(irp, status);
        }
    };
    irp.information = text.len();
    irp.result = IrpResult::Text(text);
    finish(irp, Status::Success)
}

pub(super) fn query_id(driver: &Driver, dev: &dyn Device, irp: &mut Irp) -> Dispatched {
    let Some(disk) = dev.as_disk() else {
        return not_a_disk(irp);
    };
    let compat = String::from(disk.media().compat_id());
    let ids: Vec<String> = match irp.params {
        IrpParams::QueryId(IdType::DeviceId) => vec![device_id(driver, disk)],
        IrpParams::QueryId(IdType::HardwareIds) => vec![device_id(driver, disk), compat],
        IrpParams::QueryId(IdType::CompatibleIds) => vec![compat],
        IrpParams::QueryId(IdType::InstanceId) => {
            vec![format!("{:08}", disk.number().unwrap_or(0))]
        }
        _ => {
            let status = irp.io_status;
            return finish(irp, status);
        }
    };
    irp.information = ids.len();
    irp.result = IrpResult::Ids(ids);
    finish(irp, Status::Success)
}
