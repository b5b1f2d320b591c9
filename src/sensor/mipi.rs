use tock_registers::interfaces::{ReadWriteable, Writeable};

use crate::{
    geometry::Size,
    registers::{
        CsisRegisters,
        csis::{CSIS_CONFIG, CSIS_CTRL, CSIS_DPHYCTRL},
    },
};

/// Bring up the CSI-2 receiver for `lanes` data lanes.
pub fn csis_enable(regs: &CsisRegisters, lanes: u32, settle: u32, size: Size) {
    let lanes = lanes.clamp(1, 4);
    regs.ctrl.write(CSIS_CTRL::SW_RESET::SET);
    regs.ctrl.write(CSIS_CTRL::LANE_NUMBER.val(lanes - 1));
    regs.config.write(CSIS_CONFIG::DATAFORMAT::Raw10);
    regs.resol.set((size.width << 16) | size.height);
    regs.dphyctrl.write(
        CSIS_DPHYCTRL::HSSETTLE.val(settle)
            + CSIS_DPHYCTRL::ENABLE_CLK::SET
            + CSIS_DPHYCTRL::ENABLE_DAT.val((1 << lanes) - 1),
    );
    regs.ctrl.modify(CSIS_CTRL::ENABLE::SET);
    debug!(
        "csis on: {} lane(s), settle {}, {}x{}",
        lanes, settle, size.width, size.height
    );
}

pub fn csis_disable(regs: &CsisRegisters) {
    regs.ctrl.modify(CSIS_CTRL::ENABLE::CLEAR);
    regs.dphyctrl.set(0);
    debug!("csis off");
}
