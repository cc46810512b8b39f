//! Digital I/O port wired to the transceiver's trigger and echo pins.

use std::fs::{File, OpenOptions};
use std::os::unix::fs::FileExt;
use std::path::Path;

use parking_lot::Mutex;
use tracing::{error, info, trace};

use crate::error::TimingError;

/// Two independent single-bit lines: trigger out, echo in.
///
/// Both calls are synchronous and non-blocking. The port is shared between
/// the pulse generator (trigger only) and the echo timer (echo only).
pub trait DigitalPort: Send + Sync {
    fn write_trigger_line(&self, asserted: bool);
    fn read_echo_line(&self) -> bool;

    /// First I/O failure seen since the port was opened, if any.
    fn fault(&self) -> Option<TimingError> {
        None
    }
}

/// Register layout of an 8255-style digital I/O block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DioRegisters {
    /// Port A, drives the trigger line.
    pub trigger: u64,
    /// Port B, bit 0 carries the echo line.
    pub echo: u64,
    /// Control register selecting port directions.
    pub control: u64,
}

impl DioRegisters {
    /// Port A output, port B input.
    pub const CONTROL_WORD: u8 = 0x02;
    pub const TRIGGER_ASSERTED: u8 = 0xFF;
    pub const TRIGGER_DEASSERTED: u8 = 0x00;
    pub const ECHO_MASK: u8 = 0x01;

    /// Registers of a block based at `base` (port A, port B, control at +0, +1, +3).
    pub const fn at_base(base: u64) -> Self {
        DioRegisters {
            trigger: base,
            echo: base + 1,
            control: base + 3,
        }
    }
}

impl Default for DioRegisters {
    fn default() -> Self {
        DioRegisters::at_base(0x288)
    }
}

/// Register-level access through the Linux `/dev/port` device.
///
/// Requires raw I/O privileges. Opening the device and programming the
/// control register happen once in [`DevPortIo::open`]; a failure there is a
/// hardware initialisation failure and no sampling should start.
///
/// Later register failures cannot be returned through [`DigitalPort`]. The
/// first one is logged and latched in [`DigitalPort::fault`]; a failed echo
/// read reads as low.
#[derive(Debug)]
pub struct DevPortIo {
    device: File,
    registers: DioRegisters,
    fault: Mutex<Option<TimingError>>,
}

impl DevPortIo {
    pub const DEVICE: &'static str = "/dev/port";

    pub fn open(registers: DioRegisters) -> Result<Self, TimingError> {
        Self::open_path(Path::new(Self::DEVICE), registers)
    }

    pub fn open_path(path: &Path, registers: DioRegisters) -> Result<Self, TimingError> {
        let device = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| TimingError::HardwareInit(format!("{}: {}", path.display(), e)))?;

        let port = DevPortIo {
            device,
            registers,
            fault: Mutex::new(None),
        };
        port.write_register(registers.control, DioRegisters::CONTROL_WORD)
            .map_err(|e| TimingError::HardwareInit(format!("control register: {}", e)))?;
        port.write_register(registers.trigger, DioRegisters::TRIGGER_DEASSERTED)
            .map_err(|e| TimingError::HardwareInit(format!("trigger register: {}", e)))?;

        info!(
            trigger = registers.trigger,
            echo = registers.echo,
            "Digital I/O port mapped."
        );
        Ok(port)
    }

    fn write_register(&self, offset: u64, value: u8) -> std::io::Result<()> {
        self.device.write_all_at(&[value], offset)
    }

    fn read_register(&self, offset: u64) -> std::io::Result<u8> {
        let mut buf = [0u8; 1];
        self.device.read_exact_at(&mut buf, offset)?;
        Ok(buf[0])
    }

    fn latch_fault(&self, register: u64, e: std::io::Error) {
        let mut fault = self.fault.lock();
        if fault.is_some() {
            trace!(register, error = %e, "Port I/O failed again.");
            return;
        }
        error!(register, error = %e, "Port I/O failed, readings are no longer trustworthy.");
        *fault = Some(TimingError::PortIo(format!("register {:#x}: {}", register, e)));
    }
}

impl DigitalPort for DevPortIo {
    fn write_trigger_line(&self, asserted: bool) {
        let value = if asserted {
            DioRegisters::TRIGGER_ASSERTED
        } else {
            DioRegisters::TRIGGER_DEASSERTED
        };
        if let Err(e) = self.write_register(self.registers.trigger, value) {
            self.latch_fault(self.registers.trigger, e);
        }
    }

    fn read_echo_line(&self) -> bool {
        match self.read_register(self.registers.echo) {
            Ok(value) => value & DioRegisters::ECHO_MASK != 0,
            Err(e) => {
                self.latch_fault(self.registers.echo, e);
                false
            }
        }
    }

    fn fault(&self) -> Option<TimingError> {
        self.fault.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registers_at_default_base() {
        let regs = DioRegisters::default();
        assert_eq!(regs.trigger, 0x288);
        assert_eq!(regs.echo, 0x289);
        assert_eq!(regs.control, 0x28B);
    }

    #[test]
    fn test_open_missing_device_is_hardware_init_failure() {
        let result = DevPortIo::open_path(
            Path::new("/nonexistent/ranger/port"),
            DioRegisters::default(),
        );
        assert!(matches!(result, Err(TimingError::HardwareInit(_))));
    }

    #[test]
    fn test_register_file_round_trip() {
        let path = std::env::temp_dir().join(format!("ranger-port-{}", std::process::id()));
        std::fs::write(&path, vec![0u8; 0x300]).unwrap();

        let port = DevPortIo::open_path(&path, DioRegisters::default()).unwrap();
        port.write_trigger_line(true);
        assert_eq!(port.read_register(0x288).unwrap(), 0xFF);
        assert_eq!(port.read_register(0x28B).unwrap(), 0x02);
        assert!(!port.read_echo_line());

        port.write_register(0x289, 0x03).unwrap();
        assert!(port.read_echo_line());
        port.write_trigger_line(false);
        assert_eq!(port.read_register(0x288).unwrap(), 0x00);
        assert!(port.fault().is_none());

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_failed_echo_read_is_latched() {
        let path = std::env::temp_dir().join(format!("ranger-port-trunc-{}", std::process::id()));
        std::fs::write(&path, vec![0u8; 0x300]).unwrap();
        let port = DevPortIo::open_path(&path, DioRegisters::default()).unwrap();
        assert!(port.fault().is_none());

        // Shrink the register file below the echo register.
        std::fs::File::create(&path).unwrap();
        assert!(!port.read_echo_line());
        assert!(!port.read_echo_line());
        let fault = port.fault();
        assert!(matches!(&fault, Some(TimingError::PortIo(msg)) if msg.contains("0x289")));

        std::fs::remove_file(&path).unwrap();
    }
}
