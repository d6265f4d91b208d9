//! Lock actuators: a GPIO output line driven through the kernel character
//! device, and a simulated line for machines without one.

use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use warden_core::ports::{Actuator, ActuatorError, Signal};

/// BCM pin wired to the lock relay on a Raspberry Pi.
pub const DEFAULT_RELAY_LINE: u32 = 18;

const GPIOHANDLES_MAX: usize = 64;
const GPIOHANDLE_REQUEST_OUTPUT: u32 = 1 << 1;

/// `GPIO_GET_LINEHANDLE_IOCTL` = `_IOWR(0xB4, 0x03, struct gpiohandle_request)`.
const GPIO_GET_LINEHANDLE_IOCTL: libc::c_ulong = 0xC16C_B403;
/// `GPIOHANDLE_SET_LINE_VALUES_IOCTL` = `_IOWR(0xB4, 0x09, struct gpiohandle_data)`.
const GPIOHANDLE_SET_LINE_VALUES_IOCTL: libc::c_ulong = 0xC040_B409;

/// Mirror of `struct gpiohandle_request` from `<linux/gpio.h>`.
#[repr(C)]
struct GpioHandleRequest {
    line_offsets: [u32; GPIOHANDLES_MAX],
    flags: u32,
    default_values: [u8; GPIOHANDLES_MAX],
    consumer_label: [u8; 32],
    lines: u32,
    fd: libc::c_int,
}

/// Mirror of `struct gpiohandle_data`.
#[repr(C)]
struct GpioHandleData {
    values: [u8; GPIOHANDLES_MAX],
}

const _REQUEST_SIZE: () = assert!(
    std::mem::size_of::<GpioHandleRequest>() == 364,
    "GpioHandleRequest must match the kernel ABI"
);
const _DATA_SIZE: () = assert!(
    std::mem::size_of::<GpioHandleData>() == 64,
    "GpioHandleData must match the kernel ABI"
);

/// One output line on a `/dev/gpiochipN` device. Requested low (locked).
pub struct GpioActuator {
    chip: String,
    line: u32,
    handle: OwnedFd,
}

impl GpioActuator {
    pub fn open(chip: &str, line: u32) -> Result<Self, ActuatorError> {
        let file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .open(chip)
            .map_err(|source| ActuatorError::Open {
                path: chip.to_string(),
                source,
            })?;

        let mut label = [0u8; 32];
        let name = b"warden-lock";
        label[..name.len()].copy_from_slice(name);

        let mut request = GpioHandleRequest {
            line_offsets: [0; GPIOHANDLES_MAX],
            flags: GPIOHANDLE_REQUEST_OUTPUT,
            default_values: [0; GPIOHANDLES_MAX],
            consumer_label: label,
            lines: 1,
            fd: -1,
        };
        request.line_offsets[0] = line;

        // SAFETY:
        // - the chip fd is valid for the lifetime of `file`
        // - `request` is repr(C) and sized to the kernel ABI (asserted above)
        let ret = unsafe {
            libc::ioctl(
                file.as_raw_fd(),
                GPIO_GET_LINEHANDLE_IOCTL,
                &mut request as *mut GpioHandleRequest,
            )
        };
        if ret < 0 || request.fd < 0 {
            return Err(ActuatorError::Request(std::io::Error::last_os_error()));
        }

        // SAFETY: the kernel handed us a fresh line-handle fd we now own.
        let handle = unsafe { OwnedFd::from_raw_fd(request.fd) };

        tracing::info!(chip, line, "GPIO lock line requested");
        Ok(Self {
            chip: chip.to_string(),
            line,
            handle,
        })
    }

    pub fn chip(&self) -> &str {
        &self.chip
    }

    pub fn line(&self) -> u32 {
        self.line
    }
}

impl Actuator for GpioActuator {
    fn set_signal(&mut self, signal: Signal) -> Result<(), ActuatorError> {
        let mut data = GpioHandleData {
            values: [0; GPIOHANDLES_MAX],
        };
        data.values[0] = u8::from(signal == Signal::High);

        // SAFETY: `handle` is a live line-handle fd; `data` matches the ABI.
        let ret = unsafe {
            libc::ioctl(
                self.handle.as_raw_fd(),
                GPIOHANDLE_SET_LINE_VALUES_IOCTL,
                &mut data as *mut GpioHandleData,
            )
        };
        if ret < 0 {
            return Err(ActuatorError::SetValue(std::io::Error::last_os_error()));
        }

        tracing::debug!(chip = %self.chip, line = self.line, ?signal, "GPIO line set");
        Ok(())
    }
}

/// Stand-in actuator that only logs.
#[derive(Debug)]
pub struct SimulatedActuator {
    line: u32,
    last: Option<Signal>,
}

impl SimulatedActuator {
    pub fn new(line: u32) -> Self {
        tracing::info!(line, "using simulated lock actuator");
        Self { line, last: None }
    }

    /// Last signal driven, `None` before the first one.
    pub fn last_signal(&self) -> Option<Signal> {
        self.last
    }
}

impl Actuator for SimulatedActuator {
    fn set_signal(&mut self, signal: Signal) -> Result<(), ActuatorError> {
        match signal {
            Signal::High => tracing::info!(line = self.line, "simulated line HIGH: door unlocked"),
            Signal::Low => tracing::info!(line = self.line, "simulated line LOW: door locked"),
        }
        self.last = Some(signal);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simulated_tracks_last_signal() {
        let mut actuator = SimulatedActuator::new(DEFAULT_RELAY_LINE);
        assert_eq!(actuator.last_signal(), None);
        actuator.set_signal(Signal::High).unwrap();
        assert_eq!(actuator.last_signal(), Some(Signal::High));
        actuator.set_signal(Signal::Low).unwrap();
        assert_eq!(actuator.last_signal(), Some(Signal::Low));
    }

    #[test]
    fn test_gpio_open_missing_chip() {
        let err = GpioActuator::open("/dev/gpiochip-does-not-exist", 18)
            .err()
            .unwrap();
        assert!(matches!(err, ActuatorError::Open { .. }));
    }
}
