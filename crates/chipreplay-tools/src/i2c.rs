//! Linux `i2c-dev` driver for the two bus shapes the player supports.
//!
//! `I2cDevice` binds a bus node (`/dev/i2c-N`) to one slave address and
//! issues SMBus transfers through the `I2C_SMBUS` ioctl. It implements
//! `ExpanderBus` (byte-data register access to the I/O expander) and
//! `BlockBus` (block-data writes to a co-processor).
use std::io;
use std::path::Path;

use chipreplay::transport::{BlockBus, ExpanderBus};

/// Default slave address of the I/O expander (all address pins low).
pub const DEFAULT_ADDRESS: u16 = 0x20;

#[derive(Debug)]
pub struct I2cDevice {
    #[cfg(target_os = "linux")]
    file: std::fs::File,
    address: u16,
}

impl I2cDevice {
    pub fn address(&self) -> u16 {
        self.address
    }
}

#[cfg(target_os = "linux")]
mod sys {
    use super::I2cDevice;
    use std::fs::OpenOptions;
    use std::io;
    use std::os::fd::AsRawFd;
    use std::path::Path;

    const I2C_SLAVE: libc::c_ulong = 0x0703;
    const I2C_SMBUS: libc::c_ulong = 0x0720;

    const I2C_SMBUS_WRITE: u8 = 0;
    const I2C_SMBUS_READ: u8 = 1;

    const I2C_SMBUS_BYTE_DATA: u32 = 2;
    const I2C_SMBUS_BLOCK_DATA: u32 = 5;

    /// Largest SMBus block payload.
    const I2C_SMBUS_BLOCK_MAX: usize = 32;

    /// `union i2c_smbus_data`: length byte, payload, one spare for PEC.
    #[repr(C)]
    struct SmbusData {
        block: [u8; I2C_SMBUS_BLOCK_MAX + 2],
    }

    #[repr(C)]
    struct SmbusIoctlData {
        read_write: u8,
        command: u8,
        size: u32,
        data: *mut SmbusData,
    }

    impl I2cDevice {
        pub fn open(bus: &Path, address: u16) -> io::Result<Self> {
            let file = OpenOptions::new().read(true).write(true).open(bus)?;
            // SAFETY: I2C_SLAVE takes the address by value.
            let rc = unsafe {
                libc::ioctl(file.as_raw_fd(), I2C_SLAVE as _, libc::c_ulong::from(address))
            };
            if rc < 0 {
                return Err(io::Error::last_os_error());
            }
            Ok(Self { file, address })
        }

        fn smbus(
            &mut self,
            read_write: u8,
            command: u8,
            size: u32,
            data: &mut SmbusData,
        ) -> io::Result<()> {
            let mut args = SmbusIoctlData {
                read_write,
                command,
                size,
                data,
            };
            // SAFETY: `args` and the buffer it points to outlive the call.
            let rc = unsafe {
                libc::ioctl(
                    self.file.as_raw_fd(),
                    I2C_SMBUS as _,
                    &mut args as *mut SmbusIoctlData,
                )
            };
            if rc < 0 {
                return Err(io::Error::last_os_error());
            }
            Ok(())
        }

        pub fn write_byte_data(&mut self, command: u8, value: u8) -> io::Result<()> {
            let mut data = SmbusData {
                block: [0; I2C_SMBUS_BLOCK_MAX + 2],
            };
            data.block[0] = value;
            self.smbus(I2C_SMBUS_WRITE, command, I2C_SMBUS_BYTE_DATA, &mut data)
        }

        pub fn read_byte_data(&mut self, command: u8) -> io::Result<u8> {
            let mut data = SmbusData {
                block: [0; I2C_SMBUS_BLOCK_MAX + 2],
            };
            self.smbus(I2C_SMBUS_READ, command, I2C_SMBUS_BYTE_DATA, &mut data)?;
            Ok(data.block[0])
        }

        pub fn write_block_data(&mut self, command: u8, bytes: &[u8]) -> io::Result<()> {
            if bytes.len() > I2C_SMBUS_BLOCK_MAX {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("block of {} bytes exceeds {}", bytes.len(), I2C_SMBUS_BLOCK_MAX),
                ));
            }
            let mut data = SmbusData {
                block: [0; I2C_SMBUS_BLOCK_MAX + 2],
            };
            data.block[0] = bytes.len() as u8;
            data.block[1..=bytes.len()].copy_from_slice(bytes);
            self.smbus(I2C_SMBUS_WRITE, command, I2C_SMBUS_BLOCK_DATA, &mut data)
        }
    }
}

#[cfg(not(target_os = "linux"))]
mod sys {
    use super::I2cDevice;
    use std::io;
    use std::path::Path;

    fn unsupported() -> io::Error {
        io::Error::new(io::ErrorKind::Unsupported, "i2c-dev is only available on Linux")
    }

    impl I2cDevice {
        pub fn open(_bus: &Path, _address: u16) -> io::Result<Self> {
            Err(unsupported())
        }

        pub fn write_byte_data(&mut self, _command: u8, _value: u8) -> io::Result<()> {
            Err(unsupported())
        }

        pub fn read_byte_data(&mut self, _command: u8) -> io::Result<u8> {
            Err(unsupported())
        }

        pub fn write_block_data(&mut self, _command: u8, _bytes: &[u8]) -> io::Result<()> {
            Err(unsupported())
        }
    }
}

impl ExpanderBus for I2cDevice {
    fn write_reg8(&mut self, register: u8, value: u8) -> io::Result<()> {
        self.write_byte_data(register, value)
    }

    fn read_reg8(&mut self, register: u8) -> io::Result<u8> {
        self.read_byte_data(register)
    }
}

impl BlockBus for I2cDevice {
    fn write_block(&mut self, command: u8, data: &[u8]) -> io::Result<()> {
        self.write_block_data(command, data)
    }
}

/// Open `bus` for the device at `address`, with the path in the error.
pub fn open(bus: &Path, address: u16) -> anyhow::Result<I2cDevice> {
    use anyhow::Context;
    I2cDevice::open(bus, address)
        .with_context(|| format!("failed to open {} at 0x{:02X}", bus.display(), address))
}
