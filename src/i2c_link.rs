//! I²C Raw Link: byte-level read/write to the kernel I²C device for the
//! master role.
//!
//! Grounded on the `rppal` crate's `/dev/i2c-*` + `I2C_SLAVE` ioctl pattern
//! (two independently opened file handles, bound to the target address via
//! `ioctl`).

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::os::unix::io::AsRawFd;

use nix::ioctl_write_int_bad;

use crate::error::WpuError;

const I2C_SLAVE: u16 = 0x0703;

ioctl_write_int_bad!(set_i2c_slave, I2C_SLAVE as u64);

/// The master-role capability the Transaction Engine needs: write a
/// composed request frame. Split out from `I2cRawLink` so the engine can be
/// exercised against a fake in tests without a real `/dev/i2c-*` device.
pub trait MasterLink {
    fn write(&mut self, bytes: &[u8]) -> Result<(), WpuError>;
}

/// Single-owner handle on a kernel I²C bus, bound to one slave address for
/// the master role. Concurrent writers sharing the same instance are
/// undefined behavior; this is enforced by Rust's ordinary `&mut self`
/// borrowing rather than an explicit lock.
pub struct I2cRawLink {
    read_fd: File,
    write_fd: File,
}

impl I2cRawLink {
    pub fn open(bus: u8, address: u16) -> Result<Self, WpuError> {
        let path = format!("/dev/i2c-{bus}");
        let read_fd = OpenOptions::new().read(true).open(&path)?;
        let write_fd = OpenOptions::new().write(true).open(&path)?;

        unsafe {
            set_i2c_slave(read_fd.as_raw_fd(), address as i32)
                .map_err(|e| WpuError::Io(std::io::Error::from(e)))?;
            set_i2c_slave(write_fd.as_raw_fd(), address as i32)
                .map_err(|e| WpuError::Io(std::io::Error::from(e)))?;
        }

        Ok(I2cRawLink { read_fd, write_fd })
    }

    /// Reads exactly `n` bytes, blocking. The Transaction Engine doesn't
    /// call this directly since replies arrive through the BSC slave
    /// endpoint, not this link.
    #[allow(dead_code)]
    pub fn read(&mut self, n: usize) -> Result<Vec<u8>, WpuError> {
        let mut buf = vec![0u8; n];
        self.read_fd.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// Releases both handles. Also runs implicitly on drop.
    #[allow(dead_code)]
    pub fn close(self) {
        drop(self);
    }
}

impl MasterLink for I2cRawLink {
    /// Writes the byte sequence atomically.
    fn write(&mut self, bytes: &[u8]) -> Result<(), WpuError> {
        self.write_fd.write_all(bytes)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    // I2cRawLink talks directly to /dev/i2c-*, which is only present (and
    // only safe to open) on real I2C hardware; see TransactionEngine's
    // tests for coverage of the logic built on top of this link using a
    // fake slave endpoint instead.
}
