//! Device driver trait

use crate::device::DeviceId;
use crate::error::DriverError;

/// Result of a driver call
pub type DriverResult<T = ()> = core::result::Result<T, DriverError>;

/// Raw access to the flash devices of a board
///
/// One driver serves every registered device and is addressed with
/// device-relative offsets. Implementations must not retry; the access layer
/// reports failures unchanged to the caller.
///
/// Calls are blocking and take `&self` so a driver can be shared between
/// threads; implementations serialize internally where the hardware needs it.
/// Every call made by the access layer is bounds checked and aligned against
/// the region table first.
pub trait FlashDriver {
    /// Read flash contents into the provided buffer
    ///
    /// # Arguments
    /// * `device` - Device to read from
    /// * `offset` - Device-relative start offset
    /// * `buf` - Buffer to read into
    fn raw_read(&self, device: DeviceId, offset: u32, buf: &mut [u8]) -> DriverResult;

    /// Program data (the target range is assumed to be erased)
    ///
    /// # Arguments
    /// * `device` - Device to program
    /// * `offset` - Device-relative start offset, write aligned
    /// * `data` - Data to program, a multiple of the write unit
    fn raw_write(&self, device: DeviceId, offset: u32, data: &[u8]) -> DriverResult;

    /// Erase whole sectors
    ///
    /// # Arguments
    /// * `device` - Device to erase
    /// * `offset` - Device-relative start offset, on a sector boundary
    /// * `len` - Number of bytes, ending on a sector boundary
    fn raw_erase(&self, device: DeviceId, offset: u32, len: u32) -> DriverResult;

    /// Read through the linear mapping of a memory-mapped device
    ///
    /// `addr` is the absolute address (`base + device offset`). Drivers that
    /// cannot read linearly keep the default, and the access layer falls
    /// back to [`FlashDriver::raw_read`].
    fn read_linear(&self, addr: usize, buf: &mut [u8]) -> DriverResult {
        let _ = (addr, buf);
        Err(DriverError::Unsupported)
    }
}

impl<T: FlashDriver + ?Sized> FlashDriver for &T {
    fn raw_read(&self, device: DeviceId, offset: u32, buf: &mut [u8]) -> DriverResult {
        (**self).raw_read(device, offset, buf)
    }

    fn raw_write(&self, device: DeviceId, offset: u32, data: &[u8]) -> DriverResult {
        (**self).raw_write(device, offset, data)
    }

    fn raw_erase(&self, device: DeviceId, offset: u32, len: u32) -> DriverResult {
        (**self).raw_erase(device, offset, len)
    }

    fn read_linear(&self, addr: usize, buf: &mut [u8]) -> DriverResult {
        (**self).read_linear(addr, buf)
    }
}
