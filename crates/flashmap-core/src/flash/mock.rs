//! In-memory driver for unit tests

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::vec;
use std::vec::Vec;

use super::driver::{DriverResult, FlashDriver};
use crate::device::DeviceId;
use crate::error::{DriverError, Operation};

/// Driver call as seen by the mock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Call {
    pub op: Operation,
    pub device: DeviceId,
    pub offset: u32,
    pub len: u32,
}

struct MockDevice {
    data: Vec<u8>,
    erased_val: u8,
}

/// Mock driver backed by per-device byte vectors
///
/// Writes AND into existing contents like NOR flash. Linear reads are
/// served for every device given a base with [`MockDriver::mapped`].
#[derive(Default)]
pub(crate) struct MockDriver {
    devices: RefCell<BTreeMap<DeviceId, MockDevice>>,
    linear: Vec<(usize, DeviceId)>,
    fail: Cell<Option<DriverError>>,
    calls: RefCell<Vec<Call>>,
    linear_reads: Cell<usize>,
}

impl MockDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_device(self, device: DeviceId, size: usize, erased_val: u8) -> Self {
        self.devices.borrow_mut().insert(
            device,
            MockDevice {
                data: vec![erased_val; size],
                erased_val,
            },
        );
        self
    }

    pub fn mapped(mut self, device: DeviceId, base: usize) -> Self {
        self.linear.push((base, device));
        self
    }

    /// Fail the next driver call with `cause`
    pub fn fail_next(&self, cause: DriverError) {
        self.fail.set(Some(cause));
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    pub fn linear_reads(&self) -> usize {
        self.linear_reads.get()
    }

    pub fn data(&self, device: DeviceId) -> Vec<u8> {
        self.devices.borrow()[&device].data.clone()
    }

    pub fn fill(&self, device: DeviceId, offset: usize, bytes: &[u8]) {
        let mut devices = self.devices.borrow_mut();
        let dev = devices.get_mut(&device).unwrap();
        dev.data[offset..offset + bytes.len()].copy_from_slice(bytes);
    }

    fn record(&self, op: Operation, device: DeviceId, offset: u32, len: usize) -> DriverResult {
        self.calls.borrow_mut().push(Call {
            op,
            device,
            offset,
            len: len as u32,
        });
        match self.fail.take() {
            Some(cause) => Err(cause),
            None => Ok(()),
        }
    }

    fn with_range<R>(
        &self,
        device: DeviceId,
        offset: u32,
        len: usize,
        f: impl FnOnce(&mut [u8], u8) -> R,
    ) -> DriverResult<R> {
        let mut devices = self.devices.borrow_mut();
        let dev = devices.get_mut(&device).ok_or(DriverError::Io)?;
        let start = offset as usize;
        let range = dev
            .data
            .get_mut(start..start + len)
            .ok_or(DriverError::Code(-22))?;
        Ok(f(range, dev.erased_val))
    }
}

impl FlashDriver for MockDriver {
    fn raw_read(&self, device: DeviceId, offset: u32, buf: &mut [u8]) -> DriverResult {
        self.record(Operation::Read, device, offset, buf.len())?;
        self.with_range(device, offset, buf.len(), |range, _| {
            buf.copy_from_slice(range)
        })
    }

    fn raw_write(&self, device: DeviceId, offset: u32, data: &[u8]) -> DriverResult {
        self.record(Operation::Write, device, offset, data.len())?;
        self.with_range(device, offset, data.len(), |range, _| {
            for (cell, byte) in range.iter_mut().zip(data) {
                *cell &= byte;
            }
        })
    }

    fn raw_erase(&self, device: DeviceId, offset: u32, len: u32) -> DriverResult {
        self.record(Operation::Erase, device, offset, len as usize)?;
        self.with_range(device, offset, len as usize, |range, erased| {
            range.fill(erased)
        })
    }

    fn read_linear(&self, addr: usize, buf: &mut [u8]) -> DriverResult {
        let (base, device) = self
            .linear
            .iter()
            .copied()
            .find(|(base, _)| addr >= *base)
            .ok_or(DriverError::Unsupported)?;
        self.linear_reads.set(self.linear_reads.get() + 1);
        self.with_range(device, (addr - base) as u32, buf.len(), |range, _| {
            buf.copy_from_slice(range)
        })
    }
}
