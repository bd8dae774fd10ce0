//! Typed access over borrowed module memory
//!
//! All numeric reads and writes are native-endian, matching the module.

use super::{Bridge, BridgeError};
use std::cell::RefMut;

/// Width of one wire cell
pub const CELL: usize = 8;

/// A borrowed view of module memory, valid for one phase of a call
pub struct MemoryView<'a> {
    bytes: RefMut<'a, [u8]>,
    base: u64,
}

impl<'a> MemoryView<'a> {
    /// Borrow a fresh view from the bridge
    #[inline]
    pub fn acquire(bridge: &'a dyn Bridge) -> Result<Self, BridgeError> {
        Ok(Self {
            bytes: bridge.memory()?,
            base: bridge.base_address(),
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    #[inline]
    pub fn base(&self) -> u64 {
        self.base
    }

    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    /// Absolute address of a byte offset
    #[inline]
    pub fn address(&self, offset: usize) -> u64 {
        self.base + offset as u64
    }

    /// Byte offset of an address, checked against `len` bytes of memory
    pub fn offset(&self, address: u64, len: usize) -> Result<usize, BridgeError> {
        let invalid = BridgeError::InvalidAddress { address, len };
        let offset = address.checked_sub(self.base).ok_or(invalid.clone())?;
        let offset = usize::try_from(offset).map_err(|_| invalid.clone())?;
        match offset.checked_add(len) {
            Some(end) if end <= self.bytes.len() => Ok(offset),
            _ => Err(invalid),
        }
    }

    pub fn read(&self, offset: usize, len: usize) -> Result<&[u8], BridgeError> {
        offset
            .checked_add(len)
            .and_then(|end| self.bytes.get(offset..end))
            .ok_or(BridgeError::InvalidAddress {
                address: self.address(offset),
                len,
            })
    }

    pub fn write(&mut self, offset: usize, data: &[u8]) -> Result<(), BridgeError> {
        let address = self.address(offset);
        offset
            .checked_add(data.len())
            .and_then(|end| self.bytes.get_mut(offset..end))
            .map(|dst| dst.copy_from_slice(data))
            .ok_or(BridgeError::InvalidAddress {
                address,
                len: data.len(),
            })
    }

    /// Read one 8-byte cell as raw bits
    pub fn cell_bits(&self, offset: usize) -> Result<u64, BridgeError> {
        let raw = self.read(offset, CELL)?;
        let mut cell = [0u8; CELL];
        cell.copy_from_slice(raw);
        Ok(u64::from_ne_bytes(cell))
    }

    pub fn set_cell_bits(&mut self, offset: usize, bits: u64) -> Result<(), BridgeError> {
        self.write(offset, &bits.to_ne_bytes())
    }

    #[inline]
    pub fn cell_f64(&self, offset: usize) -> Result<f64, BridgeError> {
        self.cell_bits(offset).map(f64::from_bits)
    }

    #[inline]
    pub fn set_cell_f64(&mut self, offset: usize, value: f64) -> Result<(), BridgeError> {
        self.set_cell_bits(offset, value.to_bits())
    }

    /// Read an unsigned integer of `width` bytes (1, 2, 4 or 8)
    pub fn uint(&self, offset: usize, width: usize) -> Result<u64, BridgeError> {
        let raw = self.read(offset, width)?;
        let value = match width {
            1 => raw[0] as u64,
            2 => u16::from_ne_bytes([raw[0], raw[1]]) as u64,
            4 => u32::from_ne_bytes([raw[0], raw[1], raw[2], raw[3]]) as u64,
            8 => {
                let mut cell = [0u8; 8];
                cell.copy_from_slice(raw);
                u64::from_ne_bytes(cell)
            }
            _ => {
                return Err(BridgeError::InvalidAddress {
                    address: self.address(offset),
                    len: width,
                })
            }
        };
        Ok(value)
    }
}
