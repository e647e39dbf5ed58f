use std::cell::RefCell;
use std::rc::Rc;
use thiserror::Error;

/// A physical-memory access the memory subsystem rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("non-existent memory at physical address {addr:#o}")]
pub struct Nxm {
    pub addr: u32,
}

/// Word/byte access to emulated physical memory. Addresses are 22-bit.
///
/// Memory is little-endian; word accesses are aligned by the callers (the
/// transfer engine only issues even word addresses).
pub trait UnibusMemory {
    fn read_word(&mut self, pa: u32) -> Result<u16, Nxm>;
    fn write_word(&mut self, pa: u32, value: u16) -> Result<(), Nxm>;
    fn write_byte(&mut self, pa: u32, value: u8) -> Result<(), Nxm>;
}

/// Memory as seen by a DMA engine: physical access plus the Unibus map.
///
/// Controllers whose drives are `mapped` put their bus addresses through
/// [`DmaBus::map_unibus`] before every access; unmapped drives use the
/// address directly.
pub trait DmaBus: UnibusMemory {
    /// Translate an 18-bit Unibus address to a 22-bit physical address.
    fn map_unibus(&self, addr: u32) -> u32;
}

/// Terminal output sink (one VT52 per DL11 unit).
pub trait Terminal {
    fn put(&mut self, unit: usize, ch: u8);
    fn reset(&mut self, unit: usize);
}

/// Line printer output sink.
pub trait PrinterSink {
    fn print(&mut self, ch: u8);
}

/// Flat little-endian memory for unit tests; accesses past the end are NXM.
#[derive(Clone)]
pub struct TestMemory {
    data: Vec<u8>,
}

impl TestMemory {
    pub fn new(size: usize) -> Self {
        Self {
            data: vec![0; size],
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    fn check(&self, pa: u32, len: usize) -> Result<usize, Nxm> {
        let start = pa as usize;
        match start.checked_add(len) {
            Some(end) if end <= self.data.len() => Ok(start),
            _ => Err(Nxm { addr: pa }),
        }
    }
}

impl UnibusMemory for TestMemory {
    fn read_word(&mut self, pa: u32) -> Result<u16, Nxm> {
        let i = self.check(pa, 2)?;
        Ok(u16::from_le_bytes([self.data[i], self.data[i + 1]]))
    }

    fn write_word(&mut self, pa: u32, value: u16) -> Result<(), Nxm> {
        let i = self.check(pa, 2)?;
        self.data[i..i + 2].copy_from_slice(&value.to_le_bytes());
        Ok(())
    }

    fn write_byte(&mut self, pa: u32, value: u8) -> Result<(), Nxm> {
        let i = self.check(pa, 1)?;
        self.data[i] = value;
        Ok(())
    }
}

impl DmaBus for TestMemory {
    fn map_unibus(&self, addr: u32) -> u32 {
        addr
    }
}

/// A shareable recording terminal for tests: clone it, hand one copy to the
/// bus, and inspect the other.
#[derive(Clone, Default)]
pub struct TestTerminal {
    output: Rc<RefCell<Vec<(usize, u8)>>>,
    resets: Rc<RefCell<Vec<usize>>>,
}

impl TestTerminal {
    pub fn output(&self) -> Vec<(usize, u8)> {
        self.output.borrow().clone()
    }

    pub fn text(&self, unit: usize) -> String {
        self.output
            .borrow()
            .iter()
            .filter(|(u, _)| *u == unit)
            .map(|(_, ch)| *ch as char)
            .collect()
    }

    pub fn resets(&self) -> Vec<usize> {
        self.resets.borrow().clone()
    }
}

impl Terminal for TestTerminal {
    fn put(&mut self, unit: usize, ch: u8) {
        self.output.borrow_mut().push((unit, ch));
    }

    fn reset(&mut self, unit: usize) {
        self.resets.borrow_mut().push(unit);
    }
}

#[derive(Clone, Default)]
pub struct TestPrinter {
    output: Rc<RefCell<Vec<u8>>>,
}

impl TestPrinter {
    pub fn output(&self) -> Vec<u8> {
        self.output.borrow().clone()
    }
}

impl PrinterSink for TestPrinter {
    fn print(&mut self, ch: u8) {
        self.output.borrow_mut().push(ch);
    }
}
