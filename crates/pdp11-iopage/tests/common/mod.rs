#![allow(dead_code)]

use pdp11_devices::bus::{TestMemory, TestPrinter, TestTerminal, UnibusMemory};
use pdp11_iopage::{IoBus, IoBusConfig, Trap};
use pdp11_storage::{RangeResponse, RangeStatus, BLOCK_SIZE};

pub struct Rig {
    pub io: IoBus,
    pub mem: TestMemory,
    pub term: TestTerminal,
    pub printer: TestPrinter,
}

pub fn rig() -> Rig {
    rig_with(IoBusConfig::default())
}

pub fn rig_with(config: IoBusConfig) -> Rig {
    let term = TestTerminal::default();
    let printer = TestPrinter::default();
    let io = IoBus::new(config, Box::new(term.clone()), Box::new(printer.clone()));
    Rig {
        io,
        mem: TestMemory::new(256 * 1024),
        term,
        printer,
    }
}

impl Rig {
    pub fn read(&mut self, pa: u32) -> u16 {
        self.io
            .access(&mut self.mem, pa, None, false)
            .unwrap_or_else(|e| panic!("read {pa:#o}: {e}"))
    }

    pub fn write(&mut self, pa: u32, value: u16) {
        self.io
            .access(&mut self.mem, pa, Some(value), false)
            .unwrap_or_else(|e| panic!("write {pa:#o}: {e}"));
    }

    pub fn write_byte(&mut self, pa: u32, value: u8) {
        self.io
            .access(&mut self.mem, pa, Some(u16::from(value)), true)
            .unwrap_or_else(|e| panic!("byte write {pa:#o}: {e}"));
    }

    pub fn try_write(&mut self, pa: u32, value: u16) -> Result<u16, Trap> {
        self.io.access(&mut self.mem, pa, Some(value), false)
    }

    pub fn ticks(&mut self, n: u32) {
        for _ in 0..n {
            self.io.tick(&mut self.mem);
        }
    }

    /// Answer every queued fetch request from `image` (with correct 206/416
    /// range semantics) until the transfer either completes or stalls.
    pub fn serve_fetches(&mut self, image: &[u8]) -> usize {
        let mut served = 0;
        loop {
            let requests = self.io.take_fetch_requests();
            if requests.is_empty() {
                return served;
            }
            for req in requests {
                let start = req.block * BLOCK_SIZE;
                let response = if start >= image.len() as u64 {
                    RangeResponse {
                        status: RangeStatus::Unsatisfiable,
                        body: Vec::new(),
                    }
                } else {
                    let end = (start + BLOCK_SIZE).min(image.len() as u64);
                    RangeResponse {
                        status: RangeStatus::Partial,
                        body: image[start as usize..end as usize].to_vec(),
                    }
                };
                served += 1;
                self.io
                    .complete_fetch(&mut self.mem, req.device, req.unit, Ok(response));
            }
        }
    }

    pub fn mem_bytes(&mut self, pa: u32, len: usize) -> Vec<u8> {
        (0..len)
            .map(|i| {
                let w = self.mem.read_word((pa + i as u32) & !1).unwrap();
                if (pa as usize + i) & 1 == 0 {
                    w as u8
                } else {
                    (w >> 8) as u8
                }
            })
            .collect()
    }
}

/// A deterministic image pattern that differs across block boundaries.
pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| ((i * 31 + 7) ^ (i >> 10)) as u8).collect()
}
