// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Dynamic port pool.
//!
//! Ports in `[start, start + count)` are handed out round-robin, starting
//! the search at the slot after the last allocation and wrapping at the
//! pool boundary. The pool itself is not synchronized; the Context keeps it
//! behind its lock.

use crate::error::{Error, ErrorKind, Result};

#[derive(Debug, Clone)]
pub struct DynamicPortPool {
    start: u16,
    allocated: Vec<bool>,
    in_use: usize,
    next: usize,
}

impl DynamicPortPool {
    pub fn new(start: u16, count: u16) -> Self {
        Self {
            start,
            allocated: vec![false; usize::from(count)],
            in_use: 0,
            next: 0,
        }
    }

    /// First port of the range.
    pub fn start(&self) -> u16 {
        self.start
    }

    pub fn capacity(&self) -> usize {
        self.allocated.len()
    }

    pub fn in_use(&self) -> usize {
        self.in_use
    }

    pub fn is_allocated(&self, port: u16) -> bool {
        self.slot(port).is_some_and(|i| self.allocated[i])
    }

    fn slot(&self, port: u16) -> Option<usize> {
        let offset = usize::from(port.checked_sub(self.start)?);
        (offset < self.allocated.len()).then_some(offset)
    }

    /// Allocate the next free port.
    pub fn allocate(&mut self) -> Result<u16> {
        let capacity = self.allocated.len();
        if self.in_use >= capacity {
            return Err(Error::new(
                ErrorKind::PortPoolExhausted,
                format!("all {} dynamic ports are allocated", capacity),
            ));
        }

        for step in 0..capacity {
            let idx = (self.next + step) % capacity;
            if !self.allocated[idx] {
                self.allocated[idx] = true;
                self.in_use += 1;
                self.next = (idx + 1) % capacity;
                // idx < capacity <= u16::MAX - start, checked by ContextConfig::validate
                return Ok(self.start + idx as u16);
            }
        }

        // in_use < capacity guarantees a free slot above.
        Err(Error::new(
            ErrorKind::PortPoolExhausted,
            "no free dynamic port found",
        ))
    }

    /// Return `port` to the pool.
    pub fn release(&mut self, port: u16) -> Result<()> {
        match self.slot(port) {
            Some(idx) if self.allocated[idx] => {
                self.allocated[idx] = false;
                self.in_use -= 1;
                Ok(())
            }
            _ => Err(Error::new(
                ErrorKind::InvalidRelease,
                format!("port {port} is not allocated"),
            )),
        }
    }

    /// Free every port and restart the search at the first slot.
    pub fn clear(&mut self) {
        self.allocated.iter_mut().for_each(|slot| *slot = false);
        self.in_use = 0;
        self.next = 0;
    }
}
