use crate::foundation::{ItestError, DEFAULT_PORT_RANGE_END, DEFAULT_PORT_RANGE_START, MAX_PORT_ALLOCATION_ATTEMPTS};
use log::{debug, trace};
use parking_lot::Mutex;
use rand::Rng;
use std::collections::HashSet;
use std::net::{Ipv4Addr, TcpListener};
use std::ops::Range;
use std::sync::{Arc, OnceLock};

static GLOBAL: OnceLock<Arc<PortAllocator>> = OnceLock::new();

/// Issues TCP ports that are currently bindable on loopback and were never issued before by
/// this allocator.
///
/// The issued set is only ever grown: a port handed out once stays reserved for the process
/// lifetime even after its service stops, so a late-starting service never races a restarted one.
#[derive(Debug)]
pub struct PortAllocator {
    range: Range<u16>,
    issued: Mutex<HashSet<u16>>,
}

impl PortAllocator {
    pub fn new(range: Range<u16>) -> Self {
        Self { range, issued: Mutex::new(HashSet::new()) }
    }

    /// Process-wide allocator over the default range.
    pub fn global() -> Arc<PortAllocator> {
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(PortAllocator::new(DEFAULT_PORT_RANGE_START..DEFAULT_PORT_RANGE_END))))
    }

    /// The global allocator when `range` is the default one, otherwise a fresh allocator for `range`.
    pub fn for_range(range: Range<u16>) -> Arc<PortAllocator> {
        if range == (DEFAULT_PORT_RANGE_START..DEFAULT_PORT_RANGE_END) {
            Self::global()
        } else {
            Arc::new(PortAllocator::new(range))
        }
    }

    pub fn allocate(&self) -> Result<u16, ItestError> {
        let range_size = self.range.len();
        if range_size == 0 {
            return Err(ItestError::resource_exhausted("port", format!("empty range {:?}", self.range)));
        }
        let attempts = range_size.min(MAX_PORT_ALLOCATION_ATTEMPTS);
        let mut rng = rand::thread_rng();

        // Held across the bind probe so two callers can never both accept the same candidate.
        let mut issued = self.issued.lock();
        for attempt in 1..=attempts {
            let candidate = rng.gen_range(self.range.clone());
            if issued.contains(&candidate) {
                continue;
            }
            if !is_bindable(candidate) {
                trace!("port in use by another process port={} attempt={}", candidate, attempt);
                continue;
            }
            issued.insert(candidate);
            debug!("allocated port port={} attempts={} issued_total={}", candidate, attempt, issued.len());
            return Ok(candidate);
        }

        Err(ItestError::resource_exhausted(
            "port",
            format!("no free port in {:?} after {} attempts (issued={})", self.range, attempts, issued.len()),
        ))
    }

    /// Allocates `count` ports; all of them or none are reported to the caller.
    pub fn allocate_many(&self, count: usize) -> Result<Vec<u16>, ItestError> {
        (0..count).map(|_| self.allocate()).collect()
    }

    pub fn is_issued(&self, port: u16) -> bool {
        self.issued.lock().contains(&port)
    }

    pub fn issued_count(&self) -> usize {
        self.issued.lock().len()
    }
}

fn is_bindable(port: u16) -> bool {
    TcpListener::bind((Ipv4Addr::LOCALHOST, port)).is_ok()
}
