use crate::foundation::util::random::random_hex;
use crate::foundation::{KeyName, NAME_SUFFIX_BYTES};
use parking_lot::Mutex;
use std::collections::HashSet;

/// Hands out key names `<prefix>-<8 hex>` that are unique for the lifetime of the allocator.
#[derive(Debug, Default)]
pub struct KeyNameAllocator {
    issued: Mutex<HashSet<String>>,
}

impl KeyNameAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&self, prefix: &str) -> KeyName {
        let mut issued = self.issued.lock();
        loop {
            let name = format!("{prefix}-{}", random_hex(NAME_SUFFIX_BYTES));
            if issued.insert(name.clone()) {
                return KeyName::from(name);
            }
        }
    }
}
