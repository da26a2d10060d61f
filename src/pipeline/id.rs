//! Index newtypes for jobs and ports.
//!
//! Both are direct indices into their owning vectors: `JobId` into the
//! registry (so it also encodes registration order), `PortId` into the store.

use std::fmt;

/// Registration index of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(pub u32);

impl JobId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job #{}", self.0)
    }
}

/// Index into the port store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PortId(pub u32);

impl PortId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_id_orders_by_registration() {
        assert!(JobId(1) < JobId(2));
        assert_eq!(JobId(42).index(), 42);
        assert_eq!(JobId(3).to_string(), "job #3");
    }

    #[test]
    fn test_port_id_index() {
        assert_eq!(PortId(7).index(), 7);
    }
}
