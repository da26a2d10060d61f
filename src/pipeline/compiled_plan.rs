use crate::pipeline::port::PortKey;

/// Resolved execution plan for a set of registered jobs.
#[derive(Debug, Clone, Default)]
pub struct CompiledPlan {
    /// Registry indices in execution order
    pub order: Vec<usize>,

    /// Same-wave dependencies (producer_idx, consumer_idx)
    pub edges: Vec<(usize, usize)>,

    /// Ring depth each output port needs: max requested offset + 1
    pub history_depths: Vec<(PortKey, usize)>,

    /// Resolution statistics
    pub stats: PlanStats,
}

/// Statistics about the resolved plan
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlanStats {
    /// Number of registered jobs
    pub total_jobs: usize,

    /// Number of declared output ports
    pub total_ports: usize,

    /// Jobs with no same-wave dependency
    pub root_jobs: usize,

    /// Offset-0 edges that constrain the order
    pub same_wave_edges: usize,

    /// Inputs read from an earlier wave (never constrain the order)
    pub temporal_edges: usize,

    /// Deepest history ring in the plan
    pub max_history_depth: usize,

    /// Resolution time in microseconds
    pub resolve_time_us: u64,
}

impl CompiledPlan {
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Position of registry index `job` in the execution order.
    pub fn position(&self, job: usize) -> Option<usize> {
        self.order.iter().position(|&idx| idx == job)
    }

    pub fn history_depth(&self, key: &PortKey) -> Option<usize> {
        self.history_depths
            .iter()
            .find(|(k, _)| k == key)
            .map(|&(_, depth)| depth)
    }
}
