use super::compiled_plan::{CompiledPlan, PlanStats};
use super::error::{ConfigError, ConfigResult};
use super::job::JobDescriptor;
use super::port::PortKey;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

/// Resolves registered jobs into a linear execution order
pub struct DependencyResolver;

impl DependencyResolver {
    /// Resolve the registry into an execution plan.
    ///
    /// Only offset-0 inputs constrain the order: a consumer must run after the
    /// producer of every port it reads on the same wave. Inputs from earlier
    /// waves only grow the history depth of the port they read.
    ///
    /// Among jobs that are ready at the same time, the one registered first
    /// runs first, so the order is stable for a given registry.
    ///
    /// # Errors
    /// * `DuplicateProducer` - two jobs declare the same output
    /// * `MissingProducer` - an input no job produces
    /// * `Cycle` - a same-wave cycle, including a job reading its own output at offset 0
    pub fn resolve(jobs: &[JobDescriptor]) -> ConfigResult<CompiledPlan> {
        let start_time = std::time::Instant::now();
        let n = jobs.len();

        let producers = Self::map_producers(jobs)?;
        let (adj, in_degree, edges, max_offsets, temporal_edges) =
            Self::build_dependencies(jobs, &producers)?;

        let root_jobs = in_degree.iter().filter(|&&d| d == 0).count();
        let order = Self::topological_sort(&adj, in_degree.clone());

        if order.len() < n {
            let cycle = Self::find_cycle(jobs, &adj, &order);
            return Err(ConfigError::Cycle { jobs: cycle });
        }

        // Every declared output gets a ring, in registration order
        let history_depths: Vec<(PortKey, usize)> = jobs
            .iter()
            .flat_map(|job| job.outputs.iter())
            .map(|spec| {
                let depth = max_offsets.get(&spec.key).map_or(1, |&o| o as usize + 1);
                (spec.key.clone(), depth)
            })
            .collect();

        let stats = PlanStats {
            total_jobs: n,
            total_ports: history_depths.len(),
            root_jobs,
            same_wave_edges: edges.len(),
            temporal_edges,
            max_history_depth: history_depths.iter().map(|&(_, d)| d).max().unwrap_or(0),
            resolve_time_us: start_time.elapsed().as_micros() as u64,
        };

        Ok(CompiledPlan {
            order,
            edges,
            history_depths,
            stats,
        })
    }

    /// Map each output port to the registry index of its single producer
    fn map_producers(jobs: &[JobDescriptor]) -> ConfigResult<HashMap<&PortKey, usize>> {
        let mut producers: HashMap<&PortKey, usize> = HashMap::new();
        for (idx, job) in jobs.iter().enumerate() {
            for spec in &job.outputs {
                if let Some(&first) = producers.get(&spec.key) {
                    return Err(ConfigError::DuplicateProducer {
                        port: spec.key.clone(),
                        first: jobs[first].name.clone(),
                        second: job.name.clone(),
                    });
                }
                producers.insert(&spec.key, idx);
            }
        }
        Ok(producers)
    }

    /// Build the same-wave adjacency and collect the history each port needs
    #[allow(clippy::type_complexity)]
    fn build_dependencies(
        jobs: &[JobDescriptor],
        producers: &HashMap<&PortKey, usize>,
    ) -> ConfigResult<(
        Vec<Vec<usize>>,
        Vec<usize>,
        Vec<(usize, usize)>,
        HashMap<PortKey, u32>,
        usize,
    )> {
        let n = jobs.len();
        let mut adj = vec![Vec::new(); n];
        let mut in_degree = vec![0usize; n];
        let mut edges = Vec::new();
        let mut max_offsets: HashMap<PortKey, u32> = HashMap::new();
        let mut temporal_edges = 0;

        for (idx, job) in jobs.iter().enumerate() {
            for input in &job.inputs {
                let producer = *producers.get(&input.key).ok_or_else(|| {
                    ConfigError::MissingProducer {
                        job: job.name.clone(),
                        port: input.key.clone(),
                    }
                })?;

                let depth = max_offsets.entry(input.key.clone()).or_insert(0);
                *depth = (*depth).max(input.wave_offset);

                if !input.is_same_wave() {
                    temporal_edges += 1;
                    continue;
                }
                if producer == idx {
                    return Err(ConfigError::Cycle {
                        jobs: vec![job.name.clone(), job.name.clone()],
                    });
                }
                // Reading two ports of the same producer is still one dependency
                if !adj[producer].contains(&idx) {
                    adj[producer].push(idx);
                    in_degree[idx] += 1;
                    edges.push((producer, idx));
                }
            }
        }

        Ok((adj, in_degree, edges, max_offsets, temporal_edges))
    }

    /// Kahn's algorithm; the ready set is a min-heap on registration index
    fn topological_sort(adj: &[Vec<usize>], mut in_degree: Vec<usize>) -> Vec<usize> {
        let mut ready: BinaryHeap<Reverse<usize>> = in_degree
            .iter()
            .enumerate()
            .filter(|&(_, &d)| d == 0)
            .map(|(i, _)| Reverse(i))
            .collect();
        let mut result = Vec::with_capacity(adj.len());

        while let Some(Reverse(job)) = ready.pop() {
            result.push(job);
            for &next in &adj[job] {
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    ready.push(Reverse(next));
                }
            }
        }

        result
    }

    /// Name one concrete cycle among the jobs Kahn's algorithm could not place
    fn find_cycle(jobs: &[JobDescriptor], adj: &[Vec<usize>], placed: &[usize]) -> Vec<String> {
        let n = jobs.len();
        let mut remaining = vec![true; n];
        for &idx in placed {
            remaining[idx] = false;
        }

        // Predecessors restricted to unplaced jobs
        let mut preds = vec![Vec::new(); n];
        for (from, targets) in adj.iter().enumerate() {
            for &to in targets {
                if remaining[from] && remaining[to] {
                    preds[to].push(from);
                }
            }
        }

        // Every unplaced job has an unplaced predecessor, so walking backwards
        // must revisit a job.
        let Some(start) = (0..n).find(|&i| remaining[i]) else {
            return Vec::new();
        };
        let mut path = vec![start];
        let mut seen = vec![None; n];
        seen[start] = Some(0);
        let mut current = start;
        loop {
            let Some(&prev) = preds[current].iter().min() else {
                break;
            };
            if let Some(pos) = seen[prev] {
                let mut cycle: Vec<usize> = path[pos..].to_vec();
                cycle.reverse();
                cycle.push(cycle[0]);
                return cycle.into_iter().map(|i| jobs[i].name.clone()).collect();
            }
            seen[prev] = Some(path.len());
            path.push(prev);
            current = prev;
        }

        (0..n)
            .filter(|&i| remaining[i])
            .map(|i| jobs[i].name.clone())
            .collect()
    }
}
