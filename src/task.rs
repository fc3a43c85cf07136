//! Named build tasks, dependency resolution and explicit sequencing.
//!
//! Tasks are registered once at startup and invoked by name. Each task may
//! declare prerequisite tasks; prerequisites at the same depth run
//! concurrently and the task body starts only after every prerequisite
//! succeeded. The edges must form a DAG, a cycle fails the run before any
//! body executes.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};

use crate::error::TaskError;

/// Result from a single executed task body.
pub type TaskResult = anyhow::Result<()>;

type TaskFnPtr<C> = Arc<dyn Fn(&C) -> TaskResult + Send + Sync>;

struct Task<C> {
    name: &'static str,
    deps: Vec<&'static str>,
    func: TaskFnPtr<C>,
}

/// One step of an explicit sequence.
#[derive(Clone, Copy)]
pub enum Step<'a> {
    /// Run a single task to completion.
    One(&'static str),
    /// Run a group of tasks concurrently, wait for all of them.
    Many(&'a [&'static str]),
}

/// The task registry. `C` is the context passed to every task body,
/// constructed explicitly by the caller rather than held in a global.
pub struct Orchestrator<C: Send + Sync> {
    tasks: Vec<Task<C>>,
    index: HashMap<&'static str, usize>,
}

impl<C: Send + Sync> Default for Orchestrator<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Send + Sync> Orchestrator<C> {
    pub fn new() -> Self {
        Self {
            tasks: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Register a task under a unique name with its prerequisite list.
    pub fn register<F>(
        &mut self,
        name: &'static str,
        deps: &[&'static str],
        func: F,
    ) -> Result<(), TaskError>
    where
        F: Fn(&C) -> TaskResult + Send + Sync + 'static,
    {
        if self.index.contains_key(name) {
            return Err(TaskError::Duplicate(name.to_string()));
        }

        self.index.insert(name, self.tasks.len());
        self.tasks.push(Task {
            name,
            deps: deps.to_vec(),
            func: Arc::new(func),
        });

        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> {
        self.tasks.iter().map(|task| task.name)
    }

    /// Run a task by name, prerequisites first.
    ///
    /// The transitive closure of the task is executed in topological waves:
    /// every task whose prerequisites have completed runs concurrently with
    /// the rest of its wave. The first failure in a wave is reported and no
    /// further wave starts, but already-started siblings in the failing wave
    /// run to completion.
    pub fn run(&self, name: &str, ctx: &C) -> Result<(), TaskError> {
        let target = *self
            .index
            .get(name)
            .ok_or_else(|| TaskError::Unknown(name.to_string()))?;

        self.check_cycles()?;

        for wave in self.waves(target)? {
            let results: Vec<(usize, TaskResult)> = wave
                .par_iter()
                .map(|&idx| (idx, (self.tasks[idx].func)(ctx)))
                .collect();

            for (idx, result) in results {
                if let Err(source) = result {
                    return Err(TaskError::Failed {
                        name: self.tasks[idx].name.to_string(),
                        source,
                    });
                }
            }
        }

        Ok(())
    }

    /// Run an ordered list of steps, aborting at the first failing step.
    ///
    /// Within a [`Step::Many`] group every task starts before any is
    /// required to finish, and the step completes only when all have
    /// signaled. The first error in listed order is propagated; a failing
    /// sibling never cancels an already-started one.
    pub fn sequence(&self, steps: &[Step<'_>], ctx: &C) -> Result<(), TaskError> {
        for step in steps {
            match step {
                Step::One(name) => self.run(name, ctx)?,
                Step::Many(names) => {
                    let results = std::thread::scope(|s| {
                        let handles: Vec<_> = names
                            .iter()
                            .map(|&name| s.spawn(move || self.run(name, ctx)))
                            .collect();

                        handles
                            .into_iter()
                            .map(|handle| handle.join().expect("task thread panicked"))
                            .collect::<Vec<_>>()
                    });

                    for result in results {
                        result?;
                    }
                }
            }
        }

        Ok(())
    }

    /// Cycle detection over the whole registry, so a bad edge is reported
    /// even when the current run would not reach it.
    fn check_cycles(&self) -> Result<(), TaskError> {
        let mut graph = DiGraphMap::<&str, ()>::new();
        for task in &self.tasks {
            graph.add_node(task.name);
            for &dep in &task.deps {
                graph.add_edge(dep, task.name, ());
            }
        }

        match toposort(&graph, None) {
            Ok(_) => Ok(()),
            Err(cycle) => Err(TaskError::Cycle(cycle.node_id().to_string())),
        }
    }

    /// Topological waves over the transitive prerequisite closure of the
    /// target, the target included. Wave `n` holds every task whose longest
    /// prerequisite chain has length `n`, so a task reached through several
    /// edges still executes exactly once per invocation.
    fn waves(&self, target: usize) -> Result<Vec<Vec<usize>>, TaskError> {
        let mut depth: HashMap<usize, usize> = HashMap::new();
        let mut seen = HashSet::new();
        let mut stack = vec![(target, false)];

        while let Some((idx, expanded)) = stack.pop() {
            if expanded {
                let max = self.tasks[idx]
                    .deps
                    .iter()
                    .map(|dep| depth[&self.index[dep]] + 1)
                    .max()
                    .unwrap_or(0);
                depth.insert(idx, max);
                continue;
            }

            if !seen.insert(idx) {
                continue;
            }

            stack.push((idx, true));
            for dep in &self.tasks[idx].deps {
                match self.index.get(dep) {
                    Some(&dep) => stack.push((dep, false)),
                    None => return Err(TaskError::Unknown(dep.to_string())),
                }
            }
        }

        let mut waves: Vec<Vec<usize>> = Vec::new();
        let mut order: Vec<(usize, usize)> = depth.into_iter().collect();
        order.sort_unstable();

        for (idx, level) in order {
            while waves.len() <= level {
                waves.push(Vec::new());
            }
            waves[level].push(idx);
        }

        Ok(waves)
    }
}
