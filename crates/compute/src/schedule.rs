// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Batch scheduling policies.
//!
//! Node allocation is exclusive: a host serves one batch job at a time,
//! so the schedule reduces to a step function of free nodes over time.
//! The policies are enum values with methods, selected by property.

use dr_core::{FailureCause, ServiceJobArgs, ServiceName, SimResult};

/// Queue ordering policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulingAlgorithm {
    /// Strict arrival order; the head blocks the queue.
    Fcfs,
    /// Every queued job holds a reservation; a job may start early only
    /// without disturbing any reservation.
    ConservativeBf,
    /// Only the head holds a reservation; anything that fits before the
    /// head's start may jump ahead.
    EasyBf,
}

impl SchedulingAlgorithm {
    pub fn parse(value: &str, service: &ServiceName) -> SimResult<Self> {
        match value {
            "FCFS" | "fcfs" => Ok(SchedulingAlgorithm::Fcfs),
            "conservative_bf" => Ok(SchedulingAlgorithm::ConservativeBf),
            "easy_bf" => Ok(SchedulingAlgorithm::EasyBf),
            _ => Err(FailureCause::NotAllowed {
                service: service.clone(),
                reason: format!("unknown batch scheduling algorithm '{value}'"),
            }),
        }
    }
}

dr_core::simple_display! {
    SchedulingAlgorithm {
        Fcfs => "fcfs",
        ConservativeBf => "conservative_bf",
        EasyBf => "easy_bf",
    }
}

/// Which free hosts an allocation takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostSelection {
    FirstFit,
    BestFit,
    RoundRobin,
}

impl HostSelection {
    pub fn parse(value: &str, service: &ServiceName) -> SimResult<Self> {
        match value {
            "FIRSTFIT" => Ok(HostSelection::FirstFit),
            "BESTFIT" => Ok(HostSelection::BestFit),
            "ROUNDROBIN" => Ok(HostSelection::RoundRobin),
            _ => Err(FailureCause::NotAllowed {
                service: service.clone(),
                reason: format!("unknown host selection algorithm '{value}'"),
            }),
        }
    }
}

dr_core::simple_display! {
    HostSelection {
        FirstFit => "firstfit",
        BestFit => "bestfit",
        RoundRobin => "roundrobin",
    }
}

/// Parsed `{-N, -c, -t}` batch arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchArgs {
    pub nodes: usize,
    pub cores_per_node: usize,
    pub minutes: u64,
}

impl BatchArgs {
    /// Validate against the service's host count and smallest host.
    pub fn parse(
        args: &ServiceJobArgs,
        total_hosts: usize,
        cores_per_host: usize,
        service: &ServiceName,
    ) -> SimResult<Self> {
        let field = |key: &str| -> SimResult<u64> {
            let raw = args.get(key).ok_or_else(|| FailureCause::NotAllowed {
                service: service.clone(),
                reason: format!("missing batch argument '{key}'"),
            })?;
            let value: u64 = raw.parse().map_err(|_| FailureCause::NotAllowed {
                service: service.clone(),
                reason: format!("bad batch argument '{key}': '{raw}'"),
            })?;
            if value == 0 {
                return Err(FailureCause::NotAllowed {
                    service: service.clone(),
                    reason: format!("batch argument '{key}' must be positive"),
                });
            }
            Ok(value)
        };
        let nodes = field("-N")? as usize;
        let cores_per_node = field("-c")? as usize;
        let minutes = field("-t")?;
        if nodes > total_hosts {
            return Err(FailureCause::NotEnoughResources {
                job: format!("-N {nodes}"),
                service: service.clone(),
            });
        }
        if cores_per_node > cores_per_host {
            return Err(FailureCause::NotEnoughResources {
                job: format!("-c {cores_per_node}"),
                service: service.clone(),
            });
        }
        Ok(Self { nodes, cores_per_node, minutes })
    }

    pub fn walltime_seconds(&self) -> f64 {
        60.0 * self.minutes as f64
    }
}

/// Free nodes over time as a step function. Reservations subtract nodes
/// over a window; queries scan the step points.
#[derive(Debug, Clone)]
pub struct Timeline {
    /// `(time, free_nodes_from_this_time)`, sorted by time.
    points: Vec<(f64, i64)>,
}

impl Timeline {
    pub fn new(now: f64, total_nodes: usize) -> Self {
        Self { points: vec![(now, total_nodes as i64)] }
    }

    fn value_at(&self, t: f64) -> i64 {
        let mut value = self.points[0].1;
        for &(time, v) in &self.points {
            if time > t + 1e-9 {
                break;
            }
            value = v;
        }
        value
    }

    fn min_over(&self, t0: f64, t1: f64) -> i64 {
        let mut min = self.value_at(t0);
        for &(time, v) in &self.points {
            if time > t0 + 1e-9 && time < t1 - 1e-9 {
                min = min.min(v);
            }
        }
        min
    }

    /// Earliest date ≥ `from` at which `nodes` stay free for `duration`.
    pub fn earliest_start(&self, nodes: usize, duration: f64, from: f64) -> f64 {
        let nodes = nodes as i64;
        let mut candidates: Vec<f64> = vec![from];
        candidates.extend(self.points.iter().map(|&(t, _)| t).filter(|&t| t > from));
        for candidate in candidates {
            if self.min_over(candidate, candidate + duration) >= nodes {
                return candidate;
            }
        }
        // Unreachable when `nodes` ≤ total: past the last point every
        // reservation has been released.
        self.points.last().map(|&(t, _)| t).unwrap_or(from)
    }

    /// Subtract `nodes` over `[t0, t1)`.
    pub fn reserve(&mut self, t0: f64, t1: f64, nodes: usize) {
        let nodes = nodes as i64;
        self.insert_point(t0);
        self.insert_point(t1);
        for point in self.points.iter_mut() {
            if point.0 >= t0 - 1e-9 && point.0 < t1 - 1e-9 {
                point.1 -= nodes;
            }
        }
    }

    fn insert_point(&mut self, t: f64) {
        if self.points.iter().any(|&(time, _)| (time - t).abs() < 1e-9) {
            return;
        }
        let value = self.value_at(t);
        let at = self.points.partition_point(|&(time, _)| time < t);
        self.points.insert(at, (t, value));
    }
}

#[cfg(test)]
#[path = "schedule_tests.rs"]
mod tests;
