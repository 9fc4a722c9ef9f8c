//! Reduction of orchestrator job and allocation state into a status report.

use std::{collections::BTreeMap, fmt};

use crate::nomad::model::{AllocationListStub, Job};

/// Declares a closed vocabulary of orchestrator status strings with an
/// `Other` fallback that keeps the raw value.
macro_rules! vocabulary {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $raw:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq)]
        pub enum $name {
            $($variant,)+
            Other(String),
        }

        impl $name {
            /// Exact, case-sensitive match.
            pub fn from_raw(raw: &str) -> Self {
                match raw {
                    $($raw => $name::$variant,)+
                    other => $name::Other(other.to_string()),
                }
            }

            pub fn as_str(&self) -> &str {
                match self {
                    $($name::$variant => $raw,)+
                    $name::Other(raw) => raw.as_str(),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

vocabulary!(
    /// Lifecycle state of a job.
    JobStatus {
        Pending => "pending",
        Running => "running",
        Dead => "dead",
    }
);

vocabulary!(
    JobType {
        Service => "service",
        Batch => "batch",
        System => "system",
        SysBatch => "sysbatch",
    }
);

vocabulary!(
    /// What the client node reports for an allocation.
    ClientStatus {
        Pending => "pending",
        Running => "running",
        Complete => "complete",
        Failed => "failed",
        Lost => "lost",
        Unknown => "unknown",
    }
);

vocabulary!(
    /// What the scheduler wants for an allocation.
    DesiredStatus {
        Run => "run",
        Stop => "stop",
        Evict => "evict",
    }
);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocationSummary {
    pub allocation_id: String,
    pub node_id: String,
    pub node_name: String,
    pub client_status: ClientStatus,
    pub desired_status: DesiredStatus,
    /// Unix nanoseconds.
    pub create_time: i64,
    pub modify_time: i64,
    /// Task name to task state.
    pub task_states: BTreeMap<String, String>,
}

impl From<&AllocationListStub> for AllocationSummary {
    fn from(alloc: &AllocationListStub) -> Self {
        let task_states = alloc
            .task_states
            .iter()
            .flatten()
            .map(|(task, state)| (task.clone(), state.state.clone()))
            .collect();

        Self {
            allocation_id: alloc.id.clone(),
            node_id: alloc.node_id.clone(),
            node_name: alloc.node_name.clone(),
            client_status: ClientStatus::from_raw(&alloc.client_status),
            desired_status: DesiredStatus::from_raw(&alloc.desired_status),
            create_time: alloc.create_time,
            modify_time: alloc.modify_time,
            task_states,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub deployment_id: String,
    pub job_status: JobStatus,
    pub job_type: JobType,
    /// Count of the first task group, 0 without task groups.
    pub desired_instances: u32,
    /// Allocations whose client status is exactly `running`. May exceed
    /// `desired_instances` during a rollout.
    pub running_instances: u32,
    pub allocations: Vec<AllocationSummary>,
}

impl StatusReport {
    pub fn aggregate(deployment_id: &str, job: &Job, allocations: &[AllocationListStub]) -> Self {
        let allocations: Vec<AllocationSummary> =
            allocations.iter().map(AllocationSummary::from).collect();

        let running_instances = allocations
            .iter()
            .filter(|a| a.client_status == ClientStatus::Running)
            .count();

        let desired_instances = job
            .task_groups
            .first()
            .and_then(|group| group.count)
            .unwrap_or(0);

        Self {
            deployment_id: deployment_id.to_string(),
            job_status: JobStatus::from_raw(job.status.as_deref().unwrap_or_default()),
            job_type: JobType::from_raw(job.job_type.as_deref().unwrap_or_default()),
            desired_instances,
            running_instances: u32::try_from(running_instances).unwrap_or(u32::MAX),
            allocations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nomad::model::{TaskGroup, TaskState};
    use quickcheck_macros::quickcheck;

    fn job(counts: &[u32]) -> Job {
        Job {
            id: Some("web".to_string()),
            job_type: Some("service".to_string()),
            status: Some("running".to_string()),
            task_groups: counts
                .iter()
                .map(|c| TaskGroup {
                    count: Some(*c),
                    ..TaskGroup::default()
                })
                .collect(),
            ..Job::default()
        }
    }

    fn alloc(id: &str, client_status: &str) -> AllocationListStub {
        AllocationListStub {
            id: id.to_string(),
            node_id: format!("node-{id}"),
            node_name: format!("worker-{id}"),
            client_status: client_status.to_string(),
            desired_status: "run".to_string(),
            create_time: 1,
            modify_time: 2,
            task_states: None,
        }
    }

    #[test]
    fn test_counts() {
        let allocs = [
            alloc("a", "running"),
            alloc("b", "pending"),
            alloc("c", "running"),
            alloc("d", "failed"),
        ];
        let report = StatusReport::aggregate("web", &job(&[3]), &allocs);
        assert_eq!(report.deployment_id, "web");
        assert_eq!(report.job_status, JobStatus::Running);
        assert_eq!(report.job_type, JobType::Service);
        assert_eq!(report.desired_instances, 3);
        assert_eq!(report.running_instances, 2);
        assert_eq!(report.allocations.len(), 4);
        assert_eq!(report.allocations[1].allocation_id, "b");
        assert_eq!(report.allocations[3].client_status, ClientStatus::Failed);
    }

    #[test]
    fn test_no_task_groups() {
        let report = StatusReport::aggregate("web", &job(&[]), &[alloc("a", "running")]);
        assert_eq!(report.desired_instances, 0);
        assert_eq!(report.running_instances, 1);
    }

    #[test]
    fn test_desired_reads_first_group() {
        let report = StatusReport::aggregate("web", &job(&[2, 7]), &[]);
        assert_eq!(report.desired_instances, 2);
    }

    #[test]
    fn test_running_match_is_case_sensitive() {
        let allocs = [alloc("a", "Running"), alloc("b", "RUNNING"), alloc("c", " running")];
        let report = StatusReport::aggregate("web", &job(&[3]), &allocs);
        assert_eq!(report.running_instances, 0);
        assert_eq!(
            report.allocations[0].client_status,
            ClientStatus::Other("Running".to_string())
        );
    }

    #[test]
    fn test_task_states() {
        let mut with_states = alloc("a", "running");
        with_states.task_states = Some(BTreeMap::from([
            (
                "web".to_string(),
                TaskState {
                    state: "running".to_string(),
                },
            ),
            (
                "sidecar".to_string(),
                TaskState {
                    state: "dead".to_string(),
                },
            ),
        ]));
        let allocs = [with_states, alloc("b", "pending")];
        let report = StatusReport::aggregate("web", &job(&[1]), &allocs);
        assert_eq!(
            report.allocations[0].task_states.get("sidecar").map(String::as_str),
            Some("dead")
        );
        assert!(report.allocations[1].task_states.is_empty());
    }

    #[test]
    fn test_missing_job_fields() {
        let report = StatusReport::aggregate("ghost", &Job::default(), &[]);
        assert_eq!(report.job_status, JobStatus::Other(String::new()));
        assert_eq!(report.job_type.as_str(), "");
    }

    #[test]
    fn test_vocabulary_round_trip_keeps_raw() {
        assert_eq!(JobStatus::from_raw("dead").as_str(), "dead");
        assert_eq!(JobType::from_raw("sysbatch"), JobType::SysBatch);
        assert_eq!(DesiredStatus::from_raw("drain").to_string(), "drain");
    }

    #[quickcheck]
    fn prop_running_equals_running_allocations(statuses: Vec<bool>) -> bool {
        let allocs: Vec<_> = statuses
            .iter()
            .enumerate()
            .map(|(i, running)| {
                alloc(
                    &i.to_string(),
                    if *running { "running" } else { "complete" },
                )
            })
            .collect();
        let report = StatusReport::aggregate("web", &job(&[1]), &allocs);
        report.running_instances as usize == statuses.iter().filter(|r| **r).count()
    }
}
