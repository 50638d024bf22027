use std::{
    fs,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use memsched::{
    Error, PolicyKind, Sim, SimConfig, Transition, WorkloadId, WorkloadSpec, WorkloadState,
    clock::SimClock,
    exec::{ExecState, ThreadLauncher},
    scheduler::{Hpf, Policy, RoundRobin, Srtn},
    simulate,
};

fn spec(id: WorkloadId, arrival: u64, runtime: u64, priority: u32) -> WorkloadSpec {
    WorkloadSpec::new(id, arrival, runtime, priority, 16)
}

/// Who held the CPU at each tick, ending with the tick the scheduler drained.
fn run_timeline<P: Policy>(
    config: SimConfig,
    schedule: Vec<WorkloadSpec>,
) -> (Vec<Option<WorkloadId>>, Sim<P>) {
    let mut sim = Sim::<P>::new(config, schedule).unwrap();
    let mut timeline = Vec::new();
    while !sim.is_done() {
        sim.step().unwrap();
        timeline.push(sim.running());
        assert!(timeline.len() < 10_000, "simulation did not drain");
    }
    (timeline, sim)
}

fn expand(runs: &[(WorkloadId, usize)]) -> Vec<Option<WorkloadId>> {
    runs.iter()
        .flat_map(|&(id, n)| std::iter::repeat_n(Some(id), n))
        .chain([None])
        .collect()
}

#[test]
fn hpf_runs_to_completion_in_priority_order() {
    let schedule = vec![spec(1, 0, 5, 1), spec(2, 0, 3, 2), spec(3, 1, 2, 3)];
    let (timeline, sim) = run_timeline::<Hpf>(SimConfig::default(), schedule);
    assert_eq!(timeline, expand(&[(1, 5), (2, 3), (3, 2)]));

    let stopped = sim
        .trace()
        .sched_events()
        .filter(|e| e.transition == Transition::Stopped)
        .count();
    assert_eq!(stopped, 0);

    let finished: Vec<_> = sim
        .core
        .finished()
        .iter()
        .map(|r| (r.id, r.finish_time, r.wait_time, r.turnaround))
        .collect();
    assert_eq!(finished, vec![(1, 5, 0, 5), (2, 8, 5, 8), (3, 10, 7, 9)]);

    let summary = sim.summary().unwrap();
    assert!((summary.cpu_utilization - 100.0).abs() < 1e-9);
    assert!((summary.avg_wait - 4.0).abs() < 1e-9);
    assert!((summary.avg_wta - (1.0 + 8.0 / 3.0 + 4.5) / 3.0).abs() < 1e-9);
}

#[test]
fn hpf_never_preempts_for_a_better_arrival() {
    let schedule = vec![spec(1, 0, 4, 5), spec(2, 1, 2, 0)];
    let (timeline, _) = run_timeline::<Hpf>(SimConfig::default(), schedule);
    assert_eq!(timeline, expand(&[(1, 4), (2, 2)]));
}

#[test]
fn srtn_preempts_on_strictly_shorter_and_breaks_ties_by_arrival() {
    let schedule = vec![spec(1, 0, 6, 0), spec(2, 1, 2, 0), spec(3, 2, 5, 0)];
    let (timeline, sim) = run_timeline::<Srtn>(SimConfig::new(PolicyKind::Srtn), schedule);
    assert_eq!(timeline, expand(&[(1, 1), (2, 2), (1, 5), (3, 5)]));

    let transitions: Vec<_> = sim
        .trace()
        .sched_events()
        .filter(|e| e.workload == 1 && e.transition != Transition::Arrived)
        .map(|e| (e.at, e.transition))
        .collect();
    assert_eq!(
        transitions,
        vec![
            (0, Transition::Started),
            (1, Transition::Stopped),
            (3, Transition::Resumed),
            (8, Transition::Finished),
        ]
    );
    let first = &sim.core.finished()[1];
    assert_eq!((first.id, first.wait_time), (1, 2));
}

#[test]
fn srtn_tie_keeps_the_incumbent() {
    let schedule = vec![spec(1, 0, 4, 0), spec(2, 1, 3, 0)];
    let (timeline, _) = run_timeline::<Srtn>(SimConfig::new(PolicyKind::Srtn), schedule);
    assert_eq!(timeline, expand(&[(1, 4), (2, 3)]));
}

/// Straight transcription of the round-robin rule, for workloads that all
/// fit in memory at once.
fn round_robin_reference(jobs: &[(WorkloadId, u64, u64)], quantum: u64) -> Vec<Option<WorkloadId>> {
    use std::collections::{HashMap, VecDeque};

    let mut remaining: HashMap<_, _> = jobs.iter().map(|&(id, _, run)| (id, run)).collect();
    let mut queue = VecDeque::new();
    let mut running: Option<WorkloadId> = None;
    let mut consumed = 0;
    let mut done = 0;
    let mut timeline = Vec::new();

    for now in 0.. {
        if running.is_some_and(|id| remaining[&id] == 0) {
            running = None;
            done += 1;
        }
        queue.extend(jobs.iter().filter(|j| j.1 == now).map(|j| j.0));
        if running.is_some() && consumed == quantum {
            let id = running.take().unwrap();
            if remaining[&id] > 0 {
                queue.push_back(id);
            }
        }
        if running.is_none() {
            running = queue.pop_front();
            consumed = 0;
        }
        if let Some(id) = running {
            let left = remaining.get_mut(&id).unwrap();
            *left = left.saturating_sub(1);
            consumed += 1;
        }
        timeline.push(running);
        if done == jobs.len() {
            break;
        }
    }
    timeline
}

#[test]
fn round_robin_follows_the_quantum_rule() {
    let schedule = vec![spec(1, 0, 5, 0), spec(2, 0, 3, 0)];
    let config = SimConfig::new(PolicyKind::RoundRobin).with_quantum(2);
    let (timeline, _) = run_timeline::<RoundRobin>(config, schedule);

    assert_eq!(timeline, round_robin_reference(&[(1, 0, 5), (2, 0, 3)], 2));
    assert_eq!(
        timeline,
        vec![
            Some(1),
            Some(1),
            Some(2),
            Some(2),
            Some(1),
            Some(1),
            Some(2),
            Some(1),
            None
        ]
    );
}

#[test]
fn round_robin_matches_reference_with_staggered_arrivals() {
    let jobs = [(1, 0, 4), (2, 1, 6), (3, 2, 1), (4, 7, 3)];
    for quantum in 1..=4 {
        let schedule = jobs
            .iter()
            .map(|&(id, arrival, run)| spec(id, arrival, run, 0))
            .collect();
        let config = SimConfig::new(PolicyKind::RoundRobin).with_quantum(quantum);
        let (timeline, _) = run_timeline::<RoundRobin>(config, schedule);
        assert_eq!(
            timeline,
            round_robin_reference(&jobs, quantum),
            "quantum {quantum}"
        );
    }
}

#[test]
fn lone_round_robin_workload_is_never_paused() {
    let config = SimConfig::new(PolicyKind::RoundRobin).with_quantum(1);
    let (timeline, sim) = run_timeline::<RoundRobin>(config, vec![spec(1, 0, 3, 0)]);
    assert_eq!(timeline, expand(&[(1, 3)]));
    assert!(
        sim.trace()
            .sched_events()
            .all(|e| !matches!(e.transition, Transition::Stopped | Transition::Resumed))
    );
}

#[test]
fn memory_gates_admission_until_release() {
    let schedule = vec![
        WorkloadSpec::new(1, 0, 3, 0, 600),
        WorkloadSpec::new(2, 0, 2, 0, 600),
    ];
    let mut sim = Sim::<Hpf>::new(SimConfig::default(), schedule).unwrap();

    sim.step().unwrap();
    assert_eq!(sim.status(1), Some(WorkloadState::Running));
    assert_eq!(sim.status(2), Some(WorkloadState::PendingMemory));
    assert_eq!(sim.memory().allocated_blocks()[0].size, 1024);

    let mut timeline = vec![sim.running()];
    while !sim.is_done() {
        sim.step().unwrap();
        timeline.push(sim.running());
    }
    assert_eq!(
        timeline,
        vec![Some(1), Some(1), Some(1), None, None, Some(2), Some(2), None]
    );
    assert_eq!(sim.status(1), Some(WorkloadState::Finished));
    assert_eq!(sim.status(2), Some(WorkloadState::Finished));

    let memory: Vec<_> = sim
        .trace()
        .memory_events()
        .map(|e| (e.at, e.to_string().contains("allocated"), e.workload))
        .collect();
    assert_eq!(
        memory,
        vec![(0, true, 1), (4, false, 1), (5, true, 2), (7, false, 2)]
    );
    assert_eq!(sim.memory().free_total(), 1024);

    let late = &sim.core.finished()[1];
    assert_eq!((late.id, late.wait_time, late.turnaround), (2, 5, 7));
    let summary = sim.summary().unwrap();
    assert!((summary.cpu_utilization - 500.0 / 7.0).abs() < 1e-9);
}

#[test]
fn zero_runtime_workload_has_no_wta() {
    let schedule = vec![spec(1, 0, 0, 0), spec(2, 0, 2, 1)];
    let (timeline, sim) = run_timeline::<Hpf>(SimConfig::default(), schedule);
    assert_eq!(timeline, expand(&[(1, 1), (2, 2)]));

    let records = sim.core.finished();
    assert_eq!(records[0].weighted_turnaround, None);
    assert_eq!(records[1].weighted_turnaround, Some(1.5));
    let summary = sim.summary().unwrap();
    assert_eq!(summary.busy_ticks, 2);
    assert!((summary.avg_wta - 1.5).abs() < 1e-9);
    assert!((summary.avg_wait - 0.5).abs() < 1e-9);
}

#[test]
fn empty_schedule_drains_immediately() {
    let report = simulate(SimConfig::default(), Vec::new()).unwrap();
    assert!(report.finished.is_empty());
    assert_eq!(report.summary.elapsed_ticks, 0);
    assert_eq!(report.summary.cpu_utilization, 0.0);
}

#[test]
fn unrepresentable_memory_request_is_rejected() {
    let schedule = vec![WorkloadSpec::new(1, 0, 1, 0, u64::MAX)];
    let err = simulate(SimConfig::default(), schedule).unwrap_err();
    assert!(matches!(
        err,
        Error::WorkloadTooLarge { id: 1, size: u64::MAX, capacity: 1024 }
    ));
}

#[test]
fn writes_all_three_logs() {
    let dir = tempfile::tempdir().unwrap();
    let config = SimConfig::default().with_log_dir(dir.path());
    let schedule = vec![spec(1, 0, 5, 1), spec(2, 0, 3, 2), spec(3, 1, 2, 3)];
    let report = simulate(config, schedule).unwrap();
    assert_eq!(report.policy, PolicyKind::Hpf);
    assert!(!report.interrupted);

    let sched = fs::read_to_string(dir.path().join("scheduler.log")).unwrap();
    let lines: Vec<_> = sched.lines().collect();
    assert!(lines[0].starts_with('#'));
    assert_eq!(lines.iter().filter(|l| l.contains(" started ")).count(), 3);
    assert_eq!(lines.iter().filter(|l| l.contains(" finished ")).count(), 3);
    assert!(lines.contains(
        &"At time 5 process 1 finished arr 0 total 5 remain 0 wait 0 TA 5 WTA 1.00"
    ));

    let memory = fs::read_to_string(dir.path().join("memory.log")).unwrap();
    assert_eq!(memory.lines().count(), 7);
    assert!(memory.contains("At time 0 allocated 16 bytes for process 1 from 0 to 15"));
    assert!(memory.contains("At time 10 freed 16 bytes from process 3"));

    let perf = fs::read_to_string(dir.path().join("scheduler.perf")).unwrap();
    let perf: Vec<_> = perf.lines().collect();
    assert_eq!(perf[0], "CPU utilization = 100.00%");
    assert_eq!(perf[1], "Avg WTA = 2.72");
    assert_eq!(perf[2], "Avg Waiting = 4.00");
    assert!(perf[3].starts_with("Std WTA = "));
}

#[test]
fn teardown_is_idempotent() {
    let schedule = vec![spec(1, 0, 10, 0), spec(2, 0, 10, 1)];
    let mut sim = Sim::<Hpf>::new(SimConfig::default(), schedule).unwrap();
    sim.step().unwrap();
    sim.step().unwrap();
    assert!(sim.memory().allocated_total() > 0);

    sim.teardown().unwrap();
    sim.teardown().unwrap();
    assert!(sim.is_done());
    assert_eq!(sim.memory().free_total(), 1024);
    let tick = sim.step().unwrap();
    assert!(tick.scheduling.is_empty() && tick.memory.is_empty());
}

#[test]
fn interrupt_stops_the_run() {
    let schedule = vec![spec(1, 0, 10, 0)];
    let sim = Sim::<Hpf>::new(SimConfig::default(), schedule).unwrap();
    sim.interrupt_flag().store(true, Ordering::SeqCst);
    let report = sim.run().unwrap();
    assert!(report.interrupted);
    assert!(report.finished.is_empty());
}

#[test]
fn shared_interrupt_flag_tears_down_a_hand_driven_run() {
    let dir = tempfile::tempdir().unwrap();
    let config = SimConfig::default().with_log_dir(dir.path());
    let schedule = vec![spec(1, 0, 50, 0), spec(2, 0, 50, 1)];
    let flag = Arc::new(AtomicBool::new(false));
    let mut sim = Sim::<Hpf, _, _>::with_parts(
        config,
        schedule,
        ThreadLauncher::default(),
        SimClock::default(),
    )
    .unwrap()
    .with_interrupt_flag(Arc::clone(&flag));

    let mut ticks = 0;
    while !sim.is_done() && !sim.check_interrupt() {
        sim.step().unwrap();
        ticks += 1;
        if ticks == 3 {
            flag.store(true, Ordering::SeqCst);
        }
    }
    assert_eq!(ticks, 3);
    let running = sim.core.ctx.workload(1).handle.clone();
    let queued = sim.core.ctx.workload(2).handle.clone();

    let report = sim.into_report().unwrap();
    assert!(report.interrupted);
    assert!(report.finished.is_empty());
    assert_eq!(running.state(), ExecState::Terminated);
    assert_eq!(queued.state(), ExecState::Terminated);

    // Buffered trace lines reach the file on teardown.
    let sched = fs::read_to_string(dir.path().join("scheduler.log")).unwrap();
    assert!(sched.contains("At time 0 process 1 started"));
}

#[test]
fn thread_backed_workloads_run_to_completion() {
    let schedule = vec![spec(1, 0, 3, 0), spec(2, 1, 2, 0), spec(3, 1, 4, 0)];
    let config = SimConfig::new(PolicyKind::RoundRobin).with_quantum(2);
    let mut sim = Sim::<RoundRobin, _, _>::with_parts(
        config,
        schedule,
        ThreadLauncher::default(),
        SimClock::default(),
    )
    .unwrap();

    sim.step().unwrap();
    let running = sim.running().unwrap();
    let handle = sim.core.ctx.workload(running).handle.clone();
    assert_eq!(handle.state(), ExecState::Running);
    assert_eq!(handle.progress(), 2);

    let report = sim.run().unwrap();
    assert_eq!(report.finished.len(), 3);
    assert_eq!(handle.state(), ExecState::Finished);
}
