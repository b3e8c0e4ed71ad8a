// A workshop where machines break down and compete for a single
// repairman, who also has other, less urgent jobs to do.
//
// Features shown in this example:
// * PreemptiveResource
// * Interrupts and handle_fault
// * EndCondition::Delay

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use chrono::Duration;
use prosim::prelude::*;

const NUM_MACHINES: usize = 10;
const PART_TIME: i64 = 600; // ~10 minutes to make one part
const MEAN_TIME_TO_FAILURE: i64 = 18_000; // a machine breaks every ~5 hours
const REPAIR_TIME: i64 = 1_800; // fixing takes 30 minutes
const OTHER_JOB_TIME: i64 = 1_200; // unimportant work in 20 minute slices
const SIM_TIME: i64 = 4 * 7 * 24 * 3_600; // four weeks

enum MachineState {
    Working,
    WaitRepair,
    Repairing,
    Releasing,
}

/// Makes parts until interrupted by a breakdown, then claims the
/// repairman (kicking him off lesser work if needed) and resumes.
fn machine(
    repairman: ResourceId,
    part_time: Duration,
    working: Rc<Cell<bool>>,
    parts: Rc<RefCell<Vec<usize>>>,
    index: usize,
) -> Box<SimGen> {
    let mut state = MachineState::Working;
    let mut lease = None;
    let mut started = false;
    Box::new(move |sim: &mut Simulation| {
        if !started {
            started = true;
            working.set(true);
            return ProcessStep::Yielded(sim.timeout(part_time).unwrap());
        }
        if sim.handle_fault() {
            // broken mid-part; the part is scrap
            working.set(false);
            state = MachineState::WaitRepair;
            let request = sim.request_preempting(repairman, 1, true).unwrap();
            lease = Some(request);
            return ProcessStep::Yielded(request);
        }
        match state {
            MachineState::Working => {
                parts.borrow_mut()[index] += 1;
                ProcessStep::Yielded(sim.timeout(part_time).unwrap())
            }
            MachineState::WaitRepair => {
                state = MachineState::Repairing;
                ProcessStep::Yielded(sim.timeout(Duration::seconds(REPAIR_TIME)).unwrap())
            }
            MachineState::Repairing => {
                state = MachineState::Releasing;
                ProcessStep::Yielded(sim.release(repairman, lease.unwrap()).unwrap())
            }
            MachineState::Releasing => {
                state = MachineState::Working;
                working.set(true);
                ProcessStep::Yielded(sim.timeout(part_time).unwrap())
            }
        }
    })
}

/// Breaks one machine over and over, leaving it alone while it is
/// already down.
fn breaker(victim: ProcessId, working: Rc<Cell<bool>>, ttf: Duration) -> Box<SimGen> {
    let mut started = false;
    Box::new(move |sim: &mut Simulation| {
        if !started {
            started = true;
            return ProcessStep::Yielded(sim.timeout(ttf).unwrap());
        }
        if working.get() {
            working.set(false);
            if sim.interrupt(victim, Payload::from("breakdown")).is_err() {
                // the machine is gone; stop breaking things
                return ProcessStep::Complete(Payload::None);
            }
        }
        ProcessStep::Yielded(sim.timeout(ttf).unwrap())
    })
}

enum JobState {
    Acquire,
    StartSlice,
    FinishSlice,
}

/// The repairman's background work, done in slices whenever no
/// machine claims him.
fn other_jobs(repairman: ResourceId, finished: Rc<RefCell<usize>>) -> Box<SimGen> {
    let mut state = JobState::Acquire;
    let mut lease = None;
    Box::new(move |sim: &mut Simulation| {
        if sim.handle_fault() {
            // preempted by a broken machine: the lease is gone, queue
            // up again
            state = JobState::Acquire;
        }
        match state {
            JobState::Acquire => {
                let request = sim.request_preempting(repairman, 2, false).unwrap();
                lease = Some(request);
                state = JobState::StartSlice;
                ProcessStep::Yielded(request)
            }
            JobState::StartSlice => {
                state = JobState::FinishSlice;
                ProcessStep::Yielded(sim.timeout(Duration::seconds(OTHER_JOB_TIME)).unwrap())
            }
            JobState::FinishSlice => {
                // a slice went through uninterrupted
                *finished.borrow_mut() += 1;
                state = JobState::Acquire;
                ProcessStep::Yielded(sim.release(repairman, lease.unwrap()).unwrap())
            }
        }
    })
}

fn main() {
    tracing_subscriber::fmt::init();

    let parts = Rc::new(RefCell::new(vec![0usize; NUM_MACHINES]));
    let jobs = Rc::new(RefCell::new(0usize));

    let mut sim = Simulation::with_seed(42);
    let repairman = sim.create_preemptive_resource(1).unwrap();

    for index in 0..NUM_MACHINES {
        let part_time = sim
            .rand_normal_positive_span(
                Duration::seconds(PART_TIME),
                Duration::seconds(PART_TIME / 10),
            )
            .unwrap();
        let working = Rc::new(Cell::new(false));
        let machine_id = sim.create_process(machine(
            repairman,
            part_time,
            working.clone(),
            parts.clone(),
            index,
        ));
        let ttf = sim
            .rand_exponential_span(Duration::seconds(MEAN_TIME_TO_FAILURE))
            .unwrap();
        sim.create_process(breaker(machine_id, working, ttf));
    }
    sim.create_process(other_jobs(repairman, jobs.clone()));

    sim.run(EndCondition::Delay(Duration::seconds(SIM_TIME)))
        .unwrap();

    println!(
        "Machine shop results after {:.0} days:",
        sim.now_d() / 86_400.0
    );
    for (index, made) in parts.borrow().iter().enumerate() {
        println!("machine {} made {} parts", index, made);
    }
    println!("the repairman finished {} other jobs", jobs.borrow());
}
