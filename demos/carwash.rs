// Simulate cars arriving and being served at a carwash

use std::cell::RefCell;
use std::rc::Rc;

use chrono::Duration;
use prosim::prelude::*;
use prosim::SampleMonitor;

const NUM_MACHINES: usize = 4; // A carwash with 4 machines to wash cars
const NUM_CARS: usize = 4_000; // 4'000 cars generated
const SIM_TIME: i64 = 600_000; // New cars are spawned for 10'000 minutes
const MEAN_DRIVE: i64 = 300; // Each car drives for ~5 minutes
const MEAN_WASH: i64 = 120; // It takes ~2 minutes to wash a car

/// Collects waiting times at the machines.
#[derive(Default)]
struct WaitStats {
    count: usize,
    total: f64,
    longest: f64,
}

impl SampleMonitor for WaitStats {
    fn add(&mut self, value: f64) {
        self.count += 1;
        self.total += value;
        if value > self.longest {
            self.longest = value;
        }
    }
}

fn car(carwash: ResourceId, drive: Duration, wash: Duration, washed: Rc<RefCell<usize>>) -> Box<SimGen> {
    let mut stage = 0;
    let mut lease = None;
    Box::new(move |sim: &mut Simulation| {
        stage += 1;
        match stage {
            // drive to the carwash
            1 => ProcessStep::Yielded(sim.timeout(drive).unwrap()),
            // wait for a machine
            2 => {
                let request = sim.request(carwash).unwrap();
                lease = Some(request);
                ProcessStep::Yielded(request)
            }
            // wash
            3 => ProcessStep::Yielded(sim.timeout(wash).unwrap()),
            // clean! leave the carwash
            4 => ProcessStep::Yielded(sim.release(carwash, lease.unwrap()).unwrap()),
            _ => {
                *washed.borrow_mut() += 1;
                ProcessStep::Complete(Payload::None)
            }
        }
    })
}

fn main() {
    tracing_subscriber::fmt::init();

    let washed = Rc::new(RefCell::new(0usize));
    let waits = Rc::new(RefCell::new(WaitStats::default()));

    let mut sim = Simulation::with_seed(42);
    let carwash = sim.create_resource(NUM_MACHINES).unwrap();
    sim.attach_resource_monitors(
        carwash,
        prosim::ResourceMonitors {
            waiting_time: Some(waits.clone()),
            ..Default::default()
        },
    );

    for _ in 0..NUM_CARS {
        let drive = sim
            .rand_exponential_span(Duration::seconds(MEAN_DRIVE))
            .unwrap();
        let wash = sim
            .rand_exponential_span(Duration::seconds(MEAN_WASH))
            .unwrap();
        sim.create_process(car(carwash, drive, wash, washed.clone()));
    }

    sim.run(EndCondition::Delay(Duration::seconds(SIM_TIME)))
        .unwrap();

    let waits = waits.borrow();
    println!("Carwash closed at minute {:.0}", sim.now_d() / 60.0);
    println!("{} cars washed", washed.borrow());
    println!(
        "average wait {:.1} min, longest wait {:.1} min",
        waits.total / waits.count.max(1) as f64 / 60.0,
        waits.longest / 60.0
    );
}
