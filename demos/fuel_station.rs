// A fuel station with a shared tank: cars draw fuel, a tank truck is
// called whenever the level falls below a threshold.
//
// Features shown in this example:
// * Container and its level latches
// * when_at_most as a refill trigger

use std::cell::RefCell;
use std::rc::Rc;

use chrono::Duration;
use prosim::prelude::*;

const TANK_CAPACITY: f64 = 200.0; // liters
const INITIAL_LEVEL: f64 = 100.0;
const REFILL_THRESHOLD: f64 = 25.0; // call the truck below this level
const TRUCK_DELAY: i64 = 600; // the truck needs 10 minutes
const NUM_CARS: usize = 50;
const MEAN_ARRIVAL: i64 = 120; // a car every ~2 minutes

fn car(tank: ContainerId, arrival: Duration, liters: f64, served: Rc<RefCell<f64>>) -> Box<SimGen> {
    let mut stage = 0;
    Box::new(move |sim: &mut Simulation| {
        stage += 1;
        match stage {
            1 => ProcessStep::Yielded(sim.timeout(arrival).unwrap()),
            2 => ProcessStep::Yielded(sim.container_get(tank, liters).unwrap()),
            _ => {
                *served.borrow_mut() += liters;
                ProcessStep::Complete(Payload::None)
            }
        }
    })
}

/// Watches the tank level and sends the truck whenever it runs low.
fn tank_truck(tank: ContainerId, refills: Rc<RefCell<usize>>) -> Box<SimGen> {
    let mut stage = 0;
    Box::new(move |sim: &mut Simulation| {
        stage += 1;
        match stage % 3 {
            // wait for the level to fall below the threshold
            1 => ProcessStep::Yielded(sim.when_at_most(tank, REFILL_THRESHOLD)),
            // drive to the station
            2 => ProcessStep::Yielded(sim.timeout(Duration::seconds(TRUCK_DELAY)).unwrap()),
            // top the tank off
            _ => {
                *refills.borrow_mut() += 1;
                let room = sim.container_capacity(tank) - sim.level(tank);
                ProcessStep::Yielded(sim.container_put(tank, room).unwrap())
            }
        }
    })
}

fn main() {
    tracing_subscriber::fmt::init();

    let served = Rc::new(RefCell::new(0.0f64));
    let refills = Rc::new(RefCell::new(0usize));

    let mut sim = Simulation::with_seed(42);
    let tank = sim.create_container(TANK_CAPACITY, INITIAL_LEVEL).unwrap();

    sim.create_process(tank_truck(tank, refills.clone()));
    for _ in 0..NUM_CARS {
        let arrival = sim
            .rand_exponential_span(Duration::seconds(MEAN_ARRIVAL))
            .unwrap();
        let liters = sim.rand_uniform(10.0, 40.0).unwrap();
        sim.create_process(car(tank, arrival, liters, served.clone()));
    }

    sim.run(EndCondition::NoEvents).unwrap();

    println!(
        "Fuel station closed after {:.0} minutes",
        sim.now_d() / 60.0
    );
    println!("{:.0} liters served to {} cars", served.borrow(), NUM_CARS);
    println!(
        "the truck came {} times; {:.0} liters remain",
        refills.borrow(),
        sim.level(tank)
    );
}
