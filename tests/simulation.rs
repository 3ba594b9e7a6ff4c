use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use infection_sim::{SimulationConfig, SimulationEvent, Simulator};

const FAST: Duration = Duration::from_millis(10);

fn fast_sim(group_size: usize, factor: usize, seed: u64) -> Simulator {
    let config = SimulationConfig::new(group_size, factor, FAST)
        .expect("valid config")
        .with_seed(seed);
    Simulator::new(config).expect("simulator")
}

fn wait_until(timeout: Duration, mut done: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if done() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    done()
}

#[test]
fn manual_infection_spreads_to_everyone() {
    let sim = fast_sim(60, 3, 11);
    sim.set_items_per_row(7).unwrap();
    assert!(sim.infect_at(30).unwrap());
    assert!(sim.is_running());

    assert!(wait_until(Duration::from_secs(10), || {
        sim.statistics().healthy == 0
    }));
    let stats = sim.statistics();
    assert_eq!(stats.infected, 60);
    assert_eq!(stats.total(), 60);
}

#[test]
fn no_infections_after_stop() {
    let sim = fast_sim(400, 2, 12);
    sim.set_items_per_row(20).unwrap();
    sim.infect_at(0).unwrap();
    thread::sleep(FAST * 3);
    sim.stop();

    let before = sim.statistics();
    thread::sleep(FAST * 10);
    assert_eq!(sim.statistics(), before);
    assert!(!sim.is_running());
    // Stopping twice is harmless.
    sim.stop();
}

#[test]
fn ticks_without_layout_do_nothing() {
    let sim = fast_sim(16, 4, 13);
    sim.infect_at(5).unwrap();
    thread::sleep(FAST * 8);
    assert_eq!(sim.statistics().infected, 1);

    sim.set_items_per_row(4).unwrap();
    assert!(wait_until(Duration::from_secs(5), || {
        sim.statistics().infected > 1
    }));
}

#[test]
fn statistics_events_always_cover_the_whole_group() {
    let sim = fast_sim(50, 5, 14);
    let events = sim.subscribe();
    sim.set_items_per_row(10).unwrap();
    sim.infect_at(25).unwrap();

    let mut last_infected = 0;
    let mut seen = 0;
    let deadline = Instant::now() + Duration::from_secs(10);
    while seen < 5 && Instant::now() < deadline {
        if let Ok(SimulationEvent::StatisticsUpdated(stats)) =
            events.recv_timeout(Duration::from_millis(200))
        {
            assert_eq!(stats.healthy + stats.infected, 50);
            assert!(stats.infected >= 1);
            last_infected = last_infected.max(stats.infected);
            seen += 1;
        }
    }
    assert_eq!(seen, 5);
    assert!(last_infected >= 1);
}

#[test]
fn on_demand_statistics_are_published() {
    let sim = fast_sim(8, 1, 15);
    let events = sim.subscribe();
    sim.request_statistics();

    let stats = loop {
        match events.recv_timeout(Duration::from_secs(5)) {
            Ok(SimulationEvent::StatisticsUpdated(stats)) => break stats,
            Ok(_) => continue,
            Err(err) => panic!("no statistics published: {err}"),
        }
    };
    assert_eq!(stats.healthy, 8);
    assert_eq!(stats.infected, 0);
}

#[test]
fn running_state_changes_are_announced() {
    let sim = fast_sim(4, 1, 16);
    let events = sim.subscribe();
    sim.start().unwrap();
    sim.start_with_period(Duration::from_millis(20)).unwrap();
    sim.stop();

    let changes: Vec<bool> = events
        .try_iter()
        .filter_map(|event| match event {
            SimulationEvent::RunningChanged(running) => Some(running),
            _ => None,
        })
        .collect();
    assert_eq!(changes, vec![true, false]);
    assert_eq!(sim.period(), Duration::from_millis(20));
}

#[test]
fn concurrent_manual_infections_are_never_lost() {
    let sim = Arc::new(fast_sim(1000, 1, 17));
    sim.set_items_per_row(1000).unwrap();

    let handles: Vec<_> = (0..4)
        .map(|worker| {
            let sim = Arc::clone(&sim);
            thread::spawn(move || {
                (0..1000)
                    .filter(|i| i % 4 == worker)
                    .for_each(|i| {
                        sim.infect_at(i).unwrap();
                    });
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    sim.stop();
    let people = sim.people();
    assert!(people.iter().all(|p| p.is_infected()));
    assert_eq!(sim.statistics().infected, 1000);
}

#[test]
fn infection_never_reverts_while_running() {
    let sim = fast_sim(200, 4, 18);
    sim.set_items_per_row(13).unwrap();
    sim.infect_at(100).unwrap();

    let mut previous = sim.people();
    for _ in 0..20 {
        thread::sleep(FAST);
        let current = sim.people();
        for (before, after) in previous.iter().zip(&current) {
            assert_eq!(before.id(), after.id());
            assert!(!before.is_infected() || after.is_infected());
        }
        previous = current;
    }
}
