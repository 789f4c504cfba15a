//! Operation counts and timings, gathered when `-d stats` is enabled.
//! The sink is injected where it's needed; when absent, everything is a
//! no-op.

use std::cell::RefCell;
use std::time::{Duration, Instant};

struct Metric {
    name: &'static str,
    count: usize,
    total: Duration,
}

pub struct Metrics {
    metrics: RefCell<Vec<Metric>>,
}

impl Metrics {
    pub fn new() -> Metrics {
        Metrics {
            metrics: RefCell::new(Vec::new()),
        }
    }

    pub fn add(&self, name: &'static str, elapsed: Duration) {
        let mut metrics = self.metrics.borrow_mut();
        match metrics.iter_mut().find(|m| m.name == name) {
            Some(metric) => {
                metric.count += 1;
                metric.total += elapsed;
            }
            None => metrics.push(Metric {
                name,
                count: 1,
                total: elapsed,
            }),
        }
    }

    pub fn report(&self) {
        let metrics = self.metrics.borrow();
        println!("{:<16} {:>8} {:>12} {:>12}", "metric", "count", "avg (us)", "total (ms)");
        for metric in metrics.iter() {
            let avg_us = metric.total.as_micros() / metric.count.max(1) as u128;
            println!(
                "{:<16} {:>8} {:>12} {:>12.3}",
                metric.name,
                metric.count,
                avg_us,
                metric.total.as_secs_f64() * 1000.0
            );
        }
    }
}

/// Time `f`, charging it to `name` when a sink is present.
pub fn scope<T>(metrics: Option<&Metrics>, name: &'static str, f: impl FnOnce() -> T) -> T {
    match metrics {
        None => f(),
        Some(metrics) => {
            let start = Instant::now();
            let result = f();
            metrics.add(name, start.elapsed());
            result
        }
    }
}
