#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rusqlite::Connection;
use svenn_batch::{BatchError, BatchProcessor};
use svenn_core::config::{SchedulerConfig, StoresConfig};
use svenn_core::UnitLocator;
use svenn_scheduler::{ExecutionRecord, NewScript, NewWarehouse, Scheduler};
use svenn_store::StoreError;
use svenn_units::{BatchUnit, ProcessingUnit, UnitContext, UnitError, UnitRegistry};

pub struct Counting(Arc<AtomicUsize>);

impl ProcessingUnit for Counting {
    fn run(&mut self) -> svenn_core::Result<()> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub struct Slow(Duration);

impl ProcessingUnit for Slow {
    fn run(&mut self) -> svenn_core::Result<()> {
        std::thread::sleep(self.0);
        Ok(())
    }
}

pub struct Panics;

impl ProcessingUnit for Panics {
    fn run(&mut self) -> svenn_core::Result<()> {
        panic!("unit exploded");
    }
}

/// A, B, C where B is a bad record.
pub struct Letters;

impl BatchProcessor for Letters {
    type Record = &'static str;

    fn name(&self) -> &str {
        "test/letters"
    }

    fn fetch_candidates(&mut self) -> svenn_batch::Result<Vec<&'static str>> {
        Ok(vec!["A", "B", "C"])
    }

    fn process_one(&mut self, record: &&'static str) -> svenn_batch::Result<()> {
        if *record == "B" {
            return Err(BatchError::record("bad record"));
        }
        Ok(())
    }
}

pub struct FetchFails;

impl BatchProcessor for FetchFails {
    type Record = ();

    fn name(&self) -> &str {
        "test/fetch_fails"
    }

    fn fetch_candidates(&mut self) -> svenn_batch::Result<Vec<()>> {
        Err(BatchError::fatal("source store unreachable"))
    }

    fn process_one(&mut self, _record: &()) -> svenn_batch::Result<()> {
        Ok(())
    }
}

pub struct Harness {
    pub scheduler: Arc<Scheduler>,
    pub runs: Arc<AtomicUsize>,
    pub warehouse_id: i64,
}

pub fn registry(runs: Arc<AtomicUsize>) -> UnitRegistry {
    let mut units = UnitRegistry::new();
    units.register(UnitLocator::new("test", "ok"), move |_ctx| {
        Ok(Box::new(Counting(Arc::clone(&runs))))
    });
    units.register(UnitLocator::new("test", "slow"), |_ctx| {
        Ok(Box::new(Slow(Duration::from_millis(300))))
    });
    units.register(UnitLocator::new("test", "panics"), |_ctx| Ok(Box::new(Panics)));
    units.register(UnitLocator::new("test", "letters"), |_ctx| {
        Ok(Box::new(BatchUnit::new(Letters)))
    });
    units.register(UnitLocator::new("test", "fetch_fails"), |_ctx| {
        Ok(Box::new(BatchUnit::new(FetchFails)))
    });
    units.register(UnitLocator::new("test", "broken"), |_ctx| {
        Err(UnitError::Store(StoreError::UnknownStore("raw_data".into())))
    });
    units
}

pub fn harness_with(config: SchedulerConfig) -> Harness {
    let runs = Arc::new(AtomicUsize::new(0));
    let scheduler = Scheduler::new(
        Connection::open_in_memory().unwrap(),
        registry(Arc::clone(&runs)),
        UnitContext::new(StoresConfig::new()),
        config,
    )
    .unwrap();
    let warehouse_id = scheduler
        .create_warehouse(&NewWarehouse {
            name: "test".into(),
            description: None,
        })
        .unwrap()
        .id;
    Harness {
        scheduler,
        runs,
        warehouse_id,
    }
}

pub fn harness() -> Harness {
    harness_with(SchedulerConfig::default())
}

impl Harness {
    /// A script bound to `test/<unit>`.
    pub fn script(&self, unit: &str) -> i64 {
        self.scheduler
            .create_script(
                self.warehouse_id,
                &NewScript {
                    name: format!("{unit} script"),
                    locator: format!("test/{unit}"),
                    description: None,
                },
            )
            .unwrap()
            .id
    }

    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

/// Poll until `job_id` has at least `n` execution records, all terminal.
pub async fn wait_for_runs(scheduler: &Scheduler, job_id: i64, n: usize) -> Vec<ExecutionRecord> {
    for _ in 0..200 {
        let records = scheduler.executions_for(job_id).unwrap();
        if records.len() >= n && records.iter().all(|r| r.status.is_terminal()) {
            return records;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("job {job_id} did not reach {n} finished run(s) in time");
}
