//! Iteration driving, portfolio coordination, and the machine harness
//! for the tangle systematic-testing engine.

pub mod driver;
pub mod harness;
pub mod portfolio;
pub mod programs;
pub mod report;

pub use driver::IterationDriver;
pub use harness::{Event, MachineCtx, MachineDef, MachineHarness, MonitorDef, Program};
pub use portfolio::PortfolioCoordinator;
pub use report::{RunResult, TestReport};
