mod orchestrator;

pub use orchestrator::{ReconcileJob, WorkerOrchestrator};
