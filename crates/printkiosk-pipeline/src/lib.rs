// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// printkiosk-pipeline — From submission to a terminal job status.
//
// The orchestrator drives each job through intake validation, conversion,
// merge and dispatch. The state machine is the only writer of job status:
// it persists every transition to the job store before announcing it on
// the status broadcaster.

pub mod broadcast;
pub mod directory;
pub mod intake;
pub mod orchestrator;
pub mod scratch;
pub mod state;
pub mod store;

pub use broadcast::{StatusBroadcaster, StatusEvent, SubscriberId, Subscription};
pub use directory::{PrinterDirectory, StaticDirectory};
pub use orchestrator::Orchestrator;
pub use state::JobStateMachine;
pub use store::{JobStore, MemoryJobStore, SqliteJobStore, StatusChange};
