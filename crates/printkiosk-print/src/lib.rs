// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// printkiosk-print — Hand a finished PDF to the operating system's spooler.
//
// One backend is chosen at start-up: CUPS (`lp`/`lpstat`) on Linux and
// macOS, PowerShell on Windows, and a simulate backend everywhere else or
// when configured. The crate only confirms the spooler accepted the job;
// physical completion is not observable.

pub mod backend;
mod command;
pub mod cups;
pub mod simulate;
pub mod windows;

pub use backend::{DispatchRequest, JobHandle, PlatformBackend, PrintBackend};
pub use cups::CupsBackend;
pub use simulate::SimulatedBackend;
pub use windows::WindowsBackend;
