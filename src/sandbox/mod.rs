// Copyright 2026 BadCompany
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Skill execution isolation.
//!
//! The supervisor owns a single worker process and a correlation table for
//! in-flight calls; the worker answers each inbound frame with exactly one
//! outbound line and runs skill entrypoints as child processes under egress
//! and command policy.

pub mod codec;
pub mod egress;
pub mod process;
pub mod supervisor;
pub mod worker;

pub use egress::EgressGuard;
pub use supervisor::SandboxSupervisor;
