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

//! skillgate: supply-chain verification and execution isolation for skills.
//!
//! This library gates two trust boundaries. At install time it verifies a
//! skill bundle's provenance (policy, checksum, trust-anchor signature)
//! before placing it on disk. At execution time it runs skills inside a
//! supervised worker process under egress and command policy, with circuit
//! breaking for repeatedly failing skills.

pub mod config;
pub mod core;
pub mod install;
pub mod sandbox;
pub mod utils;
