// Copyright 2025 tcpipc Authors
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

//! # tcpipc CLI
//!
//! Demo services and command-line front-ends for the tcpipc RPC system.
//!
//! ## Services
//!
//! - **Calculator**: integer arithmetic, the smallest useful contract
//! - **FileTransfer**: serves files out of one directory as bulk payloads
//!
//! ## Key Commands
//!
//! - `tcpipc serve-calculator`: host a calculator, optionally advertised
//! - `tcpipc add`: call a calculator, finding it through discovery if no
//!   address is given
//! - `tcpipc serve-files`: share a directory
//! - `tcpipc fetch`: download a file from a share with progress output
//! - `tcpipc advertise` / `tcpipc discover`: the discovery protocol on its own

pub mod services;

pub use services::{
    BasicCalculator, Calculator, CalculatorProxy, DirectoryShare, FileTransfer, FileTransferProxy,
};

/// Port the calculator service listens on by default.
pub const CALCULATOR_PORT: u16 = 62001;

/// Port the file transfer service listens on by default.
pub const FILE_TRANSFER_PORT: u16 = 63000;
