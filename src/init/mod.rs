// SPDX-License-Identifier: Apache-2.0

//! Process shell around the tailing core: flags, layered configuration and
//! task supervision.

pub mod agent;
pub mod args;
pub mod config;
pub mod wait;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;
