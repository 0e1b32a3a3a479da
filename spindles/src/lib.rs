// Copyright 2026 The Spindles Project
// SPDX-License-Identifier: Apache-2.0

pub mod activity;
pub mod config;
pub mod hub;
pub mod journal;
pub mod proxy;
pub mod session;
pub mod stream;
pub mod tap;
pub mod upstream;
pub mod ws;
