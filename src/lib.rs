//! Host reachability monitor built around a reactive host-state repository
//!
//! All host state lives in one [`repository::HostRepository`]. Every
//! successful command publishes a [`events::ChangeEvent`] on the
//! [`channel::EventChannel`], and independent actors (see [`actors`]) keep the
//! view, the dashboard counters, the snapshot file and the probe target list
//! in sync with it.

pub mod actors;
pub mod app;
pub mod channel;
pub mod coalesce;
pub mod config;
pub mod events;
pub mod host;
pub mod monitors;
pub mod repository;
pub mod stats;
pub mod storage;
pub mod util;
