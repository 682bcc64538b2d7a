//! teleq Core - Domain logic for the offline telemetry queue
//!
//! This crate contains the hexagonal architecture core with:
//! - **Domain entities** - `EventRecord`, `EventInput`, `QueueStats`, `RetentionPolicy`
//! - **Mode classification** - `DeviceConditions` -> `TelemetryMode`
//! - **Port definitions** - Traits for adapters: `IEventQueue`, `IUploader`, `IDeviceSensor`
//! - **Configuration** - YAML-backed `Config` with validation and a builder
//!
//! # Architecture
//!
//! The domain module contains pure business logic with no I/O.
//! Ports define trait interfaces that adapter crates implement: the SQLite
//! store lives in `teleq-cache`, the flush pipeline in `teleq-flush`.

pub mod config;
pub mod domain;
pub mod ports;
