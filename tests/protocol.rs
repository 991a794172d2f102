//! Dual-clock protocol tests for the write and read transfers.
//!
//! Every step of the simulated collaborators takes a distinct, known time, so
//! the measured windows show exactly which steps each stopwatch covered.


use std::path::Path;

use p2pbench::ErrorKind;
use p2pbench::storage::{Access, Storage};
use p2pbench::transfer::{Direction, Observer, read_transfer, throughput_mbps, transfer, write_transfer};

use test_utils::{Event, Outcome, Sim};

const LEN: usize = 4096;

// ---- write ----

#[test]
fn test_write_device_window_starts_after_sync() {
    let sim = Sim::new();
    let mut device = sim.device(LEN);
    device.to_device_cost = 500;
    let mut storage = sim.storage();
    storage.write_cost = 1000;

    let mut handle = storage.open(Path::new("/sim"), Access::Write).unwrap();
    let r = write_transfer(&mut handle, &mut device, LEN, &sim.clock).unwrap();

    assert_eq!(r.direction, Direction::Write);
    assert_eq!(r.device_micros, 1000);
    assert_eq!(r.host_micros, 1500);
    assert_eq!(r.mbps(Observer::Device), throughput_mbps(LEN, 1000));
    assert_eq!(r.mbps(Observer::Host), throughput_mbps(LEN, 1500));
    assert!(r.device_mbps > r.host_mbps);
}

#[test]
fn test_write_step_order() {
    let sim = Sim::new();
    let mut device = sim.device(LEN);
    device.to_device_cost = 500;
    let mut storage = sim.storage();
    storage.write_cost = 1000;

    let mut handle = storage.open(Path::new("/sim"), Access::Write).unwrap();
    write_transfer(&mut handle, &mut device, LEN, &sim.clock).unwrap();
    drop(handle);

    assert_eq!(
        sim.events(),
        vec![
            Event::Open(Access::Write),
            Event::SyncToDevice { at: 0 },
            Event::Write { at: 500 },
            Event::Close(Access::Write),
        ]
    );
    assert_eq!(sim.now(), 1500);
}

#[test]
fn test_write_failure_is_measured() {
    let sim = Sim::new();
    let mut device = sim.device(LEN);
    let mut storage = sim.storage();
    storage.write_cost = 250;
    storage.write_outcome = Outcome::Fail;

    let mut handle = storage.open(Path::new("/sim"), Access::Write).unwrap();
    let r = write_transfer(&mut handle, &mut device, LEN, &sim.clock).unwrap();
    assert_eq!(r.device_micros, 250);
    assert!(r.device_mbps.is_finite());
}

#[test]
fn test_short_write_is_measured() {
    let sim = Sim::new();
    let mut device = sim.device(LEN);
    let mut storage = sim.storage();
    storage.write_cost = 100;
    storage.write_outcome = Outcome::Short(512);

    let mut handle = storage.open(Path::new("/sim"), Access::Write).unwrap();
    let r = write_transfer(&mut handle, &mut device, LEN, &sim.clock).unwrap();
    // Throughput is computed from the requested size.
    assert_eq!(r.bytes, LEN);
    assert_eq!(r.device_mbps, throughput_mbps(LEN, 100));
}

#[test]
fn test_write_sync_failure_is_fatal() {
    let sim = Sim::new();
    let mut device = sim.device(LEN);
    device.fail_sync = true;
    let mut storage = sim.storage();

    let mut handle = storage.open(Path::new("/sim"), Access::Write).unwrap();
    let err = write_transfer(&mut handle, &mut device, LEN, &sim.clock).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DeviceError);
    assert_eq!(err.operation(), "write_transfer");
    // The storage write never happened.
    assert!(!sim.events().iter().any(|e| matches!(e, Event::Write { .. })));
}

// ---- read ----

#[test]
fn test_read_device_window_excludes_sync() {
    let sim = Sim::new();
    let mut device = sim.device(LEN);
    device.from_device_cost = 400;
    let mut storage = sim.storage();
    storage.read_cost = 800;

    let mut handle = storage.open(Path::new("/sim"), Access::Read).unwrap();
    let r = read_transfer(&mut handle, &mut device, LEN, &sim.clock).unwrap();

    assert_eq!(r.direction, Direction::Read);
    assert_eq!(r.device_micros, 800);
    assert_eq!(r.host_micros, 1200);
}

#[test]
fn test_read_step_order() {
    let sim = Sim::new();
    sim.clock.advance(10_000);
    let mut device = sim.device(LEN);
    device.from_device_cost = 400;
    let mut storage = sim.storage();
    storage.read_cost = 800;

    let mut handle = storage.open(Path::new("/sim"), Access::Read).unwrap();
    read_transfer(&mut handle, &mut device, LEN, &sim.clock).unwrap();
    drop(handle);

    assert_eq!(
        sim.events(),
        vec![
            Event::Open(Access::Read),
            Event::Read { at: 10_000 },
            Event::SyncFromDevice { at: 10_800 },
            Event::Close(Access::Read),
        ]
    );
}

#[test]
fn test_read_error_is_fatal() {
    let sim = Sim::new();
    let mut device = sim.device(LEN);
    let mut storage = sim.storage();
    storage.read_outcome = Outcome::Fail;

    let mut handle = storage.open(Path::new("/sim"), Access::Read).unwrap();
    let err = read_transfer(&mut handle, &mut device, LEN, &sim.clock).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ReadFailed);
    assert_eq!(err.to_string().matches("Input/output error").count(), 1);
    // No sync after a failed read.
    assert!(
        !sim.events()
            .iter()
            .any(|e| matches!(e, Event::SyncFromDevice { .. }))
    );
}

#[test]
fn test_read_no_data_is_fatal() {
    let sim = Sim::new();
    let mut device = sim.device(LEN);
    let mut storage = sim.storage();
    storage.read_outcome = Outcome::Short(0);

    let mut handle = storage.open(Path::new("/sim"), Access::Read).unwrap();
    let err = transfer(Direction::Read, &mut handle, &mut device, LEN, &sim.clock).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ReadFailed);
}

#[test]
fn test_short_read_is_measured() {
    let sim = Sim::new();
    let mut device = sim.device(LEN);
    let mut storage = sim.storage();
    storage.read_cost = 64;
    storage.read_outcome = Outcome::Short(1024);

    let mut handle = storage.open(Path::new("/sim"), Access::Read).unwrap();
    let r = read_transfer(&mut handle, &mut device, LEN, &sim.clock).unwrap();
    assert_eq!(r.device_micros, 64);
}

#[test]
fn test_read_sync_failure_is_fatal() {
    let sim = Sim::new();
    let mut device = sim.device(LEN);
    device.fail_sync = true;
    let mut storage = sim.storage();

    let mut handle = storage.open(Path::new("/sim"), Access::Read).unwrap();
    let err = read_transfer(&mut handle, &mut device, LEN, &sim.clock).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DeviceError);
}

// ---- throughput ----

#[test]
fn test_one_mebibyte_per_second() {
    assert_eq!(throughput_mbps(1_048_576, 1_000_000), 1.0);
}

#[test]
fn test_instant_transfer_stays_finite() {
    let sim = Sim::new();
    let mut device = sim.device(LEN);
    let mut storage = sim.storage();

    let mut handle = storage.open(Path::new("/sim"), Access::Write).unwrap();
    let r = write_transfer(&mut handle, &mut device, LEN, &sim.clock).unwrap();
    assert_eq!(r.device_micros, 0);
    assert!(r.device_mbps.is_finite());
    assert!(r.host_mbps.is_finite());
}
