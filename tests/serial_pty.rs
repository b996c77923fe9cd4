//! SerialTransport against a pseudo-terminal pair
//!
//! The slave side stands in for the analyser's USB serial device; the test
//! drives the master side. A second handle on the slave observes the
//! terminal attributes.

#![cfg(target_os = "linux")]

use analyser_core::{ByteTransport, PortConfig, SerialFlowControl, SerialTransport, TransportError};
use nix::fcntl::OFlag;
use nix::pty::{grantpt, posix_openpt, ptsname_r, unlockpt, PtyMaster};
use nix::sys::termios::{tcgetattr, LocalFlags, SpecialCharacterIndices};
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::time::{Duration, Instant};

struct Pty {
    master: PtyMaster,
    path: String,
    witness: File,
}

fn open_pty() -> Pty {
    let master = posix_openpt(OFlag::O_RDWR | OFlag::O_NOCTTY).unwrap();
    grantpt(&master).unwrap();
    unlockpt(&master).unwrap();
    let path = ptsname_r(&master).unwrap();
    let witness = OpenOptions::new()
        .read(true)
        .write(true)
        .custom_flags(libc::O_NOCTTY)
        .open(&path)
        .unwrap();
    Pty {
        master,
        path,
        witness,
    }
}

fn port_config(pty: &Pty) -> PortConfig {
    PortConfig::new(&pty.path)
        .timeout_deciseconds(1)
        .flow_control(SerialFlowControl::None)
}

/// Wait for bytes written on the master to reach the slave's input queue
fn settle() {
    std::thread::sleep(Duration::from_millis(100));
}

#[test]
fn open_applies_raw_mode_and_close_restores() {
    let pty = open_pty();
    let before = tcgetattr(&pty.witness).unwrap();
    assert!(before.local_flags.contains(LocalFlags::ICANON));

    let mut transport = SerialTransport::open(&port_config(&pty)).unwrap();
    let raw = tcgetattr(&pty.witness).unwrap();
    assert!(!raw.local_flags.contains(LocalFlags::ICANON));
    assert!(!raw.local_flags.contains(LocalFlags::ECHO));
    assert_eq!(raw.control_chars[SpecialCharacterIndices::VMIN as usize], 0);
    assert_eq!(raw.control_chars[SpecialCharacterIndices::VTIME as usize], 1);

    transport.close().unwrap();
    let after = tcgetattr(&pty.witness).unwrap();
    assert_eq!(after.local_flags, before.local_flags);
    assert_eq!(after.input_flags, before.input_flags);
    assert_eq!(after.control_chars, before.control_chars);

    // Second close is a no-op
    transport.close().unwrap();
    assert!(!transport.is_open());
    assert!(matches!(
        transport.read_byte(),
        Err(TransportError::NotConnected)
    ));
}

#[test]
fn drop_restores_attributes() {
    let pty = open_pty();
    let before = tcgetattr(&pty.witness).unwrap();
    {
        let _transport = SerialTransport::open(&port_config(&pty)).unwrap();
    }
    let after = tcgetattr(&pty.witness).unwrap();
    assert_eq!(after.local_flags, before.local_flags);
}

#[test]
fn reads_bytes_then_times_out() {
    let mut pty = open_pty();
    let mut transport = SerialTransport::open(&port_config(&pty)).unwrap();

    pty.master.write_all(b"ok").unwrap();
    assert_eq!(transport.read_byte().unwrap(), b'o');
    assert_eq!(transport.read_byte().unwrap(), b'k');

    let started = Instant::now();
    assert!(matches!(transport.read_byte(), Err(TransportError::Timeout)));
    assert!(started.elapsed() >= Duration::from_millis(50));
}

#[test]
fn writes_reach_the_device() {
    let mut pty = open_pty();
    let mut transport = SerialTransport::open(&port_config(&pty)).unwrap();

    assert_eq!(transport.write_bytes(b"7000000A").unwrap(), 8);
    let mut buf = [0u8; 8];
    pty.master.read_exact(&mut buf).unwrap();
    assert_eq!(&buf, b"7000000A");
}

#[test]
fn probe_keeps_the_byte_it_sees() {
    let mut pty = open_pty();
    let mut transport = SerialTransport::open(&port_config(&pty)).unwrap();
    assert!(!transport.probe().unwrap());

    pty.master.write_all(b"x").unwrap();
    settle();
    assert!(transport.probe().unwrap());
    assert!(transport.probe().unwrap());
    assert_eq!(transport.read_byte().unwrap(), b'x');
    assert!(matches!(transport.read_byte(), Err(TransportError::Timeout)));
}

#[test]
fn flush_discards_pending_input() {
    let mut pty = open_pty();
    let mut transport = SerialTransport::open(&port_config(&pty)).unwrap();

    pty.master.write_all(b"7000000.00,0,1000,100.00,50.00\nEnd\n").unwrap();
    settle();
    assert!(transport.probe().unwrap());
    transport.flush_input().unwrap();
    assert!(matches!(transport.read_byte(), Err(TransportError::Timeout)));

    // Blocking reads still work after the flush
    pty.master.write_all(b"z").unwrap();
    assert_eq!(transport.read_byte().unwrap(), b'z');
}
