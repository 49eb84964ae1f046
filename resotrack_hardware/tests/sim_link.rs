use std::time::Duration;

use resotrack_hardware::{Injection, Resonance, STRAY_BYTE, SimulatedLink};
use resotrack_traits::Link;
use resotrack_traits::wire::{self, Ack, Command, FRAME_LEN, FailCode, Frame};
use rstest::rstest;

const T: Duration = Duration::from_millis(10);

fn send(link: &mut SimulatedLink, cmd: Command, payload: u32) {
    link.write_all(&Frame::command(cmd, payload).encode(), T)
        .unwrap();
}

fn recv(link: &mut SimulatedLink) -> Frame {
    let mut buf = [0u8; FRAME_LEN];
    link.read_exact(&mut buf, T).unwrap();
    Frame::decode(&buf)
}

fn configured(points: u32) -> SimulatedLink {
    let mut link = SimulatedLink::new(Resonance::default());
    link.open().unwrap();
    send(&mut link, Command::SendStartFtw, wire::mhz_to_ftw(110.0));
    send(&mut link, Command::SendStopFtw, wire::mhz_to_ftw(130.0));
    send(&mut link, Command::SendNumPts, points);
    for _ in 0..3 {
        assert_eq!(recv(&mut link).code, Ack::Ok.code());
    }
    link
}

#[rstest]
fn sweep_streams_data_then_ok() {
    let mut link = configured(100);
    let handle = link.handle();
    handle.set_chunk_samples(32);
    handle.set_resonance(Resonance {
        width_mhz: 0.5,
        ..Resonance::default()
    });
    send(&mut link, Command::StartTest, 0);

    let mut volts = Vec::new();
    loop {
        let f = recv(&mut link);
        match Ack::from_code(f.code) {
            Some(Ack::SendData) => {
                let mut data = vec![0u8; f.payload as usize];
                link.read_exact(&mut data, T).unwrap();
                volts.extend(wire::decode_samples(&data));
            }
            Some(Ack::Ok) => break,
            other => panic!("unexpected ack {other:?}"),
        }
    }
    assert_eq!(volts.len(), 100);
    // peak at 120 MHz is sample 50
    let (imax, _) = volts
        .iter()
        .enumerate()
        .fold((0, f64::MIN), |acc, (i, v)| if *v > acc.1 { (i, *v) } else { acc });
    assert_eq!(imax, 50);
    assert_eq!(handle.sweeps(), 1);
}

#[rstest]
#[case(Injection::Fail(FailCode::RegulatorsNotReady))]
#[case(Injection::Fail(FailCode::DdsConfigError))]
fn injected_failures_answer_with_fail_code(#[case] inj: Injection) {
    let mut link = configured(10);
    link.handle().inject(Command::StartTest, inj);
    send(&mut link, Command::StartTest, 0);
    let f = recv(&mut link);
    assert_eq!(f.code, Ack::Fail.code());
    let Injection::Fail(code) = inj else { unreachable!() };
    assert_eq!(f.payload, code.payload());
}

#[rstest]
fn dropped_command_times_out() {
    let mut link = configured(10);
    link.handle().inject(Command::Handshake, Injection::Drop);
    send(&mut link, Command::Handshake, 7);
    let mut buf = [0u8; FRAME_LEN];
    let err = link.read_exact(&mut buf, T).expect_err("no response expected");
    assert!(err.to_string().contains("timeout"));
}

#[rstest]
fn disconnect_closes_link_until_reopened() {
    let mut link = configured(10);
    let handle = link.handle();
    handle.inject(Command::StartTest, Injection::Disconnect);
    send(&mut link, Command::StartTest, 0);
    assert!(!link.is_open());
    link.open().unwrap();
    assert_eq!(handle.opens(), 2);
}

#[rstest]
fn sleeping_device_refuses_to_sweep() {
    let mut link = configured(10);
    send(&mut link, Command::SystemSleep, 0);
    assert_eq!(recv(&mut link).code, Ack::Ok.code());
    send(&mut link, Command::StartTest, 0);
    let f = recv(&mut link);
    assert_eq!(f.code, Ack::Fail.code());
    assert_eq!(f.payload, FailCode::RegulatorsNotReady.payload());
}

#[rstest]
fn refused_open_reports_error() {
    let mut link = SimulatedLink::default();
    link.handle().refuse_opens(1);
    assert!(link.open().is_err());
    assert!(link.open().is_ok());
}

#[rstest]
fn stray_byte_precedes_the_reply() {
    let mut link = configured(10);
    link.handle().inject(Command::GetVersion, Injection::StrayByte);
    send(&mut link, Command::GetVersion, 0);
    let mut buf = [0u8; FRAME_LEN + 1];
    link.read_exact(&mut buf, T).unwrap();
    assert_eq!(buf[0], STRAY_BYTE);
    assert_eq!(&buf[1..5], b"OKAY");
}
