//! End-to-end session tests over in-process transports

use analyser_core::core::simulator::{IDENTITY, OSCILLOSCOPE_SAMPLES};
use analyser_core::{
    AcquisitionState, CancellationToken, Detector, OscilloscopeConfig, OscilloscopeRecord,
    OscilloscopeSession, Outcome, PlotFileRecorder, ScanConfig, ScanRecord, ScanSession,
    ScriptedTransport, SimulatedAnalyser,
};

fn analyser_script() -> ScriptedTransport {
    ScriptedTransport::new()
        .reply("q", "K6BEZ Antenna Analyser\nversion 2\n")
        .reply(
            "s",
            "7000000.00,0,1000,100.00,50.00\n7100000.00,0,1100,110.00,55.00\nEnd\n",
        )
}

#[test]
fn scan_yields_one_record_per_data_line() {
    let transport = analyser_script();
    let journal = transport.journal();
    let config = ScanConfig::new(7_000_000, 7_100_000).steps(1);

    let mut records: Vec<ScanRecord> = Vec::new();
    let summary = ScanSession::new(transport, config, CancellationToken::new())
        .run(&mut records)
        .unwrap();

    assert_eq!(summary.outcome, Outcome::Completed);
    assert_eq!(
        records,
        vec![
            ScanRecord {
                freq_mhz: 7.0,
                vswr: 1.0
            },
            ScanRecord {
                freq_mhz: 7.1,
                vswr: 1.1
            },
        ]
    );
    assert_eq!(
        summary.states,
        vec![
            AcquisitionState::Init,
            AcquisitionState::Handshaking,
            AcquisitionState::Configuring,
            AcquisitionState::Acquiring,
            AcquisitionState::Closed,
        ]
    );
    assert_eq!(journal.sent(), vec!["q", "7000000A", "7100000B", "1N", "10D", "s"]);
    assert_eq!(journal.flush_count(), 0);
}

#[test]
fn cancelled_scan_aborts_flushes_and_closes() {
    let token = CancellationToken::new();
    let ident_len = "K6BEZ Antenna Analyser\nversion 2\n".len();
    // Token is set part way through the first data line
    let transport = analyser_script().cancel_after_bytes(ident_len + 5, token.clone());
    let journal = transport.journal();

    let mut records: Vec<ScanRecord> = Vec::new();
    let summary = ScanSession::new(transport, ScanConfig::new(7_000_000, 7_100_000), token)
        .run(&mut records)
        .unwrap();

    assert_eq!(summary.outcome, Outcome::Cancelled);
    assert_eq!(records.len(), 1);
    assert_eq!(journal.sent().last().map(String::as_str), Some("z"));
    assert_eq!(journal.flush_count(), 1);
    assert!(journal.discarded_bytes() > 0);
    assert_eq!(journal.close_count(), 1);
    assert_eq!(
        &summary.states[summary.states.len() - 2..],
        &[AcquisitionState::Draining, AcquisitionState::Closed]
    );
}

#[test]
fn cancelled_before_acquiring_still_sends_abort() {
    let token = CancellationToken::new();
    token.cancel();
    let transport = analyser_script();
    let journal = transport.journal();

    let mut records: Vec<ScanRecord> = Vec::new();
    let summary = ScanSession::new(transport, ScanConfig::new(7_000_000, 7_100_000), token)
        .run(&mut records)
        .unwrap();

    assert_eq!(summary.outcome, Outcome::Cancelled);
    assert!(records.is_empty());
    assert_eq!(journal.sent().last().map(String::as_str), Some("z"));
}

#[test]
fn simulated_scan_writes_plot_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("scan.dat");
    let mut recorder = PlotFileRecorder::create(&path).unwrap();

    let config = ScanConfig::new(7_000_000, 7_200_000).steps(4);
    let summary = ScanSession::new(SimulatedAnalyser::new(), config, CancellationToken::new())
        .run(&mut recorder)
        .unwrap();

    assert_eq!(summary.identity, IDENTITY);
    assert_eq!(summary.records, 5);
    let text = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 5);
    assert_eq!(lines[0], "7.000000 3.000000");
    assert_eq!(lines[2], "7.100000 1.000000");
    assert_eq!(lines[4], "7.200000 3.000000");
}

#[test]
fn simulated_oscilloscope_reads_selected_detector() {
    let config = OscilloscopeConfig::new(Detector::Reverse).freq_hz(14_000_000);
    let mut records: Vec<OscilloscopeRecord> = Vec::new();
    let summary = OscilloscopeSession::new(SimulatedAnalyser::new(), config, CancellationToken::new())
        .run(&mut records)
        .unwrap();

    assert_eq!(summary.outcome, Outcome::Completed);
    assert_eq!(records.len(), OSCILLOSCOPE_SAMPLES);
    assert!(records.iter().all(|r| (140..=160).contains(&r.voltage_raw)));
    assert_eq!(records[3].sample_index, 3);
}
