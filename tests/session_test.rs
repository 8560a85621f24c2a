// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the modbus-acquisition project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! End-to-end tests of the acquisition pipeline with an in-memory device.

use approx::assert_relative_eq;
use async_trait::async_trait;
use modbus_acquisition::acquisition::{
    AcquisitionSession, Sample, SessionError, SessionEvent, SessionState, SinkError,
};
use modbus_acquisition::config::{Config, SerialConfig, SessionConfig};
use modbus_acquisition::modbus::{
    encode, LinkError, LinkState, ModbusLink, ReadRequest, RegisterBlock,
};
use modbus_acquisition::preprocessing::{PassThrough, StreamingFilter};
use std::collections::VecDeque;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::tempdir;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time;

const HEADER_ONLY: &str = "Signal;Noise;Filtered\n";

#[derive(Clone, Default)]
struct Counters {
    connects: Arc<AtomicUsize>,
    disconnects: Arc<AtomicUsize>,
    polls: Arc<AtomicUsize>,
}

impl Counters {
    fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    fn polls(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }
}

/// Device publishing a fixed image of its 10 input registers.
struct FakeLink {
    image: [u16; 10],
    delay: Duration,
    /// Errors returned by the next polls, in order
    scripted: VecDeque<LinkError>,
    disconnect_error: Option<LinkError>,
    connected: bool,
    counters: Counters,
}

impl FakeLink {
    fn new(signal: i16, noise: f32, counters: &Counters) -> Self {
        let mut image = [0u16; 10];
        image[5..8].copy_from_slice(&encode(signal, noise));
        Self {
            image,
            delay: Duration::ZERO,
            scripted: VecDeque::new(),
            disconnect_error: None,
            connected: false,
            counters: counters.clone(),
        }
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl ModbusLink for FakeLink {
    async fn connect(&mut self, _settings: &SerialConfig) -> Result<(), LinkError> {
        self.counters.connects.fetch_add(1, Ordering::SeqCst);
        self.connected = true;
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), LinkError> {
        self.counters.disconnects.fetch_add(1, Ordering::SeqCst);
        self.connected = false;
        match self.disconnect_error.clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn poll(&mut self, request: ReadRequest) -> Result<RegisterBlock, LinkError> {
        if !self.connected {
            return Err(LinkError::NotConnected);
        }
        self.counters.polls.fetch_add(1, Ordering::SeqCst);
        time::sleep(self.delay).await;
        if let Some(err) = self.scripted.pop_front() {
            return Err(err);
        }
        let start = request.start_address as usize;
        let end = (start + request.count as usize).min(self.image.len());
        Ok(RegisterBlock::new(
            request.start_address,
            self.image[start..end].to_vec(),
        ))
    }

    fn state(&self) -> LinkState {
        if self.connected {
            LinkState::Connected
        } else {
            LinkState::Disconnected
        }
    }
}

/// Filter returning the sum of every input since the last reset.
#[derive(Default)]
struct RunningSum {
    total: f32,
}

impl StreamingFilter for RunningSum {
    fn process(&mut self, input: f32) -> f32 {
        self.total += input;
        self.total
    }

    fn reset(&mut self) {
        self.total = 0.0;
    }
}

/// Pass-through filter recording the sample rates it is given.
#[derive(Clone, Default)]
struct RateLog {
    rates: Arc<Mutex<Vec<f32>>>,
}

impl RateLog {
    fn rates(&self) -> Vec<f32> {
        self.rates.lock().unwrap().clone()
    }
}

impl StreamingFilter for RateLog {
    fn process(&mut self, input: f32) -> f32 {
        input
    }

    fn reset(&mut self) {}

    fn set_sample_rate(&mut self, sample_rate: f32) {
        self.rates.lock().unwrap().push(sample_rate);
    }
}

fn session_config(output: &Path, start_address: u16, quantity: u16) -> SessionConfig {
    let mut config = Config::default();
    config.apply_args(
        Some("/dev/ttyFAKE".to_string()),
        None,
        None,
        Some(start_address),
        Some(quantity),
        Some(100),
        Some(output.to_string_lossy().into_owned()),
    );
    config.session_config()
}

async fn next_sample(events: &mut UnboundedReceiver<SessionEvent>) -> Sample {
    loop {
        match events.recv().await {
            Some(SessionEvent::Sample(sample)) => return sample,
            Some(_) => continue,
            None => panic!("session closed its event channel"),
        }
    }
}

async fn next_status(events: &mut UnboundedReceiver<SessionEvent>) -> String {
    loop {
        match events.recv().await {
            Some(SessionEvent::Status { message, .. }) => return message,
            Some(SessionEvent::Sample(sample)) => panic!("unexpected sample {:?}", sample),
            Some(_) => continue,
            None => panic!("session closed its event channel"),
        }
    }
}

fn drain(events: &mut UnboundedReceiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut drained = Vec::new();
    while let Ok(event) = events.try_recv() {
        drained.push(event);
    }
    drained
}

#[tokio::test(start_paused = true)]
async fn test_signal_and_noise_are_logged() {
    let dir = tempdir().unwrap();
    let output = dir.path().join("out.csv");
    let counters = Counters::default();

    let link = FakeLink::new(-7, 3.25, &counters);
    let (mut session, mut events) = AcquisitionSession::new(link, Box::new(PassThrough));
    session.start(session_config(&output, 0, 9)).await.unwrap();

    assert!(matches!(
        events.recv().await,
        Some(SessionEvent::Started { output: path }) if path == output
    ));
    for _ in 0..3 {
        let sample = next_sample(&mut events).await;
        assert_eq!(sample.signal, -7);
        assert_eq!(sample.noise, 3.25);
        assert_eq!(sample.filtered, -3.75);
    }

    session.stop().await.unwrap();
    assert_eq!(session.state(), SessionState::Idle);
    assert_eq!(counters.connects(), 1);
    assert_eq!(counters.disconnects(), 1);

    let content = fs::read_to_string(&output).unwrap();
    let mut lines = content.lines();
    assert_eq!(lines.next(), Some("Signal;Noise;Filtered"));
    let records: Vec<&str> = lines.collect();
    assert!(records.len() >= 3);
    assert!(records.iter().all(|line| *line == "-7;3.25;-3.75"));
}

#[tokio::test(start_paused = true)]
async fn test_window_without_measurement_writes_header_only() {
    let dir = tempdir().unwrap();
    let output = dir.path().join("out.csv");
    let counters = Counters::default();

    // start=5, quantity=0 reads register 5 alone, the noise words are missing
    let link = FakeLink::new(-7, 3.25, &counters);
    let (mut session, mut events) = AcquisitionSession::new(link, Box::new(PassThrough));
    session.start(session_config(&output, 5, 0)).await.unwrap();

    let message = next_status(&mut events).await;
    assert!(message.contains("Decode error"), "{}", message);
    assert_eq!(session.state(), SessionState::Running);

    session.stop().await.unwrap();
    assert_eq!(fs::read_to_string(&output).unwrap(), HEADER_ONLY);
}

#[tokio::test(start_paused = true)]
async fn test_stop_while_poll_in_flight() {
    let dir = tempdir().unwrap();
    let output = dir.path().join("out.csv");
    let counters = Counters::default();

    let link = FakeLink::new(12, 0.5, &counters).with_delay(Duration::from_millis(500));
    let (mut session, mut events) = AcquisitionSession::new(link, Box::new(PassThrough));
    session.start(session_config(&output, 0, 9)).await.unwrap();

    // First tick at 100 ms, its reply is due at 600 ms
    time::sleep(Duration::from_millis(150)).await;
    assert_eq!(counters.polls(), 1);

    session.stop().await.unwrap();
    assert_eq!(counters.polls(), 1);
    assert_eq!(counters.disconnects(), 1);
    assert_eq!(fs::read_to_string(&output).unwrap(), HEADER_ONLY);

    let drained = drain(&mut events);
    assert!(!drained
        .iter()
        .any(|event| matches!(event, SessionEvent::Sample(_))));
    assert!(matches!(drained.last(), Some(SessionEvent::Stopped { .. })));

    // Nothing happens after stop returned
    time::sleep(Duration::from_secs(2)).await;
    assert_eq!(counters.polls(), 1);
    assert_eq!(fs::read_to_string(&output).unwrap(), HEADER_ONLY);
}

#[tokio::test(start_paused = true)]
async fn test_link_errors_do_not_stop_the_session() {
    let dir = tempdir().unwrap();
    let output = dir.path().join("out.csv");
    let counters = Counters::default();

    let mut link = FakeLink::new(3, -1.5, &counters);
    link.scripted.push_back(LinkError::Timeout(Duration::from_secs(1)));
    link.scripted
        .push_back(LinkError::Exception("Illegal data address".to_string()));
    let (mut session, mut events) = AcquisitionSession::new(link, Box::new(PassThrough));
    session.start(session_config(&output, 0, 9)).await.unwrap();

    assert!(next_status(&mut events).await.contains("No response"));
    assert!(next_status(&mut events).await.contains("Illegal data address"));
    let sample = next_sample(&mut events).await;
    assert_eq!(sample.to_record(), "3;-1.5;1.5");

    session.stop().await.unwrap();
    let content = fs::read_to_string(&output).unwrap();
    assert!(content.starts_with("Signal;Noise;Filtered\n3;-1.5;1.5\n"));
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_failure_is_fatal() {
    let dir = tempdir().unwrap();
    let output = dir.path().join("out.csv");
    let counters = Counters::default();

    let mut link = FakeLink::new(1, 1.0, &counters);
    link.disconnect_error = Some(LinkError::Disconnect("port vanished".to_string()));
    let (mut session, mut events) = AcquisitionSession::new(link, Box::new(PassThrough));
    session.start(session_config(&output, 0, 9)).await.unwrap();
    next_sample(&mut events).await;

    let result = session.stop().await;
    assert!(matches!(
        result,
        Err(SessionError::FatalTeardown(LinkError::Disconnect(_)))
    ));
    assert!(result.unwrap_err().is_fatal());
    assert!(drain(&mut events)
        .iter()
        .any(|event| matches!(event, SessionEvent::Fatal { .. })));

    // The sink is closed all the same
    let content = fs::read_to_string(&output).unwrap();
    assert!(content.ends_with("1;1;2\n"));
}

#[tokio::test(start_paused = true)]
async fn test_restart_resets_filter_and_output() {
    let dir = tempdir().unwrap();
    let output = dir.path().join("out.csv");
    let counters = Counters::default();

    let link = FakeLink::new(-7, 3.25, &counters);
    let (mut session, mut events) =
        AcquisitionSession::new(link, Box::new(RunningSum::default()));
    session.start(session_config(&output, 0, 9)).await.unwrap();
    assert_eq!(next_sample(&mut events).await.filtered, -3.75);
    assert_eq!(next_sample(&mut events).await.filtered, -7.5);

    // Starting a running session restarts it
    session.start(session_config(&output, 0, 9)).await.unwrap();
    assert_eq!(counters.connects(), 2);
    assert_eq!(counters.disconnects(), 1);

    loop {
        if let Some(SessionEvent::Started { .. }) = events.recv().await {
            break;
        }
    }
    assert_eq!(next_sample(&mut events).await.filtered, -3.75);

    session.stop().await.unwrap();
    let content = fs::read_to_string(&output).unwrap();
    let mut lines = content.lines();
    assert_eq!(lines.next(), Some("Signal;Noise;Filtered"));
    assert_eq!(lines.next(), Some("-7;3.25;-3.75"));
}

#[tokio::test(start_paused = true)]
async fn test_slow_device_lowers_poll_rate() {
    let dir = tempdir().unwrap();
    let output = dir.path().join("out.csv");
    let counters = Counters::default();

    let link = FakeLink::new(2, 0.25, &counters).with_delay(Duration::from_millis(350));
    let (mut session, mut events) = AcquisitionSession::new(link, Box::new(PassThrough));
    session.start(session_config(&output, 0, 9)).await.unwrap();

    // 20 periods of 100 ms
    time::sleep(Duration::from_secs(2)).await;
    session.stop().await.unwrap();

    let stats = drain(&mut events)
        .into_iter()
        .find_map(|event| match event {
            SessionEvent::Stopped { stats } => Some(stats),
            _ => None,
        })
        .unwrap();
    assert!(stats.dispatched <= 20);
    assert!(stats.skipped > 0);
    assert_eq!(stats.dispatched as usize, counters.polls());

    let records = fs::read_to_string(&output).unwrap().lines().count() - 1;
    assert!(records as u64 <= stats.dispatched);
    assert!(records > 0);
}

#[tokio::test(start_paused = true)]
async fn test_set_poll_interval_while_running() {
    let dir = tempdir().unwrap();
    let output = dir.path().join("out.csv");
    let counters = Counters::default();

    let link = FakeLink::new(2, 0.25, &counters);
    let (mut session, _events) = AcquisitionSession::new(link, Box::new(PassThrough));
    session.start(session_config(&output, 0, 9)).await.unwrap();
    session.set_poll_interval(Duration::from_secs(1)).unwrap();

    // Ticks at 100 ms (already scheduled) then 1100 ms
    time::sleep(Duration::from_millis(2050)).await;
    let stats = session.stats().await.unwrap();
    assert_eq!(stats.dispatched, 2);
    assert_eq!(stats.skipped, 0);

    session.stop().await.unwrap();
    assert!(session.stats().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_dropping_the_session_releases_the_link() {
    let dir = tempdir().unwrap();
    let output = dir.path().join("out.csv");
    let counters = Counters::default();

    let link = FakeLink::new(2, 0.25, &counters);
    let (mut session, mut events) = AcquisitionSession::new(link, Box::new(PassThrough));
    session.start(session_config(&output, 0, 9)).await.unwrap();
    next_sample(&mut events).await;
    drop(session);

    loop {
        match events.recv().await {
            Some(SessionEvent::Stopped { .. }) => break,
            Some(_) => continue,
            None => panic!("Stopped event missing"),
        }
    }
    assert_eq!(counters.disconnects(), 1);
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_unwritable_output_aborts_start() {
    let counters = Counters::default();
    let link = FakeLink::new(2, 0.25, &counters);
    let (mut session, _events) = AcquisitionSession::new(link, Box::new(PassThrough));

    let result = session
        .start(session_config(Path::new("/dev/full"), 0, 9))
        .await;
    assert!(matches!(result, Err(SessionError::Sink(_))));
    assert_eq!(session.state(), SessionState::Idle);
    assert_eq!(counters.connects(), 1);
    assert_eq!(counters.disconnects(), 1);
    assert_eq!(counters.polls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_poll_interval_change_reaches_the_filter() {
    let dir = tempdir().unwrap();
    let output = dir.path().join("out.csv");
    let counters = Counters::default();
    let rate_log = RateLog::default();

    let link = FakeLink::new(2, 0.25, &counters);
    let (mut session, _events) = AcquisitionSession::new(link, Box::new(rate_log.clone()));
    session.start(session_config(&output, 0, 9)).await.unwrap();
    session.set_poll_interval(Duration::from_millis(250)).unwrap();
    // Commands are handled in order, the stats reply comes after the change
    session.stats().await.unwrap();

    let rates = rate_log.rates();
    assert_eq!(rates.len(), 2);
    assert_relative_eq!(rates[0], 10.0);
    assert_relative_eq!(rates[1], 4.0);
    session.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_stop_gives_up_on_a_link_ignoring_its_timeout() {
    let dir = tempdir().unwrap();
    let output = dir.path().join("out.csv");
    let counters = Counters::default();

    let link = FakeLink::new(1, 1.0, &counters).with_delay(Duration::from_secs(3600));
    let (mut session, mut events) = AcquisitionSession::new(link, Box::new(PassThrough));
    let mut config = session_config(&output, 0, 9);
    config.serial.timeout_ms = 200;
    session.start(config.clone()).await.unwrap();

    time::sleep(Duration::from_millis(150)).await;
    assert_eq!(counters.polls(), 1);

    let started = time::Instant::now();
    let result = session.stop().await;
    // Response timeout plus one second of grace
    assert!(started.elapsed() <= Duration::from_millis(1250));
    assert!(matches!(
        result,
        Err(SessionError::FatalTeardown(LinkError::Timeout(_)))
    ));
    assert!(drain(&mut events)
        .iter()
        .any(|event| matches!(event, SessionEvent::Fatal { .. })));
    assert_eq!(fs::read_to_string(&output).unwrap(), HEADER_ONLY);

    // The link went with the abandoned poll
    assert!(matches!(
        session.start(config).await,
        Err(SessionError::Unavailable)
    ));
}

/// Output that takes the header, then loses its reader.
#[cfg(target_os = "linux")]
fn closing_pipe(dir: &Path) -> (std::path::PathBuf, std::thread::JoinHandle<()>) {
    use std::io::Read;

    let path = dir.join("pipe");
    let status = std::process::Command::new("mkfifo")
        .arg(&path)
        .status()
        .unwrap();
    assert!(status.success());

    let reader_path = path.clone();
    let reader = std::thread::spawn(move || {
        let mut fifo = fs::File::open(&reader_path).unwrap();
        let mut header = [0u8; HEADER_ONLY.len()];
        fifo.read_exact(&mut header).unwrap();
        assert_eq!(&header[..], HEADER_ONLY.as_bytes());
    });
    (path, reader)
}

#[cfg(target_os = "linux")]
async fn events_until_stopped(events: &mut UnboundedReceiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut received = Vec::new();
    loop {
        match events.recv().await {
            Some(event) => {
                let stopped = matches!(event, SessionEvent::Stopped { .. });
                received.push(event);
                if stopped {
                    return received;
                }
            }
            None => panic!("session closed its event channel"),
        }
    }
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_write_failure_while_running_ends_the_session() {
    let dir = tempdir().unwrap();
    let counters = Counters::default();
    let (pipe, reader) = closing_pipe(dir.path());

    let link = FakeLink::new(-7, 3.25, &counters);
    let (mut session, mut events) = AcquisitionSession::new(link, Box::new(PassThrough));
    session.start(session_config(&pipe, 0, 9)).await.unwrap();
    tokio::task::spawn_blocking(move || reader.join().unwrap())
        .await
        .unwrap();

    let received = events_until_stopped(&mut events).await;
    let fatal = received
        .iter()
        .position(|event| matches!(event, SessionEvent::Fatal { .. }))
        .expect("Fatal event");
    assert_eq!(fatal, received.len() - 2);
    assert_eq!(counters.connects(), 1);
    assert_eq!(counters.disconnects(), 1);

    let result = session.stop().await;
    assert!(
        matches!(result, Err(SessionError::Sink(SinkError::Write { .. }))),
        "{:?}",
        result
    );
    assert!(result.unwrap_err().is_fatal());
    assert_eq!(session.state(), SessionState::Idle);
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_start_after_a_write_failure() {
    let dir = tempdir().unwrap();
    let counters = Counters::default();
    let (pipe, reader) = closing_pipe(dir.path());

    let link = FakeLink::new(-7, 3.25, &counters);
    let (mut session, mut events) = AcquisitionSession::new(link, Box::new(PassThrough));
    session.start(session_config(&pipe, 0, 9)).await.unwrap();
    tokio::task::spawn_blocking(move || reader.join().unwrap())
        .await
        .unwrap();

    // The session ends on its own, nobody calls stop
    events_until_stopped(&mut events).await;
    while session.state() == SessionState::Running {
        time::sleep(Duration::from_millis(1)).await;
    }

    let output = dir.path().join("out.csv");
    session.start(session_config(&output, 0, 9)).await.unwrap();
    assert_eq!(session.state(), SessionState::Running);
    assert_eq!(counters.connects(), 2);

    assert_eq!(next_sample(&mut events).await.to_record(), "-7;3.25;-3.75");
    session.stop().await.unwrap();
    assert_eq!(counters.disconnects(), 2);
}
