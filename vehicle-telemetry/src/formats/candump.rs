//! candump log format (`candump -l`)
//!
//! One frame per line:
//!
//! ```text
//! (1436509052.249713) can0 100#04D2
//! (1436509052.299802) can0 18FF0102#44
//! ```
//!
//! Three-digit identifiers are standard, eight-digit ones extended. Remote
//! frames (`123#R`) and CAN-FD frames (`123##1...`) are not carried by this bus
//! and are reported as invalid lines.

use crate::acquisition::{ChannelOpener, FrameSource};
use crate::types::{RawFrame, Result, TelemetryError};
use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

/// One parsed log line
#[derive(Debug, Clone, PartialEq)]
pub struct CandumpRecord {
    /// Seconds since the epoch, as logged
    pub log_time: f64,
    pub interface: String,
    pub can_id: u32,
    pub data: Vec<u8>,
}

/// Parse one line; blank lines and `#` comments yield `None`
pub fn parse_line(line: &str) -> Result<Option<CandumpRecord>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let mut parts = line.split_whitespace();
    let (Some(time), Some(interface), Some(frame)) = (parts.next(), parts.next(), parts.next()) else {
        return Err(invalid_line(line, "expected '(time) interface id#data'"));
    };

    let log_time = time
        .strip_prefix('(')
        .and_then(|t| t.strip_suffix(')'))
        .and_then(|t| t.parse::<f64>().ok())
        .filter(|t| t.is_finite() && *t >= 0.0)
        .ok_or_else(|| invalid_line(line, "bad timestamp"))?;

    let (id_text, data_text) = frame
        .split_once('#')
        .ok_or_else(|| invalid_line(line, "missing '#'"))?;

    if data_text.starts_with('#') {
        return Err(invalid_line(line, "CAN-FD frames are not supported"));
    }
    if data_text.starts_with('R') {
        return Err(invalid_line(line, "remote frames are not supported"));
    }

    if id_text.is_empty() || !id_text.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(invalid_line(line, "bad identifier"));
    }
    let can_id = u32::from_str_radix(id_text, 16)
        .map_err(|_| invalid_line(line, "bad identifier"))?;
    let data = parse_hex(data_text).ok_or_else(|| invalid_line(line, "bad payload"))?;

    Ok(Some(CandumpRecord {
        log_time,
        interface: interface.to_string(),
        can_id,
        data,
    }))
}

fn parse_hex(text: &str) -> Option<Vec<u8>> {
    // Some tools separate bytes with dots
    let digits: String = text.chars().filter(|c| *c != '.').collect();
    if !digits.chars().all(|c| c.is_ascii_hexdigit()) || digits.len() % 2 != 0 {
        return None;
    }
    (0..digits.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&digits[i..i + 2], 16).ok())
        .collect()
}

/// `anchor` shifted by a logged offset; earlier-than-first lines clamp to zero
fn offset_from(anchor: Instant, seconds: f64) -> Option<Instant> {
    let offset = Duration::try_from_secs_f64(seconds.max(0.0)).ok()?;
    anchor.checked_add(offset)
}

fn invalid_line(line: &str, reason: &str) -> TelemetryError {
    TelemetryError::InvalidFrame(format!("{}: {:?}", reason, line))
}

/// Offline parser: candump file → iterator of frames
pub struct CandumpParser;

impl CandumpParser {
    /// Open a log file. Frame timestamps keep the logged spacing, anchored at
    /// the moment of parsing.
    pub fn parse(path: &Path) -> Result<CandumpFrameIterator> {
        log::info!("Parsing candump log: {:?}", path);

        let file = File::open(path)?;
        Ok(CandumpFrameIterator {
            lines: BufReader::new(file).lines(),
            anchor: Instant::now(),
            first_log_time: None,
        })
    }
}

/// Iterator over frames in a candump log
pub struct CandumpFrameIterator {
    lines: Lines<BufReader<File>>,
    anchor: Instant,
    first_log_time: Option<f64>,
}

impl CandumpFrameIterator {
    fn to_frame(&mut self, record: CandumpRecord) -> Result<RawFrame> {
        let first = *self.first_log_time.get_or_insert(record.log_time);
        let timestamp = offset_from(self.anchor, record.log_time - first).ok_or_else(|| {
            TelemetryError::InvalidFrame(format!("log time {} out of range", record.log_time))
        })?;
        RawFrame::new(record.can_id, record.data, timestamp)
    }
}

impl Iterator for CandumpFrameIterator {
    type Item = Result<RawFrame>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e) => return Some(Err(e.into())),
            };
            match parse_line(&line) {
                Ok(Some(record)) => return Some(self.to_frame(record)),
                Ok(None) => continue,
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

/// Replays a candump log as if it were a live bus
///
/// In realtime mode frames are released with their logged spacing; otherwise
/// as fast as they are read. At end of file the bus goes silent.
pub struct CandumpReplay {
    lines: Lines<BufReader<File>>,
    realtime: bool,
    started: Instant,
    first_log_time: Option<f64>,
    pending: Option<CandumpRecord>,
    exhausted: bool,
}

impl CandumpReplay {
    pub fn open(path: &Path, realtime: bool) -> Result<Self> {
        let file = File::open(path)?;
        log::info!("Replaying candump log {:?} (realtime: {})", path, realtime);
        Ok(Self {
            lines: BufReader::new(file).lines(),
            realtime,
            started: Instant::now(),
            first_log_time: None,
            pending: None,
            exhausted: false,
        })
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted && self.pending.is_none()
    }

    fn next_record(&mut self) -> Result<Option<CandumpRecord>> {
        while !self.exhausted {
            match self.lines.next() {
                Some(line) => {
                    if let Some(record) = parse_line(&line?)? {
                        return Ok(Some(record));
                    }
                }
                None => {
                    log::info!("Replay reached end of log");
                    self.exhausted = true;
                }
            }
        }
        Ok(None)
    }
}

impl FrameSource for CandumpReplay {
    fn recv(&mut self, timeout: Duration) -> Result<Option<RawFrame>> {
        if self.pending.is_none() {
            match self.next_record() {
                Ok(record) => self.pending = record,
                Err(e) => return Err(TelemetryError::ReadFailure(e.to_string())),
            }
        }

        let Some(record) = self.pending.as_ref() else {
            // Silent bus after the log ends
            thread::sleep(timeout);
            return Ok(None);
        };

        if self.realtime {
            let first = *self.first_log_time.get_or_insert(record.log_time);
            let Some(due) = offset_from(self.started, record.log_time - first) else {
                let log_time = record.log_time;
                self.pending = None;
                return Err(TelemetryError::ReadFailure(format!(
                    "log time {} out of range",
                    log_time
                )));
            };
            let now = Instant::now();
            if due > now + timeout {
                thread::sleep(timeout);
                return Ok(None);
            }
            if due > now {
                thread::sleep(due - now);
            }
        }

        let Some(record) = self.pending.take() else {
            return Ok(None);
        };
        RawFrame::new(record.can_id, record.data, Instant::now())
            .map(Some)
            .map_err(|e| TelemetryError::ReadFailure(e.to_string()))
    }
}

/// Opens channel `<name>` as the replay file `<dir>/<name>.log`
#[derive(Debug, Clone)]
pub struct CandumpDirectoryOpener {
    dir: PathBuf,
    realtime: bool,
}

impl CandumpDirectoryOpener {
    pub fn new(dir: impl Into<PathBuf>, realtime: bool) -> Self {
        Self {
            dir: dir.into(),
            realtime,
        }
    }

    pub fn path_for(&self, channel: &str) -> PathBuf {
        self.dir.join(format!("{}.log", channel))
    }
}

impl ChannelOpener for CandumpDirectoryOpener {
    fn open(&self, channel: &str) -> Result<Box<dyn FrameSource>> {
        let replay = CandumpReplay::open(&self.path_for(channel), self.realtime)?;
        Ok(Box::new(replay))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_log(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        let mut file = File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_parse_line() {
        let record = parse_line("(1436509052.249713) can0 100#04D2").unwrap().unwrap();
        assert_eq!(record.interface, "can0");
        assert_eq!(record.can_id, 0x100);
        assert_eq!(record.data, vec![0x04, 0xD2]);
        assert!((record.log_time - 1436509052.249713).abs() < 1e-6);

        let extended = parse_line("(0.5) vcan0 18FF0102#44").unwrap().unwrap();
        assert_eq!(extended.can_id, 0x18FF_0102);

        let empty = parse_line("(0.5) can1 102#").unwrap().unwrap();
        assert!(empty.data.is_empty());

        assert_eq!(parse_line("").unwrap(), None);
        assert_eq!(parse_line("# comment").unwrap(), None);
    }

    #[test]
    fn test_parse_line_errors() {
        assert!(parse_line("can0 100#04D2").is_err());
        assert!(parse_line("(1.0) can0 100-04D2").is_err());
        assert!(parse_line("(1.0) can0 100#04D").is_err());
        assert!(parse_line("(1.0) can0 10G#00").is_err());
        assert!(parse_line("(1.0) can0 123#R").is_err());
        assert!(parse_line("(1.0) can0 123##1AA").is_err());
    }

    #[test]
    fn test_parse_line_rejects_signs_and_odd_times() {
        assert!(parse_line("(1.0) can0 100#+1D2").is_err());
        assert!(parse_line("(1.0) can0 +100#01").is_err());
        assert!(parse_line("(inf) can0 100#01").is_err());
        assert!(parse_line("(NaN) can0 100#01").is_err());
        assert!(parse_line("(-1.0) can0 100#01").is_err());
    }

    #[test]
    fn test_parser_reports_out_of_range_time() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_log(dir.path(), "trace.log", "(1.0) can0 100#04D2\n(1e30) can0 100#04D2\n");

        let frames: Vec<_> = CandumpParser::parse(&path).unwrap().collect();
        assert_eq!(frames.len(), 2);
        assert!(frames[0].is_ok());
        assert!(matches!(frames[1], Err(TelemetryError::InvalidFrame(_))));
    }

    #[test]
    fn test_realtime_replay_reports_out_of_range_time() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_log(
            dir.path(),
            "can0.log",
            "(1.0) can0 100#0001\n(1e30) can0 100#0002\n(1.1) can0 102#44\n",
        );

        let mut replay = CandumpReplay::open(&path, true).unwrap();
        let timeout = Duration::from_millis(500);
        assert!(replay.recv(timeout).unwrap().is_some());
        assert!(matches!(replay.recv(timeout), Err(TelemetryError::ReadFailure(_))));
        // The bad line is dropped and replay carries on
        assert_eq!(replay.recv(timeout).unwrap().unwrap().can_id, 0x102);
    }

    #[test]
    fn test_parser_iterates_frames() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_log(
            dir.path(),
            "trace.log",
            "(10.00) can0 100#04D2\n\n(10.50) can0 102#44\n(11.00) can0 100#0009AABBCCDDEEFF00\n",
        );

        let frames: Vec<_> = CandumpParser::parse(&path).unwrap().collect();
        assert_eq!(frames.len(), 3);
        let first = frames[0].as_ref().unwrap();
        let second = frames[1].as_ref().unwrap();
        assert_eq!(second.timestamp - first.timestamp, Duration::from_millis(500));
        // Nine payload bytes is not a classic CAN frame
        assert!(frames[2].is_err());
    }

    #[test]
    fn test_replay_and_silence() {
        let dir = tempfile::tempdir().unwrap();
        write_log(dir.path(), "can0.log", "(1.0) can0 100#04D2\nbogus\n(1.1) can0 102#44\n");

        let opener = CandumpDirectoryOpener::new(dir.path(), false);
        assert!(opener.open("can1").is_err());

        let mut source = opener.open("can0").unwrap();
        let timeout = Duration::from_millis(5);

        let frame = source.recv(timeout).unwrap().unwrap();
        assert_eq!(frame.can_id, 0x100);
        assert!(matches!(source.recv(timeout), Err(TelemetryError::ReadFailure(_))));
        assert_eq!(source.recv(timeout).unwrap().unwrap().can_id, 0x102);
        assert!(source.recv(timeout).unwrap().is_none());
    }

    #[test]
    fn test_realtime_replay_waits() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_log(dir.path(), "can0.log", "(5.000) can0 100#0001\n(5.200) can0 100#0002\n");

        let mut replay = CandumpReplay::open(&path, true).unwrap();
        assert!(replay.recv(Duration::from_millis(10)).unwrap().is_some());
        // Second frame is due 200ms later, beyond a 10ms timeout
        assert!(replay.recv(Duration::from_millis(10)).unwrap().is_none());
        assert!(replay.recv(Duration::from_millis(500)).unwrap().is_some());
        assert!(!replay.is_exhausted());
        assert!(replay.recv(Duration::from_millis(1)).unwrap().is_none());
        assert!(replay.is_exhausted());
    }
}
