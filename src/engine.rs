//! Transaction Engine: coordinates one request -> one response across the
//! I²C Raw Link, BSC Slave Endpoint and Frame Codec, with retries, timing
//! and caching.

use std::time::Duration;

use crate::action::{compose, Action, RequestParams};
use crate::cache::WpuCache;
use crate::error::WpuError;
use crate::frame::{self, Frame};
use crate::i2c_link::MasterLink;
use crate::slave::SlaveEndpoint;

const MAX_ATTEMPTS: u32 = 20;
const ATTEMPT_INTERVAL: Duration = Duration::from_millis(210);
const SLAVE_ADDRESS: u8 = 0x40;

/// The three operating modes the engine can run a call in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Normal,
    MasterOnly,
    /// Diagnostic: arm the slave, block for `slave_timeout`, then disarm,
    /// without ever writing a request.
    SlaveOnly { slave_timeout: Duration },
}

/// Coordinates one call. Both the master link and slave endpoint are
/// borrowed for the engine's lifetime: each `Action` invocation owns a
/// fresh Transaction Engine cycle, so callers construct a fresh
/// `I2cRawLink`/`FakeMasterLink` and a fresh (or freshly re-armed) slave
/// endpoint per call.
pub struct TransactionEngine<'a, M: MasterLink, S: SlaveEndpoint> {
    mode: Mode,
    master: &'a mut M,
    slave: &'a mut S,
    cache: &'a mut WpuCache,
    no_cache: bool,
}

impl<'a, M: MasterLink, S: SlaveEndpoint> TransactionEngine<'a, M, S> {
    pub fn new(
        mode: Mode,
        master: &'a mut M,
        slave: &'a mut S,
        cache: &'a mut WpuCache,
        no_cache: bool,
    ) -> Self {
        TransactionEngine { mode, master, slave, cache, no_cache }
    }

    /// Runs one complete call. `setsetting`/`setmanual` MUST have already
    /// passed the CLI-boundary confirmation gate before this is invoked;
    /// the engine itself does not prompt.
    pub fn call(&mut self, action: Action, params: &RequestParams) -> Result<Option<Frame>, WpuError> {
        debug_assert!(
            !action.is_write() || params.value.is_some(),
            "write actions must carry a value; the CLI-boundary confirmation gate must run first"
        );

        if !self.no_cache && action.cacheable() {
            if let Some(raw) = self.cache.get(action) {
                log::debug!("{}: cache hit", action.name());
                return Ok(frame::validate_incoming(raw));
            }
        }

        let result = match self.mode {
            Mode::MasterOnly => self.run_master_only(action, params)?,
            Mode::SlaveOnly { slave_timeout } => {
                self.run_slave_only(slave_timeout);
                None
            }
            Mode::Normal => self.run_normal(action, params)?,
        };

        if !self.no_cache && action.cacheable() {
            if let Some(frame) = result.clone() {
                log::debug!(
                    "{}: caching {} byte(s) from source {:#04x}",
                    action.name(), frame.length(), frame.source()
                );
                self.cache.set(action, frame.into_raw());
            }
        }

        Ok(result)
    }

    fn run_master_only(&mut self, action: Action, params: &RequestParams) -> Result<Option<Frame>, WpuError> {
        let request = compose(action, params);
        self.master.write(&request)?;
        // Diagnostic mode: no slave is armed to observe a reply, so this
        // always returns nil.
        Ok(None)
    }

    fn run_slave_only(&mut self, slave_timeout: Duration) {
        if self.slave.arm(SLAVE_ADDRESS).is_err() {
            log::error!("{}", WpuError::DriverUnavailable);
            return;
        }
        std::thread::sleep(slave_timeout);
        let _ = self.slave.disarm();
    }

    fn run_normal(&mut self, action: Action, params: &RequestParams) -> Result<Option<Frame>, WpuError> {
        if self.slave.arm(SLAVE_ADDRESS).is_err() {
            log::error!("{}", WpuError::DriverUnavailable);
            return Ok(None);
        }

        let request = compose(action, params);

        let mut result = None;
        for attempt in 1..=MAX_ATTEMPTS {
            log::debug!("{}: attempt {attempt}/{MAX_ATTEMPTS}", action.name());
            self.master.write(&request)?;
            std::thread::sleep(ATTEMPT_INTERVAL);
            if let Some(frame) = self.slave.recv_timeout(Duration::from_millis(0)) {
                result = Some(frame);
                break;
            }
        }

        let _ = self.slave.disarm();

        if result.is_none() {
            log::error!("{}: {}", action.name(), WpuError::TimeoutExceeded(MAX_ATTEMPTS));
        }

        if let Some(frame) = &result {
            if let Err(e) = frame::verify_response(frame, action.class()) {
                log::error!("{}: {e}", action.name());
                return Err(e);
            }
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::WpuCache;
    use crate::slave::FakeSlaveEndpoint;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingMaster {
        writes: AtomicU32,
    }

    impl CountingMaster {
        fn new() -> Self {
            CountingMaster { writes: AtomicU32::new(0) }
        }
        fn count(&self) -> u32 {
            self.writes.load(Ordering::SeqCst)
        }
    }

    impl MasterLink for CountingMaster {
        fn write(&mut self, _bytes: &[u8]) -> Result<(), WpuError> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn response_frame(action: Action, payload: &[u8]) -> Vec<u8> {
        let (hi, lo) = action.class();
        let mut body = vec![0x80, hi, lo, 0x01, payload.len() as u8];
        body.extend_from_slice(payload);
        frame::finish_incoming(body)
    }

    #[test]
    fn s6_cache_hit_short_circuits() {
        let mut cache = WpuCache::empty();
        cache.path = std::env::temp_dir().join(format!("itho-wpu-cache-engine-test-{}.json", std::process::id()));
        let cached = response_frame(Action::GetNodeId, &[0x00, 0x01, 0x00, 0x0D, 0x02, 0x05]);
        cache.set(Action::GetNodeId, cached.clone());

        let mut master = CountingMaster::new();
        let mut slave = FakeSlaveEndpoint::new();
        let mut engine = TransactionEngine::new(Mode::Normal, &mut master, &mut slave, &mut cache, false);
        let result = engine.call(Action::GetNodeId, &RequestParams::default()).unwrap();
        assert_eq!(result.unwrap().raw(), cached.as_slice());
        assert_eq!(master.count(), 0, "cache hit must not touch the i2c link");
        let _ = std::fs::remove_file(&cache.path);
    }

    #[test]
    fn retry_bound_writes_exactly_20_times_then_gives_up() {
        let mut cache = WpuCache::empty();
        let mut master = CountingMaster::new();
        let mut slave = FakeSlaveEndpoint::new();
        // Never inject a response: queue stays empty the whole call.
        let mut engine = TransactionEngine::new(Mode::Normal, &mut master, &mut slave, &mut cache, true);

        let start = std::time::Instant::now();
        let result = engine.call(Action::GetSerial, &RequestParams::default()).unwrap();
        assert!(result.is_none());
        assert_eq!(master.count(), MAX_ATTEMPTS);
        assert!(start.elapsed() >= ATTEMPT_INTERVAL * (MAX_ATTEMPTS - 1));
    }

    #[test]
    fn a_late_response_from_an_earlier_attempt_still_satisfies_the_call() {
        let mut cache = WpuCache::empty();
        let mut master = CountingMaster::new();
        let mut slave = FakeSlaveEndpoint::new();
        slave.arm(SLAVE_ADDRESS).unwrap();
        slave.inject(response_frame(Action::GetSerial, &[0x00, 0x12, 0x34]));

        let mut engine = TransactionEngine::new(Mode::Normal, &mut master, &mut slave, &mut cache, true);
        let result = engine.call(Action::GetSerial, &RequestParams::default()).unwrap();
        assert!(result.is_some());
        assert_eq!(master.count(), 1);
    }

    #[test]
    fn master_only_never_produces_a_result() {
        let mut cache = WpuCache::empty();
        let mut master = CountingMaster::new();
        let mut slave = FakeSlaveEndpoint::new();
        let mut engine = TransactionEngine::new(Mode::MasterOnly, &mut master, &mut slave, &mut cache, true);
        let result = engine.call(Action::GetSerial, &RequestParams::default()).unwrap();
        assert!(result.is_none());
        assert_eq!(master.count(), 1);
    }

    #[test]
    fn slave_only_arms_sleeps_and_disarms_without_writing() {
        let mut cache = WpuCache::empty();
        let mut master = CountingMaster::new();
        let mut slave = FakeSlaveEndpoint::new();
        let mut engine = TransactionEngine::new(
            Mode::SlaveOnly { slave_timeout: Duration::from_millis(5) },
            &mut master,
            &mut slave,
            &mut cache,
            true,
        );
        let result = engine.call(Action::GetSerial, &RequestParams::default()).unwrap();
        assert!(result.is_none());
        assert_eq!(master.count(), 0);
    }
}
