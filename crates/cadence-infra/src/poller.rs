// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Background sampling of a [`HardwareMonitor`].

use cadence_core::{DeviceTelemetry, HardwareMonitor, StartupError};
use crossbeam_channel::{Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Samples a monitor on its own thread and keeps only the latest reading.
///
/// The reading travels over a capacity-1 channel; a stale value is replaced
/// rather than queued, so the tick thread never sees old device state.
#[derive(Debug)]
pub struct DevicePoller {
    receiver: Receiver<DeviceTelemetry>,
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl DevicePoller {
    /// Spawns the sampling thread.
    pub fn spawn(monitor: Arc<dyn HardwareMonitor>, interval: Duration) -> Result<Self, StartupError> {
        let (sender, receiver) = crossbeam_channel::bounded(1);
        let stop = Arc::new(AtomicBool::new(false));

        let name = "cadence-device-poller".to_string();
        let worker = {
            let stop = Arc::clone(&stop);
            let stale = receiver.clone();
            thread::Builder::new()
                .name(name.clone())
                .spawn(move || poll_loop(monitor.as_ref(), &sender, &stale, &stop, interval))
                .map_err(|source| StartupError::WorkerSpawn { name, source })?
        };

        log::debug!("DevicePoller: sampling every {interval:?}");
        Ok(Self {
            receiver,
            stop,
            worker: Some(worker),
        })
    }

    /// Takes the latest reading, if one arrived since the last call.
    pub fn latest(&self) -> Option<DeviceTelemetry> {
        self.receiver.try_iter().last()
    }

    /// A receiver sharing the reading channel.
    pub fn receiver(&self) -> Receiver<DeviceTelemetry> {
        self.receiver.clone()
    }

    /// Stops the thread and waits for it.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(worker) = self.worker.take() {
            worker.thread().unpark();
            if worker.join().is_err() {
                log::error!("DevicePoller: sampling thread panicked");
            }
        }
    }
}

impl Drop for DevicePoller {
    fn drop(&mut self) {
        self.stop();
    }
}

fn poll_loop(
    monitor: &dyn HardwareMonitor,
    sender: &Sender<DeviceTelemetry>,
    stale: &Receiver<DeviceTelemetry>,
    stop: &AtomicBool,
    interval: Duration,
) {
    while !stop.load(Ordering::Acquire) {
        let sample = monitor.sample();
        log::trace!("DevicePoller: {sample:?}");
        // Replace any reading nobody consumed.
        let _ = stale.try_recv();
        if sender.try_send(sample).is_err() {
            log::trace!("DevicePoller: reading superseded before delivery");
        }
        thread::park_timeout(interval);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_core::ThermalStatus;
    use std::sync::atomic::AtomicU32;
    use std::time::Instant;

    struct CountingMonitor(AtomicU32);

    impl HardwareMonitor for CountingMonitor {
        fn thermal_status(&self) -> ThermalStatus {
            ThermalStatus::Warm
        }
        fn battery_percent(&self) -> Option<f32> {
            Some(self.0.fetch_add(1, Ordering::SeqCst) as f32)
        }
        fn cpu_load(&self) -> f32 {
            0.5
        }
    }

    #[test]
    fn test_latest_reading_arrives() {
        let monitor = Arc::new(CountingMonitor(AtomicU32::new(0)));
        let mut poller = DevicePoller::spawn(monitor, Duration::from_millis(1)).unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        let mut reading = None;
        while reading.is_none() && Instant::now() < deadline {
            reading = poller.latest();
            thread::sleep(Duration::from_millis(1));
        }
        let reading = reading.unwrap();
        assert_eq!(reading.thermal, ThermalStatus::Warm);
        assert!(reading.battery_percent.is_some());
        poller.stop();
    }

    #[test]
    fn test_channel_holds_only_one_reading() {
        let monitor = Arc::new(CountingMonitor(AtomicU32::new(0)));
        let poller = DevicePoller::spawn(monitor, Duration::from_millis(1)).unwrap();
        thread::sleep(Duration::from_millis(20));
        assert!(poller.receiver().len() <= 1);
    }

    #[test]
    fn test_stop_is_prompt_with_long_interval() {
        let monitor = Arc::new(CountingMonitor(AtomicU32::new(0)));
        let mut poller = DevicePoller::spawn(monitor, Duration::from_secs(60)).unwrap();
        let started = Instant::now();
        poller.stop();
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
