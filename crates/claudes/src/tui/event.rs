// ABOUTME: Terminal input poller feeding key presses into the TUI loop
// ABOUTME: Runs on its own thread and is joined before stdin is handed back

use super::app::Msg;
use crossterm::event::{self, Event, KeyEventKind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::mpsc;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

pub struct InputPoller {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl InputPoller {
    pub fn start(tx: mpsc::UnboundedSender<Msg>) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = stop.clone();

        let handle = std::thread::spawn(move || {
            while !flag.load(Ordering::Relaxed) {
                match event::poll(POLL_INTERVAL) {
                    Ok(true) => {}
                    Ok(false) => continue,
                    Err(e) => {
                        tracing::warn!(error = %e, "Terminal poll failed");
                        break;
                    }
                }
                let Ok(Event::Key(key)) = event::read() else {
                    continue;
                };
                // windows reports releases too
                if key.kind != KeyEventKind::Press {
                    continue;
                }
                if tx.send(Msg::Key(key)).is_err() {
                    break;
                }
            }
        });

        Self {
            stop,
            handle: Some(handle),
        }
    }
}

impl Drop for InputPoller {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
