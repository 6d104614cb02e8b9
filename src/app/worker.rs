use std::sync::Arc;
use std::thread;

use anyhow::{Context, Result};
use crossbeam_channel::{unbounded, Receiver, Sender, TryRecvError};

use crate::editor::{FormatRequest, FormatResult};
use crate::format::FormatterGateway;

/// Runs format jobs off the UI thread.
///
/// Requests are served in order. Dropping the worker closes the request
/// channel and joins the thread once the job in hand is done.
pub struct FormatWorker {
    cmd_tx: Option<Sender<FormatRequest>>,
    evt_rx: Receiver<FormatResult>,
    thread: Option<thread::JoinHandle<()>>,
}

impl FormatWorker {
    pub fn spawn(gateway: Arc<FormatterGateway>) -> Result<Self> {
        let (cmd_tx, cmd_rx) = unbounded::<FormatRequest>();
        let (evt_tx, evt_rx) = unbounded::<FormatResult>();
        let thread = thread::Builder::new()
            .name("flick-format".into())
            .spawn(move || {
                for request in cmd_rx.iter() {
                    let outcome = gateway.format(&request.text, request.language);
                    tracing::debug!(
                        note_id = %request.note_id,
                        ticket = request.ticket,
                        language = %request.language,
                        success = outcome.success,
                        "format job finished"
                    );
                    if evt_tx.send(request.complete(outcome)).is_err() {
                        break;
                    }
                }
            })
            .context("spawning format worker thread")?;
        Ok(Self {
            cmd_tx: Some(cmd_tx),
            evt_rx,
            thread: Some(thread),
        })
    }

    pub fn submit(&self, request: FormatRequest) {
        let Some(tx) = &self.cmd_tx else {
            return;
        };
        if let Err(err) = tx.send(request) {
            tracing::error!(ticket = err.0.ticket, "format worker is gone; request dropped");
        }
    }

    /// Next finished job, if any, without blocking.
    pub fn try_recv(&self) -> Option<FormatResult> {
        match self.evt_rx.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                tracing::warn!("format worker stopped unexpectedly");
                None
            }
        }
    }

    #[cfg(test)]
    fn recv_timeout(&self, timeout: std::time::Duration) -> Option<FormatResult> {
        self.evt_rx.recv_timeout(timeout).ok()
    }
}

impl Drop for FormatWorker {
    fn drop(&mut self) {
        self.cmd_tx.take();
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::classify::LanguageTag;
    use crate::editor::FormatTrigger;
    use crate::format::CommandEngineLoader;
    use crate::notes::NoteId;

    fn request(ticket: u64, text: &str, language: LanguageTag) -> FormatRequest {
        FormatRequest {
            note_id: NoteId::from("n1"),
            generation: 3,
            ticket,
            text: text.to_string(),
            language,
            trigger: FormatTrigger::Manual,
        }
    }

    fn worker() -> anyhow::Result<FormatWorker> {
        let gateway = FormatterGateway::new(CommandEngineLoader::new(
            "flick-test-missing-formatter",
            Vec::new(),
        ));
        FormatWorker::spawn(Arc::new(gateway))
    }

    #[test]
    fn results_come_back_tagged_with_their_request() -> anyhow::Result<()> {
        let worker = worker()?;
        worker.submit(request(7, "{\"a\":1}", LanguageTag::Json));
        let result = worker
            .recv_timeout(Duration::from_secs(5))
            .ok_or_else(|| anyhow::anyhow!("no result"))?;
        assert_eq!(result.ticket, 7);
        assert_eq!(result.generation, 3);
        assert_eq!(result.source, "{\"a\":1}");
        assert!(result.outcome.success);
        assert_eq!(result.outcome.code, "{\n  \"a\": 1\n}");
        Ok(())
    }

    #[test]
    fn failures_are_delivered_not_swallowed() -> anyhow::Result<()> {
        let worker = worker()?;
        worker.submit(request(1, "const a = 1", LanguageTag::Javascript));
        let result = worker
            .recv_timeout(Duration::from_secs(10))
            .ok_or_else(|| anyhow::anyhow!("no result"))?;
        assert!(!result.outcome.success);
        assert_eq!(result.outcome.code, "const a = 1");
        assert!(result.outcome.error.is_some());
        Ok(())
    }

    #[test]
    fn try_recv_is_empty_when_idle() -> anyhow::Result<()> {
        let worker = worker()?;
        assert!(worker.try_recv().is_none());
        Ok(())
    }
}
