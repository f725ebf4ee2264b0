//! Newline-delimited JSON over byte streams.
//!
//! Lets the services chain through shell pipes without a broker:
//! `producer | signals ma-detector | signals alert-service`.

use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use corelib::TradingSignal;
use engine::SinkError;
use engine::pipeline::{EventHandler, EventSink, EventSource, InboundMessage};
use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, Stdin, Stdout,
};
use tokio::sync::{Mutex as AsyncMutex, watch};
use tracing::{debug, info};

pub struct JsonLinesSource<R> {
    name: &'static str,
    reader: AsyncMutex<R>,
}

impl JsonLinesSource<BufReader<Stdin>> {
    pub fn stdin() -> Self {
        Self::new("stdin", BufReader::new(tokio::io::stdin()))
    }
}

impl<R> JsonLinesSource<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    pub fn new(name: &'static str, reader: R) -> Self {
        Self {
            name,
            reader: AsyncMutex::new(reader),
        }
    }
}

#[async_trait]
impl<R> EventSource for JsonLinesSource<R>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    async fn run(
        &self,
        handler: Arc<dyn EventHandler>,
        mut shutdown: watch::Receiver<bool>,
    ) -> anyhow::Result<()> {
        let mut reader = self.reader.lock().await;
        let mut line = String::new();
        let mut line_no: u64 = 0;

        loop {
            if *shutdown.borrow() {
                info!(source = self.name, "shutdown requested; stopping input");
                break;
            }

            line.clear();
            let read = tokio::select! {
                res = reader.read_line(&mut line) => {
                    res.with_context(|| format!("reading {}", self.name))?
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
            };

            if read == 0 {
                info!(source = self.name, lines = line_no, "end of input");
                break;
            }

            line_no += 1;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            let msg = InboundMessage::new(format!("{}:{line_no}", self.name), trimmed);
            if let Err(e) = handler.handle(msg).await {
                debug!(source = self.name, line = line_no, error = %e, "event not processed");
            }
        }

        Ok(())
    }
}

/// Writes each signal as one JSON line. The topic is not part of the output.
pub struct JsonLinesSink<W> {
    writer: AsyncMutex<W>,
}

impl JsonLinesSink<Stdout> {
    pub fn stdout() -> Self {
        Self::new(tokio::io::stdout())
    }
}

impl<W> JsonLinesSink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(writer: W) -> Self {
        Self {
            writer: AsyncMutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

#[async_trait]
impl<W> EventSink for JsonLinesSink<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    async fn publish(&self, _topic: &str, signal: &TradingSignal) -> Result<(), SinkError> {
        let mut line = serde_json::to_vec(signal)?;
        line.push(b'\n');

        let mut writer = self.writer.lock().await;
        writer.write_all(&line).await?;
        writer.flush().await?;
        Ok(())
    }

    async fn close(&self) -> anyhow::Result<()> {
        self.writer.lock().await.flush().await?;
        Ok(())
    }
}
