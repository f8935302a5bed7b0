// ===============================
// src/recorder.rs
// ===============================
//
// Append-only output streams, one JSONL line per record:
// - trades:  one line per fill
// - pnl:     one line per ledger mutation
// - summary: one block per session end
//
// Streams are opened before the worker starts; an unwritable path is a
// startup failure, like an unreadable order cache. At runtime a failed write
// reopens the file and retries once, then drops the record.
//
use std::path::Path;

use serde::Serialize;
use tokio::{
    fs::{self, File, OpenOptions},
    io::{AsyncWriteExt, BufWriter},
    sync::mpsc,
    time::{interval, Duration, MissedTickBehavior},
};
use tracing::{error, info};

use crate::domain::LogRecord;
use crate::error::EngineError;

#[derive(Clone, Debug)]
pub struct LogPaths {
    pub trades: String,
    pub pnl: String,
    pub summary: String,
}

const FLUSH_EVERY_N_RECORDS: u32 = 1000;

/// One append-only JSONL file plus the path to reopen it by.
struct LogStream {
    path: String,
    writer: BufWriter<File>,
}

impl LogStream {
    async fn open(path: &str) -> Result<Self, EngineError> {
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .await
                    .map_err(|e| EngineError::Fatal(format!("log dir for {path}: {e}")))?;
            }
        }
        let file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(path)
            .await
            .map_err(|e| EngineError::Fatal(format!("log stream {path}: {e}")))?;
        Ok(Self {
            path: path.to_string(),
            writer: BufWriter::new(file),
        })
    }

    async fn append<T: Serialize>(&mut self, record: &T) {
        let mut line = match serde_json::to_vec(record) {
            Ok(l) => l,
            Err(e) => {
                error!(?e, path = %self.path, "unserializable record dropped");
                return;
            }
        };
        line.push(b'\n');

        if self.writer.write_all(&line).await.is_ok() {
            return;
        }
        // Retry once against a fresh handle (file may have been rotated or
        // unlinked underneath us).
        match Self::open(&self.path).await {
            Ok(fresh) => {
                self.writer = fresh.writer;
                if let Err(e) = self.writer.write_all(&line).await {
                    error!(?e, path = %self.path, "write failed after reopen, record dropped");
                }
            }
            Err(e) => error!(%e, "log stream reopen failed, record dropped"),
        }
    }

    async fn flush(&mut self) {
        let _ = self.writer.flush().await;
    }
}

pub struct LogStreams {
    trades: LogStream,
    pnl: LogStream,
    summary: LogStream,
}

/// Open all three streams up front so path problems fail the startup instead
/// of the first trade.
pub async fn open(paths: &LogPaths) -> Result<LogStreams, EngineError> {
    let streams = LogStreams {
        trades: LogStream::open(&paths.trades).await?,
        pnl: LogStream::open(&paths.pnl).await?,
        summary: LogStream::open(&paths.summary).await?,
    };
    info!(trades = %paths.trades, pnl = %paths.pnl, summary = %paths.summary, "log streams ready");
    Ok(streams)
}

pub async fn run(mut rx: mpsc::Receiver<LogRecord>, mut streams: LogStreams) {
    let mut tick = interval(Duration::from_secs(1));
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut since_last_flush: u32 = 0;

    loop {
        tokio::select! {
            maybe_rec = rx.recv() => {
                match maybe_rec {
                    Some(rec) => {
                        match &rec {
                            LogRecord::Trade(t) => streams.trades.append(t).await,
                            LogRecord::Pnl(p) => streams.pnl.append(p).await,
                            LogRecord::Summary(s) => {
                                streams.summary.append(s).await;
                                // Summaries end a session; make them durable now.
                                streams.summary.flush().await;
                            }
                        }
                        since_last_flush += 1;
                        if since_last_flush >= FLUSH_EVERY_N_RECORDS {
                            streams.trades.flush().await;
                            streams.pnl.flush().await;
                            since_last_flush = 0;
                        }
                    }
                    None => {
                        streams.trades.flush().await;
                        streams.pnl.flush().await;
                        streams.summary.flush().await;
                        info!("recorder: channel closed, stopped");
                        break;
                    }
                }
            }

            _ = tick.tick() => {
                streams.trades.flush().await;
                streams.pnl.flush().await;
                since_last_flush = 0;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Side, TradeRecord};
    use chrono::Utc;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn records_land_in_their_streams() {
        let dir = std::env::temp_dir().join("mmbot_recorder_test");
        let _ = std::fs::remove_dir_all(&dir);
        let paths = LogPaths {
            trades: dir.join("trades.jsonl").to_string_lossy().into_owned(),
            pnl: dir.join("pnl.jsonl").to_string_lossy().into_owned(),
            summary: dir.join("summary.jsonl").to_string_lossy().into_owned(),
        };

        let streams = open(&paths).await.unwrap();
        let (tx, rx) = mpsc::channel(8);
        let handle = tokio::spawn(run(rx, streams));

        tx.send(LogRecord::Trade(TradeRecord {
            ts: Utc::now(),
            symbol: "ETH-USD".to_string(),
            side: Side::Buy,
            qty: dec!(0.01),
            price: dec!(100.00),
            client_order_id: "MM-1".to_string(),
        }))
        .await
        .unwrap();
        drop(tx);
        handle.await.unwrap();

        let text = std::fs::read_to_string(&paths.trades).unwrap();
        assert_eq!(text.lines().count(), 1);
        assert!(text.contains("MM-1"));
        assert!(std::fs::read_to_string(&paths.pnl).unwrap().is_empty());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn unwritable_path_fails_at_open() {
        let paths = LogPaths {
            trades: "/proc/mmbot-no-such-dir/trades.jsonl".to_string(),
            pnl: "/tmp/mmbot_pnl_open_test.jsonl".to_string(),
            summary: "/tmp/mmbot_summary_open_test.jsonl".to_string(),
        };
        assert!(matches!(open(&paths).await, Err(EngineError::Fatal(_))));
        let _ = std::fs::remove_file("/tmp/mmbot_pnl_open_test.jsonl");
        let _ = std::fs::remove_file("/tmp/mmbot_summary_open_test.jsonl");
    }
}
