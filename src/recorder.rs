// ===============================
// src/recorder.rs
// ===============================
//
// JSONL recorder untuk hasil tiap refresh:
// - Satu Event per baris (ledger, posisi, daily PnL, catatan).
// - BufWriter + flush tiap 1s atau tiap 500 event.
// - Parent directory dibuat otomatis.
// - Tulis gagal -> reopen sekali, kalau masih gagal event di-drop.
//
// ENV: set `RECORD_FILE=/path/to/cycles.jsonl` agar aktif (lihat main.rs).
//
use std::path::Path;
use tokio::{
    fs::{self, OpenOptions},
    io::{AsyncWriteExt, BufWriter},
    sync::mpsc,
    time::{interval, Duration, MissedTickBehavior},
};
use tracing::{error, info, warn};

use crate::domain::Event;

const FLUSH_EVERY_N_EVENTS: u32 = 500;

pub async fn open_writer(path: &str) -> std::io::Result<BufWriter<fs::File>> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).await?;
        }
    }
    let file = OpenOptions::new().create(true).append(true).open(path).await?;
    Ok(BufWriter::new(file))
}

/// Appending JSONL sink that can reopen its file after a write error.
struct Sink {
    path: String,
    writer: BufWriter<fs::File>,
    pending: u32,
}

impl Sink {
    async fn append(&mut self, line: &str) -> std::io::Result<()> {
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\n").await
    }

    async fn record(&mut self, ev: &Event) {
        let line = match serde_json::to_string(ev) {
            Ok(s) => s,
            Err(e) => {
                error!(error = %e, "recorder: serialize error, event skipped");
                return;
            }
        };
        if let Err(e) = self.append(&line).await {
            warn!(error = %e, path = %self.path, "recorder: write failed, reopening");
            match open_writer(&self.path).await {
                Ok(w) => self.writer = w,
                Err(e) => {
                    error!(error = %e, "recorder: reopen failed, event dropped");
                    return;
                }
            }
            if let Err(e) = self.append(&line).await {
                error!(error = %e, "recorder: write failed after reopen, event dropped");
                return;
            }
        }
        self.pending += 1;
        if self.pending >= FLUSH_EVERY_N_EVENTS {
            self.flush().await;
        }
    }

    async fn flush(&mut self) {
        if let Err(e) = self.writer.flush().await {
            warn!(error = %e, "recorder: flush failed");
        }
        self.pending = 0;
    }
}

pub async fn run(mut rx: mpsc::Receiver<Event>, path: String, writer: BufWriter<fs::File>) {
    info!(%path, "recorder: started");
    let mut sink = Sink { path, writer, pending: 0 };

    let mut tick = interval(Duration::from_secs(1));
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            ev = rx.recv() => match ev {
                Some(ev) => sink.record(&ev).await,
                None => break,
            },
            _ = tick.tick() => {
                if sink.pending > 0 {
                    sink.flush().await;
                }
            }
        }
    }

    sink.flush().await;
    info!(path = %sink.path, "recorder: channel closed, stopped");
}
