// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Reading service log files: the last lines, or a live follow.

use crate::clock::{Clock, sleep_or_cancel};
use crate::constants::logs::FOLLOW_POLL_INTERVAL;
use anyhow::{Context, Result};
use log::debug;
use std::io::SeekFrom;
use std::path::Path;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const TAIL_CHUNK: usize = 8192;

/// Last `lines` lines of the file at `path`.
///
/// Reads backwards from the end, so the cost depends on `lines` rather than
/// on the size of the log.
pub async fn tail(path: &Path, lines: usize) -> Result<Vec<String>> {
    tail_chunked(path, lines, TAIL_CHUNK).await
}

async fn tail_chunked(path: &Path, lines: usize, chunk: usize) -> Result<Vec<String>> {
    let mut file = tokio::fs::File::open(path)
        .await
        .with_context(|| format!("opening {}", path.display()))?;
    if lines == 0 {
        return Ok(Vec::new());
    }
    let mut start = file
        .seek(SeekFrom::End(0))
        .await
        .with_context(|| format!("seeking {}", path.display()))?;

    // One newline more than `lines` guarantees the first kept line is whole.
    let mut buf: Vec<u8> = Vec::new();
    let mut newlines = 0;
    while start > 0 && newlines <= lines {
        let len = chunk.min(start as usize);
        start -= len as u64;
        file.seek(SeekFrom::Start(start))
            .await
            .with_context(|| format!("seeking {}", path.display()))?;
        let mut block = vec![0u8; len];
        file.read_exact(&mut block)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        newlines += block.iter().filter(|&&b| b == b'\n').count();
        block.extend_from_slice(&buf);
        buf = block;
    }

    let text = String::from_utf8_lossy(&buf);
    let all: Vec<&str> = text.lines().collect();
    let skip = all.len().saturating_sub(lines);
    Ok(all[skip..].iter().map(|l| (*l).to_string()).collect())
}

/// Stream lines appended to `path` into `sink` until `cancel` fires or the
/// receiver goes away. Starts at the current end of the file; a truncated file
/// is read again from the beginning.
pub async fn follow(
    path: &Path,
    clock: &dyn Clock,
    cancel: &CancellationToken,
    sink: mpsc::Sender<String>,
) -> Result<()> {
    let mut file = tokio::fs::File::open(path)
        .await
        .with_context(|| format!("opening {}", path.display()))?;
    let mut offset = file
        .seek(SeekFrom::End(0))
        .await
        .with_context(|| format!("seeking {}", path.display()))?;
    let mut pending: Vec<u8> = Vec::new();
    let mut chunk = vec![0u8; 8192];

    loop {
        let len = file
            .metadata()
            .await
            .with_context(|| format!("stat {}", path.display()))?
            .len();
        if len < offset {
            debug!("{} truncated, reading from start", path.display());
            offset = file.seek(SeekFrom::Start(0)).await?;
            pending.clear();
        }

        loop {
            let n = file
                .read(&mut chunk)
                .await
                .with_context(|| format!("reading {}", path.display()))?;
            if n == 0 {
                break;
            }
            offset += n as u64;
            pending.extend_from_slice(&chunk[..n]);
        }

        while let Some(pos) = pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line[..line.len() - 1])
                .trim_end_matches('\r')
                .to_string();
            if sink.send(line).await.is_err() {
                return Ok(());
            }
        }

        if !sleep_or_cancel(clock, cancel, FOLLOW_POLL_INTERVAL).await {
            return Ok(());
        }
    }
}
