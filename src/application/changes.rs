//! Change messages arriving as newline-delimited JSON.
//!
//! A watcher process writes one object per line, for example
//! `{"type":"rebuild","filename":"content/posts/a.md"}`.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, info, warn};

use crate::build::ChangeNotifier;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChangeMessage {
    Rebuild { filename: PathBuf },
}

/// Forward every `rebuild` message read from `reader` to `notifier`.
///
/// Relative filenames are resolved against `base_dir`. Malformed lines and
/// unknown message types are skipped. Returns the number of notifications
/// forwarded once the reader is exhausted or the session has stopped.
pub async fn forward_changes<R>(
    reader: R,
    notifier: &ChangeNotifier,
    base_dir: &Path,
) -> std::io::Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut forwarded = 0usize;

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let message = match serde_json::from_str::<ChangeMessage>(line) {
            Ok(message) => message,
            Err(err) => {
                warn!(error = %err, line, "Ignoring unrecognised change message");
                continue;
            }
        };

        match message {
            ChangeMessage::Rebuild { filename } => {
                let path = if filename.is_absolute() {
                    filename
                } else {
                    base_dir.join(filename)
                };
                debug!(path = %path.display(), "Change message received");
                if notifier.file_changed(&path).is_err() {
                    info!("Build session stopped, no longer reading change messages");
                    break;
                }
                forwarded += 1;
            }
        }
    }

    Ok(forwarded)
}
