//! JSON-lines session recorder.
//!
//! One file per session at `<dir>/<user>/<YYYYMMDD>/<session_id>.jsonl`: a
//! header line, then one `{"t","k","d"}` event per chunk, then a trailer.

use std::{
    fs::{self, File},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
    time::Instant,
};

use base64::{Engine, engine::general_purpose::STANDARD};
use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use ssh_core::{ObserverError, SessionInfo, SessionObserver, TermSize};
use tracing::debug;

#[derive(Serialize)]
struct Event<'a> {
    t: f64,
    k: &'a str,
    d: String,
}

struct Recording {
    out: BufWriter<File>,
    started: Instant,
}

pub struct SessionRecorder {
    root: PathBuf,
    path: Option<PathBuf>,
    recording: Option<Recording>,
}

impl SessionRecorder {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            path: None,
            recording: None,
        }
    }

    /// Recording file, once the session has started.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn event(&mut self, kind: &str, data: String) -> Result<(), ObserverError> {
        let Some(recording) = self.recording.as_mut() else {
            return Ok(());
        };
        let event = Event {
            t: recording.started.elapsed().as_secs_f64(),
            k: kind,
            d: data,
        };
        write_line(&mut recording.out, &event)
    }
}

fn write_line(out: &mut BufWriter<File>, value: &impl Serialize) -> Result<(), ObserverError> {
    serde_json::to_writer(&mut *out, value).map_err(|err| ObserverError::Encode(err.to_string()))?;
    out.write_all(b"\n")?;
    Ok(())
}

impl SessionObserver for SessionRecorder {
    fn name(&self) -> &str {
        "session-recorder"
    }

    fn on_start(&mut self, info: &SessionInfo) -> Result<(), ObserverError> {
        let now = Utc::now();
        let dir = self.root.join(&info.user).join(now.format("%Y%m%d").to_string());
        fs::create_dir_all(&dir)?;
        let path = dir.join(format!("{}.jsonl", info.session_id));

        let mut out = BufWriter::new(File::create(&path)?);
        let header = json!({
            "session_id": info.session_id,
            "user": info.user,
            "host": info.host,
            "port": info.port,
            "source": info.source.to_string(),
            "start": now.to_rfc3339(),
            "size": info.size.to_string(),
        });
        write_line(&mut out, &header)?;
        out.flush()?;

        debug!(session_id = %info.session_id, path = %path.display(), "recording session");
        self.path = Some(path);
        self.recording = Some(Recording {
            out,
            started: Instant::now(),
        });
        Ok(())
    }

    fn on_stdin(&mut self, data: &[u8]) -> Result<(), ObserverError> {
        self.event("i", STANDARD.encode(data))
    }

    fn on_channel_data(&mut self, data: &[u8]) -> Result<(), ObserverError> {
        self.event("o", STANDARD.encode(data))
    }

    fn on_resize(&mut self, size: TermSize) -> Result<(), ObserverError> {
        self.event("r", size.to_string())
    }

    fn on_stop(&mut self) -> Result<(), ObserverError> {
        let Some(mut recording) = self.recording.take() else {
            return Ok(());
        };
        let trailer = json!({
            "end": Utc::now().to_rfc3339(),
            "duration": recording.started.elapsed().as_secs_f64(),
        });
        write_line(&mut recording.out, &trailer)?;
        recording.out.flush()?;
        debug!(path = ?self.path, "recording closed");
        Ok(())
    }
}
