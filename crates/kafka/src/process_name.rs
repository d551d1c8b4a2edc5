//! Process titles for consumer processes.
//!
//! A consumer titles its process `"{current}-{topic}-{partitions}"` so logs
//! and `ps` show what each worker is reading.

use std::sync::{Mutex, PoisonError};

use tracing::debug;

use crate::error::{Error, Result};

/// Read and write the title of the running process.
pub trait ProcessTitle {
    fn current(&self) -> String;

    fn set(&self, name: &str) -> Result<()>;
}

/// Title of the running process.
///
/// The full title is kept for the life of the process and is what `current`
/// returns once set; before that it is the executable name. On Linux the
/// title is also written to `/proc/self/comm`, where the kernel keeps only
/// its first 15 bytes.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemProcessTitle;

static TITLE: Mutex<Option<String>> = Mutex::new(None);

impl ProcessTitle for SystemProcessTitle {
    fn current(&self) -> String {
        let title = TITLE.lock().unwrap_or_else(PoisonError::into_inner);
        title.clone().unwrap_or_else(executable_name)
    }

    fn set(&self, name: &str) -> Result<()> {
        if name.is_empty() || name.contains('\0') {
            return Err(Error::InvalidArgument(format!(
                "process name must be non-empty and free of NUL bytes: {name:?}"
            )));
        }
        *TITLE.lock().unwrap_or_else(PoisonError::into_inner) = Some(name.to_string());

        if let Err(e) = sys::set_short_name(short_name(name)) {
            debug!("Could not set kernel process name: {e}");
        }
        Ok(())
    }
}

/// Kernel thread names hold 15 bytes plus the terminator.
const SHORT_NAME_LEN: usize = 15;

fn short_name(name: &str) -> &str {
    let mut end = name.len().min(SHORT_NAME_LEN);
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    &name[..end]
}

fn executable_name() -> String {
    std::env::args()
        .next()
        .as_deref()
        .and_then(|arg| std::path::Path::new(arg).file_name())
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Build the process title for a consumer of `topic`.
pub fn compose_process_name(current: &str, topic: &str, partitions: Option<&[i32]>) -> String {
    let partitions = match partitions {
        Some(partitions) => format!("{partitions:?}"),
        None => "all".to_string(),
    };
    format!("{current}-{topic}-{partitions}")
}

#[cfg(target_os = "linux")]
mod sys {
    pub(super) fn set_short_name(name: &str) -> std::io::Result<()> {
        std::fs::write("/proc/self/comm", name)
    }
}

#[cfg(not(target_os = "linux"))]
mod sys {
    pub(super) fn set_short_name(_name: &str) -> std::io::Result<()> {
        Ok(())
    }
}
