//! Boot inventory of stored files

use super::{FlashFs, ROOT};
use crate::logger;

const KIB: u64 = 1024;
const MIB: u64 = KIB * 1024;
const GIB: u64 = MIB * 1024;

/// Pretty-print a byte count (`512B`, `1.50KB`, `3.00MB`, ...)
///
/// # Examples
/// ```
/// use fsbrowser::fs::format_bytes;
/// assert_eq!(format_bytes(512), "512B");
/// assert_eq!(format_bytes(1536), "1.50KB");
/// ```
#[allow(clippy::cast_precision_loss)]
pub fn format_bytes(bytes: u64) -> String {
    if bytes < KIB {
        format!("{bytes}B")
    } else if bytes < MIB {
        format!("{:.2}KB", bytes as f64 / KIB as f64)
    } else if bytes < GIB {
        format!("{:.2}MB", bytes as f64 / MIB as f64)
    } else {
        format!("{:.2}GB", bytes as f64 / GIB as f64)
    }
}

/// Log every file stored directly under the root with its size
pub async fn log_inventory(fs: &dyn FlashFs) {
    logger::log_info("[FS] Stored files:");
    match fs.list_dir(ROOT).await {
        Ok(entries) => {
            for entry in &entries {
                logger::log_info(&format!(
                    "     FS File: {}, size: {}",
                    entry.path,
                    format_bytes(entry.size)
                ));
            }
            logger::log_info(&format!("[FS] {} file(s)\n", entries.len()));
        }
        Err(e) => logger::log_warning(&format!("Failed to enumerate flash root: {e}")),
    }
}
