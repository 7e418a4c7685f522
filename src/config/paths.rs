//! Canonical file names and locations.
//!
//! Single source of truth - import this instead of hardcoding paths.
//!
//! | Location | Purpose |
//! |----------|---------|
//! | `<home>/queue.json` | Queue slot, JSON backend |
//! | `<home>/queue.json.lock` | Save lock, JSON backend |
//! | `<home>/queue.db` | Queue slot, SQLite backend |
//! | `<home>/queue.db.corrupt` | Unreadable database moved aside |
//! | `<home>/owner.lock` | Held by the process that owns the queue |

/// Directory holding the config file (and the default home under $HOME)
pub const CONFIG_DIR: &str = ".voicedrop";

/// Config file name inside `CONFIG_DIR`
pub const CONFIG_FILE: &str = "config.yaml";

/// Queue file for the JSON backend
pub const QUEUE_JSON: &str = "queue.json";

/// Database file for the SQLite backend
pub const QUEUE_DB: &str = "queue.db";

/// Suffix appended to a database that could not be opened
pub const CORRUPT_SUFFIX: &str = ".corrupt";

/// Exclusive lock held while a process owns the queue
pub const OWNER_LOCK: &str = "owner.lock";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_names_are_distinct() {
        let names = [QUEUE_JSON, QUEUE_DB, OWNER_LOCK];
        for (i, a) in names.iter().enumerate() {
            for b in &names[i + 1..] {
                assert_ne!(a, b);
            }
        }
        assert!(CONFIG_DIR.starts_with('.'));
    }
}
