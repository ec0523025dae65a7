// Opening a raw log together with its sidecar cache, building the cache on demand.

use super::cache::{CacheBuilder, CacheConfig, CacheReader};
use super::error::Result;
use super::reader::EventLogReader;
use super::stream::EventStream;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Sidecar cache location: the raw path with `cache` appended to its file name.
pub fn cache_path_for(raw_path: &Path) -> PathBuf {
    let mut path = OsString::from(raw_path.as_os_str());
    path.push("cache");
    PathBuf::from(path)
}

/// Open `raw_path` as a stream, loading its cache or rebuilding it if the
/// cache is missing or unreadable.
pub fn open_stream(raw_path: &Path, config: &CacheConfig) -> Result<EventStream> {
    let mut reader = EventLogReader::open(raw_path)?;
    let cache_path = cache_path_for(raw_path);

    let cache = match CacheReader::open(&cache_path) {
        Ok(cache) => cache,
        Err(err) => {
            warn!(
                path = %cache_path.display(),
                error = %err,
                "Cannot load event cache, rebuilding"
            );
            let (index, stats) = CacheBuilder::new(*config).build(&mut reader);
            index.write_to_path(&cache_path)?;
            info!(
                path = %cache_path.display(),
                scanned = stats.scanned_count,
                "Event cache written"
            );
            CacheReader::open(&cache_path)?
        }
    };

    Ok(EventStream::new(reader, Arc::new(cache)))
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]

    use super::*;
    use crate::t3r::cache::CacheIndex;
    use crate::t3r::decoder::RawEvent;
    use crate::t3r::error::T3rError;
    use std::fs;
    use tempfile::TempDir;

    fn write_log(dir: &TempDir, name: &str, coarse_times: impl IntoIterator<Item = u32>) -> PathBuf {
        let mut bytes = vec![0x71, 0x00, 0x00, 0x00];
        for coarse_time in coarse_times {
            let raw = RawEvent {
                x: 4,
                y: 9,
                coarse_time,
                tot_code: 7,
                fast_time: 2,
            };
            bytes.extend_from_slice(&raw.encode());
        }
        let path = dir.path().join(name);
        fs::write(&path, bytes).unwrap();
        path
    }

    fn config() -> CacheConfig {
        CacheConfig {
            target_interval_size: 10,
            segment_margin: 1_000,
        }
    }

    #[test]
    fn test_cache_path_for__then_appends_suffix() {
        assert_eq!(
            cache_path_for(Path::new("/data/run_01.t3r")),
            PathBuf::from("/data/run_01.t3rcache")
        );
    }

    #[test]
    fn test_open_stream__no_cache__then_builds_and_writes_sidecar() {
        let dir = TempDir::new().unwrap();
        let raw = write_log(&dir, "run.t3r", 0..200);
        let cache_path = cache_path_for(&raw);
        assert!(!cache_path.exists());

        let stream = open_stream(&raw, &config()).unwrap();
        assert!(cache_path.exists());
        assert_eq!(stream.info().event_count, 200);

        let on_disk = CacheIndex::parse(&fs::read(&cache_path).unwrap()).unwrap();
        assert_eq!(on_disk.segments, stream.cache().segments());
    }

    #[test]
    fn test_open_stream__existing_cache__then_reused() {
        let dir = TempDir::new().unwrap();
        let raw = write_log(&dir, "run.t3r", 0..200);
        let cache_path = cache_path_for(&raw);

        // A cache that disagrees with the log proves the file was not rebuilt.
        let mut reader = EventLogReader::open(&raw).unwrap();
        let (mut index, _) = CacheBuilder::new(config()).build(&mut reader);
        index.segments[0].event_count = 7;
        index.write_to_path(&cache_path).unwrap();

        let stream = open_stream(&raw, &config()).unwrap();
        assert_eq!(stream.info().event_count, 7);
    }

    #[test]
    fn test_open_stream__corrupt_cache__then_rebuilt() {
        let dir = TempDir::new().unwrap();
        let raw = write_log(&dir, "run.t3r", 0..200);
        let cache_path = cache_path_for(&raw);
        fs::write(&cache_path, b"garbage").unwrap();

        let stream = open_stream(&raw, &config()).unwrap();
        assert_eq!(stream.info().event_count, 200);
        assert!(CacheReader::open(&cache_path).is_ok());
    }

    #[test]
    fn test_open_stream__missing_raw__then_io_error() {
        let dir = TempDir::new().unwrap();
        let err = open_stream(&dir.path().join("absent.t3r"), &config()).unwrap_err();
        assert!(matches!(err, T3rError::Io(_)));
    }
}
