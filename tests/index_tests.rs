use logslice::index::store::{self, index_path_for, LoadOutcome};
use logslice::index::{build_index, resolve, BuildOptions, Resolution, SourceIdentity, StaleReason};
use logslice::pipeline::prepare_index;
use logslice::source::DateParser;
use std::fs;
use std::io::Write;
use tempfile::TempDir;

fn sample_log(dir: &TempDir) -> std::path::PathBuf {
    let path = dir.path().join("service.log");
    let mut file = fs::File::create(&path).unwrap();
    let days = ["2024-03-09", "2024-03-10", "2024-03-11", "2024-03-14"];
    for (n, day) in days.iter().enumerate() {
        for i in 0..(n + 1) * 25 {
            writeln!(file, "{} 08:00:{:02} request {} handled", day, i % 60, i).unwrap();
            if i % 10 == 0 {
                writeln!(file, "  detail line without a date").unwrap();
            }
        }
    }
    path
}

#[test]
fn test_index_survives_round_trip() {
    let dir = TempDir::new().unwrap();
    let log = sample_log(&dir);
    let parser = DateParser::iso();
    let index_path = index_path_for(&log, None);

    let built = build_index(&log, &parser, &BuildOptions::default()).unwrap();
    store::save(&index_path, &built).unwrap();

    let current = SourceIdentity::inspect(&log, &parser).unwrap();
    let LoadOutcome::Ready(loaded) = store::load(&index_path, &current).unwrap() else {
        panic!("index should load");
    };

    assert_eq!(loaded, built);
    assert_eq!(loaded.entries.len(), 4);

    // Every entry points at the start of a line carrying its date
    let data = fs::read(&log).unwrap();
    for entry in &loaded.entries {
        let offset = entry.offset as usize;
        assert!(offset == 0 || data[offset - 1] == b'\n');
        assert_eq!(parser.parse(&data[offset..]).unwrap(), entry.date);
    }
}

#[test]
fn test_resolved_ranges_tile_the_file() {
    let dir = TempDir::new().unwrap();
    let log = sample_log(&dir);
    let index = build_index(&log, &DateParser::iso(), &BuildOptions::default()).unwrap();

    let mut expected_start = 0;
    for entry in &index.entries {
        let Resolution::Found(range) = resolve(&index, entry.date) else {
            panic!("{} should resolve", entry.date);
        };
        assert_eq!(range.start, expected_start);
        expected_start = range.end;
    }
    assert_eq!(expected_start, fs::metadata(&log).unwrap().len());
}

#[test]
fn test_modified_source_makes_index_stale() {
    let dir = TempDir::new().unwrap();
    let log = sample_log(&dir);
    let parser = DateParser::iso();
    let index_path = index_path_for(&log, None);
    store::save(
        &index_path,
        &build_index(&log, &parser, &BuildOptions::default()).unwrap(),
    )
    .unwrap();

    let mut file = fs::OpenOptions::new().append(true).open(&log).unwrap();
    writeln!(file, "2024-03-15 00:00:00 late arrival").unwrap();
    drop(file);

    let current = SourceIdentity::inspect(&log, &parser).unwrap();
    let outcome = store::load(&index_path, &current).unwrap();

    assert!(matches!(
        outcome,
        LoadOutcome::Stale(StaleReason::SourceChanged("size"))
    ));
}

#[test]
fn test_index_from_other_format_is_stale() {
    let dir = TempDir::new().unwrap();
    let log = sample_log(&dir);
    let index_path = index_path_for(&log, None);
    store::save(
        &index_path,
        &build_index(&log, &DateParser::iso(), &BuildOptions::default()).unwrap(),
    )
    .unwrap();

    let other = DateParser::new("%Y/%m/%d", 0).unwrap();
    let current = SourceIdentity::inspect(&log, &other).unwrap();

    assert!(matches!(
        store::load(&index_path, &current).unwrap(),
        LoadOutcome::Stale(StaleReason::SourceChanged("parser"))
    ));
}

#[tokio::test]
async fn test_corrupt_index_is_replaced() {
    let dir = TempDir::new().unwrap();
    let log = sample_log(&dir);
    let parser = DateParser::iso();
    let index_path = dir.path().join("service.log.idx");
    fs::write(&index_path, "# logslice index v1\n# source: /elsewhere\ngarbage\n").unwrap();

    let index = prepare_index(&log, &index_path, &parser, &BuildOptions::default(), false)
        .await
        .unwrap();

    assert_eq!(index.entries.len(), 4);
    let current = SourceIdentity::inspect(&log, &parser).unwrap();
    assert!(matches!(
        store::load(&index_path, &current).unwrap(),
        LoadOutcome::Ready(_)
    ));
}

#[tokio::test]
async fn test_empty_log_has_empty_index() {
    let dir = TempDir::new().unwrap();
    let log = dir.path().join("empty.log");
    fs::write(&log, "").unwrap();
    let index_path = index_path_for(&log, None);

    let index = prepare_index(
        &log,
        &index_path,
        &DateParser::iso(),
        &BuildOptions::default(),
        false,
    )
    .await
    .unwrap();

    assert!(index.entries.is_empty());
    assert_eq!(index.first_date(), None);
    assert!(index_path.exists());
}
