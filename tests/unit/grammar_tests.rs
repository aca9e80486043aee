//! Unit tests for the record and count grammar.

use chrono::{TimeZone, Utc};

use tfvc_annotate::models::annotation::AnnotationRecord;
use tfvc_annotate::protocol::grammar::{encode_record, parse_count, parse_record, RecordError};
use tfvc_annotate::protocol::variant::ProtocolVariant;
use tfvc_annotate::AppError;

// ── Current protocol ────────────────────────────────────────────────────────

/// A tab-separated record yields revision, author and a UTC timestamp.
///
/// 1430736199000 ms is 2015-05-04T10:43:19Z.
#[test]
fn parses_current_record() {
    let record = parse_record(
        "26274\tSND\\DinSoft_cp\t1430736199000",
        &ProtocolVariant::current(),
    )
    .expect("record parses");

    assert_eq!(record.revision, "26274");
    assert_eq!(record.author, r"SND\DinSoft_cp");
    let timestamp = record.timestamp.expect("timestamp present");
    assert_eq!(timestamp.timestamp_millis(), 1_430_736_199_000);
    assert_eq!(
        timestamp,
        Utc.with_ymd_and_hms(2015, 5, 4, 10, 43, 19)
            .single()
            .expect("valid date")
    );
}

/// Text that is not three tab-separated fields is malformed, and the error
/// names the file and the 1-based record index.
#[test]
fn malformed_record_names_file_and_index() {
    let rejection = parse_record("hello world!", &ProtocolVariant::current())
        .expect_err("free text is not a record");
    assert_eq!(rejection, RecordError::Malformed);

    let err = rejection.at("invalid_output.txt", 1, "hello world!");
    assert!(matches!(
        err,
        AppError::MalformedRecord { ref path, index: 1, .. } if path == "invalid_output.txt"
    ));
    let message = err.to_string();
    assert!(message.contains("invalid_output.txt"), "{message}");
    assert!(message.contains("at line 1"), "{message}");
}

/// Authors containing spaces survive the tab grammar intact.
#[test]
fn author_may_contain_spaces() {
    let record = parse_record("7\tJohn Smith\t0", &ProtocolVariant::current())
        .expect("record parses");
    assert_eq!(record.author, "John Smith");
    assert_eq!(record.timestamp.map(|ts| ts.timestamp_millis()), Some(0));
}

/// An unreadable timestamp does not reject the record.
#[test]
fn unreadable_timestamp_becomes_none() {
    let record = parse_record("7\talice\tyesterday", &ProtocolVariant::current())
        .expect("record parses");
    assert_eq!(record.timestamp, None);
}

/// An empty field is a grammar violation.
#[test]
fn empty_field_is_malformed() {
    assert_eq!(
        parse_record("7\t\t1430736199000", &ProtocolVariant::current()),
        Err(RecordError::Malformed)
    );
    assert_eq!(
        parse_record("7\talice", &ProtocolVariant::current()),
        Err(RecordError::Malformed)
    );
}

/// Encoding then parsing gives back the same record.
#[test]
fn encoded_record_parses_back() {
    let variant = ProtocolVariant::current();
    let original = AnnotationRecord::new(
        "26274",
        r"SND\DinSoft_cp",
        Utc.timestamp_millis_opt(1_430_736_199_000).single(),
    );

    let line = encode_record(&original, &variant);
    assert_eq!(line, "26274\tSND\\DinSoft_cp\t1430736199000");
    assert_eq!(parse_record(&line, &variant), Ok(original));
}

/// Every record of a batch survives encode then parse, in each generation,
/// including records whose timestamp is unknown.
#[test]
fn record_batches_parse_back_in_every_generation() {
    let stamped = |y, m, d, h| Utc.with_ymd_and_hms(y, m, d, h, 0, 0).single();
    let tab_records = vec![
        AnnotationRecord::new("26274", r"SND\DinSoft_cp", stamped(2015, 5, 4, 10)),
        AnnotationRecord::new("1", "John Smith", Utc.timestamp_millis_opt(0).single()),
        AnnotationRecord::new("C42", "bob@example.com", None),
        AnnotationRecord::new("999999", "alice", stamped(2024, 2, 29, 23)),
    ];
    let legacy_records = vec![
        AnnotationRecord::new("3", "username", stamped(2006, 3, 13, 0)),
        AnnotationRecord::new("17", r"DOMAIN\builder", stamped(1999, 12, 31, 0)),
        AnnotationRecord::new("18", "carol", None),
    ];

    for (variant, records) in [
        (ProtocolVariant::current(), &tab_records),
        (ProtocolVariant::collection(), &tab_records),
        (ProtocolVariant::legacy(), &legacy_records),
    ] {
        for record in records {
            let line = encode_record(record, &variant);
            assert_eq!(
                parse_record(&line, &variant).as_ref(),
                Ok(record),
                "line {line:?} in {:?}",
                variant.separator
            );
        }
    }

    let unknown = encode_record(&tab_records[2], &ProtocolVariant::current());
    assert_eq!(unknown, "C42\tbob@example.com\t-");
}

// ── Legacy protocol ─────────────────────────────────────────────────────────

/// Legacy records are whitespace separated with `MM/dd/yyyy` dates.
#[test]
fn parses_legacy_record() {
    let record = parse_record("3   username   3/13/2006", &ProtocolVariant::legacy())
        .expect("legacy record parses");

    assert_eq!(record.revision, "3");
    assert_eq!(record.author, "username");
    assert_eq!(
        record.timestamp,
        Utc.with_ymd_and_hms(2006, 3, 13, 0, 0, 0).single()
    );
}

/// Lines for local or unknown revisions are reported as not committed.
#[test]
fn local_and_unknown_lines_are_not_version_controlled() {
    let legacy = ProtocolVariant::legacy();
    assert_eq!(
        parse_record("local  alice  3/13/2006", &legacy),
        Err(RecordError::NotVersionControlled)
    );
    assert_eq!(
        parse_record("unknown", &legacy),
        Err(RecordError::NotVersionControlled)
    );

    let err = RecordError::NotVersionControlled.at("a.cs", 4, "local");
    assert!(err.to_string().contains("is the file committed?"));
}

// ── Count lines ─────────────────────────────────────────────────────────────

/// Counts are plain non-negative integers, optionally followed by a note.
#[test]
fn count_lines() {
    assert_eq!(parse_count("3").map(|c| c.count), Some(3));
    assert_eq!(parse_count("0").map(|c| c.note), Some(None));
    assert_eq!(
        parse_count("0 - is a binary one: lib.dll").and_then(|c| c.note),
        Some("- is a binary one: lib.dll".to_owned())
    );
    assert_eq!(parse_count("-1"), None);
    assert_eq!(parse_count("3x"), None);
    assert_eq!(parse_count(""), None);
    assert_eq!(parse_count("AnnotationFailedOnFile"), None);
}
