use std::error::Error;

use pgz_core::PgzError;

#[test]
fn converts_io_error() {
    let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
    let pgz_error: PgzError = io_error.into();

    match pgz_error {
        PgzError::Io(err) => assert_eq!(err.kind(), std::io::ErrorKind::NotFound),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn converts_anyhow_error() {
    let anyhow_error = anyhow::anyhow!("boom");
    let pgz_error: PgzError = anyhow_error.into();

    match pgz_error {
        PgzError::Other(err) => assert_eq!(err.to_string(), "boom"),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn attaches_context_and_keeps_the_source() {
    let err = PgzError::Decompression("bad trailer".to_string()).with_context("chunk 7");

    assert_eq!(err.to_string(), "chunk 7: decompression error: bad trailer");
    assert!(err.source().is_some());
    assert!(err.is_malformed_stream());

    match err {
        PgzError::Context { context, source } => {
            assert_eq!(context, "chunk 7");
            assert!(matches!(*source, PgzError::Decompression(_)));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn only_decompression_errors_count_as_malformed() {
    assert!(!PgzError::Compression("encoder".to_string()).is_malformed_stream());
    assert!(!PgzError::InvalidConfig("zero").is_malformed_stream());
    assert!(
        !PgzError::DuplicateIndex {
            index: 1,
            next_expected: 2
        }
        .with_context("staging")
        .is_malformed_stream()
    );
}
