//! Unit tests for the harness error type.

use roost::HarnessError;

/// Each variant renders with its category prefix.
#[test]
fn display_prefixes_each_category() {
    let cases = [
        (HarnessError::Config("bad toml".into()), "config: bad toml"),
        (HarnessError::Protocol("torn frame".into()), "protocol: torn frame"),
        (HarnessError::Entries("bad name".into()), "entries: bad name"),
        (HarnessError::Resource("no disk".into()), "resource: no disk"),
        (HarnessError::Emulator("no socket".into()), "emulator: no socket"),
        (HarnessError::Fixture("script died".into()), "fixture: script died"),
        (HarnessError::Io("pipe closed".into()), "io: pipe closed"),
    ];

    for (error, expected) in cases {
        assert_eq!(error.to_string(), expected);
    }
}

/// I/O errors convert into the `Io` variant.
#[test]
fn io_errors_convert_to_io_variant() {
    let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed");

    let error = HarnessError::from(io);

    assert!(
        matches!(&error, HarnessError::Io(msg) if msg.contains("pipe closed")),
        "got: {error:?}"
    );
}

/// TOML parse errors convert into the `Config` variant.
#[test]
fn toml_errors_convert_to_config_variant() {
    let parse_error = toml::from_str::<toml::Value>("definitely not = = toml")
        .expect_err("string must not parse");

    let error = HarnessError::from(parse_error);

    assert!(
        matches!(&error, HarnessError::Config(msg) if msg.contains("invalid config")),
        "got: {error:?}"
    );
}

/// The error type plugs into `std::error::Error` consumers.
#[test]
fn implements_std_error() {
    fn assert_error<E: std::error::Error>(_: &E) {}

    assert_error(&HarnessError::Io("any".into()));
}
