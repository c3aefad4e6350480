//! Fuzz target for the TOML configuration parser.
//!
//! Run with: cargo +nightly fuzz run fuzz_config_parser
//!
//! Feeds arbitrary text through `AppConfig::parse()`, which also validates,
//! and re-renders anything that parses. A rendered config must parse back to
//! the same value.

#![no_main]

use kestrel_config::AppConfig;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(s) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(config) = AppConfig::parse(s) else {
        return;
    };

    let rendered = toml::to_string(&config).expect("parsed config must render");
    let reparsed = AppConfig::parse(&rendered).expect("rendered config must parse");
    assert_eq!(reparsed, config);
});
