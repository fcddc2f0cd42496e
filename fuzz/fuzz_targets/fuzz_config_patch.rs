//! Fuzz target: `ConfigStore::apply`
//!
//! Arbitrary JSON patches against a fresh store.  A rejected patch must
//! leave the live record untouched; an accepted one must validate.
//!
//! cargo fuzz run fuzz_config_patch

#![no_main]

use libfuzzer_sys::fuzz_target;
use patcom::adapters::nvs::NvsAdapter;
use patcom::config::ConfigPatch;
use patcom::store::ConfigStore;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(patch) = ConfigPatch::from_json(text) else {
        return;
    };
    let Ok(nvs) = NvsAdapter::new() else {
        return;
    };
    let mut store = ConfigStore::load(nvs, "PATCOM-F00D00");
    let before = store.config().clone();

    match store.apply(&patch) {
        Ok(_) => {
            let fatal = store
                .config()
                .validate()
                .err()
                .is_some_and(|errs| errs.iter().any(|e| e.is_fatal()));
            assert!(!fatal, "accepted patch produced an invalid record");
        }
        Err(_) => assert_eq!(store.config(), &before),
    }
});
